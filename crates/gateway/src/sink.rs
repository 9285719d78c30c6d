//! Outward delivery of shell messages (UI, log consumer).

use std::{
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use {anyhow::Result, naia_protocol::ShellMessage, tokio::sync::mpsc};

/// Receives messages pushed outward by the event dispatcher and the cron
/// scheduler. Delivery is synchronous; an error is logged by the caller and
/// never retried.
pub trait EventSink: Send + Sync {
    fn deliver(&self, message: ShellMessage) -> Result<()>;
}

/// Writes one JSON object per line.
pub struct JsonLineSink<W> {
    writer: Mutex<W>,
}

impl JsonLineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for JsonLineSink<W> {
    fn deliver(&self, message: ShellMessage) -> Result<()> {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards messages into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ShellMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShellMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, message: ShellMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow::anyhow!("shell channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        naia_protocol::LogEntry,
    };

    #[test]
    fn json_line_sink_writes_one_line_per_message() {
        let sink = JsonLineSink::new(Vec::new());
        sink.deliver(ShellMessage::LogEntry(LogEntry::default()))
            .unwrap();
        sink.deliver(ShellMessage::LogEntry(LogEntry {
            level: Some("error".into()),
            ..Default::default()
        }))
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![
            r#"{"type":"log_entry"}"#,
            r#"{"type":"log_entry","level":"error"}"#,
        ]);
    }

    #[test]
    fn channel_sink_fails_once_receiver_is_gone() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(sink.deliver(ShellMessage::LogEntry(LogEntry::default())).is_err());
    }
}
