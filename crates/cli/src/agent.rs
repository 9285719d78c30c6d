use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    naia_config::NaiaConfig,
    naia_cron::{CronScheduler, CronStore},
    naia_gateway::{ConnectOptions, EventSink, EventSinks, GatewayClient, JsonLineSink},
    tokio::sync::Mutex,
    tracing::{info, warn},
};

/// Run the scheduler and the gateway connection until Ctrl-C.
pub async fn run(config: NaiaConfig) -> Result<()> {
    let sink: Arc<dyn EventSink> = Arc::new(JsonLineSink::stdout());

    let scheduler = if config.cron.enabled {
        let path = config.cron.resolved_store_path();
        let store = CronStore::open(&path);
        info!(path = %path.display(), jobs = store.len(), "cron store opened");
        let scheduler = Arc::new(
            CronScheduler::new(Arc::new(Mutex::new(store)), Arc::clone(&sink))
                .with_tick(Duration::from_millis(config.cron.tick_ms.max(1))),
        );
        Some(scheduler.start())
    } else {
        info!("cron disabled");
        None
    };

    let client = match config.gateway.url.as_deref() {
        Some(url) => {
            let client = GatewayClient::builder(EventSinks::shared(Arc::clone(&sink)))
                .request_timeout(Duration::from_millis(config.gateway.request_timeout_ms))
                .build();
            let token = config.gateway.token.clone().unwrap_or_default();
            match client.connect(url, ConnectOptions::new(token)).await {
                Ok(()) => Some(client),
                Err(e) => {
                    warn!(url, error = %e, "gateway unavailable, running cron only");
                    None
                },
            }
        },
        None => {
            info!("no gateway url configured");
            None
        },
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    if let Some(client) = client {
        client.close().await;
    }
    Ok(())
}

/// Send one request and return its payload.
pub async fn call(
    config: &NaiaConfig,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    let url = config
        .gateway
        .url
        .as_deref()
        .context("gateway.url is not configured")?;
    // Keep stdout for the payload.
    let sink: Arc<dyn EventSink> = Arc::new(JsonLineSink::new(std::io::stderr()));
    let client = GatewayClient::builder(EventSinks::shared(sink))
        .request_timeout(Duration::from_millis(config.gateway.request_timeout_ms))
        .build();
    let token = config.gateway.token.clone().unwrap_or_default();
    client.connect(url, ConnectOptions::new(token)).await?;

    let result = client.request(method, params).await;
    client.close().await;
    Ok(result?)
}
