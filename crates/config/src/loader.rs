use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::NaiaConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["naia.toml", "naia.yaml", "naia.yml", "naia.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<NaiaConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path).with_context(|| format!("failed to parse {}", path.display()))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./naia.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/naia/naia.{toml,yaml,yml,json}` (user-global)
///
/// With `dir_override`, only that directory is searched. Returns
/// `NaiaConfig::default()` if no config file is found or it fails to load.
pub fn discover_and_load(dir_override: Option<&Path>) -> NaiaConfig {
    let Some(path) = find_config_file(dir_override) else {
        debug!("no config file found, using defaults");
        return NaiaConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            NaiaConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file(dir_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = dir_override {
        // Override is set, don't fall through to other locations.
        return first_existing(dir);
    }

    first_existing(Path::new(".")).or_else(|| config_dir().and_then(|dir| first_existing(&dir)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns `~/.config/naia/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("naia"))
}

/// Returns the data directory: `~/.naia/` on all platforms.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".naia"))
        .unwrap_or_else(|| PathBuf::from(".naia"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<NaiaConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::CronConfig};

    #[test]
    fn defaults_when_nothing_is_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_config_file(Some(dir.path())), None);
        let config = discover_and_load(Some(dir.path()));
        assert_eq!(config, NaiaConfig::default());
        assert_eq!(config.gateway.request_timeout_ms, 30_000);
        assert!(config.cron.enabled);
        assert_eq!(config.cron.tick_ms, 1000);
    }

    #[test]
    fn loads_toml_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("naia.toml"),
            r#"
[gateway]
url = "ws://127.0.0.1:18789"
token = "${NAIA_SURELY_UNSET_TOKEN:-dev-token}"

[cron]
store_path = "/var/lib/naia/jobs.json"
"#,
        )
        .unwrap();

        let config = discover_and_load(Some(dir.path()));
        assert_eq!(config.gateway.url.as_deref(), Some("ws://127.0.0.1:18789"));
        assert_eq!(config.gateway.token.as_deref(), Some("dev-token"));
        assert_eq!(config.gateway.request_timeout_ms, 30_000);
        assert_eq!(
            config.cron.resolved_store_path(),
            PathBuf::from("/var/lib/naia/jobs.json")
        );
        assert_eq!(config.cron.tick_ms, 1000);
    }

    #[test]
    fn toml_wins_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("naia.yaml"), "cron:\n  tick_ms: 250\n").unwrap();
        assert_eq!(discover_and_load(Some(dir.path())).cron.tick_ms, 250);

        std::fs::write(dir.path().join("naia.toml"), "[cron]\ntick_ms = 500\n").unwrap();
        assert_eq!(
            find_config_file(Some(dir.path())),
            Some(dir.path().join("naia.toml"))
        );
        assert_eq!(discover_and_load(Some(dir.path())).cron.tick_ms, 500);
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("naia.json");
        std::fs::write(&path, r#"{"cron": {"enabled": false}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert!(!config.cron.enabled);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("naia.toml");
        std::fs::write(&path, "[gateway\nurl = ").unwrap();
        assert!(load_config(&path).is_err());
        assert_eq!(discover_and_load(Some(dir.path())), NaiaConfig::default());
    }

    #[test]
    fn default_store_lives_under_data_dir() {
        assert_eq!(
            CronConfig::default().resolved_store_path(),
            data_dir().join("cron").join("jobs.json")
        );
    }

    #[test]
    fn expands_home_prefix() {
        let expanded = expand_home(Path::new("~/jobs.json"));
        if let Some(home) = home_dir() {
            assert_eq!(expanded, home.join("jobs.json"));
        }
        assert_eq!(expand_home(Path::new("/abs/jobs.json")), PathBuf::from("/abs/jobs.json"));
    }
}
