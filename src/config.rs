//! Configuration loader and validator for the order sync service.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::LocalStatus;
use crate::reconcile::{ContractSetting, MappingRules, ReconcileOptions, StatusMapper};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub partner: Partner,
    #[serde(default)]
    pub server: Server,
    /// Partner status -> local status label, merged over the built-in table.
    #[serde(default)]
    pub status_map: BTreeMap<String, String>,
    #[serde(default = "default_cancelled_item_statuses")]
    pub cancelled_item_statuses: Vec<String>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Seconds between in-process reconciliation runs; 0 disables the poller.
    #[serde(default)]
    pub poll_interval_secs: u64,
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,
    #[serde(default = "default_fallback_offset")]
    pub fallback_utc_offset_minutes: i32,
}

/// Delivery-platform partner API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partner {
    #[serde(default = "default_partner_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub contract: ContractSetting,
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, `POST /pedidos/poll` requires a matching `X-Cron-Secret` header.
    #[serde(default)]
    pub poll_secret: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            poll_secret: None,
        }
    }
}

fn default_cancelled_item_statuses() -> Vec<String> {
    vec!["canceled".to_string()]
}

fn default_detail_concurrency() -> usize {
    1
}

fn default_fallback_offset() -> i32 {
    -180
}

fn default_partner_base_url() -> String {
    "https://integracao.cardapioweb.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the SQLite file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/pedidos.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address"))
    }

    pub fn partner_timeout(&self) -> Duration {
        Duration::from_secs(self.partner.timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.app.poll_interval_secs > 0).then(|| Duration::from_secs(self.app.poll_interval_secs))
    }

    /// Build the reconciler options described by this configuration.
    pub fn reconcile_options(&self) -> Result<ReconcileOptions, ConfigError> {
        let mut overrides = Vec::with_capacity(self.status_map.len());
        for (partner_status, label) in &self.status_map {
            let local = LocalStatus::parse_label(label)
                .ok_or(ConfigError::Invalid("status_map values must be local status labels"))?;
            overrides.push((partner_status.clone(), local));
        }
        Ok(ReconcileOptions {
            rules: MappingRules {
                status_mapper: StatusMapper::default().with_overrides(overrides.clone()),
                legacy_status_mapper: StatusMapper::legacy().with_overrides(overrides),
                cancelled_item_statuses: self.cancelled_item_statuses.clone(),
                fallback_utc_offset_minutes: self.app.fallback_utc_offset_minutes,
                contract: self.partner.contract,
            },
            detail_concurrency: self.app.detail_concurrency,
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.detail_concurrency == 0 {
        return Err(ConfigError::Invalid("app.detail_concurrency must be >= 1"));
    }
    if cfg.app.fallback_utc_offset_minutes.abs() >= 24 * 60 {
        return Err(ConfigError::Invalid(
            "app.fallback_utc_offset_minutes must be within one day",
        ));
    }

    if cfg.partner.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("partner.api_key must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.partner.base_url).is_err() {
        return Err(ConfigError::Invalid("partner.base_url must be an absolute URL"));
    }
    if cfg.partner.timeout_secs == 0 {
        return Err(ConfigError::Invalid("partner.timeout_secs must be > 0"));
    }

    cfg.bind_addr()?;
    if let Some(secret) = &cfg.server.poll_secret {
        if secret.trim().is_empty() {
            return Err(ConfigError::Invalid("server.poll_secret must be non-empty when set"));
        }
    }

    if cfg.cancelled_item_statuses.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Invalid("cancelled_item_statuses entries must be non-empty"));
    }
    cfg.reconcile_options()?;

    Ok(())
}

/// Returns the example YAML content shipped with the service.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_secs: 1800
  detail_concurrency: 1
  fallback_utc_offset_minutes: -180

partner:
  base_url: "https://integracao.cardapioweb.com"
  api_key: "YOUR_CARDAPIO_WEB_API_KEY"
  timeout_secs: 30
  contract: auto

server:
  bind: "127.0.0.1:8080"
  poll_secret: "change-this-secret"

status_map:
  canceled: "Cancelado"

cancelled_item_statuses:
  - canceled
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.partner.contract, ContractSetting::Auto);
        assert_eq!(cfg.poll_interval(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./data\npartner:\n  api_key: key\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.detail_concurrency, 1);
        assert_eq!(cfg.app.fallback_utc_offset_minutes, -180);
        assert_eq!(cfg.partner.timeout_secs, 30);
        assert_eq!(cfg.partner.base_url, "https://integracao.cardapioweb.com");
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.cancelled_item_statuses, vec!["canceled".to_string()]);
        assert!(cfg.poll_interval().is_none());
    }

    #[test]
    fn invalid_api_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.partner.api_key = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("partner.api_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_numbers_and_addresses() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.detail_concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.partner.timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.server.bind = "not-an-address".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("server.bind")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.partner.base_url = "integracao".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.fallback_utc_offset_minutes = 24 * 60;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn status_map_rejects_unknown_labels() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.status_map
            .insert("refunded".into(), "Reembolsado".into());
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("status_map")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn status_map_extends_builtin_table() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let options = cfg.reconcile_options().unwrap();
        assert_eq!(options.rules.status_mapper.map("canceled"), LocalStatus::Cancelado);
        assert_eq!(options.rules.status_mapper.map("closed"), LocalStatus::Finalizado);
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.server.poll_secret.as_deref(), Some("change-this-secret"));
    }
}
