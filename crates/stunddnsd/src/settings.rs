// # Daemon settings
//
// An optional JSON file (`DDNS_CONFIG_FILE`) supplies the base configuration;
// `DDNS_*` environment variables override individual keys on top of it.
//
// ### Provider
// - `DDNS_DOMAIN`: Hostname to keep updated (e.g. home.example.com)
// - `DDNS_ACCESS_KEY_ID`: Alidns access key id
// - `DDNS_ACCESS_KEY_SECRET`: Alidns access key secret
// - `DDNS_ALIDNS_ENDPOINT`: API endpoint override (optional)
// - `DDNS_MODE`: `dry-run` to log mutations instead of sending them
//
// ### Discovery
// - `DDNS_STUN_SERVERS`: Comma-separated `host[:port]` list
// - `DDNS_PROBE_TIMEOUT_SECS`: Per-server timeout
//
// ### Loop
// - `DDNS_INTERVAL_SECS`: Delay between cycles
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;

use stunddns_core::{DdnsConfig, DiscoveryServer};

/// Everything the daemon needs to start
#[derive(Debug, Clone)]
pub struct Settings {
    pub ddns: DdnsConfig,
    pub log_level: String,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut ddns = match var("DDNS_CONFIG_FILE") {
            Some(path) => load_file(Path::new(&path))?,
            None => DdnsConfig::default(),
        };

        if let Some(domain) = var("DDNS_DOMAIN") {
            ddns.domain = domain.trim().to_string();
        }
        if let Some(id) = var("DDNS_ACCESS_KEY_ID") {
            ddns.provider.access_key_id = id;
        }
        if let Some(secret) = var("DDNS_ACCESS_KEY_SECRET") {
            ddns.provider.access_key_secret = secret;
        }
        if let Some(endpoint) = var("DDNS_ALIDNS_ENDPOINT") {
            ddns.provider.endpoint = Some(endpoint);
        }
        if let Some(mode) = var("DDNS_MODE") {
            ddns.provider.dry_run = mode.eq_ignore_ascii_case("dry-run");
        }
        if let Some(list) = var("DDNS_STUN_SERVERS") {
            ddns.discovery.servers = parse_servers(&list)?;
        }
        if let Some(value) = var("DDNS_PROBE_TIMEOUT_SECS") {
            ddns.discovery.attempt_timeout_secs = parse_secs("DDNS_PROBE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("DDNS_INTERVAL_SECS") {
            ddns.engine.interval_secs = parse_secs("DDNS_INTERVAL_SECS", &value)?;
        }

        Ok(Self {
            ddns,
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.ddns.domain.is_empty() {
            anyhow::bail!(
                "DDNS_DOMAIN is required. \
                Set it via: export DDNS_DOMAIN=home.example.com"
            );
        }
        if self.ddns.provider.access_key_id.is_empty()
            || self.ddns.provider.access_key_secret.is_empty()
        {
            anyhow::bail!(
                "DDNS_ACCESS_KEY_ID and DDNS_ACCESS_KEY_SECRET are required. \
                Create an access key with AliyunDNSFullAccess and export both."
            );
        }

        self.ddns
            .validate()
            .context("Configuration validation failed")?;

        self.level()?;
        Ok(())
    }

    /// Tracing level from `log_level`
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn load_file(path: &Path) -> Result<DdnsConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read DDNS_CONFIG_FILE {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in DDNS_CONFIG_FILE {}", path.display()))
}

fn parse_servers(list: &str) -> Result<Vec<DiscoveryServer>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            DiscoveryServer::parse(entry)
                .with_context(|| format!("Invalid entry in DDNS_STUN_SERVERS: '{}'", entry))
        })
        .collect()
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds. Got: '{}'", key, value))
}
