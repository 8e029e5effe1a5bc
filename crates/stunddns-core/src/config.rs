//! Configuration types for the DDNS system
//!
//! The configuration is a plain value handed to [`crate::ReconciliationLoop::new`];
//! loading it from files or the environment is the daemon's job.

use serde::{Deserialize, Serialize};

use crate::model::DiscoveryServer;

/// Public STUN servers tried when no list is configured
pub const DEFAULT_DISCOVERY_SERVERS: &[&str] = &[
    "sip1.lakedestiny.cordiaip.com",
    "stun.callwithus.com",
    "stun.counterpath.net",
    "stun.ideasip.com",
    "stun.internetcalls.com",
    "stun.sipgate.net",
    "stun.stunprotocol.org",
    "stun.voip.aebc.com",
    "stun.voipbuster.com",
    "stun.voxgratia.org",
    "stun.xten.com",
];

/// Main DDNS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Hostname to keep pointed at the public address (e.g. "home.example.com")
    #[serde(default)]
    pub domain: String,

    /// DNS provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Address discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Loop settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Create a configuration for `domain` with default settings
    pub fn new(domain: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            domain: domain.into(),
            provider,
            discovery: DiscoveryConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domain.is_empty() {
            return Err(crate::Error::config("No domain configured"));
        }
        validate_hostname(&self.domain)?;

        self.provider.validate()?;
        self.discovery.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Validate that a string is a usable DNS hostname
///
/// Basic RFC 1035 checks; a single trailing dot is accepted.
pub fn validate_hostname(hostname: &str) -> Result<(), crate::Error> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);

    if name.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    if name.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            name.len(),
            name
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                hostname
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'. \
                 Valid: alphanumeric and hyphen only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// DNS provider configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Access key id
    #[serde(default)]
    pub access_key_id: String,

    /// Access key secret
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub access_key_secret: String,

    /// API endpoint override (defaults to the public endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// List records but only log intended mutations
    #[serde(default)]
    pub dry_run: bool,
}

impl ProviderConfig {
    /// Create provider credentials
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            endpoint: None,
            dry_run: false,
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.access_key_id.is_empty() {
            return Err(crate::Error::config("Provider access key id cannot be empty"));
        }
        if self.access_key_secret.is_empty() {
            return Err(crate::Error::config(
                "Provider access key secret cannot be empty",
            ));
        }
        if let Some(endpoint) = &self.endpoint
            && !endpoint.starts_with("https://")
            && !endpoint.starts_with("http://")
        {
            return Err(crate::Error::config(format!(
                "Provider endpoint must use HTTP or HTTPS scheme. Got: {}",
                endpoint
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Address discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Servers to try, in order unless `shuffle` is set
    #[serde(default = "default_servers")]
    pub servers: Vec<DiscoveryServer>,

    /// Upper bound on the wait for a single server (in seconds)
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Randomize the server order every cycle
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

impl DiscoveryConfig {
    /// Validate the discovery configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.servers.is_empty() {
            return Err(crate::Error::config("No discovery servers configured"));
        }
        for server in &self.servers {
            if server.host.is_empty() {
                return Err(crate::Error::config("Discovery server host cannot be empty"));
            }
            if server.port == 0 {
                return Err(crate::Error::config(format!(
                    "Discovery server {} has port 0",
                    server.host
                )));
            }
        }
        if self.attempt_timeout_secs == 0 {
            return Err(crate::Error::config("Discovery attempt timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            shuffle: default_shuffle(),
        }
    }
}

fn default_servers() -> Vec<DiscoveryServer> {
    DEFAULT_DISCOVERY_SERVERS
        .iter()
        .map(|host| DiscoveryServer::new(*host))
        .collect()
}

fn default_attempt_timeout_secs() -> u64 {
    5
}

fn default_shuffle() -> bool {
    true
}

/// Loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed delay between the end of one cycle and the start of the next (in seconds)
    ///
    /// The delay is the same after successes and failures.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Capacity of the outbound event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the loop configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Loop interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    600
}

fn default_event_channel_capacity() -> usize {
    1000
}
