//! Data model shared by the probe, the reconciler and the loop
//!
//! Every value here lives for a single reconciliation cycle at most.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Default STUN port used when a server entry omits one
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Host label used for the apex record of a domain
pub const ROOT_RR: &str = "@";

/// A public address-discovery server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryServer {
    /// Host name or literal address of the server
    pub host: String,

    /// UDP port (defaults to 3478)
    #[serde(default = "default_stun_port")]
    pub port: u16,
}

impl DiscoveryServer {
    /// Create a server entry on the default STUN port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_STUN_PORT,
        }
    }

    /// Override the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse a `host` or `host:port` entry
    pub fn parse(entry: &str) -> crate::Result<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(crate::Error::invalid_input("empty discovery server entry"));
        }

        match entry.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    crate::Error::invalid_input(format!("invalid port in '{}'", entry))
                })?;
                if host.is_empty() {
                    return Err(crate::Error::invalid_input(format!(
                        "missing host in '{}'",
                        entry
                    )));
                }
                Ok(Self::new(host).with_port(port))
            }
            None => Ok(Self::new(entry)),
        }
    }
}

impl fmt::Display for DiscoveryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn default_stun_port() -> u16 {
    DEFAULT_STUN_PORT
}

/// DNS record type managed by this system
///
/// Only IPv4 address records are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    A,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state for one reconciliation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Fully-qualified host name that should resolve to `address`
    pub hostname: String,
    /// Record type, always `A`
    pub record_type: RecordType,
    /// Public address discovered this cycle
    pub address: Ipv4Addr,
}

impl Target {
    /// Build an `A` record target
    pub fn a_record(hostname: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            hostname: hostname.into(),
            record_type: RecordType::A,
            address,
        }
    }

    /// Dotted-quad form of the target address
    pub fn value(&self) -> String {
        self.address.to_string()
    }
}

/// A hostname split into provider host label and registrable domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedHostname {
    /// Host record label (`@` for the apex)
    pub rr: String,
    /// Domain the record lives under
    pub domain: String,
}

impl NormalizedHostname {
    /// Split a hostname into `(RR, domain)`
    ///
    /// A trailing dot is dropped first. Names with more than two labels use the
    /// first label as `RR` and the rest as the domain; shorter names map to the
    /// apex marker with the whole name as the domain.
    pub fn parse(hostname: &str) -> Self {
        let mut labels: Vec<&str> = hostname.split('.').collect();
        if labels.last() == Some(&"") {
            labels.pop();
        }

        if labels.len() > 2 {
            Self {
                rr: labels[0].to_string(),
                domain: labels[1..].join("."),
            }
        } else {
            Self {
                rr: ROOT_RR.to_string(),
                domain: labels.join("."),
            }
        }
    }

    /// Whether this is the apex record
    pub fn is_apex(&self) -> bool {
        self.rr == ROOT_RR
    }
}

impl fmt::Display for NormalizedHostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_apex() {
            f.write_str(&self.domain)
        } else {
            write!(f, "{}.{}", self.rr, self.domain)
        }
    }
}

/// A record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    /// Provider-assigned record identifier
    pub record_id: String,
    /// Host record label
    pub rr: String,
    /// Record type as a wire string (`A`, `CNAME`, ...)
    pub record_type: String,
    /// Record value
    pub value: String,
}
