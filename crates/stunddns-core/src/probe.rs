//! Ordered-fallback public address discovery
//!
//! [`AddressProbe::discover`] walks a server list in order, one session per
//! server, and stops at the first server that reflects an IPv4 address. A
//! failing server only costs its own attempt; there is no retry of the same
//! server within a cycle.

use rand::seq::SliceRandom;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::model::DiscoveryServer;
use crate::traits::{DiscoveryClient, QueryResult, ResultCode};

/// Result of one `discover` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A server reflected our public address
    Success {
        /// The external IPv4 address
        external_address: Ipv4Addr,
        /// Server that answered
        server: DiscoveryServer,
    },
    /// Every server was tried and none produced an address
    Failure {
        /// Number of servers attempted
        attempts: usize,
    },
}

impl ProbeOutcome {
    /// The discovered address, if any
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            ProbeOutcome::Success {
                external_address, ..
            } => Some(*external_address),
            ProbeOutcome::Failure { .. } => None,
        }
    }
}

/// Return a copy of `servers` in random order
///
/// Callers shuffle once per cycle so the same server is not hit first every time.
pub fn shuffled(servers: &[DiscoveryServer]) -> Vec<DiscoveryServer> {
    let mut servers = servers.to_vec();
    servers.shuffle(&mut rand::thread_rng());
    servers
}

/// Public address probe over a discovery protocol client
pub struct AddressProbe {
    /// Protocol client used to open one session per server
    client: Box<dyn DiscoveryClient>,

    /// Upper bound on a single server attempt
    attempt_timeout: Duration,
}

impl AddressProbe {
    /// Create a probe
    ///
    /// # Parameters
    ///
    /// - `client`: discovery protocol implementation
    /// - `attempt_timeout`: how long one server may take before it counts as failed
    pub fn new(client: Box<dyn DiscoveryClient>, attempt_timeout: Duration) -> Self {
        Self {
            client,
            attempt_timeout,
        }
    }

    /// Try each server in order until one yields the external address
    pub async fn discover(&self, servers: &[DiscoveryServer]) -> ProbeOutcome {
        let total = servers.len();

        for (index, server) in servers.iter().enumerate() {
            let attempt = index + 1;

            let result = self.attempt(server).await;
            match extract_ipv4(&result) {
                Some(external_address) => {
                    info!(
                        "[{}-{}] Success({}): mapped={} via {}",
                        total,
                        attempt,
                        result.code,
                        result
                            .mapped
                            .map(|m| m.to_string())
                            .unwrap_or_default(),
                        server
                    );
                    return ProbeOutcome::Success {
                        external_address,
                        server: server.clone(),
                    };
                }
                None => {
                    warn!(
                        "[{}-{}] Fail({}): {}",
                        total, attempt, result.code, server
                    );
                }
            }
        }

        warn!(
            "Address discovery failed: all {} {} server(s) exhausted",
            total,
            self.client.protocol_name()
        );
        ProbeOutcome::Failure { attempts: total }
    }

    /// Run one query against `server`, always closing the session afterwards
    async fn attempt(&self, server: &DiscoveryServer) -> QueryResult {
        let mut session = match self.client.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to open {} session: {}", self.client.protocol_name(), e);
                return QueryResult::failure(ResultCode::TRANSPORT);
            }
        };

        let result = match tokio::time::timeout(self.attempt_timeout, session.query(server)).await
        {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    "Server {} did not answer within {:?}",
                    server, self.attempt_timeout
                );
                QueryResult::failure(ResultCode::TIMEOUT)
            }
        };

        session.close().await;
        result
    }
}

/// A success code without a usable IPv4 mapping counts as failure
fn extract_ipv4(result: &QueryResult) -> Option<Ipv4Addr> {
    if !result.code.is_success() {
        return None;
    }
    match result.mapped?.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    }
}
