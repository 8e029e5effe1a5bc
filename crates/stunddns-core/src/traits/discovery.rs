// # Discovery Client Trait
//
// Defines the interface for the address-discovery protocol used to learn the
// caller's public IPv4 address.
//
// ## Implementations
//
// - STUN (RFC 5389 Binding): `stunddns-stun` crate
//
// ## Usage
//
// ```rust,ignore
// use stunddns_core::traits::DiscoveryClient;
// use stunddns_core::DiscoveryServer;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let client = /* DiscoveryClient implementation */;
//
//     let mut session = client.open().await?;
//     let result = session.query(&DiscoveryServer::new("stun.example.net")).await;
//     session.close().await;
//
//     println!("{:?}", result.mapped);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::model::DiscoveryServer;

/// Status of one discovery query
///
/// Zero is success, anything else is a failure for that server only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u8);

impl ResultCode {
    /// The server reflected our address
    pub const SUCCESS: ResultCode = ResultCode(0);
    /// The server host name could not be resolved to an IPv4 address
    pub const RESOLVE_FAILED: ResultCode = ResultCode(1);
    /// The request could not be sent or the response could not be received
    pub const TRANSPORT: ResultCode = ResultCode(2);
    /// The server never answered
    pub const TIMEOUT: ResultCode = ResultCode(3);
    /// The server answered with an error response
    pub const ERROR_RESPONSE: ResultCode = ResultCode(4);
    /// The server answered with something we could not decode
    pub const MALFORMED: ResultCode = ResultCode(5);

    /// Whether this code means success
    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single query against one server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    /// Protocol status
    pub code: ResultCode,
    /// Transport address the server observed, if it reported one
    pub mapped: Option<SocketAddr>,
}

impl QueryResult {
    /// A successful query carrying the reflected address
    pub fn success(mapped: SocketAddr) -> Self {
        Self {
            code: ResultCode::SUCCESS,
            mapped: Some(mapped),
        }
    }

    /// A failed query
    pub fn failure(code: ResultCode) -> Self {
        Self { code, mapped: None }
    }
}

/// Trait for address-discovery protocol clients
///
/// A client hands out sessions; each session is used for exactly one server
/// and must be closed before the next server is tried.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Open sockets and exchange datagrams with the given server
/// - ✅ Retransmit within a single query as the protocol prescribes
///
/// ## Forbidden Capabilities
/// - ❌ Move on to another server (owned by `AddressProbe`)
/// - ❌ Talk to the DNS provider
/// - ❌ Keep sessions alive across cycles
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Open a fresh client session
    async fn open(&self) -> Result<Box<dyn DiscoverySession>, crate::Error>;

    /// Protocol name (for logging)
    fn protocol_name(&self) -> &'static str;
}

/// A single-use discovery session
#[async_trait]
pub trait DiscoverySession: Send {
    /// Ask `server` to reflect the transport address it sees us from
    ///
    /// Never fails with an error: every failure is folded into a non-zero
    /// [`ResultCode`].
    async fn query(&mut self, server: &DiscoveryServer) -> QueryResult;

    /// Release the session's resources
    async fn close(self: Box<Self>);
}
