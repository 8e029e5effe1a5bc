// # STUN Discovery Client
//
// This crate provides the STUN Binding client used to learn the daemon's
// public IPv4 address.
//
// ## Architecture
//
// Each session owns one UDP socket bound to `0.0.0.0:0`. A query resolves the
// server to an IPv4 address, sends a Binding request and retransmits it with
// a doubling timeout until a matching response arrives or the transmissions
// run out. Every failure is folded into a `ResultCode`; moving on to the next
// server is the probe's job, not ours.

pub mod message;

use stunddns_core::DiscoveryServer;
use stunddns_core::Result;
use stunddns_core::traits::{DiscoveryClient, DiscoverySession, QueryResult, ResultCode};

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use message::{BindingResponse, MessageError, TransactionId, decode_response, encode_binding_request};

/// Initial retransmission timeout (RFC 5389 suggests 500ms)
const DEFAULT_RTO: Duration = Duration::from_millis(500);

/// Number of transmissions of one request
const DEFAULT_MAX_TRANSMISSIONS: u32 = 4;

/// Large enough for any Binding response we care about
const RECV_BUFFER_LEN: usize = 1024;

/// STUN Binding client
#[derive(Debug, Clone)]
pub struct StunClient {
    rto: Duration,
    max_transmissions: u32,
}

impl StunClient {
    /// Client with the default retransmission schedule
    pub fn new() -> Self {
        Self {
            rto: DEFAULT_RTO,
            max_transmissions: DEFAULT_MAX_TRANSMISSIONS,
        }
    }

    /// Override the retransmission schedule
    ///
    /// The wait after transmission `n` is `rto * 2^n`.
    pub fn with_retransmission(mut self, rto: Duration, max_transmissions: u32) -> Self {
        self.rto = rto;
        self.max_transmissions = max_transmissions.max(1);
        self
    }
}

impl Default for StunClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryClient for StunClient {
    async fn open(&self) -> Result<Box<dyn DiscoverySession>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        tracing::trace!("STUN session bound to {:?}", socket.local_addr());

        Ok(Box::new(StunSession {
            socket,
            rto: self.rto,
            max_transmissions: self.max_transmissions,
        }))
    }

    fn protocol_name(&self) -> &'static str {
        "stun"
    }
}

/// One UDP socket, used for a single server
pub struct StunSession {
    socket: UdpSocket,
    rto: Duration,
    max_transmissions: u32,
}

impl StunSession {
    /// Wait for a response to `transaction_id` from `target` until `deadline`
    ///
    /// Returns `None` when the deadline passes, so the caller can retransmit.
    async fn await_response(
        &self,
        target: SocketAddr,
        transaction_id: &TransactionId,
        deadline: Instant,
    ) -> Option<QueryResult> {
        let mut buf = [0u8; RECV_BUFFER_LEN];

        loop {
            let received =
                match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Err(_) => return None,
                    Ok(received) => received,
                };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!("STUN receive from {} failed: {}", target, e);
                    return Some(QueryResult::failure(ResultCode::TRANSPORT));
                }
            };

            if from != target {
                tracing::trace!("Ignoring datagram from unexpected peer {}", from);
                continue;
            }

            match decode_response(&buf[..len], transaction_id) {
                Ok(BindingResponse::Success { mapped }) => {
                    return Some(QueryResult {
                        code: ResultCode::SUCCESS,
                        mapped,
                    });
                }
                Ok(BindingResponse::Error { code, reason }) => {
                    tracing::debug!("STUN error response from {}: {} {}", target, code, reason);
                    return Some(QueryResult::failure(ResultCode::ERROR_RESPONSE));
                }
                // Late answer to an earlier request, keep waiting
                Err(MessageError::TransactionMismatch) => continue,
                Err(e) => {
                    tracing::debug!("Undecodable STUN response from {}: {}", target, e);
                    return Some(QueryResult::failure(ResultCode::MALFORMED));
                }
            }
        }
    }
}

#[async_trait]
impl DiscoverySession for StunSession {
    async fn query(&mut self, server: &DiscoveryServer) -> QueryResult {
        let Some(target) = resolve_ipv4(server).await else {
            return QueryResult::failure(ResultCode::RESOLVE_FAILED);
        };

        let transaction_id: TransactionId = rand::random();
        let request = encode_binding_request(&transaction_id);
        let mut wait = self.rto;

        for transmission in 0..self.max_transmissions {
            if let Err(e) = self.socket.send_to(&request, target).await {
                tracing::debug!("STUN send to {} failed: {}", target, e);
                return QueryResult::failure(ResultCode::TRANSPORT);
            }
            tracing::trace!(
                "Binding request #{} to {} ({}), waiting {:?}",
                transmission + 1,
                server,
                target,
                wait
            );

            let deadline = Instant::now() + wait;
            if let Some(result) = self.await_response(target, &transaction_id, deadline).await {
                return result;
            }
            wait *= 2;
        }

        QueryResult::failure(ResultCode::TIMEOUT)
    }

    async fn close(self: Box<Self>) {
        // Dropping the socket releases it.
        tracing::trace!("STUN session closed");
    }
}

/// Resolve `server` to its first IPv4 socket address
async fn resolve_ipv4(server: &DiscoveryServer) -> Option<SocketAddr> {
    match tokio::net::lookup_host((server.host.as_str(), server.port)).await {
        Ok(mut addrs) => {
            let found = addrs.find(SocketAddr::is_ipv4);
            if found.is_none() {
                tracing::debug!("{} has no IPv4 address", server);
            }
            found
        }
        Err(e) => {
            tracing::debug!("Failed to resolve {}: {}", server, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::{response, xor_mapped_v4};
    use crate::message::{ATTR_ERROR_CODE, BINDING_ERROR, BINDING_SUCCESS, HEADER_LEN};

    /// Local responder answering each request via `answer`
    async fn responder<F>(answer: F) -> (DiscoveryServer, tokio::task::JoinHandle<()>)
    where
        F: Fn(TransactionId, SocketAddr, usize) -> Option<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let mut seen = 0;
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if len < HEADER_LEN {
                    continue;
                }
                seen += 1;
                let mut tid = [0u8; 12];
                tid.copy_from_slice(&buf[8..20]);
                if let Some(reply) = answer(tid, from, seen) {
                    let _ = socket.send_to(&reply, from).await;
                }
            }
        });

        (DiscoveryServer::new("127.0.0.1").with_port(port), handle)
    }

    fn fast_client() -> StunClient {
        StunClient::new().with_retransmission(Duration::from_millis(20), 3)
    }

    #[tokio::test]
    async fn test_query_reflects_source_address() {
        let (server, handle) = responder(|tid, from, _| {
            Some(response(
                BINDING_SUCCESS,
                &tid,
                &[(message::ATTR_XOR_MAPPED_ADDRESS, xor_mapped_v4(from))],
            ))
        })
        .await;

        let mut session = fast_client().open().await.unwrap();
        let result = session.query(&server).await;
        session.close().await;
        handle.abort();

        assert_eq!(result.code, ResultCode::SUCCESS);
        let mapped = result.mapped.unwrap();
        assert_eq!(mapped.ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_retransmits_until_answered() {
        // Drop the first two requests.
        let (server, handle) = responder(|tid, from, seen| {
            (seen >= 3).then(|| {
                response(
                    BINDING_SUCCESS,
                    &tid,
                    &[(message::ATTR_XOR_MAPPED_ADDRESS, xor_mapped_v4(from))],
                )
            })
        })
        .await;

        let mut session = fast_client().open().await.unwrap();
        let result = session.query(&server).await;
        handle.abort();

        assert!(result.code.is_success());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (server, handle) = responder(|_, _, _| None).await;

        let mut session = fast_client().open().await.unwrap();
        let result = session.query(&server).await;
        handle.abort();

        assert_eq!(result, QueryResult::failure(ResultCode::TIMEOUT));
    }

    #[tokio::test]
    async fn test_error_response_is_a_failure() {
        let (server, handle) = responder(|tid, _, _| {
            Some(response(
                BINDING_ERROR,
                &tid,
                &[(ATTR_ERROR_CODE, vec![0, 0, 5, 0, b'x'])],
            ))
        })
        .await;

        let mut session = fast_client().open().await.unwrap();
        let result = session.query(&server).await;
        handle.abort();

        assert_eq!(result, QueryResult::failure(ResultCode::ERROR_RESPONSE));
    }

    #[tokio::test]
    async fn test_foreign_transaction_is_ignored() {
        let (server, handle) = responder(|tid, from, seen| {
            let reply_tid = if seen == 1 { [0xAA; 12] } else { tid };
            Some(response(
                BINDING_SUCCESS,
                &reply_tid,
                &[(message::ATTR_XOR_MAPPED_ADDRESS, xor_mapped_v4(from))],
            ))
        })
        .await;

        let mut session = fast_client().open().await.unwrap();
        let result = session.query(&server).await;
        handle.abort();

        assert!(result.code.is_success(), "retransmission gets a matching answer");
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let server = DiscoveryServer::new("stun.invalid");
        let mut session = fast_client().open().await.unwrap();

        let result = session.query(&server).await;
        assert_eq!(result, QueryResult::failure(ResultCode::RESOLVE_FAILED));
    }

    #[test]
    fn test_retransmission_floor() {
        let client = StunClient::new().with_retransmission(Duration::from_millis(1), 0);
        assert_eq!(client.max_transmissions, 1);
    }
}
