//! Test doubles and common utilities for contract tests
//!
//! These doubles script collaborator behavior and count calls so tests can
//! assert on what the core did, not on how the collaborators work.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stunddns_core::error::Result;
use stunddns_core::traits::{
    DiscoveryClient, DiscoverySession, Mutation, ProviderClient, QueryResult, ResultCode,
};
use stunddns_core::{DdnsConfig, DiscoveryServer, Error, ProviderConfig, ProviderRecord};

/// How a scripted server answers
#[derive(Debug, Clone)]
pub enum ServerScript {
    /// Success with this mapped address
    Reflect(SocketAddr),
    /// Failure with this code
    Fail(ResultCode),
    /// Success code but no address
    SuccessWithoutAddress,
    /// Never answers
    Hang,
}

/// A discovery client whose servers answer from a script
#[derive(Clone, Default)]
pub struct ScriptedDiscoveryClient {
    scripts: Arc<Mutex<HashMap<String, ServerScript>>>,
    queried: Arc<Mutex<Vec<String>>>,
    open_count: Arc<AtomicUsize>,
    close_count: Arc<AtomicUsize>,
}

impl ScriptedDiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answer of `host`; unscripted hosts fail with a timeout code
    pub fn script(self, host: &str, script: ServerScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(host.to_string(), script);
        self
    }

    /// Hosts queried so far, in order
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

struct ScriptedSession {
    client: ScriptedDiscoveryClient,
}

#[async_trait::async_trait]
impl DiscoveryClient for ScriptedDiscoveryClient {
    async fn open(&self) -> Result<Box<dyn DiscoverySession>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            client: self.clone(),
        }))
    }

    fn protocol_name(&self) -> &'static str {
        "scripted"
    }
}

#[async_trait::async_trait]
impl DiscoverySession for ScriptedSession {
    async fn query(&mut self, server: &DiscoveryServer) -> QueryResult {
        self.client
            .queried
            .lock()
            .unwrap()
            .push(server.host.clone());

        let script = self.client.scripts.lock().unwrap().get(&server.host).cloned();
        match script {
            Some(ServerScript::Reflect(addr)) => QueryResult::success(addr),
            Some(ServerScript::Fail(code)) => QueryResult::failure(code),
            Some(ServerScript::SuccessWithoutAddress) => QueryResult {
                code: ResultCode::SUCCESS,
                mapped: None,
            },
            Some(ServerScript::Hang) => std::future::pending().await,
            None => QueryResult::failure(ResultCode::TIMEOUT),
        }
    }

    async fn close(self: Box<Self>) {
        self.client.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A discovery client that cannot open sessions at all
pub struct BrokenDiscoveryClient;

#[async_trait::async_trait]
impl DiscoveryClient for BrokenDiscoveryClient {
    async fn open(&self) -> Result<Box<dyn DiscoverySession>> {
        Err(Error::discovery("socket bind refused"))
    }

    fn protocol_name(&self) -> &'static str {
        "broken"
    }
}

/// How the provider answers list calls
#[derive(Debug, Clone)]
pub enum ListingScript {
    Records(Vec<ProviderRecord>),
    Malformed,
    TransportError,
}

/// A provider that serves a fixed listing and records mutations
#[derive(Clone)]
pub struct RecordingProvider {
    listing: Arc<Mutex<ListingScript>>,
    mutation_status: Arc<Mutex<u16>>,
    mutations: Arc<Mutex<Vec<Mutation>>>,
    listed_domains: Arc<Mutex<Vec<String>>>,
}

impl RecordingProvider {
    pub fn with_records(records: Vec<ProviderRecord>) -> Self {
        Self::with_listing(ListingScript::Records(records))
    }

    pub fn with_listing(listing: ListingScript) -> Self {
        Self {
            listing: Arc::new(Mutex::new(listing)),
            mutation_status: Arc::new(Mutex::new(200)),
            mutations: Arc::new(Mutex::new(Vec::new())),
            listed_domains: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Status returned by every mutation
    pub fn answering(self, status: u16) -> Self {
        *self.mutation_status.lock().unwrap() = status;
        self
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    pub fn listed_domains(&self) -> Vec<String> {
        self.listed_domains.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProviderClient for RecordingProvider {
    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>> {
        self.listed_domains.lock().unwrap().push(domain.to_string());
        match &*self.listing.lock().unwrap() {
            ListingScript::Records(records) => Ok(records.clone()),
            ListingScript::Malformed => Err(Error::malformed("missing DomainRecords")),
            ListingScript::TransportError => Err(Error::http("connection reset")),
        }
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<u16> {
        self.mutations.lock().unwrap().push(mutation.clone());
        Ok(*self.mutation_status.lock().unwrap())
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Build a provider record
pub fn record(id: &str, rr: &str, record_type: &str, value: &str) -> ProviderRecord {
    ProviderRecord {
        record_id: id.to_string(),
        rr: rr.to_string(),
        record_type: record_type.to_string(),
        value: value.to_string(),
    }
}

/// A mapped transport address for `ip`
pub fn mapped(ip: &str) -> SocketAddr {
    format!("{}:54321", ip).parse().unwrap()
}

/// Server entries for the given hosts, default port
pub fn servers(hosts: &[&str]) -> Vec<DiscoveryServer> {
    hosts.iter().map(|h| DiscoveryServer::new(*h)).collect()
}

/// Helper to create a minimal DdnsConfig for testing
pub fn minimal_config(domain: &str, hosts: &[&str]) -> DdnsConfig {
    let mut config = DdnsConfig::new(domain, ProviderConfig::new("test-key-id", "test-secret"));
    config.discovery.servers = servers(hosts);
    config.discovery.shuffle = false;
    config.discovery.attempt_timeout_secs = 1;
    config.engine.event_channel_capacity = 100;
    config
}
