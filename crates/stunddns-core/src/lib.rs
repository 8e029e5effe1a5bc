// # stunddns-core
//
// Core library for the STUN-driven DDNS reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping one hostname
// pointed at the caller's public IPv4 address:
// - **AddressProbe**: Ordered-fallback public address discovery over a list of servers
// - **RecordReconciler**: Create / update / no-op decision against the DNS provider
// - **ReconciliationLoop**: Probe → reconcile → sleep, forever
// - **DiscoveryClient** / **ProviderClient**: Traits for the external collaborators
//
// ## Design Principles
//
// 1. **Stateless Cycles**: Every cycle re-derives truth from a fresh probe and a fresh listing
// 2. **Local Failure**: Probe and provider errors abort only the current cycle
// 3. **Explicit Configuration**: The config value is passed in, never read from globals
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod probe;
pub mod reconcile;
pub mod traits;

// Re-export core types for convenience
pub use config::{DdnsConfig, DiscoveryConfig, EngineConfig, ProviderConfig};
pub use engine::{CycleOutcome, EngineEvent, ReconciliationLoop};
pub use error::{Error, Result};
pub use model::{DiscoveryServer, NormalizedHostname, ProviderRecord, RecordType, Target};
pub use probe::{AddressProbe, ProbeOutcome};
pub use reconcile::{ReconcileOutcome, ReconciliationDecision, RecordReconciler};
pub use traits::{DiscoveryClient, DiscoverySession, ProviderClient};
