//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces of the external collaborators.
//!
//! - [`DiscoveryClient`]: Learn the public address from a discovery server
//! - [`ProviderClient`]: List and mutate records at the DNS provider

pub mod discovery;
pub mod provider;

pub use discovery::{DiscoveryClient, DiscoverySession, QueryResult, ResultCode};
pub use provider::{MUTATION_OK, Mutation, MutationAction, ProviderClient};
