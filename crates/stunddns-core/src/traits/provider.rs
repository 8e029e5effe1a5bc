// # Provider Client Trait
//
// Defines the interface to the remote DNS management service.
//
// The provider exposes exactly two primitives: list the records of a domain,
// and create or update one record. There is no transaction spanning the two,
// so a decision made from a listing can be stale by the time the mutation
// lands if someone else edits the record in between.
//
// ## Implementations
//
// - Alibaba Cloud DNS: `stunddns-provider-alidns` crate

use async_trait::async_trait;

use crate::model::{ProviderRecord, RecordType};

/// HTTP status the provider answers a successful mutation with
pub const MUTATION_OK: u16 = 200;

/// Which mutation to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationAction {
    /// Add a new record
    Create,
    /// Overwrite an existing record
    Update {
        /// Provider id of the record being overwritten
        record_id: String,
    },
}

/// Logical parameters of a create/update call
///
/// Request signing and path construction are left to the provider client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Create or update
    pub action: MutationAction,
    /// Domain the record belongs to
    pub domain: String,
    /// Host record label
    pub rr: String,
    /// Record type
    pub record_type: RecordType,
    /// New record value
    pub value: String,
}

impl Mutation {
    /// Record id for updates, `None` for creates
    pub fn record_id(&self) -> Option<&str> {
        match &self.action {
            MutationAction::Create => None,
            MutationAction::Update { record_id } => Some(record_id),
        }
    }
}

/// Trait for DNS provider clients
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Sign requests and parse provider-specific responses
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (the next scheduled cycle is the retry)
/// - ❌ Decide whether a mutation is needed (owned by `RecordReconciler`)
/// - ❌ Cache listings between calls
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// List every record of `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(records)`: the provider's records, in provider order
    /// - `Err(Error::MalformedResponse)`: the payload had no records collection
    /// - `Err(_)`: transport or authentication failure
    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>, crate::Error>;

    /// Issue one create/update request
    ///
    /// # Returns
    ///
    /// The HTTP status the provider answered with. Anything other than
    /// [`MUTATION_OK`] is a failed mutation; interpreting it is the caller's job.
    async fn mutate(&self, mutation: &Mutation) -> Result<u16, crate::Error>;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}
