//! Three-way DNS reconciliation
//!
//! Given a [`Target`], the reconciler lists the provider's records for the
//! target's domain, decides between create, update and no-op, and issues at
//! most one mutation.
//!
//! ## Staleness
//!
//! The list and the mutation are two independent provider calls. A concurrent
//! edit between them can make the decision stale (a duplicate create, or an
//! update of a record that was changed or deleted). The provider offers no
//! compare-and-swap, so this is left to the next cycle to correct.

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{NormalizedHostname, ProviderRecord, Target};
use crate::traits::{MUTATION_OK, Mutation, MutationAction, ProviderClient};

/// What a reconciliation decided to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationDecision {
    /// The record already carries the target value
    NoOp,
    /// No record exists for the RR and type
    Create,
    /// A record exists with a different value
    Update {
        /// Record to overwrite
        record_id: String,
        /// Value the record had before
        previous_value: String,
    },
}

/// Successful reconciliation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new record was added
    Created,
    /// An existing record was overwritten
    Updated {
        /// Provider id of the updated record
        record_id: String,
        /// Value before the update
        previous_value: String,
    },
    /// Nothing to do
    NoChange,
}

/// Decide the minimal mutation for a record listing
///
/// Records are matched on exact `rr` and `record_type`. When several matching
/// records differ from `value`, the last one wins.
pub fn decide(
    records: &[ProviderRecord],
    rr: &str,
    record_type: &str,
    value: &str,
) -> ReconciliationDecision {
    let mut matched = false;
    let mut decision = ReconciliationDecision::NoOp;

    for record in records
        .iter()
        .filter(|r| r.rr == rr && r.record_type == record_type)
    {
        matched = true;
        if record.value != value {
            decision = ReconciliationDecision::Update {
                record_id: record.record_id.clone(),
                previous_value: record.value.clone(),
            };
        }
    }

    if matched {
        decision
    } else {
        ReconciliationDecision::Create
    }
}

/// Reconciles one hostname against the provider
pub struct RecordReconciler {
    /// Provider client
    provider: Box<dyn ProviderClient>,
}

impl RecordReconciler {
    /// Create a reconciler over `provider`
    pub fn new(provider: Box<dyn ProviderClient>) -> Self {
        Self { provider }
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Make the provider's record for `target` match it
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileOutcome)`: created, updated or already correct
    /// - `Err(Error::MalformedResponse)`: the listing was unusable, nothing was mutated
    /// - `Err(Error::MutationFailed)`: the provider rejected the create/update
    /// - `Err(_)`: transport failure talking to the provider
    ///
    /// Never retries; the next scheduled cycle re-derives the decision.
    pub async fn reconcile(&self, target: &Target) -> Result<ReconcileOutcome> {
        let name = NormalizedHostname::parse(&target.hostname);
        let value = target.value();
        let record_type = target.record_type;

        let records = match self.provider.list_records(&name.domain).await {
            Ok(records) => records,
            Err(e) if e.is_malformed_response() => {
                warn!(
                    "Unusable record listing for {} from {}: {}",
                    name.domain,
                    self.provider.provider_name(),
                    e
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let decision = decide(&records, &name.rr, record_type.as_str(), &value);
        debug!(
            "Reconciling {} (RR={}, domain={}, type={}) -> {}: {:?}",
            target.hostname, name.rr, name.domain, record_type, value, decision
        );

        let action = match &decision {
            ReconciliationDecision::NoOp => {
                info!("Record {} already points at {}", name, value);
                return Ok(ReconcileOutcome::NoChange);
            }
            ReconciliationDecision::Create => MutationAction::Create,
            ReconciliationDecision::Update { record_id, .. } => MutationAction::Update {
                record_id: record_id.clone(),
            },
        };

        let mutation = Mutation {
            action,
            domain: name.domain.clone(),
            rr: name.rr.clone(),
            record_type,
            value: value.clone(),
        };

        let status = self.provider.mutate(&mutation).await?;
        if status != MUTATION_OK {
            error!(
                "Provider {} rejected {:?} of {} -> {} with status {}",
                self.provider.provider_name(),
                mutation.action,
                name,
                value,
                status
            );
            return Err(Error::mutation_failed(status));
        }

        match decision {
            ReconciliationDecision::Create => {
                info!("Created record {} -> {}", name, value);
                Ok(ReconcileOutcome::Created)
            }
            ReconciliationDecision::Update {
                record_id,
                previous_value,
            } => {
                info!(
                    "Updated record {} -> {} (was: {}, id: {})",
                    name, value, previous_value, record_id
                );
                Ok(ReconcileOutcome::Updated {
                    record_id,
                    previous_value,
                })
            }
            ReconciliationDecision::NoOp => Ok(ReconcileOutcome::NoChange),
        }
    }
}
