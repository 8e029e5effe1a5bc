//! Reconciliation loop
//!
//! The ReconciliationLoop is responsible for:
//! - Probing the public address via AddressProbe
//! - Reconciling the configured hostname via RecordReconciler
//! - Sleeping a fixed interval between cycles
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────┐   address   ┌──────────────────┐
//!   ┌───▶│ AddressProbe │────────────▶│ RecordReconciler │
//!   │    └──────────────┘             └──────────────────┘
//!   │           │ exhausted                    │ outcome
//!   │           ▼                              ▼
//!   │    ┌──────────────────────────────────────────┐
//!   └────│           Sleeping (fixed interval)      │
//!        └──────────────────────────────────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Shuffle the discovery servers and probe
//! 2. On failure, skip to sleep
//! 3. Build the target and reconcile
//! 4. Log the outcome (errors never stop the loop)
//! 5. Sleep, then start over
//!
//! Exactly one cycle is in flight at a time. The shutdown signal is checked
//! between suspend points and while sleeping; provider calls already under way
//! are allowed to finish.

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{DdnsConfig, DiscoveryConfig};
use crate::error::Result;
use crate::model::Target;
use crate::probe::{AddressProbe, ProbeOutcome, shuffled};
use crate::reconcile::{ReconcileOutcome, RecordReconciler};
use crate::traits::{DiscoveryClient, ProviderClient};

/// Events emitted by the ReconciliationLoop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Loop started
    Started {
        hostname: String,
    },

    /// A new cycle began
    CycleStarted {
        cycle: u64,
    },

    /// The probe found the public address
    AddressDiscovered {
        address: Ipv4Addr,
        server: String,
    },

    /// Every discovery server failed
    ProbeExhausted {
        attempts: usize,
    },

    /// Record did not exist and was created
    RecordCreated {
        hostname: String,
        address: Ipv4Addr,
    },

    /// Record existed with another value and was updated
    RecordUpdated {
        hostname: String,
        address: Ipv4Addr,
        previous_value: String,
    },

    /// Record already had the right value
    RecordUnchanged {
        hostname: String,
        address: Ipv4Addr,
    },

    /// Provider listing was unusable, nothing was mutated
    CycleAbandoned {
        hostname: String,
        reason: String,
    },

    /// Reconciliation failed
    UpdateFailed {
        hostname: String,
        error: String,
    },

    /// Loop stopped
    Stopped {
        reason: String,
    },
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No discovery server produced an address
    ProbeExhausted,
    /// Reconciliation ran to completion
    Reconciled(ReconcileOutcome),
    /// The provider listing was unusable
    Abandoned(String),
    /// The provider rejected the mutation or could not be reached
    Failed(String),
}

/// Explicit loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Probing,
    Reconciling(Ipv4Addr),
    Sleeping,
    Stopping,
}

/// Core reconciliation loop
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationLoop::new()`]
/// 2. Start with [`ReconciliationLoop::run()`]
/// 3. Loop runs until a shutdown signal is received
///
/// There is no state carried between cycles: every cycle probes afresh and
/// re-reads the provider.
pub struct ReconciliationLoop {
    /// Address probe
    probe: AddressProbe,

    /// Record reconciler
    reconciler: RecordReconciler,

    /// Hostname to keep up to date
    hostname: String,

    /// Discovery settings (server list, shuffle)
    discovery: DiscoveryConfig,

    /// Delay between cycles
    interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconciliationLoop {
    /// Create a new loop
    ///
    /// # Parameters
    ///
    /// - `discovery_client`: address discovery protocol implementation
    /// - `provider`: DNS provider client
    /// - `config`: validated configuration
    ///
    /// # Returns
    ///
    /// A tuple of (loop, event_receiver) where event_receiver yields loop events
    pub fn new(
        discovery_client: Box<dyn DiscoveryClient>,
        provider: Box<dyn ProviderClient>,
        config: DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            probe: AddressProbe::new(
                discovery_client,
                Duration::from_secs(config.discovery.attempt_timeout_secs),
            ),
            reconciler: RecordReconciler::new(provider),
            hostname: config.domain,
            discovery: config.discovery,
            interval: Duration::from_secs(config.engine.interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the loop until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = watch::channel(false);

        let listener = async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(true);
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = self.run_with_shutdown(rx) => result,
            () = listener => Ok(()),
        }
    }

    /// Run the loop until `shutdown` turns `true` (or its sender is dropped)
    pub async fn run_with_shutdown(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            hostname: self.hostname.clone(),
        });
        info!(
            "Reconciling {} every {:?} via {}",
            self.hostname,
            self.interval,
            self.reconciler.provider_name()
        );

        let mut cycle: u64 = 0;
        let mut state = LoopState::Probing;

        loop {
            if *shutdown.borrow() {
                break;
            }

            state = match state {
                LoopState::Probing => {
                    cycle += 1;
                    self.emit_event(EngineEvent::CycleStarted { cycle });
                    match self.probe_once().await {
                        Some(address) => LoopState::Reconciling(address),
                        None => LoopState::Sleeping,
                    }
                }
                LoopState::Reconciling(address) => {
                    self.reconcile_once(address).await;
                    LoopState::Sleeping
                }
                LoopState::Sleeping => {
                    debug!("Sleeping {:?} before next cycle", self.interval);
                    let sleep = tokio::time::sleep(self.interval);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            _ = &mut sleep => break LoopState::Probing,
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break LoopState::Stopping;
                                }
                            }
                        }
                    }
                }
                LoopState::Stopping => break,
            };
        }

        info!("Shutdown signal received");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Run one probe-then-reconcile cycle without sleeping
    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.probe_once().await {
            Some(address) => self.reconcile_once(address).await,
            None => CycleOutcome::ProbeExhausted,
        }
    }

    /// Probe over a freshly ordered server list
    async fn probe_once(&self) -> Option<Ipv4Addr> {
        let servers = if self.discovery.shuffle {
            shuffled(&self.discovery.servers)
        } else {
            self.discovery.servers.clone()
        };

        match self.probe.discover(&servers).await {
            ProbeOutcome::Success {
                external_address,
                server,
            } => {
                self.emit_event(EngineEvent::AddressDiscovered {
                    address: external_address,
                    server: server.to_string(),
                });
                Some(external_address)
            }
            ProbeOutcome::Failure { attempts } => {
                warn!("Public address probe exhausted, skipping this cycle");
                self.emit_event(EngineEvent::ProbeExhausted { attempts });
                None
            }
        }
    }

    /// Reconcile the configured hostname against `address`
    async fn reconcile_once(&self, address: Ipv4Addr) -> CycleOutcome {
        let target = Target::a_record(self.hostname.clone(), address);

        match self.reconciler.reconcile(&target).await {
            Ok(outcome) => {
                let event = match &outcome {
                    ReconcileOutcome::Created => EngineEvent::RecordCreated {
                        hostname: target.hostname.clone(),
                        address,
                    },
                    ReconcileOutcome::Updated { previous_value, .. } => {
                        EngineEvent::RecordUpdated {
                            hostname: target.hostname.clone(),
                            address,
                            previous_value: previous_value.clone(),
                        }
                    }
                    ReconcileOutcome::NoChange => EngineEvent::RecordUnchanged {
                        hostname: target.hostname.clone(),
                        address,
                    },
                };
                self.emit_event(event);
                CycleOutcome::Reconciled(outcome)
            }
            Err(e) if e.is_malformed_response() => {
                warn!("Cycle abandoned for {}: {}", target.hostname, e);
                self.emit_event(EngineEvent::CycleAbandoned {
                    hostname: target.hostname,
                    reason: e.to_string(),
                });
                CycleOutcome::Abandoned(e.to_string())
            }
            Err(e) => {
                error!("Failed to reconcile {}: {}", target.hostname, e);
                self.emit_event(EngineEvent::UpdateFailed {
                    hostname: target.hostname,
                    error: e.to_string(),
                });
                CycleOutcome::Failed(e.to_string())
            }
        }
    }

    /// Emit a loop event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
