//! Round-robin reconciler
//!
//! The Reconciler is responsible for:
//! - Gating candidate addresses through the health filter
//! - Comparing the healthy desired set with what the zone publishes
//! - Applying additions and removals through the zone backend
//! - Re-reading the zone to report the authoritative final state
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ RecordIntent │───┐
//! └──────────────┘   │
//!                    ▼
//!           ┌──────────────┐        ┌──────────────┐
//!           │ HealthFilter │◄──────►│    Prober    │
//!           └──────────────┘        └──────────────┘
//!                    │ desired'
//!                    ▼
//!           ┌──────────────┐        ┌──────────────┐
//!           │  Reconciler  │◄──────►│ ZoneBackend  │
//!           └──────────────┘        └──────────────┘
//!                    │
//!          ┌─────────┴──────────┐
//!          ▼                    ▼
//! ┌─────────────────┐   ┌──────────────┐
//! │ Outcome/Report  │   │    Events    │
//! └─────────────────┘   └──────────────┘
//! ```
//!
//! ## Per-family flow
//!
//! 1. Filter the desired set through the health probe
//! 2. `current = list_records(zone, name, family)`
//! 3. `to_add = desired' − current`, `to_keep = desired' ∩ current`,
//!    `to_drop = replace ? current − desired' : ∅`
//! 4. Add, then remove (skipped in dry-run mode)
//! 5. Re-read the backend for the final state (skipped in dry-run mode)
//!
//! Additions go first so the name never passes through a window with zero
//! published addresses.

use std::collections::BTreeSet;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::config::ReconcileOptions;
use crate::error::{Error, Result};
use crate::health::HealthFilter;
use crate::outcome::{
    AddressFailure, ChangeOperation, FamilyOutcome, PlanRun, ReconciliationOutcome, RecordFailure,
};
use crate::plan::verify_zones;
use crate::record::{RecordFamily, RecordIntent};
use crate::traits::{Prober, ZoneBackend};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Processing of a record began
    RecordStarted { zone: String, name: String },

    /// A candidate failed its health probe
    AddressRejected {
        zone: String,
        name: String,
        address: IpAddr,
    },

    /// An address was published
    AddressAdded {
        zone: String,
        name: String,
        address: IpAddr,
        ttl: u32,
    },

    /// An address was withdrawn
    AddressRemoved {
        zone: String,
        name: String,
        address: IpAddr,
    },

    /// The backend refused an add or remove
    AddressFailed {
        zone: String,
        name: String,
        address: IpAddr,
        operation: ChangeOperation,
        error: String,
    },

    /// A record finished (possibly with address failures)
    RecordCompleted {
        zone: String,
        name: String,
        added: usize,
        kept: usize,
        removed: usize,
    },

    /// A record could not be reconciled
    RecordFailed {
        zone: String,
        name: String,
        error: String,
    },

    /// The plan stopped early
    PlanHalted { reason: String },
}

/// Add/keep/drop sets for one family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Desired and not yet published
    pub to_add: BTreeSet<IpAddr>,
    /// Desired and already published
    pub to_keep: BTreeSet<IpAddr>,
    /// Published and no longer desired (replace mode only)
    pub to_drop: BTreeSet<IpAddr>,
}

impl ChangeSet {
    /// Compare the (healthy) desired set with the published set
    pub fn compute(
        desired: &BTreeSet<IpAddr>,
        current: &BTreeSet<IpAddr>,
        replace_existing: bool,
    ) -> Self {
        Self {
            to_add: desired.difference(current).copied().collect(),
            to_keep: desired.intersection(current).copied().collect(),
            to_drop: if replace_existing {
                current.difference(desired).copied().collect()
            } else {
                BTreeSet::new()
            },
        }
    }

    /// Whether nothing needs to change
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_drop.is_empty()
    }
}

/// Declarative round-robin reconciler
///
/// Holds an explicit handle to the zone backend and the prober; nothing is
/// shared between records except sequential backend calls.
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::reconcile()`] per intent, or
///    [`Reconciler::run_plan()`] for a whole plan
/// 3. Drop
pub struct Reconciler {
    /// Zone backend owning the published records
    backend: Box<dyn ZoneBackend>,

    /// Reachability check for health gating
    prober: Box<dyn Prober>,

    /// Run-wide options
    options: ReconcileOptions,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `backend`: Zone backend implementation
    /// - `prober`: Prober implementation
    /// - `options`: Run-wide options
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields reconcile events
    pub fn new(
        backend: Box<dyn ZoneBackend>,
        prober: Box<dyn Prober>,
        options: ReconcileOptions,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        options.validate()?;

        let (tx, rx) = mpsc::channel(options.event_channel_capacity);

        let reconciler = Self {
            backend,
            prober,
            options,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// The zone backend this reconciler mutates
    pub fn backend(&self) -> &dyn ZoneBackend {
        self.backend.as_ref()
    }

    /// Run-wide options
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Apply a whole plan
    ///
    /// Every intent is validated and every zone verified before the first
    /// record is touched; those errors are returned as `Err`. Per-record
    /// failures are collected into the returned [`PlanRun`]; with
    /// `stop_on_error` the run halts after the first failing record.
    pub async fn run_plan(&self, intents: &[RecordIntent]) -> Result<PlanRun> {
        for intent in intents {
            intent.validate()?;
        }
        verify_zones(intents, self.backend.as_ref()).await?;

        info!(
            "Reconciling {} record(s) against {}{}",
            intents.len(),
            self.backend.backend_name(),
            if self.options.dry_run { " [DRY-RUN]" } else { "" }
        );

        let mut run = PlanRun {
            dry_run: self.options.dry_run,
            ..PlanRun::default()
        };
        for (index, intent) in intents.iter().enumerate() {
            let failed = match self.reconcile(intent).await {
                Ok(outcome) => {
                    let failed = outcome.has_failures();
                    run.outcomes.push(outcome);
                    failed
                }
                Err(e) => {
                    error!("Failed to reconcile {}: {}", intent.fqdn(), e);
                    self.emit_event(ReconcileEvent::RecordFailed {
                        zone: intent.zone.clone(),
                        name: intent.name.clone(),
                        error: e.to_string(),
                    });
                    run.failures.push(RecordFailure {
                        zone: intent.zone.clone(),
                        name: intent.name.clone(),
                        error: e.to_string(),
                    });
                    true
                }
            };

            if failed && self.options.stop_on_error {
                run.halted = true;
                run.not_processed = intents.len() - index - 1;
                let reason = format!("{} failed and stop-on-error is set", intent.fqdn());
                warn!(
                    "Halting plan: {}; {} record(s) not processed",
                    reason, run.not_processed
                );
                self.emit_event(ReconcileEvent::PlanHalted { reason });
                break;
            }
        }

        Ok(run)
    }

    /// Reconcile one record intent
    ///
    /// # Errors
    ///
    /// - Configuration errors from [`RecordIntent::validate`]
    /// - [`Error::Backend`] when the published set cannot be read; the record
    ///   is abandoned at that point
    ///
    /// Individual add/remove failures do not fail the call; they are listed
    /// in the outcome.
    pub async fn reconcile(&self, intent: &RecordIntent) -> Result<ReconciliationOutcome> {
        intent.validate()?;

        debug!("Reconciling {}", intent.fqdn());
        self.emit_event(ReconcileEvent::RecordStarted {
            zone: intent.zone.clone(),
            name: intent.name.clone(),
        });

        let v4 = self.reconcile_family(intent, RecordFamily::A).await?;
        let v6 = match self.reconcile_family(intent, RecordFamily::Aaaa).await {
            Ok(v6) => v6,
            // A records were already handled; their outcome must survive
            Err(e) if !v4.skipped => {
                error!("Failed to reconcile AAAA for {}: {}", intent.fqdn(), e);
                FamilyOutcome::unreadable(e.to_string())
            }
            Err(e) => return Err(e),
        };

        let outcome = ReconciliationOutcome {
            zone: intent.zone.clone(),
            name: intent.name.clone(),
            ttl: intent.ttl,
            dry_run: self.options.dry_run,
            v4,
            v6,
        };

        self.emit_event(ReconcileEvent::RecordCompleted {
            zone: outcome.zone.clone(),
            name: outcome.name.clone(),
            added: outcome.v4.added.len() + outcome.v6.added.len(),
            kept: outcome.v4.kept.len() + outcome.v6.kept.len(),
            removed: outcome.v4.removed.len() + outcome.v6.removed.len(),
        });

        Ok(outcome)
    }

    /// Reconcile one address family of a record
    async fn reconcile_family(
        &self,
        intent: &RecordIntent,
        family: RecordFamily,
    ) -> Result<FamilyOutcome> {
        let desired = intent.desired(family);
        if desired.is_empty() {
            trace!("No {} addresses requested for {}, skipping", family, intent.fqdn());
            return Ok(FamilyOutcome::skipped());
        }

        let filter = HealthFilter::new(
            self.prober.as_ref(),
            self.options.probe_timeout(),
            self.options.probe_concurrency,
        );
        let filtered = filter
            .filter(&intent.zone, &intent.name, desired, &intent.probe)
            .await?;
        for rejection in &filtered.rejected {
            self.emit_event(ReconcileEvent::AddressRejected {
                zone: intent.zone.clone(),
                name: intent.name.clone(),
                address: rejection.address,
            });
        }

        let current = self.list(intent, family).await?;
        let changes = ChangeSet::compute(&filtered.healthy, &current, intent.replace_existing);

        if intent.replace_existing && filtered.healthy.is_empty() && !current.is_empty() {
            warn!(
                "No healthy {} candidates for {}; replace mode will withdraw all {} published address(es)",
                family,
                intent.fqdn(),
                current.len()
            );
        }

        let mut outcome = FamilyOutcome {
            kept: changes.to_keep.clone(),
            rejected: filtered.rejected,
            ..FamilyOutcome::default()
        };

        if changes.is_noop() {
            debug!("{} {} already up to date", intent.fqdn(), family);
        }

        if self.options.dry_run {
            for address in &changes.to_add {
                info!("[DRY-RUN] Would add {} {} -> {} (ttl {})", family, intent.fqdn(), address, intent.ttl);
            }
            for address in &changes.to_drop {
                info!("[DRY-RUN] Would remove {} {} -> {}", family, intent.fqdn(), address);
            }
            outcome.added = changes.to_add;
            outcome.removed = changes.to_drop;
            return Ok(outcome);
        }

        for address in changes.to_add {
            match self
                .backend
                .add_record(&intent.zone, &intent.name, family, address, intent.ttl)
                .await
            {
                Ok(()) => {
                    info!("Added {} {} -> {} (ttl {})", family, intent.fqdn(), address, intent.ttl);
                    outcome.added.insert(address);
                    self.emit_event(ReconcileEvent::AddressAdded {
                        zone: intent.zone.clone(),
                        name: intent.name.clone(),
                        address,
                        ttl: intent.ttl,
                    });
                }
                Err(e) => self.record_failure(intent, family, address, ChangeOperation::Add, e, &mut outcome),
            }
        }

        for address in changes.to_drop {
            match self
                .backend
                .remove_record(&intent.zone, &intent.name, family, address)
                .await
            {
                Ok(()) => {
                    info!("Removed {} {} -> {}", family, intent.fqdn(), address);
                    outcome.removed.insert(address);
                    self.emit_event(ReconcileEvent::AddressRemoved {
                        zone: intent.zone.clone(),
                        name: intent.name.clone(),
                        address,
                    });
                }
                Err(e) => self.record_failure(intent, family, address, ChangeOperation::Remove, e, &mut outcome),
            }
        }

        match self.list(intent, family).await {
            Ok(published) => outcome.final_state = Some(published),
            Err(e) => {
                error!("Final re-read of {} {} failed: {}", family, intent.fqdn(), e);
                outcome.error = Some(e.to_string());
            }
        }

        Ok(outcome)
    }

    /// Read the published set, tagging errors with the record
    async fn list(&self, intent: &RecordIntent, family: RecordFamily) -> Result<BTreeSet<IpAddr>> {
        self.backend
            .list_records(&intent.zone, &intent.name, family)
            .await
            .map_err(|e| {
                Error::backend(format!(
                    "Failed to list {} records for {} on {}: {}",
                    family,
                    intent.fqdn(),
                    self.backend.backend_name(),
                    e
                ))
            })
    }

    fn record_failure(
        &self,
        intent: &RecordIntent,
        family: RecordFamily,
        address: IpAddr,
        operation: ChangeOperation,
        err: Error,
        outcome: &mut FamilyOutcome,
    ) {
        error!(
            "Failed to {} {} {} -> {}: {}",
            operation,
            family,
            intent.fqdn(),
            address,
            err
        );
        self.emit_event(ReconcileEvent::AddressFailed {
            zone: intent.zone.clone(),
            name: intent.name.clone(),
            address,
            operation,
            error: err.to_string(),
        });
        outcome.failures.push(AddressFailure {
            address,
            family,
            operation,
            error: err.to_string(),
        });
    }

    /// Emit a reconcile event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening; events are optional.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
