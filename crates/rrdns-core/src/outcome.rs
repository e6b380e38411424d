//! Per-record results of a reconciliation run
//!
//! Outcomes are built while a record is processed and discarded once the
//! run has been reported. Address collections are ordered sets so reports are
//! reproducible; membership, not order, is what matters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::health::ProbeRejection;
use crate::record::{fqdn, RecordFamily};

/// Backend mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    /// add_record
    Add,
    /// remove_record
    Remove,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Add => f.write_str("add"),
            ChangeOperation::Remove => f.write_str("remove"),
        }
    }
}

/// A single add/remove that the backend refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFailure {
    /// Address the operation targeted
    pub address: IpAddr,
    /// A or AAAA
    pub family: RecordFamily,
    /// What was attempted
    pub operation: ChangeOperation,
    /// Backend error message
    pub error: String,
}

/// Result for one address family of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyOutcome {
    /// Addresses published by this run (intended, in dry-run mode)
    pub added: BTreeSet<IpAddr>,
    /// Desired addresses that were already published
    pub kept: BTreeSet<IpAddr>,
    /// Addresses withdrawn by this run (intended, in dry-run mode)
    pub removed: BTreeSet<IpAddr>,
    /// Published set re-read after applying changes; `None` in dry-run mode
    /// or when the family was skipped
    pub final_state: Option<BTreeSet<IpAddr>>,
    /// Candidates excluded by health probing
    pub rejected: Vec<ProbeRejection>,
    /// Mutations the backend refused
    pub failures: Vec<AddressFailure>,
    /// The intent listed no addresses for this family
    pub skipped: bool,
    /// The family could not be read; changes listed above still happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FamilyOutcome {
    /// Outcome of a family with no desired addresses
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Outcome of a family that could not be read at all
    pub fn unreadable(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of reconciling one record intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    /// Zone
    pub zone: String,
    /// Record name
    pub name: String,
    /// TTL used for additions
    pub ttl: u32,
    /// Whether the backend was left untouched
    pub dry_run: bool,
    /// A records
    pub v4: FamilyOutcome,
    /// AAAA records
    pub v6: FamilyOutcome,
}

impl ReconciliationOutcome {
    /// Outcome of one family
    pub fn family(&self, family: RecordFamily) -> &FamilyOutcome {
        match family {
            RecordFamily::A => &self.v4,
            RecordFamily::Aaaa => &self.v6,
        }
    }

    /// Fully-qualified record name
    pub fn fqdn(&self) -> String {
        fqdn(&self.zone, &self.name)
    }

    /// IPv4 addresses added
    pub fn added4(&self) -> &BTreeSet<IpAddr> {
        &self.v4.added
    }

    /// IPv4 addresses kept
    pub fn kept4(&self) -> &BTreeSet<IpAddr> {
        &self.v4.kept
    }

    /// IPv4 addresses removed
    pub fn removed4(&self) -> &BTreeSet<IpAddr> {
        &self.v4.removed
    }

    /// Final IPv4 state
    pub fn final4(&self) -> Option<&BTreeSet<IpAddr>> {
        self.v4.final_state.as_ref()
    }

    /// IPv6 addresses added
    pub fn added6(&self) -> &BTreeSet<IpAddr> {
        &self.v6.added
    }

    /// IPv6 addresses kept
    pub fn kept6(&self) -> &BTreeSet<IpAddr> {
        &self.v6.kept
    }

    /// IPv6 addresses removed
    pub fn removed6(&self) -> &BTreeSet<IpAddr> {
        &self.v6.removed
    }

    /// Final IPv6 state
    pub fn final6(&self) -> Option<&BTreeSet<IpAddr>> {
        self.v6.final_state.as_ref()
    }

    /// All backend failures across both families
    pub fn failures(&self) -> impl Iterator<Item = &AddressFailure> {
        self.v4.failures.iter().chain(self.v6.failures.iter())
    }

    /// All probe rejections across both families
    pub fn rejections(&self) -> impl Iterator<Item = &ProbeRejection> {
        self.v4.rejected.iter().chain(self.v6.rejected.iter())
    }

    /// Read errors of families that did not complete
    pub fn family_errors(&self) -> impl Iterator<Item = (RecordFamily, &str)> {
        [(RecordFamily::A, &self.v4), (RecordFamily::Aaaa, &self.v6)]
            .into_iter()
            .filter_map(|(family, outcome)| outcome.error.as_deref().map(|e| (family, e)))
    }

    /// Whether any add/remove failed or a family could not be read
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some() || self.family_errors().next().is_some()
    }

    /// Number of additions plus removals
    pub fn change_count(&self) -> usize {
        self.v4.added.len() + self.v4.removed.len() + self.v6.added.len() + self.v6.removed.len()
    }
}

/// A record that could not be reconciled at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Zone
    pub zone: String,
    /// Record name
    pub name: String,
    /// Error message
    pub error: String,
}

/// Result of applying a whole plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRun {
    /// Records that were reconciled (possibly with address failures)
    pub outcomes: Vec<ReconciliationOutcome>,
    /// Records that failed outright
    pub failures: Vec<RecordFailure>,
    /// The run stopped early because of stop-on-error
    pub halted: bool,
    /// Records left unprocessed after a halt
    pub not_processed: usize,
    /// The run was a rehearsal
    #[serde(default)]
    pub dry_run: bool,
}

impl PlanRun {
    /// No record failed and no address operation failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.outcomes.iter().any(ReconciliationOutcome::has_failures)
    }
}
