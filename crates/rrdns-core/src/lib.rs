// # rrdns-core
//
// Core library for declarative DNS round-robin reconciliation.
//
// ## Architecture Overview
//
// Given a set of record intents (zone, name, desired IPv4/IPv6 addresses,
// TTL, merge-or-replace, optional health probe) this library brings the
// published A/AAAA record sets in line:
// - **ZoneBackend**: Trait for the DNS zone manager owning the records
// - **Prober**: Trait for TCP/HTTP reachability checks
// - **HealthFilter**: Keeps only candidates that answer their probe
// - **Plan loader**: Parses CSV/JSON plans into validated intents
// - **Reconciler**: Computes add/keep/drop per family and applies it
// - **Report**: Aggregates outcomes into table/JSON/CSV summaries
// - **BackendRegistry**: Plugin-based registry for zone backends
//
// ## Design Principles
//
// 1. **Explicit handles**: The backend and prober are passed in, never global
// 2. **Typed boundary**: Plans are parsed once into `RecordIntent`s
// 3. **Two stages**: Filtering and reconciling are separate, each with typed diagnostics
// 4. **Library-First**: The CLI is a thin layer over this crate
// 5. **Idempotency**: Re-running a satisfied plan performs no mutations

pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod outcome;
pub mod plan;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod report;
pub mod traits;

// Re-export core types for convenience
pub use backend::{FileZoneBackend, MemoryZoneBackend};
pub use config::{BackendConfig, PlanOverrides, ReconcileOptions};
pub use error::{Error, Result};
pub use health::{FilterResult, HealthFilter, ProbeRejection, RejectReason};
pub use outcome::{AddressFailure, ChangeOperation, FamilyOutcome, PlanRun, ReconciliationOutcome, RecordFailure};
pub use plan::{load_plan, parse_plan, verify_zones, PlanFormat};
pub use reconciler::{ChangeSet, ReconcileEvent, Reconciler};
pub use record::{ProbeConfig, ProbeTarget, ProbeType, RecordFamily, RecordIntent};
pub use registry::BackendRegistry;
pub use report::{summarize, OutputFormat, Report};
pub use traits::{Prober, ZoneBackend, ZoneBackendFactory};
