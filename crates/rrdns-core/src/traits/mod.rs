//! Core traits for rrdns
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ZoneBackend`]: Read and mutate published A/AAAA record sets
//! - [`Prober`]: Single reachability check against one address

pub mod prober;
pub mod zone_backend;

pub use prober::Prober;
pub use zone_backend::{ZoneBackend, ZoneBackendFactory};
