//! Configuration types for rrdns
//!
//! This module defines all configuration structures used throughout the crate:
//! - [`BackendConfig`]: which zone backend to talk to
//! - [`ReconcileOptions`]: run-wide switches (dry run, stop-on-error, probing)
//! - [`PlanOverrides`]: global values that win over per-record plan values

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::record::{ProbeType, MAX_TTL};

/// Zone backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory zones (not persistent)
    #[default]
    Memory,

    /// JSON zone file
    File {
        /// Path to the zone file
        path: String,
    },

    /// Cloudflare API v4
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// API base URL (defaults to the public endpoint)
        #[serde(default)]
        endpoint: Option<String>,
    },

    /// Custom backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl BackendConfig {
    /// Validate the backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            BackendConfig::Memory => Ok(()),
            BackendConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Zone file path cannot be empty"));
                }
                Ok(())
            }
            BackendConfig::Cloudflare { api_token, endpoint } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if let Some(endpoint) = endpoint
                    && !endpoint.starts_with("https://")
                    && !endpoint.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "Cloudflare endpoint must be an http(s) URL. Got: {endpoint}"
                    )));
                }
                Ok(())
            }
            BackendConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom backend factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom backend config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::File { .. } => "file",
            BackendConfig::Cloudflare { .. } => "cloudflare",
            BackendConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Run-wide reconciliation options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Compute and report the delta without mutating the backend
    #[serde(default)]
    pub dry_run: bool,

    /// Halt the remaining plan after the first failing record
    #[serde(default)]
    pub stop_on_error: bool,

    /// Timeout of a single health probe (in milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum number of probes in flight for one family of one record
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,

    /// Capacity of the reconciler event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcileOptions {
    /// Probe timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable stop-on-error
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.probe_timeout_ms == 0 {
            return Err(crate::Error::config("Probe timeout must be > 0"));
        }
        if self.probe_concurrency == 0 {
            return Err(crate::Error::config("Probe concurrency must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stop_on_error: false,
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_concurrency: default_probe_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

fn default_probe_concurrency() -> usize {
    16
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Global overrides applied on top of every plan record
///
/// A `Some` value always wins over the record's own value; `None` leaves the
/// record (or the built-in default) in charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOverrides {
    /// TTL for every record
    pub ttl: Option<u32>,
    /// Replace mode for every record
    pub replace_existing: Option<bool>,
    /// Enable/disable health probing for every record
    pub health_probe: Option<bool>,
    /// Probe type for every record
    pub probe_type: Option<ProbeType>,
    /// Probe port for every record
    pub probe_port: Option<u16>,
    /// Probe path for every record
    pub probe_path: Option<String>,
}

impl PlanOverrides {
    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate override values
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(ttl) = self.ttl
            && !(1..=MAX_TTL).contains(&ttl)
        {
            return Err(crate::Error::config(format!(
                "TTL override must be between 1 and {MAX_TTL}. Got: {ttl}"
            )));
        }
        if self.probe_port == Some(0) {
            return Err(crate::Error::config("Probe port override cannot be 0"));
        }
        Ok(())
    }
}
