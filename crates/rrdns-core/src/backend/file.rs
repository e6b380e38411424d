// # File Zone Backend
//
// JSON zone file implementation of ZoneBackend with crash recovery.
//
// ## Purpose
//
// Lets operators rehearse a plan against a local copy of their zones. The
// file is re-read on every call, so the final re-read after a run reflects
// exactly what is on disk.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of the previous zone file
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "zones": {
//     "contoso.com": {
//       "web": {
//         "A": { "10.0.1.10": 60 },
//         "AAAA": { "fd00::10": 60 }
//       }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::ZoneTable;
use crate::config::BackendConfig;
use crate::record::RecordFamily;
use crate::traits::{ZoneBackend, ZoneBackendFactory};
use crate::Error;

/// Zone file format version
const ZONE_FILE_VERSION: &str = "1.0";

/// Serializable zone file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneFileFormat {
    version: String,
    #[serde(flatten)]
    table: ZoneTable,
}

/// File-based zone backend with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use rrdns_core::backend::FileZoneBackend;
/// use rrdns_core::{RecordFamily, ZoneBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = FileZoneBackend::new("zones.json");
///     backend.add_zone("contoso.com").await?;
///
///     // Atomically written to disk
///     backend
///         .add_record("contoso.com", "web", RecordFamily::A, "10.0.1.10".parse()?, 60)
///         .await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileZoneBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileZoneBackend {
    /// Create a backend over `path`; nothing is read until the first call
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the zone file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a zone (and the zone file, if missing)
    pub async fn add_zone(&self, zone: &str) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut table = Self::load_with_recovery(&self.path).await?;
        if table.contains_zone(zone) {
            return Ok(());
        }
        table.add_zone(zone);
        self.write_table(&table).await
    }

    /// Load zones from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main zone file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, report the corruption
    async fn load_with_recovery(path: &Path) -> Result<ZoneTable, Error> {
        let err = match Self::load(path).await {
            Ok(table) => return Ok(table),
            Err(e @ Error::Json(_)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Zone file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            return Err(Error::backend(format!(
                "Zone file {} is corrupted and no backup exists: {}",
                path.display(),
                err
            )));
        }

        match Self::load(&backup_path).await {
            Ok(table) => {
                tracing::info!("Recovered zones from backup {}", backup_path.display());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore zone file from backup: {}", restore_err);
                }
                Ok(table)
            }
            Err(backup_err) => Err(Error::backend(format!(
                "Zone file {} and its backup are both unreadable: {}; {}",
                path.display(),
                err,
                backup_err
            ))),
        }
    }

    /// Load zones from file; a missing file holds no zones
    async fn load(path: &Path) -> Result<ZoneTable, Error> {
        if !path.exists() {
            tracing::debug!("Zone file does not exist: {}", path.display());
            return Ok(ZoneTable::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::backend(format!("Failed to read zone file {}: {}", path.display(), e))
        })?;

        let file: ZoneFileFormat = serde_json::from_str(&content)?;

        if file.version != ZONE_FILE_VERSION {
            tracing::warn!(
                "Zone file version mismatch: expected {}, got {}. Attempting to load anyway.",
                ZONE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.table)
    }

    /// Write zones to file atomically
    async fn write_table(&self, table: &ZoneTable) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::backend(format!(
                    "Failed to create zone directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(&ZoneFileFormat {
            version: ZONE_FILE_VERSION.to_string(),
            table: table.clone(),
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::backend(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::backend(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::backend(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::backend(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Zone file written: {}", self.path.display());
        Ok(())
    }

    /// Load, apply `change`, write back
    async fn modify<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ZoneTable) -> Result<(), Error>,
    {
        let _guard = self.write_lock.lock().await;
        let mut table = Self::load_with_recovery(&self.path).await?;
        change(&mut table)?;
        self.write_table(&table).await
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ZoneBackend for FileZoneBackend {
    async fn zone_exists(&self, zone: &str) -> Result<bool, Error> {
        Ok(Self::load_with_recovery(&self.path).await?.contains_zone(zone))
    }

    async fn list_records(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
    ) -> Result<BTreeSet<IpAddr>, Error> {
        Self::load_with_recovery(&self.path)
            .await?
            .list(zone, name, family)
    }

    async fn add_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
        ttl: u32,
    ) -> Result<(), Error> {
        self.modify(|table| table.add(zone, name, family, address, ttl))
            .await
    }

    async fn remove_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<(), Error> {
        self.modify(|table| table.remove(zone, name, family, address))
            .await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for [`BackendConfig::File`]
pub struct FileZoneBackendFactory;

impl ZoneBackendFactory for FileZoneBackendFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn ZoneBackend>, Error> {
        match config {
            BackendConfig::File { path } => Ok(Box::new(FileZoneBackend::new(path))),
            other => Err(Error::config(format!(
                "File backend factory cannot build a '{}' backend",
                other.type_name()
            ))),
        }
    }
}
