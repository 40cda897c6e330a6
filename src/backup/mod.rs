pub mod archive;
pub mod export;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{Store, read_register_records};
use crate::types::{RegisterRecord, RegisterTable};

/// File name of the raw store snapshot inside a backup archive.
pub const SNAPSHOT_FILE_NAME: &str = "register.db";

/// File name of the backup manifest inside a backup archive.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Which register categories a restore should replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSelection {
    pub suppliers: bool,
    pub events: bool,
    pub issues: bool,
    pub critical_monitor: bool,
}

impl RestoreSelection {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            suppliers: true,
            events: true,
            issues: true,
            critical_monitor: true,
        }
    }

    #[must_use]
    pub const fn contains(&self, table: RegisterTable) -> bool {
        match table {
            RegisterTable::Suppliers => self.suppliers,
            RegisterTable::Events => self.events,
            RegisterTable::Issues => self.issues,
            RegisterTable::CriticalMonitor => self.critical_monitor,
        }
    }

    #[must_use]
    pub const fn is_all(&self) -> bool {
        self.suppliers && self.events && self.issues && self.critical_monitor
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.suppliers || self.events || self.issues || self.critical_monitor)
    }

    #[must_use]
    pub fn tables(&self) -> Vec<RegisterTable> {
        RegisterTable::ALL
            .into_iter()
            .filter(|t| self.contains(*t))
            .collect()
    }
}

/// Per-table restored-row counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreStats {
    pub suppliers: usize,
    pub events: usize,
    pub issues: usize,
    pub critical_monitor: usize,
}

impl RestoreStats {
    fn set(&mut self, table: RegisterTable, count: usize) {
        match table {
            RegisterTable::Suppliers => self.suppliers = count,
            RegisterTable::Events => self.events = count,
            RegisterTable::Issues => self.issues = count,
            RegisterTable::CriticalMonitor => self.critical_monitor = count,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.suppliers + self.events + self.issues + self.critical_monitor
    }
}

/// Written into every archive next to the snapshot and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub snapshot_sha256: String,
    pub row_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub path: PathBuf,
    pub manifest: BackupManifest,
}

/// Coordinates backup and restore against the live store. Single-flight:
/// a backup or restore that arrives while another is running fails with
/// `StoreUnavailable` instead of interleaving.
pub struct BackupCoordinator {
    store: Arc<dyn Store>,
    busy: AtomicBool,
}

struct FlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl BackupCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            busy: AtomicBool::new(false),
        }
    }

    fn begin(&self, operation: &str) -> Result<FlightGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::StoreUnavailable(format!(
                "cannot {operation}: another backup or restore is in progress"
            )));
        }
        Ok(FlightGuard { busy: &self.busy })
    }

    /// Produces a point-in-time archive: the raw store snapshot (taken
    /// under the connection lock) plus the four register exports and a
    /// manifest. The staging directory is removed on every exit path.
    pub fn create_backup(&self, destination: &Path) -> Result<BackupReport> {
        let _flight = self.begin("create backup")?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let staging = tempfile::tempdir()?;

        let snapshot = staging.path().join(SNAPSHOT_FILE_NAME);
        self.store.snapshot_to(&snapshot)?;
        let snapshot_sha256 = archive::sha256_file(&snapshot)?;

        // Exports come from the live store after the snapshot; they are a
        // human-readable redundancy, not the consistency source of truth.
        let mut row_counts = BTreeMap::new();
        for table in RegisterTable::ALL {
            let records = self.store.list_records(table)?;
            export::write_export(&staging.path().join(table.export_file_name()), &records)?;
            row_counts.insert(table.table_name().to_string(), records.len());
        }

        let manifest = BackupManifest {
            created_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            snapshot_sha256,
            row_counts,
        };
        std::fs::write(
            staging.path().join(MANIFEST_FILE_NAME),
            serde_json::to_string_pretty(&manifest)
                .map_err(|e| Error::Validation(format!("serialize manifest: {e}")))?,
        )?;

        let mut entries = vec![SNAPSHOT_FILE_NAME];
        for table in RegisterTable::ALL {
            entries.push(table.export_file_name());
        }
        entries.push(MANIFEST_FILE_NAME);
        archive::pack(staging.path(), &entries, destination)?;

        tracing::info!("Backup written to {}", destination.display());
        Ok(BackupReport {
            path: destination.to_path_buf(),
            manifest,
        })
    }

    /// Restores selected categories from the raw store snapshot inside the
    /// archive. Selecting everything replaces the whole store (users and
    /// auth settings included, since they share the file); a partial
    /// selection replaces each chosen table transactionally and leaves the
    /// rest untouched.
    pub fn restore_from_snapshot(
        &self,
        archive_path: &Path,
        selection: &RestoreSelection,
    ) -> Result<RestoreStats> {
        let _flight = self.begin("restore")?;

        if selection.is_empty() {
            return Err(Error::Validation(
                "no categories selected for restore".to_string(),
            ));
        }

        let staging = tempfile::tempdir()?;
        archive::unpack(archive_path, staging.path())?;

        let snapshot = staging.path().join(SNAPSHOT_FILE_NAME);
        if !snapshot.exists() {
            return Err(Error::ArchiveMalformed(format!(
                "archive does not contain {SNAPSHOT_FILE_NAME}"
            )));
        }

        let mut stats = RestoreStats::default();

        if selection.is_all() {
            self.store.restore_from(&snapshot)?;
            for table in RegisterTable::ALL {
                stats.set(table, usize::try_from(self.store.count_records(table)?).unwrap_or(0));
            }
            tracing::info!("Full store restored from {}", archive_path.display());
            return Ok(stats);
        }

        let source = Connection::open_with_flags(&snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                Error::ArchiveMalformed(format!("cannot open archived store snapshot: {e}"))
            })?;

        // Read every selected table before touching the live store, so a
        // missing table in an old archive fails the restore cleanly.
        let mut pending: Vec<(RegisterTable, Vec<RegisterRecord>)> = Vec::new();
        for table in selection.tables() {
            let records = read_register_records(&source, table).map_err(|e| {
                Error::ArchiveMalformed(format!("archived store is missing table {table}: {e}"))
            })?;
            pending.push((table, records));
        }

        for (table, records) in pending {
            let count = self.store.replace_all_records(table, &records)?;
            stats.set(table, count);
            tracing::info!("Restored {count} rows into {table}");
        }

        Ok(stats)
    }

    /// Restores selected categories from the tabular exports instead of
    /// the raw snapshot. Fallback for archives whose exports were edited
    /// by hand; nested payloads survive only as far as the CSV did.
    pub fn restore_from_exports(
        &self,
        archive_path: &Path,
        selection: &RestoreSelection,
    ) -> Result<RestoreStats> {
        let _flight = self.begin("restore")?;

        if selection.is_empty() {
            return Err(Error::Validation(
                "no categories selected for restore".to_string(),
            ));
        }

        let staging = tempfile::tempdir()?;
        archive::unpack(archive_path, staging.path())?;

        // Every selected export must exist before any table is replaced.
        let mut pending: Vec<(RegisterTable, Vec<RegisterRecord>)> = Vec::new();
        for table in selection.tables() {
            let path = staging.path().join(table.export_file_name());
            if !path.exists() {
                return Err(Error::ArchiveMalformed(format!(
                    "archive does not contain {}",
                    table.export_file_name()
                )));
            }
            pending.push((table, export::read_export(&path)?));
        }

        let mut stats = RestoreStats::default();
        for (table, records) in pending {
            let count = self.store.replace_all_records(table, &records)?;
            stats.set(table, count);
            tracing::info!("Restored {count} rows into {table} from exports");
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::store::SqliteStore;

    fn test_store(temp: &TempDir) -> Arc<dyn Store> {
        let store = SqliteStore::new(temp.path().join("register.db")).unwrap();
        store.initialize().unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_selection_helpers() {
        let all = RestoreSelection::all();
        assert!(all.is_all());
        assert!(!all.is_empty());
        assert_eq!(all.tables().len(), 4);

        let none = RestoreSelection {
            suppliers: false,
            events: false,
            issues: false,
            critical_monitor: false,
        };
        assert!(none.is_empty());

        let only_suppliers = RestoreSelection {
            suppliers: true,
            events: false,
            issues: false,
            critical_monitor: false,
        };
        assert!(!only_suppliers.is_all());
        assert_eq!(only_suppliers.tables(), vec![RegisterTable::Suppliers]);
    }

    #[test]
    fn test_single_flight() {
        let temp = TempDir::new().unwrap();
        let coordinator = BackupCoordinator::new(test_store(&temp));

        let _guard = coordinator.begin("create backup").unwrap();
        let result = coordinator.create_backup(&temp.path().join("b.tar.gz"));
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn test_flight_released_after_failure() {
        let temp = TempDir::new().unwrap();
        let coordinator = BackupCoordinator::new(test_store(&temp));

        let missing = temp.path().join("absent.tar.gz");
        assert!(
            coordinator
                .restore_from_snapshot(&missing, &RestoreSelection::all())
                .is_err()
        );

        // The guard must have been released by the failed restore.
        assert!(
            coordinator
                .create_backup(&temp.path().join("after.tar.gz"))
                .is_ok()
        );
    }

    #[test]
    fn test_empty_selection_rejected() {
        let temp = TempDir::new().unwrap();
        let coordinator = BackupCoordinator::new(test_store(&temp));

        let backup = temp.path().join("b.tar.gz");
        coordinator.create_backup(&backup).unwrap();

        let none = RestoreSelection {
            suppliers: false,
            events: false,
            issues: false,
            critical_monitor: false,
        };
        assert!(matches!(
            coordinator.restore_from_snapshot(&backup, &none),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_restore_rejects_archive_without_snapshot() {
        let temp = TempDir::new().unwrap();
        let coordinator = BackupCoordinator::new(test_store(&temp));

        // A valid tarball that lacks register.db.
        let staging = TempDir::new().unwrap();
        std::fs::write(staging.path().join("README"), "not a backup").unwrap();
        let bogus = temp.path().join("bogus.tar.gz");
        archive::pack(staging.path(), &["README"], &bogus).unwrap();

        let result = coordinator.restore_from_snapshot(&bogus, &RestoreSelection::all());
        assert!(matches!(result, Err(Error::ArchiveMalformed(_))));
    }
}
