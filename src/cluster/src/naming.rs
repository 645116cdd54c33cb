//! Replica discovery.
//!
//! Maps replica ids to `host:port` addresses. Replicas publish themselves at
//! startup and unpublish on shutdown; clients and gossip look peers up here.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::NamingError;
use crate::types::ReplicaRecord;

pub trait Naming: Send + Sync {
    /// Every registered replica, ordered by id.
    fn list_replicas(&self) -> Vec<ReplicaRecord>;

    fn resolve(&self, id: usize) -> Option<String>;

    fn publish(&self, id: usize, address: &str) -> Result<(), NamingError>;

    /// Remove `id` if it is still registered at `address`.
    fn unpublish(&self, id: usize, address: &str) -> Result<(), NamingError>;
}

fn to_records(entries: &BTreeMap<usize, String>) -> Vec<ReplicaRecord> {
    entries
        .iter()
        .map(|(&id, address)| ReplicaRecord::new(id, address.clone()))
        .collect()
}

/// In-process registry.
#[derive(Default)]
pub struct StaticNaming {
    entries: RwLock<BTreeMap<usize, String>>,
}

impl StaticNaming {
    pub fn new() -> Self {
        StaticNaming::default()
    }

    pub fn with_replicas<I, S>(replicas: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        StaticNaming {
            entries: RwLock::new(replicas.into_iter().map(|(id, addr)| (id, addr.into())).collect()),
        }
    }
}

impl Naming for StaticNaming {
    fn list_replicas(&self) -> Vec<ReplicaRecord> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        to_records(&entries)
    }

    fn resolve(&self, id: usize) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&id).cloned()
    }

    fn publish(&self, id: usize, address: &str) -> Result<(), NamingError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(id, address.to_string());
        Ok(())
    }

    fn unpublish(&self, id: usize, address: &str) -> Result<(), NamingError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(&id).is_some_and(|a| a == address) {
            entries.remove(&id);
        }
        Ok(())
    }
}

const LOCK_RETRY: Duration = Duration::from_millis(2);
/// A lock file older than this was left behind by a crashed writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

/// Exclusive lock held by whoever created `<registry>.lock`. Removed on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self, NamingError> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(LockFile { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        warn!("Removing stale registry lock {}", path.display());
                        let _ = fs::remove_file(&path);
                    } else {
                        std::thread::sleep(LOCK_RETRY);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release registry lock {}: {}", self.path.display(), e);
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

/// Registry kept in a JSON file shared by every process on the host.
///
/// Lookups re-read the file, so a replica that restarted on a new port is
/// found on the next resolve. Updates hold `<registry>.lock` for the whole
/// read-modify-write and replace the file atomically.
pub struct FileNaming {
    path: PathBuf,
}

impl FileNaming {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Using naming registry at {}", path.display());
        FileNaming { path }
    }

    fn load(&self) -> Result<BTreeMap<usize, String>, NamingError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &BTreeMap<usize, String>) -> Result<(), NamingError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(entries)?)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Run `update` on the current entries under the registry lock and
    /// write the result back if it reports a change.
    fn modify<F>(&self, update: F) -> Result<(), NamingError>
    where
        F: FnOnce(&mut BTreeMap<usize, String>) -> bool,
    {
        let mut lock_name = self.path.clone().into_os_string();
        lock_name.push(".lock");
        let _lock = LockFile::acquire(PathBuf::from(lock_name))?;

        let mut entries = self.load()?;
        if update(&mut entries) {
            self.store(&entries)?;
        }
        Ok(())
    }

    fn lookup(&self) -> BTreeMap<usize, String> {
        self.load().unwrap_or_else(|e| {
            debug!("Naming registry unreadable: {}", e);
            BTreeMap::new()
        })
    }
}

impl Naming for FileNaming {
    fn list_replicas(&self) -> Vec<ReplicaRecord> {
        to_records(&self.lookup())
    }

    fn resolve(&self, id: usize) -> Option<String> {
        self.lookup().remove(&id)
    }

    fn publish(&self, id: usize, address: &str) -> Result<(), NamingError> {
        self.modify(|entries| {
            entries.insert(id, address.to_string());
            true
        })
    }

    fn unpublish(&self, id: usize, address: &str) -> Result<(), NamingError> {
        self.modify(|entries| {
            if entries.get(&id).is_some_and(|a| a == address) {
                entries.remove(&id);
                true
            } else {
                false
            }
        })
    }
}
