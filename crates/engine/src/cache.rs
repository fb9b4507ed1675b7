//! Local durable cache: a synchronous, best-effort mirror of the ledger.
//!
//! The cache is derived state. A blob that cannot be parsed is treated as an
//! empty ledger rather than an error.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{ResultEngine, state::Snapshot};

pub const DEFAULT_NAMESPACE: &str = "tally.v1";

/// Key/value persistence for the whole-ledger snapshot.
pub trait LocalCache: Send + Sync {
    /// Last stored snapshot; empty when nothing (valid) is stored.
    fn load(&self) -> Snapshot;

    /// Replace the stored snapshot.
    fn store(&self, snapshot: &Snapshot) -> ResultEngine<()>;
}

fn parse_blob(namespace: &str, blob: &str) -> Snapshot {
    match serde_json::from_str(blob) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(namespace, "discarding unreadable cache: {err}");
            Snapshot::default()
        }
    }
}

/// JSON file named after the namespace inside a directory.
#[derive(Debug)]
pub struct FileCache {
    namespace: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCache {
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        let path = dir.as_ref().join(format!("{namespace}.json"));
        Self {
            namespace: namespace.to_string(),
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalCache for FileCache {
    fn load(&self) -> Snapshot {
        match fs::read_to_string(&self.path) {
            Ok(blob) => parse_blob(&self.namespace, &blob),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "cannot read cache: {err}");
                Snapshot::default()
            }
        }
    }

    fn store(&self, snapshot: &Snapshot) -> ResultEngine<()> {
        let payload = serde_json::to_vec(snapshot)?;
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write aside and rename so a crash never leaves half a blob behind.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process cache holding the serialized blob.
#[derive(Debug, Default)]
pub struct MemoryCache {
    blob: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a raw blob, e.g. one written by an older build.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful stores.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LocalCache for MemoryCache {
    fn load(&self) -> Snapshot {
        match self.blob.lock().as_deref() {
            Some(blob) => parse_blob(DEFAULT_NAMESPACE, blob),
            None => Snapshot::default(),
        }
    }

    fn store(&self, snapshot: &Snapshot) -> ResultEngine<()> {
        let blob = serde_json::to_string(snapshot)?;
        *self.blob.lock() = Some(blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use api_types::expense::{Billing, ExpenseFields};
    use uuid::Uuid;

    use super::*;
    use crate::{entity::Collection, state::StateStore};

    fn cache_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/test_cache")
            .join(Uuid::new_v4().to_string())
    }

    #[test]
    fn unreadable_blob_means_empty_ledger() {
        let cache = MemoryCache::with_blob("{ not json");
        assert_eq!(cache.load(), Snapshot::default());
    }

    #[test]
    fn file_cache_round_trips_snapshot() {
        let dir = cache_dir();
        let cache = FileCache::new(&dir, DEFAULT_NAMESPACE);
        assert_eq!(cache.load(), Snapshot::default());

        let state = StateStore::default();
        state
            .add_expense(
                Collection::Personal,
                ExpenseFields::new("Gym", 40.0, Billing::Monthly),
            )
            .unwrap();
        cache.store(&state.snapshot()).unwrap();

        let reloaded = FileCache::new(&dir, DEFAULT_NAMESPACE).load();
        assert_eq!(reloaded, state.snapshot());
        assert!(cache.path().ends_with("tally.v1.json"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn truncated_file_is_ignored() {
        let dir = cache_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tally.v1.json"), b"{\"personal\": [").unwrap();

        let cache = FileCache::new(&dir, DEFAULT_NAMESPACE);
        assert_eq!(cache.load(), Snapshot::default());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
