use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk shape of one cache entry.
#[derive(Serialize, Deserialize)]
struct Entry {
    timestamp: i64,
    value: Value,
}

/// File-backed cache with TTL expiry, one JSON file per key.
///
/// Caching is an optimization, not a correctness requirement: `set` is
/// best-effort and `get` treats anything unreadable as a miss. Expired and
/// corrupt entries are deleted on read.
pub struct Cache {
    dir: PathBuf,
    ttl: u64,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, ttl: u64) -> Self {
        Self { dir: dir.into(), ttl }
    }

    /// Entries live under a hashed filename so keys never have to be
    /// filesystem-safe.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        let entry: Entry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("removing corrupt cache entry for {key:?}: {err}");
                remove_entry(&path);
                return None;
            }
        };
        if Utc::now().timestamp().saturating_sub(entry.timestamp) > self.ttl as i64 {
            remove_entry(&path);
            return None;
        }
        serde_json::from_value(entry.value).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                debug!("not caching unserializable value for {key:?}: {err}");
                return;
            }
        };
        if let Err(err) = fs::create_dir_all(&self.dir) {
            debug!("cannot create cache directory {}: {err}", self.dir.display());
            return;
        }
        let entry = Entry { timestamp: Utc::now().timestamp(), value };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(err) = fs::write(self.entry_path(key), bytes) {
                    debug!("failed to persist cache entry for {key:?}: {err}");
                }
            }
            Err(err) => debug!("failed to serialize cache entry for {key:?}: {err}"),
        }
    }
}

fn remove_entry(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        debug!("failed to remove cache entry {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn round_trip_within_ttl() {
        let dir = TempDir::new().expect("tempdir");
        let cache = Cache::new(dir.path(), 3600);

        cache.set("total_contributions_octocat", &1234u64);
        assert_eq!(cache.get::<u64>("total_contributions_octocat"), Some(1234));

        cache.set("lines_changed_octocat", &(10u64, 4u64));
        assert_eq!(cache.get::<(u64, u64)>("lines_changed_octocat"), Some((10, 4)));
    }

    #[test]
    fn missing_key_is_a_miss() {
        let dir = TempDir::new().expect("tempdir");
        let cache = Cache::new(dir.path(), 3600);
        assert_eq!(cache.get::<u64>("never-set"), None);
    }

    #[test]
    fn expired_entry_is_deleted_on_read() {
        let dir = TempDir::new().expect("tempdir");
        let cache = Cache::new(dir.path(), 60);

        // Write an entry whose timestamp is well past the TTL.
        let path = cache.entry_path("views_octocat");
        fs::create_dir_all(dir.path()).expect("create dir");
        let stale = json!({ "timestamp": Utc::now().timestamp() - 120, "value": 42 });
        fs::write(&path, serde_json::to_vec(&stale).expect("serialize")).expect("write");

        assert_eq!(cache.get::<u64>("views_octocat"), None);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_entry_is_deleted_on_read() {
        let dir = TempDir::new().expect("tempdir");
        let cache = Cache::new(dir.path(), 3600);

        let path = cache.entry_path("views_octocat");
        fs::create_dir_all(dir.path()).expect("create dir");
        fs::write(&path, b"not json at all").expect("write");

        assert_eq!(cache.get::<Value>("views_octocat"), None);
        assert!(!path.exists());
    }

    #[test]
    fn filenames_are_hashed_hex() {
        let cache = Cache::new("/tmp/whatever", 3600);
        let path = cache.entry_path("repos/owner with spaces/../tricky");
        let file_name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        let (stem, ext) = file_name.split_at(file_name.len() - 5);
        assert_eq!(ext, ".json");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn set_is_best_effort_on_bad_directory() {
        // A file standing where the directory should be makes every write
        // fail; reads and writes must still be non-panicking no-ops.
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"").expect("write blocker");

        let cache = Cache::new(&blocker, 3600);
        cache.set("key", &1u64);
        assert_eq!(cache.get::<u64>("key"), None);
    }
}
