//! TTL-scoped result cache.
//!
//! One JSON file per key under the cache directory, written atomically
//! (temp file + rename) so concurrent analyses for different scopes never
//! observe a torn entry; the last rename wins. Every failure mode on the read
//! path — missing file, unreadable backend, corrupt JSON, expired entry —
//! degrades to a miss, never an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// How long a stored result stays valid.
pub const RESULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    stored_at: u64,
    ttl_secs: u64,
    payload: T,
}

/// File-backed key/value store with per-entry TTL.
#[derive(Debug, Clone)]
pub struct ResultCache {
    cache_dir: PathBuf,
}

impl ResultCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Fetch a live entry. Any failure is a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);
        let contents = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry<T> = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, path = %path.display(), err = %err, "discarding corrupt cache entry");
                return None;
            }
        };
        let age = now_unix().saturating_sub(entry.stored_at);
        if age >= entry.ttl_secs {
            debug!(key, age_secs = age, "cache entry expired");
            return None;
        }
        debug!(key, age_secs = age, "cache hit");
        Some(entry.payload)
    }

    /// Store an entry with the given TTL (temp file + rename).
    pub fn set<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            stored_at: now_unix(),
            ttl_secs: ttl.as_secs(),
            payload,
        };
        let mut buf = serde_json::to_string_pretty(&entry).context("serialize cache entry")?;
        buf.push('\n');
        let path = self.entry_path(key);
        write_atomic(&path, &buf)
    }

    /// Entries are addressed by a content hash of the key: keys embed absolute
    /// paths, which are not filename-safe.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        self.cache_dir.join(format!("{hex}.json"))
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("cache path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp cache entry {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace cache entry {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn set_then_get_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());

        let mut value = BTreeMap::new();
        value.insert("alpha".to_string(), "src/alpha.mod".to_string());
        cache.set("key-a", &value, RESULT_TTL).expect("set");

        let loaded: BTreeMap<String, String> = cache.get("key-a").expect("hit");
        assert_eq!(loaded, value);
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());

        cache.set("key-a", &1u32, RESULT_TTL).expect("set");
        cache.set("key-b", &2u32, RESULT_TTL).expect("set");

        assert_eq!(cache.get::<u32>("key-a"), Some(1));
        assert_eq!(cache.get::<u32>("key-b"), Some(2));
    }

    #[test]
    fn missing_key_is_a_miss() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());
        assert_eq!(cache.get::<u32>("absent"), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());
        cache.set("key-a", &1u32, Duration::from_secs(0)).expect("set");
        assert_eq!(cache.get::<u32>("key-a"), None);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());
        cache.set("key-a", &1u32, RESULT_TTL).expect("set");

        // Clobber the stored file behind the cache's back.
        let digest = Sha256::digest(b"key-a");
        let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        fs::write(temp.path().join(format!("{hex}.json")), "not json").expect("clobber");

        assert_eq!(cache.get::<u32>("key-a"), None);
    }

    #[test]
    fn type_mismatch_is_a_miss() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ResultCache::new(temp.path());
        cache.set("key-a", &"text", RESULT_TTL).expect("set");
        assert_eq!(cache.get::<u32>("key-a"), None);
    }
}
