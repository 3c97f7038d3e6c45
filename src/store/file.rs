// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! File-backed token store.
//!
//! All keys live in one JSON object. Nothing is cached: every operation
//! re-reads the file, so several handles (and several processes) on the
//! same path see each other's writes. A sidecar `.lock` file serializes
//! writers with an advisory lock; readers take it shared. Writes go to a
//! unique temp file that is renamed over the original.

use super::{StoreError, TokenStore};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

type Entries = BTreeMap<String, String>;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held advisory lock. Released when the file is closed.
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl FileStore {
    /// Open (or lazily create) the store at `path`. Fails if an existing
    /// file is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        let store = Self {
            path,
            lock_path: PathBuf::from(lock_path),
        };

        let entries = {
            let _lock = store.lock(false)?;
            store.read_entries()?
        };
        tracing::debug!(path = %store.path.display(), keys = entries.len(), "Opened token store");

        Ok(store)
    }

    fn lock(&self, exclusive: bool) -> Result<LockGuard, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        if exclusive {
            file.lock()?;
        } else {
            file.lock_shared()?;
        }
        Ok(LockGuard(file))
    }

    fn read_entries(&self) -> Result<Entries, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Entries::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), StoreError> {
        let tmp = self.path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read-modify-write under the exclusive lock. `update` returns whether
    /// anything changed; unchanged files are not rewritten.
    fn update<T>(&self, update: impl FnOnce(&mut Entries) -> (bool, T)) -> Result<T, StoreError> {
        let _lock = self.lock(true)?;
        let mut entries = self.read_entries()?;
        let (changed, result) = update(&mut entries);
        if changed {
            self.write_entries(&entries)?;
        }
        Ok(result)
    }
}

impl TokenStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.lock(false).and_then(|_lock| self.read_entries());
        match entries {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read token store");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            let old = entries.insert(key.to_string(), value.to_string());
            (old.as_deref() != Some(value), ())
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| (entries.remove(key).is_some(), ()))
    }

    fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.update(|entries| {
            let matches = entries.get(key).map(String::as_str) == Some(expected);
            if matches {
                entries.remove(key);
            }
            (matches, matches)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path).unwrap();
        store.set(keys::ACCESS_TOKEN, "a1").unwrap();
        store.set(keys::REFRESH_TOKEN, "r1").unwrap();
        store.remove(keys::REFRESH_TOKEN).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(keys::ACCESS_TOKEN), Some("a1".to_string()));
        assert_eq!(reopened.get(keys::REFRESH_TOKEN), None);
    }

    #[test]
    fn handles_on_one_path_share_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let a = FileStore::open(&path).unwrap();
        let b = FileStore::open(&path).unwrap();

        a.set(keys::ACCESS_TOKEN, "a1").unwrap();
        assert_eq!(b.get(keys::ACCESS_TOKEN), Some("a1".to_string()));

        // A write through one handle keeps what the other wrote.
        b.set(keys::AUTH_EVENT, "{}").unwrap();
        let fresh = FileStore::open(&path).unwrap();
        assert_eq!(fresh.get(keys::ACCESS_TOKEN), Some("a1".to_string()));
        assert_eq!(fresh.get(keys::AUTH_EVENT), Some("{}".to_string()));

        b.remove(keys::ACCESS_TOKEN).unwrap();
        assert_eq!(a.get(keys::ACCESS_TOKEN), None);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileStore::open(&path).unwrap();
                    for i in 0..10 {
                        store.set(&format!("k{t}-{i}"), "v").unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        for t in 0..4 {
            for i in 0..10 {
                assert_eq!(store.get(&format!("k{t}-{i}")).as_deref(), Some("v"));
            }
        }
        // No temp files left behind.
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn remove_if_only_removes_matching_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("s.json")).unwrap();

        store.set(keys::AUTH_EVENT, "new").unwrap();
        assert!(!store.remove_if(keys::AUTH_EVENT, "old").unwrap());
        assert_eq!(store.get(keys::AUTH_EVENT).as_deref(), Some("new"));
        assert!(store.remove_if(keys::AUTH_EVENT, "new").unwrap());
        assert_eq!(store.get(keys::AUTH_EVENT), None);
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested/absent.json")).unwrap();
        assert_eq!(store.get("anything"), None);
        store.set("k", "v").unwrap();
        assert!(dir.path().join("nested/absent.json").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
