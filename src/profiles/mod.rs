//! Persistent store of named connection profiles
//!
//! Profiles hold the non-secret parameters of a MySQL connection. They are
//! kept in a single TOML file:
//!
//! ```toml
//! [profiles.reporting]
//! host = "db.internal"
//! port = 3306
//! user = "analyst"
//! database = "sales"
//! ```
//!
//! Passwords are supplied at connect time and never written. Every mutation
//! rewrites the whole file through a temporary sibling and an atomic rename,
//! so readers see either the old or the new store, never a torn one.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{HawkError, ProfileError, Result};

/// Default MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// A named, persisted set of connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct ConnectionProfile {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Host")]
    pub host: String,
    #[tabled(rename = "Port")]
    pub port: u16,
    #[tabled(rename = "User")]
    pub user: String,
    #[tabled(rename = "Database")]
    pub database: String,
}

impl ConnectionProfile {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            user: user.into(),
            database: database.into(),
        }
    }

    /// Check the fields a connection cannot do without
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid("profile name is empty".into()).into());
        }
        if self.host.trim().is_empty() {
            return Err(ProfileError::Invalid(format!("profile '{}' has no host", self.name)).into());
        }
        if self.port == 0 {
            return Err(ProfileError::Invalid(format!("profile '{}' has port 0", self.name)).into());
        }
        Ok(())
    }
}

/// On-disk record; the profile name is the table key
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRecord {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    user: String,
    #[serde(default)]
    database: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    profiles: BTreeMap<String, ProfileRecord>,
}

impl ProfileRecord {
    fn into_profile(self, name: String) -> ConnectionProfile {
        ConnectionProfile {
            name,
            host: self.host,
            port: self.port,
            user: self.user,
            database: self.database,
        }
    }
}

impl From<&ConnectionProfile> for ProfileRecord {
    fn from(p: &ConnectionProfile) -> Self {
        Self {
            host: p.host.clone(),
            port: p.port,
            user: p.user.clone(),
            database: p.database.clone(),
        }
    }
}

/// File-backed profile store
///
/// Safe to share between threads (e.g. behind an `Arc`); saves and deletes
/// are serialized by an internal lock around their read-modify-write cycle.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProfileStore {
    /// Open a store at the given file path; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profiles, ordered by name
    pub fn list(&self) -> Result<Vec<ConnectionProfile>> {
        let store = self.read_store()?;
        Ok(store
            .profiles
            .into_iter()
            .map(|(name, record)| record.into_profile(name))
            .collect())
    }

    /// Load one profile by name
    pub fn load(&self, name: &str) -> Result<ConnectionProfile> {
        let mut store = self.read_store()?;
        store
            .profiles
            .remove(name)
            .map(|record| record.into_profile(name.to_string()))
            .ok_or_else(|| ProfileError::NotFound(name.to_string()).into())
    }

    /// Save a profile
    ///
    /// Fails with `DuplicateName` if the name exists and `overwrite` is false;
    /// the store is left unchanged in that case.
    pub fn save(&self, profile: &ConnectionProfile, overwrite: bool) -> Result<()> {
        profile.validate()?;

        let _guard = self.lock();
        let mut store = self.read_store()?;
        if !overwrite && store.profiles.contains_key(&profile.name) {
            return Err(ProfileError::DuplicateName(profile.name.clone()).into());
        }

        store
            .profiles
            .insert(profile.name.clone(), ProfileRecord::from(profile));
        self.write_store(&store)?;

        info!("Saved connection profile '{}'", profile.name);
        Ok(())
    }

    /// Delete a profile by name
    pub fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.lock();
        let mut store = self.read_store()?;
        if store.profiles.remove(name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()).into());
        }
        self.write_store(&store)?;

        info!("Deleted connection profile '{}'", name);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // guards no data, poisoning is irrelevant
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_store(&self) -> Result<StoreFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Profile store {} does not exist yet", self.path.display());
                return Ok(StoreFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content).map_err(|e| {
            HawkError::from(ProfileError::InvalidFormat {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
        })
    }

    fn write_store(&self, store: &StoreFile) -> Result<()> {
        let content = toml::to_string_pretty(store).map_err(|e| {
            HawkError::from(ProfileError::InvalidFormat {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
        })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| HawkError::Io(e.error))?;

        debug!(
            "Wrote {} profiles to {}",
            store.profiles.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.toml"));
        (dir, store)
    }

    fn profile(name: &str) -> ConnectionProfile {
        ConnectionProfile::new(name, "localhost", 3306, "root", "shop")
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let p = profile("test");
        store.save(&p, false).unwrap();
        assert_eq!(store.load("test").unwrap(), p);
    }

    #[test]
    fn test_delete_then_load_is_not_found() {
        let (_dir, store) = store();
        store.save(&profile("test"), false).unwrap();
        store.delete("test").unwrap();

        let err = store.load("test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFoundError);
    }

    #[test]
    fn test_duplicate_without_overwrite() {
        let (_dir, store) = store();
        store.save(&profile("test"), false).unwrap();

        let mut changed = profile("test");
        changed.host = "db.example.com".to_string();
        let err = store.save(&changed, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateNameError);
        assert_eq!(store.load("test").unwrap().host, "localhost");

        store.save(&changed, true).unwrap();
        assert_eq!(store.load("test").unwrap().host, "db.example.com");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.delete("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFoundError);
    }

    #[test]
    fn test_list_is_sorted_and_empty_when_missing() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());

        store.save(&profile("zeta"), false).unwrap();
        store.save(&profile("alpha"), false).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_password_never_persisted() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            "[profiles.legacy]\nhost = \"h\"\nuser = \"u\"\npassword = \"secret\"\n",
        )
        .unwrap();

        let legacy = store.load("legacy").unwrap();
        assert_eq!(legacy.port, DEFAULT_PORT);

        store.save(&profile("other"), false).unwrap();
        let content = fs::read_to_string(store.path()).unwrap();
        assert!(!content.contains("secret"));
        assert!(!content.contains("password"));
        assert!(content.contains("[profiles.legacy]"));
    }

    #[test]
    fn test_malformed_store_is_not_overwritten() {
        let (_dir, store) = store();
        fs::write(store.path(), "this is [not toml").unwrap();

        assert!(store.save(&profile("test"), false).is_err());
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "this is [not toml"
        );
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let (_dir, store) = store();
        let mut p = profile("test");
        p.port = 0;
        assert!(store.save(&p, false).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_concurrent_saves_are_serialized() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.save(&profile(&format!("p{i}")), false))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        assert_eq!(store.list().unwrap().len(), 8);
    }
}
