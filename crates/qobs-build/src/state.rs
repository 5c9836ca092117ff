//! Incremental build state
//!
//! The state file (`qobs_build_state.json`, next to the artifacts) maps
//! each target to the content hashes of its sources and upstream
//! artifacts plus the flag lists used, so the next invocation can decide
//! what is dirty. A corrupted state file is not fatal: the build
//! proceeds as if no prior state existed. Save failures are warnings.

use crate::msg;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// State file name inside the build directory
pub const STATE_FILE: &str = "qobs_build_state.json";

/// Per-target incremental record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    /// Source file path -> content hash
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, String>,
    /// Dependency target name -> artifact content hash
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Compile flags used
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cflags: Vec<String>,
    /// Link flags used
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ldflags: Vec<String>,
}

/// The on-disk build state, keyed by target name
#[derive(Debug, Default)]
pub struct StateStore {
    path: PathBuf,
    states: BTreeMap<String, TargetState>,
}

impl StateStore {
    /// Load the state store from a build directory.
    ///
    /// A missing file yields an empty store; a corrupted file warns and
    /// yields an empty store.
    pub fn load(build_dir: &Path) -> Self {
        let path = build_dir.join(STATE_FILE);
        let states = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(states) => states,
                Err(e) => {
                    msg::warn(format!("failed to load build state: {e}"));
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                msg::warn(format!("failed to load build state: {e}"));
                BTreeMap::new()
            }
        };
        Self { path, states }
    }

    /// Get the recorded state for a target
    pub fn get(&self, target: &str) -> Option<&TargetState> {
        self.states.get(target)
    }

    /// Replace the recorded state for a target
    pub fn set(&mut self, target: impl Into<String>, state: TargetState) {
        self.states.insert(target.into(), state);
    }

    /// Persist the store; failure is reported as a warning
    pub fn save(&self) {
        let data = match serde_json::to_string_pretty(&self.states) {
            Ok(data) => data,
            Err(e) => {
                msg::warn(format!("failed to save build state: {e}"));
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, data) {
            msg::warn(format!("failed to save build state: {e}"));
        }
    }
}

/// SHA-256 file hashing with an in-memory memo.
///
/// A path's content is assumed stable within one build invocation.
#[derive(Debug, Default)]
pub struct HashCache {
    cache: HashMap<PathBuf, String>,
}

impl HashCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a file's contents, hex-encoded, memoised per path
    pub fn file_hash(&mut self, path: &Path) -> io::Result<String> {
        if let Some(hash) = self.cache.get(path) {
            return Ok(hash.clone());
        }

        let contents = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let hex = format!("{:x}", hasher.finalize());

        self.cache.insert(path.to_path_buf(), hex.clone());
        Ok(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path());
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn test_corrupted_state_file_is_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "{ not json").unwrap();
        let store = StateStore::load(dir.path());
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();

        let mut store = StateStore::load(dir.path());
        let mut state = TargetState::default();
        state
            .sources
            .insert("/src/main.c".to_string(), "abc123".to_string());
        state
            .dependencies
            .insert("zlib".to_string(), "def456".to_string());
        state.cflags = vec!["-O3".to_string()];
        state.ldflags = vec!["-lm".to_string()];
        store.set("hello", state.clone());
        store.save();

        let reloaded = StateStore::load(dir.path());
        assert_eq!(reloaded.get("hello"), Some(&state));
        assert!(reloaded.get("other").is_none());
    }

    #[test]
    fn test_file_hash_stable_and_cached() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.c");
        fs::write(&file, "int x;").unwrap();

        let mut cache = HashCache::new();
        let first = cache.file_hash(&file).unwrap();
        assert_eq!(first.len(), 64);

        // The memo means a rewrite within the run is not observed
        fs::write(&file, "int y;").unwrap();
        let second = cache.file_hash(&file).unwrap();
        assert_eq!(first, second);

        let mut fresh = HashCache::new();
        assert_ne!(fresh.file_hash(&file).unwrap(), first);
    }

    #[test]
    fn test_file_hash_missing_file() {
        let mut cache = HashCache::new();
        assert!(cache.file_hash(Path::new("/does/not/exist")).is_err());
    }

    #[test]
    fn test_hash_matches_known_vector() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty");
        fs::write(&file, "").unwrap();

        let mut cache = HashCache::new();
        // SHA-256 of the empty string
        assert_eq!(
            cache.file_hash(&file).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
