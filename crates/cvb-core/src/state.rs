//! Small persisted state: the last-used channel id and the operator-managed
//! keyword list. Load-on-start, save-on-mutate, atomic whole-file rewrite.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::Result;

/// Last-used numeric channel identifier, persisted as a single JSON scalar.
#[derive(Clone, Debug)]
pub struct ChannelStore {
    path: PathBuf,
    default_id: i64,
}

impl ChannelStore {
    pub fn new(path: impl Into<PathBuf>, default_id: i64) -> Self {
        Self {
            path: path.into(),
            default_id,
        }
    }

    /// An absent or unreadable file falls back to the configured default.
    pub fn load(&self) -> i64 {
        match std::fs::read_to_string(&self.path) {
            Ok(txt) => serde_json::from_str(&txt).unwrap_or(self.default_id),
            Err(_) => self.default_id,
        }
    }

    pub fn save(&self, channel_id: i64) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_string(&channel_id)?)
    }
}

/// Operator-managed keyword strings, persisted as a JSON array.
#[derive(Clone, Debug)]
pub struct KeywordStore {
    path: PathBuf,
}

impl KeywordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(txt) => serde_json::from_str(&txt).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns `false` when the keyword was already present.
    pub fn add(&self, keyword: &str) -> Result<bool> {
        let mut all = self.load();
        if all.iter().any(|k| k == keyword) {
            return Ok(false);
        }
        all.push(keyword.to_string());
        self.save(&all)?;
        Ok(true)
    }

    /// Returns `false` when the keyword was not present.
    pub fn remove(&self, keyword: &str) -> Result<bool> {
        let mut all = self.load();
        let before = all.len();
        all.retain(|k| k != keyword);
        if all.len() == before {
            return Ok(false);
        }
        self.save(&all)?;
        Ok(true)
    }

    fn save(&self, all: &[String]) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_string(all)?)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Whether incoming plain-text messages are captured as keywords.
///
/// Owned state with a single mutation entry point instead of a process-wide
/// flag, so the dispatcher can be exercised with a local instance.
#[derive(Debug, Default)]
pub struct MonitorState {
    enabled: AtomicBool,
}

impl MonitorState {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_store_defaults_then_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChannelStore::new(tmp.path().join("channel_id"), -100123);

        assert_eq!(store.load(), -100123);
        store.save(-200456).unwrap();
        assert_eq!(store.load(), -200456);
    }

    #[test]
    fn channel_store_ignores_garbage_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("channel_id");
        std::fs::write(&path, "not json").unwrap();

        let store = ChannelStore::new(path, 7);
        assert_eq!(store.load(), 7);
    }

    #[test]
    fn keyword_store_adds_and_removes_persistently() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeywordStore::new(tmp.path().join("keywords.json"));

        assert!(store.add("netflix").unwrap());
        assert!(!store.add("netflix").unwrap());
        assert!(store.add("spotify").unwrap());

        let reopened = KeywordStore::new(tmp.path().join("keywords.json"));
        assert_eq!(reopened.load(), vec!["netflix", "spotify"]);

        assert!(reopened.remove("netflix").unwrap());
        assert!(!reopened.remove("netflix").unwrap());
        assert_eq!(reopened.load(), vec!["spotify"]);
    }

    #[test]
    fn monitor_state_toggles_through_single_entry_point() {
        let monitor = MonitorState::default();
        assert!(!monitor.enabled());
        monitor.set_enabled(true);
        assert!(monitor.enabled());
        monitor.set_enabled(false);
        assert!(!monitor.enabled());
    }
}
