//! Links between mirrored posts
//!
//! Every mirrored post is recorded as a Mastodon id ↔ Twitter id pair so
//! replies can be threaded on the other side. Only the Mastodon → Twitter
//! direction is written to disk; the reverse map is rebuilt on load.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StateError};

/// Two maps kept as exact inverses of one another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationTable {
    /// Mastodon id → Twitter id
    forward: HashMap<String, String>,
    /// Twitter id → Mastodon id
    reverse: HashMap<String, String>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a Mastodon post with a Twitter post
    ///
    /// Any earlier link of either id is dropped so both maps stay inverses.
    pub fn record(&mut self, mastodon_id: impl Into<String>, twitter_id: impl Into<String>) {
        let mastodon_id = mastodon_id.into();
        let twitter_id = twitter_id.into();

        if let Some(old_twitter) = self.forward.remove(&mastodon_id) {
            self.reverse.remove(&old_twitter);
        }
        if let Some(old_mastodon) = self.reverse.remove(&twitter_id) {
            self.forward.remove(&old_mastodon);
        }

        self.forward.insert(mastodon_id.clone(), twitter_id.clone());
        self.reverse.insert(twitter_id, mastodon_id);
    }

    /// Twitter id mirrored from a Mastodon id
    pub fn lookup_forward(&self, mastodon_id: &str) -> Option<&str> {
        self.forward.get(mastodon_id).map(String::as_str)
    }

    /// Mastodon id mirrored from a Twitter id
    pub fn lookup_reverse(&self, twitter_id: &str) -> Option<&str> {
        self.reverse.get(twitter_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Load a table saved by [`save`](Self::save)
    ///
    /// A missing file is a fresh start. A file that cannot be read or parsed is
    /// logged and treated the same way rather than stopping the mirror. Ids may be
    /// stored as JSON strings or numbers.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no correlation table yet");
                return Ok(Self::new());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "correlation table cannot be read, starting empty");
                return Ok(Self::new());
            }
        };

        let raw: HashMap<String, Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "correlation table is unreadable, starting empty");
                return Ok(Self::new());
            }
        };

        let mut table = Self::new();
        for (mastodon_id, value) in raw {
            match value {
                Value::String(twitter_id) => table.record(mastodon_id, twitter_id),
                Value::Number(n) => table.record(mastodon_id, n.to_string()),
                other => {
                    warn!(mastodon_id = %mastodon_id, value = %other, "skipping malformed correlation entry")
                }
            }
        }

        debug!(entries = table.len(), "loaded correlation table");
        Ok(table)
    }

    /// Write the Mastodon → Twitter map as JSON
    ///
    /// The file is replaced atomically: a crash mid-write leaves the previous
    /// table in place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_error = |source: std::io::Error| StateError::Io {
            path: path.display().to_string(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_error)?;

        let json = serde_json::to_string_pretty(&self.forward).map_err(StateError::Encode)?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        file.write_all(json.as_bytes()).map_err(io_error)?;
        file.as_file().sync_all().map_err(io_error)?;
        file.persist(path).map_err(|e| io_error(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn assert_inverse(table: &CorrelationTable) {
        assert_eq!(table.forward.len(), table.reverse.len());
        for (m, t) in &table.forward {
            assert_eq!(table.reverse.get(t), Some(m));
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut table = CorrelationTable::new();
        table.record("m1", "t1");

        assert_eq!(table.lookup_forward("m1"), Some("t1"));
        assert_eq!(table.lookup_reverse("t1"), Some("m1"));
        assert_eq!(table.lookup_forward("t1"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rerecord_keeps_maps_inverse() {
        let mut table = CorrelationTable::new();
        table.record("m1", "t1");
        table.record("m1", "t2");
        assert_eq!(table.lookup_forward("m1"), Some("t2"));
        assert_eq!(table.lookup_reverse("t1"), None);
        assert_inverse(&table);

        table.record("m2", "t2");
        assert_eq!(table.lookup_forward("m1"), None);
        assert_eq!(table.lookup_reverse("t2"), Some("m2"));
        assert_inverse(&table);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut table = CorrelationTable::new();
        table.record("110", "1500");
        table.record("111", "1501");
        table.save(&path).unwrap();

        let loaded = CorrelationTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.lookup_reverse("1501"), Some("111"));
        assert_inverse(&loaded);

        // Only the forward direction is on disk
        let raw: HashMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.get("110").map(String::as_str), Some("1500"));
    }

    #[test]
    fn test_save_overwrites_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut table = CorrelationTable::new();
        table.record("1", "2");
        table.save(&path).unwrap();
        table.record("3", "4");
        table.save(&path).unwrap();

        assert_eq!(CorrelationTable::load(&path).unwrap().len(), 2);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let table = CorrelationTable::load(&dir.path().join("absent.json")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(CorrelationTable::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_unreadable_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

        let table = CorrelationTable::load(&path).unwrap();
        assert_eq!(table.len(), 0);

        // A directory in place of the file is not fatal either
        assert!(CorrelationTable::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_numeric_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"109876543210": 1234567890123456789, "42": "77", "bad": [1]}"#,
        )
        .unwrap();

        let table = CorrelationTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup_forward("109876543210"),
            Some("1234567890123456789")
        );
        assert_eq!(table.lookup_reverse("77"), Some("42"));
    }

    #[test]
    fn test_save_to_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let table = CorrelationTable::new();
        let err = table.save(&blocker.join("state.json")).unwrap_err();
        assert!(err.to_string().contains("state.json") || err.to_string().contains("file"));
    }
}
