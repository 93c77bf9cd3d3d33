// src/store.rs
// Persisted session records and the stores that keep them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::defs::{BaseId, Number, TicketId, DEFAULT_MAX_BALLS};
use crate::error::{BingoError, BingoResult};
use crate::logging::log_warning;
use crate::prize::PrizeDefinition;

fn default_max_balls() -> Number {
    DEFAULT_MAX_BALLS
}

/// A ticket base attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSource {
    pub id: BaseId,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
}

/// Everything needed to rebuild a session after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default = "default_max_balls")]
    pub max_balls: Number,
    #[serde(default)]
    pub open_play: bool,
    #[serde(default)]
    pub bases: Vec<BaseSource>,
    #[serde(default)]
    pub prizes: Vec<PrizeDefinition>,
    #[serde(default)]
    pub registered: Vec<TicketId>,
    #[serde(default)]
    pub drawn: Vec<Number>,
}

impl SessionRecord {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            created_at: now_string(),
            max_balls: DEFAULT_MAX_BALLS,
            open_play: false,
            bases: Vec::new(),
            prizes: Vec::new(),
            registered: Vec::new(),
            drawn: Vec::new(),
        }
    }
}

/// Session ids become file names, so only letters, digits, '-' and '_' are
/// accepted.
pub fn validate_session_id(id: &str) -> BingoResult<()> {
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(BingoError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

pub fn now_string() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Durable storage for session records. A failed `save` leaves the
/// previously stored record in place.
pub trait SessionStore: Send + Sync {
    fn load_all(&self) -> BingoResult<Vec<SessionRecord>>;
    fn save(&self, record: &SessionRecord) -> BingoResult<()>;
}

/// One pretty-printed JSON file per session under `<data_dir>/sessions`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            dir: data_dir.as_ref().join("sessions"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> BingoResult<PathBuf> {
        validate_session_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl SessionStore for JsonFileStore {
    fn load_all(&self) -> BingoResult<Vec<SessionRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(BingoError::from)
                .and_then(|content| serde_json::from_str::<SessionRecord>(&content).map_err(BingoError::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => log_warning(&format!("Ignoring session file {}: {e}", path.display())),
            }
        }
        Ok(records)
    }

    fn save(&self, record: &SessionRecord) -> BingoResult<()> {
        let path = self.record_path(&record.id)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Keeps records in memory. Writes can be made to fail for exercising
/// rollback paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, SessionRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SessionRecord>) -> Self {
        let store = Self::default();
        if let Ok(mut map) = store.records.lock() {
            map.extend(records.into_iter().map(|r| (r.id.clone(), r)));
        }
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.records.lock().ok().and_then(|map| map.get(id).cloned())
    }
}

impl SessionStore for MemoryStore {
    fn load_all(&self) -> BingoResult<Vec<SessionRecord>> {
        let map = self.records.lock().map_err(|_| BingoError::LockPoisoned("memory store"))?;
        Ok(map.values().cloned().collect())
    }

    fn save(&self, record: &SessionRecord) -> BingoResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BingoError::Persistence(format!("write of session '{}' refused", record.id)));
        }
        let mut map = self.records.lock().map_err(|_| BingoError::LockPoisoned("memory store"))?;
        map.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prize::PrizeKind;

    fn sample_record() -> SessionRecord {
        let mut record = SessionRecord::new("evening", "Evening draw");
        record.bases.push(BaseSource { id: 1, name: "Main".to_string(), path: PathBuf::from("bases/main.txt") });
        record.prizes.push(PrizeDefinition {
            id: 1,
            name: "Quina".to_string(),
            kind: PrizeKind::Quina,
            base_id: 1,
            grid_index: 0,
            pattern_indices: Vec::new(),
            active: true,
            realized: true,
        });
        record.registered = vec![1, 5];
        record.drawn = vec![12, 7];
        record
    }

    #[test]
    fn test_record_defaults_from_minimal_json() {
        let record: SessionRecord = serde_json::from_str(r#"{"id":"s1"}"#).unwrap();
        assert_eq!(record.max_balls, DEFAULT_MAX_BALLS);
        assert!(!record.open_play);
        assert!(record.prizes.is_empty() && record.drawn.is_empty());
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_all().unwrap().is_empty());

        let record = sample_record();
        store.save(&record).unwrap();
        let mut updated = record.clone();
        updated.drawn.push(33);
        store.save(&updated).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![updated]);
        assert!(store.dir().join("evening.json").exists());
    }

    #[test]
    fn test_json_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save(&sample_record()).unwrap();
        fs::write(store.dir().join("broken.json"), "{not json").unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_json_store_rejects_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        for id in ["../escape", "a/b", "a b", ""] {
            let record = SessionRecord::new(id, "x");
            assert!(matches!(store.save(&record), Err(BingoError::InvalidSessionId(_))));
        }
        store.save(&SessionRecord::new("a_b", "x")).unwrap();
        assert!(store.dir().join("a_b.json").exists());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("sunday-bingo_2").is_ok());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("a.b").is_err());
        assert!(validate_session_id("").is_err());
    }

    #[test]
    fn test_memory_store_failure_keeps_previous() {
        let store = MemoryStore::new();
        let record = sample_record();
        store.save(&record).unwrap();

        store.set_fail_writes(true);
        let mut changed = record.clone();
        changed.drawn.clear();
        assert!(matches!(store.save(&changed), Err(BingoError::Persistence(_))));
        assert_eq!(store.get("evening"), Some(record));
    }
}
