//! One JSON file per student.
//!
//! Layout: `<dir>/<key>_results.json`, a pretty-printed array of attempt
//! records in append order. Appends for one student are serialized twice
//! over: an in-process mutex per key, and a `<key>.lock` file created
//! exclusively so other processes queue behind us. The lock file names the
//! owning pid, so a lock left by a killed process can be spotted and removed. The new array is written
//! to a temp file and renamed into place, so readers never see a torn file.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use mastery_core::{MasteryError, MasteryResult, ProgressStore, QuizAttemptResult};

const FILE_SUFFIX: &str = "_results.json";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(15);

/// Filesystem-safe key for a student name.
///
/// Lowercases and turns spaces into underscores. Names that still contain
/// anything outside `[a-z0-9_-]` get those characters replaced and a short
/// SHA-256 suffix of the raw name, so distinct names cannot share a key
/// through sanitization alone.
pub fn student_key(student: &str) -> String {
    let base = student.to_lowercase().replace(' ', "_");
    let safe = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-';
    if !base.is_empty() && base.chars().all(safe) {
        return base;
    }

    let cleaned: String = base
        .chars()
        .map(|c| if safe(c) { c } else { '_' })
        .collect();
    let digest = format!("{:x}", Sha256::digest(student.as_bytes()));
    format!("{cleaned}-{}", &digest[..8])
}

pub struct JsonFileStore {
    dir: PathBuf,
    lock_timeout: Duration,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonFileStore {
    pub fn new(dir: &Path) -> MasteryResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            MasteryError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// How long an append waits on another process's lock file before failing.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, student: &str) -> PathBuf {
        self.dir
            .join(format!("{}{FILE_SUFFIX}", student_key(student)))
    }

    fn key_lock(&self, key: &str) -> MasteryResult<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| MasteryError::Storage("key lock table poisoned".into()))?;
        Ok(locks.entry(key.to_string()).or_default().clone())
    }

    fn acquire_file_lock(&self, key: &str) -> MasteryResult<FileLock> {
        let path = self.dir.join(format!("{key}.lock"));
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let lock = FileLock { path };
                    // Owner info only; a failed write still leaves a valid lock.
                    let owner = format!(
                        "pid={} since={}\n",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    if let Err(e) = file.write_all(owner.as_bytes()) {
                        warn!("cannot record owner in {}: {e}", lock.path.display());
                    }
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.lock_timeout {
                        let owner = fs::read_to_string(&path).unwrap_or_default();
                        let owner = match owner.trim() {
                            "" => "unknown owner".to_string(),
                            o => o.to_string(),
                        };
                        return Err(MasteryError::Storage(format!(
                            "timed out waiting for {} (held by {owner}); \
                             delete the file if that process is gone",
                            path.display()
                        )));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(MasteryError::Storage(format!(
                        "cannot create {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }

    fn read_file(path: &Path) -> MasteryResult<Vec<QuizAttemptResult>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(MasteryError::Storage(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write_file(path: &Path, records: &[QuizAttemptResult]) -> MasteryResult<()> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| {
            MasteryError::Storage(format!("cannot write {}: {e}", path.display()))
        };

        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

/// Removes the lock file when the append finishes, successfully or not.
struct FileLock {
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release {}: {e}", self.path.display());
        }
    }
}

impl ProgressStore for JsonFileStore {
    fn append(&self, result: &QuizAttemptResult) -> MasteryResult<()> {
        let key = student_key(&result.student);
        let key_lock = self.key_lock(&key)?;
        let _guard = key_lock
            .lock()
            .map_err(|_| MasteryError::Storage(format!("lock for {key} poisoned")))?;
        let _file_lock = self.acquire_file_lock(&key)?;

        let path = self.path_for(&result.student);
        let mut records = Self::read_file(&path)?;
        records.push(result.clone());
        Self::write_file(&path, &records)?;

        debug!(
            student = %result.student,
            records = records.len(),
            "appended to {}",
            path.display()
        );
        Ok(())
    }

    fn history(&self, student: &str, topic: Option<&str>) -> MasteryResult<Vec<QuizAttemptResult>> {
        let mut records = Self::read_file(&self.path_for(student))?;
        // Different spellings can share a key; keep only this exact name.
        records.retain(|r| r.student == student && topic.map_or(true, |t| r.topic == t));
        Ok(records)
    }

    fn students(&self) -> MasteryResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            MasteryError::Storage(format!("cannot list {}: {e}", self.dir.display()))
        })?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| MasteryError::Storage(e.to_string()))?;
            let path = entry.path();
            let is_results = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(FILE_SUFFIX));
            if !is_results {
                continue;
            }
            for record in Self::read_file(&path)? {
                names.insert(record.student);
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mastery_core::{evaluate, next_level, Level};

    fn make_result(student: &str, topic: &str, outcomes: &[bool]) -> QuizAttemptResult {
        QuizAttemptResult::new(student, Utc::now(), evaluate(outcomes, topic))
    }

    #[test]
    fn test_student_key() {
        assert_eq!(student_key("Ada Lovelace"), "ada_lovelace");
        assert_eq!(student_key("bob-2"), "bob-2");

        let slash = student_key("ada/lovelace");
        assert!(slash.starts_with("ada_lovelace-"));
        assert_eq!(slash.len(), "ada_lovelace-".len() + 8);
        assert_ne!(slash, student_key("ada?lovelace"));
        assert!(!student_key("../etc").contains('/'));
        assert!(!student_key("").is_empty());
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        store
            .append(&make_result("Ada Lovelace", "Newton's 1st Law", &[true, false]))
            .unwrap();

        let path = dir.path().join("ada_lovelace_results.json");
        assert_eq!(store.path_for("Ada Lovelace"), path);
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["student_name"], "Ada Lovelace");
        assert_eq!(records[0]["topic"], "Newton's 1st Law");
        assert_eq!(records[0]["accuracy"], 50.0);
        assert_eq!(records[0]["level"], "Beginner");
        assert_eq!(records[0]["correct_count"], 1);
        assert_eq!(records[0]["total_count"], 2);
        assert!(records[0]["timestamp"].as_str().is_some());
        assert!(!dir.path().join("ada_lovelace.lock").exists());
    }

    #[test]
    fn test_append_history_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = make_result("ada", "Circles", &[true; 5]);
        let second = make_result("ada", "Triangles", &[false; 5]);
        {
            let store = JsonFileStore::new(dir.path()).unwrap();
            assert!(store.history("ada", None).unwrap().is_empty());
            store.append(&first).unwrap();
            store.append(&second).unwrap();
        }

        let store = JsonFileStore::new(dir.path()).unwrap();
        let history = store.history("ada", None).unwrap();
        assert_eq!(history, vec![first.clone(), second]);
        assert_eq!(store.history("ada", Some("Circles")).unwrap(), vec![first]);
        assert_eq!(next_level(&store, "ada", "Circles").unwrap(), Level::Advanced);
        assert_eq!(next_level(&store, "ada", "Lines").unwrap(), Level::Beginner);
    }

    #[test]
    fn test_names_sharing_a_key_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        store.append(&make_result("Ada Lovelace", "Circles", &[true])).unwrap();
        store.append(&make_result("ada lovelace", "Circles", &[false])).unwrap();

        assert_eq!(store.history("Ada Lovelace", None).unwrap().len(), 1);
        assert_eq!(store.history("ada lovelace", None).unwrap().len(), 1);
        assert_eq!(
            store.students().unwrap(),
            vec!["Ada Lovelace", "ada lovelace"]
        );
    }

    #[test]
    fn test_concurrent_appends_same_student() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10 {
                        let topic = format!("topic-{t}-{i}");
                        store.append(&make_result("ada", &topic, &[true])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.history("ada", None).unwrap().len(), 40);
    }

    #[test]
    fn test_separate_instances_share_file_lock() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let path = dir.path().to_path_buf();
                thread::spawn(move || {
                    let store = JsonFileStore::new(&path).unwrap();
                    for _ in 0..10 {
                        store.append(&make_result("ada", "Circles", &[true])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let store = JsonFileStore::new(dir.path()).unwrap();
        assert_eq!(store.history("ada", None).unwrap().len(), 30);
    }

    #[test]
    fn test_stale_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path())
            .unwrap()
            .with_lock_timeout(Duration::from_millis(50));
        std::fs::write(dir.path().join("ada.lock"), b"").unwrap();

        let err = store
            .append(&make_result("ada", "Circles", &[true]))
            .unwrap_err();
        assert!(matches!(err, MasteryError::Storage(_)));
        assert!(err.to_string().contains("unknown owner"));
        assert!(store.history("ada", None).unwrap().is_empty());
    }

    #[test]
    fn test_lock_file_records_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path())
            .unwrap()
            .with_lock_timeout(Duration::from_millis(50));

        let held = store.acquire_file_lock("ada").unwrap();
        let contents = std::fs::read_to_string(dir.path().join("ada.lock")).unwrap();
        assert!(contents.starts_with(&format!("pid={} since=", std::process::id())));

        let err = store
            .append(&make_result("ada", "Circles", &[true]))
            .unwrap_err()
            .to_string();
        assert!(err.contains(&format!("pid={}", std::process::id())), "{err}");
        assert!(err.contains("ada.lock"));

        drop(held);
        assert!(!dir.path().join("ada.lock").exists());
        store.append(&make_result("ada", "Circles", &[true])).unwrap();
    }

    #[test]
    fn test_concurrent_appends_distinct_students() {
        // "Ada Lovelace" and "ada lovelace" share a file; the rest do not.
        let students = ["Ada Lovelace", "ada lovelace", "bob", "Zoë", "carol/2"];
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());

        let handles: Vec<_> = students
            .iter()
            .map(|&name| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..10 {
                        let topic = format!("topic-{i}");
                        store.append(&make_result(name, &topic, &[true])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected: Vec<String> = (0..10).map(|i| format!("topic-{i}")).collect();
        for name in students {
            let topics: Vec<String> = store
                .history(name, None)
                .unwrap()
                .into_iter()
                .map(|r| r.topic)
                .collect();
            assert_eq!(topics, expected, "{name}");
        }

        let mut listed = store.students().unwrap();
        let mut all: Vec<String> = students.iter().map(|s| s.to_string()).collect();
        listed.sort();
        all.sort();
        assert_eq!(listed, all);

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 4);
    }

    #[test]
    fn test_reads_results_without_utc_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let legacy = r#"[
  {
    "student_name": "Ada Lovelace",
    "timestamp": "2024-11-02T09:15:27.123456",
    "topic": "Newton's 2nd Law",
    "accuracy": 90.0,
    "level": "Advanced",
    "correct_count": 9,
    "total_count": 10
  }
]"#;
        std::fs::write(dir.path().join("ada_lovelace_results.json"), legacy).unwrap();

        let history = store.history("Ada Lovelace", None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp.to_rfc3339(), "2024-11-02T09:15:27.123456+00:00");
        assert_eq!(
            next_level(&store, "Ada Lovelace", "Newton's 2nd Law").unwrap(),
            Level::Advanced
        );

        store
            .append(&make_result("Ada Lovelace", "Newton's 2nd Law", &[false]))
            .unwrap();
        assert_eq!(store.history("Ada Lovelace", None).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        std::fs::write(store.path_for("ada"), "not json").unwrap();
        assert!(matches!(
            store.history("ada", None),
            Err(MasteryError::Serialization(_))
        ));
    }
}
