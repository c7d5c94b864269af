use std::sync::Mutex;

use crate::attempt::QuizAttemptResult;
use crate::error::{MasteryError, MasteryResult};

/// Durable, append-only per-student quiz history.
///
/// Implementations must keep records in append order and must serialize
/// appends for the same student so concurrent writers never lose a record.
pub trait ProgressStore {
    fn append(&self, result: &QuizAttemptResult) -> MasteryResult<()>;

    /// All records for `student` in append order, optionally limited to one topic.
    /// Unknown students yield an empty history.
    fn history(&self, student: &str, topic: Option<&str>) -> MasteryResult<Vec<QuizAttemptResult>>;

    fn students(&self) -> MasteryResult<Vec<String>>;

    /// Last appended record for (student, topic).
    fn latest(&self, student: &str, topic: &str) -> MasteryResult<Option<QuizAttemptResult>> {
        Ok(self.history(student, Some(topic))?.pop())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<QuizAttemptResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MasteryResult<std::sync::MutexGuard<'_, Vec<QuizAttemptResult>>> {
        self.records
            .lock()
            .map_err(|_| MasteryError::Storage("in-memory store lock poisoned".into()))
    }
}

impl ProgressStore for InMemoryStore {
    fn append(&self, result: &QuizAttemptResult) -> MasteryResult<()> {
        self.lock()?.push(result.clone());
        Ok(())
    }

    fn history(&self, student: &str, topic: Option<&str>) -> MasteryResult<Vec<QuizAttemptResult>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| r.student == student)
            .filter(|r| topic.map_or(true, |t| r.topic == t))
            .cloned()
            .collect())
    }

    fn students(&self) -> MasteryResult<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.iter().map(|r| r.student.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use chrono::Utc;

    fn result(student: &str, topic: &str, outcomes: &[bool]) -> QuizAttemptResult {
        QuizAttemptResult::new(student, Utc::now(), evaluate(outcomes, topic))
    }

    #[test]
    fn test_append_then_history() {
        let store = InMemoryStore::new();
        assert!(store.history("ada", None).unwrap().is_empty());

        let first = result("ada", "Circles", &[true]);
        store.append(&first).unwrap();
        let second = result("ada", "Triangles", &[false]);
        store.append(&second).unwrap();

        let history = store.history("ada", None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last(), Some(&second));
    }

    #[test]
    fn test_topic_filter_and_latest() {
        let store = InMemoryStore::new();
        store.append(&result("ada", "Circles", &[true])).unwrap();
        store.append(&result("ada", "Triangles", &[true])).unwrap();
        store.append(&result("ada", "Circles", &[false])).unwrap();
        store.append(&result("bob", "Circles", &[true])).unwrap();

        assert_eq!(store.history("ada", Some("Circles")).unwrap().len(), 2);
        let latest = store.latest("ada", "Circles").unwrap().unwrap();
        assert_eq!(latest.correct_count, 0);
        assert!(store.latest("ada", "Lines").unwrap().is_none());
        assert_eq!(store.students().unwrap(), vec!["ada", "bob"]);
    }
}
