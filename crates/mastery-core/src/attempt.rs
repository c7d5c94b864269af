use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::evaluator::LevelEvaluation;
use crate::level::Level;

/// One finished quiz attempt as stored in a student's history.
///
/// Serializes to the persisted record shape:
/// `{student_name, timestamp, topic, accuracy, level, correct_count, total_count}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttemptResult {
    #[serde(rename = "student_name")]
    pub student: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub accuracy: f64,
    pub level: Level,
    pub correct_count: u32,
    pub total_count: u32,
}

impl QuizAttemptResult {
    pub fn new(student: impl Into<String>, timestamp: DateTime<Utc>, eval: LevelEvaluation) -> Self {
        Self {
            student: student.into(),
            timestamp,
            topic: eval.topic,
            accuracy: eval.accuracy,
            level: eval.level,
            correct_count: eval.correct_count,
            total_count: eval.total_count,
        }
    }

    pub fn reasoning(&self) -> &'static str {
        self.level.reasoning()
    }
}

/// RFC 3339, or an ISO-8601 local time without offset (read as UTC), which
/// is what older results files contain.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(d)?;
    parse_timestamp(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}")))
}

/// Latest attempt per topic for one student, rebuilt from history each session.
#[derive(Debug, Clone, Default)]
pub struct ProgressByTopic {
    latest: BTreeMap<String, QuizAttemptResult>,
}

impl ProgressByTopic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries win, so the map reflects append order, not timestamps.
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a QuizAttemptResult>) -> Self {
        let mut progress = Self::new();
        for result in history {
            progress.record(result.clone());
        }
        progress
    }

    pub fn record(&mut self, result: QuizAttemptResult) {
        self.latest.insert(result.topic.clone(), result);
    }

    pub fn latest(&self, topic: &str) -> Option<&QuizAttemptResult> {
        self.latest.get(topic)
    }

    /// Difficulty for the next quiz on `topic`; Beginner on first encounter.
    pub fn level_for(&self, topic: &str) -> Level {
        self.latest
            .get(topic)
            .map(|r| r.level)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Topics in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuizAttemptResult)> {
        self.latest.iter().map(|(t, r)| (t.as_str(), r))
    }
}
