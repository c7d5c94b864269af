use serde::{Deserialize, Serialize};

use crate::level::Level;

/// Result of reducing one attempt's outcomes, before identifiers and
/// timestamp are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelEvaluation {
    pub topic: String,
    pub correct_count: u32,
    pub total_count: u32,
    pub accuracy: f64,
    pub level: Level,
}

impl LevelEvaluation {
    pub fn reasoning(&self) -> &'static str {
        self.level.reasoning()
    }

    /// No questions were answered. Such an attempt still rates as Beginner.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

/// Percentage of correct answers, 0 for an empty attempt.
pub fn accuracy(correct_count: u32, total_count: u32) -> f64 {
    if total_count == 0 {
        0.0
    } else {
        f64::from(correct_count) * 100.0 / f64::from(total_count)
    }
}

pub fn evaluate(outcomes: &[bool], topic: &str) -> LevelEvaluation {
    let total_count = outcomes.len() as u32;
    let correct_count = outcomes.iter().filter(|&&ok| ok).count() as u32;
    let accuracy = accuracy(correct_count, total_count);

    LevelEvaluation {
        topic: topic.to_string(),
        correct_count,
        total_count,
        accuracy,
        level: Level::from_accuracy(accuracy),
    }
}
