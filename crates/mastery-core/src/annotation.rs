use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MasteryResult;
use crate::level::Level;

/// Label the tutor uses when a finished attempt changes a student's level.
pub const LEVEL_UPDATE_LABEL: &str = "Updated expertise level";

/// A human-readable line handed to the memory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub subject: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Write-only channel to an external semantic memory. Nothing in the core
/// reads annotations back, so a failing sink never affects grading or leveling.
pub trait AnnotationSink {
    fn annotate(&self, subject: &str, text: &str) -> MasteryResult<()>;
}

/// `"<label> for <topic>: <level>"`
pub fn annotation_text(label: &str, topic: &str, level: Level) -> String {
    format!("{label} for {topic}: {level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_text() {
        assert_eq!(
            annotation_text(LEVEL_UPDATE_LABEL, "Circles", Level::Advanced),
            "Updated expertise level for Circles: Advanced"
        );
        assert_eq!(
            annotation_text("Level", "Newton's 2nd Law", Level::Beginner),
            "Level for Newton's 2nd Law: Beginner"
        );
    }
}
