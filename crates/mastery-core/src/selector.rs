use crate::error::MasteryResult;
use crate::level::Level;
use crate::store::ProgressStore;

/// Difficulty for the next quiz: the level of the last appended record for
/// (student, topic), or Beginner if the student has never taken that topic.
pub fn next_level(store: &dyn ProgressStore, student: &str, topic: &str) -> MasteryResult<Level> {
    Ok(store
        .latest(student, topic)?
        .map(|r| r.level)
        .unwrap_or_default())
}
