//! In-flight quiz state.
//!
//! A [`QuizSession`] is the explicit context for one attempt: who is answering,
//! which topic, at what level, which question is next and the outcomes so far.
//! It is created by the tutor, advanced by the host one answer at a time and
//! consumed when the attempt is finished.

use chrono::{DateTime, Utc};

use crate::grader::Grader;
use crate::level::Level;
use crate::question::Question;

/// Ordered outcomes of the attempt in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAccumulator {
    outcomes: Vec<bool>,
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, correct: bool) {
        self.outcomes.push(correct);
    }

    pub fn reset(&mut self) {
        self.outcomes.clear();
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn correct_count(&self) -> usize {
        self.outcomes.iter().filter(|&&ok| ok).count()
    }

    pub fn outcomes(&self) -> &[bool] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<bool> {
        self.outcomes
    }
}

/// What the host shows after an answer is graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub correct_option: String,
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    student: String,
    topic: String,
    level: Level,
    questions: Vec<Question>,
    index: usize,
    accumulator: SessionAccumulator,
    started_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(student: String, topic: String, level: Level, questions: Vec<Question>) -> Self {
        Self {
            student,
            topic,
            level,
            questions,
            index: 0,
            accumulator: SessionAccumulator::new(),
            started_at: Utc::now(),
        }
    }

    pub fn student(&self) -> &str {
        &self.student
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Difficulty the questions were generated at.
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Zero-based index of the next unanswered question.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.questions.len()
    }

    /// `(answered, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.questions.len())
    }

    pub fn accumulator(&self) -> &SessionAccumulator {
        &self.accumulator
    }

    /// Grade `option` against the current question and advance.
    /// Returns `None` once every question has been answered.
    pub fn submit(&mut self, option: &str, grader: &Grader) -> Option<AnswerFeedback> {
        let question = self.questions.get(self.index)?;
        let correct = grader.evaluate(option, question);
        let correct_option = question.correct_option().to_string();

        self.accumulator.record(correct);
        self.index += 1;

        Some(AnswerFeedback {
            correct,
            correct_option,
            answered: self.index,
            total: self.questions.len(),
        })
    }

    /// Start over on the same questions.
    pub fn restart(&mut self) {
        self.index = 0;
        self.accumulator.reset();
        self.started_at = Utc::now();
    }

    pub fn into_outcomes(self) -> Vec<bool> {
        self.accumulator.into_outcomes()
    }
}
