use serde::{Deserialize, Serialize};

use crate::question::Question;

/// How submitted options are compared against the correct option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Sensitive,
    Insensitive,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Grader {
    mode: CaseMode,
}

impl Grader {
    pub fn new(mode: CaseMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CaseMode {
        self.mode
    }

    /// True iff `submitted` matches the question's correct option.
    /// Anything outside the option list is just wrong, never an error.
    pub fn evaluate(&self, submitted: &str, question: &Question) -> bool {
        self.matches(submitted, question.correct_option())
    }

    /// Compare two option texts under this grader's case mode.
    pub fn matches(&self, submitted: &str, option: &str) -> bool {
        match self.mode {
            CaseMode::Sensitive => submitted == option,
            CaseMode::Insensitive => submitted.to_lowercase() == option.to_lowercase(),
        }
    }
}
