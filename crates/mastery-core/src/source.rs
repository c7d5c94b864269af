//! Question generation.
//!
//! [`QuestionSource`] is the seam to whatever produces questions (an LLM
//! service in a hosted deployment). [`QuestionBank`] is the local
//! implementation: a TOML file of hand-written questions per topic and level.

use std::path::Path;

use serde::Deserialize;

use crate::error::{MasteryError, MasteryResult};
use crate::level::Level;
use crate::question::Question;

/// Smallest batch a quiz may ask for.
pub const MIN_QUESTIONS: usize = 3;
/// Largest batch a quiz may ask for.
pub const MAX_QUESTIONS: usize = 10;
pub const DEFAULT_QUESTIONS: usize = 5;

pub trait QuestionSource {
    /// Exactly `count` questions on `topic` at `level`, or an error.
    fn generate(&self, topic: &str, level: Level, count: usize) -> MasteryResult<Vec<Question>>;

    /// Topics this source can generate for, in display order.
    fn topics(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    topics: Vec<BankTopic>,
}

#[derive(Debug, Deserialize)]
struct BankTopic {
    name: String,
    #[serde(default)]
    questions: Vec<BankEntry>,
}

#[derive(Debug, Deserialize)]
struct BankEntry {
    level: Level,
    prompt: String,
    options: Vec<String>,
    answer: String,
}

#[derive(Debug, Clone)]
struct Topic {
    name: String,
    questions: Vec<(Level, Question)>,
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    subject: String,
    topics: Vec<Topic>,
}

impl QuestionBank {
    pub fn load(path: &Path) -> MasteryResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MasteryError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| MasteryError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> MasteryResult<Self> {
        let file: BankFile =
            toml::from_str(content).map_err(|e| MasteryError::Config(e.to_string()))?;

        let mut topics: Vec<Topic> = Vec::with_capacity(file.topics.len());
        for t in file.topics {
            if topics.iter().any(|existing| existing.name == t.name) {
                return Err(MasteryError::Config(format!("duplicate topic: {}", t.name)));
            }
            let questions = t
                .questions
                .into_iter()
                .map(|e| Ok((e.level, Question::new(e.prompt, e.options, e.answer)?)))
                .collect::<MasteryResult<Vec<_>>>()?;
            topics.push(Topic {
                name: t.name,
                questions,
            });
        }

        Ok(Self {
            subject: file.subject,
            topics,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Number of questions available for (topic, level).
    pub fn available(&self, topic: &str, level: Level) -> usize {
        self.topics
            .iter()
            .find(|t| t.name == topic)
            .map(|t| t.questions.iter().filter(|(l, _)| *l == level).count())
            .unwrap_or(0)
    }
}

impl QuestionSource for QuestionBank {
    fn generate(&self, topic: &str, level: Level, count: usize) -> MasteryResult<Vec<Question>> {
        let entry = self
            .topics
            .iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| MasteryError::QuestionSource(format!("unknown topic: {topic}")))?;

        let questions: Vec<Question> = entry
            .questions
            .iter()
            .filter(|(l, _)| *l == level)
            .take(count)
            .map(|(_, q)| q.clone())
            .collect();

        if questions.len() < count {
            return Err(MasteryError::QuestionSource(format!(
                "{topic} has {} {level} questions, {count} requested",
                questions.len()
            )));
        }
        Ok(questions)
    }

    fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }
}
