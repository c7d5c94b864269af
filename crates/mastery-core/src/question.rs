use serde::{Deserialize, Serialize};

use crate::error::{MasteryError, MasteryResult};

/// A multiple-choice question. Fields are private so the
/// "answer is one of the options" invariant cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion", into = "RawQuestion")]
pub struct Question {
    prompt: String,
    options: Vec<String>,
    correct_option: String,
}

impl Question {
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: impl Into<String>,
    ) -> MasteryResult<Self> {
        let prompt = prompt.into();
        let correct_option = correct_option.into();

        if prompt.trim().is_empty() {
            return Err(MasteryError::InvalidQuestion("empty prompt".into()));
        }
        if options.is_empty() {
            return Err(MasteryError::InvalidQuestion(format!(
                "no options for: {prompt}"
            )));
        }
        for (i, opt) in options.iter().enumerate() {
            if options[..i].contains(opt) {
                return Err(MasteryError::InvalidQuestion(format!(
                    "duplicate option '{opt}' for: {prompt}"
                )));
            }
        }
        if !options.contains(&correct_option) {
            return Err(MasteryError::InvalidQuestion(format!(
                "answer '{correct_option}' is not among the options for: {prompt}"
            )));
        }

        Ok(Self {
            prompt,
            options,
            correct_option,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_option(&self) -> &str {
        &self.correct_option
    }
}

#[derive(Serialize, Deserialize)]
struct RawQuestion {
    prompt: String,
    options: Vec<String>,
    #[serde(alias = "answer")]
    correct_option: String,
}

impl TryFrom<RawQuestion> for Question {
    type Error = MasteryError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        Question::new(raw.prompt, raw.options, raw.correct_option)
    }
}

impl From<Question> for RawQuestion {
    fn from(q: Question) -> Self {
        Self {
            prompt: q.prompt,
            options: q.options,
            correct_option: q.correct_option,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_question() {
        let q = Question::new("2 + 2?", opts(&["3", "4", "5"]), "4").unwrap();
        assert_eq!(q.prompt(), "2 + 2?");
        assert_eq!(q.options().len(), 3);
        assert_eq!(q.correct_option(), "4");
    }

    #[test]
    fn test_answer_must_be_an_option() {
        let result = Question::new("2 + 2?", opts(&["3", "5"]), "4");
        assert!(matches!(result, Err(MasteryError::InvalidQuestion(_))));
    }

    #[test]
    fn test_duplicate_options_rejected() {
        let result = Question::new("pick", opts(&["a", "b", "a"]), "a");
        assert!(matches!(result, Err(MasteryError::InvalidQuestion(_))));
    }

    #[test]
    fn test_empty_prompt_and_options_rejected() {
        assert!(Question::new("  ", opts(&["a"]), "a").is_err());
        assert!(Question::new("q", Vec::new(), "a").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Question = serde_json::from_str(
            r#"{"prompt": "p", "options": ["x", "y"], "answer": "y"}"#,
        )
        .unwrap();
        assert_eq!(ok.correct_option(), "y");

        let bad = serde_json::from_str::<Question>(
            r#"{"prompt": "p", "options": ["x", "y"], "correct_option": "z"}"#,
        );
        assert!(bad.is_err());
    }
}
