pub mod annotation;
pub mod attempt;
pub mod error;
pub mod evaluator;
pub mod grader;
pub mod level;
pub mod question;
pub mod selector;
pub mod session;
pub mod source;
pub mod store;
pub mod tutor;

pub use annotation::{annotation_text, Annotation, AnnotationSink, LEVEL_UPDATE_LABEL};
pub use attempt::{parse_timestamp, ProgressByTopic, QuizAttemptResult};
pub use error::{MasteryError, MasteryResult};
pub use evaluator::{evaluate, LevelEvaluation};
pub use grader::{CaseMode, Grader};
pub use level::Level;
pub use question::Question;
pub use selector::next_level;
pub use session::{AnswerFeedback, QuizSession, SessionAccumulator};
pub use source::{QuestionBank, QuestionSource, DEFAULT_QUESTIONS, MAX_QUESTIONS, MIN_QUESTIONS};
pub use store::{InMemoryStore, ProgressStore};
pub use tutor::{record_attempt, Tutor};
