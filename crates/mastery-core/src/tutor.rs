use chrono::Utc;
use tracing::{debug, warn};

use crate::annotation::{annotation_text, AnnotationSink, LEVEL_UPDATE_LABEL};
use crate::attempt::QuizAttemptResult;
use crate::error::MasteryResult;
use crate::evaluator::evaluate;
use crate::grader::Grader;
use crate::selector::next_level;
use crate::session::QuizSession;
use crate::source::QuestionSource;
use crate::store::ProgressStore;

/// Drives one attempt end to end: pick the level, fetch questions, and on
/// completion evaluate, persist and annotate.
pub struct Tutor<'a> {
    store: &'a dyn ProgressStore,
    source: &'a dyn QuestionSource,
    sink: Option<&'a dyn AnnotationSink>,
    grader: Grader,
    label: String,
}

impl<'a> Tutor<'a> {
    pub fn new(store: &'a dyn ProgressStore, source: &'a dyn QuestionSource) -> Self {
        Self {
            store,
            source,
            sink: None,
            grader: Grader::default(),
            label: LEVEL_UPDATE_LABEL.to_string(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn AnnotationSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_grader(mut self, grader: Grader) -> Self {
        self.grader = grader;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn grader(&self) -> &Grader {
        &self.grader
    }

    pub fn start(&self, student: &str, topic: &str, count: usize) -> MasteryResult<QuizSession> {
        let level = next_level(self.store, student, topic)?;
        debug!(student, topic, %level, count, "starting quiz");
        let questions = self.source.generate(topic, level, count)?;
        Ok(QuizSession::new(
            student.to_string(),
            topic.to_string(),
            level,
            questions,
        ))
    }

    /// Close out a session. Unanswered questions are not counted.
    pub fn finish(&self, session: QuizSession) -> MasteryResult<QuizAttemptResult> {
        let student = session.student().to_string();
        let topic = session.topic().to_string();
        self.record(&student, &topic, &session.into_outcomes())
    }

    /// Evaluate and persist an attempt whose outcomes were collected elsewhere.
    pub fn record(
        &self,
        student: &str,
        topic: &str,
        outcomes: &[bool],
    ) -> MasteryResult<QuizAttemptResult> {
        record_attempt(self.store, self.sink, &self.label, student, topic, outcomes)
    }
}

/// Evaluate `outcomes`, append the result to `store` and, if a sink is given,
/// send it a `"<label> for <topic>: <level>"` line. Sink failures are logged
/// and otherwise ignored.
pub fn record_attempt(
    store: &dyn ProgressStore,
    sink: Option<&dyn AnnotationSink>,
    label: &str,
    student: &str,
    topic: &str,
    outcomes: &[bool],
) -> MasteryResult<QuizAttemptResult> {
    let result = QuizAttemptResult::new(student, Utc::now(), evaluate(outcomes, topic));
    store.append(&result)?;
    debug!(
        student,
        topic,
        level = %result.level,
        accuracy = result.accuracy,
        "attempt recorded"
    );

    if let Some(sink) = sink {
        let text = annotation_text(label, topic, result.level);
        if let Err(e) = sink.annotate(student, &text) {
            warn!("annotation failed for {student}: {e}");
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MasteryError;
    use crate::grader::CaseMode;
    use crate::level::Level;
    use crate::question::Question;
    use crate::store::InMemoryStore;
    use std::sync::Mutex;

    /// Questions whose answer is always "right", generated at any level.
    struct FixedSource;

    impl QuestionSource for FixedSource {
        fn generate(&self, topic: &str, level: Level, count: usize) -> MasteryResult<Vec<Question>> {
            (0..count)
                .map(|i| {
                    Question::new(
                        format!("{topic} {level} #{i}"),
                        vec!["Right".into(), "Wrong".into()],
                        "Right",
                    )
                })
                .collect()
        }

        fn topics(&self) -> Vec<String> {
            vec!["Circles".into()]
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(String, String)>>,
    }

    impl AnnotationSink for RecordingSink {
        fn annotate(&self, subject: &str, text: &str) -> MasteryResult<()> {
            self.lines
                .lock()
                .unwrap()
                .push((subject.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct FailingSink;

    impl AnnotationSink for FailingSink {
        fn annotate(&self, _subject: &str, _text: &str) -> MasteryResult<()> {
            Err(MasteryError::Storage("memory service unreachable".into()))
        }
    }

    fn answer_all(tutor: &Tutor, session: &mut QuizSession, correct: usize) {
        let mut i = 0;
        while !session.is_complete() {
            let option = if i < correct { "Right" } else { "Wrong" };
            session.submit(option, tutor.grader());
            i += 1;
        }
    }

    #[test]
    fn test_full_cycle_adapts_level() {
        let store = InMemoryStore::new();
        let source = FixedSource;
        let sink = RecordingSink::default();
        let tutor = Tutor::new(&store, &source).with_sink(&sink);

        let mut session = tutor.start("ada", "Circles", 5).unwrap();
        assert_eq!(session.level(), Level::Beginner);
        assert_eq!(session.questions().len(), 5);
        answer_all(&tutor, &mut session, 5);
        let result = tutor.finish(session).unwrap();
        assert_eq!(result.level, Level::Advanced);
        assert_eq!(result.accuracy, 100.0);

        let next = tutor.start("ada", "Circles", 5).unwrap();
        assert_eq!(next.level(), Level::Advanced);
        assert!(next.questions()[0].prompt().contains("Advanced"));

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            lines.as_slice(),
            &[(
                "ada".to_string(),
                "Updated expertise level for Circles: Advanced".to_string()
            )]
        );
    }

    #[test]
    fn test_partial_session_counts_answered_only() {
        let store = InMemoryStore::new();
        let source = FixedSource;
        let tutor = Tutor::new(&store, &source);

        let mut session = tutor.start("ada", "Circles", 5).unwrap();
        session.submit("Right", tutor.grader());
        session.submit("Wrong", tutor.grader());
        let result = tutor.finish(session).unwrap();
        assert_eq!((result.correct_count, result.total_count), (1, 2));
        assert_eq!(store.history("ada", None).unwrap().len(), 1);
    }

    #[test]
    fn test_sink_failure_does_not_fail_attempt() {
        let store = InMemoryStore::new();
        let source = FixedSource;
        let sink = FailingSink;
        let tutor = Tutor::new(&store, &source).with_sink(&sink);

        let result = tutor.record("ada", "Circles", &[true, false]).unwrap();
        assert_eq!(result.level, Level::Beginner);
        assert_eq!(store.history("ada", Some("Circles")).unwrap().len(), 1);
    }

    #[test]
    fn test_custom_grader_and_label() {
        let store = InMemoryStore::new();
        let source = FixedSource;
        let sink = RecordingSink::default();
        let tutor = Tutor::new(&store, &source)
            .with_sink(&sink)
            .with_grader(Grader::new(CaseMode::Insensitive))
            .with_label("Level");

        let mut session = tutor.start("bob", "Circles", 3).unwrap();
        while !session.is_complete() {
            session.submit("right", tutor.grader());
        }
        let result = tutor.finish(session).unwrap();
        assert_eq!(result.correct_count, 3);
        assert_eq!(
            sink.lines.lock().unwrap()[0].1,
            "Level for Circles: Advanced"
        );
    }

    #[test]
    fn test_empty_record_is_beginner() {
        let store = InMemoryStore::new();
        let source = FixedSource;
        let tutor = Tutor::new(&store, &source);
        let result = tutor.record("ada", "Circles", &[]).unwrap();
        assert_eq!(result.level, Level::Beginner);
        assert_eq!(result.total_count, 0);
    }
}
