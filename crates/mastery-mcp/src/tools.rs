use serde_json::{json, Value};

use mastery_core::{
    evaluate, next_level, record_attempt, AnnotationSink, ProgressByTopic, ProgressStore,
    QuizAttemptResult, LEVEL_UPDATE_LABEL,
};

use crate::protocol::ToolResult;

/// What the tools operate on.
pub struct ToolContext<'a> {
    pub store: &'a dyn ProgressStore,
    pub sink: Option<&'a dyn AnnotationSink>,
    pub label: String,
}

impl<'a> ToolContext<'a> {
    pub fn new(store: &'a dyn ProgressStore) -> Self {
        Self {
            store,
            sink: None,
            label: LEVEL_UPDATE_LABEL.to_string(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn AnnotationSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Tool schemas for tools/list
// ---------------------------------------------------------------------------

pub fn tool_definitions() -> Value {
    let student_prop = json!({
        "type": "string",
        "description": "Student identifier (name or id)"
    });
    let topic_prop = json!({
        "type": "string",
        "description": "Topic name, e.g. 'Circles' or 'Newton's 2nd Law'"
    });
    let outcomes_prop = json!({
        "type": "array",
        "items": { "type": ["boolean", "string"] },
        "description": "Per-question outcomes in answer order: true/false or \"correct\"/\"incorrect\""
    });

    json!({
        "tools": [
            {
                "name": "mastery_next_level",
                "description": "Difficulty for the student's next quiz on a topic: the level of their most recent attempt, or Beginner if they have none.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "student": student_prop, "topic": topic_prop },
                    "required": ["student", "topic"]
                }
            },
            {
                "name": "mastery_record_attempt",
                "description": "Grade a finished quiz from its outcomes, append it to the student's history and return the result with its expertise level.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "student": student_prop,
                        "topic": topic_prop,
                        "outcomes": outcomes_prop
                    },
                    "required": ["student", "topic", "outcomes"]
                }
            },
            {
                "name": "mastery_evaluate",
                "description": "Compute accuracy and expertise level for a list of outcomes without saving anything.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "topic": topic_prop, "outcomes": outcomes_prop },
                    "required": ["outcomes"]
                }
            },
            {
                "name": "mastery_history",
                "description": "A student's past quiz attempts, oldest first.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "student": student_prop,
                        "topic": topic_prop,
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Only the most recent N attempts"
                        }
                    },
                    "required": ["student"]
                }
            },
            {
                "name": "mastery_progress",
                "description": "Latest accuracy and level per topic for a student.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "student": student_prop },
                    "required": ["student"]
                }
            }
        ]
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn call_tool(ctx: &ToolContext, name: &str, args: &Value) -> ToolResult {
    match name {
        "mastery_next_level" => tool_next_level(ctx, args),
        "mastery_record_attempt" => tool_record_attempt(ctx, args),
        "mastery_evaluate" => tool_evaluate(args),
        "mastery_history" => tool_history(ctx, args),
        "mastery_progress" => tool_progress(ctx, args),
        _ => ToolResult::error(format!("unknown tool: {name}")),
    }
}

fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    match get_str(args, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolResult::error(format!("missing required field: {key}"))),
    }
}

fn parse_outcomes(args: &Value) -> Result<Vec<bool>, ToolResult> {
    let items = args
        .get("outcomes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolResult::error("missing required field: outcomes"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s.eq_ignore_ascii_case("correct") => Ok(true),
            Value::String(s) if s.eq_ignore_ascii_case("incorrect") => Ok(false),
            other => Err(ToolResult::error(format!(
                "outcomes[{i}]: expected boolean or \"correct\"/\"incorrect\", got {other}"
            ))),
        })
        .collect()
}

fn attempt_json(r: &QuizAttemptResult) -> Value {
    json!({
        "student_name": r.student,
        "timestamp": r.timestamp.to_rfc3339(),
        "topic": r.topic,
        "accuracy": r.accuracy,
        "level": r.level,
        "reasoning": r.reasoning(),
        "correct_count": r.correct_count,
        "total_count": r.total_count,
    })
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

fn tool_next_level(ctx: &ToolContext, args: &Value) -> ToolResult {
    let (student, topic) = match (require_str(args, "student"), require_str(args, "topic")) {
        (Ok(s), Ok(t)) => (s, t),
        (Err(e), _) | (_, Err(e)) => return e,
    };

    match next_level(ctx.store, student, topic) {
        Ok(level) => ToolResult::json(&json!({
            "student": student,
            "topic": topic,
            "level": level,
        })),
        Err(e) => ToolResult::error(format!("failed to read history: {e}")),
    }
}

fn tool_record_attempt(ctx: &ToolContext, args: &Value) -> ToolResult {
    let (student, topic) = match (require_str(args, "student"), require_str(args, "topic")) {
        (Ok(s), Ok(t)) => (s, t),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let outcomes = match parse_outcomes(args) {
        Ok(o) => o,
        Err(e) => return e,
    };

    match record_attempt(ctx.store, ctx.sink, &ctx.label, student, topic, &outcomes) {
        Ok(result) => ToolResult::json(&attempt_json(&result)),
        Err(e) => ToolResult::error(format!("failed to record attempt: {e}")),
    }
}

fn tool_evaluate(args: &Value) -> ToolResult {
    let outcomes = match parse_outcomes(args) {
        Ok(o) => o,
        Err(e) => return e,
    };
    let topic = get_str(args, "topic").unwrap_or("");
    let eval = evaluate(&outcomes, topic);

    ToolResult::json(&json!({
        "topic": eval.topic,
        "correct_count": eval.correct_count,
        "total_count": eval.total_count,
        "accuracy": eval.accuracy,
        "level": eval.level,
        "reasoning": eval.reasoning(),
    }))
}

fn tool_history(ctx: &ToolContext, args: &Value) -> ToolResult {
    let student = match require_str(args, "student") {
        Ok(s) => s,
        Err(e) => return e,
    };
    let topic = get_str(args, "topic");
    let limit = match args.get("limit") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 => Some(n as usize),
            _ => return ToolResult::error(format!("limit must be a positive integer, got {v}")),
        },
    };

    let mut history = match ctx.store.history(student, topic) {
        Ok(h) => h,
        Err(e) => return ToolResult::error(format!("failed to read history: {e}")),
    };
    if let Some(keep) = limit {
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }
    }

    let items: Vec<Value> = history.iter().map(attempt_json).collect();
    ToolResult::json(&Value::Array(items))
}

fn tool_progress(ctx: &ToolContext, args: &Value) -> ToolResult {
    let student = match require_str(args, "student") {
        Ok(s) => s,
        Err(e) => return e,
    };

    let history = match ctx.store.history(student, None) {
        Ok(h) => h,
        Err(e) => return ToolResult::error(format!("failed to read history: {e}")),
    };
    if history.is_empty() {
        return ToolResult::text(format!("No attempts recorded for {student}."));
    }

    let progress = ProgressByTopic::from_history(&history);
    let topics: Vec<Value> = progress
        .iter()
        .map(|(topic, latest)| {
            let attempts = history.iter().filter(|r| r.topic == topic).count();
            json!({
                "topic": topic,
                "accuracy": latest.accuracy,
                "level": latest.level,
                "reasoning": latest.reasoning(),
                "attempts": attempts,
            })
        })
        .collect();

    ToolResult::json(&json!({
        "student": student,
        "attempts": history.len(),
        "topics": topics,
    }))
}
