mod config;

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use mastery_core::{
    evaluate, AnnotationSink, Grader, MasteryError, ProgressByTopic, ProgressStore,
    QuestionBank, QuestionSource, QuizAttemptResult, QuizSession, Tutor, MAX_QUESTIONS,
    MIN_QUESTIONS,
};
use mastery_store::{JsonFileStore, SqliteStore};

use config::{Backend, Config};

#[derive(Parser)]
#[command(
    name = "mastery",
    version,
    about = "Adaptive quizzes that track expertise per student and topic"
)]
struct Cli {
    /// SQLite database file, or results directory with --backend json
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Storage backend (overrides config)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a quiz interactively at the student's current level
    Quiz {
        /// Student name
        #[arg(short, long)]
        student: String,

        /// Topic from the question bank
        #[arg(short, long)]
        topic: String,

        /// Question bank TOML file (defaults to quiz.bank from config)
        #[arg(short, long)]
        bank: Option<PathBuf>,

        /// Number of questions (3 to 10)
        #[arg(short = 'n', long, value_parser = parse_count)]
        count: Option<usize>,

        /// Accept answers that differ only in case
        #[arg(long)]
        ignore_case: bool,
    },

    /// Show the level the next quiz on a topic will use
    Level {
        #[arg(short, long)]
        student: String,

        #[arg(short, long)]
        topic: String,
    },

    /// List past attempts, oldest first
    History {
        #[arg(short, long)]
        student: String,

        /// Filter by topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Only the most recent N attempts
        #[arg(short, long, value_parser = parse_limit)]
        limit: Option<usize>,

        /// Print raw JSON records
        #[arg(long)]
        json: bool,
    },

    /// Latest level per topic and accuracy trend
    Progress {
        #[arg(short, long)]
        student: String,
    },

    /// Compute accuracy and level from outcomes without saving
    Evaluate {
        /// Comma-separated outcomes, e.g. "1,1,0" or "correct,incorrect"
        #[arg(short, long)]
        outcomes: String,

        #[arg(short, long, default_value = "")]
        topic: String,
    },

    /// List students with recorded attempts
    Students,

    /// List topics in a question bank with question counts per level
    Topics {
        /// Question bank TOML file (defaults to quiz.bank from config)
        #[arg(short, long)]
        bank: Option<PathBuf>,
    },

    /// Show level annotations written for a student (sqlite backend only)
    Annotations {
        #[arg(short, long)]
        student: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the active configuration
    Config,

    /// Start the MCP server on stdio
    Serve,
}

fn parse_count(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("not a number: {s}"))?;
    if (MIN_QUESTIONS..=MAX_QUESTIONS).contains(&n) {
        Ok(n)
    } else {
        Err(format!(
            "must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}"
        ))
    }
}

fn parse_limit(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("must be a positive integer, got {s}")),
    }
}

// ---------------------------------------------------------------------------
// Store selection
// ---------------------------------------------------------------------------

enum OpenStore {
    Sqlite(SqliteStore),
    Json(JsonFileStore),
}

impl OpenStore {
    fn progress(&self) -> &dyn ProgressStore {
        match self {
            OpenStore::Sqlite(s) => s,
            OpenStore::Json(s) => s,
        }
    }

    /// Annotations live next to the attempts, so only the database backend has a sink.
    fn sink(&self) -> Option<&dyn AnnotationSink> {
        match self {
            OpenStore::Sqlite(s) => Some(s),
            OpenStore::Json(_) => None,
        }
    }
}

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "mastery", "mastery")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_store_path(backend: Backend) -> PathBuf {
    match backend {
        Backend::Sqlite => data_dir().join("progress.db"),
        Backend::Json => data_dir().join("student_results"),
    }
}

fn open_store(cli_db: Option<PathBuf>, backend: Backend, config: &Config) -> Result<OpenStore> {
    let path = cli_db
        .or_else(|| config.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| default_store_path(backend));
    debug!(?backend, path = %path.display(), "opening store");

    Ok(match backend {
        Backend::Sqlite => {
            OpenStore::Sqlite(SqliteStore::new(&path).context("failed to open database")?)
        }
        Backend::Json => OpenStore::Json(
            JsonFileStore::new(&path).context("failed to open results directory")?,
        ),
    })
}

fn sink_for<'a>(store: &'a OpenStore, config: &Config) -> Option<&'a dyn AnnotationSink> {
    if config.memory.enabled {
        store.sink()
    } else {
        None
    }
}

fn load_bank(cli_bank: Option<PathBuf>, config: &Config) -> Result<QuestionBank> {
    let path = cli_bank
        .or_else(|| config.quiz.bank.as_ref().map(PathBuf::from))
        .context("no question bank given: pass --bank or set quiz.bank in the config")?;
    QuestionBank::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config()?;
    let backend = cli.backend.unwrap_or(config.store.backend);

    match cli.command {
        Commands::Quiz {
            student,
            topic,
            bank,
            count,
            ignore_case,
        } => {
            let store = open_store(cli.db, backend, &config)?;
            let bank = load_bank(bank, &config)?;
            cmd_quiz(&store, &bank, &config, &student, &topic, count, ignore_case)
        }
        Commands::Level { student, topic } => {
            let store = open_store(cli.db, backend, &config)?;
            cmd_level(store.progress(), &student, &topic)
        }
        Commands::History {
            student,
            topic,
            limit,
            json,
        } => {
            let store = open_store(cli.db, backend, &config)?;
            cmd_history(store.progress(), &student, topic.as_deref(), limit, json)
        }
        Commands::Progress { student } => {
            let store = open_store(cli.db, backend, &config)?;
            cmd_progress(store.progress(), &student)
        }
        Commands::Evaluate { outcomes, topic } => cmd_evaluate(&outcomes, &topic),
        Commands::Students => {
            let store = open_store(cli.db, backend, &config)?;
            cmd_students(store.progress())
        }
        Commands::Topics { bank } => cmd_topics(&load_bank(bank, &config)?),
        Commands::Annotations { student, limit } => {
            let store = open_store(cli.db, backend, &config)?;
            cmd_annotations(&store, &student, limit)
        }
        Commands::Config => cmd_config(&config, backend),
        Commands::Serve => {
            let store = open_store(cli.db, backend, &config)?;
            let mut ctx = mastery_mcp::ToolContext::new(store.progress())
                .with_label(config.memory.label.clone());
            if let Some(sink) = sink_for(&store, &config) {
                ctx = ctx.with_sink(sink);
            }
            mastery_mcp::run_server(&ctx)
        }
    }
}

// ---------------------------------------------------------------------------
// Quiz
// ---------------------------------------------------------------------------

fn cmd_quiz(
    store: &OpenStore,
    bank: &QuestionBank,
    config: &Config,
    student: &str,
    topic: &str,
    count: Option<usize>,
    ignore_case: bool,
) -> Result<()> {
    let mode = if ignore_case {
        mastery_core::CaseMode::Insensitive
    } else {
        config.quiz.case_mode()
    };

    let mut tutor = Tutor::new(store.progress(), bank)
        .with_grader(Grader::new(mode))
        .with_label(config.memory.label.clone());
    if let Some(sink) = sink_for(store, config) {
        tutor = tutor.with_sink(sink);
    }

    let count = count.unwrap_or(config.quiz.questions_per_quiz);
    let mut session = start_session(&tutor, student, topic, count)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let completed = run_quiz(&mut session, tutor.grader(), stdin.lock(), stdout.lock())?;
    if !completed {
        println!("\nQuiz abandoned, nothing recorded.");
        return Ok(());
    }

    let result = tutor.finish(session)?;
    print_result(&result);
    Ok(())
}

/// Ask every question on `out`, reading answers from `input`. Returns false
/// if input ends before the last answer.
fn run_quiz<R: BufRead, W: Write>(
    session: &mut QuizSession,
    grader: &Grader,
    mut input: R,
    mut out: W,
) -> Result<bool> {
    writeln!(
        out,
        "{} quiz on {} for {} ({} questions)\n",
        session.level(),
        session.topic(),
        session.student(),
        session.questions().len()
    )?;

    while let Some(question) = session.current() {
        let (answered, total) = session.progress();
        writeln!(out, "Question {}/{}: {}", answered + 1, total, question.prompt())?;
        for (i, option) in question.options().iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, option)?;
        }
        let options = question.options().to_vec();

        let answer = loop {
            write!(out, "> ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(false);
            }
            if let Some(a) = parse_answer(&line, &options, grader) {
                break a;
            }
            writeln!(out, "Enter an option number (1-{}) or its text.", options.len())?;
        };

        if let Some(feedback) = session.submit(&answer, grader) {
            if feedback.correct {
                writeln!(out, "Correct!\n")?;
            } else {
                writeln!(
                    out,
                    "Incorrect. The correct answer is: {}\n",
                    feedback.correct_option
                )?;
            }
        }
    }

    Ok(true)
}

/// A number picks that option; otherwise the text must name an option under
/// the grader's case mode. Anything else gives `None` so the caller re-prompts.
fn parse_answer(line: &str, options: &[String], grader: &Grader) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Ok(n) = line.parse::<usize>() {
        if (1..=options.len()).contains(&n) {
            return Some(options[n - 1].clone());
        }
    }
    options.iter().find(|o| grader.matches(line, o)).cloned()
}

/// Start a session, pointing at `--count` when the bank runs short.
fn start_session(tutor: &Tutor, student: &str, topic: &str, count: usize) -> Result<QuizSession> {
    tutor.start(student, topic, count).map_err(|e| match e {
        MasteryError::QuestionSource(msg) => {
            anyhow!("{msg}; pass a smaller --count or add questions to the bank")
        }
        other => other.into(),
    })
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

fn cmd_level(store: &dyn ProgressStore, student: &str, topic: &str) -> Result<()> {
    let level = mastery_core::next_level(store, student, topic)?;
    println!("{level}");
    match store.latest(student, topic)? {
        Some(last) => println!(
            "  last attempt: {} ({}/{}, {:.1}%)",
            last.timestamp.format("%Y-%m-%d %H:%M"),
            last.correct_count,
            last.total_count,
            last.accuracy
        ),
        None => println!("  no attempts yet on {topic}"),
    }
    Ok(())
}

fn cmd_history(
    store: &dyn ProgressStore,
    student: &str,
    topic: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut history = store.history(student, topic)?;
    if let Some(limit) = limit {
        let skip = history.len().saturating_sub(limit);
        history.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No attempts recorded for {student}.");
        return Ok(());
    }

    println!(
        "{:<17} {:<24} {:>7} {:>8}  LEVEL",
        "WHEN", "TOPIC", "SCORE", "ACCURACY"
    );
    for r in &history {
        println!(
            "{:<17} {:<24} {:>7} {:>7.1}%  {}",
            r.timestamp.format("%Y-%m-%d %H:%M"),
            truncate(&r.topic, 24),
            format!("{}/{}", r.correct_count, r.total_count),
            r.accuracy,
            r.level
        );
    }
    Ok(())
}

fn cmd_progress(store: &dyn ProgressStore, student: &str) -> Result<()> {
    let history = store.history(student, None)?;
    let progress = ProgressByTopic::from_history(&history);
    if progress.is_empty() {
        println!("No attempts recorded for {student}.");
        return Ok(());
    }

    let mut trends: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in &history {
        trends.entry(r.topic.as_str()).or_default().push(r.accuracy);
    }

    println!("Progress for {student} ({} topics)\n", progress.len());
    println!("{:<24} {:>8} {:>8}  LEVEL", "TOPIC", "ATTEMPTS", "LAST");
    for (topic, latest) in progress.iter() {
        let attempts = trends.get(topic).map_or(0, Vec::len);
        println!(
            "{:<24} {:>8} {:>7.1}%  {}",
            truncate(topic, 24),
            attempts,
            latest.accuracy,
            latest.level
        );
    }

    println!("\nAccuracy trend:");
    for (topic, values) in &trends {
        println!("  {:<24} {}", truncate(topic, 24), format_trend(values));
    }
    Ok(())
}

fn format_trend(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.0}%"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn cmd_evaluate(outcomes: &str, topic: &str) -> Result<()> {
    let outcomes = parse_outcomes(outcomes)?;
    let eval = evaluate(&outcomes, topic);
    println!(
        "{}/{} correct ({:.1}%): {}",
        eval.correct_count, eval.total_count, eval.accuracy, eval.level
    );
    println!("  {}", eval.reasoning());
    Ok(())
}

fn parse_outcomes(s: &str) -> Result<Vec<bool>> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.to_ascii_lowercase().as_str() {
            "1" | "true" | "y" | "yes" | "correct" => Ok(true),
            "0" | "false" | "n" | "no" | "incorrect" => Ok(false),
            _ => bail!("invalid outcome '{t}', expected 1/0, true/false or correct/incorrect"),
        })
        .collect()
}

fn cmd_students(store: &dyn ProgressStore) -> Result<()> {
    let students = store.students()?;
    if students.is_empty() {
        println!("No students yet.");
    }
    for s in students {
        println!("{s}");
    }
    Ok(())
}

fn cmd_topics(bank: &QuestionBank) -> Result<()> {
    if !bank.subject().is_empty() {
        println!("{}\n", bank.subject());
    }
    println!(
        "{:<28} {:>8} {:>12} {:>8}",
        "TOPIC", "BEGINNER", "INTERMEDIATE", "ADVANCED"
    );
    for topic in bank.topics() {
        let [b, i, a] = mastery_core::Level::ALL.map(|l| bank.available(&topic, l));
        println!("{:<28} {:>8} {:>12} {:>8}", truncate(&topic, 28), b, i, a);
    }
    Ok(())
}

fn cmd_annotations(store: &OpenStore, student: &str, limit: usize) -> Result<()> {
    let OpenStore::Sqlite(db) = store else {
        bail!("annotations are only stored by the sqlite backend");
    };
    let annotations = db.annotations(student, limit)?;
    if annotations.is_empty() {
        println!("No annotations for {student}.");
    }
    for a in annotations {
        println!("{}  {}", a.created_at.format("%Y-%m-%d %H:%M"), a.text);
    }
    Ok(())
}

fn cmd_config(config: &Config, backend: Backend) -> Result<()> {
    println!("config: {}", config::show_config_path());
    let store_path = config
        .store
        .path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_store_path(backend));
    println!("\n[store]");
    println!("  backend = {backend:?}");
    println!("  path    = {}", store_path.display());
    println!("\n[quiz]");
    println!("  questions_per_quiz = {}", config.quiz.questions_per_quiz);
    println!("  case_insensitive   = {}", config.quiz.case_insensitive);
    println!(
        "  bank               = {}",
        config.quiz.bank.as_deref().unwrap_or("(none)")
    );
    println!("\n[memory]");
    println!("  enabled = {}", config.memory.enabled);
    println!("  label   = {}", config.memory.label);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_result(result: &QuizAttemptResult) {
    println!("--- {} ---", result.topic);
    println!("  student:  {}", result.student);
    println!(
        "  score:    {}/{} ({:.1}%)",
        result.correct_count, result.total_count, result.accuracy
    );
    println!("  level:    {}", result.level);
    println!("  {}", result.reasoning());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
