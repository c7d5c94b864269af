//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$MASTERY_CONFIG` environment variable
//! 2. `~/.config/mastery/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use mastery_core::{CaseMode, DEFAULT_QUESTIONS, LEVEL_UPDATE_LABEL, MAX_QUESTIONS, MIN_QUESTIONS};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub quiz: QuizConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single SQLite database
    #[default]
    Sqlite,
    /// One JSON file per student
    Json,
}

/// Progress storage settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Database file (sqlite) or results directory (json). Default: platform data dir.
    pub path: Option<String>,
}

/// Quiz defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub questions_per_quiz: usize,
    /// Accept answers that differ from the correct option only in case.
    pub case_insensitive: bool,
    /// Question bank TOML file.
    pub bank: Option<String>,
}

/// Annotation settings for the memory collaborator.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub label: String,
}

// --- Defaults ---

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            questions_per_quiz: DEFAULT_QUESTIONS,
            case_insensitive: false,
            bank: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            label: LEVEL_UPDATE_LABEL.into(),
        }
    }
}

impl QuizConfig {
    pub fn case_mode(&self) -> CaseMode {
        if self.case_insensitive {
            CaseMode::Insensitive
        } else {
            CaseMode::Sensitive
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let n = self.quiz.questions_per_quiz;
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&n) {
            bail!(
                "quiz.questions_per_quiz must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}, got {n}"
            );
        }
        if self.memory.label.trim().is_empty() {
            bail!("memory.label must not be empty");
        }
        Ok(())
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid config {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MASTERY_CONFIG") {
        return Some(PathBuf::from(p));
    }

    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".config").join("mastery").join("config.toml"))
}

/// Show the active config path (for `mastery config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
