use serde::{Deserialize, Serialize};
use std::fmt;

/// Accuracy (percent) at which a student stops being a beginner.
pub const INTERMEDIATE_THRESHOLD: f64 = 60.0;
/// Accuracy (percent) at which a student counts as advanced.
pub const ADVANCED_THRESHOLD: f64 = 85.0;

/// Expertise tier derived from quiz accuracy. Ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    /// Map an accuracy percentage onto a tier.
    ///
    /// Lower bounds are inclusive: 60.0 is Intermediate, 85.0 is Advanced.
    /// NaN falls through to Beginner.
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= ADVANCED_THRESHOLD {
            Self::Advanced
        } else if accuracy >= INTERMEDIATE_THRESHOLD {
            Self::Intermediate
        } else {
            Self::Beginner
        }
    }

    pub fn reasoning(self) -> &'static str {
        match self {
            Self::Beginner => "Needs more practice with fundamental concepts",
            Self::Intermediate => "Good understanding but room for improvement",
            Self::Advanced => "Excellent mastery of the topic",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(format!("invalid level: {s}")),
        }
    }
}
