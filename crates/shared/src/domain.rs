use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! text_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Ok(match RawId::deserialize(deserializer)? {
                    RawId::Text(text) => Self(text),
                    RawId::Number(number) => Self(number.to_string()),
                })
            }
        }
    };
}

/// Server ids show up as `"P1"` as well as bare `1`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

text_id_newtype!(ExamId);
text_id_newtype!(QuestionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    NotStarted,
    Active,
    Paused,
    Ended,
    Scoring,
    ReviewingSolutions,
}

impl Lifecycle {
    /// Lifecycles during which the remote timer is polled.
    pub fn is_timed(self) -> bool {
        matches!(self, Lifecycle::Active | Lifecycle::Paused)
    }

    /// Lifecycles in which a score (or a scoring error) is on screen.
    pub fn is_post_exam(self) -> bool {
        matches!(self, Lifecycle::Scoring | Lifecycle::ReviewingSolutions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerSeverity {
    Normal,
    Warning,
    Danger,
}

impl TimerSeverity {
    pub fn from_remaining(remaining_seconds: u64) -> Self {
        if remaining_seconds <= 60 || remaining_seconds <= 5 * 60 {
            TimerSeverity::Danger
        } else if remaining_seconds <= 15 * 60 {
            TimerSeverity::Warning
        } else {
            TimerSeverity::Normal
        }
    }
}

/// `M:SS`, minutes are not wrapped into hours.
pub fn format_clock(remaining_seconds: u64) -> String {
    format!("{}:{:02}", remaining_seconds / 60, remaining_seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }
}

pub const MIN_SPLIT_RATIO: f64 = 0.2;
pub const MAX_SPLIT_RATIO: f64 = 0.8;
pub const DEFAULT_SPLIT_RATIO: f64 = 0.5;

/// Clamp a split-panel ratio into `[0.2, 0.8]`. NaN falls back to the default.
pub fn clamp_split_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        return DEFAULT_SPLIT_RATIO;
    }
    ratio.clamp(MIN_SPLIT_RATIO, MAX_SPLIT_RATIO)
}
