//! Logger configuration and presets.

use serde::{Deserialize, Serialize};

/// Output layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human-oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON with event fields flattened.
    Json,
}

impl Format {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Where formatted events go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Writer {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// The libtest capture buffer, so output only shows for failing tests.
    Test,
}

/// What each line shows besides the message and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors.
    pub colors: bool,
    /// Event target (module path).
    pub target: bool,
    /// Source file and line.
    pub source: bool,
    /// Timestamp.
    pub time: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: false,
            target: true,
            source: false,
            time: true,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directives, e.g. `info,quasar_render=debug`.
    pub level: String,
    /// Output layout.
    pub format: Format,
    /// Line decorations.
    pub display: DisplayConfig,
    /// Output destination.
    pub writer: Writer,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: Format::default(),
            display: DisplayConfig::default(),
            writer: Writer::default(),
        }
    }
}

impl Config {
    /// Configuration from `QUASAR_LOG` (falling back to `RUST_LOG`) and
    /// `QUASAR_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup("QUASAR_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = lookup("QUASAR_LOG_FORMAT") {
            config.format = Format::parse(&format);
        }
        config
    }

    /// Pretty, colored, debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_owned(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// JSON, info level, no colors.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_owned(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Compact, trace level, written to the test capture buffer.
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_owned(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            writer: Writer::Test,
        }
    }
}
