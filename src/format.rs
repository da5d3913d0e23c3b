use anyhow::{Context, Result};
use serde::Serialize;
use std::io::IsTerminal;
use std::str::FromStr;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Compact plain text, one record per line - default when piped
    Text,
    /// JSON envelope - machine-parseable
    Json,
    /// Human-friendly layout with headings - default on a terminal
    Pretty,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => anyhow::bail!("Invalid format '{s}'. Use: text, json, or pretty"),
        }
    }
}

impl OutputFormat {
    /// Pick the effective format.
    ///
    /// An explicit `--format` wins, then the `FORMAT` environment variable,
    /// then pretty on a terminal and text otherwise.
    #[must_use]
    pub fn resolve(explicit: Option<Self>) -> Self {
        if let Some(format) = explicit {
            return format;
        }
        if let Some(format) = std::env::var("FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            return format;
        }
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Text
        }
    }

    /// Serialize data for the JSON format
    pub fn serialize<T: Serialize>(self, data: &T) -> Result<String> {
        serde_json::to_string_pretty(data).context("JSON serialization failed")
    }
}
