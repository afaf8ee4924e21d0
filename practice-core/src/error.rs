//! Error types for the practice core.
//!
//! Range violations and bad math input never reach this module: they are
//! clamped or neutralised where they occur. What remains are the conditions
//! a user can actually do something about.

use std::path::PathBuf;
use thiserror::Error;

/// An external resource the controllers depend on is unavailable.
///
/// These are recoverable. The controller that hit one keeps running in a
/// degraded mode and exposes [`ResourceError::user_message`] to the front end.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// An audio sample file could not be found or opened.
    #[error("audio sample '{path}' is unavailable: {reason}")]
    SampleMissing {
        /// Path of the missing sample.
        path: PathBuf,
        /// Why it could not be used.
        reason: String,
    },

    /// The audio input (microphone) could not be opened.
    #[error("audio input unavailable: {0}")]
    InputUnavailable(String),

    /// The audio output device could not be opened.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),
}

impl ResourceError {
    /// Short message suitable for showing next to the affected control.
    pub fn user_message(&self) -> String {
        match self {
            ResourceError::SampleMissing { path, .. } => {
                format!("Audio file not found: {}", path.display())
            }
            ResourceError::InputUnavailable(_) => {
                "Microphone unavailable. Running in simulation mode.".to_string()
            }
            ResourceError::OutputUnavailable(_) => {
                "Audio output unavailable. Running silently.".to_string()
            }
        }
    }
}

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read config '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),
}
