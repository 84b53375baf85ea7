//! Error types for pipeline runs and their configuration.
//!
//! [`Error`] covers everything that stops a run or keeps it from starting.
//! [`TransformError`] is the per-record failure of a transform; it never
//! aborts a run (the record passes through unchanged) and so is kept apart.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// A named input could not be opened. Raised before any record is read.
    #[error("cannot open {} for reading: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file pattern matched no regular file.
    #[error("no input matches pattern '{pattern}'")]
    NoMatchingInput { pattern: String },

    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// Reading an already opened input failed part way through.
    #[error("error reading input: {0}")]
    SourceRead(#[source] io::Error),

    /// Writing an emitted record failed.
    #[error("error writing output: {0}")]
    Sink(#[source] io::Error),

    #[error("option {option} expects a comma separated list of positive integers, got '{value}'")]
    InvalidFieldList { option: &'static str, value: String },

    #[error("expected a substitution of the form s/SEARCH/REPLACE/, got '{0}'")]
    InvalidSubstitution(String),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("{0}")]
    InvalidOptions(String),

    #[error("cannot start {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: io::Error,
    },

    /// A pipeline thread panicked outside of a transform.
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

/// Failure of a transform on one payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Build from the payload of a caught panic.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(format!("transform panicked: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unavailable_names_the_path() {
        let err = Error::SourceUnavailable {
            path: PathBuf::from("missing.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "cannot open missing.txt for reading: not found");
    }

    #[test]
    fn glob_errors_name_the_pattern() {
        let none = Error::NoMatchingInput { pattern: "*.log".into() };
        assert_eq!(none.to_string(), "no input matches pattern '*.log'");
        let bad = Error::InvalidGlob { pattern: "[".into(), reason: "bad".into() };
        assert_eq!(bad.to_string(), "invalid file pattern '[': bad");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(TransformError::from_panic(s.as_ref()).message(), "transform panicked: boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(
            TransformError::from_panic(owned.as_ref()).message(),
            "transform panicked: bang"
        );
    }
}
