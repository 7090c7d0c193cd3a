use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading a configuration.
///
/// Two channels are kept apart on purpose: malformed schemas (duplicate
/// embedded names, non-record destinations) are programmer errors and the
/// loader aborts on them, while everything below is load-time input trouble
/// returned to the caller.
#[derive(Debug, Error)]
pub enum ConflateError {
    /// The declared schema cannot be projected into a value tree.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// A source's value could not be decoded into the target field.
    #[error("invalid value for '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// A file or directory read failed for a configured location.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unknown flag, missing flag value, or other argument trouble.
    #[error("{0}")]
    Usage(String),

    /// The arguments asked for help. Carries the rendered help text; not a
    /// failure, but it ends the load.
    #[error("{0}")]
    Help(String),

    #[error("missing command")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Post-merge validation failures, one entry per failing field.
    #[error("{0}")]
    Invalid(Violations),
}

impl ConflateError {
    /// True for the help outcome, which callers exit zero on.
    pub fn is_help(&self) -> bool {
        matches!(self, ConflateError::Help(_))
    }
}

/// One failed validation check: the dotted field path and a human reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Violation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The composite of every validation failure in one load, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new(mut violations: Vec<Violation>) -> Self {
        violations.sort_by(|a, b| a.path.cmp(&b.path));
        Violations(violations)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration:")?;
        for v in &self.0 {
            write!(f, "\n  {}: {}", v.path, v.reason)?;
        }
        Ok(())
    }
}
