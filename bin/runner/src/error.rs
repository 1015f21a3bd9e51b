//! Domain error types for the runner.

use std::fmt;
use std::path::PathBuf;

/// Errors that stop the runner before or after a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The environment configuration is invalid.
    Config { reason: String },
    /// A file could not be read.
    ReadFile { path: PathBuf, reason: String },
    /// The workflow definition is not valid JSON or has the wrong shape.
    InvalidDefinition { path: PathBuf, reason: String },
    /// The workflow graph is structurally invalid.
    InvalidGraph { reason: String },
    /// The trigger payload is not valid JSON.
    InvalidTrigger { reason: String },
    /// The result could not be rendered.
    Render { reason: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::ReadFile { path, reason } => {
                write!(f, "failed to read '{}': {reason}", path.display())
            }
            Self::InvalidDefinition { path, reason } => {
                write!(f, "invalid workflow definition '{}': {reason}", path.display())
            }
            Self::InvalidGraph { reason } => write!(f, "invalid workflow graph: {reason}"),
            Self::InvalidTrigger { reason } => write!(f, "invalid trigger payload: {reason}"),
            Self::Render { reason } => write!(f, "failed to render result: {reason}"),
        }
    }
}

impl std::error::Error for RunnerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_file() {
        let err = RunnerError::ReadFile {
            path: PathBuf::from("flows/daily.json"),
            reason: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "failed to read 'flows/daily.json': not found");
    }
}
