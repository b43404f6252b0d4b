use std::{fmt, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::task::TaskState;

/// Coarse classification surfaced at every outer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The search provider (or another capability) failed.
    Capability,
    /// The model runtime failed to produce a usable answer for a task.
    AgentInvocation,
    /// A required credential or setting is missing or invalid.
    Configuration,
    /// Crew invariants were violated while building the pipeline.
    Construction,
    /// The caller supplied unusable input (e.g. an empty query).
    InvalidInput,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Capability => "capability",
            ErrorKind::AgentInvocation => "agent_invocation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Construction => "construction",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for CrewSearch.
#[derive(Debug, Error)]
pub enum CrewSearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid crew: {0}")]
    Construction(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("task '{task_id}' failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: TaskError,
        /// Every task's state when the run stopped, in declaration order.
        task_states: Vec<(String, TaskState)>,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrewSearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn construction(reason: impl Into<String>) -> Self {
        Self::Construction(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::MissingSecret(_) | Self::ConfigIo { .. } => {
                ErrorKind::Configuration
            }
            Self::Construction(_) => ErrorKind::Construction,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::TaskFailed { source, .. } => source.kind,
            Self::Other(_) => ErrorKind::Internal,
        }
    }
}

/// Error representing a task failure within the crew graph.
#[derive(Debug, Clone)]
pub struct TaskError {
    pub reason: String,
    pub kind: ErrorKind,
}

impl TaskError {
    pub fn new(reason: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            reason: reason.into(),
            kind,
        }
    }

    pub fn invocation(reason: impl Into<String>) -> Self {
        Self::new(reason, ErrorKind::AgentInvocation)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.reason)
    }
}

impl std::error::Error for TaskError {}
