//! Error types for CIB transactions.
//!
//! Errors are categorized so the retry loop can tell contention (a push the
//! live cluster rejected) apart from malformed requests and broken tooling.
//! Every variant that comes from an external tool keeps the command line and
//! its output so the full diagnostic is never lost.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of CIB errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The live cluster moved underneath us (retryable)
    Transient,
    /// An offline command failed against a freshly exported snapshot
    Contract,
    /// A pacemaker tool exited with an undocumented status
    Tool,
    /// The host environment failed us (spawn, filesystem)
    Environment,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Concurrent cluster change",
            Self::Contract => "Malformed request",
            Self::Tool => "Cluster tool failure",
            Self::Environment => "Environment failure",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Increase the number of tries or the delay between them",
            Self::Contract => "Check the pcs command; it failed against an untouched CIB copy",
            Self::Tool => "Check the pacemaker tool versions installed on this node",
            Self::Environment => "Check that the snapshot directory is writable and tools exist",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while driving the CIB.
#[derive(Debug, Error)]
pub enum Error {
    /// Exporting the live CIB into a snapshot failed
    #[error("backup_cib: running {command} failed with code {code}: {output}")]
    Backup {
        /// Command line that was run
        command: String,
        /// Exit code of the export
        code: i32,
        /// Combined output of the export
        output: String,
    },

    /// An offline mutation failed against a just-exported snapshot
    #[error("{command} returned an error on {resource}: {output}")]
    OfflineCommand {
        /// Command line that was run
        command: String,
        /// Resource or constraint the command was about
        resource: String,
        /// Combined output of the command
        output: String,
    },

    /// The live cluster refused the pushed snapshot
    #[error("push_cib: running {command} failed with code {code}: {output}")]
    PushRejected {
        /// Command line that was run
        command: String,
        /// Exit code of the push
        code: i32,
        /// Combined output of the push
        output: String,
    },

    /// An online pcs command failed
    #[error("{command} failed with code {code}: {output}")]
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit code of the command
        code: i32,
        /// Combined output of the command
        output: String,
    },

    /// A simulator or diff tool exited with an undocumented status
    #[error("{command} failed with ({code}): {output}")]
    Tool {
        /// Command line that was run
        command: String,
        /// Exit code of the tool
        code: i32,
        /// Combined output of the tool
        output: String,
    },

    /// Every allowed attempt failed
    #[error("{command} failed after {attempts} attempt(s): {summary}")]
    RetriesExhausted {
        /// Logical command that was retried
        command: String,
        /// Number of attempts made
        attempts: u32,
        /// First line of the last failure's output
        summary: String,
        /// The last failure
        #[source]
        source: Box<Error>,
    },

    /// An external command could not be started at all
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// Command line that was attempted
        command: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error on a snapshot or scratch file
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A tool produced XML we could not parse
    #[error("malformed XML from {origin}: {source}")]
    Xml {
        /// Where the document came from
        origin: String,
        /// Parser error
        #[source]
        source: roxmltree::Error,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::PushRejected { .. } | Error::CommandFailed { .. } => ErrorCategory::Transient,
            Error::OfflineCommand { .. } => ErrorCategory::Contract,
            Error::Tool { .. } | Error::Xml { .. } => ErrorCategory::Tool,
            Error::Backup { .. } | Error::Spawn { .. } | Error::Io { .. } => {
                ErrorCategory::Environment
            }
            Error::RetriesExhausted { source, .. } => source.category(),
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// One-line summary suitable for end users: the first line of the tool
    /// output when there is one, otherwise the full message.
    pub fn summary(&self) -> String {
        match self {
            Error::Backup { output, .. }
            | Error::OfflineCommand { output, .. }
            | Error::PushRejected { output, .. }
            | Error::CommandFailed { output, .. }
            | Error::Tool { output, .. } => first_line(output),
            Error::RetriesExhausted { summary, .. } => summary.clone(),
            other => other.to_string(),
        }
    }
}

/// First line of a tool's output, without the trailing newline.
pub fn first_line(output: &str) -> String {
    output.lines().next().unwrap_or_default().trim_end().to_string()
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}

/// Result type for CIB operations.
pub type Result<T> = std::result::Result<T, Error>;
