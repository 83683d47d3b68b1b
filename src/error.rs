//! Error types for RiskRadar.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Duplicate assistant {field}: {value}")]
    DuplicateAssistant { field: String, value: String },

    #[error("Expected exactly one upload target assistant, found {found}")]
    UploadTarget { found: usize },
}

/// Spreadsheet extraction and rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Could not parse uploaded file: {reason}")]
    Parse { reason: String },

    #[error("Hazard index {index} out of range (0..{len})")]
    Index { index: usize, len: usize },
}

/// Failures anywhere in the thread → message → run → poll → list lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Request to {operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Authentication failed for {operation}")]
    AuthFailed { operation: String },

    #[error("{operation} returned HTTP {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Run {run_id} ended with status {status}{suffix}", suffix = reason_suffix(.reason))]
    RunEnded {
        run_id: String,
        status: String,
        reason: Option<String>,
    },

    #[error("Assistant did not respond within {waited:?}")]
    TimedOut { waited: Duration },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl InvocationError {
    /// Whether the remote run itself reached a bad terminal state, as opposed
    /// to the request plumbing failing.
    pub fn is_run_failure(&self) -> bool {
        matches!(self, Self::RunEnded { .. } | Self::TimedOut { .. })
    }
}

/// Errors surfaced by the session controller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please enter your API key to proceed.")]
    CredentialMissing,

    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Unknown assistant: {0}")]
    UnknownAssistant(String),

    #[error("No spreadsheet has been uploaded in this session")]
    NoUpload,

    #[error("Message content is empty")]
    EmptyContent,

    #[error("An error occurred while processing the file: {0}")]
    Extract(#[from] ExtractError),

    #[error("An error occurred: {0}")]
    Invocation(#[from] InvocationError),
}
