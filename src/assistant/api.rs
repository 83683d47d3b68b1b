//! The remote conversation API seam: the five operations the client consumes
//! and the slice of the wire format it reads.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::conversation::Role;
use crate::error::InvocationError;

/// A remote conversation thread. Only the id is used.
#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Lifecycle status of a run, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Other(String),
}

impl RunStatus {
    /// Statuses that keep the poller waiting. Everything else ends polling.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    /// Terminal statuses that mean the run produced no usable answer.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for RunStatus {
    fn from(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

impl Serialize for RunStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One execution of an assistant against a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

/// Text body of a message content part.
#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub value: String,
}

/// One part of a message's content. Non-text parts are kept opaque.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: TextValue },
    #[serde(other)]
    Unsupported,
}

/// A message on a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    /// The first text part's value, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value.as_str()),
            ContentPart::Unsupported => None,
        })
    }
}

/// Paged list wrapper used by the list-messages endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    pub data: Vec<ThreadMessage>,
}

/// Operations consumed from the remote conversation API.
///
/// Every call takes the session's credential; implementations must not log it.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn create_thread(&self, credential: &SecretString) -> Result<Thread, InvocationError>;

    async fn create_message(
        &self,
        credential: &SecretString,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), InvocationError>;

    async fn create_run(
        &self,
        credential: &SecretString,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, InvocationError>;

    async fn retrieve_run(
        &self,
        credential: &SecretString,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Run, InvocationError>;

    async fn list_messages(
        &self,
        credential: &SecretString,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, InvocationError>;
}
