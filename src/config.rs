//! Configuration types.

use std::collections::HashSet;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;

use crate::error::ConfigError;

/// Label of the assistant that receives spreadsheet uploads.
pub const OSHA_LABEL: &str = "OSHA Hazard Violation";

/// Label of the job safety assessment assistant.
pub const RISKRADAR_LABEL: &str = "RiskRadar: Job Safety Assessment App";

const DEFAULT_OSHA_ASSISTANT_ID: &str = "asst_VtTVcysjzIGyZpshBCQW5AfU";
const DEFAULT_RISKRADAR_ASSISTANT_ID: &str = "asst_Kr7ozxBcZXSYY1v1oLhqoq3G";

/// Default base URL of the remote conversation API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// One configured hosted assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantProfile {
    /// URL-safe key used in API paths.
    pub key: String,
    /// Display label; also the conversation history key.
    pub label: String,
    /// Remote assistant identifier.
    pub assistant_id: String,
    /// Whether the spreadsheet upload flow targets this assistant.
    pub accepts_uploads: bool,
}

impl AssistantProfile {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            assistant_id: assistant_id.into(),
            accepts_uploads: false,
        }
    }

    /// Mark this assistant as the upload target.
    pub fn with_uploads(mut self) -> Self {
        self.accepts_uploads = true;
        self
    }
}

/// Fixed table of assistants, enumerable at startup.
#[derive(Debug, Clone)]
pub struct AssistantDirectory {
    profiles: Vec<AssistantProfile>,
}

impl AssistantDirectory {
    /// Build a directory, rejecting duplicate keys/labels, empty ids, and
    /// anything other than exactly one upload target.
    pub fn new(profiles: Vec<AssistantProfile>) -> Result<Self, ConfigError> {
        let mut keys = HashSet::new();
        let mut labels = HashSet::new();
        for profile in &profiles {
            if profile.assistant_id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("assistant_id for {}", profile.label),
                    message: "must not be empty".to_string(),
                });
            }
            if !keys.insert(profile.key.as_str()) {
                return Err(ConfigError::DuplicateAssistant {
                    field: "key".to_string(),
                    value: profile.key.clone(),
                });
            }
            if !labels.insert(profile.label.as_str()) {
                return Err(ConfigError::DuplicateAssistant {
                    field: "label".to_string(),
                    value: profile.label.clone(),
                });
            }
        }

        let upload_targets = profiles.iter().filter(|p| p.accepts_uploads).count();
        if upload_targets != 1 {
            return Err(ConfigError::UploadTarget {
                found: upload_targets,
            });
        }

        Ok(Self { profiles })
    }

    /// The two stock assistants with the given identifiers.
    pub fn standard(osha_id: &str, riskradar_id: &str) -> Result<Self, ConfigError> {
        Self::new(vec![
            AssistantProfile::new("osha", OSHA_LABEL, osha_id).with_uploads(),
            AssistantProfile::new("riskradar", RISKRADAR_LABEL, riskradar_id),
        ])
    }

    pub fn profiles(&self) -> &[AssistantProfile] {
        &self.profiles
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.label.as_str())
    }

    pub fn by_key(&self, key: &str) -> Option<&AssistantProfile> {
        self.profiles.iter().find(|p| p.key == key)
    }

    pub fn by_label(&self, label: &str) -> Option<&AssistantProfile> {
        self.profiles.iter().find(|p| p.label == label)
    }

    /// Resolve either a key or a display label.
    pub fn resolve(&self, key_or_label: &str) -> Option<&AssistantProfile> {
        self.by_key(key_or_label)
            .or_else(|| self.by_label(key_or_label))
    }

    /// The assistant that receives uploaded hazards. Validated to exist.
    pub fn upload_target(&self) -> &AssistantProfile {
        self.profiles
            .iter()
            .find(|p| p.accepts_uploads)
            .unwrap_or(&self.profiles[0])
    }

    /// The assistant selected when a session starts.
    pub fn default_profile(&self) -> &AssistantProfile {
        &self.profiles[0]
    }
}

/// Run polling configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Delay between run status checks.
    pub poll_interval: Duration,
    /// Give up waiting on a run after this long. `None` polls forever.
    pub max_wait: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: Some(Duration::from_secs(300)), // 5 minutes
        }
    }
}

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Base URL of the remote conversation API.
    pub api_base: String,
    pub client: ClientConfig,
    /// Sessions idle longer than this are ended by the sweep task.
    pub session_idle_timeout: Duration,
    /// Credential new sessions start with when the user supplies none.
    pub default_api_key: Option<SecretString>,
    pub assistants: AssistantDirectory,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("RISKRADAR_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = parse_env("RISKRADAR_PORT")?.unwrap_or(8080);

        let api_base = std::env::var("RISKRADAR_API_BASE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let poll_interval_ms: u64 = parse_env("RISKRADAR_POLL_INTERVAL_MS")?.unwrap_or(1000);
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RISKRADAR_POLL_INTERVAL_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        // 0 disables the bound entirely.
        let max_wait_secs: u64 = parse_env("RISKRADAR_MAX_WAIT_SECS")?.unwrap_or(300);
        let max_wait = (max_wait_secs > 0).then(|| Duration::from_secs(max_wait_secs));

        let idle_secs: u64 = parse_env("RISKRADAR_SESSION_IDLE_SECS")?.unwrap_or(3600);

        let default_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        let osha_id = std::env::var("RISKRADAR_OSHA_ASSISTANT_ID")
            .unwrap_or_else(|_| DEFAULT_OSHA_ASSISTANT_ID.to_string());
        let riskradar_id = std::env::var("RISKRADAR_JSA_ASSISTANT_ID")
            .unwrap_or_else(|_| DEFAULT_RISKRADAR_ASSISTANT_ID.to_string());

        Ok(Self {
            bind_addr,
            port,
            api_base,
            client: ClientConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_wait,
            },
            session_idle_timeout: Duration::from_secs(idle_secs),
            default_api_key,
            assistants: AssistantDirectory::standard(&osha_id, &riskradar_id)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
