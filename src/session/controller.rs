//! Session controller: routes chat input and selected hazards to the right
//! assistant and records the results in the session's history.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Session, SessionRegistry, SessionSlot};
use crate::assistant::AssistantClient;
use crate::config::{AssistantDirectory, AssistantProfile};
use crate::conversation::ChatTurn;
use crate::error::SessionError;
use crate::hazards::{self, HazardTable, SpreadsheetFormat};

/// What the UI needs to know about a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub active: String,
    pub has_credential: bool,
    pub hazard_count: Option<usize>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            active: session.active.clone(),
            has_credential: session.has_credential(),
            hazard_count: session.hazards.as_ref().map(HazardTable::len),
        }
    }
}

/// Top-level orchestration over sessions, the assistant directory, and the
/// assistant client.
pub struct SessionController {
    directory: AssistantDirectory,
    client: AssistantClient,
    registry: Arc<SessionRegistry>,
    default_credential: Option<SecretString>,
}

impl SessionController {
    pub fn new(
        directory: AssistantDirectory,
        client: AssistantClient,
        registry: Arc<SessionRegistry>,
        default_credential: Option<SecretString>,
    ) -> Self {
        Self {
            directory,
            client,
            registry,
            default_credential,
        }
    }

    pub fn directory(&self) -> &AssistantDirectory {
        &self.directory
    }

    /// Start a session. A blank `api_key` falls back to the configured default.
    pub async fn start_session(&self, api_key: Option<String>) -> SessionView {
        let credential = api_key
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .or_else(|| self.default_credential.clone());
        let session = Session::new(&self.directory, credential);
        let view = SessionView::from(&session);
        self.registry.insert(session).await;
        view
    }

    pub async fn end_session(&self, id: Uuid) -> Result<(), SessionError> {
        if self.registry.remove(id).await {
            Ok(())
        } else {
            Err(SessionError::NotFound(id.to_string()))
        }
    }

    pub async fn view(&self, id: Uuid) -> Result<SessionView, SessionError> {
        let slot = self.slot(id).await?;
        let mut session = slot.state.lock().await;
        session.touch();
        Ok(SessionView::from(&*session))
    }

    pub async fn set_credential(&self, id: Uuid, api_key: String) -> Result<SessionView, SessionError> {
        if api_key.trim().is_empty() {
            return Err(SessionError::CredentialMissing);
        }
        let slot = self.slot(id).await?;
        let mut session = slot.state.lock().await;
        session.set_credential(SecretString::from(api_key));
        session.touch();
        info!(session_id = %id, "Credential set");
        Ok(SessionView::from(&*session))
    }

    /// Switch the active assistant tab.
    pub async fn select_assistant(&self, id: Uuid, key: &str) -> Result<SessionView, SessionError> {
        let profile = self.profile(key)?;
        let slot = self.slot(id).await?;
        let mut session = slot.state.lock().await;
        session.active = profile.key.clone();
        session.touch();
        Ok(SessionView::from(&*session))
    }

    /// History for the assistant identified by `key` (key or label).
    pub async fn history(&self, id: Uuid, key: &str) -> Result<Vec<ChatTurn>, SessionError> {
        let profile = self.profile(key)?;
        let slot = self.slot(id).await?;
        let mut session = slot.state.lock().await;
        session.touch();
        Ok(session.conversations.history(&profile.label).to_vec())
    }

    /// Send free text to the active assistant. Returns the turns appended.
    pub async fn send_message(&self, id: Uuid, content: &str) -> Result<Vec<ChatTurn>, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyContent);
        }
        let slot = self.slot(id).await?;
        let active = slot.state.lock().await.active.clone();
        let profile = self.profile(&active)?.clone();
        self.converse(id, &slot, &profile, content).await
    }

    /// Parse an uploaded spreadsheet and keep it as the session's hazard table.
    pub async fn upload(
        &self,
        id: Uuid,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<HazardTable, SessionError> {
        let slot = self.slot(id).await?;
        let format = SpreadsheetFormat::detect(file_name, bytes);
        let parsed = hazards::extract(bytes, format);

        let mut session = slot.state.lock().await;
        session.touch();
        match parsed {
            Ok(table) => {
                info!(
                    session_id = %id,
                    file = file_name.unwrap_or("<unnamed>"),
                    rows = table.raw_row_count,
                    hazards = table.len(),
                    "File processed successfully"
                );
                session.hazards = Some(table.clone());
                Ok(table)
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Upload rejected");
                session.hazards = None;
                Err(e.into())
            }
        }
    }

    /// Render hazard `index` from the current upload without sending it.
    pub async fn preview_hazard(&self, id: Uuid, index: usize) -> Result<String, SessionError> {
        let slot = self.slot(id).await?;
        let session = slot.state.lock().await;
        let table = session.hazards.as_ref().ok_or(SessionError::NoUpload)?;
        Ok(table.render(index)?)
    }

    /// Send hazard `index` to the upload target assistant, whatever tab is active.
    pub async fn submit_hazard(&self, id: Uuid, index: usize) -> Result<Vec<ChatTurn>, SessionError> {
        let text = self.preview_hazard(id, index).await?;
        let slot = self.slot(id).await?;
        let profile = self.directory.upload_target().clone();
        self.converse(id, &slot, &profile, &text).await
    }

    /// Invoke `profile` with `content` and, only on success, append the user
    /// turn followed by every assistant reply in the order returned.
    async fn converse(
        &self,
        id: Uuid,
        slot: &SessionSlot,
        profile: &AssistantProfile,
        content: &str,
    ) -> Result<Vec<ChatTurn>, SessionError> {
        let _gate = slot.invoke_gate.lock().await;

        let credential = {
            let mut session = slot.state.lock().await;
            session.touch();
            session
                .credential()
                .cloned()
                .ok_or(SessionError::CredentialMissing)?
        };

        info!(session_id = %id, assistant = %profile.label, "Invoking assistant");
        let invocation = self
            .client
            .invoke(content, &profile.assistant_id, &credential)
            .await?;

        let mut turns = vec![ChatTurn::user(content)];
        turns.extend(invocation.assistant_texts().map(ChatTurn::assistant));

        let mut session = slot.state.lock().await;
        session.conversations.extend(&profile.label, turns.iter().cloned());
        session.touch();
        Ok(turns)
    }

    fn profile(&self, key: &str) -> Result<&AssistantProfile, SessionError> {
        self.directory
            .resolve(key)
            .ok_or_else(|| SessionError::UnknownAssistant(key.to_string()))
    }

    async fn slot(&self, id: Uuid) -> Result<Arc<SessionSlot>, SessionError> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}
