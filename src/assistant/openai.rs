//! HTTP implementation of [`AssistantsApi`] against the OpenAI Assistants v2 API.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::api::{AssistantsApi, MessageList, Run, Thread, ThreadMessage};
use crate::conversation::Role;
use crate::error::InvocationError;

/// Beta header value required by the Assistants endpoints.
const ASSISTANTS_BETA: &str = "assistants=v2";

#[derive(Serialize)]
struct CreateMessageBody<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunBody<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// reqwest-backed client for the remote conversation API.
pub struct OpenAiAssistantsApi {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiAssistantsApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        credential: &SecretString,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(credential.expose_secret())
            .header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, InvocationError> {
        let response = request
            .send()
            .await
            .map_err(|e| InvocationError::Transport {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(InvocationError::AuthFailed {
                operation: operation.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::Transport {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(InvocationError::Api {
                operation: operation.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| InvocationError::InvalidResponse {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl AssistantsApi for OpenAiAssistantsApi {
    async fn create_thread(&self, credential: &SecretString) -> Result<Thread, InvocationError> {
        let request = self
            .request(reqwest::Method::POST, "threads", credential)
            .json(&serde_json::json!({}));
        self.send("create_thread", request).await
    }

    async fn create_message(
        &self,
        credential: &SecretString,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), InvocationError> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("threads/{thread_id}/messages"),
                credential,
            )
            .json(&CreateMessageBody { role, content });
        let _: serde_json::Value = self.send("create_message", request).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        credential: &SecretString,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, InvocationError> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("threads/{thread_id}/runs"),
                credential,
            )
            .json(&CreateRunBody { assistant_id });
        self.send("create_run", request).await
    }

    async fn retrieve_run(
        &self,
        credential: &SecretString,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Run, InvocationError> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("threads/{thread_id}/runs/{run_id}"),
            credential,
        );
        self.send("retrieve_run", request).await
    }

    async fn list_messages(
        &self,
        credential: &SecretString,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, InvocationError> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("threads/{thread_id}/messages"),
            credential,
        );
        let list: MessageList = self.send("list_messages", request).await?;
        Ok(list.data)
    }
}
