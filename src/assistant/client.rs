//! Assistant client: one invocation runs thread → message → run → poll → list.

use std::sync::Arc;
use std::time::Instant;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use super::api::{AssistantsApi, Run, RunStatus, ThreadMessage};
use crate::config::ClientConfig;
use crate::conversation::Role;
use crate::error::InvocationError;

/// Outcome of a successful invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub thread_id: String,
    pub run_id: String,
    pub status: RunStatus,
    /// Every message on the thread, in the order the API returned them.
    pub messages: Vec<ThreadMessage>,
}

impl Invocation {
    /// Text of assistant-authored messages, in returned order.
    pub fn assistant_texts(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(ThreadMessage::text)
    }
}

/// Drives a single remote run to completion. Stateless between calls.
#[derive(Clone)]
pub struct AssistantClient {
    api: Arc<dyn AssistantsApi>,
    config: ClientConfig,
}

impl AssistantClient {
    pub fn new(api: Arc<dyn AssistantsApi>, config: ClientConfig) -> Self {
        Self { api, config }
    }

    /// Send `content` to `assistant_id` on a brand-new thread and wait for
    /// the run to finish.
    ///
    /// No thread is reused: the assistant sees only `content`. The whole
    /// exchange, every remote call included, is bounded by `max_wait`.
    /// Failures are logged here once and returned to the caller untouched.
    pub async fn invoke(
        &self,
        content: &str,
        assistant_id: &str,
        credential: &SecretString,
    ) -> Result<Invocation, InvocationError> {
        let started = Instant::now();
        let exchange = self.invoke_inner(content, assistant_id, credential);
        let result = match self.config.max_wait {
            Some(max_wait) => tokio::time::timeout(max_wait, exchange)
                .await
                .unwrap_or(Err(InvocationError::TimedOut { waited: max_wait })),
            None => exchange.await,
        };

        match &result {
            Ok(invocation) => info!(
                assistant_id,
                thread_id = %invocation.thread_id,
                run_id = %invocation.run_id,
                status = %invocation.status,
                messages = invocation.messages.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Assistant run completed"
            ),
            Err(e) if e.is_run_failure() => warn!(
                assistant_id,
                error = %e,
                "Assistant run did not complete"
            ),
            Err(e) => warn!(
                assistant_id,
                error = %e,
                "Assistant request failed"
            ),
        }

        result
    }

    async fn invoke_inner(
        &self,
        content: &str,
        assistant_id: &str,
        credential: &SecretString,
    ) -> Result<Invocation, InvocationError> {
        let thread = self.api.create_thread(credential).await?;
        debug!(thread_id = %thread.id, "Thread created");

        self.api
            .create_message(credential, &thread.id, Role::User, content)
            .await?;

        let run = self
            .api
            .create_run(credential, &thread.id, assistant_id)
            .await?;
        debug!(thread_id = %thread.id, run_id = %run.id, status = %run.status, "Run created");

        let run = self.poll_until_terminal(credential, &thread.id, run).await?;

        if run.status.is_failure() {
            return Err(InvocationError::RunEnded {
                run_id: run.id,
                status: run.status.to_string(),
                reason: run.last_error.and_then(|e| e.message),
            });
        }

        // Incomplete or otherwise unfinished runs may still have posted
        // partial output, so the thread is read for every non-failure.
        let messages = self.api.list_messages(credential, &thread.id).await?;

        Ok(Invocation {
            thread_id: thread.id,
            run_id: run.id,
            status: run.status,
            messages,
        })
    }

    /// Poll until the run leaves `queued`/`in_progress`.
    async fn poll_until_terminal(
        &self,
        credential: &SecretString,
        thread_id: &str,
        mut run: Run,
    ) -> Result<Run, InvocationError> {
        let mut polls: u32 = 0;
        while run.status.is_pending() {
            tokio::time::sleep(self.config.poll_interval).await;
            run = self.api.retrieve_run(credential, thread_id, &run.id).await?;
            polls += 1;
            debug!(run_id = %run.id, status = %run.status, polls, "Polled run");
        }
        Ok(run)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::assistant::api::{ContentPart, RunError, TextValue, Thread};

    /// Which API call a scripted stub should fail on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum FailAt {
        CreateThread,
        CreateMessage,
        CreateRun,
        RetrieveRun,
        ListMessages,
    }

    /// Scripted in-memory stand-in for the remote API.
    pub(crate) struct StubApi {
        /// Statuses returned by successive `retrieve_run` calls; the last one repeats.
        statuses: Mutex<VecDeque<&'static str>>,
        /// Assistant replies returned by `list_messages`.
        replies: Vec<String>,
        fail_at: Option<FailAt>,
        pub(crate) calls: Mutex<Vec<String>>,
        threads_created: Mutex<u32>,
    }

    impl StubApi {
        pub(crate) fn replying(replies: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(VecDeque::from(["in_progress", "completed"])),
                replies: replies.iter().map(|s| s.to_string()).collect(),
                fail_at: None,
                calls: Mutex::new(Vec::new()),
                threads_created: Mutex::new(0),
            }
        }

        pub(crate) fn with_statuses(mut self, statuses: &[&'static str]) -> Self {
            self.statuses = Mutex::new(statuses.iter().copied().collect());
            self
        }

        pub(crate) fn failing_at(mut self, step: FailAt) -> Self {
            self.fail_at = Some(step);
            self
        }

        pub(crate) fn call_log(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>, step: FailAt) -> Result<(), InvocationError> {
            self.calls.lock().unwrap().push(call.into());
            if self.fail_at == Some(step) {
                return Err(InvocationError::Transport {
                    operation: format!("{step:?}"),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(())
        }

        fn run(&self, status: &str) -> Run {
            Run {
                id: "run_1".to_string(),
                thread_id: self.current_thread(),
                status: RunStatus::from(status),
                last_error: (status == "failed").then(|| RunError {
                    code: Some("server_error".to_string()),
                    message: Some("assistant crashed".to_string()),
                }),
            }
        }

        fn current_thread(&self) -> String {
            format!("thread_{}", self.threads_created.lock().unwrap())
        }
    }

    #[async_trait]
    impl AssistantsApi for StubApi {
        async fn create_thread(&self, _credential: &SecretString) -> Result<Thread, InvocationError> {
            self.record("create_thread", FailAt::CreateThread)?;
            *self.threads_created.lock().unwrap() += 1;
            Ok(Thread {
                id: self.current_thread(),
            })
        }

        async fn create_message(
            &self,
            _credential: &SecretString,
            thread_id: &str,
            role: Role,
            content: &str,
        ) -> Result<(), InvocationError> {
            self.record(
                format!("create_message {thread_id} {role} {content}"),
                FailAt::CreateMessage,
            )
        }

        async fn create_run(
            &self,
            _credential: &SecretString,
            thread_id: &str,
            assistant_id: &str,
        ) -> Result<Run, InvocationError> {
            self.record(format!("create_run {thread_id} {assistant_id}"), FailAt::CreateRun)?;
            Ok(self.run("queued"))
        }

        async fn retrieve_run(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
            _run_id: &str,
        ) -> Result<Run, InvocationError> {
            self.record("retrieve_run", FailAt::RetrieveRun)?;
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap_or("completed")
            } else {
                statuses.front().copied().unwrap_or("completed")
            };
            Ok(self.run(status))
        }

        async fn list_messages(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
        ) -> Result<Vec<ThreadMessage>, InvocationError> {
            self.record("list_messages", FailAt::ListMessages)?;
            let mut messages: Vec<ThreadMessage> = self
                .replies
                .iter()
                .map(|r| ThreadMessage {
                    id: String::new(),
                    role: Role::Assistant,
                    content: vec![ContentPart::Text {
                        text: TextValue { value: r.clone() },
                    }],
                })
                .collect();
            messages.push(ThreadMessage {
                id: String::new(),
                role: Role::User,
                content: vec![ContentPart::Text {
                    text: TextValue {
                        value: "echo of user".to_string(),
                    },
                }],
            });
            Ok(messages)
        }
    }

    pub(crate) fn fast_config() -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(1),
            max_wait: Some(Duration::from_secs(5)),
        }
    }

    fn key() -> SecretString {
        SecretString::from("sk-test")
    }

    #[tokio::test]
    async fn invoke_runs_full_lifecycle() {
        let stub = Arc::new(StubApi::replying(&["OK"]));
        let client = AssistantClient::new(stub.clone(), fast_config());

        let invocation = client.invoke("ping", "asst_osha", &key()).await.unwrap();
        assert_eq!(invocation.status, RunStatus::Completed);
        assert_eq!(invocation.assistant_texts().collect::<Vec<_>>(), vec!["OK"]);

        let calls = stub.call_log();
        assert_eq!(calls[0], "create_thread");
        assert_eq!(calls[1], "create_message thread_1 user ping");
        assert_eq!(calls[2], "create_run thread_1 asst_osha");
        assert_eq!(calls.last().unwrap(), "list_messages");
        assert_eq!(calls.iter().filter(|c| *c == "retrieve_run").count(), 2);
    }

    #[tokio::test]
    async fn each_invoke_uses_a_fresh_thread() {
        let stub = Arc::new(StubApi::replying(&["OK"]));
        let client = AssistantClient::new(stub.clone(), fast_config());

        let first = client.invoke("a", "asst", &key()).await.unwrap();
        let second = client.invoke("b", "asst", &key()).await.unwrap();
        assert_ne!(first.thread_id, second.thread_id);
    }

    #[tokio::test]
    async fn assistant_texts_filter_out_user_messages() {
        let stub = Arc::new(StubApi::replying(&["second", "first"]));
        let client = AssistantClient::new(stub, fast_config());

        let invocation = client.invoke("x", "asst", &key()).await.unwrap();
        assert_eq!(invocation.messages.len(), 3);
        assert_eq!(
            invocation.assistant_texts().collect::<Vec<_>>(),
            vec!["second", "first"]
        );
    }

    #[tokio::test]
    async fn failed_run_is_reported_with_reason() {
        let stub = Arc::new(StubApi::replying(&["never"]).with_statuses(&["failed"]));
        let client = AssistantClient::new(stub.clone(), fast_config());

        let err = client.invoke("x", "asst", &key()).await.unwrap_err();
        match err {
            InvocationError::RunEnded { status, reason, .. } => {
                assert_eq!(status, "failed");
                assert_eq!(reason.as_deref(), Some("assistant crashed"));
            }
            other => panic!("expected RunEnded, got {other:?}"),
        }
        assert!(!stub.call_log().contains(&"list_messages".to_string()));
    }

    #[tokio::test]
    async fn cancelled_and_expired_runs_are_errors() {
        for status in ["cancelled", "expired"] {
            let stub = Arc::new(StubApi::replying(&["never"]).with_statuses(&[status]));
            let client = AssistantClient::new(stub.clone(), fast_config());

            let err = client.invoke("x", "asst", &key()).await.unwrap_err();
            assert!(
                matches!(&err, InvocationError::RunEnded { status: s, .. } if s == status),
                "{status}: {err:?}"
            );
            assert!(!stub.call_log().contains(&"list_messages".to_string()));
        }
    }

    #[tokio::test]
    async fn incomplete_run_still_returns_partial_output() {
        let stub = Arc::new(StubApi::replying(&["partial answer"]).with_statuses(&["incomplete"]));
        let client = AssistantClient::new(stub.clone(), fast_config());

        let invocation = client.invoke("x", "asst", &key()).await.unwrap();
        assert_eq!(invocation.status, RunStatus::Incomplete);
        assert_eq!(
            invocation.assistant_texts().collect::<Vec<_>>(),
            vec!["partial answer"]
        );
        assert_eq!(stub.call_log().last().unwrap(), "list_messages");
    }

    #[tokio::test]
    async fn requires_action_and_unknown_statuses_fetch_messages() {
        for status in ["requires_action", "paused"] {
            let stub = Arc::new(StubApi::replying(&["so far"]).with_statuses(&[status]));
            let client = AssistantClient::new(stub, fast_config());

            let invocation = client.invoke("x", "asst", &key()).await.unwrap();
            assert_eq!(invocation.status.as_str(), status);
            assert_eq!(invocation.assistant_texts().collect::<Vec<_>>(), vec!["so far"]);
        }
    }

    /// Remote API whose calls never answer.
    struct HangingApi;

    #[async_trait]
    impl AssistantsApi for HangingApi {
        async fn create_thread(&self, _credential: &SecretString) -> Result<Thread, InvocationError> {
            std::future::pending().await
        }

        async fn create_message(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
            _role: Role,
            _content: &str,
        ) -> Result<(), InvocationError> {
            std::future::pending().await
        }

        async fn create_run(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
            _assistant_id: &str,
        ) -> Result<Run, InvocationError> {
            std::future::pending().await
        }

        async fn retrieve_run(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
            _run_id: &str,
        ) -> Result<Run, InvocationError> {
            std::future::pending().await
        }

        async fn list_messages(
            &self,
            _credential: &SecretString,
            _thread_id: &str,
        ) -> Result<Vec<ThreadMessage>, InvocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_request_is_bounded_by_max_wait() {
        let config = ClientConfig {
            poll_interval: Duration::from_millis(1),
            max_wait: Some(Duration::from_millis(50)),
        };
        let client = AssistantClient::new(Arc::new(HangingApi), config);

        let outcome =
            tokio::time::timeout(Duration::from_secs(2), client.invoke("x", "asst", &key())).await;
        let err = outcome.expect("invoke must give up on its own").unwrap_err();
        assert!(matches!(
            err,
            InvocationError::TimedOut { waited } if waited == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn stuck_run_times_out() {
        let stub = Arc::new(StubApi::replying(&[]).with_statuses(&["in_progress"]));
        let config = ClientConfig {
            poll_interval: Duration::from_millis(1),
            max_wait: Some(Duration::from_millis(30)),
        };
        let client = AssistantClient::new(stub, config);

        let err = client.invoke("x", "asst", &key()).await.unwrap_err();
        assert!(matches!(err, InvocationError::TimedOut { .. }));
        assert!(err.is_run_failure());
    }

    #[tokio::test]
    async fn unbounded_wait_still_returns_on_completion() {
        let stub = Arc::new(
            StubApi::replying(&["done"]).with_statuses(&["queued", "in_progress", "completed"]),
        );
        let config = ClientConfig {
            poll_interval: Duration::from_millis(1),
            max_wait: None,
        };
        let client = AssistantClient::new(stub, config);

        let invocation = client.invoke("x", "asst", &key()).await.unwrap();
        assert_eq!(invocation.assistant_texts().collect::<Vec<_>>(), vec!["done"]);
    }

    #[tokio::test]
    async fn failure_at_each_step_is_returned() {
        for step in [
            FailAt::CreateThread,
            FailAt::CreateMessage,
            FailAt::CreateRun,
            FailAt::RetrieveRun,
            FailAt::ListMessages,
        ] {
            let stub = Arc::new(StubApi::replying(&["OK"]).failing_at(step));
            let client = AssistantClient::new(stub, fast_config());
            let err = client.invoke("x", "asst", &key()).await.unwrap_err();
            assert!(
                matches!(err, InvocationError::Transport { .. }),
                "{step:?}: {err:?}"
            );
        }
    }
}
