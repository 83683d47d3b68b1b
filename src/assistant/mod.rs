//! Hosted assistant integration.
//!
//! - `api`: the [`AssistantsApi`] trait and the wire types it returns
//! - `openai`: reqwest implementation against the Assistants v2 endpoints
//! - `client`: [`AssistantClient`], which runs one invocation end to end and
//!   polls the run until it reaches a terminal status

pub mod api;
pub mod client;
pub mod openai;

pub use api::{AssistantsApi, Run, RunStatus, Thread, ThreadMessage};
pub use client::{AssistantClient, Invocation};
pub use openai::OpenAiAssistantsApi;
