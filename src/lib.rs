//! RiskRadar: chat front-end for two hosted safety assistants.

pub mod assistant;
pub mod config;
pub mod conversation;
pub mod error;
pub mod hazards;
pub mod session;
pub mod web;
