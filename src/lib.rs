//! chat-triage: conversation state and intent routing for a chat agent.

pub mod agent;
pub mod app;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod workflows;
