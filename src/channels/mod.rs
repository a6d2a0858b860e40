//! Outbound channel abstraction: chat delivery and email.
//!
//! `MessagingGateway` and `EmailTransport` are the seams the workflows talk
//! through; `a1base` and `smtp` are the concrete clients and `outbound`
//! turns generated text into gateway calls.

pub mod a1base;
pub mod outbound;
pub mod smtp;
pub mod webhook;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub use a1base::A1BaseClient;
pub use outbound::{OutboundDispatcher, OutboundTarget};
pub use smtp::SmtpMailer;

/// A direct message to one phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualMessage {
    pub content: String,
    pub from: String,
    pub to: String,
    pub service: String,
}

/// A message posted into a group thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub content: String,
    pub from: String,
    pub thread_id: String,
    pub service: String,
}

/// One outbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub sender_address: String,
    pub recipient_address: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Chat delivery for individual and group threads.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_individual(&self, message: &IndividualMessage) -> Result<(), GatewayError>;

    async fn send_group(&self, message: &GroupMessage) -> Result<(), GatewayError>;
}

/// Single-shot email transmission.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), GatewayError>;
}
