//! Outbound dispatcher: generated text and email drafts to gateway calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::channels::{EmailMessage, EmailTransport, GroupMessage, IndividualMessage, MessagingGateway};
use crate::error::GatewayError;
use crate::pipeline::types::ThreadType;

/// Where a chat reply goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundTarget {
    Individual { to: String },
    Group { thread_id: String },
}

impl OutboundTarget {
    /// Pick the delivery target for a thread.
    ///
    /// Individual (and broadcast) threads need the sender's number; group
    /// threads need the thread id.
    pub fn resolve(
        thread_type: ThreadType,
        thread_id: Option<&str>,
        sender_number: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let present = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        match thread_type {
            ThreadType::Individual | ThreadType::Broadcast => present(sender_number)
                .map(|to| Self::Individual { to })
                .ok_or(GatewayError::InvalidTarget {
                    thread_type: thread_type.as_str().to_string(),
                    missing: "sender_number",
                }),
            ThreadType::Group => present(thread_id)
                .map(|thread_id| Self::Group { thread_id })
                .ok_or(GatewayError::InvalidTarget {
                    thread_type: thread_type.as_str().to_string(),
                    missing: "thread_id",
                }),
        }
    }
}

/// Split a reply on newlines, dropping blank parts.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

pub struct OutboundDispatcher {
    gateway: Arc<dyn MessagingGateway>,
    email: Arc<dyn EmailTransport>,
    /// Agent number used as `from` on chat sends.
    from: String,
    service: String,
    sender_email: Option<String>,
    split: bool,
}

impl OutboundDispatcher {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        email: Arc<dyn EmailTransport>,
        from: impl Into<String>,
        service: impl Into<String>,
        sender_email: Option<String>,
        split: bool,
    ) -> Self {
        Self {
            gateway,
            email,
            from: from.into(),
            service: service.into(),
            sender_email,
            split,
        }
    }

    /// Send a text reply. Returns the number of messages sent.
    pub async fn send_text(&self, target: &OutboundTarget, text: &str) -> Result<usize, GatewayError> {
        let parts = if self.split {
            split_paragraphs(text)
        } else if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };

        for part in &parts {
            match target {
                OutboundTarget::Individual { to } => {
                    self.gateway
                        .send_individual(&IndividualMessage {
                            content: part.clone(),
                            from: self.from.clone(),
                            to: to.clone(),
                            service: self.service.clone(),
                        })
                        .await?;
                }
                OutboundTarget::Group { thread_id } => {
                    self.gateway
                        .send_group(&GroupMessage {
                            content: part.clone(),
                            from: self.from.clone(),
                            thread_id: thread_id.clone(),
                            service: self.service.clone(),
                        })
                        .await?;
                }
            }
        }
        debug!(target = ?target, parts = parts.len(), "Text sent");
        Ok(parts.len())
    }

    /// Transmit a single email from the agent's address.
    pub async fn send_email(&self, recipient: &str, subject: &str, body: &str) -> Result<(), GatewayError> {
        let sender_address = self
            .sender_email
            .clone()
            .ok_or(GatewayError::EmailNotConfigured)?;

        self.email
            .send_email(&EmailMessage {
                sender_address,
                recipient_address: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                headers: BTreeMap::new(),
            })
            .await?;
        info!(recipient = %recipient, subject = %subject, "Email sent");
        Ok(())
    }
}
