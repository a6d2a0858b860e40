//! Identifier canonicalization and inbound payload cleanup.
//!
//! Everything here is pure: no I/O, no failure paths.

use crate::config::AgentIdentity;
use crate::pipeline::types::{ThreadMessage, ThreadType, WebhookPayload};

/// Keep only ASCII digits. Used for numeric comparison and storage.
pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strip the leading `+`, keeping the number dialable.
pub fn strip_plus(number: &str) -> &str {
    number.trim_start_matches('+')
}

/// Numeric form of a phone number, if it has any digits that fit an `i64`.
pub fn numeric_phone(number: &str) -> Option<i64> {
    let digits = digits_only(number);
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Whether two numbers refer to the same line, ignoring `+` and any
/// spacing or punctuation. Numbers without digits never match.
pub fn same_number(a: &str, b: &str) -> bool {
    let a = digits_only(a);
    !a.is_empty() && a == digits_only(b)
}

/// A canonical inbound message plus the routing metadata that travels with it.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub thread_id: String,
    pub thread_type: ThreadType,
    pub message: ThreadMessage,
    /// True when the sender is the configured agent number.
    pub from_agent: bool,
}

impl NormalizedMessage {
    pub fn sender_number(&self) -> &str {
        &self.message.sender_number
    }

    pub fn sender_name(&self) -> &str {
        &self.message.sender_name
    }
}

/// Turns raw webhook payloads into [`NormalizedMessage`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    agent: AgentIdentity,
}

impl Normalizer {
    pub fn new(agent: AgentIdentity) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &AgentIdentity {
        &self.agent
    }

    /// Whether `number` is the agent's own line.
    pub fn is_agent(&self, number: &str) -> bool {
        match &self.agent.number {
            Some(agent) => !number.is_empty() && same_number(number, agent),
            None => false,
        }
    }

    pub fn normalize(&self, payload: WebhookPayload) -> NormalizedMessage {
        let WebhookPayload {
            thread_id,
            message_id,
            thread_type,
            content,
            mut sender_number,
            mut sender_name,
            timestamp,
            ..
        } = payload;

        // The channel reports the agent's own group messages with a blank sender.
        if thread_type == ThreadType::Group
            && matches!(sender_number.as_str(), "" | "+")
            && let Some(agent_number) = &self.agent.number
        {
            sender_number = agent_number.clone();
        }

        let from_agent = self.is_agent(&sender_number);
        if from_agent {
            sender_name = self.agent.name.clone();
        }

        NormalizedMessage {
            thread_id,
            thread_type,
            message: ThreadMessage {
                message_id,
                content,
                sender_number,
                sender_name,
                timestamp,
            },
            from_agent,
        }
    }
}
