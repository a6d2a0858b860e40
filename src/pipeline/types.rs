//! Shared types for the ingestion and triage pipeline.

use serde::{Deserialize, Serialize};

use crate::pipeline::normalize::strip_plus;

// ── Inbound payload ─────────────────────────────────────────────────

/// Kind of conversation a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    Individual,
    Group,
    Broadcast,
}

impl ThreadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
        }
    }
}

/// Raw webhook body posted by the messaging channel.
///
/// Required fields are validated by serde at the boundary; optional ones
/// are passed through as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub thread_id: String,
    pub message_id: String,
    pub thread_type: ThreadType,
    pub content: String,
    pub sender_number: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub a1_account_number: Option<String>,
    #[serde(default)]
    pub a1_account_id: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

// ── Stored records ──────────────────────────────────────────────────

/// A message in a thread window. Immutable once stored; identity is `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub message_id: String,
    pub content: String,
    pub sender_number: String,
    pub sender_name: String,
    pub timestamp: String,
}

/// A conversation thread: bounded message window plus participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    /// Oldest first.
    pub messages: Vec<ThreadMessage>,
    /// Normalized (no leading `+`) phone numbers, no duplicates.
    pub participants: Vec<String>,
}

impl Thread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Whether a message with this id is already in the window.
    pub fn contains_message(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.message_id == message_id)
    }

    /// Append a message and keep only the most recent `window` entries.
    ///
    /// Returns `false` (and leaves the window untouched) if the message id
    /// is already present.
    pub fn append(&mut self, message: ThreadMessage, window: usize) -> bool {
        if self.contains_message(&message.message_id) {
            return false;
        }
        self.messages.push(message);
        truncate_window(&mut self.messages, window);
        true
    }

    pub fn has_participant(&self, number: &str) -> bool {
        let normalized = strip_plus(number.trim());
        self.participants.iter().any(|p| strip_plus(p) == normalized)
    }

    /// Re-normalize participants in place and drop duplicates, keeping first-seen order.
    pub fn normalize_participants(&mut self) {
        let mut seen: Vec<String> = Vec::with_capacity(self.participants.len());
        for p in self.participants.drain(..) {
            let normalized = strip_plus(&p).to_string();
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        self.participants = seen;
    }

    /// Add a participant by normalized number. Returns `true` if it was new.
    /// Blank numbers are never recorded.
    pub fn add_participant(&mut self, number: &str) -> bool {
        let normalized = strip_plus(number.trim());
        if normalized.is_empty() || self.has_participant(normalized) {
            return false;
        }
        self.participants.push(normalized.to_string());
        true
    }
}

/// Drop the oldest entries so at most `window` remain.
pub fn truncate_window<T>(messages: &mut Vec<T>, window: usize) {
    if messages.len() > window {
        let excess = messages.len() - window;
        messages.drain(..excess);
    }
}

/// A registered user, keyed by numeric phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone_number: i64,
}

// ── Intent ──────────────────────────────────────────────────────────

/// Closed classification of the latest conversation turn.
///
/// Serialized with the wire names the classifier is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "sendIdentityCard")]
    IdentityRequest,
    #[serde(rename = "handleEmailAction")]
    EmailAction,
    #[serde(rename = "taskActionConfirmation")]
    TaskConfirmation,
    #[serde(rename = "simpleResponse")]
    SimpleResponse,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::IdentityRequest,
        Intent::EmailAction,
        Intent::TaskConfirmation,
        Intent::SimpleResponse,
    ];

    /// Wire name used in `{"responseType": ...}`.
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::IdentityRequest => "sendIdentityCard",
            Self::EmailAction => "handleEmailAction",
            Self::TaskConfirmation => "taskActionConfirmation",
            Self::SimpleResponse => "simpleResponse",
        }
    }

    pub fn from_response_type(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.response_type() == value)
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::SimpleResponse
    }
}

// ── Email ───────────────────────────────────────────────────────────

/// Structured email produced by the content generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
}
