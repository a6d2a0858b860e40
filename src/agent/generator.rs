//! Response and content generation on top of an `LlmProvider`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::agent::profile::AgentProfile;
use crate::agent::prompts::{self, is_agent};
use crate::error::{LlmError, WorkflowError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::pipeline::types::{EmailDraft, ThreadMessage};

/// Reply used when the window has no human sender to address.
pub const NO_SENDER_REPLY: &str = "Hey there!";

/// Messages fed to email drafting.
const EMAIL_CONTEXT_MESSAGES: usize = 3;

const REPLY_TEMPERATURE: f32 = 0.7;
const REPLY_MAX_TOKENS: u32 = 1024;
const EMAIL_TEMPERATURE: f32 = 0.3;
const EMAIL_MAX_TOKENS: u32 = 1500;

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("valid email regex")
});

static SUBJECT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SUBJECT:\s*(.*)").expect("valid subject regex"));

static BODY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)BODY:\s*(.*)").expect("valid body regex"));

/// Whether `candidate` is exactly one email address.
pub fn is_email_address(candidate: &str) -> bool {
    EMAIL_ADDRESS
        .find(candidate)
        .is_some_and(|m| m.start() == 0 && m.end() == candidate.len())
}

/// The last email address mentioned in the given messages.
pub fn last_email_address(messages: &[ThreadMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find_map(|m| EMAIL_ADDRESS.find_iter(&m.content).last())
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailReply {
    #[serde(default)]
    recipient_email: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    email_content: String,
}

#[derive(Debug, Deserialize)]
struct WrappedMessage {
    message: String,
}

pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
    profile: AgentProfile,
    agent_number: Option<String>,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, profile: AgentProfile, agent_number: Option<String>) -> Self {
        Self {
            llm,
            profile,
            agent_number,
        }
    }

    fn conversation(&self, window: &[ThreadMessage]) -> Vec<ChatMessage> {
        prompts::conversation(window, self.agent_number.as_deref())
    }

    /// Display name of the most recent non-agent sender.
    fn latest_user_name<'a>(&self, window: &'a [ThreadMessage]) -> Option<&'a str> {
        window
            .iter()
            .rev()
            .find(|m| !is_agent(&m.sender_number, self.agent_number.as_deref()))
            .map(|m| m.sender_name.as_str())
            .filter(|name| !name.trim().is_empty())
    }

    /// Generate a reply to the window, optionally steered by `instruction`.
    pub async fn generate_reply(
        &self,
        window: &[ThreadMessage],
        instruction: Option<&str>,
    ) -> Result<String, LlmError> {
        let Some(user_name) = self.latest_user_name(window) else {
            return Ok(NO_SENDER_REPLY.to_string());
        };
        self.complete_reply(user_name, instruction, self.conversation(window))
            .await
    }

    /// Self-introduction for identity requests.
    pub async fn generate_introduction(&self, window: &[ThreadMessage]) -> Result<String, LlmError> {
        self.generate_reply(window, Some(prompts::INTRODUCTION)).await
    }

    /// Ask the user to approve sending `draft`.
    pub async fn generate_confirmation(
        &self,
        window: &[ThreadMessage],
        draft: &EmailDraft,
    ) -> Result<String, LlmError> {
        let recipient = draft.recipient.as_deref().unwrap_or("the recipient");
        let Some(user_name) = self.latest_user_name(window) else {
            return Ok(format!(
                "Shall I send the email \"{}\" to {recipient}? Reply yes or no.",
                draft.subject
            ));
        };

        let mut conversation = self.conversation(window);
        conversation.push(ChatMessage::user(format!(
            "Task: send an email to {recipient} with the subject \"{}\".\n\n{}",
            draft.subject, draft.body
        )));
        self.complete_reply(user_name, Some(prompts::TASK_CONFIRMATION), conversation)
            .await
    }

    async fn complete_reply(
        &self,
        user_name: &str,
        instruction: Option<&str>,
        conversation: Vec<ChatMessage>,
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatMessage::system(self.profile.system_prompt(user_name))];
        if let Some(instruction) = instruction {
            messages.push(ChatMessage::user(instruction));
        }
        messages.extend(conversation);

        let request = CompletionRequest::new(messages)
            .with_temperature(REPLY_TEMPERATURE)
            .with_max_tokens(REPLY_MAX_TOKENS);
        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Reply generated"
        );

        let text = unwrap_message(&response.content);
        if text.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty reply".into(),
            });
        }
        Ok(text)
    }

    /// Draft an email from the last few messages.
    ///
    /// The recipient is taken from the model's answer when it is a valid
    /// address, otherwise from the last address mentioned in the messages.
    pub async fn generate_email(&self, window: &[ThreadMessage]) -> Result<EmailDraft, WorkflowError> {
        let start = window.len().saturating_sub(EMAIL_CONTEXT_MESSAGES);
        let recent = &window[start..];

        let mut messages = vec![ChatMessage::system(prompts::EMAIL_GENERATION)];
        messages.extend(self.conversation(recent));
        let request = CompletionRequest::new(messages)
            .with_temperature(EMAIL_TEMPERATURE)
            .with_max_tokens(EMAIL_MAX_TOKENS);
        let response = self.llm.complete(request).await?;

        let draft = parse_email_reply(&response.content, recent)?;
        info!(
            has_recipient = draft.recipient.is_some(),
            subject = %draft.subject,
            "Email drafted"
        );
        Ok(draft)
    }
}

/// Return the `message` field of a `{"message": ...}` reply, or the text itself.
fn unwrap_message(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with('{')
        && let Ok(wrapped) = serde_json::from_str::<WrappedMessage>(trimmed)
    {
        return wrapped.message.trim().to_string();
    }
    trimmed.to_string()
}

/// Parse the drafting model's answer: JSON first, then `SUBJECT:` / `BODY:` lines.
fn parse_email_reply(content: &str, recent: &[ThreadMessage]) -> Result<EmailDraft, WorkflowError> {
    if content.trim().is_empty() {
        return Err(WorkflowError::EmptyEmailContent);
    }

    let (generated_recipient, subject, body) =
        match serde_json::from_str::<EmailReply>(&extract_json_object(content)) {
            Ok(reply) => (reply.recipient_email, reply.subject, reply.email_content),
            Err(_) => {
                let subject = SUBJECT_LINE
                    .captures(content)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let body = BODY_BLOCK
                    .captures(content)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| {
                        if subject.is_empty() {
                            content.to_string()
                        } else {
                            String::new()
                        }
                    });
                (String::new(), subject, body)
            }
        };

    let subject = subject.trim();
    let body = body.trim();
    if subject.is_empty() && body.is_empty() {
        return Err(WorkflowError::EmptyEmailContent);
    }

    let generated_recipient = generated_recipient.trim();
    let recipient = if is_email_address(generated_recipient) {
        Some(generated_recipient.to_string())
    } else {
        last_email_address(recent)
    };

    Ok(EmailDraft {
        recipient,
        subject: if subject.is_empty() { "No subject" } else { subject }.to_string(),
        body: if body.is_empty() { "No body content" } else { body }.to_string(),
    })
}
