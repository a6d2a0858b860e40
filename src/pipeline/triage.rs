//! Intent triage: classify the latest conversation window.
//!
//! Never fails. Transport errors, malformed JSON and unknown values all
//! collapse to [`Intent::SimpleResponse`].

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::prompts::{self, TRIAGE_PROMPT};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::pipeline::types::{Intent, ThreadMessage};

/// Kept tight; runs on every inbound message.
const TRIAGE_MAX_TOKENS: u32 = 64;

const TRIAGE_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriageReply {
    response_type: String,
}

pub struct IntentTriage {
    llm: Arc<dyn LlmProvider>,
    agent_number: Option<String>,
}

impl IntentTriage {
    pub fn new(llm: Arc<dyn LlmProvider>, agent_number: Option<String>) -> Self {
        Self { llm, agent_number }
    }

    pub async fn classify(&self, window: &[ThreadMessage]) -> Intent {
        if window.is_empty() {
            return Intent::SimpleResponse;
        }

        let mut messages = vec![ChatMessage::system(TRIAGE_PROMPT)];
        messages.extend(prompts::conversation(window, self.agent_number.as_deref()));
        let request = CompletionRequest::new(messages)
            .with_temperature(TRIAGE_TEMPERATURE)
            .with_max_tokens(TRIAGE_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => parse_intent(&response.content),
            Err(e) => {
                warn!(error = %e, "Triage call failed, defaulting to simple response");
                Intent::SimpleResponse
            }
        }
    }
}

/// Parse a `{"responseType": ...}` reply. Anything unrecognized is `SimpleResponse`.
pub fn parse_intent(raw: &str) -> Intent {
    let json = extract_json_object(raw);
    match serde_json::from_str::<TriageReply>(&json) {
        Ok(reply) => match Intent::from_response_type(reply.response_type.trim()) {
            Some(intent) => intent,
            None => {
                debug!(response_type = %reply.response_type, "Unknown response type");
                Intent::SimpleResponse
            }
        },
        Err(e) => {
            debug!(error = %e, raw = %raw, "Unparseable triage reply");
            Intent::SimpleResponse
        }
    }
}
