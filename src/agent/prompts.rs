//! Fixed instructions sent to the model, and the window-to-chat conversion.

use crate::llm::ChatMessage;
use crate::pipeline::normalize::same_number;
use crate::pipeline::types::ThreadMessage;

/// Decision prompt for intent classification.
pub const TRIAGE_PROMPT: &str = r#"Based on the conversation, analyze the user's intent and respond with exactly one of these JSON responses:
{"responseType":"sendIdentityCard"}
{"responseType":"simpleResponse"}
{"responseType":"handleEmailAction"}
{"responseType":"taskActionConfirmation"}

Rules:
- If the user specifically requests an email to be written or sent, or includes an email address, select "handleEmailAction"
- If the user is providing a response to a previous message in the thread, select "taskActionConfirmation"
- If the user is requesting some sort of identification i.e. 'who are you', select "sendIdentityCard"
- Otherwise, select "simpleResponse"

Return valid JSON with only the single key "responseType" and one of the allowed values."#;

/// Style instruction for ordinary replies.
pub const SIMPLE_RESPONSE: &str = "You are a chat assistant responding via messaging platforms like WhatsApp, SMS, or iMessage. \
Your communication style should be:
- Warm and empathetic while remaining professional
- Clear and concise since users are on mobile devices
- Proactive in addressing needs
- Solution-oriented and helpful
- Natural and conversational

Make sure to:
- Introduce yourself if starting a conversation
- Acknowledge the user's message or concern
- Provide actionable information
- End with clear next steps
- Ask for more details if needed

Format for WhatsApp: use lists, bold text and new lines where they help, \
structure paragraphs knowing they may arrive as separate messages, and keep mobile readability in mind.";

/// Instruction for asking the user to approve a pending task.
pub const TASK_CONFIRMATION: &str = "As a chat assistant on messaging platforms (WhatsApp, SMS, iMessage), generate a brief message confirming \
if the user wants to proceed with the given task. Summarize the key details and ask for approval in a clear, \
concise way. Be specific but brief about the intended action and outcome.";

/// Instruction for drafting an email from recent messages.
pub const EMAIL_GENERATION: &str = r#"You have been tasked to write an email, given the context of the provided messages.
Your task is to:
1) Determine if the messages specify a recipient for the email
2) Extract the recipient email address, if one is provided
3) Write the email as requested, using the context provided

Write the email in a terse, professional style: sharp and direct with no fluff, while keeping a kind tone. Always include a subject line.

Respond with a single JSON object:
{
    "hasRecipient": true or false,
    "recipientEmail": "the recipient email address, or an empty string",
    "subject": "the subject line for the email",
    "emailContent": "the body of the email",
    "reasoning": "one sentence on how you wrote it"
}"#;

/// Instruction for the introduction sent on an identity request.
pub const INTRODUCTION: &str = "Introduce yourself briefly: who you are, who you work for and what you can help with. \
Keep it to a few friendly sentences suitable for a chat message.";

/// Convert a thread window to chat messages: the agent's lines become
/// `assistant`, everyone else's `user`.
pub fn conversation(window: &[ThreadMessage], agent_number: Option<&str>) -> Vec<ChatMessage> {
    window
        .iter()
        .map(|m| {
            if is_agent(&m.sender_number, agent_number) {
                ChatMessage::assistant(m.content.clone())
            } else {
                ChatMessage::user(m.content.clone())
            }
        })
        .collect()
}

pub(crate) fn is_agent(sender: &str, agent_number: Option<&str>) -> bool {
    agent_number.is_some_and(|agent| !sender.is_empty() && same_number(sender, agent))
}
