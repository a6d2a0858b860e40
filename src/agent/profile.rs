//! Agent personality and background, rendered into the generator's system prompt.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A block of background knowledge. Higher `priority` sections are listed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationSection {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: u8,
}

/// Who the agent is and how it talks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub name: String,
    pub company_name: String,
    pub purpose: Vec<String>,
    pub language: String,
    pub dialect: String,
    pub tone: Vec<String>,
    pub base_information: Vec<InformationSection>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "Assistant".into(),
            company_name: "A1Base".into(),
            purpose: vec![
                "Help people get everyday tasks done over chat".into(),
                "Draft and send emails on the user's behalf when asked".into(),
            ],
            language: "English".into(),
            dialect: "American".into(),
            tone: vec![
                "Friendly and approachable".into(),
                "Clear and concise, written for a phone screen".into(),
                "Patient and supportive when something is unclear".into(),
            ],
            base_information: Vec::new(),
        }
    }
}

impl AgentProfile {
    /// Load a profile from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Use `name` unless the profile file set one.
    pub fn with_default_name(mut self, name: &str) -> Self {
        if self.name == AgentProfile::default().name && !name.is_empty() {
            self.name = name.to_string();
        }
        self
    }

    /// System context for a conversation with `user_name`.
    pub fn system_prompt(&self, user_name: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("<YOUR PROFILE>\n");
        prompt.push_str(&format!("Name: {}\n", self.name));
        if !self.company_name.is_empty() {
            prompt.push_str(&format!("Company: {}\n", self.company_name));
        }
        if !self.purpose.is_empty() {
            prompt.push_str(&format!("Purpose: {}\n", self.purpose.join(" ")));
        }
        prompt.push_str(&format!("Language: {} ({})\n", self.language, self.dialect));
        if !self.tone.is_empty() {
            prompt.push_str(&format!("Tone: {}\n", self.tone.join(" ")));
        }
        prompt.push_str("</YOUR PROFILE>\n");

        let mut sections: Vec<&InformationSection> = self.base_information.iter().collect();
        if !sections.is_empty() {
            sections.sort_by(|a, b| b.priority.cmp(&a.priority));
            prompt.push_str("\n<AGENT BASE INFORMATION>\n");
            for section in sections {
                prompt.push_str(&format!("## {}\n{}\n\n", section.title, section.content.trim()));
            }
            prompt.push_str("</AGENT BASE INFORMATION>\n");
        }

        prompt.push_str(&format!(
            "\nYou are talking with {user_name}. Address them by name where it feels natural.\n"
        ));
        prompt
    }
}
