//! Agent persona and content generation: profile, fixed prompts, and the
//! generator that turns a thread window into replies and email drafts.

pub mod generator;
pub mod profile;
pub mod prompts;

pub use generator::{NO_SENDER_REPLY, ResponseGenerator};
pub use profile::{AgentProfile, InformationSection};
