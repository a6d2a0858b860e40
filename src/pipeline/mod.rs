//! Inbound message pipeline.
//!
//! Every webhook message flows through:
//! 1. `Normalizer::normalize()`: canonical message plus agent patches
//! 2. `ThreadStore::append_message()`: bounded window, durable first
//! 3. `IntentTriage::classify()`: closed intent, never fails
//! 4. `WorkflowDispatcher::dispatch()`: one executor, then outbound sends

pub mod normalize;
pub mod processor;
pub mod triage;
pub mod types;

pub use normalize::{NormalizedMessage, Normalizer};
pub use processor::{IncomingOutcome, Pipeline};
pub use triage::IntentTriage;
pub use types::{Intent, Thread, ThreadMessage, ThreadType, WebhookPayload};
