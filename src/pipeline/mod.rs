//! Reply automation pipeline.
//!
//! Threads discovered by label flow through:
//! 1. `decision::decide()`: paused, self-authored and delay checks (no LLM)
//! 2. `transcript::build_transcript()`: bounded, cleaned history
//! 3. `extractor::DealExtractor`: best-effort phone/rate extraction
//! 4. `generator::ReplyGenerator`: reply draft or terminate
//! 5. send into the thread, then clear the unread flag
//!
//! `outreach::ColdOutreachSender` starts the threads the engine later picks up.

pub mod address;
pub mod decision;
pub mod delay;
pub mod engine;
pub mod extractor;
pub mod generator;
pub mod outreach;
pub mod prompts;
pub mod transcript;

pub use address::{OwnedAddresses, parse_address};
pub use decision::{DecisionReason, ReplyDecision, decide};
pub use delay::compute_delay_minutes;
pub use engine::{BatchResult, ReplyEngine, ReplySettings};
pub use extractor::DealExtractor;
pub use generator::{ReplyGenerator, ReplyOutcome};
pub use outreach::{ColdOutreachSender, LabelReset};
pub use prompts::{IGNORE_SENTINEL, NegotiationPolicy};
