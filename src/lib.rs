//! Outreach Engine: reply automation for creator negotiations over email.

pub mod api;
pub mod automation;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod transport;
