//! Anthropic-backed implementations of the fateloom provider traits.
//!
//! This crate is the only place that talks to a model or parses model
//! output. `fateloom-core` receives structured payloads; everything
//! string-shaped (markdown fences, loose JSON, out-of-range numbers)
//! is dealt with here.

pub mod client;
pub mod evaluator;
pub mod generator;
pub mod sink;

mod parse;

pub use client::{Anthropic, ClientError};
pub use evaluator::RiskScorer;
pub use generator::SceneGenerator;
pub use sink::JournalSink;
