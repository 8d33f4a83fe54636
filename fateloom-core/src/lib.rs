//! Branching interactive-fiction engine with permadeath.
//!
//! This crate provides:
//! - A memoized story graph of AI-generated narrative nodes
//! - An append-only path ledger supporting rewind and branch restore
//! - A delayed-consequence scheduler with a periodic sweep
//! - A probabilistic permadeath evaluator
//! - The session aggregate and engine facade binding them together
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fateloom_core::{Character, DifficultyLevel, GameEngine, NewSessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(GameEngine::new(generator, evaluator, memory));
//!
//!     let config = NewSessionConfig::new(Character::new("Wren"))
//!         .with_difficulty(DifficultyLevel::Hard)
//!         .with_permadeath(true);
//!
//!     let (session_id, opening) = engine.create_session(config).await?;
//!     let choice = opening.choices[0].id;
//!
//!     let outcome = engine.make_choice(session_id, choice).await?;
//!     println!("{}", outcome.scene.prose);
//!     Ok(())
//! }
//! ```

pub mod attributes;
pub mod character;
pub mod clock;
pub mod consequence;
pub mod danger;
pub mod engine;
pub mod error;
pub mod path;
pub mod provider;
pub mod session;
pub mod story;
pub mod sweeper;
pub mod testing;

// Primary public API
pub use character::{Character, DeathRecord, Item, SurvivalStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consequence::{Consequence, ConsequenceId, Severity, TimeBucket};
pub use danger::{death_threshold, DecisionFate, DifficultyLevel, LethalityOutcome};
pub use engine::{ChoiceOutcome, GameEngine, NewSessionConfig, SceneView, SweepSummary};
pub use error::EngineError;
pub use path::{BranchId, BranchOverview, PathLedger, PathStep, StepId};
pub use provider::{ContentGenerator, MemorySink, RiskEvaluator};
pub use session::{Session, SessionId};
pub use story::{Choice, ChoiceId, NodeId, StoryGraph, StoryNode};
pub use sweeper::Sweeper;
pub use testing::{RecordingMemorySink, ScriptedEvaluator, ScriptedGenerator, TestHarness};
