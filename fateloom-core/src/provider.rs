//! External provider seams.
//!
//! The engine consumes three services it does not implement: a content
//! generator for prose and choices, a risk evaluator for consequences and
//! lethality, and a write-only memory sink. Each is an injected trait
//! object constructed by the caller; there are no ambient singletons.
//!
//! Everything crossing these seams is already structured. String or
//! regex parsing of model output belongs in adapter crates; a payload the
//! adapter could not parse surfaces here as `GeneratorError::Malformed`
//! or `RiskError::Parse`, never as a panic.

use crate::character::CharacterId;
use crate::consequence::CandidateEffect;
use crate::danger::LethalityVerdict;
use crate::session::SessionId;
use crate::story::GeneratedScene;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the content generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator unreachable: {0}")]
    Unavailable(String),

    #[error("generator returned unparsable content: {0}")]
    Malformed(String),
}

/// Errors from the risk evaluator.
///
/// `Parse` is the soft failure class: callers swallow it and degrade to
/// an empty result rather than interrupting play.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("evaluator unreachable: {0}")]
    Unavailable(String),

    #[error("evaluator payload did not parse: {0}")]
    Parse(String),
}

/// Errors from the memory sink. Never rolls back the triggering mutation.
#[derive(Debug, Error)]
#[error("memory sink error: {0}")]
pub struct MemoryError(pub String);

/// Context handed to the content generator for a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneContext {
    /// The followup prompt attached to the chosen choice, or the opening
    /// prompt for a new session.
    pub prompt: String,
    pub character_summary: String,
    pub location: String,
    pub danger_level: u8,
    /// Recent choice texts, oldest first, for continuity.
    pub recent_path: Vec<String>,
}

/// Context handed to the risk evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContext {
    /// Prose of the current node.
    pub situation: String,
    pub danger_level: u8,
    pub character_summary: String,
}

/// What kind of event a memory record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    Decision,
    Consequence,
    NearDeath,
    Death,
}

/// A record pushed to the memory sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub title: String,
    pub content: String,
    pub kind: MemoryKind,
    /// 0.0 to 1.0, for downstream relevance ranking.
    pub importance: f32,
    pub character_id: CharacterId,
    pub session_id: SessionId,
}

/// Produces structured scenes from prompts.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_scene(&self, ctx: &SceneContext) -> Result<GeneratedScene, GeneratorError>;
}

/// Scores risk: delayed consequences, lethality, and situational danger.
#[async_trait]
pub trait RiskEvaluator: Send + Sync {
    /// 1-3 candidate effects for an action, or an empty list.
    async fn evaluate_consequences(
        &self,
        action: &str,
        ctx: &RiskContext,
    ) -> Result<Vec<CandidateEffect>, RiskError>;

    /// Death probability and dramatization for a decision.
    async fn evaluate_lethality(
        &self,
        decision: &str,
        ctx: &RiskContext,
    ) -> Result<LethalityVerdict, RiskError>;

    /// Situational danger on the 0-10 scale.
    async fn current_danger(&self, ctx: &RiskContext) -> Result<u8, RiskError>;
}

/// Write-only long-term memory. Fire-and-forget from the engine's
/// perspective: a failure here is logged and never rolled back into the
/// mutation that produced the record.
#[async_trait]
pub trait MemorySink: Send + Sync {
    async fn record(&self, record: MemoryRecord) -> Result<(), MemoryError>;
}
