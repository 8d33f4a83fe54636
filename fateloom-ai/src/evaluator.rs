//! Risk scoring over the Anthropic client.
//!
//! Uses a fast, cheap model by default: every player decision may pass
//! through here, and a consequence check should never dominate the
//! latency of a turn.

use crate::client::{Anthropic, ClientError, Request};
use crate::parse::json_payload;
use async_trait::async_trait;
use fateloom_core::consequence::CandidateEffect;
use fateloom_core::danger::LethalityVerdict;
use fateloom_core::provider::{RiskContext, RiskError, RiskEvaluator};
use serde::Deserialize;

/// Default model for risk scoring.
const SCORING_MODEL: &str = "claude-3-5-haiku-20241022";

/// Maximum tokens for a scoring response.
const SCORING_MAX_TOKENS: usize = 800;

/// [`RiskEvaluator`] backed by the Anthropic Messages API.
pub struct RiskScorer {
    client: Anthropic,
    model: String,
}

impl RiskScorer {
    pub fn new(client: Anthropic) -> Self {
        Self {
            client,
            model: SCORING_MODEL.to_string(),
        }
    }

    /// Create from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self::new(Anthropic::from_env()?))
    }

    /// Set a custom model for risk scoring.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn score(&self, system: &str, prompt: String) -> Result<String, RiskError> {
        let request = Request::new(prompt)
            .with_model(&self.model)
            .with_system(system)
            .with_max_tokens(SCORING_MAX_TOKENS)
            .with_temperature(0.0);
        self.client.complete(request).await.map_err(map_client_error)
    }

    fn situation_block(ctx: &RiskContext) -> String {
        format!(
            "## Situation\n{}\n\n## Danger Level\n{} of 10\n\n## Character\n{}",
            ctx.situation, ctx.danger_level, ctx.character_summary
        )
    }

    fn parse_effects(text: &str) -> Result<Vec<CandidateEffect>, RiskError> {
        let json = json_payload(text).ok_or_else(no_json)?;
        let parsed: EffectsResponse =
            serde_json::from_str(json).map_err(|e| RiskError::Parse(format!("{e}: {json}")))?;
        Ok(parsed.effects)
    }

    fn parse_verdict(text: &str) -> Result<LethalityVerdict, RiskError> {
        let json = json_payload(text).ok_or_else(no_json)?;
        let mut verdict: LethalityVerdict =
            serde_json::from_str(json).map_err(|e| RiskError::Parse(format!("{e}: {json}")))?;
        verdict.death_probability = verdict.death_probability.clamp(0.0, 1.0);
        Ok(verdict)
    }

    fn parse_danger(text: &str) -> Result<u8, RiskError> {
        let json = json_payload(text).ok_or_else(no_json)?;
        let parsed: DangerResponse =
            serde_json::from_str(json).map_err(|e| RiskError::Parse(format!("{e}: {json}")))?;
        Ok(parsed.danger_level.min(10) as u8)
    }
}

#[derive(Debug, Deserialize)]
struct EffectsResponse {
    #[serde(default)]
    effects: Vec<CandidateEffect>,
}

#[derive(Debug, Deserialize)]
struct DangerResponse {
    danger_level: u32,
}

#[async_trait]
impl RiskEvaluator for RiskScorer {
    async fn evaluate_consequences(
        &self,
        action: &str,
        ctx: &RiskContext,
    ) -> Result<Vec<CandidateEffect>, RiskError> {
        let prompt = format!(
            "## Player Action\n\"{action}\"\n\n{}",
            Self::situation_block(ctx)
        );
        let text = self
            .score(include_str!("prompts/consequences.txt"), prompt)
            .await?;
        Self::parse_effects(&text)
    }

    async fn evaluate_lethality(
        &self,
        decision: &str,
        ctx: &RiskContext,
    ) -> Result<LethalityVerdict, RiskError> {
        let prompt = format!(
            "## Decision\n\"{decision}\"\n\n{}",
            Self::situation_block(ctx)
        );
        let text = self
            .score(include_str!("prompts/lethality.txt"), prompt)
            .await?;
        Self::parse_verdict(&text)
    }

    async fn current_danger(&self, ctx: &RiskContext) -> Result<u8, RiskError> {
        let text = self
            .score(include_str!("prompts/danger.txt"), Self::situation_block(ctx))
            .await?;
        Self::parse_danger(&text)
    }
}

fn no_json() -> RiskError {
    RiskError::Parse("response contains no JSON".to_string())
}

fn map_client_error(error: ClientError) -> RiskError {
    match error {
        ClientError::Parse(message) => RiskError::Parse(message),
        other => RiskError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fateloom_core::{Severity, TimeBucket};

    #[test]
    fn test_parse_effects() {
        let text = r#"```json
{"effects": [{
    "description": "The watch posts a bounty",
    "time_bucket": "medium",
    "severity": "major",
    "affected_entities": ["City Watch"]
}]}
```"#;
        let effects = RiskScorer::parse_effects(text).unwrap();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].time_bucket, TimeBucket::Medium);
        assert_eq!(effects[0].severity, Severity::Major);
        assert!(!effects[0].is_permanent);
    }

    #[test]
    fn test_parse_effects_empty() {
        let effects = RiskScorer::parse_effects(r#"{"effects": []}"#).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_parse_effects_garbage_is_soft_failure() {
        let result = RiskScorer::parse_effects("I couldn't think of anything.");
        assert!(matches!(result, Err(RiskError::Parse(_))));
    }

    #[test]
    fn test_parse_verdict_clamps_probability() {
        let text = r#"{"death_probability": 1.7, "reasoning": "r",
                       "death_description": "d", "last_words": "w"}"#;
        let verdict = RiskScorer::parse_verdict(text).unwrap();
        assert_eq!(verdict.death_probability, 1.0);
    }

    #[test]
    fn test_parse_danger_clamps_to_scale() {
        assert_eq!(RiskScorer::parse_danger(r#"{"danger_level": 3}"#).unwrap(), 3);
        assert_eq!(
            RiskScorer::parse_danger(r#"{"danger_level": 42}"#).unwrap(),
            10
        );
    }
}
