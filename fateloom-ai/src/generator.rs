//! Scene generation over the Anthropic client.

use crate::client::{Anthropic, ClientError, Request};
use crate::parse::json_payload;
use async_trait::async_trait;
use fateloom_core::provider::{ContentGenerator, GeneratorError, SceneContext};
use fateloom_core::story::GeneratedScene;

/// Maximum tokens for a generated scene.
const SCENE_MAX_TOKENS: usize = 2048;

/// Sampling temperature for prose.
const SCENE_TEMPERATURE: f32 = 0.9;

/// [`ContentGenerator`] backed by the Anthropic Messages API.
pub struct SceneGenerator {
    client: Anthropic,
    model: Option<String>,
}

impl SceneGenerator {
    pub fn new(client: Anthropic) -> Self {
        Self {
            client,
            model: None,
        }
    }

    /// Create from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self::new(Anthropic::from_env()?))
    }

    /// Override the client's default model for scene generation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn build_prompt(ctx: &SceneContext) -> String {
        let recent = if ctx.recent_path.is_empty() {
            "(the story is just beginning)".to_string()
        } else {
            ctx.recent_path
                .iter()
                .map(|choice| format!("- {choice}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "## Scene Seed\n{}\n\n## Character\n{}\n\n## Location\n{}\n\n\
             ## Danger Level\n{} of 10\n\n## Recent Choices\n{}",
            ctx.prompt, ctx.character_summary, ctx.location, ctx.danger_level, recent
        )
    }

    fn parse_scene(text: &str) -> Result<GeneratedScene, GeneratorError> {
        let json = json_payload(text)
            .ok_or_else(|| GeneratorError::Malformed("response contains no JSON".to_string()))?;
        let scene: GeneratedScene = serde_json::from_str(json)
            .map_err(|e| GeneratorError::Malformed(format!("{e}: {json}")))?;

        if scene.prose.trim().is_empty() {
            return Err(GeneratorError::Malformed("scene has no prose".to_string()));
        }
        if !scene.is_ending && scene.choices.is_empty() {
            return Err(GeneratorError::Malformed(
                "non-ending scene has no choices".to_string(),
            ));
        }
        Ok(scene)
    }
}

#[async_trait]
impl ContentGenerator for SceneGenerator {
    async fn generate_scene(&self, ctx: &SceneContext) -> Result<GeneratedScene, GeneratorError> {
        let mut request = Request::new(Self::build_prompt(ctx))
            .with_system(include_str!("prompts/scene.txt"))
            .with_max_tokens(SCENE_MAX_TOKENS)
            .with_temperature(SCENE_TEMPERATURE);
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }

        let text = self
            .client
            .complete(request)
            .await
            .map_err(map_client_error)?;
        Self::parse_scene(&text)
    }
}

fn map_client_error(error: ClientError) -> GeneratorError {
    match error {
        ClientError::Parse(message) => GeneratorError::Malformed(message),
        other => GeneratorError::Unavailable(other.to_string()),
    }
}
