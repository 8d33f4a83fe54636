//! The engine facade: session registry, operations, and the sweep.
//!
//! One engine serves many independent sessions. Each session sits behind
//! its own `tokio::Mutex`, giving the required one-exclusive-writer
//! discipline: a player action and the hourly sweep can never interleave
//! on the same session, while unrelated sessions proceed in parallel.
//!
//! Provider calls are the only operations that block for meaningful
//! wall-clock time. A generation failure aborts the in-flight mutation
//! before any state has changed; evaluator parse failures degrade to
//! empty results instead of surfacing.

use crate::character::{Character, DeathRecord};
use crate::clock::{Clock, SystemClock};
use crate::consequence::{Consequence, TimeBucket};
use crate::danger::{death_threshold, resolve_fate, DecisionFate, DifficultyLevel, LethalityOutcome};
use crate::error::EngineError;
use crate::path::{BranchId, BranchOverview};
use crate::provider::{
    ContentGenerator, MemoryKind, MemoryRecord, MemorySink, RiskContext, RiskEvaluator,
    SceneContext,
};
use crate::session::{PathEntry, Session, SessionId};
use crate::story::{ChoiceGate, ChoiceId, GateRequirement, GraphError, NodeId, StoryNode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// How many recent choices to hand the generator for continuity.
const RECENT_PATH_LEN: usize = 5;

/// At most this many candidate effects are accepted per evaluation.
const MAX_CANDIDATES: usize = 3;

/// Configuration for creating a new session.
#[derive(Debug, Clone)]
pub struct NewSessionConfig {
    pub character: Character,
    pub difficulty: DifficultyLevel,
    pub permadeath_enabled: bool,
    /// Prompt for the opening scene.
    pub opening_prompt: String,
}

impl NewSessionConfig {
    pub fn new(character: Character) -> Self {
        Self {
            character,
            difficulty: DifficultyLevel::default(),
            permadeath_enabled: true,
            opening_prompt: "Open the story at a moment of quiet tension.".to_string(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: DifficultyLevel) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_permadeath(mut self, enabled: bool) -> Self {
        self.permadeath_enabled = enabled;
        self
    }

    pub fn with_opening_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.opening_prompt = prompt.into();
        self
    }
}

/// A choice as shown to the caller.
#[derive(Debug, Clone)]
pub struct ChoiceView {
    pub id: ChoiceId,
    pub text: String,
    /// Whether the character currently meets the choice's gate.
    pub available: bool,
}

/// A scene as shown to the caller.
#[derive(Debug, Clone)]
pub struct SceneView {
    pub node_id: NodeId,
    pub prose: String,
    pub is_ending: bool,
    pub choices: Vec<ChoiceView>,
}

impl SceneView {
    fn of(node: &StoryNode, session: &Session) -> Self {
        Self {
            node_id: node.id,
            prose: node.content.clone(),
            is_ending: node.is_ending,
            choices: node
                .choices
                .iter()
                .map(|choice| ChoiceView {
                    id: choice.id,
                    text: choice.text.clone(),
                    available: choice
                        .gate
                        .as_ref()
                        .map(|gate| gate_satisfied(session, gate))
                        .unwrap_or(true),
                })
                .collect(),
        }
    }
}

/// The result of a decision.
#[derive(Debug, Clone)]
pub struct ChoiceOutcome {
    pub step_order: u32,
    pub branch_id: BranchId,
    pub scene: SceneView,
}

/// Totals from one sweep pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSummary {
    pub sessions_swept: usize,
    pub triggered: usize,
    pub failures: usize,
}

/// The engine: registry of sessions plus injected providers.
pub struct GameEngine {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    generator: Arc<dyn ContentGenerator>,
    evaluator: Arc<dyn RiskEvaluator>,
    memory: Arc<dyn MemorySink>,
    clock: Arc<dyn Clock>,
}

impl GameEngine {
    /// Create an engine over the given providers, on the system clock.
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        evaluator: Arc<dyn RiskEvaluator>,
        memory: Arc<dyn MemorySink>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            generator,
            evaluator,
            memory,
            clock: Arc::new(SystemClock),
        }
    }

    /// Swap the time source. Tests inject a manual clock here.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a new session, generating its opening scene.
    pub async fn create_session(
        &self,
        config: NewSessionConfig,
    ) -> Result<(SessionId, SceneView), EngineError> {
        let ctx = SceneContext {
            prompt: config.opening_prompt.clone(),
            character_summary: config.character.summary(),
            location: config.character.location.clone(),
            danger_level: 0,
            recent_path: Vec::new(),
        };
        let opening = self.generator.generate_scene(&ctx).await?;

        let session = Session::new(
            config.character,
            opening,
            config.difficulty,
            config.permadeath_enabled,
            self.clock.now(),
        );
        let id = session.id;
        let view = session
            .current_node()
            .map(|node| SceneView::of(node, &session))
            .ok_or_else(|| EngineError::NotFound("opening node".to_string()))?;

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        info!(session = %id, "session created");
        Ok((id, view))
    }

    /// Fetch the handle for a session.
    async fn handle(&self, id: SessionId) -> Result<Arc<Mutex<Session>>, EngineError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("session {id}")))
    }

    /// Make a decision: resolve (or memo-reuse) the next node, append
    /// the path step, and apply the choice's payload.
    pub async fn make_choice(
        &self,
        session_id: SessionId,
        choice_id: ChoiceId,
    ) -> Result<ChoiceOutcome, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        let origin = session.current_node_id;
        let current = session
            .current_node()
            .ok_or_else(|| EngineError::NotFound(format!("node {origin}")))?;
        let choice = current
            .choice(choice_id)
            .ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "choice {choice_id} does not belong to the current node"
                ))
            })?
            .clone();

        if let Some(gate) = &choice.gate {
            if !gate_satisfied(&session, gate) {
                return Err(EngineError::InvalidState(format!(
                    "requirement not met for choice \"{}\"",
                    choice.text
                )));
            }
        }

        // Generate (or memo-reuse) the destination first: a generation
        // failure must abort before the ledger or character change.
        let ctx = SceneContext {
            prompt: choice
                .followup_prompt
                .clone()
                .unwrap_or_else(|| format!("The player chose: {}", choice.text)),
            character_summary: session.character.summary(),
            location: session.character.location.clone(),
            danger_level: session.danger_level,
            recent_path: recent_choices(&session),
        };
        let generator = Arc::clone(&self.generator);
        let node_id = session
            .graph
            .resolve_or_create(origin, choice_id, generator.as_ref(), &ctx)
            .await
            .map_err(map_graph_error)?;

        // Re-deciding at a node we already decided from (the post-rewind
        // case) diverges: the old continuation is archived as a branch
        // and the new step takes over its order.
        if let Some(existing) = session.ledger.active_step_from(origin) {
            let existing_order = existing.step_order;
            session.ledger.archive_tail(existing_order);
        }

        session.ledger.append(origin, choice_id, choice.text.clone());
        session.graph.record_selection(origin, choice.text.clone());
        session.graph.mark_visited(node_id);
        session.apply_choice_payload(&choice.payload);
        session.character.survival.major_decisions_made += 1;
        session.current_node_id = node_id;

        let step = session
            .ledger
            .active_steps()
            .into_iter()
            .last()
            .map(|s| (s.step_order, s.branch_id))
            .ok_or_else(|| EngineError::InvalidState("appended step missing".to_string()))?;
        let node = session
            .graph
            .node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {node_id}")))?;
        let scene = SceneView::of(node, &session);

        self.spawn_memory(MemoryRecord {
            title: format!("Decision at depth {}", step.0),
            content: choice.text.clone(),
            kind: MemoryKind::Decision,
            importance: 0.4,
            character_id: session.character.id,
            session_id,
        });

        Ok(ChoiceOutcome {
            step_order: step.0,
            branch_id: step.1,
            scene,
        })
    }

    /// Return to an earlier node on the active path without discarding
    /// the steps taken since then.
    pub async fn rewind(
        &self,
        session_id: SessionId,
        node_id: NodeId,
    ) -> Result<SceneView, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        session
            .ledger
            .rewind_to(node_id)
            .map_err(|e| EngineError::InvalidState(e.to_string()))?;
        session.current_node_id = node_id;

        let node = session
            .graph
            .node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {node_id}")))?;
        info!(session = %session_id, node = %node_id, "rewound");
        Ok(SceneView::of(node, &session))
    }

    /// The branch picture for a session. A pure read.
    pub async fn list_branches(&self, session_id: SessionId) -> Result<BranchOverview, EngineError> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.ledger.overview())
    }

    /// Reactivate a previously archived branch.
    pub async fn restore_branch(
        &self,
        session_id: SessionId,
        branch_id: BranchId,
    ) -> Result<SceneView, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        let (origin, choice) = {
            let deepest = session
                .ledger
                .restore(branch_id)
                .map_err(|e| EngineError::NotFound(e.to_string()))?;
            (deepest.origin_node_id, deepest.choice_id)
        };

        let node_id = session.graph.child_of(origin, choice).ok_or_else(|| {
            EngineError::InvalidState("restored step leads to an unresolved node".to_string())
        })?;
        session.current_node_id = node_id;

        let node = session
            .graph
            .node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {node_id}")))?;
        info!(session = %session_id, branch = %branch_id, "branch restored");
        Ok(SceneView::of(node, &session))
    }

    /// The active path joined with node content. A pure read.
    pub async fn path_history(&self, session_id: SessionId) -> Result<Vec<PathEntry>, EngineError> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.path_history())
    }

    /// Evaluate an action for delayed effects and record them.
    ///
    /// Immediate effects apply synchronously; the rest become pending
    /// consequences for the sweep. An evaluator failure degrades to an
    /// empty result -- the story keeps flowing.
    pub async fn evaluate_consequences(
        &self,
        session_id: SessionId,
        action: &str,
    ) -> Result<Vec<Consequence>, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        let ctx = risk_context(&session);
        let candidates = match self.evaluator.evaluate_consequences(action, &ctx).await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(session = %session_id, %error, "consequence evaluation dropped");
                return Ok(Vec::new());
            }
        };

        let now = self.clock.now();
        let mut rng = rand::thread_rng();
        let mut recorded = Vec::new();
        for candidate in candidates.into_iter().take(MAX_CANDIDATES) {
            let immediate = candidate.time_bucket == TimeBucket::Immediate;
            let mut consequence =
                Consequence::from_candidate(candidate, session.character.id, now, &mut rng);
            if immediate {
                consequence.is_triggered = true;
                consequence.apply_permanent_effect(&mut session.character);
            }

            self.spawn_memory(MemoryRecord {
                title: format!("{} consequence", consequence.severity.name()),
                content: consequence.description.clone(),
                kind: MemoryKind::Consequence,
                importance: consequence.severity.importance(),
                character_id: session.character.id,
                session_id,
            });

            session.record_consequence(consequence.clone());
            recorded.push(consequence);
        }
        Ok(recorded)
    }

    /// Realize every due consequence across all active sessions.
    ///
    /// Driven by the sweeper timer, never by player requests. Each
    /// session is locked for its own sweep; failures are isolated per
    /// consequence and per session.
    pub async fn sweep_consequences(&self) -> SweepSummary {
        let handles: Vec<(SessionId, Arc<Mutex<Session>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let now = self.clock.now();
        let mut summary = SweepSummary::default();
        for (_, handle) in handles {
            let mut session = handle.lock().await;
            if !session.is_active {
                continue;
            }
            let report = session.sweep_due(now);
            summary.sessions_swept += 1;
            summary.triggered += report.triggered;
            summary.failures += report.failures;
        }

        if summary.triggered > 0 || summary.failures > 0 {
            info!(
                sessions = summary.sessions_swept,
                triggered = summary.triggered,
                failures = summary.failures,
                "consequence sweep finished"
            );
        }
        summary
    }

    /// Refresh and cache the situational danger level.
    pub async fn current_danger_level(&self, session_id: SessionId) -> Result<u8, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        let ctx = risk_context(&session);
        match self.evaluator.current_danger(&ctx).await {
            Ok(level) => session.danger_level = level.min(10),
            Err(error) => {
                // Keep the cached value rather than interrupt play.
                warn!(session = %session_id, %error, "danger refresh dropped");
            }
        }
        Ok(session.danger_level)
    }

    /// Resolve a single decision against the permadeath threshold.
    pub async fn evaluate_lethality(
        &self,
        session_id: SessionId,
        decision_text: &str,
    ) -> Result<LethalityOutcome, EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;

        if !session.permadeath_enabled {
            return Ok(LethalityOutcome::unharmed());
        }

        let ctx = risk_context(&session);
        let verdict = match self.evaluator.evaluate_lethality(decision_text, &ctx).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(session = %session_id, %error, "lethality evaluation dropped");
                return Ok(LethalityOutcome::unharmed());
            }
        };

        let threshold = death_threshold(session.difficulty, session.character.level);
        let protected = session.character.has_protective_safeguard();
        let fate = resolve_fate(verdict.death_probability, threshold, protected);

        match fate {
            DecisionFate::Death => {
                let now = self.clock.now();
                session.character.survival.days_survived =
                    (now - session.created_at).num_days().max(0) as u32;
                let record = DeathRecord {
                    cause: verdict.death_description.clone(),
                    final_node: session.current_node_id,
                    final_decision: decision_text.to_string(),
                    survival: session.character.survival,
                    died_at: now,
                };
                let epitaph = compose_epitaph(&session.character.name, &verdict);
                session.mark_death(record, epitaph.clone());

                self.spawn_memory(MemoryRecord {
                    title: format!("The death of {}", session.character.name),
                    content: verdict.death_description.clone(),
                    kind: MemoryKind::Death,
                    importance: 1.0,
                    character_id: session.character.id,
                    session_id,
                });
                info!(session = %session_id, "character died; session closed");

                Ok(LethalityOutcome {
                    died: true,
                    near_death: false,
                    description: Some(verdict.death_description),
                    last_words: Some(verdict.last_words),
                })
            }
            DecisionFate::NearDeath => {
                session.record_near_death();
                session.character.survival.dangerous_situations_overcome += 1;

                self.spawn_memory(MemoryRecord {
                    title: "A brush with death".to_string(),
                    content: verdict.reasoning.clone(),
                    kind: MemoryKind::NearDeath,
                    importance: 0.7,
                    character_id: session.character.id,
                    session_id,
                });

                Ok(LethalityOutcome {
                    died: false,
                    near_death: true,
                    description: None,
                    last_words: None,
                })
            }
            DecisionFate::Survived => {
                session.character.survival.dangerous_situations_overcome += 1;
                Ok(LethalityOutcome::unharmed())
            }
        }
    }

    /// End a session without a death. A session that is already dead or
    /// ended cannot be ended again.
    pub async fn end_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_mutable()?;
        session.end();
        info!(session = %session_id, "session ended");
        Ok(())
    }

    /// Save a session snapshot to disk.
    pub async fn save_session(
        &self,
        session_id: SessionId,
        path: impl AsRef<Path>,
    ) -> Result<(), EngineError> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        session.save(path).await
    }

    /// Load a session snapshot from disk and register it.
    pub async fn load_session(&self, path: impl AsRef<Path>) -> Result<SessionId, EngineError> {
        let session = Session::load(path).await?;
        let id = session.id;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        Ok(id)
    }

    /// Direct access to a session handle, for embedding callers and
    /// tests.
    pub async fn session(&self, session_id: SessionId) -> Result<Arc<Mutex<Session>>, EngineError> {
        self.handle(session_id).await
    }

    /// Push a record to the memory sink without waiting on it. A sink
    /// failure is logged and never rolls back the triggering mutation.
    fn spawn_memory(&self, record: MemoryRecord) {
        let sink = Arc::clone(&self.memory);
        tokio::spawn(async move {
            if let Err(error) = sink.record(record).await {
                warn!(%error, "memory record dropped");
            }
        });
    }
}

/// Whether the character currently satisfies a choice gate.
fn gate_satisfied(session: &Session, gate: &ChoiceGate) -> bool {
    match &gate.requirement {
        GateRequirement::Attribute(attribute) => {
            session.character.attributes.get(*attribute) >= gate.threshold
        }
        GateRequirement::Skill(name) => {
            match session.character.attributes.extra.get(&name.to_lowercase()) {
                Some(crate::attributes::AttributeValue::Number(value)) => *value >= gate.threshold,
                _ => false,
            }
        }
        GateRequirement::Item(name) => {
            f64::from(session.character.item_quantity(name)) >= gate.threshold
        }
    }
}

fn risk_context(session: &Session) -> RiskContext {
    RiskContext {
        situation: session
            .current_node()
            .map(|node| node.content.clone())
            .unwrap_or_default(),
        danger_level: session.danger_level,
        character_summary: session.character.summary(),
    }
}

fn recent_choices(session: &Session) -> Vec<String> {
    let active = session.ledger.active_steps();
    active
        .iter()
        .rev()
        .take(RECENT_PATH_LEN)
        .rev()
        .map(|s| s.choice_text.clone())
        .collect()
}

fn map_graph_error(error: GraphError) -> EngineError {
    match error {
        GraphError::UnknownNode(node) => EngineError::NotFound(format!("node {node}")),
        GraphError::UnknownChoice { node, choice } => EngineError::InvalidState(format!(
            "choice {choice} does not belong to node {node}"
        )),
        GraphError::Generation(inner) => EngineError::Generation(inner),
    }
}

fn compose_epitaph(name: &str, verdict: &crate::danger::LethalityVerdict) -> String {
    if verdict.last_words.is_empty() {
        format!("Here lies {name}.")
    } else {
        format!("Here lies {name}. \"{}\"", verdict.last_words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingMemorySink, ScriptedEvaluator, ScriptedGenerator};

    fn engine() -> GameEngine {
        GameEngine::new(
            Arc::new(ScriptedGenerator::default()),
            Arc::new(ScriptedEvaluator::default()),
            Arc::new(RecordingMemorySink::default()),
        )
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let engine = engine();
        let result = engine.path_history(SessionId::new()).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_session_returns_opening_scene() {
        let engine = engine();
        let (id, opening) = engine
            .create_session(NewSessionConfig::new(Character::new("Wren")))
            .await
            .unwrap();

        assert!(!opening.prose.is_empty());
        assert!(!opening.choices.is_empty());
        assert!(engine.path_history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_choice_rejected() {
        let engine = engine();
        let (id, _) = engine
            .create_session(NewSessionConfig::new(Character::new("Wren")))
            .await
            .unwrap();

        let result = engine.make_choice(id, ChoiceId::new()).await;
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_ending_twice_rejected() {
        let engine = engine();
        let (id, _) = engine
            .create_session(NewSessionConfig::new(Character::new("Wren")))
            .await
            .unwrap();

        engine.end_session(id).await.unwrap();
        let result = engine.end_session(id).await;
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }
}
