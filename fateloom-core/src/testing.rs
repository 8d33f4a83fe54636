//! Scriptable providers and a session harness for tests.
//!
//! The scripted providers pop pre-queued responses and fall back to a
//! bland default when the queue runs dry, so tests only script the
//! moments they care about.

use crate::character::Character;
use crate::clock::ManualClock;
use crate::consequence::CandidateEffect;
use crate::danger::LethalityVerdict;
use crate::engine::{ChoiceOutcome, GameEngine, NewSessionConfig, SceneView, SweepSummary};
use crate::error::EngineError;
use crate::provider::{
    ContentGenerator, GeneratorError, MemoryError, MemoryKind, MemoryRecord, MemorySink,
    RiskContext, RiskError, RiskEvaluator, SceneContext,
};
use crate::session::{Session, SessionId};
use crate::story::{GeneratedChoice, GeneratedScene};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// A content generator that pops scripted scenes, with a bland default
/// once the queue is empty.
pub struct ScriptedGenerator {
    scenes: Mutex<VecDeque<GeneratedScene>>,
    calls: AtomicUsize,
    fail: bool,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            scenes: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }
}

impl ScriptedGenerator {
    /// A generator whose every call fails as unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Queue the next scene to return.
    pub fn push_scene(&self, scene: GeneratedScene) {
        self.scenes.lock().unwrap().push_back(scene);
    }

    /// How many times `generate_scene` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fallback() -> GeneratedScene {
        GeneratedScene {
            prose: "The path continues.".to_string(),
            is_ending: false,
            choices: vec![
                GeneratedChoice::plain("Press on"),
                GeneratedChoice::plain("Turn back"),
            ],
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_scene(&self, _ctx: &SceneContext) -> Result<GeneratedScene, GeneratorError> {
        if self.fail {
            return Err(GeneratorError::Unavailable("scripted outage".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .scenes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::fallback))
    }
}

/// A risk evaluator driven by per-method response queues.
///
/// Empty queues mean safety: no consequences, zero death probability,
/// danger level 2.
#[derive(Default)]
pub struct ScriptedEvaluator {
    consequences: Mutex<VecDeque<Result<Vec<CandidateEffect>, RiskError>>>,
    lethality: Mutex<VecDeque<Result<LethalityVerdict, RiskError>>>,
    danger: Mutex<VecDeque<Result<u8, RiskError>>>,
}

impl ScriptedEvaluator {
    pub fn push_consequences(&self, effects: Vec<CandidateEffect>) {
        self.consequences.lock().unwrap().push_back(Ok(effects));
    }

    pub fn push_consequence_failure(&self, error: RiskError) {
        self.consequences.lock().unwrap().push_back(Err(error));
    }

    pub fn push_lethality(&self, verdict: LethalityVerdict) {
        self.lethality.lock().unwrap().push_back(Ok(verdict));
    }

    pub fn push_lethality_failure(&self, error: RiskError) {
        self.lethality.lock().unwrap().push_back(Err(error));
    }

    pub fn push_danger(&self, level: u8) {
        self.danger.lock().unwrap().push_back(Ok(level));
    }

    pub fn push_danger_failure(&self, error: RiskError) {
        self.danger.lock().unwrap().push_back(Err(error));
    }

    fn safe_verdict() -> LethalityVerdict {
        LethalityVerdict {
            death_probability: 0.0,
            reasoning: "nothing here threatens the character".to_string(),
            death_description: String::new(),
            last_words: String::new(),
        }
    }
}

#[async_trait]
impl RiskEvaluator for ScriptedEvaluator {
    async fn evaluate_consequences(
        &self,
        _action: &str,
        _ctx: &RiskContext,
    ) -> Result<Vec<CandidateEffect>, RiskError> {
        self.consequences
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn evaluate_lethality(
        &self,
        _decision: &str,
        _ctx: &RiskContext,
    ) -> Result<LethalityVerdict, RiskError> {
        self.lethality
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::safe_verdict()))
    }

    async fn current_danger(&self, _ctx: &RiskContext) -> Result<u8, RiskError> {
        self.danger.lock().unwrap().pop_front().unwrap_or(Ok(2))
    }
}

/// A memory sink that keeps every record it receives.
#[derive(Default)]
pub struct RecordingMemorySink {
    records: Mutex<Vec<MemoryRecord>>,
    fail: bool,
}

impl RecordingMemorySink {
    /// A sink whose every write fails.
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_of_kind(&self, kind: MemoryKind) -> Vec<MemoryRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MemorySink for RecordingMemorySink {
    async fn record(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        if self.fail {
            return Err(MemoryError("scripted sink failure".to_string()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// A fully wired engine with scripted providers, a manual clock, and one
/// session already open.
pub struct TestHarness {
    pub engine: Arc<GameEngine>,
    pub clock: Arc<ManualClock>,
    pub generator: Arc<ScriptedGenerator>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub memory: Arc<RecordingMemorySink>,
    pub session_id: SessionId,
    pub scene: SceneView,
}

impl TestHarness {
    /// Open a harness around a default character on normal difficulty.
    pub async fn start() -> Self {
        Self::start_with(NewSessionConfig::new(Character::new("Wren"))).await
    }

    /// Open a harness around the given session configuration.
    pub async fn start_with(config: NewSessionConfig) -> Self {
        let clock = Arc::new(ManualClock::from_system());
        let generator = Arc::new(ScriptedGenerator::default());
        let evaluator = Arc::new(ScriptedEvaluator::default());
        let memory = Arc::new(RecordingMemorySink::default());
        let engine = Arc::new(
            GameEngine::new(
                Arc::clone(&generator) as Arc<dyn ContentGenerator>,
                Arc::clone(&evaluator) as Arc<dyn RiskEvaluator>,
                Arc::clone(&memory) as Arc<dyn MemorySink>,
            )
            .with_clock(Arc::clone(&clock) as Arc<dyn crate::clock::Clock>),
        );

        let (session_id, scene) = engine
            .create_session(config)
            .await
            .expect("scripted session creation cannot fail");

        Self {
            engine,
            clock,
            generator,
            evaluator,
            memory,
            session_id,
            scene,
        }
    }

    /// Pick the nth choice of the current scene and keep the new scene.
    pub async fn choose(&mut self, index: usize) -> Result<ChoiceOutcome, EngineError> {
        let choice_id = self.scene.choices[index].id;
        let outcome = self.engine.make_choice(self.session_id, choice_id).await?;
        self.scene = outcome.scene.clone();
        Ok(outcome)
    }

    /// Rewind to an earlier node and keep the refreshed scene.
    pub async fn rewind(&mut self, node_id: crate::story::NodeId) -> Result<(), EngineError> {
        self.scene = self.engine.rewind(self.session_id, node_id).await?;
        Ok(())
    }

    /// Restore an archived branch and keep the refreshed scene.
    pub async fn restore(&mut self, branch_id: crate::path::BranchId) -> Result<(), EngineError> {
        self.scene = self.engine.restore_branch(self.session_id, branch_id).await?;
        Ok(())
    }

    /// Move the manual clock forward and sweep.
    pub async fn advance_and_sweep(&self, by: Duration) -> SweepSummary {
        self.clock.advance(by);
        self.engine.sweep_consequences().await
    }

    /// Lock the harness session for direct inspection.
    pub async fn session(&self) -> OwnedMutexGuard<Session> {
        self.engine
            .session(self.session_id)
            .await
            .expect("harness session exists")
            .lock_owned()
            .await
    }
}

/// Assert that the active path carries exactly these step orders, in
/// order.
#[track_caller]
pub fn assert_active_orders(session: &Session, expected: &[u32]) {
    let actual: Vec<u32> = session
        .ledger
        .active_steps()
        .iter()
        .map(|s| s.step_order)
        .collect();
    assert_eq!(
        actual, expected,
        "active path orders diverge from expectation"
    );
}

/// Assert the structural invariant that active step orders run 0..n
/// with no gaps.
#[track_caller]
pub fn assert_contiguous(session: &Session) {
    assert!(
        session.ledger.active_orders_contiguous(),
        "active path orders must be contiguous from zero"
    );
}
