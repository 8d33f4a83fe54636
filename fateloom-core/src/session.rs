//! The session aggregate: one character's story, path, and pending fate.
//!
//! A session binds the story graph, the path ledger, the recorded
//! consequences, and the character into the single unit that engine
//! operations lock and mutate. A session ends permanently when its
//! character dies or it is explicitly ended; after that every mutating
//! operation is rejected.

use crate::attributes::FlagMap;
use crate::character::{Character, DeathRecord};
use crate::consequence::{Consequence, ConsequenceId};
use crate::danger::DifficultyLevel;
use crate::error::EngineError;
use crate::path::PathLedger;
use crate::story::{ChoicePayload, GeneratedScene, NodeId, StoryGraph, StoryNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// Unique identifier for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the played-out path, for display or replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    pub step_order: u32,
    pub choice_text: String,
    pub node_id: NodeId,
    pub prose: String,
    pub is_ending: bool,
}

/// Report from sweeping one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub triggered: usize,
    pub failures: usize,
}

/// A single game session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub character: Character,
    pub graph: StoryGraph,
    pub ledger: PathLedger,
    /// Every consequence ever recorded for this session.
    pub consequences: Vec<Consequence>,
    /// Ids of consequences recorded but not yet triggered, for display.
    pub pending_effects: Vec<ConsequenceId>,
    pub flags: FlagMap,
    pub difficulty: DifficultyLevel,
    pub permadeath_enabled: bool,
    /// Last computed situational danger, 0-10.
    pub danger_level: u8,
    pub is_active: bool,
    pub current_node_id: NodeId,
    pub death_record: Option<DeathRecord>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session at the opening scene.
    pub fn new(
        character: Character,
        opening: GeneratedScene,
        difficulty: DifficultyLevel,
        permadeath_enabled: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        let graph = StoryGraph::new(opening);
        let current_node_id = graph.root();
        Self {
            id: SessionId::new(),
            character,
            graph,
            ledger: PathLedger::new(),
            consequences: Vec::new(),
            pending_effects: Vec::new(),
            flags: FlagMap::new(),
            difficulty,
            permadeath_enabled,
            danger_level: 0,
            is_active: true,
            current_node_id,
            death_record: None,
            created_at,
        }
    }

    /// The node the story currently sits on.
    pub fn current_node(&self) -> Option<&StoryNode> {
        self.graph.node(self.current_node_id)
    }

    /// Reject the operation unless the session can still be mutated.
    ///
    /// Death and session end are both final: this is the single gate
    /// every mutating engine operation passes through.
    pub fn ensure_mutable(&self) -> Result<(), EngineError> {
        if self.character.is_dead {
            return Err(EngineError::InvalidState(format!(
                "character {} is dead",
                self.character.name
            )));
        }
        if !self.is_active {
            return Err(EngineError::InvalidState(format!(
                "session {} has ended",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply a choice's consequence payload to the character and flags.
    pub fn apply_choice_payload(&mut self, payload: &ChoicePayload) {
        for (name, delta) in &payload.attribute_deltas {
            self.character.attributes.apply_delta(name, *delta);
        }
        for grant in &payload.items_gained {
            self.character.add_item(crate::character::Item {
                name: grant.name.clone(),
                effect_flags: grant.effect_flags.clone(),
                quantity: grant.quantity,
            });
        }
        for name in &payload.items_lost {
            self.character.remove_item(name);
        }
        self.character.currency += payload.currency_delta;
        for (name, value) in &payload.flag_changes {
            self.flags.set(name.clone(), value.clone());
        }
        if let Some(location) = &payload.location_change {
            self.character.location = location.clone();
        }
    }

    /// Record a consequence, tracking it as pending unless it was
    /// applied synchronously.
    pub fn record_consequence(&mut self, consequence: Consequence) {
        if !consequence.is_triggered {
            self.pending_effects.push(consequence.id);
        }
        self.consequences.push(consequence);
    }

    /// The consequences still waiting to trigger.
    pub fn pending_consequences(&self) -> Vec<&Consequence> {
        self.consequences
            .iter()
            .filter(|c| !c.is_triggered)
            .collect()
    }

    /// Realize every due consequence.
    ///
    /// Each item is isolated: a failure is logged and skipped so one bad
    /// record never starves the rest of the batch.
    pub fn sweep_due(&mut self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let due: Vec<usize> = self
            .consequences
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_due(now))
            .map(|(i, _)| i)
            .collect();

        for index in due {
            match self.realize_consequence(index) {
                Ok(()) => report.triggered += 1,
                Err(reason) => {
                    report.failures += 1;
                    let id = self.consequences[index].id;
                    tracing::warn!(
                        session = %self.id,
                        consequence = %id,
                        %reason,
                        "skipping consequence that failed to apply"
                    );
                }
            }
        }
        report
    }

    /// Trigger one consequence and apply its permanent effect.
    fn realize_consequence(&mut self, index: usize) -> Result<(), String> {
        if self.consequences[index].character_id != self.character.id {
            return Err(format!(
                "consequence targets character {}, session owns {}",
                self.consequences[index].character_id, self.character.id
            ));
        }

        self.consequences[index].is_triggered = true;
        let consequence = self.consequences[index].clone();
        self.pending_effects.retain(|pending| *pending != consequence.id);
        consequence.apply_permanent_effect(&mut self.character);
        Ok(())
    }

    /// Kill the character and end the session.
    pub fn mark_death(&mut self, record: DeathRecord, epitaph: impl Into<String>) {
        let died_at = record.died_at;
        self.character.die(died_at, epitaph);
        self.death_record = Some(record);
        self.is_active = false;
    }

    /// Record a brush with death.
    pub fn record_near_death(&mut self) {
        self.character.survival.near_death_experiences += 1;
    }

    /// End the session without a death.
    pub fn end(&mut self) {
        self.is_active = false;
    }

    /// The active path joined with node content, oldest first. A pure
    /// read.
    pub fn path_history(&self) -> Vec<PathEntry> {
        self.ledger
            .active_steps()
            .into_iter()
            .filter_map(|step| {
                let node_id = self.graph.child_of(step.origin_node_id, step.choice_id)?;
                let node = self.graph.node(node_id)?;
                Some(PathEntry {
                    step_order: step.step_order,
                    choice_text: step.choice_text.clone(),
                    node_id,
                    prose: node.content.clone(),
                    is_ending: node.is_ending,
                })
            })
            .collect()
    }

    /// Save the session to a JSON snapshot.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let saved = SavedSession {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            session: self.clone(),
        };
        let content = serde_json::to_string_pretty(&saved)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load a session from a JSON snapshot.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).await?;
        let saved: SavedSession = serde_json::from_str(&content)?;
        if saved.version != SAVE_VERSION {
            return Err(EngineError::SaveVersion {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved.session)
    }
}

/// Serializable snapshot for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    version: u32,
    saved_at: DateTime<Utc>,
    session: Session,
}
