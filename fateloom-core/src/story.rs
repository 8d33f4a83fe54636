//! Story graph: narrative nodes, their choices, and memoized traversal.
//!
//! Nodes are created lazily the first time a choice is taken and reused
//! forever after. Replaying the same choice from the same node (after a
//! rewind, say) must land on the node created the first time around --
//! that memoization is what prevents duplicate subtrees and duplicate
//! generator calls.

use crate::attributes::{Attribute, FlagValue};
use crate::provider::{ContentGenerator, SceneContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for story nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChoiceId(pub Uuid);

impl ChoiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a choice demands before it can be taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateRequirement {
    /// A well-known attribute at or above the threshold.
    Attribute(Attribute),
    /// A named skill (stored in the attribute extra bag) at or above the
    /// threshold.
    Skill(String),
    /// At least `threshold` of a named item.
    Item(String),
}

/// Gating on a choice: a requirement plus the threshold it must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceGate {
    pub requirement: GateRequirement,
    pub threshold: f64,
}

/// The state changes a choice carries with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoicePayload {
    /// Attribute name -> delta. Well-known names hit the typed fields.
    #[serde(default)]
    pub attribute_deltas: HashMap<String, f64>,
    #[serde(default)]
    pub items_gained: Vec<ItemGrant>,
    #[serde(default)]
    pub items_lost: Vec<String>,
    #[serde(default)]
    pub currency_delta: i64,
    #[serde(default)]
    pub flag_changes: HashMap<String, FlagValue>,
    #[serde(default)]
    pub location_change: Option<String>,
}

/// An item granted by a choice payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGrant {
    pub name: String,
    #[serde(default)]
    pub effect_flags: Vec<String>,
    #[serde(default = "default_grant_quantity")]
    pub quantity: u32,
}

fn default_grant_quantity() -> u32 {
    1
}

/// A choice attached to a story node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
    pub gate: Option<ChoiceGate>,
    pub payload: ChoicePayload,
    /// Seed for generating the scene this choice leads to.
    pub followup_prompt: Option<String>,
}

/// A persisted narrative beat: prose plus its outgoing choices.
///
/// Immutable after creation except for `visited` and the echoed
/// selected-choice summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: NodeId,
    /// Opaque prose blob; the engine never parses it.
    pub content: String,
    pub origin_node_id: Option<NodeId>,
    pub choice_id_from_origin: Option<ChoiceId>,
    pub depth: u32,
    pub visited: bool,
    pub is_ending: bool,
    /// Display echo of the choice last taken from this node.
    pub selected_choice_text: Option<String>,
    pub choices: Vec<Choice>,
}

impl StoryNode {
    pub fn choice(&self, id: ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }
}

/// A fully structured scene as produced by the content generator.
///
/// The core never parses prose; unparsable generator output is dealt
/// with at the adapter boundary and never reaches this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedScene {
    pub prose: String,
    #[serde(default)]
    pub is_ending: bool,
    pub choices: Vec<GeneratedChoice>,
}

/// A choice as produced by the content generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedChoice {
    pub text: String,
    #[serde(default)]
    pub gate: Option<ChoiceGate>,
    #[serde(default)]
    pub payload: ChoicePayload,
    #[serde(default)]
    pub followup_prompt: Option<String>,
}

impl GeneratedChoice {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            gate: None,
            payload: ChoicePayload::default(),
            followup_prompt: None,
        }
    }
}

/// Errors from story graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no choice {choice}")]
    UnknownChoice { node: NodeId, choice: ChoiceId },

    #[error(transparent)]
    Generation(#[from] crate::provider::GeneratorError),
}

/// The session's story graph.
///
/// Owns every node created during the session and the memoization index
/// from `(origin, choice)` to the child node it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryGraph {
    nodes: HashMap<NodeId, StoryNode>,
    /// (origin node, choice taken) -> child node created for that pair.
    /// JSON map keys must be strings, so this round-trips as an edge list.
    #[serde(with = "edge_list")]
    children: HashMap<(NodeId, ChoiceId), NodeId>,
    root: NodeId,
}

mod edge_list {
    use super::{ChoiceId, NodeId};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize)]
    struct Edge {
        origin: NodeId,
        choice: ChoiceId,
        child: NodeId,
    }

    pub fn serialize<S>(
        map: &HashMap<(NodeId, ChoiceId), NodeId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let edges: Vec<Edge> = map
            .iter()
            .map(|(&(origin, choice), &child)| Edge {
                origin,
                choice,
                child,
            })
            .collect();
        edges.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<(NodeId, ChoiceId), NodeId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let edges = Vec::<Edge>::deserialize(deserializer)?;
        Ok(edges
            .into_iter()
            .map(|edge| ((edge.origin, edge.choice), edge.child))
            .collect())
    }
}

impl StoryGraph {
    /// Build a graph from the opening scene. The root node has no origin.
    pub fn new(opening: GeneratedScene) -> Self {
        let root = Self::build_node(None, None, 0, opening);
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            nodes,
            children: HashMap::new(),
            root: root_id,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&StoryNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut StoryNode> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The memoized child of `(origin, choice)`, if it was ever created.
    pub fn child_of(&self, origin: NodeId, choice: ChoiceId) -> Option<NodeId> {
        self.children.get(&(origin, choice)).copied()
    }

    /// Resolve the node reached by taking `choice` from `origin`,
    /// creating it through the generator on first traversal.
    ///
    /// The memoized path never touches the generator. On a miss, the new
    /// node and all its choices are inserted together or not at all: a
    /// generator failure leaves the graph exactly as it was.
    pub async fn resolve_or_create(
        &mut self,
        origin: NodeId,
        choice_id: ChoiceId,
        generator: &dyn ContentGenerator,
        ctx: &SceneContext,
    ) -> Result<NodeId, GraphError> {
        let origin_node = self
            .nodes
            .get(&origin)
            .ok_or(GraphError::UnknownNode(origin))?;
        if origin_node.choice(choice_id).is_none() {
            return Err(GraphError::UnknownChoice {
                node: origin,
                choice: choice_id,
            });
        }
        let depth = origin_node.depth + 1;

        if let Some(existing) = self.child_of(origin, choice_id) {
            return Ok(existing);
        }

        let scene = generator.generate_scene(ctx).await?;
        let node = Self::build_node(Some(origin), Some(choice_id), depth, scene);
        let node_id = node.id;

        self.nodes.insert(node_id, node);
        self.children.insert((origin, choice_id), node_id);
        Ok(node_id)
    }

    /// Mark a node visited and echo the choice taken from its origin.
    pub fn mark_visited(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visited = true;
        }
    }

    /// Record which outgoing choice was last taken from a node.
    pub fn record_selection(&mut self, id: NodeId, choice_text: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.selected_choice_text = Some(choice_text.into());
        }
    }

    fn build_node(
        origin: Option<NodeId>,
        choice_from_origin: Option<ChoiceId>,
        depth: u32,
        scene: GeneratedScene,
    ) -> StoryNode {
        let choices = scene
            .choices
            .into_iter()
            .map(|generated| Choice {
                id: ChoiceId::new(),
                text: generated.text,
                gate: generated.gate,
                payload: generated.payload,
                followup_prompt: generated.followup_prompt,
            })
            .collect();

        StoryNode {
            id: NodeId::new(),
            content: scene.prose,
            origin_node_id: origin,
            choice_id_from_origin: choice_from_origin,
            depth,
            visited: origin.is_none(),
            is_ending: scene.is_ending,
            selected_choice_text: None,
            choices,
        }
    }
}
