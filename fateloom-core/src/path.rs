//! Append-only path ledger and branch bookkeeping.
//!
//! Every decision appends a `PathStep`; steps are never deleted. Rewind
//! and restore work entirely by flipping `is_active` and re-tagging
//! `branch_id` -- the only two mutable fields -- so every branch that
//! ever existed remains fully reconstructable from the log.
//!
//! Invariant: at any time exactly one set of steps is active, and that
//! set has contiguous `step_order` values starting at 0.

use crate::story::{ChoiceId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for path steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for the derived grouping of steps into a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub Uuid);

impl BranchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub id: StepId,
    /// The node the decision was taken from.
    pub origin_node_id: NodeId,
    pub choice_id: ChoiceId,
    /// Denormalized for display without a graph lookup.
    pub choice_text: String,
    pub step_order: u32,
    pub is_active: bool,
    pub branch_id: BranchId,
    /// The step that preceded this one when it was appended. Restore
    /// follows these links to reactivate a branch's full ancestry.
    pub parent_step_id: Option<StepId>,
}

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("no active step was taken from node {0}")]
    NoActiveStepAt(NodeId),

    #[error("branch {0} has no steps")]
    UnknownBranch(BranchId),
}

/// Summary of one branch for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSummary {
    pub branch_id: BranchId,
    pub is_active: bool,
    pub step_count: usize,
    pub deepest_order: u32,
    pub latest_choice_text: String,
}

/// A node from which the player diverged: more than one recorded step
/// originates there, across all branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPoint {
    pub origin_node_id: NodeId,
    pub options: Vec<BranchOption>,
}

/// One of the decisions recorded at a branch point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchOption {
    pub branch_id: BranchId,
    pub choice_id: ChoiceId,
    pub choice_text: String,
    pub is_active: bool,
}

/// The full branch picture for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchOverview {
    pub active_branch: Option<BranchSummary>,
    pub inactive_branches: Vec<BranchSummary>,
    pub branch_points: Vec<BranchPoint>,
}

/// The per-session append-only log of path steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathLedger {
    steps: Vec<PathStep>,
}

impl PathLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All steps ever recorded, in append order.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The active steps, sorted by `step_order`.
    pub fn active_steps(&self) -> Vec<&PathStep> {
        let mut active: Vec<_> = self.steps.iter().filter(|s| s.is_active).collect();
        active.sort_by_key(|s| s.step_order);
        active
    }

    pub fn active_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_active).count()
    }

    /// The branch id shared by the active steps, if any are active.
    pub fn active_branch_id(&self) -> Option<BranchId> {
        self.steps.iter().find(|s| s.is_active).map(|s| s.branch_id)
    }

    /// The active step taken *from* the given node, if one exists.
    pub fn active_step_from(&self, origin: NodeId) -> Option<&PathStep> {
        self.steps
            .iter()
            .find(|s| s.is_active && s.origin_node_id == origin)
    }

    pub fn step(&self, id: StepId) -> Option<&PathStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Append a decision to the active path.
    ///
    /// The new step's order is the count of currently active steps; it
    /// joins the active branch, or a freshly minted one when the path is
    /// empty.
    pub fn append(
        &mut self,
        origin: NodeId,
        choice_id: ChoiceId,
        choice_text: impl Into<String>,
    ) -> StepId {
        let step_order = self.active_count() as u32;
        let branch_id = self.active_branch_id().unwrap_or_else(BranchId::new);
        let parent_step_id = self
            .active_steps()
            .last()
            .map(|s| s.id);

        let step = PathStep {
            id: StepId::new(),
            origin_node_id: origin,
            choice_id,
            choice_text: choice_text.into(),
            step_order,
            is_active: true,
            branch_id,
            parent_step_id,
        };
        let id = step.id;
        self.steps.push(step);
        id
    }

    /// Deactivate every active step with `step_order >= min_order`,
    /// moving them together into a freshly minted archived branch.
    ///
    /// Returns the archive branch id, or None when nothing was active in
    /// that range.
    pub fn archive_tail(&mut self, min_order: u32) -> Option<BranchId> {
        let archive = BranchId::new();
        let mut moved = false;
        for step in &mut self.steps {
            if step.is_active && step.step_order >= min_order {
                step.is_active = false;
                step.branch_id = archive;
                moved = true;
            }
        }
        moved.then_some(archive)
    }

    /// Rewind: archive everything strictly after the active step taken
    /// from `target`. The matched step itself stays active.
    ///
    /// Only the *active* path is searched; a node reached on some
    /// archived branch is not a valid rewind target.
    pub fn rewind_to(&mut self, target: NodeId) -> Result<&PathStep, PathError> {
        let order = self
            .active_step_from(target)
            .ok_or(PathError::NoActiveStepAt(target))?
            .step_order;

        self.archive_tail(order + 1);

        // Re-borrow; archive_tail never touches the matched step.
        Ok(self
            .active_step_from(target)
            .expect("rewound-to step remains active"))
    }

    /// All steps tagged with the given branch, sorted by order.
    pub fn steps_of_branch(&self, branch: BranchId) -> Vec<&PathStep> {
        let mut steps: Vec<_> = self
            .steps
            .iter()
            .filter(|s| s.branch_id == branch)
            .collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }

    /// Restore a previously archived branch, making it the active path.
    ///
    /// The branch's steps are activated together with their full ancestor
    /// chain (followed through `parent_step_id`), and the whole activated
    /// chain is re-tagged to the restored branch id. That keeps both
    /// invariants at once: the active set equals exactly the steps of the
    /// restored branch, and it is contiguous from order 0. Displaced
    /// active steps are archived under a fresh branch id.
    ///
    /// Returns the restored branch's deepest step.
    pub fn restore(&mut self, branch: BranchId) -> Result<&PathStep, PathError> {
        let branch_steps: Vec<StepId> = self
            .steps_of_branch(branch)
            .iter()
            .map(|s| s.id)
            .collect();
        if branch_steps.is_empty() {
            return Err(PathError::UnknownBranch(branch));
        }

        let mut chain: HashSet<StepId> = branch_steps.iter().copied().collect();

        // Walk ancestry from the branch's shallowest step down to the root.
        let shallowest = self
            .steps_of_branch(branch)
            .first()
            .map(|s| s.id)
            .expect("branch has steps");
        let mut cursor = self.step(shallowest).and_then(|s| s.parent_step_id);
        while let Some(parent_id) = cursor {
            chain.insert(parent_id);
            cursor = self.step(parent_id).and_then(|s| s.parent_step_id);
        }

        // Displaced steps: active but not part of the restored chain.
        let displaced = BranchId::new();
        for step in &mut self.steps {
            if step.is_active && !chain.contains(&step.id) {
                step.is_active = false;
                step.branch_id = displaced;
            }
        }

        for step in &mut self.steps {
            if chain.contains(&step.id) {
                step.is_active = true;
                step.branch_id = branch;
            }
        }

        Ok(self
            .active_steps()
            .into_iter()
            .last()
            .expect("restored branch has steps"))
    }

    /// Every node from which more than one step was ever taken.
    pub fn branch_points(&self) -> Vec<BranchPoint> {
        let mut by_origin: HashMap<NodeId, Vec<&PathStep>> = HashMap::new();
        for step in &self.steps {
            by_origin.entry(step.origin_node_id).or_default().push(step);
        }

        let mut points: Vec<(u32, BranchPoint)> = by_origin
            .into_iter()
            .filter(|(_, steps)| steps.len() > 1)
            .map(|(origin, mut steps)| {
                steps.sort_by(|a, b| {
                    a.step_order
                        .cmp(&b.step_order)
                        .then_with(|| a.choice_text.cmp(&b.choice_text))
                });
                let depth = steps[0].step_order;
                let point = BranchPoint {
                    origin_node_id: origin,
                    options: steps
                        .into_iter()
                        .map(|s| BranchOption {
                            branch_id: s.branch_id,
                            choice_id: s.choice_id,
                            choice_text: s.choice_text.clone(),
                            is_active: s.is_active,
                        })
                        .collect(),
                };
                (depth, point)
            })
            .collect();

        // Shallowest divergence first.
        points.sort_by_key(|(depth, _)| *depth);
        points.into_iter().map(|(_, point)| point).collect()
    }

    /// The full branch picture: active branch, archived branches, and
    /// divergence points. A pure read.
    pub fn overview(&self) -> BranchOverview {
        let active_id = self.active_branch_id();
        let mut by_branch: HashMap<BranchId, Vec<&PathStep>> = HashMap::new();
        for step in &self.steps {
            by_branch.entry(step.branch_id).or_default().push(step);
        }

        let mut active_branch = None;
        let mut inactive_branches = Vec::new();
        for (branch_id, mut steps) in by_branch {
            steps.sort_by_key(|s| s.step_order);
            let deepest = steps.last().expect("branch group is non-empty");
            let summary = BranchSummary {
                branch_id,
                is_active: Some(branch_id) == active_id,
                step_count: steps.len(),
                deepest_order: deepest.step_order,
                latest_choice_text: deepest.choice_text.clone(),
            };
            if summary.is_active {
                active_branch = Some(summary);
            } else {
                inactive_branches.push(summary);
            }
        }
        inactive_branches.sort_by(|a, b| {
            a.deepest_order
                .cmp(&b.deepest_order)
                .then_with(|| a.latest_choice_text.cmp(&b.latest_choice_text))
        });

        BranchOverview {
            active_branch,
            inactive_branches,
            branch_points: self.branch_points(),
        }
    }

    /// Whether the active orders run 0, 1, 2, ... with no gaps.
    pub fn active_orders_contiguous(&self) -> bool {
        self.active_steps()
            .iter()
            .enumerate()
            .all(|(i, s)| s.step_order == i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::new()
    }

    fn choice() -> ChoiceId {
        ChoiceId::new()
    }

    /// Append a three-step path n0 -> n1 -> n2 -> n3.
    fn three_step_ledger() -> (PathLedger, [NodeId; 3]) {
        let nodes = [node(), node(), node()];
        let mut ledger = PathLedger::new();
        ledger.append(nodes[0], choice(), "first");
        ledger.append(nodes[1], choice(), "second");
        ledger.append(nodes[2], choice(), "third");
        (ledger, nodes)
    }

    #[test]
    fn test_append_orders_and_branch() {
        let (ledger, _) = three_step_ledger();

        let active = ledger.active_steps();
        assert_eq!(active.len(), 3);
        assert_eq!(
            active.iter().map(|s| s.step_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let branch = active[0].branch_id;
        assert!(active.iter().all(|s| s.branch_id == branch));
        assert!(ledger.active_orders_contiguous());
    }

    #[test]
    fn test_parent_links_follow_append_order() {
        let (ledger, _) = three_step_ledger();
        let active = ledger.active_steps();

        assert_eq!(active[0].parent_step_id, None);
        assert_eq!(active[1].parent_step_id, Some(active[0].id));
        assert_eq!(active[2].parent_step_id, Some(active[1].id));
    }

    #[test]
    fn test_rewind_archives_strictly_later_steps() {
        let (mut ledger, nodes) = three_step_ledger();
        let original_branch = ledger.active_branch_id().unwrap();

        let kept = ledger.rewind_to(nodes[1]).unwrap();
        assert_eq!(kept.step_order, 1);

        let active = ledger.active_steps();
        assert_eq!(active.len(), 2);
        assert!(ledger.active_orders_contiguous());

        // The archived tail shares a new branch id disjoint from the rest.
        let archived: Vec<_> = ledger.steps().iter().filter(|s| !s.is_active).collect();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].step_order, 2);
        assert_ne!(archived[0].branch_id, original_branch);
    }

    #[test]
    fn test_rewind_to_latest_archives_nothing() {
        let (mut ledger, nodes) = three_step_ledger();

        ledger.rewind_to(nodes[2]).unwrap();
        assert_eq!(ledger.active_count(), 3);
    }

    #[test]
    fn test_rewind_requires_active_step() {
        let (mut ledger, _) = three_step_ledger();

        let result = ledger.rewind_to(node());
        assert!(matches!(result, Err(PathError::NoActiveStepAt(_))));
    }

    #[test]
    fn test_rewind_ignores_archived_steps() {
        let (mut ledger, nodes) = three_step_ledger();
        ledger.rewind_to(nodes[1]).unwrap();

        // nodes[2]'s step is archived now; rewinding to it must fail.
        let result = ledger.rewind_to(nodes[2]);
        assert!(matches!(result, Err(PathError::NoActiveStepAt(_))));
    }

    #[test]
    fn test_restore_reactivates_full_chain() {
        let (mut ledger, nodes) = three_step_ledger();

        // Rewind archives the order-2 tail under `abandoned`.
        ledger.rewind_to(nodes[1]).unwrap();
        let abandoned = ledger
            .steps()
            .iter()
            .find(|s| !s.is_active)
            .unwrap()
            .branch_id;

        // Diverge at nodes[1]: archive its outgoing step, take another.
        ledger.archive_tail(1);
        ledger.append(nodes[1], choice(), "diverged");

        let deepest = ledger.restore(abandoned).unwrap();
        assert_eq!(deepest.step_order, 2);

        // Active set equals exactly the restored branch, contiguous
        // from 0 even though the branch itself held only the tail.
        let active = ledger.active_steps();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|s| s.branch_id == abandoned));
        assert!(ledger.active_orders_contiguous());

        // The displaced divergence step is archived under a fresh id.
        assert!(ledger
            .steps()
            .iter()
            .any(|s| !s.is_active && s.choice_text == "diverged" && s.branch_id != abandoned));
    }

    #[test]
    fn test_restore_unknown_branch() {
        let (mut ledger, _) = three_step_ledger();
        let result = ledger.restore(BranchId::new());
        assert!(matches!(result, Err(PathError::UnknownBranch(_))));
    }

    #[test]
    fn test_branch_points_require_divergence() {
        let (mut ledger, nodes) = three_step_ledger();
        assert!(ledger.branch_points().is_empty());

        // Diverge at nodes[1]: archive its outgoing step, take another.
        ledger.rewind_to(nodes[1]).unwrap();
        ledger.archive_tail(1);
        ledger.append(nodes[1], choice(), "other way");

        let points = ledger.branch_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].origin_node_id, nodes[1]);
        assert_eq!(points[0].options.len(), 2);

        let branch_ids: HashSet<_> =
            points[0].options.iter().map(|o| o.branch_id).collect();
        assert_eq!(branch_ids.len(), 2, "diverged steps sit on distinct branches");
    }

    #[test]
    fn test_overview_partitions_branches() {
        let (mut ledger, nodes) = three_step_ledger();

        // Diverge at nodes[1]: the old order-1/order-2 tail is archived.
        ledger.rewind_to(nodes[1]).unwrap();
        ledger.archive_tail(1);
        ledger.append(nodes[1], choice(), "new direction");

        let overview = ledger.overview();
        let active = overview.active_branch.expect("an active branch exists");
        assert_eq!(active.step_count, 2);
        assert_eq!(active.latest_choice_text, "new direction");

        // Rewind and divergence each minted an archived branch.
        assert_eq!(overview.inactive_branches.len(), 2);
        assert!(overview.inactive_branches.iter().all(|b| !b.is_active));
        assert_eq!(overview.branch_points.len(), 1);
    }
}
