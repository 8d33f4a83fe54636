//! Permadeath math: difficulty thresholds and decision resolution.
//!
//! A decision dies when the evaluator's death probability exceeds the
//! session's threshold and nothing protective intervenes. The threshold
//! drops with difficulty and with character level (capped), and is
//! clamped so that no difficulty ever becomes a guaranteed death or a
//! guaranteed pass.

use serde::{Deserialize, Serialize};

/// How far below the threshold a probability still counts as a brush
/// with death.
pub const NEAR_DEATH_WINDOW: f64 = 0.20;

/// Per-level reduction of the death threshold.
const LEVEL_STEP: f64 = 0.01;

/// Maximum total level reduction.
const LEVEL_CAP: f64 = 0.10;

/// Upper clamp on any threshold.
const THRESHOLD_CEILING: f64 = 0.90;

/// Lower clamp: the hardcore base minus the full level reduction.
const THRESHOLD_FLOOR: f64 = 0.40;

/// Session difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Normal,
    Hard,
    Hardcore,
}

impl DifficultyLevel {
    pub fn name(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Normal => "normal",
            DifficultyLevel::Hard => "hard",
            DifficultyLevel::Hardcore => "hardcore",
        }
    }

    /// The base death threshold before level adjustment.
    pub fn base_threshold(&self) -> f64 {
        match self {
            DifficultyLevel::Easy => 0.85,
            DifficultyLevel::Normal => 0.70,
            DifficultyLevel::Hard => 0.60,
            DifficultyLevel::Hardcore => 0.50,
        }
    }
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        DifficultyLevel::Normal
    }
}

/// The death threshold for a difficulty and character level.
///
/// Probabilities above this kill; probabilities within
/// [`NEAR_DEATH_WINDOW`] below it record a near-death event.
pub fn death_threshold(difficulty: DifficultyLevel, level: u32) -> f64 {
    let level_bonus = (f64::from(level) * LEVEL_STEP).min(LEVEL_CAP);
    (difficulty.base_threshold() - level_bonus).clamp(THRESHOLD_FLOOR, THRESHOLD_CEILING)
}

/// The lethality payload from the risk evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LethalityVerdict {
    /// 0.0 to 1.0.
    pub death_probability: f64,
    pub reasoning: String,
    pub death_description: String,
    pub last_words: String,
}

/// How a single decision resolved against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionFate {
    /// Probability over threshold, nothing protective held: permanent
    /// death.
    Death,
    /// A close call: probability within the near-death window, or a
    /// would-be death averted by a protective item.
    NearDeath,
    Survived,
}

/// Comparison slack: thresholds come out of f64 subtraction, so exact
/// boundary probabilities must not flip on representation noise.
const FATE_EPSILON: f64 = 1e-9;

/// Resolve a verdict against a threshold.
///
/// Both boundaries are exclusive: a probability exactly at the
/// threshold is a near death, and one exactly at the bottom of the
/// near-death window survives.
pub fn resolve_fate(death_probability: f64, threshold: f64, protected: bool) -> DecisionFate {
    if death_probability - threshold > FATE_EPSILON {
        if protected {
            DecisionFate::NearDeath
        } else {
            DecisionFate::Death
        }
    } else if death_probability - (threshold - NEAR_DEATH_WINDOW) > FATE_EPSILON {
        DecisionFate::NearDeath
    } else {
        DecisionFate::Survived
    }
}

/// The caller-visible outcome of a lethality evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LethalityOutcome {
    pub died: bool,
    pub near_death: bool,
    /// Dramatized death description, present only on death.
    pub description: Option<String>,
    /// Present only on death.
    pub last_words: Option<String>,
}

impl LethalityOutcome {
    /// The outcome when permadeath is disabled or the evaluator's
    /// payload was dropped.
    pub fn unharmed() -> Self {
        Self {
            died: false,
            near_death: false,
            description: None,
            last_words: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_monotonic_in_difficulty() {
        for level in [0, 1, 5, 10, 40] {
            let easy = death_threshold(DifficultyLevel::Easy, level);
            let normal = death_threshold(DifficultyLevel::Normal, level);
            let hard = death_threshold(DifficultyLevel::Hard, level);
            let hardcore = death_threshold(DifficultyLevel::Hardcore, level);

            assert!(easy > normal, "level {level}");
            assert!(normal > hard, "level {level}");
            assert!(hard > hardcore, "level {level}");
        }
    }

    #[test]
    fn test_level_reduction_caps_at_ten_percent() {
        let at_ten = death_threshold(DifficultyLevel::Normal, 10);
        let at_fifty = death_threshold(DifficultyLevel::Normal, 50);

        assert!((at_ten - 0.60).abs() < 1e-9);
        assert_eq!(at_ten, at_fifty, "reduction saturates at level 10");
    }

    #[test]
    fn test_threshold_bounds() {
        for difficulty in [
            DifficultyLevel::Easy,
            DifficultyLevel::Normal,
            DifficultyLevel::Hard,
            DifficultyLevel::Hardcore,
        ] {
            for level in 0..=60 {
                let threshold = death_threshold(difficulty, level);
                assert!(threshold <= THRESHOLD_CEILING);
                assert!(threshold >= THRESHOLD_FLOOR);
            }
        }

        // The floor is exactly the hardcore base minus the level cap.
        assert_eq!(
            death_threshold(DifficultyLevel::Hardcore, 10),
            DifficultyLevel::Hardcore.base_threshold() - LEVEL_CAP
        );
    }

    #[test]
    fn test_fate_resolution() {
        // Normal at level 5: threshold 0.65.
        let threshold = death_threshold(DifficultyLevel::Normal, 5);
        assert!((threshold - 0.65).abs() < 1e-9);

        assert_eq!(resolve_fate(0.95, threshold, false), DecisionFate::Death);
        assert_eq!(resolve_fate(0.95, threshold, true), DecisionFate::NearDeath);
        assert_eq!(resolve_fate(0.50, threshold, false), DecisionFate::NearDeath);
        assert_eq!(resolve_fate(0.45, threshold, false), DecisionFate::Survived);
        assert_eq!(
            resolve_fate(threshold, threshold, false),
            DecisionFate::NearDeath,
            "exactly at the threshold is a close call, not a death"
        );
    }

    #[test]
    fn test_window_edge_survives_despite_float_noise() {
        // Thresholds are built by subtraction and carry representation
        // error (0.70 - 0.05 != 0.65 exactly). A probability sitting
        // exactly on the bottom of the near-death window must still
        // resolve the same way it would with exact arithmetic.
        for (difficulty, level, nominal) in [
            (DifficultyLevel::Normal, 5, 0.65),
            (DifficultyLevel::Easy, 3, 0.82),
            (DifficultyLevel::Hard, 7, 0.53),
        ] {
            let threshold = death_threshold(difficulty, level);
            assert!((threshold - nominal).abs() < 1e-9);

            let edge = nominal - NEAR_DEATH_WINDOW;
            assert_eq!(
                resolve_fate(edge, threshold, false),
                DecisionFate::Survived,
                "{} level {level}",
                difficulty.name()
            );
            assert_eq!(
                resolve_fate(edge + 0.01, threshold, false),
                DecisionFate::NearDeath,
                "{} level {level}",
                difficulty.name()
            );
        }
    }
}
