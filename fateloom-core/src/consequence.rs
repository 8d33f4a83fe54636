//! Delayed consequences: recorded effects with future trigger times.
//!
//! An evaluation call turns candidate effects into concrete pending
//! consequences; the periodic sweep realizes each one exactly once when
//! its trigger time arrives. Only permanent consequences touch character
//! attributes, through a coarse keyword heuristic -- enough for narrative
//! text to reference lasting harm without a full effect-resolution
//! engine.

use crate::attributes::Attribute;
use crate::character::{Character, CharacterId};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Attribute loss for a permanent critical consequence.
const CRITICAL_PENALTY: f64 = 10.0;

/// Attribute loss for a permanent major consequence.
const MAJOR_PENALTY: f64 = 4.0;

/// Unique identifier for consequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsequenceId(pub Uuid);

impl ConsequenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsequenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How severe a consequence is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }

    /// Importance score for memory records (0.0 to 1.0).
    pub fn importance(&self) -> f32 {
        match self {
            Severity::Minor => 0.3,
            Severity::Moderate => 0.5,
            Severity::Major => 0.8,
            Severity::Critical => 1.0,
        }
    }

    /// The fixed attribute loss a permanent consequence of this severity
    /// inflicts. Only the two highest severities leave a permanent mark.
    pub fn permanent_penalty(&self) -> Option<f64> {
        match self {
            Severity::Critical => Some(CRITICAL_PENALTY),
            Severity::Major => Some(MAJOR_PENALTY),
            Severity::Minor | Severity::Moderate => None,
        }
    }
}

/// Coarse delay class for a candidate effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Immediate,
    Short,
    Medium,
    Long,
}

impl TimeBucket {
    /// The half-open delay window for this bucket, or None for
    /// immediate.
    pub fn window(&self) -> Option<(Duration, Duration)> {
        match self {
            TimeBucket::Immediate => None,
            TimeBucket::Short => Some((Duration::hours(1), Duration::hours(3))),
            TimeBucket::Medium => Some((Duration::hours(6), Duration::hours(24))),
            TimeBucket::Long => Some((Duration::days(2), Duration::days(7))),
        }
    }

    /// Sample a concrete trigger time within this bucket's window.
    pub fn trigger_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.trigger_time_with_rng(now, &mut rand::thread_rng())
    }

    pub fn trigger_time_with_rng<R: Rng>(&self, now: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
        match self.window() {
            None => now,
            Some((lo, hi)) => {
                let lo_secs = lo.num_seconds();
                let hi_secs = hi.num_seconds();
                let delay = rng.gen_range(lo_secs..hi_secs);
                now + Duration::seconds(delay)
            }
        }
    }
}

/// A candidate effect as produced by the risk evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEffect {
    pub description: String,
    pub time_bucket: TimeBucket,
    pub severity: Severity,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default)]
    pub affected_entities: Vec<String>,
}

/// A recorded effect awaiting (or past) its trigger time.
///
/// Created once by an evaluation call; mutated only by the sweep, which
/// flips `is_triggered` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consequence {
    pub id: ConsequenceId,
    pub character_id: CharacterId,
    pub description: String,
    pub trigger_time: DateTime<Utc>,
    pub severity: Severity,
    pub is_permanent: bool,
    pub affected_entities: Vec<String>,
    pub is_triggered: bool,
}

impl Consequence {
    /// Build a concrete consequence from a candidate, sampling the
    /// trigger time from the candidate's bucket window.
    pub fn from_candidate<R: Rng>(
        candidate: CandidateEffect,
        character_id: CharacterId,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        Self {
            id: ConsequenceId::new(),
            character_id,
            trigger_time: candidate.time_bucket.trigger_time_with_rng(now, rng),
            description: candidate.description,
            severity: candidate.severity,
            is_permanent: candidate.is_permanent,
            affected_entities: candidate.affected_entities,
            is_triggered: false,
        }
    }

    /// Whether the sweep should realize this consequence now.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_triggered && self.trigger_time <= now
    }

    /// The attribute a permanent version of this consequence degrades,
    /// chosen by keyword match against the description.
    pub fn permanent_target(&self) -> Attribute {
        let description = self.description.to_lowercase();

        const COMBAT: [&str; 6] = ["combat", "battle", "fight", "wound", "blade", "scar"];
        const MAGIC: [&str; 5] = ["magic", "spell", "arcane", "curse", "mana"];

        if COMBAT.iter().any(|k| description.contains(k)) {
            Attribute::Strength
        } else if MAGIC.iter().any(|k| description.contains(k)) {
            Attribute::Mana
        } else {
            // Health-related and everything unmatched.
            Attribute::Health
        }
    }

    /// Apply the permanent attribute effect, if this consequence has
    /// one. Non-permanent and low-severity consequences are narrative
    /// only.
    pub fn apply_permanent_effect(&self, character: &mut Character) {
        if !self.is_permanent {
            return;
        }
        if let Some(penalty) = self.severity.permanent_penalty() {
            character.attributes.adjust(self.permanent_target(), -penalty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(bucket: TimeBucket, severity: Severity) -> CandidateEffect {
        CandidateEffect {
            description: "The innkeeper remembers the insult".to_string(),
            time_bucket: bucket,
            severity,
            is_permanent: false,
            affected_entities: vec!["innkeeper".to_string()],
        }
    }

    #[test]
    fn test_immediate_triggers_at_now() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);
        let time = TimeBucket::Immediate.trigger_time_with_rng(now, &mut rng);
        assert_eq!(time, now);
    }

    #[test]
    fn test_bucket_windows() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let short = TimeBucket::Short.trigger_time_with_rng(now, &mut rng);
            assert!(short >= now + Duration::hours(1));
            assert!(short < now + Duration::hours(3));

            let medium = TimeBucket::Medium.trigger_time_with_rng(now, &mut rng);
            assert!(medium >= now + Duration::hours(6));
            assert!(medium < now + Duration::hours(24));

            let long = TimeBucket::Long.trigger_time_with_rng(now, &mut rng);
            assert!(long >= now + Duration::days(2));
            assert!(long < now + Duration::days(7));
        }
    }

    #[test]
    fn test_due_requires_time_and_untriggered() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);
        let mut consequence = Consequence::from_candidate(
            candidate(TimeBucket::Short, Severity::Moderate),
            CharacterId::new(),
            now,
            &mut rng,
        );

        assert!(!consequence.is_due(now + Duration::minutes(30)));
        assert!(consequence.is_due(now + Duration::hours(4)));

        consequence.is_triggered = true;
        assert!(!consequence.is_due(now + Duration::hours(4)));
    }

    #[test]
    fn test_permanent_target_keywords() {
        let mut consequence = Consequence::from_candidate(
            candidate(TimeBucket::Immediate, Severity::Critical),
            CharacterId::new(),
            Utc::now(),
            &mut StdRng::seed_from_u64(2),
        );

        consequence.description = "A battle wound that never fully heals".to_string();
        assert_eq!(consequence.permanent_target(), Attribute::Strength);

        consequence.description = "The curse gnaws at your reserves".to_string();
        assert_eq!(consequence.permanent_target(), Attribute::Mana);

        consequence.description = "A lingering sickness takes hold".to_string();
        assert_eq!(consequence.permanent_target(), Attribute::Health);
    }

    #[test]
    fn test_permanent_penalties_by_severity() {
        assert_eq!(Severity::Critical.permanent_penalty(), Some(CRITICAL_PENALTY));
        assert_eq!(Severity::Major.permanent_penalty(), Some(MAJOR_PENALTY));
        assert_eq!(Severity::Moderate.permanent_penalty(), None);
        assert_eq!(Severity::Minor.permanent_penalty(), None);
        assert!(CRITICAL_PENALTY > MAJOR_PENALTY);
    }

    #[test]
    fn test_apply_permanent_effect() {
        let mut character = crate::character::Character::new("Wren");
        let strength_before = character.attributes.strength;

        let mut consequence = Consequence::from_candidate(
            candidate(TimeBucket::Immediate, Severity::Critical),
            character.id,
            Utc::now(),
            &mut StdRng::seed_from_u64(3),
        );
        consequence.description = "The blade left its mark".to_string();
        consequence.is_permanent = true;

        consequence.apply_permanent_effect(&mut character);
        assert_eq!(
            character.attributes.strength,
            (strength_before - CRITICAL_PENALTY).max(0.0)
        );
    }

    #[test]
    fn test_minor_permanent_consequence_is_narrative_only() {
        let mut character = crate::character::Character::new("Wren");
        let before = character.attributes.clone();

        let mut consequence = Consequence::from_candidate(
            candidate(TimeBucket::Immediate, Severity::Minor),
            character.id,
            Utc::now(),
            &mut StdRng::seed_from_u64(4),
        );
        consequence.is_permanent = true;

        consequence.apply_permanent_effect(&mut character);
        assert_eq!(character.attributes, before);
    }
}
