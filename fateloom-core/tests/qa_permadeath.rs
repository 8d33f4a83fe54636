//! End-to-end exercises of the permadeath evaluator.

use fateloom_core::danger::LethalityVerdict;
use fateloom_core::provider::RiskError;
use fateloom_core::testing::TestHarness;
use fateloom_core::{Character, EngineError, Item, NewSessionConfig};

fn verdict(probability: f64) -> LethalityVerdict {
    LethalityVerdict {
        death_probability: probability,
        reasoning: "the chasm is deeper than it looks".to_string(),
        death_description: "The rope snaps halfway down.".to_string(),
        last_words: "Almost there.".to_string(),
    }
}

#[tokio::test]
async fn test_fatal_decision_closes_the_session() {
    let mut harness = TestHarness::start().await;
    harness.evaluator.push_lethality(verdict(0.9));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Climb down without an anchor")
        .await
        .unwrap();

    assert!(outcome.died);
    assert_eq!(outcome.last_words.as_deref(), Some("Almost there."));

    {
        let session = harness.session().await;
        assert!(session.character.is_dead);
        assert!(!session.is_active);

        let record = session.death_record.as_ref().unwrap();
        assert_eq!(record.cause, "The rope snaps halfway down.");
        assert_eq!(record.final_decision, "Climb down without an anchor");
        assert!(session.character.epitaph.as_deref().unwrap().contains("Wren"));
    }

    // Death is final: every further mutation is rejected.
    let result = harness.choose(0).await;
    assert!(matches!(result, Err(EngineError::InvalidState(_))));
    let result = harness
        .engine
        .evaluate_lethality(harness.session_id, "Get back up")
        .await;
    assert!(matches!(result, Err(EngineError::InvalidState(_))));
}

#[tokio::test]
async fn test_protective_item_downgrades_death() {
    let character = Character::new("Wren").with_item(Item::new("Amulet of Protection"));
    let harness = TestHarness::start_with(NewSessionConfig::new(character)).await;
    harness.evaluator.push_lethality(verdict(0.95));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Walk into the fire")
        .await
        .unwrap();

    assert!(!outcome.died);
    assert!(outcome.near_death);

    let session = harness.session().await;
    assert!(!session.character.is_dead);
    assert!(session.is_active);
    assert_eq!(session.character.survival.near_death_experiences, 1);
}

#[tokio::test]
async fn test_probability_just_under_threshold_is_a_close_call() {
    // Normal difficulty at level 1: the threshold sits at 0.69.
    let harness = TestHarness::start().await;
    harness.evaluator.push_lethality(verdict(0.55));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Duck under the portcullis")
        .await
        .unwrap();

    assert!(!outcome.died);
    assert!(outcome.near_death);

    let session = harness.session().await;
    assert_eq!(session.character.survival.near_death_experiences, 1);
    assert_eq!(session.character.survival.dangerous_situations_overcome, 1);
}

#[tokio::test]
async fn test_low_probability_survives_cleanly() {
    let harness = TestHarness::start().await;
    harness.evaluator.push_lethality(verdict(0.2));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Step over the tripwire")
        .await
        .unwrap();

    assert!(!outcome.died);
    assert!(!outcome.near_death);

    let session = harness.session().await;
    assert_eq!(session.character.survival.near_death_experiences, 0);
    assert_eq!(session.character.survival.dangerous_situations_overcome, 1);
}

#[tokio::test]
async fn test_disabled_permadeath_short_circuits() {
    let config = NewSessionConfig::new(Character::new("Wren")).with_permadeath(false);
    let harness = TestHarness::start_with(config).await;
    harness.evaluator.push_lethality(verdict(0.99));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Kiss the basilisk")
        .await
        .unwrap();

    assert!(!outcome.died);
    assert!(!outcome.near_death);
    let session = harness.session().await;
    assert!(!session.character.is_dead);
}

#[tokio::test]
async fn test_evaluator_failure_leaves_character_unharmed() {
    let harness = TestHarness::start().await;
    harness
        .evaluator
        .push_lethality_failure(RiskError::Parse("not a probability".to_string()));

    let outcome = harness
        .engine
        .evaluate_lethality(harness.session_id, "Taunt the dragon")
        .await
        .unwrap();

    assert!(!outcome.died);
    assert!(!outcome.near_death);
}

#[tokio::test]
async fn test_danger_level_is_cached_and_clamped() {
    let harness = TestHarness::start().await;

    harness.evaluator.push_danger(14);
    let level = harness
        .engine
        .current_danger_level(harness.session_id)
        .await
        .unwrap();
    assert_eq!(level, 10, "levels clamp to the 0-10 scale");

    // A failed refresh keeps the last known value.
    harness
        .evaluator
        .push_danger_failure(RiskError::Unavailable("timeout".to_string()));
    let level = harness
        .engine
        .current_danger_level(harness.session_id)
        .await
        .unwrap();
    assert_eq!(level, 10);
}
