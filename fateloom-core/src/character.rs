//! Characters, survival statistics, and death records.

use crate::attributes::AttributeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Keywords that mark an item or effect as protective against death.
///
/// A character holding any item whose name or effect flags contain one of
/// these survives a failed lethality check (it becomes a near-death event
/// instead).
pub const PROTECTIVE_KEYWORDS: [&str; 4] =
    ["resurrection", "protection", "invulnerability", "survival"];

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item held by a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Effect tags, e.g. "protection" or "light".
    #[serde(default)]
    pub effect_flags: Vec<String>,
    pub quantity: u32,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            effect_flags: Vec::new(),
            quantity: 1,
        }
    }

    pub fn with_effect(mut self, flag: impl Into<String>) -> Self {
        self.effect_flags.push(flag.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Whether this item shields its holder from permanent death.
    pub fn is_protective(&self) -> bool {
        let name = self.name.to_lowercase();
        PROTECTIVE_KEYWORDS.iter().any(|keyword| {
            name.contains(keyword)
                || self
                    .effect_flags
                    .iter()
                    .any(|flag| flag.to_lowercase().contains(keyword))
        })
    }
}

/// Running totals of what a character has lived through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivalStats {
    pub days_survived: u32,
    pub dangerous_situations_overcome: u32,
    pub near_death_experiences: u32,
    pub major_decisions_made: u32,
}

/// The permanent record written when a character dies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathRecord {
    /// What killed them, in narrative terms.
    pub cause: String,
    /// The node the story ended on.
    pub final_node: crate::story::NodeId,
    /// The decision that proved fatal.
    pub final_decision: String,
    /// Snapshot of survival stats at the moment of death.
    pub survival: SurvivalStats,
    pub died_at: DateTime<Utc>,
}

/// A player character.
///
/// Once `is_dead` flips to true the character is read-only: every mutating
/// engine operation on its session is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub level: u32,
    pub attributes: AttributeMap,
    pub items: Vec<Item>,
    pub currency: i64,
    pub location: String,
    pub survival: SurvivalStats,
    pub is_dead: bool,
    pub death_date: Option<DateTime<Utc>>,
    pub epitaph: Option<String>,
}

impl Character {
    /// Create a level-1 character with default attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            level: 1,
            attributes: AttributeMap::new(),
            items: Vec::new(),
            currency: 0,
            location: "Unknown".to_string(),
            survival: SurvivalStats::default(),
            is_dead: false,
            death_date: None,
            epitaph: None,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.add_item(item);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Find an item by name (case-insensitive).
    pub fn item(&self, name: &str) -> Option<&Item> {
        let lower = name.to_lowercase();
        self.items.iter().find(|i| i.name.to_lowercase() == lower)
    }

    /// Total quantity held of the named item.
    pub fn item_quantity(&self, name: &str) -> u32 {
        self.item(name).map(|i| i.quantity).unwrap_or(0)
    }

    /// Add an item, merging quantities with an existing stack of the
    /// same name.
    pub fn add_item(&mut self, item: Item) {
        let lower = item.name.to_lowercase();
        if let Some(existing) = self.items.iter_mut().find(|i| i.name.to_lowercase() == lower) {
            existing.quantity += item.quantity;
            for flag in item.effect_flags {
                if !existing.effect_flags.contains(&flag) {
                    existing.effect_flags.push(flag);
                }
            }
        } else {
            self.items.push(item);
        }
    }

    /// Remove one of the named item. Returns false if none was held.
    pub fn remove_item(&mut self, name: &str) -> bool {
        let lower = name.to_lowercase();
        if let Some(index) = self.items.iter().position(|i| i.name.to_lowercase() == lower) {
            let item = &mut self.items[index];
            if item.quantity > 1 {
                item.quantity -= 1;
            } else {
                self.items.remove(index);
            }
            true
        } else {
            false
        }
    }

    /// Whether anything in the inventory shields against permanent death.
    pub fn has_protective_safeguard(&self) -> bool {
        self.items.iter().any(Item::is_protective)
    }

    /// A one-line summary for evaluator prompts.
    pub fn summary(&self) -> String {
        format!(
            "{} (level {}, health {:.0}, {} items, {} near-death experiences)",
            self.name,
            self.level,
            self.attributes.health,
            self.items.len(),
            self.survival.near_death_experiences
        )
    }

    /// Mark the character permanently dead.
    pub fn die(&mut self, died_at: DateTime<Utc>, epitaph: impl Into<String>) {
        self.is_dead = true;
        self.death_date = Some(died_at);
        self.epitaph = Some(epitaph.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_stacking() {
        let mut character = Character::new("Wren");
        character.add_item(Item::new("Torch").with_quantity(2));
        character.add_item(Item::new("torch"));

        assert_eq!(character.items.len(), 1);
        assert_eq!(character.item_quantity("Torch"), 3);
    }

    #[test]
    fn test_remove_item_decrements_then_drops() {
        let mut character = Character::new("Wren");
        character.add_item(Item::new("Rope").with_quantity(2));

        assert!(character.remove_item("rope"));
        assert_eq!(character.item_quantity("Rope"), 1);

        assert!(character.remove_item("Rope"));
        assert_eq!(character.item_quantity("Rope"), 0);
        assert!(!character.remove_item("Rope"));
    }

    #[test]
    fn test_protective_item_by_name() {
        let character =
            Character::new("Wren").with_item(Item::new("Amulet of Protection"));
        assert!(character.has_protective_safeguard());
    }

    #[test]
    fn test_protective_item_by_effect_flag() {
        let character = Character::new("Wren")
            .with_item(Item::new("Plain Ring").with_effect("resurrection"));
        assert!(character.has_protective_safeguard());
    }

    #[test]
    fn test_no_protection_from_ordinary_gear() {
        let character = Character::new("Wren")
            .with_item(Item::new("Rusty Sword"))
            .with_item(Item::new("Lantern").with_effect("light"));
        assert!(!character.has_protective_safeguard());
    }

    #[test]
    fn test_death_marks_character() {
        let mut character = Character::new("Wren");
        let now = Utc::now();

        character.die(now, "Here lies Wren, who opened the wrong door.");

        assert!(character.is_dead);
        assert_eq!(character.death_date, Some(now));
        assert!(character.epitaph.as_deref().unwrap().contains("Wren"));
    }
}
