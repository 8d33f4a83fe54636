//! Typed attribute and flag maps.
//!
//! Character attributes and session world flags arrive from generated
//! content as loose key/value data. Rather than an untyped JSON object,
//! a small closed set of well-known numeric attributes is stored in
//! dedicated fields, with everything else in an explicit extra bag, so
//! attribute arithmetic stays type-safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The well-known numeric attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Health,
    Strength,
    Mana,
    Agility,
    Wits,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Health => "health",
            Attribute::Strength => "strength",
            Attribute::Mana => "mana",
            Attribute::Agility => "agility",
            Attribute::Wits => "wits",
        }
    }

    /// Parse a well-known attribute from its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "health" => Some(Attribute::Health),
            "strength" => Some(Attribute::Strength),
            "mana" => Some(Attribute::Mana),
            "agility" => Some(Attribute::Agility),
            "wits" => Some(Attribute::Wits),
            _ => None,
        }
    }

    pub fn all() -> [Attribute; 5] {
        [
            Attribute::Health,
            Attribute::Strength,
            Attribute::Mana,
            Attribute::Agility,
            Attribute::Wits,
        ]
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value in the extra bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

/// Character attributes: well-known numeric fields plus an extra bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMap {
    pub health: f64,
    pub strength: f64,
    pub mana: f64,
    pub agility: f64,
    pub wits: f64,
    /// Anything generated content invents beyond the closed set.
    #[serde(default)]
    pub extra: HashMap<String, AttributeValue>,
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self {
            health: 100.0,
            strength: 10.0,
            mana: 10.0,
            agility: 10.0,
            wits: 10.0,
            extra: HashMap::new(),
        }
    }
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a well-known attribute.
    pub fn get(&self, attribute: Attribute) -> f64 {
        match attribute {
            Attribute::Health => self.health,
            Attribute::Strength => self.strength,
            Attribute::Mana => self.mana,
            Attribute::Agility => self.agility,
            Attribute::Wits => self.wits,
        }
    }

    /// Set a well-known attribute. Values are floored at zero.
    pub fn set(&mut self, attribute: Attribute, value: f64) {
        let value = value.max(0.0);
        match attribute {
            Attribute::Health => self.health = value,
            Attribute::Strength => self.strength = value,
            Attribute::Mana => self.mana = value,
            Attribute::Agility => self.agility = value,
            Attribute::Wits => self.wits = value,
        }
    }

    /// Adjust a well-known attribute by a delta.
    pub fn adjust(&mut self, attribute: Attribute, delta: f64) {
        self.set(attribute, self.get(attribute) + delta);
    }

    /// Apply a delta by name: well-known keys hit the typed fields,
    /// anything else lands in (or extends) the extra bag as a number.
    pub fn apply_delta(&mut self, name: &str, delta: f64) {
        if let Some(attribute) = Attribute::from_name(name) {
            self.adjust(attribute, delta);
            return;
        }

        let entry = self
            .extra
            .entry(name.to_lowercase())
            .or_insert(AttributeValue::Number(0.0));
        if let AttributeValue::Number(current) = entry {
            *current = (*current + delta).max(0.0);
        }
        // Text-valued extras are not arithmetic targets; a delta against
        // one is dropped rather than clobbering the text.
    }
}

/// A session world flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlagValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Session world flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagMap {
    flags: HashMap<String, FlagValue>,
}

impl FlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FlagValue) {
        self.flags.insert(name.into().to_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.flags.get(&name.to_lowercase())
    }

    /// A flag is "set" when it exists and is not `Bool(false)`.
    pub fn is_set(&self, name: &str) -> bool {
        !matches!(self.get(name), None | Some(FlagValue::Bool(false)))
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlagValue)> {
        self.flags.iter()
    }
}
