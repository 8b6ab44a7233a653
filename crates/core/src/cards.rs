//! Card store - the card-lookup facility backing booster generation.
//!
//! Loaded once at startup from a JSON file and shared read-only across all
//! rooms. Each set lists its cards by rarity plus an ordered list of booster
//! slots; a booster is produced by drawing one uniform card per slot.

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::{Error, Result};

/// One card entry in a set definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCard {
    pub name: String,
    pub rarity: String,
}

/// One set definition as it appears in the card-data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetData {
    pub code: String,
    pub name: String,
    /// Ordered booster slots, each naming a rarity. Empty means the set
    /// cannot generate boosters.
    #[serde(default)]
    pub booster: Vec<String>,
    #[serde(default)]
    pub cards: Vec<SetCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CardDataFile {
    sets: Vec<SetData>,
}

/// Read-only card database. Answers "does this set exist", "can it make
/// boosters", and "produce a random booster".
#[derive(Debug)]
pub struct CardStore {
    sets: HashMap<String, SetData>,
    /// Set codes in file order, for capability listings.
    order: Vec<String>,
}

impl CardStore {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CardDataFile = serde_json::from_str(raw)?;
        let mut sets = HashMap::new();
        let mut order = Vec::new();
        for set in file.sets {
            if set.code.is_empty() {
                return Err(Error::CardData("set with empty code".into()));
            }
            if sets.contains_key(&set.code) {
                return Err(Error::CardData(format!("duplicate set code {}", set.code)));
            }
            order.push(set.code.clone());
            sets.insert(set.code.clone(), set);
        }
        Ok(Self { sets, order })
    }

    pub fn set_codes(&self) -> &[String] {
        &self.order
    }

    pub fn contains_set(&self, code: &str) -> bool {
        self.sets.contains_key(code)
    }

    pub fn set_name(&self, code: &str) -> Option<&str> {
        self.sets.get(code).map(|s| s.name.as_str())
    }

    /// Whether the set has booster slot specifications.
    pub fn has_boosters(&self, code: &str) -> bool {
        self.sets
            .get(code)
            .map(|s| !s.booster.is_empty() && !s.cards.is_empty())
            .unwrap_or(false)
    }

    /// Produce one random booster for the set: one uniform draw per slot
    /// among the set's cards of that rarity. A slot with no matching cards
    /// falls back to the whole set. Returns an empty vec if the set is
    /// unknown or has no booster slots.
    pub fn generate_booster(&self, code: &str, rng: &mut StdRng) -> Vec<Card> {
        let Some(set) = self.sets.get(code) else {
            return Vec::new();
        };
        if set.booster.is_empty() || set.cards.is_empty() {
            return Vec::new();
        }

        let mut booster = Vec::with_capacity(set.booster.len());
        for slot in &set.booster {
            let matching: Vec<&SetCard> =
                set.cards.iter().filter(|c| &c.rarity == slot).collect();
            let chosen = if matching.is_empty() {
                set.cards.iter().collect::<Vec<_>>().choose(rng).copied()
            } else {
                matching.choose(rng).copied()
            };
            if let Some(card) = chosen {
                booster.push(Card::new(set.code.clone(), card.name.clone()));
            }
        }
        booster
    }
}
