//! Card value types shared across the draft engine and the wire protocol.

use serde::{Deserialize, Serialize};

/// A draftable card. Equality is on (set code, name); printings from
/// different sets are different cards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Card {
    pub set_code: String,
    pub name: String,
}

impl Card {
    pub fn new(set_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            set_code: set_code.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.set_code)
    }
}

/// Identifier for a dispensed pack. Unique within a room, monotonically
/// increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PackId(pub u32);

impl std::fmt::Display for PackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inventory zone a drafted card can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Main,
    Sideboard,
    Junk,
    /// Destination for cards the server selected on the player's behalf.
    Auto,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::Main, Zone::Sideboard, Zone::Junk, Zone::Auto];
}

/// Basic land types a player can add to a zone without drafting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicLand {
    Plains,
    Island,
    Swamp,
    Mountain,
    Forest,
}

impl BasicLand {
    pub const ALL: [BasicLand; 5] = [
        BasicLand::Plains,
        BasicLand::Island,
        BasicLand::Swamp,
        BasicLand::Mountain,
        BasicLand::Forest,
    ];

    pub fn card_name(&self) -> &'static str {
        match self {
            BasicLand::Plains => "Plains",
            BasicLand::Island => "Island",
            BasicLand::Swamp => "Swamp",
            BasicLand::Mountain => "Mountain",
            BasicLand::Forest => "Forest",
        }
    }
}
