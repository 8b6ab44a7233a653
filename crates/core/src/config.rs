//! Room and draft configuration - immutable once a room is created.

use serde::{Deserialize, Serialize};

use crate::card::Card;

/// Direction packs travel around the table during a booster round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassDirection {
    Clockwise,
    CounterClockwise,
}

/// How many cards a dispensation produces per receiving chair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseQuantity {
    Count(u32),
    /// Dispense the dispenser's whole pool. Only meaningful for finite
    /// (custom list) dispensers.
    All,
}

/// A rule inside a round selecting a dispenser and the chairs that receive
/// its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispensation {
    pub dispenser_index: usize,
    pub chair_indices: Vec<usize>,
    pub quantity: DispenseQuantity,
}

/// One round of the draft. A draft's rounds are homogeneous in type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundConfig {
    Booster {
        /// Seconds each seat has to pick from the head pack; 0 disables the
        /// selection timer.
        selection_time_secs: u32,
        pass_direction: PassDirection,
        dispensations: Vec<Dispensation>,
    },
    Sealed {
        dispensations: Vec<Dispensation>,
    },
    Grid {
        dispenser_index: usize,
    },
}

impl RoundConfig {
    pub fn dispensations(&self) -> &[Dispensation] {
        match self {
            RoundConfig::Booster { dispensations, .. } => dispensations,
            RoundConfig::Sealed { dispensations } => dispensations,
            RoundConfig::Grid { .. } => &[],
        }
    }

    pub fn is_booster(&self) -> bool {
        matches!(self, RoundConfig::Booster { .. })
    }
}

/// Where a dispenser draws its cards from. A dispenser needs at least one
/// source; a custom list takes precedence over booster set codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenserConfig {
    #[serde(default)]
    pub booster_set_codes: Vec<String>,
    #[serde(default)]
    pub custom_card_list_index: Option<usize>,
}

/// A weighted multiset of cards used by custom-list dispensers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCardList {
    pub name: String,
    pub card_quantities: Vec<CardQuantity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardQuantity {
    pub card: Card,
    pub quantity: u32,
}

fn default_post_round_timer() -> u32 {
    5
}

fn default_version() -> u32 {
    1
}

/// The draft portion of a room configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftConfig {
    pub chair_count: usize,
    pub rounds: Vec<RoundConfig>,
    pub dispensers: Vec<DispenserConfig>,
    #[serde(default)]
    pub custom_card_lists: Vec<CustomCardList>,
    /// Grace interval between rounds, in ticks; 0 disables the wait.
    #[serde(default = "default_post_round_timer")]
    pub post_round_timer_secs: u32,
    #[serde(default = "default_version")]
    pub version: u32,
}

/// Everything needed to create a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bot_count: usize,
    pub draft_config: DraftConfig,
}

impl RoomSpec {
    /// Directory copy with detailed contents stripped: clients browsing the
    /// room list don't need (and shouldn't pull) whole custom card lists.
    pub fn abridged(&self) -> RoomSpec {
        let mut spec = self.clone();
        spec.password = None;
        for list in &mut spec.draft_config.custom_card_lists {
            list.card_quantities.clear();
        }
        spec
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().map(|p| !p.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abridged_strips_lists_and_password() {
        let spec = RoomSpec {
            name: "r".into(),
            password: Some("hunter2".into()),
            bot_count: 0,
            draft_config: DraftConfig {
                chair_count: 2,
                rounds: vec![RoundConfig::Sealed {
                    dispensations: vec![],
                }],
                dispensers: vec![DispenserConfig::default()],
                custom_card_lists: vec![CustomCardList {
                    name: "cube".into(),
                    card_quantities: vec![CardQuantity {
                        card: Card::new("TST", "Alpha"),
                        quantity: 4,
                    }],
                }],
                post_round_timer_secs: 5,
                version: 1,
            },
        };
        let abridged = spec.abridged();
        assert!(abridged.password.is_none());
        assert_eq!(abridged.draft_config.custom_card_lists[0].name, "cube");
        assert!(abridged.draft_config.custom_card_lists[0]
            .card_quantities
            .is_empty());
    }

    #[test]
    fn round_config_serde_roundtrip() {
        let round = RoundConfig::Booster {
            selection_time_secs: 30,
            pass_direction: PassDirection::CounterClockwise,
            dispensations: vec![Dispensation {
                dispenser_index: 0,
                chair_indices: vec![0, 1],
                quantity: DispenseQuantity::Count(15),
            }],
        };
        let json = serde_json::to_string(&round).unwrap();
        let back: RoundConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(round, back);
    }
}
