//! Room configuration validation.
//!
//! A pure function from a `RoomSpec` to OK or a typed rejection. Checks run
//! in a fixed order and the first failure wins - no cascading reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cards::CardStore;
use crate::config::{DispenseQuantity, RoomSpec, RoundConfig};

/// Why a create-room request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateRoomFailure {
    #[error("invalid chair count")]
    InvalidChairCount,
    #[error("invalid bot count")]
    InvalidBotCount,
    #[error("invalid round count")]
    InvalidRoundCount,
    #[error("invalid dispenser count")]
    InvalidDispenserCount,
    #[error("invalid set code")]
    InvalidSetCode,
    #[error("invalid dispenser configuration")]
    InvalidDispenserConfig,
    #[error("invalid custom card list")]
    InvalidCustomCardList,
    #[error("invalid draft type")]
    InvalidDraftType,
    #[error("invalid round configuration")]
    InvalidRoundConfig,
    /// Not produced by validation; the hub rejects duplicate room names.
    #[error("room name in use")]
    NameInUse,
}

/// Validate a room spec against the card store. Returns the first failure
/// encountered, in the documented check order.
pub fn validate_room_spec(
    spec: &RoomSpec,
    store: &CardStore,
) -> Result<(), CreateRoomFailure> {
    let draft = &spec.draft_config;

    // Must have at least one chair.
    if draft.chair_count < 1 {
        warn!(chair_count = draft.chair_count, "invalid chair count");
        return Err(CreateRoomFailure::InvalidChairCount);
    }

    // Must have fewer bots than chairs.
    if spec.bot_count >= draft.chair_count {
        warn!(
            bot_count = spec.bot_count,
            chair_count = draft.chair_count,
            "invalid bot count"
        );
        return Err(CreateRoomFailure::InvalidBotCount);
    }

    // Must have at least one round.
    if draft.rounds.is_empty() {
        warn!("no rounds configured");
        return Err(CreateRoomFailure::InvalidRoundCount);
    }

    // Must have at least one dispenser.
    if draft.dispensers.is_empty() {
        warn!("no dispensers configured");
        return Err(CreateRoomFailure::InvalidDispenserCount);
    }

    // Each dispenser needs at least one source; set codes must exist and
    // support booster generation; custom list indices must be in range.
    for (i, dispenser) in draft.dispensers.iter().enumerate() {
        let mut sources = 0;

        for set_code in &dispenser.booster_set_codes {
            if !store.contains_set(set_code) {
                warn!(dispenser = i, set_code, "unknown set code");
                return Err(CreateRoomFailure::InvalidSetCode);
            }
            if !store.has_boosters(set_code) {
                warn!(dispenser = i, set_code, "set cannot generate boosters");
                return Err(CreateRoomFailure::InvalidDispenserConfig);
            }
            sources += 1;
        }

        if let Some(index) = dispenser.custom_card_list_index {
            if index >= draft.custom_card_lists.len() {
                warn!(dispenser = i, index, "custom card list index out of range");
                return Err(CreateRoomFailure::InvalidDispenserConfig);
            }
            sources += 1;
        }

        if sources < 1 {
            warn!(dispenser = i, "dispenser has no sources");
            return Err(CreateRoomFailure::InvalidDispenserConfig);
        }
    }

    // Custom card lists must sum to a nonzero quantity of cards.
    for (i, list) in draft.custom_card_lists.iter().enumerate() {
        if list.card_quantities.is_empty() {
            warn!(list = i, "custom card list has no entries");
            return Err(CreateRoomFailure::InvalidCustomCardList);
        }
        let total: u64 = list
            .card_quantities
            .iter()
            .map(|cq| u64::from(cq.quantity))
            .sum();
        if total == 0 {
            warn!(list = i, "custom card list has no cards");
            return Err(CreateRoomFailure::InvalidCustomCardList);
        }
    }

    // Rounds must be homogeneous: booster-only, a single sealed round, or
    // grid-only. Dispensations must point at valid dispensers and chairs.
    let mut booster = false;
    let mut grid = false;
    for (i, round) in draft.rounds.iter().enumerate() {
        match round {
            RoundConfig::Booster { .. } => {
                if i > 0 && !booster {
                    warn!("booster round mixed into a non-booster draft");
                    return Err(CreateRoomFailure::InvalidDraftType);
                }
                booster = true;
            }
            RoundConfig::Sealed { .. } => {
                if i > 0 {
                    warn!("sealed draft may only have one round");
                    return Err(CreateRoomFailure::InvalidDraftType);
                }
            }
            RoundConfig::Grid { dispenser_index } => {
                if i > 0 && !grid {
                    warn!("grid round mixed into a non-grid draft");
                    return Err(CreateRoomFailure::InvalidDraftType);
                }
                grid = true;

                if *dispenser_index >= draft.dispensers.len() {
                    warn!(
                        round = i,
                        dispenser_index, "grid round has an invalid dispenser index"
                    );
                    return Err(CreateRoomFailure::InvalidRoundConfig);
                }
            }
        }

        if !grid {
            let dispensations = round.dispensations();
            if dispensations.is_empty() {
                warn!(round = i, "round has no dispensations");
                return Err(CreateRoomFailure::InvalidRoundConfig);
            }
            for d in dispensations {
                if d.dispenser_index >= draft.dispensers.len() {
                    warn!(
                        round = i,
                        dispenser_index = d.dispenser_index,
                        "dispensation has an invalid dispenser index"
                    );
                    return Err(CreateRoomFailure::InvalidRoundConfig);
                }
                if d.chair_indices.iter().any(|&c| c >= draft.chair_count) {
                    warn!(round = i, "dispensation targets an invalid chair");
                    return Err(CreateRoomFailure::InvalidRoundConfig);
                }
                // An infinite dispenser has no pool to dispense "all" of.
                if matches!(d.quantity, DispenseQuantity::All)
                    && draft.dispensers[d.dispenser_index]
                        .custom_card_list_index
                        .is_none()
                {
                    warn!(round = i, "dispense-all on a booster dispenser");
                    return Err(CreateRoomFailure::InvalidRoundConfig);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::config::{
        CardQuantity, CustomCardList, Dispensation, DispenserConfig, DraftConfig, PassDirection,
    };

    fn store() -> CardStore {
        CardStore::from_json(
            r#"{"sets": [
                {
                    "code": "TST",
                    "name": "Test Set",
                    "booster": ["common"],
                    "cards": [{"name": "Alpha", "rarity": "common"}]
                },
                {
                    "code": "NOB",
                    "name": "No Boosters",
                    "cards": [{"name": "Beta", "rarity": "common"}]
                }
            ]}"#,
        )
        .unwrap()
    }

    /// Baseline spec the cases below tweak: 2 chairs, one booster round,
    /// one booster dispenser on a valid set.
    fn baseline() -> RoomSpec {
        RoomSpec {
            name: "test room".into(),
            password: None,
            bot_count: 0,
            draft_config: DraftConfig {
                chair_count: 2,
                rounds: vec![RoundConfig::Booster {
                    selection_time_secs: 30,
                    pass_direction: PassDirection::Clockwise,
                    dispensations: vec![Dispensation {
                        dispenser_index: 0,
                        chair_indices: vec![0, 1],
                        quantity: DispenseQuantity::Count(15),
                    }],
                }],
                dispensers: vec![DispenserConfig {
                    booster_set_codes: vec!["TST".into()],
                    custom_card_list_index: None,
                }],
                custom_card_lists: vec![],
                post_round_timer_secs: 0,
                version: 1,
            },
        }
    }

    #[test]
    fn sunny_day() {
        assert_eq!(validate_room_spec(&baseline(), &store()), Ok(()));
    }

    #[test]
    fn zero_chairs_rejected() {
        let mut spec = baseline();
        spec.draft_config.chair_count = 0;
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidChairCount)
        );
    }

    #[test]
    fn bot_count_must_be_less_than_chairs() {
        let mut spec = baseline();
        spec.bot_count = 2;
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidBotCount)
        );

        // One fewer bot than chairs is the maximum allowed.
        spec.bot_count = 1;
        assert_eq!(validate_room_spec(&spec, &store()), Ok(()));
    }

    #[test]
    fn no_rounds_rejected() {
        let mut spec = baseline();
        spec.draft_config.rounds.clear();
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidRoundCount)
        );
    }

    #[test]
    fn no_dispensers_rejected() {
        let mut spec = baseline();
        spec.draft_config.dispensers.clear();
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDispenserCount)
        );
    }

    #[test]
    fn unknown_set_code_rejected() {
        let mut spec = baseline();
        spec.draft_config.dispensers[0].booster_set_codes = vec!["XXXX".into()];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidSetCode)
        );
    }

    #[test]
    fn boosterless_set_rejected() {
        let mut spec = baseline();
        spec.draft_config.dispensers[0].booster_set_codes = vec!["NOB".into()];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDispenserConfig)
        );
    }

    #[test]
    fn sourceless_dispenser_rejected() {
        let mut spec = baseline();
        spec.draft_config.dispensers[0] = DispenserConfig::default();
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDispenserConfig)
        );
    }

    #[test]
    fn sourceless_dispenser_rejected_even_after_sourced_one() {
        // The check is per-dispenser: a sourced dispenser earlier in the
        // list must not mask a later sourceless one.
        let mut spec = baseline();
        spec.draft_config
            .dispensers
            .push(DispenserConfig::default());
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDispenserConfig)
        );
    }

    #[test]
    fn custom_list_index_out_of_range_rejected() {
        let mut spec = baseline();
        spec.draft_config.dispensers[0] = DispenserConfig {
            booster_set_codes: vec![],
            custom_card_list_index: Some(0),
        };
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDispenserConfig)
        );
    }

    #[test]
    fn empty_custom_list_rejected() {
        let mut spec = baseline();
        spec.draft_config.custom_card_lists.push(CustomCardList {
            name: "empty".into(),
            card_quantities: vec![],
        });
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidCustomCardList)
        );
    }

    #[test]
    fn zero_quantity_custom_list_rejected() {
        let mut spec = baseline();
        spec.draft_config.custom_card_lists.push(CustomCardList {
            name: "zeroes".into(),
            card_quantities: vec![
                CardQuantity {
                    card: Card::new("TST", "Alpha"),
                    quantity: 0,
                },
                CardQuantity {
                    card: Card::new("TST", "Beta"),
                    quantity: 0,
                },
            ],
        });
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidCustomCardList)
        );
    }

    #[test]
    fn mixed_round_types_rejected() {
        let mut spec = baseline();
        spec.draft_config
            .rounds
            .push(RoundConfig::Grid { dispenser_index: 0 });
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDraftType)
        );
    }

    #[test]
    fn multi_round_sealed_rejected() {
        let mut spec = baseline();
        let sealed = RoundConfig::Sealed {
            dispensations: vec![Dispensation {
                dispenser_index: 0,
                chair_indices: vec![0, 1],
                quantity: DispenseQuantity::Count(45),
            }],
        };
        spec.draft_config.rounds = vec![sealed.clone(), sealed];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidDraftType)
        );
    }

    #[test]
    fn round_without_dispensations_rejected() {
        let mut spec = baseline();
        spec.draft_config.rounds = vec![RoundConfig::Booster {
            selection_time_secs: 30,
            pass_direction: PassDirection::Clockwise,
            dispensations: vec![],
        }];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidRoundConfig)
        );
    }

    #[test]
    fn dispensation_with_bad_dispenser_index_rejected() {
        let mut spec = baseline();
        spec.draft_config.rounds = vec![RoundConfig::Booster {
            selection_time_secs: 30,
            pass_direction: PassDirection::Clockwise,
            dispensations: vec![Dispensation {
                dispenser_index: 5,
                chair_indices: vec![0],
                quantity: DispenseQuantity::Count(15),
            }],
        }];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidRoundConfig)
        );
    }

    #[test]
    fn grid_round_with_bad_dispenser_index_rejected() {
        let mut spec = baseline();
        spec.draft_config.rounds = vec![RoundConfig::Grid { dispenser_index: 3 }];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidRoundConfig)
        );
    }

    #[test]
    fn grid_draft_accepted() {
        let mut spec = baseline();
        spec.draft_config.rounds = vec![
            RoundConfig::Grid { dispenser_index: 0 },
            RoundConfig::Grid { dispenser_index: 0 },
        ];
        assert_eq!(validate_room_spec(&spec, &store()), Ok(()));
    }

    #[test]
    fn dispense_all_requires_finite_pool() {
        let mut spec = baseline();
        spec.draft_config.rounds = vec![RoundConfig::Sealed {
            dispensations: vec![Dispensation {
                dispenser_index: 0,
                chair_indices: vec![0, 1],
                quantity: DispenseQuantity::All,
            }],
        }];
        assert_eq!(
            validate_room_spec(&spec, &store()),
            Err(CreateRoomFailure::InvalidRoundConfig)
        );

        // With a custom-list source the same dispensation is fine.
        spec.draft_config.custom_card_lists.push(CustomCardList {
            name: "cube".into(),
            card_quantities: vec![CardQuantity {
                card: Card::new("TST", "Alpha"),
                quantity: 40,
            }],
        });
        spec.draft_config.dispensers[0] = DispenserConfig {
            booster_set_codes: vec![],
            custom_card_list_index: Some(0),
        };
        assert_eq!(validate_room_spec(&spec, &store()), Ok(()));
    }
}
