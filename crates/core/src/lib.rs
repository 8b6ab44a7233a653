//! draftden Core Library
//!
//! Domain model and draft engine for the draftden server: cards and the
//! card store, dispensers, room/draft configuration and validation, player
//! inventories with deck hashing, and bot strategies. No I/O beyond loading
//! the card store; everything here is synchronous and single-threaded.

pub mod bot;
pub mod card;
pub mod cards;
pub mod config;
pub mod dispenser;
pub mod engine;
pub mod error;
pub mod invariants;
pub mod inventory;
pub mod validate;

pub use bot::{BotStrategy, RandomPicker};
pub use card::{BasicLand, Card, PackId, Zone};
pub use cards::CardStore;
pub use config::{
    CardQuantity, CustomCardList, Dispensation, DispenseQuantity, DispenserConfig, DraftConfig,
    PassDirection, RoomSpec, RoundConfig,
};
pub use dispenser::{build_dispensers, CardDispenser};
pub use engine::{
    DraftEngine, DraftEvent, DraftState, PickError, PublicCardState, PublicState,
};
pub use error::{Error, Result};
pub use inventory::Inventory;
pub use validate::{validate_room_spec, CreateRoomFailure};
