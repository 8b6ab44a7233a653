//! Card dispensers - sources of draftable cards.
//!
//! A booster dispenser asks the card store for a random booster of one of
//! its set codes; a custom-list dispenser draws uniformly with replacement
//! from a precomputed expanded pool.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::card::Card;
use crate::cards::CardStore;
use crate::config::{CustomCardList, DispenserConfig};
use crate::error::{Error, Result};

/// Pool size reported by dispensers whose pool is unbounded.
pub const POOL_INFINITE: i64 = -1;

pub enum CardDispenser {
    Booster {
        set_codes: Vec<String>,
        store: Arc<CardStore>,
    },
    CustomList {
        /// The weighted multiset, expanded entry-by-entry.
        pool: Vec<Card>,
    },
}

impl CardDispenser {
    /// Build a booster dispenser. Set codes are assumed validated.
    pub fn booster(set_codes: Vec<String>, store: Arc<CardStore>) -> Result<Self> {
        if set_codes.is_empty() {
            return Err(Error::InvalidConfig("booster dispenser with no sets".into()));
        }
        Ok(CardDispenser::Booster { set_codes, store })
    }

    /// Build a custom-list dispenser, expanding the weighted multiset.
    /// Fails if the expanded pool is empty.
    pub fn custom_list(list: &CustomCardList) -> Result<Self> {
        let mut pool = Vec::new();
        for cq in &list.card_quantities {
            for _ in 0..cq.quantity {
                pool.push(cq.card.clone());
            }
        }
        if pool.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "custom card list '{}' is empty",
                list.name
            )));
        }
        Ok(CardDispenser::CustomList { pool })
    }

    /// Expanded pool size, or `POOL_INFINITE` for replacement dispensers.
    pub fn pool_size(&self) -> i64 {
        match self {
            CardDispenser::Booster { .. } => POOL_INFINITE,
            CardDispenser::CustomList { pool } => pool.len() as i64,
        }
    }

    /// Produce exactly `n` cards, or an empty vec on failure.
    pub fn dispense(&self, n: usize, rng: &mut StdRng) -> Vec<Card> {
        match self {
            CardDispenser::Booster { set_codes, store } => {
                let code = &set_codes[rng.gen_range(0..set_codes.len())];
                let mut cards = Vec::with_capacity(n);
                while cards.len() < n {
                    let booster = store.generate_booster(code, rng);
                    if booster.is_empty() {
                        return Vec::new();
                    }
                    cards.extend(booster);
                }
                cards.truncate(n);
                cards
            }
            CardDispenser::CustomList { pool } => (0..n)
                .map(|_| pool.choose(rng).cloned())
                .collect::<Option<Vec<Card>>>()
                .unwrap_or_default(),
        }
    }
}

/// Build the dispenser vector for a validated draft config.
pub fn build_dispensers(
    configs: &[DispenserConfig],
    custom_card_lists: &[CustomCardList],
    store: &Arc<CardStore>,
) -> Result<Vec<CardDispenser>> {
    configs
        .iter()
        .map(|cfg| match cfg.custom_card_list_index {
            Some(index) => {
                let list = custom_card_lists.get(index).ok_or_else(|| {
                    Error::InvalidConfig(format!("custom card list index {index} out of range"))
                })?;
                CardDispenser::custom_list(list)
            }
            None => CardDispenser::booster(cfg.booster_set_codes.clone(), store.clone()),
        })
        .collect()
}
