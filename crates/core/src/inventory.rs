//! A player's accumulated cards, split across inventory zones, plus the
//! canonical deck hash clients compare after a draft.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::card::{BasicLand, Card, Zone};

/// Length of the hex deck hash.
const DECK_HASH_LEN: usize = 16;

/// Zone-indexed card inventory for one seat.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    cards: Vec<(Card, Zone)>,
    basic_lands: BTreeMap<(BasicLand, Zone), u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, card: Card, zone: Zone) {
        self.cards.push((card, zone));
    }

    /// Move one copy of `card` from one zone to another. Returns false if
    /// no copy exists in the source zone.
    pub fn move_card(&mut self, card: &Card, from: Zone, to: Zone) -> bool {
        match self
            .cards
            .iter()
            .position(|(c, z)| c == card && *z == from)
        {
            Some(index) => {
                self.cards[index].1 = to;
                true
            }
            None => false,
        }
    }

    pub fn set_basic_land(&mut self, land: BasicLand, zone: Zone, quantity: u32) {
        if quantity == 0 {
            self.basic_lands.remove(&(land, zone));
        } else {
            self.basic_lands.insert((land, zone), quantity);
        }
    }

    pub fn basic_land(&self, land: BasicLand, zone: Zone) -> u32 {
        self.basic_lands.get(&(land, zone)).copied().unwrap_or(0)
    }

    pub fn cards(&self) -> &[(Card, Zone)] {
        &self.cards
    }

    pub fn basic_lands(&self) -> impl Iterator<Item = (BasicLand, Zone, u32)> + '_ {
        self.basic_lands
            .iter()
            .map(|(&(land, zone), &qty)| (land, zone, qty))
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn zone_count(&self, zone: Zone) -> usize {
        self.cards.iter().filter(|(_, z)| *z == zone).count()
    }

    /// Canonical deck hash: sorted mainboard names plus `SB:`-prefixed
    /// sideboard names (basic lands expanded by quantity), SHA-256, first
    /// 16 hex chars. Junk and auto zones don't count toward the deck.
    pub fn deck_hash(&self) -> String {
        let mut entries: Vec<String> = Vec::new();
        for (card, zone) in &self.cards {
            match zone {
                Zone::Main => entries.push(card.name.to_lowercase()),
                Zone::Sideboard => entries.push(format!("SB:{}", card.name.to_lowercase())),
                Zone::Junk | Zone::Auto => {}
            }
        }
        for (&(land, zone), &qty) in &self.basic_lands {
            let entry = match zone {
                Zone::Main => land.card_name().to_lowercase(),
                Zone::Sideboard => format!("SB:{}", land.card_name().to_lowercase()),
                Zone::Junk | Zone::Auto => continue,
            };
            for _ in 0..qty {
                entries.push(entry.clone());
            }
        }
        entries.sort();

        let mut hasher = Sha256::new();
        hasher.update(entries.join(";").as_bytes());
        let digest = hasher.finalize();
        let hex = format!("{digest:x}");
        hex[..DECK_HASH_LEN].to_string()
    }
}
