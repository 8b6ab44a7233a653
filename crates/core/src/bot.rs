//! Bot players - autonomous pickers filling empty seats.
//!
//! Strategies are deliberately tiny: the room hands a strategy the cards it
//! can choose from and the room's random source, and the strategy answers
//! with an index. Picks must be synchronous and cheap; they run inline in
//! the room's event handling.

use rand::rngs::StdRng;
use rand::Rng;

use crate::card::Card;

/// A pick strategy for a bot-occupied chair.
pub trait BotStrategy: Send {
    /// Display name used in rosters, e.g. "bot 3".
    fn name(&self) -> &str;

    /// Choose a card index from a non-empty pack.
    fn choose(&mut self, cards: &[Card], rng: &mut StdRng) -> usize;
}

/// The default strategy: picks uniformly at random.
pub struct RandomPicker {
    name: String,
}

impl RandomPicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl BotStrategy for RandomPicker {
    fn name(&self) -> &str {
        &self.name
    }

    fn choose(&mut self, cards: &[Card], rng: &mut StdRng) -> usize {
        rng.gen_range(0..cards.len())
    }
}
