//! The draft engine - the state machine of one drafting session.
//!
//! Owns per-seat pack queues, selection timers, auto-pick hints, the grid
//! public state, and the post-round timer. All operations are synchronous;
//! the engine records what happened as `DraftEvent`s which the owning room
//! drains with `take_events()` and translates into client broadcasts. The
//! engine never blocks and never does I/O.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::card::{Card, PackId};
use crate::config::{DispenseQuantity, DraftConfig, PassDirection, RoundConfig};
use crate::dispenser::CardDispenser;

/// Number of cards in a grid round's public pack.
pub const GRID_PACK_SIZE: usize = 9;

/// Timer value meaning "no timer running" for a seat.
pub const TICKS_DISABLED: i32 = -1;

/// Lifecycle of a draft. Advances monotonically; `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    New,
    Running,
    Complete,
    Error,
}

/// A pack owned by one seat's queue.
#[derive(Debug, Clone)]
pub struct Pack {
    pub id: PackId,
    pub cards: Vec<Card>,
    pub round: usize,
}

/// One face-up card of a grid round's public pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicCardState {
    pub card: Card,
    /// Chair that took the card, -1 while unselected.
    pub selected_chair: i32,
    /// Monotone selection order within the round, -1 while unselected.
    pub selected_order: i32,
}

impl PublicCardState {
    fn unselected(card: Card) -> Self {
        Self {
            card,
            selected_chair: -1,
            selected_order: -1,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected_chair >= 0
    }
}

/// Snapshot of a grid round's public state.
#[derive(Debug, Clone)]
pub struct PublicState {
    pub pack_id: PackId,
    pub card_states: Vec<PublicCardState>,
    pub active_chair: usize,
}

/// What happened inside the engine, in order. Drained by the owning room.
#[derive(Debug, Clone)]
pub enum DraftEvent {
    /// A round began. Fired before the round's dispensations.
    RoundBegan { round: usize },
    /// A pack reached the head of a seat's queue; its selection timer was
    /// (re)set.
    PackAvailable {
        chair: usize,
        pack_id: PackId,
        cards: Vec<Card>,
    },
    /// A seat's queue length changed.
    PackQueueChanged { chair: usize, queue_size: usize },
    /// The selection timer expired and the engine picked for the seat.
    AutoPicked {
        chair: usize,
        pack_id: PackId,
        card: Card,
    },
    /// A sealed dispensation delivered a whole pack to the seat.
    SealedDealt { chair: usize, cards: Vec<Card> },
    /// The grid public state changed (new pack or a selection).
    PublicStateChanged,
    /// All of the round's cards are drained; the grace timer started.
    PostRoundTimerStarted { round: usize, ticks_remaining: u32 },
    /// The final round drained; no packs will ever be dispensed again.
    DraftComplete,
    /// A dispenser failed; the draft is dead.
    DraftError,
}

/// Why a pick was refused. Non-fatal: the engine state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("draft is not running")]
    DraftNotRunning,
    #[error("chair index out of range")]
    BadChair,
    #[error("seat has no queued pack")]
    NoSuchPack,
    #[error("pack id does not match the head pack")]
    WrongPack,
    #[error("card is not in the pack")]
    CardNotInPack,
    #[error("it is not this seat's turn")]
    WrongSeat,
}

struct GridState {
    pack_id: PackId,
    cards: Vec<PublicCardState>,
    active_chair: usize,
    next_order: i32,
}

pub struct DraftEngine {
    config: DraftConfig,
    dispensers: Vec<CardDispenser>,
    rng: StdRng,

    state: DraftState,
    current_round: usize,
    queues: Vec<VecDeque<Pack>>,
    /// Per-seat selection timer; `TICKS_DISABLED` when no timer runs.
    ticks_remaining: Vec<i32>,
    /// Most recently highlighted card per seat, tagged with the pack it
    /// was highlighted in.
    auto_pick_hints: Vec<Option<(PackId, Card)>>,
    grid: Option<GridState>,
    post_round_ticks: Option<u32>,
    next_pack_id: u32,
    events: Vec<DraftEvent>,
}

impl DraftEngine {
    /// Build an engine from a validated config. `dispensers` must cover
    /// every index the config references.
    pub fn new(config: DraftConfig, dispensers: Vec<CardDispenser>, rng: StdRng) -> Self {
        let chairs = config.chair_count;
        Self {
            config,
            dispensers,
            rng,
            state: DraftState::New,
            current_round: 0,
            queues: (0..chairs).map(|_| VecDeque::new()).collect(),
            ticks_remaining: vec![TICKS_DISABLED; chairs],
            auto_pick_hints: vec![None; chairs],
            grid: None,
            post_round_ticks: None,
            next_pack_id: 0,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn chair_count(&self) -> usize {
        self.config.chair_count
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn round_count(&self) -> usize {
        self.config.rounds.len()
    }

    pub fn is_booster_round(&self) -> bool {
        self.state == DraftState::Running && self.config.rounds[self.current_round].is_booster()
    }

    pub fn pack_queue_size(&self, chair: usize) -> usize {
        self.queues.get(chair).map(VecDeque::len).unwrap_or(0)
    }

    pub fn ticks_remaining(&self, chair: usize) -> i32 {
        self.ticks_remaining
            .get(chair)
            .copied()
            .unwrap_or(TICKS_DISABLED)
    }

    /// The pack at the head of a seat's queue, if any.
    pub fn current_pack(&self, chair: usize) -> Option<(PackId, &[Card])> {
        self.queues
            .get(chair)
            .and_then(VecDeque::front)
            .map(|p| (p.id, p.cards.as_slice()))
    }

    /// Grid rounds only: the public pack and turn state.
    pub fn public_state(&self) -> Option<PublicState> {
        self.grid.as_ref().map(|g| PublicState {
            pack_id: g.pack_id,
            card_states: g.cards.clone(),
            active_chair: g.active_chair,
        })
    }

    pub fn post_round_ticks_remaining(&self) -> Option<u32> {
        self.post_round_ticks
    }

    /// Drain the events recorded since the last call, in order.
    pub fn take_events(&mut self) -> Vec<DraftEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record the seat's highlighted card for timer-expiry auto-picks. The
    /// hint is honored only while the tagged pack is at the seat's head.
    pub fn set_auto_pick_hint(&mut self, chair: usize, pack_id: PackId, card: Card) {
        if let Some(slot) = self.auto_pick_hints.get_mut(chair) {
            *slot = Some((pack_id, card));
        }
    }

    /// Start the draft. Valid only in `New`.
    pub fn start(&mut self) {
        if self.state != DraftState::New {
            warn!(state = ?self.state, "start called on a non-new draft");
            return;
        }
        self.state = DraftState::Running;
        self.begin_round(0);
    }

    /// Advance wall-clock time by one second: seat selection timers, then
    /// the post-round grace timer.
    pub fn tick(&mut self) {
        if self.state != DraftState::Running {
            return;
        }

        // A post-round timer armed by an auto-pick below must not lose a
        // tick it never saw.
        let post_round_was_active = self.post_round_ticks.is_some();

        if self.is_booster_round() {
            for chair in 0..self.config.chair_count {
                if self.ticks_remaining[chair] > 0 {
                    self.ticks_remaining[chair] -= 1;
                    if self.ticks_remaining[chair] == 0 {
                        self.auto_pick(chair);
                        if self.state != DraftState::Running {
                            return;
                        }
                    }
                }
            }
        }

        if post_round_was_active {
            if let Some(ticks) = self.post_round_ticks {
                let ticks = ticks.saturating_sub(1);
                if ticks == 0 {
                    self.post_round_ticks = None;
                    self.advance_round();
                } else {
                    self.post_round_ticks = Some(ticks);
                }
            }
        }
    }

    /// Take `card` from the pack `pack_id` at the head of `chair`'s queue
    /// (or from the public grid pack). On success the residual pack passes
    /// or retires and the caller delivers the card to the player.
    pub fn pick(&mut self, chair: usize, pack_id: PackId, card: &Card) -> Result<(), PickError> {
        if self.state != DraftState::Running {
            return Err(PickError::DraftNotRunning);
        }
        if chair >= self.config.chair_count {
            return Err(PickError::BadChair);
        }
        if matches!(self.config.rounds[self.current_round], RoundConfig::Grid { .. }) {
            return self.grid_pick(chair, pack_id, card);
        }

        let head = self.queues[chair].front().ok_or(PickError::NoSuchPack)?;
        if head.id != pack_id {
            return Err(PickError::WrongPack);
        }
        let position = head
            .cards
            .iter()
            .position(|c| c == card)
            .ok_or(PickError::CardNotInPack)?;

        let mut pack = self.queues[chair].pop_front().expect("head pack present");
        pack.cards.remove(position);
        debug!(chair, pack_id = %pack.id, card = %card, "card picked");

        self.push_event(DraftEvent::PackQueueChanged {
            chair,
            queue_size: self.queues[chair].len(),
        });
        if self.queues[chair].is_empty() {
            self.ticks_remaining[chair] = TICKS_DISABLED;
        } else {
            self.head_arrived(chair);
        }

        if pack.cards.is_empty() {
            debug!(pack_id = %pack.id, "pack exhausted, retiring");
        } else {
            let neighbor = self.neighbor_of(chair);
            self.append_pack(neighbor, pack);
        }

        self.check_round_complete();
        Ok(())
    }

    fn grid_pick(&mut self, chair: usize, pack_id: PackId, card: &Card) -> Result<(), PickError> {
        let grid = self.grid.as_mut().ok_or(PickError::NoSuchPack)?;
        if chair != grid.active_chair {
            return Err(PickError::WrongSeat);
        }
        if pack_id != grid.pack_id {
            return Err(PickError::WrongPack);
        }
        let state = grid
            .cards
            .iter_mut()
            .find(|cs| !cs.is_selected() && &cs.card == card)
            .ok_or(PickError::CardNotInPack)?;

        state.selected_chair = chair as i32;
        state.selected_order = grid.next_order;
        grid.next_order += 1;
        grid.active_chair = (grid.active_chair + 1) % self.config.chair_count;
        debug!(chair, card = %card, "grid card selected");

        self.push_event(DraftEvent::PublicStateChanged);
        self.check_round_complete();
        Ok(())
    }

    fn auto_pick(&mut self, chair: usize) {
        let Some((pack_id, head_cards)) = self.current_pack(chair) else {
            warn!(chair, "selection timer expired with no head pack");
            self.ticks_remaining[chair] = TICKS_DISABLED;
            return;
        };

        // Honor the hint only if it names a card still in the head pack.
        let hinted = self.auto_pick_hints[chair]
            .as_ref()
            .filter(|(hint_pack, hint_card)| {
                *hint_pack == pack_id && head_cards.contains(hint_card)
            })
            .map(|(_, hint_card)| hint_card.clone());
        let card = hinted.unwrap_or_else(|| head_cards[0].clone());

        self.push_event(DraftEvent::AutoPicked {
            chair,
            pack_id,
            card: card.clone(),
        });
        let result = self.pick(chair, pack_id, &card);
        debug_assert!(result.is_ok(), "auto-pick failed: {result:?}");
    }

    fn begin_round(&mut self, round: usize) {
        self.current_round = round;
        self.grid = None;
        self.push_event(DraftEvent::RoundBegan { round });
        debug!(round, "round began");

        match self.config.rounds[round].clone() {
            RoundConfig::Booster { dispensations, .. } => {
                for d in &dispensations {
                    let Some(quantity) = self.resolve_quantity(&d.quantity, d.dispenser_index)
                    else {
                        self.fail_draft();
                        return;
                    };
                    for &chair in &d.chair_indices {
                        let cards = self.dispensers[d.dispenser_index]
                            .dispense(quantity, &mut self.rng);
                        if cards.len() != quantity {
                            warn!(
                                chair,
                                requested = quantity,
                                got = cards.len(),
                                "dispenser shortfall"
                            );
                            self.fail_draft();
                            return;
                        }
                        let pack = Pack {
                            id: self.fresh_pack_id(),
                            cards,
                            round,
                        };
                        self.append_pack(chair, pack);
                    }
                }
            }
            RoundConfig::Sealed { dispensations } => {
                for d in &dispensations {
                    let Some(quantity) = self.resolve_quantity(&d.quantity, d.dispenser_index)
                    else {
                        self.fail_draft();
                        return;
                    };
                    for &chair in &d.chair_indices {
                        let cards = self.dispensers[d.dispenser_index]
                            .dispense(quantity, &mut self.rng);
                        if cards.len() != quantity {
                            warn!(
                                chair,
                                requested = quantity,
                                got = cards.len(),
                                "dispenser shortfall"
                            );
                            self.fail_draft();
                            return;
                        }
                        self.push_event(DraftEvent::SealedDealt { chair, cards });
                    }
                }
                // Sealed rounds drain instantly: nothing is queued.
                self.round_finished();
            }
            RoundConfig::Grid { dispenser_index } => {
                let cards = self.dispensers[dispenser_index].dispense(GRID_PACK_SIZE, &mut self.rng);
                if cards.len() != GRID_PACK_SIZE {
                    warn!(got = cards.len(), "grid dispenser shortfall");
                    self.fail_draft();
                    return;
                }
                let pack_id = self.fresh_pack_id();
                self.grid = Some(GridState {
                    pack_id,
                    cards: cards.into_iter().map(PublicCardState::unselected).collect(),
                    active_chair: round % self.config.chair_count,
                    next_order: 0,
                });
                self.push_event(DraftEvent::PublicStateChanged);
            }
        }
    }

    fn resolve_quantity(
        &self,
        quantity: &DispenseQuantity,
        dispenser_index: usize,
    ) -> Option<usize> {
        match quantity {
            DispenseQuantity::Count(n) => Some(*n as usize),
            DispenseQuantity::All => {
                let pool = self.dispensers[dispenser_index].pool_size();
                if pool > 0 {
                    Some(pool as usize)
                } else {
                    warn!(dispenser_index, "dispense-all from an unbounded pool");
                    None
                }
            }
        }
    }

    fn append_pack(&mut self, chair: usize, pack: Pack) {
        debug_assert_eq!(pack.round, self.current_round);
        self.queues[chair].push_back(pack);
        self.push_event(DraftEvent::PackQueueChanged {
            chair,
            queue_size: self.queues[chair].len(),
        });
        if self.queues[chair].len() == 1 {
            self.head_arrived(chair);
        }
    }

    /// A pack just became the head of `chair`'s queue: reset the selection
    /// timer and announce the pack.
    fn head_arrived(&mut self, chair: usize) {
        let selection_time = match &self.config.rounds[self.current_round] {
            RoundConfig::Booster {
                selection_time_secs,
                ..
            } if *selection_time_secs > 0 => *selection_time_secs as i32,
            _ => TICKS_DISABLED,
        };
        self.ticks_remaining[chair] = selection_time;

        let (pack_id, cards) = self
            .current_pack(chair)
            .map(|(id, cards)| (id, cards.to_vec()))
            .expect("head pack present");
        self.push_event(DraftEvent::PackAvailable {
            chair,
            pack_id,
            cards,
        });
    }

    fn neighbor_of(&self, chair: usize) -> usize {
        let n = self.config.chair_count;
        match &self.config.rounds[self.current_round] {
            RoundConfig::Booster {
                pass_direction: PassDirection::Clockwise,
                ..
            } => (chair + 1) % n,
            RoundConfig::Booster {
                pass_direction: PassDirection::CounterClockwise,
                ..
            } => (chair + n - 1) % n,
            _ => (chair + 1) % n,
        }
    }

    fn check_round_complete(&mut self) {
        if self.state != DraftState::Running {
            return;
        }
        let complete = match &self.config.rounds[self.current_round] {
            RoundConfig::Grid { .. } => self
                .grid
                .as_ref()
                .map(|g| g.cards.iter().all(PublicCardState::is_selected))
                .unwrap_or(false),
            _ => self.queues.iter().all(VecDeque::is_empty),
        };
        if complete {
            // Unselected grid leftovers would be retired here; queue packs
            // retire at their last pick.
            self.round_finished();
        }
    }

    fn round_finished(&mut self) {
        let grace = self.config.post_round_timer_secs;
        if grace > 0 {
            self.post_round_ticks = Some(grace);
            self.push_event(DraftEvent::PostRoundTimerStarted {
                round: self.current_round,
                ticks_remaining: grace,
            });
        } else {
            self.advance_round();
        }
    }

    fn advance_round(&mut self) {
        let next = self.current_round + 1;
        if next >= self.config.rounds.len() {
            self.state = DraftState::Complete;
            self.grid = None;
            debug!("draft complete");
            self.push_event(DraftEvent::DraftComplete);
        } else {
            self.begin_round(next);
        }
    }

    fn fail_draft(&mut self) {
        warn!("draft entering terminal error state");
        self.state = DraftState::Error;
        for queue in &mut self.queues {
            queue.clear();
        }
        self.ticks_remaining.fill(TICKS_DISABLED);
        self.grid = None;
        self.post_round_ticks = None;
        self.push_event(DraftEvent::DraftError);
    }

    fn fresh_pack_id(&mut self) -> PackId {
        let id = PackId(self.next_pack_id);
        self.next_pack_id += 1;
        id
    }

    fn push_event(&mut self, event: DraftEvent) {
        self.events.push(event);
    }

    pub(crate) fn queues(&self) -> &[VecDeque<Pack>] {
        &self.queues
    }

    pub(crate) fn ticks(&self) -> &[i32] {
        &self.ticks_remaining
    }

    pub(crate) fn grid_orders(&self) -> Vec<i32> {
        self.grid
            .as_ref()
            .map(|g| {
                g.cards
                    .iter()
                    .filter(|c| c.is_selected())
                    .map(|c| c.selected_order)
                    .collect()
            })
            .unwrap_or_default()
    }
}
