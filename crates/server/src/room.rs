//! A drafting room: seat roster, chair lifecycle, bots, expiration, and the
//! translation of draft-engine events into client broadcasts.
//!
//! The hub owns every room and calls into it from its event loop, so room
//! methods are plain synchronous mutations. Outbound traffic goes through
//! the `Outbox` the hub passes in.

use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use draftden_core::bot::{BotStrategy, RandomPicker};
use draftden_core::card::{Card, PackId, Zone};
use draftden_core::config::RoomSpec;
use draftden_core::engine::{DraftEngine, DraftEvent, DraftState};
use draftden_core::inventory::Inventory;

use draftden_net::protocol::{
    BasicLandQuantity, CardMove, ChairDeckInfo, ChairDraftState, ChatScope, DraftedCard,
    JoinRoomFailure, OccupantInfo, OccupantState, PublicCardInfo, RoomStage, RoomSummary,
    RoundInfo, ServerToClient,
};

use crate::connection::{ConnId, Outbox};

/// A room nobody has joined yet is torn down after this long.
pub const CREATED_ROOM_EXPIRATION: Duration = Duration::from_secs(10);

/// A mid-draft room whose last connection left is torn down after this long.
pub const ABANDONED_ROOM_EXPIRATION: Duration = Duration::from_secs(120);

/// Per-seat lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChairState {
    Empty,
    Standby,
    Ready,
    Active,
    Departed,
}

/// How a leave resolved, for hub bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Connection wasn't a member.
    NotMember,
    /// The seat went to Departed; the player can rejoin.
    Departed,
    /// The player was removed outright.
    Removed,
    /// The player was removed and the room is now unoccupied: tear it down.
    RemovedAndExpired,
}

struct HumanSeat {
    name: String,
    chair: usize,
    conn: Option<ConnId>,
    inventory: Inventory,
}

struct BotSeat {
    chair: usize,
    strategy: Box<dyn BotStrategy>,
    pool: Vec<Card>,
}

pub struct Room {
    id: u32,
    spec: RoomSpec,
    engine: DraftEngine,
    chair_states: Vec<ChairState>,
    humans: Vec<HumanSeat>,
    bots: Vec<BotSeat>,
    bot_rng: StdRng,

    draft_running: bool,
    draft_complete: bool,
    fatal_error: bool,
    expires_at: Option<Instant>,
    dirty_draft_state: bool,
}

impl Room {
    /// Create a room and seat its bots. The expiration timer starts armed:
    /// if nobody joins within the grace period the hub tears the room down.
    pub fn new(id: u32, spec: RoomSpec, engine: DraftEngine, now: Instant) -> Self {
        let chair_count = spec.draft_config.chair_count;
        let mut room = Self {
            id,
            spec,
            engine,
            chair_states: vec![ChairState::Empty; chair_count],
            humans: Vec::new(),
            bots: Vec::new(),
            bot_rng: StdRng::from_entropy(),
            draft_running: false,
            draft_complete: false,
            fatal_error: false,
            expires_at: Some(now + CREATED_ROOM_EXPIRATION),
            dirty_draft_state: false,
        };

        // Seat bots in every other chair to spread humans out, wrapping to
        // the odd chairs once the even ones run out.
        let mut chair = 0;
        for i in 0..room.spec.bot_count.min(chair_count) {
            debug!(room = id, chair, "seating bot");
            room.bots.push(BotSeat {
                chair,
                strategy: Box::new(RandomPicker::new(format!("bot{}", i + 1))),
                pool: Vec::new(),
            });
            room.chair_states[chair] = ChairState::Ready;
            chair += 2;
            if chair >= chair_count {
                chair = 1;
            }
        }

        room
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn player_count(&self) -> usize {
        self.humans.len() + self.bots.len()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id,
            player_count: self.player_count(),
            room_config: self.spec.abridged(),
        }
    }

    pub fn conn_ids(&self) -> Vec<ConnId> {
        self.humans.iter().filter_map(|h| h.conn).collect()
    }

    pub fn has_connections(&self) -> bool {
        self.humans.iter().any(|h| h.conn.is_some())
    }

    pub fn draft_armed(&self) -> bool {
        self.draft_running
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    pub fn take_fatal_error(&mut self) -> bool {
        std::mem::take(&mut self.fatal_error)
    }

    /// Join (or rejoin) the room. On success the caller records the
    /// connection's room membership; all client messages are sent here.
    pub fn join(
        &mut self,
        out: &mut Outbox<'_>,
        conn: ConnId,
        name: &str,
        password: Option<&str>,
    ) -> Result<usize, JoinRoomFailure> {
        // A name already seated here means this is a rejoin attempt.
        if let Some(idx) = self.humans.iter().position(|h| h.name == name) {
            return self.rejoin(out, conn, idx);
        }

        if self.spec.has_password()
            && password.unwrap_or("") != self.spec.password.as_deref().unwrap_or("")
        {
            out.send(
                conn,
                ServerToClient::JoinRoomFailureRsp {
                    result: JoinRoomFailure::InvalidPassword,
                    room_id: self.id,
                },
            );
            return Err(JoinRoomFailure::InvalidPassword);
        }

        let Some(chair) = self
            .chair_states
            .iter()
            .position(|&s| s == ChairState::Empty)
        else {
            out.send(
                conn,
                ServerToClient::JoinRoomFailureRsp {
                    result: JoinRoomFailure::RoomFull,
                    room_id: self.id,
                },
            );
            return Err(JoinRoomFailure::RoomFull);
        };

        info!(room = self.id, name, chair, "player joined");
        self.humans.push(HumanSeat {
            name: name.to_string(),
            chair,
            conn: Some(conn),
            inventory: Inventory::new(),
        });
        self.chair_states[chair] = ChairState::Standby;

        // An occupied room doesn't expire.
        self.expires_at = None;

        out.send(
            conn,
            ServerToClient::JoinRoomSuccessRspInd {
                room_id: self.id,
                rejoin: false,
                chair_idx: chair,
                room_config: self.spec.clone(),
            },
        );
        self.broadcast_occupants(out);
        Ok(chair)
    }

    fn rejoin(
        &mut self,
        out: &mut Outbox<'_>,
        conn: ConnId,
        idx: usize,
    ) -> Result<usize, JoinRoomFailure> {
        let chair = self.humans[idx].chair;
        if self.chair_states[chair] != ChairState::Departed {
            warn!(room = self.id, chair, "rejoin for a seat that never departed");
            out.send(
                conn,
                ServerToClient::JoinRoomFailureRsp {
                    result: JoinRoomFailure::NotDeparted,
                    room_id: self.id,
                },
            );
            return Err(JoinRoomFailure::NotDeparted);
        }

        info!(room = self.id, chair, "player rejoined");
        self.humans[idx].conn = Some(conn);
        self.chair_states[chair] = ChairState::Active;
        self.expires_at = None;

        out.send(
            conn,
            ServerToClient::JoinRoomSuccessRspInd {
                room_id: self.id,
                rejoin: true,
                chair_idx: chair,
                room_config: self.spec.clone(),
            },
        );
        self.broadcast_occupants(out);

        // Replay the full client state: inventory, current pack, stage,
        // public state, and (post-draft) the deck hashes.
        self.send_inventory(out, idx);

        if self.engine.state() == DraftState::Running {
            if let Some((pack_id, cards)) = self.engine.current_pack(chair) {
                let msg = ServerToClient::PlayerCurrentPackInd {
                    pack_id,
                    cards: cards.to_vec(),
                };
                out.send(conn, msg);
            }
        }

        let stage = match self.engine.state() {
            DraftState::New => ServerToClient::RoomStageInd {
                stage: RoomStage::New,
                round_info: None,
            },
            DraftState::Running => ServerToClient::RoomStageInd {
                stage: RoomStage::Running,
                round_info: Some(RoundInfo {
                    round: self.engine.current_round(),
                    post_round_time_remaining_millis: self
                        .engine
                        .post_round_ticks_remaining()
                        .map(|ticks| post_round_millis(ticks, out.millis_until_next_sec)),
                }),
            },
            DraftState::Complete | DraftState::Error => ServerToClient::RoomStageInd {
                stage: RoomStage::Complete,
                round_info: None,
            },
        };
        out.send(conn, stage);

        if self.engine.state() == DraftState::Running {
            self.send_public_state(out, &[conn]);
        }

        if self.draft_complete {
            let msg = self.deck_info_message((0..self.humans.len()).collect());
            out.send(conn, msg);
        }

        Ok(chair)
    }

    /// Handle a departure (explicit or via disconnect). Mid-draft seats are
    /// preserved for rejoin; otherwise the seat empties.
    pub fn leave(&mut self, out: &mut Outbox<'_>, conn: ConnId, now: Instant) -> LeaveOutcome {
        let Some(idx) = self.humans.iter().position(|h| h.conn == Some(conn)) else {
            warn!(room = self.id, "leave from a connection that isn't a member");
            return LeaveOutcome::NotMember;
        };

        let chair = self.humans[idx].chair;
        self.humans[idx].conn = None;

        let outcome = if self.chair_states[chair] == ChairState::Active {
            // Keep the seat and its inventory for a same-name rejoin.
            info!(room = self.id, chair, "player departed mid-draft");
            self.chair_states[chair] = ChairState::Departed;
            if !self.has_connections() {
                debug!(room = self.id, "room abandoned, arming expiration");
                self.expires_at = Some(now + ABANDONED_ROOM_EXPIRATION);
            }
            LeaveOutcome::Departed
        } else {
            info!(room = self.id, chair, "player left");
            self.humans.remove(idx);
            self.chair_states[chair] = ChairState::Empty;
            if !self.has_connections() {
                LeaveOutcome::RemovedAndExpired
            } else {
                LeaveOutcome::Removed
            }
        };

        self.broadcast_occupants(out);
        outcome
    }

    /// Ready/unready toggle. When the last seat goes ready the room flips
    /// every chair to Active and the draft starts.
    pub fn handle_ready(&mut self, out: &mut Outbox<'_>, conn: ConnId, ready: bool) {
        let Some(idx) = self.humans.iter().position(|h| h.conn == Some(conn)) else {
            return;
        };
        let chair = self.humans[idx].chair;

        let mut start_draft = false;
        match (self.chair_states[chair], ready) {
            (ChairState::Ready, false) => {
                debug!(room = self.id, chair, "seat back to standby");
                self.chair_states[chair] = ChairState::Standby;
            }
            (ChairState::Standby, true) => {
                debug!(room = self.id, chair, "seat ready");
                self.chair_states[chair] = ChairState::Ready;

                if self.chair_states.iter().all(|&s| s == ChairState::Ready) {
                    for state in &mut self.chair_states {
                        *state = ChairState::Active;
                    }
                    start_draft = true;
                }
            }
            // Repeats and out-of-phase toggles are no-ops.
            _ => {}
        }

        self.broadcast_occupants(out);

        if start_draft {
            info!(room = self.id, "all seats ready, starting the draft");
            self.draft_running = true;
            self.engine.start();
            self.drain_engine(out);
            self.flush_draft_state(out);
        }
    }

    pub fn handle_pick(
        &mut self,
        out: &mut Outbox<'_>,
        conn: ConnId,
        pack_id: PackId,
        card: Card,
        zone: Zone,
    ) {
        let Some(idx) = self.humans.iter().position(|h| h.conn == Some(conn)) else {
            return;
        };
        let chair = self.humans[idx].chair;

        let result = self.engine.pick(chair, pack_id, &card);
        if let Err(e) = &result {
            debug!(room = self.id, chair, error = %e, "pick refused");
        }
        out.send(
            conn,
            ServerToClient::PlayerCardSelectionRsp {
                result: result.is_ok(),
                pack_id,
                card: card.clone(),
            },
        );
        if result.is_ok() {
            self.humans[idx].inventory.add(card, zone);
        }
        self.drain_engine(out);
    }

    pub fn handle_auto_pick_hint(&mut self, conn: ConnId, pack_id: PackId, card: Card) {
        if let Some(h) = self.humans.iter().find(|h| h.conn == Some(conn)) {
            self.engine.set_auto_pick_hint(h.chair, pack_id, card);
        }
    }

    /// Apply client-requested inventory mutations. Individually invalid
    /// moves are ignored; the server's record stays authoritative.
    pub fn handle_inventory_update(
        &mut self,
        out: &mut Outbox<'_>,
        conn: ConnId,
        moves: Vec<CardMove>,
        basic_lands: Vec<BasicLandQuantity>,
    ) {
        let Some(idx) = self.humans.iter().position(|h| h.conn == Some(conn)) else {
            return;
        };

        let inventory = &mut self.humans[idx].inventory;
        for m in &moves {
            if !inventory.move_card(&m.card, m.from, m.to) {
                debug!(room = self.id, card = %m.card, "ignoring invalid move");
            }
        }
        for l in &basic_lands {
            inventory.set_basic_land(l.land, l.zone, l.quantity);
        }

        // Hashes are secret while the draft runs; afterwards every change
        // is public.
        if self.draft_complete {
            let msg = self.deck_info_message(vec![idx]);
            self.broadcast(out, msg);
        }
    }

    pub fn handle_chat(&mut self, out: &mut Outbox<'_>, sender: &str, text: String) {
        let msg = ServerToClient::ChatMessageDeliveryInd {
            sender: sender.to_string(),
            scope: ChatScope::Room,
            text,
            timestamp: Utc::now(),
        };
        self.broadcast(out, msg);
    }

    /// One second of wall-clock time for the draft.
    pub fn tick(&mut self, out: &mut Outbox<'_>) {
        if !self.draft_running {
            return;
        }
        self.engine.tick();
        self.drain_engine(out);
        if self.engine.is_booster_round() {
            self.dirty_draft_state = true;
        }
        self.flush_draft_state(out);
    }

    /// Send the coalesced per-seat draft state if anything changed since
    /// the last flush. At most one broadcast per handled event.
    pub fn flush_draft_state(&mut self, out: &mut Outbox<'_>) {
        if !self.dirty_draft_state {
            return;
        }
        self.dirty_draft_state = false;

        if !self.engine.is_booster_round() {
            return;
        }
        let chairs = (0..self.engine.chair_count())
            .map(|chair| ChairDraftState {
                chair_index: chair,
                queued_packs: self.engine.pack_queue_size(chair),
                time_remaining: self.engine.ticks_remaining(chair),
            })
            .collect();
        let msg = ServerToClient::BoosterDraftStateInd {
            millis_until_next_sec: out.millis_until_next_sec,
            chairs,
        };
        self.broadcast(out, msg);
    }

    fn drain_engine(&mut self, out: &mut Outbox<'_>) {
        loop {
            let events = self.engine.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.apply_event(out, event);
            }
        }
    }

    fn apply_event(&mut self, out: &mut Outbox<'_>, event: DraftEvent) {
        match event {
            DraftEvent::RoundBegan { round } => {
                // Queue-change state from the previous round goes out
                // before the stage advances.
                self.flush_draft_state(out);
                let msg = ServerToClient::RoomStageInd {
                    stage: RoomStage::Running,
                    round_info: Some(RoundInfo {
                        round,
                        post_round_time_remaining_millis: None,
                    }),
                };
                self.broadcast(out, msg);
            }
            DraftEvent::PackAvailable {
                chair,
                pack_id,
                cards,
            } => {
                if let Some(conn) = self.human_conn_at(chair) {
                    out.send(
                        conn,
                        ServerToClient::PlayerCurrentPackInd {
                            pack_id,
                            cards: cards.clone(),
                        },
                    );
                }
                if let Some(bot_idx) = self.bots.iter().position(|b| b.chair == chair) {
                    let choice = self.bots[bot_idx].strategy.choose(&cards, &mut self.bot_rng);
                    let card = cards[choice].clone();
                    if self.engine.pick(chair, pack_id, &card).is_ok() {
                        self.bots[bot_idx].pool.push(card);
                    }
                }
            }
            DraftEvent::PackQueueChanged { .. } => {
                self.dirty_draft_state = true;
            }
            DraftEvent::AutoPicked {
                chair,
                pack_id,
                card,
            } => {
                if let Some(idx) = self.human_index_at(chair) {
                    self.humans[idx].inventory.add(card.clone(), Zone::Auto);
                    if let Some(conn) = self.humans[idx].conn {
                        out.send(
                            conn,
                            ServerToClient::PlayerAutoCardSelectionInd { pack_id, card },
                        );
                    }
                } else if let Some(bot_idx) = self.bots.iter().position(|b| b.chair == chair) {
                    self.bots[bot_idx].pool.push(card);
                }
            }
            DraftEvent::SealedDealt { chair, cards } => {
                if let Some(idx) = self.human_index_at(chair) {
                    for card in cards {
                        self.humans[idx].inventory.add(card, Zone::Auto);
                    }
                    self.send_inventory(out, idx);
                } else if let Some(bot_idx) = self.bots.iter().position(|b| b.chair == chair) {
                    self.bots[bot_idx].pool.extend(cards);
                }
            }
            DraftEvent::PublicStateChanged => {
                let conns = self.conn_ids();
                self.send_public_state(out, &conns);
            }
            DraftEvent::PostRoundTimerStarted {
                round,
                ticks_remaining,
            } => {
                self.flush_draft_state(out);
                let msg = ServerToClient::RoomStageInd {
                    stage: RoomStage::Running,
                    round_info: Some(RoundInfo {
                        round,
                        post_round_time_remaining_millis: Some(post_round_millis(
                            ticks_remaining,
                            out.millis_until_next_sec,
                        )),
                    }),
                };
                self.broadcast(out, msg);
            }
            DraftEvent::DraftComplete => {
                info!(room = self.id, "draft complete");
                self.flush_draft_state(out);
                self.draft_running = false;
                self.draft_complete = true;
                let msg = ServerToClient::RoomStageInd {
                    stage: RoomStage::Complete,
                    round_info: None,
                };
                self.broadcast(out, msg);
                let msg = self.deck_info_message((0..self.humans.len()).collect());
                self.broadcast(out, msg);
            }
            DraftEvent::DraftError => {
                warn!(room = self.id, "draft error, room is dead");
                self.draft_running = false;
                self.fatal_error = true;
                self.broadcast(out, ServerToClient::RoomErrorInd {});
            }
        }
    }

    pub fn broadcast_occupants(&mut self, out: &mut Outbox<'_>) {
        let players: Vec<OccupantInfo> = (0..self.chair_states.len())
            .filter_map(|chair| {
                let state = match self.chair_states[chair] {
                    ChairState::Empty => return None,
                    ChairState::Standby => OccupantState::Standby,
                    ChairState::Ready => OccupantState::Ready,
                    ChairState::Active => OccupantState::Active,
                    ChairState::Departed => OccupantState::Departed,
                };
                let (name, is_bot) = self.occupant_name(chair)?;
                Some(OccupantInfo {
                    chair_index: chair,
                    name,
                    is_bot,
                    state,
                })
            })
            .collect();
        let msg = ServerToClient::RoomOccupantsInfoInd {
            room_id: self.id,
            players,
        };
        self.broadcast(out, msg);
    }

    fn occupant_name(&self, chair: usize) -> Option<(String, bool)> {
        if let Some(h) = self.humans.iter().find(|h| h.chair == chair) {
            return Some((h.name.clone(), false));
        }
        self.bots
            .iter()
            .find(|b| b.chair == chair)
            .map(|b| (b.strategy.name().to_string(), true))
    }

    fn send_public_state(&self, out: &mut Outbox<'_>, conns: &[ConnId]) {
        let Some(public) = self.engine.public_state() else {
            return;
        };
        let msg = ServerToClient::PublicStateInd {
            pack_id: public.pack_id,
            card_states: public
                .card_states
                .iter()
                .map(|cs| PublicCardInfo {
                    card: cs.card.clone(),
                    selected_chair_index: cs.selected_chair,
                    selected_order: cs.selected_order,
                })
                .collect(),
            active_chair_index: public.active_chair,
            time_remaining_secs: self.engine.ticks_remaining(public.active_chair),
            millis_until_next_sec: out.millis_until_next_sec,
        };
        out.broadcast(conns, &msg);
    }

    fn send_inventory(&self, out: &mut Outbox<'_>, idx: usize) {
        let Some(conn) = self.humans[idx].conn else {
            return;
        };
        let inventory = &self.humans[idx].inventory;
        let msg = ServerToClient::PlayerInventoryInd {
            drafted_cards: inventory
                .cards()
                .iter()
                .map(|(card, zone)| DraftedCard {
                    card: card.clone(),
                    zone: *zone,
                })
                .collect(),
            basic_lands: inventory
                .basic_lands()
                .map(|(land, zone, quantity)| BasicLandQuantity {
                    land,
                    zone,
                    quantity,
                })
                .collect(),
        };
        out.send(conn, msg);
    }

    fn deck_info_message(&self, human_indices: Vec<usize>) -> ServerToClient {
        ServerToClient::RoomChairsDeckInfoInd {
            chairs: human_indices
                .into_iter()
                .map(|idx| ChairDeckInfo {
                    chair_index: self.humans[idx].chair,
                    deck_hash: self.humans[idx].inventory.deck_hash(),
                })
                .collect(),
        }
    }

    fn broadcast(&self, out: &mut Outbox<'_>, msg: ServerToClient) {
        let conns = self.conn_ids();
        out.broadcast(&conns, &msg);
    }

    fn human_index_at(&self, chair: usize) -> Option<usize> {
        self.humans.iter().position(|h| h.chair == chair)
    }

    fn human_conn_at(&self, chair: usize) -> Option<ConnId> {
        self.humans
            .iter()
            .find(|h| h.chair == chair)
            .and_then(|h| h.conn)
    }

    #[cfg(test)]
    pub(crate) fn chair_state(&self, chair: usize) -> ChairState {
        self.chair_states[chair]
    }

    #[cfg(test)]
    pub(crate) fn human_inventory_len(&self, chair: usize) -> usize {
        self.humans
            .iter()
            .find(|h| h.chair == chair)
            .map(|h| h.inventory.card_count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn bot_pool_len(&self, chair: usize) -> usize {
        self.bots
            .iter()
            .find(|b| b.chair == chair)
            .map(|b| b.pool.len())
            .unwrap_or(0)
    }
}

/// Remaining grace time in millis, anchored to the tick boundary so clients
/// can interpolate smoothly.
fn post_round_millis(ticks_remaining: u32, millis_until_next_sec: u32) -> u32 {
    (ticks_remaining * 1000).saturating_sub(1000 - millis_until_next_sec.min(1000))
}
