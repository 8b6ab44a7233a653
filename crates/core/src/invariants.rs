//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible engine states during
//! development. These checks are compiled out in release builds.

use crate::engine::{DraftEngine, DraftState, TICKS_DISABLED};

/// Validate that an engine's state is internally consistent.
pub fn assert_engine_invariants(engine: &DraftEngine) {
    // A finished draft never holds packs and never will again.
    if engine.state() == DraftState::Complete {
        debug_assert!(
            engine.queues().iter().all(|q| q.is_empty()),
            "complete draft still holds queued packs"
        );
    }

    // Every queued pack belongs to the round being drafted.
    for (chair, queue) in engine.queues().iter().enumerate() {
        for pack in queue {
            debug_assert_eq!(
                pack.round,
                engine.current_round(),
                "chair {chair} holds a pack from round {}",
                pack.round
            );
            debug_assert!(
                !pack.cards.is_empty(),
                "chair {chair} holds an empty pack {}",
                pack.id
            );
        }
    }

    // A running selection timer implies a pack to pick from.
    for (chair, &ticks) in engine.ticks().iter().enumerate() {
        debug_assert!(
            ticks == TICKS_DISABLED || ticks >= 0,
            "chair {chair} has a negative timer {ticks}"
        );
        if ticks > 0 {
            debug_assert!(
                engine.pack_queue_size(chair) > 0,
                "chair {chair} has a timer but no pack"
            );
        }
    }

    // Grid selection orders are unique and dense from zero.
    let mut orders = engine.grid_orders();
    orders.sort_unstable();
    for (expected, order) in orders.iter().enumerate() {
        debug_assert_eq!(
            *order, expected as i32,
            "grid selection orders are not dense"
        );
    }
}
