//! Per-entity save trigger.
//!
//! Every `request_save` bumps the trigger generation and spawns a ticket. A
//! ticket only flushes if its generation is still the latest one once the
//! debounce elapsed and once it owns the lane; otherwise it was superseded.

use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, MutexGuard};

use crate::status::TriggerPhase;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    /// Tickets spawned but not finished yet.
    waiting: usize,
    in_flight: bool,
    reason: String,
}

#[derive(Debug, Default)]
pub(crate) struct Trigger {
    /// Held for the whole flush or delete, so one entity never has two
    /// remote calls running at once.
    lane: TokioMutex<()>,
    slot: Mutex<Slot>,
}

impl Trigger {
    /// Register a new request and return its generation.
    pub(crate) fn enqueue(&self, reason: &str) -> u64 {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.waiting += 1;
        slot.reason = reason.to_string();
        slot.generation
    }

    /// Invalidate every queued ticket without adding a new one.
    pub(crate) fn supersede(&self) {
        self.slot.lock().generation += 1;
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation == generation
    }

    /// Reason tag of the latest request.
    pub(crate) fn reason(&self) -> String {
        self.slot.lock().reason.clone()
    }

    pub(crate) async fn lane(&self) -> MutexGuard<'_, ()> {
        self.lane.lock().await
    }

    pub(crate) fn set_in_flight(&self, in_flight: bool) {
        self.slot.lock().in_flight = in_flight;
    }

    pub(crate) fn finish(&self) {
        let mut slot = self.slot.lock();
        slot.waiting = slot.waiting.saturating_sub(1);
    }

    pub(crate) fn phase(&self) -> TriggerPhase {
        let slot = self.slot.lock();
        if slot.in_flight {
            TriggerPhase::InFlight
        } else if slot.waiting > 0 {
            TriggerPhase::Queued
        } else {
            TriggerPhase::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let trigger = Trigger::default();
        let first = trigger.enqueue("edit");
        let second = trigger.enqueue("edit");

        assert!(!trigger.is_current(first));
        assert!(trigger.is_current(second));
        assert_eq!(trigger.phase(), TriggerPhase::Queued);

        trigger.finish();
        trigger.finish();
        assert_eq!(trigger.phase(), TriggerPhase::Idle);
    }

    #[test]
    fn supersede_drops_queued_tickets() {
        let trigger = Trigger::default();
        let generation = trigger.enqueue("edit");
        trigger.supersede();
        assert!(!trigger.is_current(generation));
    }
}
