use std::collections::{HashSet, VecDeque};

use parley_shared::protocol::ServerEvent;
use uuid::Uuid;

/// How many delivered envelope ids are remembered for duplicate detection.
pub const DEDUP_WINDOW: usize = 1024;

/// What applying one envelope did to local state.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Updated,
    /// Already delivered once.
    Duplicate,
    /// Refers to something not held locally, or arrived while not live.
    /// The next fetch picks it up.
    Discarded,
    /// The open conversation no longer exists for this user.
    LeftConversation,
    /// Live call signaling, queued for the call layer.
    Signal,
}

/// Bounded set of recently seen envelope ids.
#[derive(Debug, Default)]
pub struct EnvelopeWindow {
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl EnvelopeWindow {
    /// Returns `false` when `id` was already recorded.
    pub fn record(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > DEDUP_WINDOW {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Call signaling handed over to whatever drives the media session.
pub type SignalQueue = VecDeque<ServerEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_repeats_and_stays_bounded() {
        let mut window = EnvelopeWindow::default();
        let first = Uuid::new_v4();
        assert!(window.record(first));
        assert!(!window.record(first));

        for _ in 0..DEDUP_WINDOW {
            window.record(Uuid::new_v4());
        }
        assert_eq!(window.len(), DEDUP_WINDOW);
        // Evicted, so it counts as new again.
        assert!(window.record(first));
    }
}
