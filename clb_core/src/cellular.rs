use log::info;

use crate::controller::{EventSource, Listener, Result, SubscriptionId};
use crate::subscription::SubscriptionSlot;

/// Native cellular radio call state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    #[default]
    Idle,
    Ringing,
    OffHook,
}

impl RadioState {
    pub fn is_busy(self) -> bool {
        !matches!(self, RadioState::Idle)
    }
}

/// A state change reported by [`CellularTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioChange {
    pub previous: RadioState,
    pub current: RadioState,
}

impl RadioChange {
    pub fn became_free(&self) -> bool {
        self.previous.is_busy() && !self.current.is_busy()
    }
}

/// Tracks whether a native cellular call is in progress.
#[derive(Debug)]
pub struct CellularTracker {
    state: RadioState,
    subscription: SubscriptionSlot,
}

impl Default for CellularTracker {
    fn default() -> Self {
        Self {
            state: RadioState::Idle,
            subscription: SubscriptionSlot::new("cellular radio"),
        }
    }
}

impl CellularTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// Record `state`; returns the change, or `None` if nothing changed.
    pub fn update(&mut self, state: RadioState) -> Option<RadioChange> {
        if state == self.state {
            return None;
        }
        let change = RadioChange {
            previous: self.state,
            current: state,
        };
        info!("cellular: {:?} -> {:?}", change.previous, change.current);
        self.state = state;
        Some(change)
    }

    /// Register `listener` with the radio, dropping any earlier registration.
    pub fn resubscribe<S>(
        &mut self,
        source: &mut S,
        listener: Listener<RadioState>,
    ) -> Result<SubscriptionId>
    where
        S: EventSource<RadioState> + ?Sized,
    {
        self.subscription.resubscribe(source, listener)
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_edges_only() {
        let mut tracker = CellularTracker::new();
        assert_eq!(tracker.update(RadioState::Idle), None);

        let ring = tracker.update(RadioState::Ringing).unwrap();
        assert!(!ring.became_free());
        assert!(tracker.is_busy());

        let answered = tracker.update(RadioState::OffHook).unwrap();
        assert_eq!(answered.previous, RadioState::Ringing);
        assert!(!answered.became_free());

        let hung_up = tracker.update(RadioState::Idle).unwrap();
        assert!(hung_up.became_free());
        assert!(!tracker.is_busy());
    }
}
