use std::sync::{Arc, Mutex};

use clb_core::{EventSource, Listener, RadioState, Result, SubscriptionId, TelephonyError};
use log::debug;

#[derive(Default)]
struct RadioInner {
    state: RadioState,
    next_subscription: u64,
    listeners: Vec<(SubscriptionId, Listener<RadioState>)>,
}

/// Simulated native cellular radio.
#[derive(Clone, Default)]
pub struct HostRadio {
    inner: Arc<Mutex<RadioInner>>,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RadioState {
        self.inner
            .lock()
            .map(|inner| inner.state)
            .unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.listeners.len())
            .unwrap_or(0)
    }

    /// Change the radio state and notify listeners.
    pub fn set_state(&self, state: RadioState) {
        let listeners: Vec<Listener<RadioState>> = match self.inner.lock() {
            Ok(mut inner) => {
                inner.state = state;
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
            }
            Err(_) => return,
        };

        debug!("radio: {:?} -> {} listener(s)", state, listeners.len());
        for listener in listeners {
            listener(state);
        }
    }
}

impl EventSource<RadioState> for HostRadio {
    fn subscribe(&mut self, listener: Listener<RadioState>) -> Result<SubscriptionId> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TelephonyError::Unavailable("radio state poisoned".into()))?;
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.listeners.push((id, listener));
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TelephonyError::Unavailable("radio state poisoned".into()))?;
        let before = inner.listeners.len();
        inner.listeners.retain(|(l, _)| *l != id);
        if inner.listeners.len() == before {
            return Err(TelephonyError::UnknownSubscription(id));
        }
        Ok(())
    }
}
