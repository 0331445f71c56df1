use log::{info, warn};

use crate::controller::{EventSource, Listener, Result, SubscriptionId};

/// Holds at most one live registration with an event source.
#[derive(Debug)]
pub struct SubscriptionSlot {
    label: &'static str,
    current: Option<SubscriptionId>,
}

impl SubscriptionSlot {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            current: None,
        }
    }

    pub fn current(&self) -> Option<SubscriptionId> {
        self.current
    }

    /// Unregister the previous listener, then register `listener`.
    ///
    /// A failing unsubscribe is logged and does not stop the new registration.
    pub fn resubscribe<E, S>(
        &mut self,
        source: &mut S,
        listener: Listener<E>,
    ) -> Result<SubscriptionId>
    where
        S: EventSource<E> + ?Sized,
    {
        self.release(source);

        let id = source.subscribe(listener)?;
        info!("{}: registered listener {:?}", self.label, id);
        self.current = Some(id);
        Ok(id)
    }

    /// Unregister the current listener, if any.
    pub fn release<E, S>(&mut self, source: &mut S)
    where
        S: EventSource<E> + ?Sized,
    {
        if let Some(old) = self.current.take() {
            match source.unsubscribe(old) {
                Ok(()) => info!("{}: unregistered listener {:?}", self.label, old),
                Err(e) => warn!("{}: failed to unregister {:?}: {}", self.label, old, e),
            }
        }
    }
}
