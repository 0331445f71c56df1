//! Seams to the outside world: the telephony engine, event sources and the
//! outbound notification transport.

use std::sync::Arc;

use thiserror::Error;

use crate::call::{CallEvent, CallId, CallSnapshot};
use crate::status::StatusUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelephonyError {
    #[error("call {0} not found")]
    CallNotFound(CallId),
    #[error("{op} rejected for call {call}: {reason}")]
    Rejected {
        op: &'static str,
        call: CallId,
        reason: String,
    },
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("unknown subscription {0:?}")]
    UnknownSubscription(SubscriptionId),
}

pub type Result<T> = std::result::Result<T, TelephonyError>;

/// Callback registered with an event source.
pub type Listener<E> = Arc<dyn Fn(E) + Send + Sync + 'static>;

/// Handle returned by [`EventSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Anything that delivers events of type `E` to registered listeners.
pub trait EventSource<E> {
    fn subscribe(&mut self, listener: Listener<E>) -> Result<SubscriptionId>;
    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()>;
}

/// Capabilities the reconciler needs from the SIP telephony engine.
///
/// Every call may fail; callers log and carry on.
pub trait TelephonyController: EventSource<CallEvent> {
    /// All calls the engine still lists, in engine order.
    fn calls(&self) -> Result<Vec<CallSnapshot>>;

    fn current_call(&self) -> Result<Option<CallSnapshot>>;

    /// Look a call up again by id.
    fn call(&self, id: CallId) -> Result<Option<CallSnapshot>> {
        Ok(self.calls()?.into_iter().find(|c| c.id == id))
    }

    fn terminate(&mut self, id: CallId) -> Result<()>;

    fn resume(&mut self, id: CallId) -> Result<()>;

    fn terminate_all(&mut self) -> Result<()>;

    /// Place an outbound call to `uri`.
    fn start_call(&mut self, uri: &str) -> Result<CallId>;
}

/// One-way delivery of status updates to the hardware integration.
pub trait NotificationSink {
    fn publish(&mut self, update: &StatusUpdate);
}
