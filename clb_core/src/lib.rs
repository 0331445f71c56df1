//! Call-state reconciliation for the CLB hardware bridge.
//!
//! The crate consumes call lifecycle events from a SIP telephony engine and
//! state changes from the native cellular radio, and turns them into a single
//! ordered stream of [`StatusUpdate`]s for the hardware integration. It does
//! no I/O of its own: the engine, the radio and the outbound transport are
//! reached through the traits in [`controller`].

pub mod address;
pub mod call;
pub mod cellular;
pub mod commands;
pub mod controller;
pub mod hangup;
pub mod reconciler;
pub mod session;
pub mod status;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use address::{is_hardware_marked, matches, normalize, session_marker, CallIdentity};
pub use call::{CallEvent, CallId, CallSnapshot, CallState, Direction};
pub use cellular::{CellularTracker, RadioChange, RadioState};
pub use commands::{decode_dial_uri, Command};
pub use controller::{
    EventSource, Listener, NotificationSink, Result, SubscriptionId, TelephonyController,
    TelephonyError,
};
pub use hangup::HangupClock;
pub use reconciler::{Policy, Reconciler};
pub use session::HardwareSession;
pub use status::{StatusUpdate, UnifiedStatus};
pub use subscription::SubscriptionSlot;
