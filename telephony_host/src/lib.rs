//! Host-side stand-ins for the SIP engine and the cellular radio.
//!
//! Both are cheap cloneable handles over shared state, so one clone can be
//! owned by the reconciler while another drives the simulation. Listeners are
//! always invoked after the internal lock is released.

mod engine;
mod radio;

pub use engine::HostEngine;
pub use radio::HostRadio;
