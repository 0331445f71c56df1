use std::sync::mpsc::{Receiver, Sender};

use clb_core::{CallEvent, Command, RadioState, StatusUpdate};

/// Everything the dispatch task reacts to, in delivery order.
#[derive(Debug)]
pub enum DispatchEvent {
    Call(CallEvent),
    Radio(RadioState),
    Command(Command),
    /// Re-register engine and radio listeners (after a login).
    Resubscribe,
    /// Log the reconciler's current view.
    Report,
}

pub type DispatchSender = Sender<DispatchEvent>;
pub type DispatchReceiver = Receiver<DispatchEvent>;

pub type StatusSender = Sender<StatusUpdate>;
pub type StatusReceiver = Receiver<StatusUpdate>;

pub type ShutdownSender = Sender<()>;
pub type ShutdownReceiver = Receiver<()>;
