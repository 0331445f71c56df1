//! In-memory collaborators for unit tests.

use crate::call::{CallEvent, CallId, CallSnapshot, CallState, Direction};
use crate::controller::{
    EventSource, Listener, NotificationSink, Result, SubscriptionId, TelephonyController,
    TelephonyError,
};
use crate::status::StatusUpdate;

#[derive(Default)]
pub struct FakeTelephony {
    pub calls: Vec<CallSnapshot>,
    pub current: Option<CallId>,
    pub terminated: Vec<CallId>,
    pub resumed: Vec<CallId>,
    pub dialed: Vec<String>,
    pub terminated_all: usize,
    pub subscribed: Vec<SubscriptionId>,
    pub unsubscribed: Vec<SubscriptionId>,
    pub fail_terminate: bool,
    pub fail_resume: bool,
    /// Make `calls` and `current_call` fail.
    pub fail_calls: bool,
    next_subscription: u64,
}

impl FakeTelephony {
    fn unavailable(&self) -> Result<()> {
        if self.fail_calls {
            return Err(TelephonyError::Unavailable("engine offline".into()));
        }
        Ok(())
    }

    pub fn set_state(&mut self, id: CallId, state: CallState) {
        if let Some(call) = self.calls.iter_mut().find(|c| c.id == id) {
            call.state = state;
        }
    }
}

impl EventSource<CallEvent> for FakeTelephony {
    fn subscribe(&mut self, _listener: Listener<CallEvent>) -> Result<SubscriptionId> {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribed.push(id);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        self.unsubscribed.push(id);
        Ok(())
    }
}

impl TelephonyController for FakeTelephony {
    fn calls(&self) -> Result<Vec<CallSnapshot>> {
        self.unavailable()?;
        Ok(self.calls.clone())
    }

    fn current_call(&self) -> Result<Option<CallSnapshot>> {
        self.unavailable()?;
        Ok(self
            .current
            .and_then(|id| self.calls.iter().find(|c| c.id == id).cloned()))
    }

    fn terminate(&mut self, id: CallId) -> Result<()> {
        if self.fail_terminate {
            return Err(TelephonyError::Rejected {
                op: "terminate",
                call: id,
                reason: "test failure".into(),
            });
        }
        self.terminated.push(id);
        self.set_state(id, CallState::End);
        Ok(())
    }

    fn resume(&mut self, id: CallId) -> Result<()> {
        if self.fail_resume {
            return Err(TelephonyError::Rejected {
                op: "resume",
                call: id,
                reason: "test failure".into(),
            });
        }
        self.resumed.push(id);
        self.set_state(id, CallState::StreamsRunning);
        Ok(())
    }

    fn terminate_all(&mut self) -> Result<()> {
        self.terminated_all += 1;
        for call in &mut self.calls {
            call.state = CallState::End;
        }
        Ok(())
    }

    fn start_call(&mut self, uri: &str) -> Result<CallId> {
        let id = CallId(100 + self.dialed.len() as u64);
        self.dialed.push(uri.to_string());
        self.calls.push(CallSnapshot::new(
            id,
            Direction::Outgoing,
            &format!("sip:{uri}"),
            CallState::OutgoingInit,
        ));
        self.current = Some(id);
        Ok(id)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub updates: Vec<StatusUpdate>,
}

impl NotificationSink for RecordingSink {
    fn publish(&mut self, update: &StatusUpdate) {
        self.updates.push(update.clone());
    }
}
