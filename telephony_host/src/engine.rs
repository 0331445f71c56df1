use std::sync::{Arc, Mutex, MutexGuard};

use clb_core::{
    CallEvent, CallId, CallSnapshot, CallState, Direction, EventSource, Listener, Result,
    SubscriptionId, TelephonyController, TelephonyError,
};
use log::{debug, info};

#[derive(Default)]
struct EngineInner {
    next_call: u64,
    next_subscription: u64,
    calls: Vec<CallSnapshot>,
    current: Option<CallId>,
    listeners: Vec<(SubscriptionId, Listener<CallEvent>)>,
}

impl EngineInner {
    fn find_mut(&mut self, id: CallId) -> Result<&mut CallSnapshot> {
        self.calls
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(TelephonyError::CallNotFound(id))
    }

    /// Ended calls stay listed until the next operation, like a real engine
    /// that reaps them after the End callback has run.
    fn reap(&mut self) {
        self.calls.retain(|c| !c.state.is_terminated());
    }

    fn allocate(&mut self) -> CallId {
        self.next_call += 1;
        CallId(self.next_call)
    }
}

/// Simulated SIP telephony engine.
///
/// Only one call streams at a time: answering or resuming a call pauses the
/// one that was running.
#[derive(Clone, Default)]
pub struct HostEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl HostEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineInner>> {
        self.inner
            .lock()
            .map_err(|_| TelephonyError::Unavailable("engine state poisoned".into()))
    }

    fn emit(&self, events: Vec<CallEvent>) -> Result<()> {
        let listeners: Vec<Listener<CallEvent>> = self
            .lock()?
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for event in events {
            debug!(
                "engine: call {} -> {:?} ({})",
                event.call.id, event.state, event.call.peer_address
            );
            for listener in &listeners {
                listener(event.clone());
            }
        }
        Ok(())
    }

    /// Move `id` to `state` and return the event for it.
    fn set_state(
        inner: &mut EngineInner,
        id: CallId,
        state: CallState,
        message: &str,
    ) -> Result<CallEvent> {
        let call = inner.find_mut(id)?;
        call.state = state;
        let event = CallEvent::new(call.clone(), message);
        if state.is_terminated() && inner.current == Some(id) {
            inner.current = None;
        }
        Ok(event)
    }

    /// Pause whatever is streaming, except `keep`.
    fn pause_running(inner: &mut EngineInner, keep: CallId) -> Result<Vec<CallEvent>> {
        let running: Vec<CallId> = inner
            .calls
            .iter()
            .filter(|c| c.id != keep && c.state == CallState::StreamsRunning)
            .map(|c| c.id)
            .collect();
        running
            .into_iter()
            .map(|id| Self::set_state(inner, id, CallState::Paused, "Call paused"))
            .collect()
    }

    fn add_call(&self, call: CallSnapshot, make_current: bool, message: &str) -> Result<CallId> {
        let id = call.id;
        let event = CallEvent::new(call.clone(), message);
        {
            let mut inner = self.lock()?;
            inner.reap();
            inner.calls.push(call);
            if make_current {
                inner.current = Some(id);
            }
        }
        self.emit(vec![event])?;
        Ok(id)
    }

    /// A call arrives from `peer`.
    pub fn incoming(&self, peer: &str) -> Result<CallId> {
        let id = self.lock()?.allocate();
        info!("engine: incoming call {} from {}", id, peer);
        let call = CallSnapshot::new(id, Direction::Incoming, peer, CallState::IncomingReceived);
        self.add_call(call, false, "Incoming call")
    }

    /// A call arrives that replaces `replaced` (attended transfer).
    pub fn incoming_replacing(&self, replaced: CallId, peer: &str) -> Result<CallId> {
        let id = self.lock()?.allocate();
        info!("engine: transfer call {} from {} replaces {}", id, peer, replaced);
        let call = CallSnapshot::new(id, Direction::Incoming, peer, CallState::IncomingReceived)
            .replacing(replaced);
        self.add_call(call, false, "Incoming call")
    }

    /// Early media on a ringing incoming call.
    pub fn early_media(&self, id: CallId) -> Result<()> {
        let event = {
            let mut inner = self.lock()?;
            Self::set_state(&mut inner, id, CallState::IncomingEarlyMedia, "Early media")?
        };
        self.emit(vec![event])
    }

    /// Answer an incoming call or report an outgoing one as accepted.
    pub fn answer(&self, id: CallId) -> Result<()> {
        let events = {
            let mut inner = self.lock()?;
            inner.reap();
            let state = inner.find_mut(id)?.state;
            if !matches!(
                state,
                CallState::IncomingReceived | CallState::IncomingEarlyMedia | CallState::OutgoingInit
            ) {
                return Err(TelephonyError::Rejected {
                    op: "answer",
                    call: id,
                    reason: format!("call is {state:?}"),
                });
            }
            let mut events = Self::pause_running(&mut inner, id)?;
            events.push(Self::set_state(&mut inner, id, CallState::StreamsRunning, "Connected")?);
            inner.current = Some(id);
            events
        };
        self.emit(events)
    }

    pub fn pause(&self, id: CallId) -> Result<()> {
        let event = {
            let mut inner = self.lock()?;
            let event = Self::set_state(&mut inner, id, CallState::Paused, "Call paused")?;
            if inner.current == Some(id) {
                inner.current = None;
            }
            event
        };
        self.emit(vec![event])
    }

    /// The remote side offers a media change.
    pub fn remote_update(&self, id: CallId) -> Result<()> {
        let event = {
            let mut inner = self.lock()?;
            Self::set_state(&mut inner, id, CallState::UpdatedByRemote, "Updated by remote")?
        };
        self.emit(vec![event])?;

        let event = {
            let mut inner = self.lock()?;
            Self::set_state(&mut inner, id, CallState::StreamsRunning, "Connected")?
        };
        self.emit(vec![event])
    }

    /// The remote side hangs up.
    pub fn remote_end(&self, id: CallId) -> Result<()> {
        self.finish(id, CallState::End, "Call ended")
    }

    /// The call fails with `reason`.
    pub fn fail(&self, id: CallId, reason: &str) -> Result<()> {
        self.finish(id, CallState::Error, reason)
    }

    fn finish(&self, id: CallId, state: CallState, message: &str) -> Result<()> {
        let event = {
            let mut inner = self.lock()?;
            let current = inner.find_mut(id)?.state;
            if current.is_terminated() {
                return Err(TelephonyError::Rejected {
                    op: "end",
                    call: id,
                    reason: "call already ended".into(),
                });
            }
            Self::set_state(&mut inner, id, state, message)?
        };
        self.emit(vec![event])
    }

    pub fn listener_count(&self) -> usize {
        self.lock().map(|inner| inner.listeners.len()).unwrap_or(0)
    }
}

impl EventSource<CallEvent> for HostEngine {
    fn subscribe(&mut self, listener: Listener<CallEvent>) -> Result<SubscriptionId> {
        let mut inner = self.lock()?;
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.listeners.push((id, listener));
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let mut inner = self.lock()?;
        let before = inner.listeners.len();
        inner.listeners.retain(|(l, _)| *l != id);
        if inner.listeners.len() == before {
            return Err(TelephonyError::UnknownSubscription(id));
        }
        Ok(())
    }
}

impl TelephonyController for HostEngine {
    fn calls(&self) -> Result<Vec<CallSnapshot>> {
        Ok(self.lock()?.calls.clone())
    }

    fn current_call(&self) -> Result<Option<CallSnapshot>> {
        let inner = self.lock()?;
        Ok(inner
            .current
            .and_then(|id| inner.calls.iter().find(|c| c.id == id).cloned()))
    }

    fn terminate(&mut self, id: CallId) -> Result<()> {
        info!("engine: terminate {}", id);
        self.finish(id, CallState::End, "Call terminated")
    }

    fn resume(&mut self, id: CallId) -> Result<()> {
        let events = {
            let mut inner = self.lock()?;
            let state = inner.find_mut(id)?.state;
            if state != CallState::Paused {
                return Err(TelephonyError::Rejected {
                    op: "resume",
                    call: id,
                    reason: format!("call is {state:?}"),
                });
            }
            let mut events = Self::pause_running(&mut inner, id)?;
            events.push(Self::set_state(&mut inner, id, CallState::StreamsRunning, "Resumed")?);
            inner.current = Some(id);
            events
        };
        self.emit(events)
    }

    fn terminate_all(&mut self) -> Result<()> {
        let events = {
            let mut inner = self.lock()?;
            let live: Vec<CallId> = inner
                .calls
                .iter()
                .filter(|c| !c.state.is_terminated())
                .map(|c| c.id)
                .collect();
            live.into_iter()
                .map(|id| Self::set_state(&mut inner, id, CallState::End, "Call terminated"))
                .collect::<Result<Vec<_>>>()?
        };
        self.emit(events)
    }

    fn start_call(&mut self, uri: &str) -> Result<CallId> {
        let id = self.lock()?.allocate();
        let peer = if uri.starts_with("sip:") || uri.starts_with("sips:") {
            uri.to_string()
        } else {
            format!("sip:{uri}")
        };
        info!("engine: outgoing call {} to {}", id, peer);
        let call = CallSnapshot::new(id, Direction::Outgoing, &peer, CallState::OutgoingInit);
        self.add_call(call, true, "Starting outgoing call")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver};

    use super::*;

    fn subscribed(engine: &mut HostEngine) -> Receiver<CallEvent> {
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        engine
            .subscribe(Arc::new(move |ev: CallEvent| {
                let _ = tx.lock().map(|tx| tx.send(ev));
            }))
            .unwrap();
        rx
    }

    fn states(rx: &Receiver<CallEvent>) -> Vec<(CallId, CallState)> {
        rx.try_iter().map(|ev| (ev.call.id, ev.state)).collect()
    }

    #[test]
    fn answering_pauses_the_running_call() {
        let mut engine = HostEngine::new();
        let rx = subscribed(&mut engine);

        let a = engine.incoming("sip:alice@pbx").unwrap();
        engine.answer(a).unwrap();
        let b = engine.incoming("sip:bob@pbx").unwrap();
        engine.answer(b).unwrap();

        assert_eq!(
            states(&rx),
            vec![
                (a, CallState::IncomingReceived),
                (a, CallState::StreamsRunning),
                (b, CallState::IncomingReceived),
                (a, CallState::Paused),
                (b, CallState::StreamsRunning),
            ]
        );
        assert_eq!(engine.current_call().unwrap().map(|c| c.id), Some(b));
    }

    #[test]
    fn ended_calls_are_reaped_on_next_operation() {
        let mut engine = HostEngine::new();
        let a = engine.start_call("clbsessionid1@pbx").unwrap();
        engine.terminate(a).unwrap();

        let listed = engine.calls().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, CallState::End);
        assert!(engine.current_call().unwrap().is_none());

        engine.incoming("sip:bob@pbx").unwrap();
        assert_eq!(engine.calls().unwrap().len(), 1);
    }

    #[test]
    fn outgoing_peer_gets_scheme() {
        let mut engine = HostEngine::new();
        let id = engine.start_call("clbsessionid1@pbx").unwrap();
        let call = engine.call(id).unwrap().unwrap();
        assert_eq!(call.peer_address, "sip:clbsessionid1@pbx");
        assert_eq!(call.direction, Direction::Outgoing);
    }

    #[test]
    fn resume_requires_paused_call() {
        let mut engine = HostEngine::new();
        let a = engine.incoming("sip:alice@pbx").unwrap();
        assert!(engine.resume(a).is_err());

        engine.answer(a).unwrap();
        engine.pause(a).unwrap();
        engine.resume(a).unwrap();
        assert_eq!(engine.call(a).unwrap().unwrap().state, CallState::StreamsRunning);
    }

    #[test]
    fn terminate_all_ends_every_live_call() {
        let mut engine = HostEngine::new();
        let rx = subscribed(&mut engine);
        let a = engine.incoming("sip:alice@pbx").unwrap();
        let b = engine.incoming("sip:bob@pbx").unwrap();
        let _ = states(&rx);

        engine.terminate_all().unwrap();
        assert_eq!(states(&rx), vec![(a, CallState::End), (b, CallState::End)]);
    }
}
