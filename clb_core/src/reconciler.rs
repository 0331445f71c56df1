//! The state machine that turns engine and radio events into unified status.

use std::time::{Duration, Instant};

use heapless::Vec as HVec;
use log::{debug, info, warn};

use crate::address::is_hardware_marked;
use crate::call::{CallEvent, CallId, CallSnapshot, CallState};
use crate::cellular::{CellularTracker, RadioState};
use crate::controller::{
    EventSource, Listener, NotificationSink, Result, SubscriptionId, TelephonyController,
};
use crate::hangup::HangupClock;
use crate::session::HardwareSession;
use crate::status::{StatusUpdate, UnifiedStatus};
use crate::subscription::SubscriptionSlot;

const MAX_DEFERRED: usize = 4;

/// Tunables for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Grace period before a paused call is brought back after another ends.
    pub resume_delay: Duration,
    /// How long a hang-up request counts as "just hung up".
    pub hangup_window: Duration,
    /// Terminate the hardware call as soon as a native cellular call goes
    /// off hook. Device-model dependent.
    pub end_on_cellular: bool,
    /// Only report ringing for outgoing calls placed by the bridge.
    pub correlate_outgoing: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            resume_delay: Duration::from_millis(400),
            hangup_window: Duration::from_secs(5),
            end_on_cellular: false,
            correlate_outgoing: false,
        }
    }
}

/// A paused call to bring back once `due` passes, and the call whose end
/// triggered it.
#[derive(Debug, Clone)]
struct DeferredResume {
    call: CallId,
    due: Instant,
    ended: CallId,
    ended_address: String,
}

/// Owns the hardware session and cellular state and decides what the
/// hardware integration is told.
///
/// All handlers take `&mut self`; the owner serializes events through a
/// single dispatch loop.
pub struct Reconciler<T, N> {
    telephony: T,
    sink: N,
    policy: Policy,
    pub(crate) session: HardwareSession,
    cellular: CellularTracker,
    pub(crate) hangup: HangupClock,
    deferred: HVec<DeferredResume, MAX_DEFERRED>,
    engine_subscription: SubscriptionSlot,
    last_published: Option<StatusUpdate>,
}

impl<T, N> Reconciler<T, N>
where
    T: TelephonyController,
    N: NotificationSink,
{
    pub fn new(telephony: T, sink: N, policy: Policy) -> Self {
        Self {
            telephony,
            sink,
            hangup: HangupClock::new(policy.hangup_window),
            policy,
            session: HardwareSession::new(),
            cellular: CellularTracker::new(),
            deferred: HVec::new(),
            engine_subscription: SubscriptionSlot::new("telephony engine"),
            last_published: None,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn session(&self) -> &HardwareSession {
        &self.session
    }

    pub fn cellular(&self) -> &CellularTracker {
        &self.cellular
    }

    pub fn telephony(&self) -> &T {
        &self.telephony
    }

    pub fn telephony_mut(&mut self) -> &mut T {
        &mut self.telephony
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    pub fn last_published(&self) -> Option<&StatusUpdate> {
        self.last_published.as_ref()
    }

    /// (Re)register with the engine for lifecycle events.
    pub fn resubscribe_engine(&mut self, listener: Listener<CallEvent>) -> Result<SubscriptionId> {
        self.engine_subscription
            .resubscribe(&mut self.telephony, listener)
    }

    /// (Re)register with the cellular radio.
    pub fn resubscribe_radio<S>(
        &mut self,
        source: &mut S,
        listener: Listener<RadioState>,
    ) -> Result<SubscriptionId>
    where
        S: EventSource<RadioState> + ?Sized,
    {
        self.cellular.resubscribe(source, listener)
    }

    /// Record the URI of the call the bridge is about to place.
    pub fn set_hardware_call_uri(&mut self, uri: &str) {
        self.session.begin(uri);
    }

    pub fn register_hangup_time(&mut self, now: Instant) {
        self.hangup.register(now);
    }

    pub fn is_just_hung_up(&self, now: Instant) -> bool {
        self.hangup.is_just_hung_up(now)
    }

    pub fn logout(&mut self) {
        info!("reconciler: logout, dropping hardware session");
        self.session.clear();
    }

    /// Earliest pending deferred task, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.iter().map(|t| t.due).min()
    }

    pub fn pending_resumes(&self) -> usize {
        self.deferred.len()
    }

    // --- Engine events -------------------------------------------------------

    pub fn on_call_event(&mut self, event: &CallEvent, now: Instant) {
        debug!(
            "reconciler: call {} state {:?} address {}",
            event.call.id, event.state, event.call.peer_address
        );

        if event.state.is_terminated()
            && !event.message.is_empty()
            && self.is_hardware_call(&event.call.peer_address)
        {
            info!(
                "reconciler: hardware call {} {:?}: {}",
                event.call.id, event.state, event.message
            );
        }

        match self.next_status(event, now) {
            Ok(Some(update)) => self.publish(update),
            Ok(None) => {}
            Err(e) => warn!(
                "reconciler: no transition for call {} ({:?}): {}",
                event.call.id, event.state, e
            ),
        }
    }

    fn next_status(&mut self, event: &CallEvent, now: Instant) -> Result<Option<StatusUpdate>> {
        let call = &event.call;

        match event.state {
            CallState::IncomingReceived => {
                let current = self.telephony.current_call()?;
                let is_current = current.map(|c| c.id) == Some(call.id);
                if !is_current && call.is_transfer_replacement() {
                    debug!("reconciler: call {} replaces another, ignoring", call.id);
                    return Ok(None);
                }
                if self.cellular.is_busy() {
                    info!(
                        "reconciler: cellular call in progress, not ringing for {}",
                        call.peer_address
                    );
                    return Ok(None);
                }
                Ok(Some(StatusUpdate::new(UnifiedStatus::Ringing, &call.peer_address)))
            }
            CallState::IncomingEarlyMedia | CallState::UpdatedByRemote => Ok(None),
            CallState::OutgoingInit => {
                if self.policy.correlate_outgoing && !self.is_hardware_call(&call.peer_address) {
                    debug!("reconciler: outgoing call {} not placed by the bridge", call.id);
                    return Ok(None);
                }
                Ok(Some(StatusUpdate::new(UnifiedStatus::Ringing, &call.peer_address)))
            }
            CallState::StreamsRunning => Ok(Some(StatusUpdate::new(
                UnifiedStatus::Connected,
                &call.peer_address,
            ))),
            CallState::Paused => {
                if self.is_hardware_call(&call.peer_address) {
                    info!(
                        "reconciler: hardware call {} may not be paused, terminating",
                        call.id
                    );
                    self.telephony.terminate(call.id)?;
                    return Ok(None);
                }
                Ok(Some(StatusUpdate::new(UnifiedStatus::Paused, &call.peer_address)))
            }
            CallState::End | CallState::Error => self.on_call_ended(event, now),
        }
    }

    fn on_call_ended(&mut self, event: &CallEvent, now: Instant) -> Result<Option<StatusUpdate>> {
        let ended = &event.call;
        let ended_was_hardware = self.is_hardware_call(&ended.peer_address);

        let calls = self.telephony.calls()?;
        let update = self.after_end(event, &calls, now);

        if ended_was_hardware {
            debug!("reconciler: hardware call {} ended", ended.id);
            self.session.clear();
        }
        Ok(update)
    }

    /// Decide what follows an End/Error given the calls the engine still lists.
    fn after_end(
        &mut self,
        event: &CallEvent,
        calls: &[CallSnapshot],
        now: Instant,
    ) -> Option<StatusUpdate> {
        let ended = &event.call;

        let Some(first) = calls.first() else {
            self.session.clear();
            return Some(StatusUpdate::new(UnifiedStatus::Idle, &ended.peer_address));
        };
        debug!(
            "reconciler: first remaining call {} {:?} {}",
            first.id, first.state, first.peer_address
        );

        if first.state == CallState::Paused && event.state == CallState::End {
            self.schedule_resume(first.id, ended, now);
            return None;
        }

        if first.state.is_terminated() {
            if let Some(second) = calls.get(1) {
                debug!(
                    "reconciler: second remaining call {} {:?} {}",
                    second.id, second.state, second.peer_address
                );
                if second.state == CallState::Paused {
                    self.schedule_resume(second.id, ended, now);
                    return None;
                }
                if second.state == CallState::StreamsRunning
                    && self.is_hardware_call(&second.peer_address)
                {
                    return Some(StatusUpdate::new(
                        UnifiedStatus::Connected,
                        &second.peer_address,
                    ));
                }
                return Some(self.idle_fallback(ended.id, &ended.peer_address, calls));
            }
        }

        // An incoming call that was declined or ignored while the bridge's
        // own call kept running.
        if first.state == CallState::StreamsRunning && self.is_hardware_call(&first.peer_address) {
            return Some(StatusUpdate::new(
                UnifiedStatus::Connected,
                &first.peer_address,
            ));
        }

        Some(self.idle_fallback(ended.id, &ended.peer_address, calls))
    }

    /// IdleInactive while a bystander call is still up, Idle otherwise. The
    /// session history survives as long as a hardware call is live.
    fn idle_fallback(
        &mut self,
        ended: CallId,
        ended_address: &str,
        calls: &[CallSnapshot],
    ) -> StatusUpdate {
        let mut bystander_live = false;
        let mut hardware_live = false;
        for call in calls
            .iter()
            .filter(|c| c.id != ended && !c.state.is_terminated())
        {
            if self.is_hardware_call(&call.peer_address) {
                hardware_live = true;
            } else {
                bystander_live = true;
            }
        }

        if bystander_live {
            return StatusUpdate::new(UnifiedStatus::IdleInactive, ended_address);
        }
        if !hardware_live {
            self.session.clear();
        }
        StatusUpdate::new(UnifiedStatus::Idle, ended_address)
    }

    // --- Deferred resume -----------------------------------------------------

    fn schedule_resume(&mut self, call: CallId, ended: &CallSnapshot, now: Instant) {
        self.deferred.retain(|t| t.call != call);
        if self.deferred.is_full() {
            let oldest = self.deferred.remove(0);
            warn!(
                "reconciler: too many pending resumes, resuming {} now",
                oldest.call
            );
            self.fire_resume(oldest);
        }

        let due = now + self.policy.resume_delay;
        debug!(
            "reconciler: resume of {} scheduled in {:?}",
            call, self.policy.resume_delay
        );
        let task = DeferredResume {
            call,
            due,
            ended: ended.id,
            ended_address: ended.peer_address.clone(),
        };
        if let Err(task) = self.deferred.push(task) {
            self.fire_resume(task);
        }
    }

    /// Run every deferred task that is due at `now`.
    pub fn poll_deferred(&mut self, now: Instant) {
        let due: HVec<DeferredResume, MAX_DEFERRED> = self
            .deferred
            .iter()
            .filter(|t| t.due <= now)
            .cloned()
            .collect();
        if due.is_empty() {
            return;
        }
        self.deferred.retain(|t| t.due > now);

        for task in due {
            self.fire_resume(task);
        }
    }

    fn fire_resume(&mut self, task: DeferredResume) {
        let id = task.call;
        let call = match self.telephony.call(id) {
            Ok(Some(call)) => call,
            Ok(None) => {
                debug!("reconciler: call {} gone before its resume fired", id);
                self.resume_failed(&task);
                return;
            }
            Err(e) => {
                warn!("reconciler: could not look up call {}: {}", id, e);
                self.resume_failed(&task);
                return;
            }
        };

        if call.state != CallState::Paused {
            debug!("reconciler: call {} is {:?} now, resume skipped", id, call.state);
            return;
        }

        match self.telephony.resume(id) {
            Ok(()) => {
                info!("reconciler: resumed call {} ({})", id, call.peer_address);
                self.publish(StatusUpdate::new(
                    UnifiedStatus::Connected,
                    &call.peer_address,
                ));
            }
            Err(e) => {
                warn!("reconciler: resume of {} failed: {}", id, e);
                self.resume_failed(&task);
            }
        }
    }

    /// Publish the idle fallback for the ended call behind a resume that
    /// could not run.
    fn resume_failed(&mut self, task: &DeferredResume) {
        let update = match self.telephony.calls() {
            Ok(calls) => self.idle_fallback(task.ended, &task.ended_address, &calls),
            Err(e) => {
                warn!("reconciler: could not list calls: {}", e);
                StatusUpdate::new(UnifiedStatus::Idle, &task.ended_address)
            }
        };
        self.publish(update);
    }

    // --- Cellular radio ------------------------------------------------------

    pub fn on_radio_state(&mut self, state: RadioState) {
        let Some(change) = self.cellular.update(state) else {
            return;
        };

        if change.current.is_busy() && self.policy.end_on_cellular {
            self.end_hardware_calls();
        }

        if change.became_free() {
            self.resume_first_paused();
        }
    }

    fn end_hardware_calls(&mut self) {
        if !self.session.has_history() {
            return;
        }
        let calls = match self.telephony.calls() {
            Ok(calls) => calls,
            Err(e) => {
                warn!("reconciler: could not list calls: {}", e);
                return;
            }
        };

        for call in calls.iter().filter(|c| !c.state.is_terminated()) {
            if self.session.owns(&call.peer_address) {
                info!(
                    "reconciler: cellular call in progress, ending hardware call {}",
                    call.id
                );
                if let Err(e) = self.telephony.terminate(call.id) {
                    warn!("reconciler: terminate of {} failed: {}", call.id, e);
                }
            }
        }
    }

    fn resume_first_paused(&mut self) {
        let calls = match self.telephony.calls() {
            Ok(calls) => calls,
            Err(e) => {
                warn!("reconciler: could not list calls: {}", e);
                return;
            }
        };

        if let Some(paused) = calls.iter().find(|c| c.state == CallState::Paused) {
            info!("reconciler: cellular idle, resuming call {}", paused.id);
            if let Err(e) = self.telephony.resume(paused.id) {
                warn!("reconciler: resume of {} failed: {}", paused.id, e);
            }
        }
    }

    // --- Helpers -------------------------------------------------------------

    fn is_hardware_call(&self, peer_address: &str) -> bool {
        self.session.owns(peer_address) || is_hardware_marked(peer_address)
    }

    fn publish(&mut self, update: StatusUpdate) {
        if update.status != UnifiedStatus::Ringing {
            self.session.end();
        }

        if self.last_published.as_ref() == Some(&update) {
            debug!("reconciler: {} unchanged, not republished", update);
            return;
        }

        info!("reconciler: publish {}", update);
        self.sink.publish(&update);
        self.last_published = Some(update);
    }
}
