use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Instant;

use clb_core::{CallEvent, Listener, NotificationSink, Policy, RadioState, Reconciler, StatusUpdate};
use log::{error, info, warn};
use telephony_host::{HostEngine, HostRadio};

use crate::messages::{DispatchEvent, DispatchReceiver, DispatchSender, StatusSender};
use crate::tasks::task::{AppTask, TaskMeta};

/// Forwards published status to the notify task.
pub struct ChannelSink {
    tx: StatusSender,
}

impl ChannelSink {
    pub fn new(tx: StatusSender) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&mut self, update: &StatusUpdate) {
        if self.tx.send(update.clone()).is_err() {
            warn!("dispatch: status channel closed, dropping {}", update);
        }
    }
}

/// Owns the reconciler. Every engine event, radio change and bridge command
/// funnels through this one thread, so the trackers are never touched
/// concurrently.
pub struct DispatchTask {
    reconciler: Reconciler<HostEngine, ChannelSink>,
    radio: HostRadio,
    rx: DispatchReceiver,
    call_listener: Listener<CallEvent>,
    radio_listener: Listener<RadioState>,
}

impl AppTask for DispatchTask {
    fn into_runner(mut self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static> {
        Box::new(move || {
            self.run();
        })
    }

    fn meta(&self) -> TaskMeta {
        TaskMeta {
            name: "dispatch",
            stack_bytes: None,
        }
    }
}

impl DispatchTask {
    pub fn new(
        engine: HostEngine,
        radio: HostRadio,
        sink: ChannelSink,
        policy: Policy,
        tx: DispatchSender,
        rx: DispatchReceiver,
    ) -> Self {
        let call_tx = tx.clone();
        let call_listener: Listener<CallEvent> = Arc::new(move |ev: CallEvent| {
            let _ = call_tx.send(DispatchEvent::Call(ev));
        });
        let radio_listener: Listener<RadioState> = Arc::new(move |state: RadioState| {
            let _ = tx.send(DispatchEvent::Radio(state));
        });

        Self {
            reconciler: Reconciler::new(engine, sink, policy),
            radio,
            rx,
            call_listener,
            radio_listener,
        }
    }

    fn run(&mut self) {
        info!("dispatch task started: {:?}", self.reconciler.policy());
        self.subscribe();

        loop {
            let now = Instant::now();
            self.reconciler.poll_deferred(now);

            let event = match self.reconciler.next_deadline() {
                Some(deadline) => {
                    // Block on the queue until the next deferred task is due
                    match self.rx.recv_timeout(deadline.saturating_duration_since(now)) {
                        Ok(ev) => ev,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(ev) => ev,
                    Err(_) => break,
                },
            };

            self.handle_event(event);
        }

        info!("dispatch task exiting: event channel closed");
    }

    fn handle_event(&mut self, event: DispatchEvent) {
        let now = Instant::now();
        match event {
            DispatchEvent::Call(ev) => self.reconciler.on_call_event(&ev, now),
            DispatchEvent::Radio(state) => self.reconciler.on_radio_state(state),
            DispatchEvent::Command(cmd) => self.reconciler.handle_command(cmd, now),
            DispatchEvent::Resubscribe => self.subscribe(),
            DispatchEvent::Report => info!("dispatch: {}", self.report(now)),
        }
    }

    fn report(&self, now: Instant) -> String {
        let r = &self.reconciler;
        let session = r
            .session()
            .primary()
            .map(|uri| uri.to_string())
            .unwrap_or_else(|| "-".into());
        let last = r
            .last_published()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "-".into());
        format!(
            "session={} history={} radio={:?} radio_subscription={:?} just_hung_up={} pending_resumes={} last=[{}]",
            session,
            r.session().history().len(),
            r.cellular().state(),
            r.cellular().subscription(),
            r.is_just_hung_up(now),
            r.pending_resumes(),
            last,
        )
    }

    fn subscribe(&mut self) {
        if let Err(e) = self
            .reconciler
            .resubscribe_engine(Arc::clone(&self.call_listener))
        {
            error!("dispatch: engine subscription failed: {}", e);
        }

        if let Err(e) = self
            .reconciler
            .resubscribe_radio(&mut self.radio, Arc::clone(&self.radio_listener))
        {
            error!("dispatch: radio subscription failed: {}", e);
        }
    }
}
