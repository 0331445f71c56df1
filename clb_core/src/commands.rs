//! Requests coming in from the hardware integration.

use std::time::Instant;

use log::{debug, info, warn};

use crate::address::{is_hardware_marked, session_marker};
use crate::call::CallState;
use crate::controller::{NotificationSink, Result, TelephonyController};
use crate::reconciler::Reconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attribute the next outbound call to the hardware bridge.
    SetCallUri { uri: String },
    /// Attribute and place an outbound call.
    Dial { uri: String },
    /// Hang up the call for `uri`, or the current call.
    Hangup { uri: Option<String> },
    Logout,
}

/// Turn a URI as sent by the bridge into something the engine can dial.
pub fn decode_dial_uri(raw: &str) -> String {
    let mut uri = raw.trim().replace("%40", "@").replace("%3A", ":");
    if let Some(rest) = uri.strip_prefix("sip:") {
        uri = rest.to_string();
    }

    // Session URIs without an explicit transport default to UDP.
    let lower = uri.to_lowercase();
    if lower.contains("clbsessionid") && lower.contains("transport=?") {
        uri = uri.replace("transport=?", "transport=udp?");
    }
    uri
}

impl<T, N> Reconciler<T, N>
where
    T: TelephonyController,
    N: NotificationSink,
{
    pub fn handle_command(&mut self, command: Command, now: Instant) {
        debug!("reconciler: command {:?}", command);
        match command {
            Command::SetCallUri { uri } => self.set_hardware_call_uri(&uri),
            Command::Dial { uri } => self.dial(&uri),
            Command::Hangup { uri } => self.hangup(uri.as_deref(), now),
            Command::Logout => self.logout(),
        }
    }

    fn dial(&mut self, raw: &str) {
        let uri = decode_dial_uri(raw);
        if uri.is_empty() {
            warn!("reconciler: dial request without uri");
            return;
        }
        if !is_hardware_marked(&uri) {
            debug!("reconciler: dialing unmarked uri {}", uri);
        }
        self.set_hardware_call_uri(&uri);
        match self.telephony_mut().start_call(&uri) {
            Ok(id) => info!("reconciler: placed call {} to {}", id, uri),
            Err(e) => warn!("reconciler: could not call {}: {}", uri, e),
        }
    }

    fn hangup(&mut self, uri: Option<&str>, now: Instant) {
        self.register_hangup_time(now);

        if let Some(uri) = uri {
            match self.terminate_by_marker(uri) {
                Ok(true) => return,
                Ok(false) => debug!("reconciler: no call matches {}", uri),
                Err(e) => warn!("reconciler: hang-up for {} failed: {}", uri, e),
            }
        }

        if let Err(e) = self.terminate_current_or_all() {
            warn!("reconciler: hang-up failed: {}", e);
        }
    }

    /// Terminate the call whose peer carries the session marker of `uri`.
    ///
    /// Returns `Ok(true)` when the request has been dealt with, including the
    /// case where a call is up but the requested one is already gone.
    fn terminate_by_marker(&mut self, uri: &str) -> Result<bool> {
        let marker = session_marker(uri);
        if marker.is_empty() {
            return Ok(false);
        }

        let current = self.telephony().current_call()?;
        if let Some(call) = &current {
            if call.peer_address.contains(&marker) {
                info!("reconciler: hanging up current call {}", call.id);
                self.telephony_mut().terminate(call.id)?;
                return Ok(true);
            }
        }

        let calls = self.telephony().calls()?;
        let candidates = || {
            calls
                .iter()
                .filter(|c| !c.state.is_terminated() && c.peer_address.contains(&marker))
        };
        if let Some(call) = candidates()
            .find(|c| c.state == CallState::Paused)
            .or_else(|| candidates().next())
        {
            info!("reconciler: hanging up call {} ({:?})", call.id, call.state);
            self.telephony_mut().terminate(call.id)?;
            return Ok(true);
        }

        if current.is_some() {
            info!("reconciler: call for {} already gone", marker);
            return Ok(true);
        }
        Ok(false)
    }

    fn terminate_current_or_all(&mut self) -> Result<()> {
        match self.telephony().current_call()? {
            Some(call) => self.telephony_mut().terminate(call.id),
            None => self.telephony_mut().terminate_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::call::{CallId, CallSnapshot, Direction};
    use crate::reconciler::Policy;
    use crate::testing::{FakeTelephony, RecordingSink};

    fn reconciler() -> Reconciler<FakeTelephony, RecordingSink> {
        Reconciler::new(FakeTelephony::default(), RecordingSink::default(), Policy::default())
    }

    fn snap(id: u64, peer: &str, state: CallState) -> CallSnapshot {
        CallSnapshot::new(CallId(id), Direction::Incoming, peer, state)
    }

    #[test]
    fn decodes_bridge_uris() {
        assert_eq!(decode_dial_uri("sip:201%40pbx.local"), "201@pbx.local");
        assert_eq!(
            decode_dial_uri("clbsessionid9%40pbx%3A5060;transport=?x=1"),
            "clbsessionid9@pbx:5060;transport=udp?x=1"
        );
        assert_eq!(
            decode_dial_uri("alice@pbx;transport=?"),
            "alice@pbx;transport=?"
        );
    }

    #[test]
    fn dial_begins_session_and_places_call() {
        let mut r = reconciler();
        r.handle_command(
            Command::Dial {
                uri: "sip:clbsessionid5%40pbx".into(),
            },
            Instant::now(),
        );

        assert_eq!(r.telephony().dialed, vec!["clbsessionid5@pbx".to_string()]);
        assert!(r.session().is_active());
        assert!(r.session().owns("sip:clbsessionid5@pbx;transport=udp"));
    }

    #[test]
    fn hangup_by_uri_finds_paused_call() {
        let mut r = reconciler();
        r.telephony_mut().calls = vec![
            snap(1, "sip:alice@pbx", CallState::StreamsRunning),
            snap(2, "sip:ward clbsessionid5@pbx", CallState::Paused),
        ];
        r.telephony_mut().current = Some(CallId(1));

        let now = Instant::now();
        r.handle_command(
            Command::Hangup {
                uri: Some("sip:Ward ClbSessionId5@pbx".into()),
            },
            now,
        );

        assert_eq!(r.telephony().terminated, vec![CallId(2)]);
        assert!(r.is_just_hung_up(now + Duration::from_secs(1)));
    }

    #[test]
    fn hangup_by_uri_prefers_paused_call() {
        let mut r = reconciler();
        r.telephony_mut().calls = vec![
            snap(1, "sip:clbsessionid5@pbx", CallState::IncomingReceived),
            snap(2, "sip:clbsessionid5@pbx", CallState::Paused),
        ];

        r.handle_command(
            Command::Hangup {
                uri: Some("clbsessionid5@pbx".into()),
            },
            Instant::now(),
        );
        assert_eq!(r.telephony().terminated, vec![CallId(2)]);
    }

    #[test]
    fn hangup_for_gone_call_leaves_current_call() {
        let mut r = reconciler();
        r.telephony_mut().calls = vec![snap(1, "sip:alice@pbx", CallState::StreamsRunning)];
        r.telephony_mut().current = Some(CallId(1));

        r.handle_command(
            Command::Hangup {
                uri: Some("clbsessionid77@pbx".into()),
            },
            Instant::now(),
        );
        assert!(r.telephony().terminated.is_empty());
        assert_eq!(r.telephony().terminated_all, 0);
    }

    #[test]
    fn hangup_without_uri_ends_current_or_all() {
        let mut r = reconciler();
        r.telephony_mut().calls = vec![snap(1, "sip:alice@pbx", CallState::StreamsRunning)];
        r.telephony_mut().current = Some(CallId(1));
        r.handle_command(Command::Hangup { uri: None }, Instant::now());
        assert_eq!(r.telephony().terminated, vec![CallId(1)]);

        r.telephony_mut().current = None;
        r.handle_command(Command::Hangup { uri: None }, Instant::now());
        assert_eq!(r.telephony().terminated_all, 1);
    }

    #[test]
    fn logout_clears_session() {
        let mut r = reconciler();
        r.handle_command(
            Command::SetCallUri {
                uri: "clbsessionid5@pbx".into(),
            },
            Instant::now(),
        );
        assert!(r.session().is_active());

        r.handle_command(Command::Logout, Instant::now());
        assert!(!r.session().has_history());
    }
}
