use core::fmt;

/// Opaque handle the telephony engine assigns to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Lifecycle states reported by the telephony engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    IncomingReceived,
    IncomingEarlyMedia,
    OutgoingInit,
    StreamsRunning,
    UpdatedByRemote,
    Paused,
    End,
    Error,
}

impl CallState {
    pub fn is_terminated(self) -> bool {
        matches!(self, CallState::End | CallState::Error)
    }
}

/// What the engine reported about one call when an event fired.
///
/// Snapshots are never kept across events: the engine may invalidate or
/// replace the underlying call at any time, so anything that needs the call
/// later keeps its [`CallId`] and asks the engine again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub id: CallId,
    pub direction: Direction,
    /// Remote URI, lower-cased.
    pub peer_address: String,
    pub state: CallState,
    /// Call this one replaces (attended transfer), if any.
    pub replaces: Option<CallId>,
}

impl CallSnapshot {
    pub fn new(id: CallId, direction: Direction, peer_address: &str, state: CallState) -> Self {
        Self {
            id,
            direction,
            peer_address: peer_address.trim().to_lowercase(),
            state,
            replaces: None,
        }
    }

    pub fn replacing(mut self, replaced: CallId) -> Self {
        self.replaces = Some(replaced);
        self
    }

    pub fn is_transfer_replacement(&self) -> bool {
        self.replaces.is_some()
    }
}

/// One lifecycle notification from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub call: CallSnapshot,
    pub state: CallState,
    pub message: String,
}

impl CallEvent {
    pub fn new(call: CallSnapshot, message: &str) -> Self {
        Self {
            state: call.state,
            call,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_lowercases_peer() {
        let snap = CallSnapshot::new(
            CallId(3),
            Direction::Incoming,
            " SIP:Alice@Example.COM ",
            CallState::IncomingReceived,
        );
        assert_eq!(snap.peer_address, "sip:alice@example.com");
        assert!(!snap.is_transfer_replacement());
        assert!(snap.replacing(CallId(1)).is_transfer_replacement());
    }

    #[test]
    fn terminated_states() {
        assert!(CallState::End.is_terminated());
        assert!(CallState::Error.is_terminated());
        assert!(!CallState::Paused.is_terminated());
    }
}
