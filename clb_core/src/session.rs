use heapless::Vec as HVec;
use log::{debug, warn};

use crate::address::{matches, normalize, CallIdentity};

const HISTORY_DEPTH: usize = 4;

/// The one logical call attributed to the hardware bridge.
///
/// `primary` is the URI of the call being set up right now; it is dropped as
/// soon as the call leaves the ringing phase. `history` keeps every URI the
/// bridge dialed until the line goes idle, so a call that briefly ends and is
/// replaced mid-transition is still recognized.
#[derive(Debug, Default)]
pub struct HardwareSession {
    primary: Option<CallIdentity>,
    history: HVec<CallIdentity, HISTORY_DEPTH>,
}

impl HardwareSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, uri: &str) {
        let identity = normalize(uri);
        if identity.is_empty() {
            warn!("session: ignoring empty hardware call uri {:?}", uri);
            return;
        }

        debug!("session: begin {}", identity);
        if !self.history.contains(&identity) {
            if self.history.is_full() {
                let dropped = self.history.remove(0);
                debug!("session: history full, forgetting {}", dropped);
            }
            let _ = self.history.push(identity.clone());
        }
        self.primary = Some(identity);
    }

    /// Drop the active URI; history is kept.
    pub fn end(&mut self) {
        self.primary = None;
    }

    /// Forget the session entirely.
    pub fn clear(&mut self) {
        if self.primary.is_some() || !self.history.is_empty() {
            debug!("session: cleared");
        }
        self.primary = None;
        self.history.clear();
    }

    pub fn is_active(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn primary(&self) -> Option<&CallIdentity> {
        self.primary.as_ref()
    }

    pub fn history(&self) -> &[CallIdentity] {
        &self.history
    }

    /// True if `peer_address` belongs to the active or a historical URI.
    pub fn owns(&self, peer_address: &str) -> bool {
        let peer = normalize(peer_address);
        self.primary
            .iter()
            .chain(self.history.iter())
            .any(|uri| matches(&peer, uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_idempotent() {
        let mut once = HardwareSession::new();
        once.begin("clbsessionid123@pbx");

        let mut twice = HardwareSession::new();
        twice.begin("clbsessionid123@pbx");
        twice.begin("clbsessionid123@pbx");

        assert_eq!(once.primary(), twice.primary());
        assert_eq!(once.history(), twice.history());
        assert!(twice.is_active());
    }

    #[test]
    fn end_keeps_history_for_teardown_races() {
        let mut session = HardwareSession::new();
        session.begin("clbsessionid123@pbx;transport=udp");
        session.end();

        assert!(!session.is_active());
        assert!(session.has_history());
        assert!(session.owns("sip:clbsessionid123@pbx"));

        session.clear();
        assert!(!session.owns("sip:clbsessionid123@pbx"));
    }

    #[test]
    fn owns_ignores_other_peers() {
        let mut session = HardwareSession::new();
        session.begin("clbsessionid123@pbx");
        assert!(!session.owns("sip:alice@pbx"));
        assert!(!session.owns(""));
    }

    #[test]
    fn history_is_bounded() {
        let mut session = HardwareSession::new();
        for n in 0..(HISTORY_DEPTH + 2) {
            session.begin(&format!("clbsessionid{n}@pbx"));
        }
        assert_eq!(session.history().len(), HISTORY_DEPTH);
        assert!(!session.owns("sip:clbsessionid0@pbx"));
        assert!(session.owns(&format!("sip:clbsessionid{}@pbx", HISTORY_DEPTH + 1)));
    }

    #[test]
    fn empty_uri_does_not_start_a_session() {
        let mut session = HardwareSession::new();
        session.begin("@pbx");
        assert!(!session.is_active());
        assert!(!session.has_history());
    }
}
