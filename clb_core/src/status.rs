use core::fmt;

/// The small status vocabulary the hardware integration understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifiedStatus {
    Idle,
    Ringing,
    Connected,
    Paused,
    /// Idle as far as the reporting call goes, but another call is still up.
    IdleInactive,
}

impl UnifiedStatus {
    /// Wire name used in the outbound `state` field.
    pub fn as_str(self) -> &'static str {
        match self {
            UnifiedStatus::Idle => "idle",
            UnifiedStatus::Ringing => "ringing",
            UnifiedStatus::Connected => "connected",
            UnifiedStatus::Paused => "paused",
            UnifiedStatus::IdleInactive => "idleinactive",
        }
    }
}

impl fmt::Display for UnifiedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification for the hardware integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: UnifiedStatus,
    pub address: String,
}

impl StatusUpdate {
    pub fn new(status: UnifiedStatus, address: &str) -> Self {
        Self {
            status,
            address: address.to_string(),
        }
    }
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state={} address={}", self.status, self.address)
    }
}
