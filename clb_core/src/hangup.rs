use std::time::{Duration, Instant};

/// Remembers when the bridge last asked for a hang-up, so a call screen
/// that was just closed is not reopened straight away.
#[derive(Debug, Clone)]
pub struct HangupClock {
    window: Duration,
    last: Option<Instant>,
}

impl HangupClock {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn register(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn is_just_hung_up(&self, now: Instant) -> bool {
        self.last
            .map(|at| now.saturating_duration_since(at) < self.window)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_expires() {
        let mut clock = HangupClock::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(!clock.is_just_hung_up(t0));

        clock.register(t0);
        assert!(clock.is_just_hung_up(t0 + Duration::from_secs(4)));
        assert!(!clock.is_just_hung_up(t0 + Duration::from_secs(5)));
    }
}
