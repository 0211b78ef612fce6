use std::time::{Duration, Instant};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-tool, per-process circuit breaker. `closed` lets traffic flow;
/// `open` short-circuits every call until `recovery_timeout` elapses, at
/// which point the next call becomes a `half_open` trial.
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    failure_threshold: u32,
    recovery_timeout: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold,
            recovery_timeout,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call should proceed. Has the side effect of promoting
    /// `open` to `half_open` once the recovery deadline has passed.
    pub fn allow_call(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.opened_at.map(|t| t.elapsed() >= self.recovery_timeout).unwrap_or(false) {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
            }
            CircuitState::Closed | CircuitState::Open => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
        }
    }
}

impl std::fmt::Debug for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_exactly_threshold_consecutive_failures() {
        let mut b = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            b.record_failure();
            assert_eq!(b.state(), CircuitState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn open_short_circuits_until_recovery_timeout() {
        let mut b = CircuitBreaker::new(1, Duration::from_millis(50));
        b.record_failure();
        assert!(!b.allow_call());
        std::thread::sleep(Duration::from_millis(60));
        assert!(b.allow_call());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_half_open_failure_reopens() {
        let mut success = CircuitBreaker::new(1, Duration::from_millis(10));
        success.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(success.allow_call());
        success.record_success();
        assert_eq!(success.state(), CircuitState::Closed);

        let mut failure = CircuitBreaker::new(1, Duration::from_millis(10));
        failure.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(failure.allow_call());
        failure.record_failure();
        assert_eq!(failure.state(), CircuitState::Open);
    }
}
