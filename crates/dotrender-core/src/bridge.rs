//! One-shot bridge from callback completion to a blocking wait.
//!
//! Script backends complete asynchronously by invoking `result`, `error`
//! or `log` callables. The bridge converts that into the synchronous
//! render contract: `submit` opens a cycle, exactly one terminal callback
//! closes it, `wait_for` blocks until then.
//!
//! A bridge carries at most one outstanding cycle. Callbacks holding a
//! token from an earlier cycle (for example after a timeout abandoned the
//! wait) are ignored as stale.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Token identifying one submit/complete cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleToken(u64);

#[derive(Debug)]
struct CycleState {
    /// Current cycle number; bumped on submit and on timeout.
    cycle: u64,
    outcome: Option<std::result::Result<String, String>>,
    log: Vec<String>,
}

/// Converts callback-style completion into a blocking wait.
#[derive(Debug)]
pub struct ResultBridge {
    state: Mutex<CycleState>,
    completed: Condvar,
}

impl Default for ResultBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultBridge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CycleState {
                cycle: 0,
                outcome: None,
                log: Vec::new(),
            }),
            completed: Condvar::new(),
        }
    }

    /// Open a new cycle, discarding any state from the previous one.
    ///
    /// The returned token must be threaded through to the callbacks and
    /// the matching [`wait_for`](Self::wait_for).
    pub fn submit(&self) -> CycleToken {
        let mut state = self.lock();
        state.cycle += 1;
        state.outcome = None;
        state.log.clear();
        CycleToken(state.cycle)
    }

    /// Record successful completion for the given cycle.
    pub fn set_result(&self, token: CycleToken, value: String) {
        self.complete(token, Ok(value));
    }

    /// Record failed completion for the given cycle.
    pub fn set_error(&self, token: CycleToken, message: String) {
        self.complete(token, Err(message));
    }

    /// Append a diagnostic line without completing the cycle.
    pub fn log(&self, token: CycleToken, line: String) {
        let mut state = self.lock();
        if state.cycle == token.0 {
            state.log.push(line);
        }
    }

    fn complete(&self, token: CycleToken, outcome: std::result::Result<String, String>) {
        let mut state = self.lock();
        if state.cycle != token.0 {
            tracing::debug!(cycle = token.0, "ignoring stale bridge completion");
            return;
        }
        if state.outcome.is_some() {
            tracing::warn!(cycle = token.0, "bridge completed twice, keeping first outcome");
            return;
        }
        state.outcome = Some(outcome);
        self.completed.notify_all();
    }

    /// Block until the cycle completes or `timeout` elapses.
    ///
    /// On success returns the result value and the accumulated log lines.
    /// On timeout the cycle is invalidated so a late terminal callback
    /// cannot leak into a later cycle.
    pub fn wait_for(&self, token: CycleToken, timeout: Duration) -> Result<(String, Vec<String>)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.cycle != token.0 {
                return Err(Error::execution("bridge cycle was superseded while waiting"));
            }
            if let Some(outcome) = state.outcome.take() {
                let log = std::mem::take(&mut state.log);
                return match outcome {
                    Ok(value) => Ok((value, log)),
                    Err(message) => Err(Error::Execution {
                        message,
                        context: log.last().cloned(),
                    }),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                // Invalidate the cycle so late callbacks are dropped.
                state.cycle += 1;
                return Err(Error::Timeout(timeout));
            }
            let (guard, _) = self
                .completed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn result_before_wait_returns_immediately() {
        let bridge = ResultBridge::new();
        let token = bridge.submit();
        bridge.log(token, "starting".into());
        bridge.set_result(token, "<svg/>".into());

        let (value, log) = bridge.wait_for(token, Duration::from_secs(1)).unwrap();
        assert_eq!(value, "<svg/>");
        assert_eq!(log, vec!["starting".to_string()]);
    }

    #[test]
    fn error_carries_message() {
        let bridge = ResultBridge::new();
        let token = bridge.submit();
        bridge.set_error(token, "bad graph".into());

        let err = bridge.wait_for(token, Duration::from_secs(1)).unwrap_err();
        match err {
            Error::Execution { message, .. } => assert_eq!(message, "bad graph"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn times_out_at_deadline_not_before() {
        let bridge = ResultBridge::new();
        let token = bridge.submit();

        let timeout = Duration::from_millis(100);
        let start = Instant::now();
        let err = bridge.wait_for(token, timeout).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(elapsed < timeout * 10, "unbounded wait: {elapsed:?}");
    }

    #[test]
    fn late_callback_after_timeout_is_stale() {
        let bridge = ResultBridge::new();
        let token = bridge.submit();
        let _ = bridge.wait_for(token, Duration::from_millis(10)).unwrap_err();

        // Arrives after the timeout invalidated the cycle.
        bridge.set_result(token, "late".into());

        // Next cycle is unaffected by the stale completion.
        let next = bridge.submit();
        bridge.set_result(next, "fresh".into());
        let (value, _) = bridge.wait_for(next, Duration::from_secs(1)).unwrap();
        assert_eq!(value, "fresh");
    }

    #[test]
    fn first_terminal_callback_wins() {
        let bridge = ResultBridge::new();
        let token = bridge.submit();
        bridge.set_result(token, "first".into());
        bridge.set_error(token, "second".into());

        let (value, _) = bridge.wait_for(token, Duration::from_secs(1)).unwrap();
        assert_eq!(value, "first");
    }

    #[test]
    fn completion_from_another_thread_wakes_waiter() {
        let bridge = Arc::new(ResultBridge::new());
        let token = bridge.submit();

        let completer = Arc::clone(&bridge);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            completer.set_result(token, "async".into());
        });

        let (value, _) = bridge.wait_for(token, Duration::from_secs(5)).unwrap();
        assert_eq!(value, "async");
        handle.join().unwrap();
    }

    #[test]
    fn submit_resets_prior_state() {
        let bridge = ResultBridge::new();
        let first = bridge.submit();
        bridge.log(first, "old line".into());
        bridge.set_result(first, "old".into());
        let _ = bridge.wait_for(first, Duration::from_secs(1)).unwrap();

        let second = bridge.submit();
        bridge.set_result(second, "new".into());
        let (value, log) = bridge.wait_for(second, Duration::from_secs(1)).unwrap();
        assert_eq!(value, "new");
        assert!(log.is_empty());
    }
}
