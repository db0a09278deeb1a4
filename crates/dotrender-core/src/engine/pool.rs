//! Pooled dispatch across non-reentrant engine instances.
//!
//! A pool owns N independent engine instances and hands each incoming
//! render exclusive use of one idle entry. Callers that find every entry
//! busy block and are served strictly first-come-first-served through a
//! ticket queue, or fail fast with `PoolExhausted` when configured so.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::request::{EngineResult, RenderRequest};

use super::Engine;

/// Grace period used when the pool is shut down through [`Engine::shutdown`].
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// What to do when all entries are busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquirePolicy {
    /// Block in FIFO order until an entry is released.
    #[default]
    Block,
    /// Fail immediately with [`Error::PoolExhausted`].
    FailFast,
}

/// One pooled engine instance. Exclusively owned by a single caller
/// while busy; ownership is tracked through the idle index list.
struct PoolEntry {
    engine: Box<dyn Engine>,
}

struct PoolState {
    /// Indices of idle entries.
    idle: Vec<usize>,
    /// Number of entries currently held by callers.
    busy: usize,
    /// FIFO queue of waiting callers.
    queue: VecDeque<u64>,
    next_ticket: u64,
    stopped: bool,
}

/// Engine providing concurrent throughput over serialized engine types.
pub struct PoolEngine {
    entries: Vec<PoolEntry>,
    state: Mutex<PoolState>,
    changed: Condvar,
    policy: AcquirePolicy,
}

impl std::fmt::Debug for PoolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEngine")
            .field("entries", &self.entries.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PoolEngine {
    /// Instantiate a pool of `size` engines built by `factory`.
    pub fn start<F>(size: usize, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<Box<dyn Engine>>,
    {
        Self::start_with_policy(size, AcquirePolicy::Block, factory)
    }

    pub fn start_with_policy<F>(size: usize, policy: AcquirePolicy, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<Box<dyn Engine>>,
    {
        if size == 0 {
            return Err(Error::Configuration("pool size must be at least 1".into()));
        }
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            entries.push(PoolEntry { engine: factory()? });
        }
        tracing::debug!(size, "engine pool started");
        Ok(Self {
            state: Mutex::new(PoolState {
                idle: (0..entries.len()).rev().collect(),
                busy: 0,
                queue: VecDeque::new(),
                next_ticket: 0,
                stopped: false,
            }),
            entries,
            changed: Condvar::new(),
            policy,
        })
    }

    /// Number of entries not currently held by a caller.
    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    /// Drain in-flight work for up to `grace`, then reclaim. Idempotent.
    ///
    /// Blocked acquirers are woken and fail with a configuration error;
    /// renders already running on an entry finish normally (or keep
    /// running past the grace period, at which point the pool no longer
    /// waits for them).
    pub fn stop(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        self.changed.notify_all();

        while state.busy > 0 {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(busy = state.busy, "pool stop grace period expired");
                break;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
        drop(state);

        for entry in &self.entries {
            entry.engine.shutdown();
        }
        tracing::debug!("engine pool stopped");
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire exclusive use of an idle entry.
    fn acquire(&self) -> Result<EntryGuard<'_>> {
        let mut state = self.lock();
        if state.stopped {
            return Err(Error::Configuration("engine pool is stopped".into()));
        }

        if self.policy == AcquirePolicy::FailFast {
            return match state.idle.pop() {
                Some(index) => {
                    state.busy += 1;
                    Ok(EntryGuard { pool: self, index })
                }
                None => Err(Error::PoolExhausted),
            };
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            if state.stopped {
                state.queue.retain(|&t| t != ticket);
                return Err(Error::Configuration("engine pool is stopped".into()));
            }
            if state.queue.front() == Some(&ticket)
                && let Some(index) = state.idle.pop()
            {
                state.queue.pop_front();
                state.busy += 1;
                // Later tickets may still be servable if more entries are idle.
                self.changed.notify_all();
                return Ok(EntryGuard { pool: self, index });
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn release(&self, index: usize) {
        let mut state = self.lock();
        state.idle.push(index);
        state.busy -= 1;
        self.changed.notify_all();
    }
}

/// Returns the entry to the idle set when dropped, whatever the render
/// outcome was.
struct EntryGuard<'a> {
    pool: &'a PoolEngine,
    index: usize,
}

impl EntryGuard<'_> {
    fn engine(&self) -> &dyn Engine {
        self.pool.entries[self.index].engine.as_ref()
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl Engine for PoolEngine {
    fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        let entry = self.acquire()?;
        entry.engine().render(request)
    }

    fn name(&self) -> &str {
        "pool"
    }

    fn shutdown(&self) {
        self.stop(DEFAULT_STOP_GRACE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Engine that tracks how many renders run simultaneously.
    struct CountingEngine {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Engine for CountingEngine {
        fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(EngineResult::from_text(
                request.format,
                format!("<svg>{}</svg>", request.source),
            ))
        }
    }

    fn counting_pool(
        size: usize,
        delay: Duration,
    ) -> (PoolEngine, Arc<AtomicUsize>) {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let peak_out = Arc::clone(&peak);
        let pool = PoolEngine::start(size, move || {
            Ok(Box::new(CountingEngine {
                current: Arc::clone(&current),
                peak: Arc::clone(&peak),
                delay,
            }) as Box<dyn Engine>)
        })
        .unwrap();
        (pool, peak_out)
    }

    #[test]
    fn all_requests_complete_with_bounded_concurrency() {
        let (pool, peak) = counting_pool(2, Duration::from_millis(30));
        let pool = Arc::new(pool);

        let mut handles = Vec::new();
        for i in 0..6 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let request = RenderRequest::new(format!("graph g{{number{i}}}"), Format::Svg);
                pool.render(&request).unwrap().text()
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let text = handle.join().unwrap();
            assert!(text.contains(&format!("number{i}")), "{text}");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2, "more than 2 entries busy");
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn concurrent_results_are_not_cross_contaminated() {
        let (pool, _) = counting_pool(2, Duration::from_millis(10));
        let pool = Arc::new(pool);

        let a = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.render(&RenderRequest::new("graph {alpha}", Format::Svg))
                    .unwrap()
                    .text()
            })
        };
        let b = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.render(&RenderRequest::new("graph {beta}", Format::Svg))
                    .unwrap()
                    .text()
            })
        };

        let a = a.join().unwrap();
        let b = b.join().unwrap();
        assert!(a.contains("alpha") && !a.contains("beta"));
        assert!(b.contains("beta") && !b.contains("alpha"));
    }

    #[test]
    fn fail_fast_pool_reports_exhaustion() {
        let slow = Arc::new(
            PoolEngine::start_with_policy(1, AcquirePolicy::FailFast, || {
                Ok(Box::new(CountingEngine {
                    current: Arc::new(AtomicUsize::new(0)),
                    peak: Arc::new(AtomicUsize::new(0)),
                    delay: Duration::from_millis(200),
                }) as Box<dyn Engine>)
            })
            .unwrap(),
        );

        let background = {
            let slow = Arc::clone(&slow);
            thread::spawn(move || {
                slow.render(&RenderRequest::new("graph {x}", Format::Svg))
                    .unwrap()
            })
        };
        thread::sleep(Duration::from_millis(50));

        let err = slow
            .render(&RenderRequest::new("graph {y}", Format::Svg))
            .unwrap_err();
        assert!(matches!(err, Error::PoolExhausted));
        background.join().unwrap();
    }

    #[test]
    fn stop_is_idempotent_and_rejects_new_work() {
        let (pool, _) = counting_pool(2, Duration::from_millis(1));
        pool.stop(Duration::from_secs(1));
        pool.stop(Duration::from_secs(1));

        let err = pool
            .render(&RenderRequest::new("graph {z}", Format::Svg))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn stop_drains_in_flight_work() {
        let (pool, _) = counting_pool(1, Duration::from_millis(100));
        let pool = Arc::new(pool);

        let worker = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.render(&RenderRequest::new("graph {w}", Format::Svg))
            })
        };
        thread::sleep(Duration::from_millis(20));
        pool.stop(Duration::from_secs(2));

        // The in-flight render completed despite the stop.
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn zero_size_pool_is_rejected() {
        let err = PoolEngine::start(0, || unreachable!()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn factory_failure_propagates() {
        let err = PoolEngine::start(2, || Err(Error::execution("cannot boot"))).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
    }
}
