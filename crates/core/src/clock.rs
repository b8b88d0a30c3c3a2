//! Hybrid logical clock
//!
//! Stamps every receipt with `(local_time, logical_counter)`. Output is
//! monotonic under [`HybridTimestamp::causal_cmp`] for all callers sharing
//! one clock instance, regardless of how the wall clock behaves.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use fiscalsync_domain::HybridTimestamp;
use parking_lot::Mutex;
use tracing::warn;

/// Source of wall-clock seconds
pub trait WallClock: Send + Sync + 'static {
    /// Seconds since the Unix epoch
    fn now_secs(&self) -> i64;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

impl<T: WallClock> WallClock for Arc<T> {
    fn now_secs(&self) -> i64 {
        (**self).now_secs()
    }
}

/// Wall clock whose reading is set by hand
///
/// Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualWallClock {
    secs: Arc<AtomicI64>,
}

impl ManualWallClock {
    /// Start at `secs` since the Unix epoch
    pub fn new(secs: i64) -> Self {
        Self { secs: Arc::new(AtomicI64::new(secs)) }
    }

    /// Jump to `secs`; may move backwards
    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    /// Move forward by `secs` (negative moves back)
    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl WallClock for ManualWallClock {
    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ClockState {
    last_time: i64,
    counter: u32,
}

/// Process-wide generator of hybrid timestamps
///
/// Construct one per process and share it by `Arc`; two instances do not
/// coordinate with each other.
pub struct HybridLogicalClock {
    wall: Box<dyn WallClock>,
    state: Mutex<ClockState>,
}

impl std::fmt::Debug for HybridLogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HybridLogicalClock")
            .field("last_time", &state.last_time)
            .field("counter", &state.counter)
            .finish()
    }
}

impl Default for HybridLogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridLogicalClock {
    /// Clock driven by the system time
    pub fn new() -> Self {
        Self::with_wall_clock(SystemWallClock)
    }

    /// Clock driven by `wall`, typically a [`ManualWallClock`] in tests
    pub fn with_wall_clock(wall: impl WallClock) -> Self {
        Self { wall: Box::new(wall), state: Mutex::new(ClockState::default()) }
    }

    /// Produce the next timestamp
    ///
    /// A wall clock that moved backwards does not drag `local_time` below the
    /// last issued value: the last second is kept and the counter advances.
    pub fn generate(&self) -> HybridTimestamp {
        let now = self.wall.now_secs();
        let mut state = self.state.lock();

        if now > state.last_time {
            state.last_time = now;
            state.counter = 0;
        } else {
            if now < state.last_time {
                warn!(
                    wall_secs = now,
                    last_time = state.last_time,
                    skew_secs = state.last_time - now,
                    "hlc.wall_clock_regressed"
                );
            }
            match state.counter.checked_add(1) {
                Some(next) => state.counter = next,
                None => {
                    state.last_time += 1;
                    state.counter = 0;
                }
            }
        }

        HybridTimestamp::new(state.last_time, state.counter)
    }

    /// Last issued `(local_time, counter)`
    pub fn last(&self) -> (i64, u32) {
        let state = self.state.lock();
        (state.last_time, state.counter)
    }
}
