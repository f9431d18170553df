//! Frame timing
//!
//! Drift-free frame scheduling on a monotonic microsecond clock. The next
//! deadline is absolute and advances by exactly one period per tick; waiting
//! is a sleep/spin hybrid decided by [`WaitPolicy`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time for the frame scheduler
pub trait Clock: Send + 'static {
    /// Microseconds since an arbitrary fixed origin
    fn now_micros(&self) -> u64;

    /// Yield the CPU for roughly `duration`
    fn sleep(&self, duration: Duration);

    /// Busy-wait briefly without yielding
    fn spin(&self);
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn spin(&self) {
        for _ in 0..75 {
            std::hint::spin_loop();
        }
    }
}

/// Simulated clock for deterministic scheduling tests.
///
/// Time only moves when the scheduler sleeps or spins, or when a test calls
/// [`ManualClock::advance`]. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    spin_step_us: u64,
}

impl ManualClock {
    /// Create a clock at time zero; each spin advances it by `spin_step_us`
    pub fn new(spin_step_us: u64) -> Self {
        ManualClock {
            now: Arc::new(AtomicU64::new(0)),
            spin_step_us: spin_step_us.max(1),
        }
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn spin(&self) {
        self.now.fetch_add(self.spin_step_us, Ordering::SeqCst);
    }
}

/// What the scheduler does with the time left before a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAction {
    /// Deadline reached or passed: tick now
    Fire,
    /// Far from the deadline: yield the CPU for this long
    Sleep(Duration),
    /// Close to the deadline: busy-wait
    Spin,
}

/// Sleep/spin hybrid wait policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Below this much remaining time the scheduler spins instead of sleeping
    pub spin_threshold: Duration,
    /// Length of one coarse sleep
    pub sleep_granularity: Duration,
}

impl WaitPolicy {
    /// Decide how to wait given the signed microseconds left to the deadline
    pub fn action(&self, remaining_us: i64) -> WaitAction {
        if remaining_us <= 0 {
            WaitAction::Fire
        } else if remaining_us as u128 > self.spin_threshold.as_micros() {
            WaitAction::Sleep(self.sleep_granularity)
        } else {
            WaitAction::Spin
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        TimingConfig::default().policy()
    }
}

/// Serializable wait policy settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Spin when at most this many microseconds remain (default 2000)
    pub spin_threshold_us: u64,
    /// Coarse sleep length in microseconds (default 1000)
    pub sleep_granularity_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            spin_threshold_us: 2_000,
            sleep_granularity_us: 1_000,
        }
    }
}

impl TimingConfig {
    /// Build the runtime wait policy
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            spin_threshold: Duration::from_micros(self.spin_threshold_us),
            sleep_granularity: Duration::from_micros(self.sleep_granularity_us),
        }
    }
}

/// Tick period in microseconds for a frame rate; `None` for rate 0
pub fn period_micros(frame_rate_hz: u32) -> Option<u64> {
    if frame_rate_hz == 0 {
        None
    } else {
        Some(1_000_000 / u64::from(frame_rate_hz))
    }
}

/// One frame-pump wait loop, advanced one iteration at a time
#[derive(Debug)]
pub struct FrameScheduler<C: Clock> {
    clock: C,
    policy: WaitPolicy,
    period_us: u64,
    origin_us: u64,
    next_deadline_us: u64,
    ticks: u64,
}

impl<C: Clock> FrameScheduler<C> {
    /// Create a scheduler whose first deadline is the current instant
    pub fn new(clock: C, frame_rate_hz: u32, policy: WaitPolicy) -> crate::Result<Self> {
        let period_us = period_micros(frame_rate_hz).ok_or_else(|| {
            crate::YmSerialError::ConfigError("frame rate must be non-zero".to_string())
        })?;
        let origin_us = clock.now_micros();
        Ok(FrameScheduler {
            clock,
            policy,
            period_us,
            origin_us,
            next_deadline_us: origin_us,
            ticks: 0,
        })
    }

    /// Run one loop iteration.
    ///
    /// Returns `true` when a tick is due; the deadline has then already been
    /// advanced by one period. Late ticks are not dropped: each call past the
    /// deadline fires immediately until the schedule has caught up.
    pub fn step(&mut self) -> bool {
        let now = self.clock.now_micros();
        let remaining = self.next_deadline_us as i64 - now as i64;
        match self.policy.action(remaining) {
            WaitAction::Fire => {
                self.next_deadline_us += self.period_us;
                self.ticks += 1;
                true
            }
            WaitAction::Sleep(duration) => {
                self.clock.sleep(duration);
                false
            }
            WaitAction::Spin => {
                self.clock.spin();
                false
            }
        }
    }

    /// Tick period in microseconds
    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Deadline of the next tick, in clock microseconds
    pub fn next_deadline_us(&self) -> u64 {
        self.next_deadline_us
    }

    /// Deadline of tick `k` (zero-based) relative to the clock's origin
    pub fn deadline_of(&self, k: u64) -> u64 {
        self.origin_us + k * self.period_us
    }

    /// Ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The scheduler's clock
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
