//! Real-time frame pump
//!
//! Runs a [`FrameScheduler`] on a dedicated named thread and invokes a tick
//! callback once per frame period. The callback runs on the pump thread, so
//! all per-tick state is owned by the closure.
//!
//! The thread asks the OS for maximum priority before entering the loop. A
//! refusal (common for unprivileged users) is logged and the pump runs at
//! normal priority.

use super::timing::{Clock, FrameScheduler, MonotonicClock, WaitPolicy};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use thread_priority::{set_current_thread_priority, ThreadPriority};

/// Attempt to raise the calling thread's scheduling priority
type PriorityRequest = fn() -> Result<(), String>;

fn request_max_priority() -> Result<(), String> {
    set_current_thread_priority(ThreadPriority::Max).map_err(|e| format!("{:?}", e))
}

/// Lifecycle of a pump thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Thread spawned, loop not yet entered
    Created,
    /// Loop is running
    Running,
    /// Loop has exited
    Stopped,
}

impl PumpState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PumpState::Created,
            1 => PumpState::Running,
            _ => PumpState::Stopped,
        }
    }
}

struct PumpShared {
    stop: AtomicBool,
    state: AtomicU8,
    ticks: AtomicU64,
    elevated: AtomicBool,
    frame_rate_hz: u32,
    thread_id: OnceLock<ThreadId>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl PumpShared {
    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);

        // From inside a tick: the loop exits once the callback returns
        if self.thread_id.get() == Some(&thread::current().id()) {
            return;
        }

        // Hold the lock while joining so concurrent stops also wait
        let mut join = self.join.lock();
        if let Some(handle) = join.take() {
            if handle.join().is_err() {
                tracing::warn!("frame pump thread panicked");
            }
        }
    }
}

/// Marks the pump stopped when the loop exits, including by panic
struct StateGuard<'a>(&'a AtomicU8);

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(PumpState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Cloneable handle for stopping and inspecting a running pump
#[derive(Clone)]
pub struct PumpHandle {
    shared: Arc<PumpShared>,
}

impl PumpHandle {
    /// Request the pump to stop.
    ///
    /// Idempotent. From any thread but the pump's own this waits for the
    /// loop to exit; from inside the tick callback it returns immediately and
    /// no further tick fires.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Whether a stop has been requested
    pub fn is_stopping(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Whether the pump thread runs at elevated priority
    pub fn is_elevated(&self) -> bool {
        self.shared.elevated.load(Ordering::SeqCst)
    }

    /// Rate the pump was started with
    pub fn frame_rate_hz(&self) -> u32 {
        self.shared.frame_rate_hz
    }

    /// Current lifecycle state
    pub fn state(&self) -> PumpState {
        PumpState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }
}

/// Dedicated tick thread; dropping it stops the thread
pub struct FramePump {
    handle: PumpHandle,
}

impl FramePump {
    /// Start ticking at `frame_rate_hz` on the system monotonic clock
    pub fn start<F>(frame_rate_hz: u32, on_tick: F) -> crate::Result<Self>
    where
        F: FnMut(&PumpHandle) + Send + 'static,
    {
        Self::start_with(
            MonotonicClock::new(),
            frame_rate_hz,
            WaitPolicy::default(),
            on_tick,
        )
    }

    /// Start ticking with an explicit clock and wait policy
    pub fn start_with<C, F>(
        clock: C,
        frame_rate_hz: u32,
        policy: WaitPolicy,
        on_tick: F,
    ) -> crate::Result<Self>
    where
        C: Clock,
        F: FnMut(&PumpHandle) + Send + 'static,
    {
        Self::spawn(clock, frame_rate_hz, policy, request_max_priority, on_tick)
    }

    fn spawn<C, F>(
        clock: C,
        frame_rate_hz: u32,
        policy: WaitPolicy,
        raise_priority: PriorityRequest,
        mut on_tick: F,
    ) -> crate::Result<Self>
    where
        C: Clock,
        F: FnMut(&PumpHandle) + Send + 'static,
    {
        let mut scheduler = FrameScheduler::new(clock, frame_rate_hz, policy)?;

        let shared = Arc::new(PumpShared {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(PumpState::Created as u8),
            ticks: AtomicU64::new(0),
            elevated: AtomicBool::new(false),
            frame_rate_hz,
            thread_id: OnceLock::new(),
            join: Mutex::new(None),
        });
        let handle = PumpHandle {
            shared: Arc::clone(&shared),
        };
        let thread_handle = handle.clone();

        let join = thread::Builder::new()
            .name("ym-frame-pump".into())
            .spawn(move || {
                let shared = &thread_handle.shared;
                let _ = shared.thread_id.set(thread::current().id());
                match raise_priority() {
                    Ok(()) => shared.elevated.store(true, Ordering::SeqCst),
                    Err(error) => tracing::warn!(
                        %error,
                        "could not raise frame pump priority, running at normal priority"
                    ),
                }
                let _guard = StateGuard(&shared.state);
                shared
                    .state
                    .store(PumpState::Running as u8, Ordering::SeqCst);
                tracing::debug!(
                    rate_hz = shared.frame_rate_hz,
                    period_us = scheduler.period_us(),
                    elevated = shared.elevated.load(Ordering::SeqCst),
                    "frame pump started"
                );

                while !shared.stop.load(Ordering::SeqCst) {
                    if !scheduler.step() {
                        continue;
                    }
                    if shared.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    shared.ticks.fetch_add(1, Ordering::SeqCst);
                    on_tick(&thread_handle);
                }

                tracing::debug!(ticks = scheduler.ticks(), "frame pump stopped");
            })?;

        *shared.join.lock() = Some(join);
        Ok(FramePump { handle })
    }

    /// Stop the pump and wait for its thread (unless called from the tick callback)
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A cloneable handle to this pump
    pub fn handle(&self) -> PumpHandle {
        self.handle.clone()
    }

    /// Ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.handle.ticks()
    }

    /// Whether the loop is still running and no stop was requested
    pub fn is_running(&self) -> bool {
        !self.handle.is_stopping() && self.handle.state() != PumpState::Stopped
    }

    /// Current lifecycle state
    pub fn state(&self) -> PumpState {
        self.handle.state()
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.handle.stop();
    }
}
