//! Playback Domain
//!
//! Everything between a decoded song and the transport:
//! - [`SongSet`]: up to three songs played in lock-step, one per chip
//! - [`FramePump`]: the real-time tick thread
//! - [`timing`]: drift-free scheduling and the sleep/spin wait policy
//! - [`PlaybackSession`]: per-tick orchestration and playlist transitions

pub mod frame_pump;
pub mod session;
pub mod song_set;
pub mod timing;

pub use frame_pump::{FramePump, PumpHandle, PumpState};
pub use session::{drive, PlaybackSession, SessionOptions, SessionStats, TickOutcome};
pub use song_set::{slot_from_file_name, song_key, SongSet};
pub use timing::{Clock, FrameScheduler, ManualClock, MonotonicClock, TimingConfig, WaitPolicy};
