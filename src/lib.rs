//! YM Chiptune Streamer for Real YM2149 Hardware
//!
//! Decodes YM register-dump files and replays them, one 16-byte register frame per
//! tick, to physical YM2149 / AY-3-8910 chips behind a byte-oriented serial link.
//! No audio is synthesized here: the output is a stream of register writes.
//!
//! # Features
//! - YM3, YM3b, YM5 and YM6 decoding into one revision-agnostic [`DecodedSong`]
//! - DigiDrum sample tables (4-bit and unsigned sample conversion)
//! - YM6 timer effect extraction (SID-style timer synth, DigiDrum triggers)
//! - Up to three chips driven in lock-step from one frame clock ([`SongSet`])
//! - A dedicated real-time [`FramePump`] with hybrid sleep/spin waiting
//! - 17-byte packet transport abstraction
//!
//! # Crate feature flags
//! - `compression` (default): transparent LHA/LZH extraction in [`ym_loader`]
//! - `cli` (default): the `ym-serial` command line player
//!
//! # Quick start
//! ## Decode a song
//! ```no_run
//! use ym2149_serial::ym_parser::decode;
//! let data = std::fs::read("song.ym").unwrap();
//! let song = decode(&data).unwrap();
//! println!("{} frames @ {} Hz", song.frame_count(), song.metadata().frame_rate_hz);
//! ```
//!
//! ## Drive a chip at the song's frame rate
//! ```no_run
//! use ym2149_serial::replayer::{FramePump, SongSet};
//! use ym2149_serial::transport::{Packet, Transport, WriterTransport};
//! use ym2149_serial::ym_parser::decode;
//!
//! let song = decode(&std::fs::read("song.ym").unwrap()).unwrap();
//! let mut set = SongSet::new();
//! set.insert(0, song).unwrap();
//! let mut port = WriterTransport::open("/dev/ttyUSB0").unwrap();
//! let mut frame = 0;
//! let pump = FramePump::start(set.frame_rate_hz(), move |handle| {
//!     match set.frame_at(0, frame) {
//!         Some(regs) => {
//!             let _ = port.send(&Packet::new(0, regs));
//!         }
//!         None => handle.stop(),
//!     }
//!     frame += 1;
//! })
//! .unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! pump.stop();
//! ```

#![warn(missing_docs)]

pub mod config; // Player Configuration
pub mod replayer; // Song Sets, Frame Pump & Playback Session
pub mod transport; // Packet Transport
pub mod ym_loader; // YM File I/O
pub mod ym_parser; // YM Format Parsing

/// Error types for YM streaming operations
#[derive(thiserror::Error, Debug)]
pub enum YmSerialError {
    /// The file could not be decoded
    #[error("Format error: {0}")]
    Format(#[from] ym_parser::FormatError),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Packet could not be delivered
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for YmSerialError {
    /// Converts a String into `YmSerialError::Other`.
    ///
    /// Prefer the specific variants (`ConfigError`, `DecompressionError`) where the
    /// failure has a known category.
    fn from(msg: String) -> Self {
        YmSerialError::Other(msg)
    }
}

impl From<&str> for YmSerialError {
    fn from(msg: &str) -> Self {
        YmSerialError::Other(msg.to_string())
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, YmSerialError>;

// Public API exports
pub use config::PlayerConfig;
pub use replayer::{
    FramePump, PlaybackSession, PumpHandle, SessionOptions, SessionStats, SongSet, TickOutcome,
};
pub use transport::{NullTransport, Packet, Transport, TransportError, WriterTransport};
#[cfg(feature = "compression")]
pub use ym_loader::decompress_if_needed;
pub use ym_loader::{group_by_song, load_file, load_song, SongGroup};
pub use ym_parser::effects::{effects_for_frame, Effect};
pub use ym_parser::{
    decode, ChipRegisterFrame, DecodedSong, DigiDrumSample, FormatError, FormatRevision,
    SongAttributes, SongMetadata,
};
