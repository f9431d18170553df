//! File Format Support
//!
//! Decoders for the YM register-dump container:
//! - YM3 / YM3b: headerless register-major dumps (14 registers per frame)
//! - YM5 / YM6: `LeOnArD!` header, metadata strings, DigiDrum table
//! - Effects decoding (YM6 timer effects)
//!
//! Every revision decodes into the same immutable [`DecodedSong`], so code
//! downstream of [`decode`] never needs to know which revision it is handling.

pub mod bytes;
pub mod digidrum;
pub mod effects;
pub mod ym3;
pub mod ym6;

pub use digidrum::DigiDrumSample;
pub use effects::{effects_for_frame, Effect};
pub use ym3::Ym3Parser;
pub use ym6::Ym6Parser;

use bitflags::bitflags;
use std::fmt;
use std::time::Duration;

/// One snapshot of the chip's register file, R0..R15 in index order
pub type ChipRegisterFrame = [u8; 16];

/// Number of registers in a [`ChipRegisterFrame`]
pub const REGISTERS_PER_FRAME: usize = 16;

/// Frame rate used when a file leaves it unspecified (PAL VBL)
pub const DEFAULT_FRAME_RATE_HZ: u32 = 50;

/// Chip clock used when a file leaves it unspecified (Atari ST)
pub const DEFAULT_CHIP_CLOCK_HZ: u32 = 2_000_000;

/// Errors raised while decoding a YM container
///
/// All variants are fatal for the file being decoded; the caller should move on to
/// the next song.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The first four bytes are not a YM magic tag
    #[error("unrecognized magic tag {0:02X?}")]
    BadMagic([u8; 4]),

    /// The `LeOnArD!` check literal did not match
    #[error("check string mismatch: expected \"LeOnArD!\", found {found:?}")]
    ChecksumMismatch {
        /// The eight bytes found in place of the check literal
        found: String,
    },

    /// A declared field or size runs past the end of the buffer
    #[error("truncated {field}: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Field being read
        field: &'static str,
        /// Byte offset of the read
        offset: usize,
        /// Bytes required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// A YM magic this decoder does not handle (YM2, YM4, tracker formats)
    #[error("unsupported YM revision {0:?}")]
    UnsupportedRevision(String),
}

/// Container revision, fixed by the magic tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatRevision {
    /// `YM3!`: register-major dump, no loop information
    V3,
    /// `YM3b`: `YM3!` plus a trailing little-endian loop frame
    V3Extended,
    /// `YM5!`: structured header, metadata and DigiDrums
    V5,
    /// `YM6!`: YM5 layout with timer effects encoded in the register stream
    V6,
}

impl FormatRevision {
    /// Determine the revision from the first four bytes of a buffer
    pub fn from_magic(data: &[u8]) -> Result<Self, FormatError> {
        let magic: [u8; 4] = match data.get(0..4) {
            Some(bytes) => [bytes[0], bytes[1], bytes[2], bytes[3]],
            None => {
                return Err(FormatError::Truncated {
                    field: "magic",
                    offset: 0,
                    needed: 4,
                    available: data.len(),
                })
            }
        };

        match &magic {
            b"YM3!" => Ok(FormatRevision::V3),
            b"YM3b" => Ok(FormatRevision::V3Extended),
            b"YM5!" => Ok(FormatRevision::V5),
            b"YM6!" => Ok(FormatRevision::V6),
            m if m.starts_with(b"YM") => Err(FormatError::UnsupportedRevision(
                String::from_utf8_lossy(m).into_owned(),
            )),
            _ => Err(FormatError::BadMagic(magic)),
        }
    }

    /// Magic tag identifying this revision
    pub fn magic(self) -> &'static [u8; 4] {
        match self {
            FormatRevision::V3 => b"YM3!",
            FormatRevision::V3Extended => b"YM3b",
            FormatRevision::V5 => b"YM5!",
            FormatRevision::V6 => b"YM6!",
        }
    }

    /// Whether the file carries the `LeOnArD!` header and metadata strings
    pub fn has_structured_header(self) -> bool {
        matches!(self, FormatRevision::V5 | FormatRevision::V6)
    }

    /// Whether the register stream encodes timer effects
    pub fn has_effects(self) -> bool {
        self == FormatRevision::V6
    }
}

impl fmt::Display for FormatRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatRevision::V3 => "YM3",
            FormatRevision::V3Extended => "YM3b",
            FormatRevision::V5 => "YM5",
            FormatRevision::V6 => "YM6",
        })
    }
}

bitflags! {
    /// Song attribute word of the YM5/YM6 header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SongAttributes: u32 {
        /// Register stream is stored register-major and must be transposed
        const INTERLEAVED = 0x01;
        /// DigiDrum samples are already signed
        const DRUM_SIGNED = 0x02;
        /// DigiDrum samples are packed as 4-bit amplitudes
        const DRUM_4BIT = 0x04;
        /// Song uses time-control data
        const TIME_CONTROL = 0x08;
        /// Song loops back to its loop frame
        const LOOP_MODE = 0x10;
    }
}

/// Song header information, normalized across revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMetadata {
    /// Container revision
    pub revision: FormatRevision,
    /// Number of register frames
    pub frame_count: u32,
    /// Playback rate in Hz (50 when the file leaves it zero)
    pub frame_rate_hz: u32,
    /// Frame to resume from when looping, always below `frame_count` (or 0)
    pub loop_frame: u32,
    /// Attribute flags (empty for YM3/YM3b)
    pub attributes: SongAttributes,
    /// Chip master clock in Hz (2 MHz when the file leaves it zero)
    pub chip_clock_hz: u32,
    /// Song title, absent for YM3/YM3b
    pub title: Option<String>,
    /// Composer, absent for YM3/YM3b
    pub artist: Option<String>,
    /// Free-form comment, absent for YM3/YM3b
    pub comment: Option<String>,
}

impl SongMetadata {
    /// Metadata of a headerless dump
    pub(crate) fn headerless(revision: FormatRevision, frame_count: u32, loop_frame: u32) -> Self {
        SongMetadata {
            revision,
            frame_count,
            frame_rate_hz: 0,
            loop_frame,
            attributes: SongAttributes::empty(),
            chip_clock_hz: 0,
            title: None,
            artist: None,
            comment: None,
        }
    }

    /// Apply the post-parse defaults.
    ///
    /// An explicit zero rate or clock in the file is indistinguishable from
    /// "unspecified".
    fn normalized(mut self) -> Self {
        if self.frame_rate_hz == 0 {
            self.frame_rate_hz = DEFAULT_FRAME_RATE_HZ;
        }
        if self.chip_clock_hz == 0 {
            self.chip_clock_hz = DEFAULT_CHIP_CLOCK_HZ;
        }
        if self.loop_frame != 0 && self.loop_frame >= self.frame_count {
            tracing::warn!(
                loop_frame = self.loop_frame,
                frame_count = self.frame_count,
                "loop frame out of range, looping from the start"
            );
            self.loop_frame = 0;
        }
        self
    }

    /// Playing time of the whole register stream
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.frame_count) / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// A fully decoded YM file
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSong {
    metadata: SongMetadata,
    frames: Vec<ChipRegisterFrame>,
    digidrums: Vec<DigiDrumSample>,
}

impl DecodedSong {
    pub(crate) fn new(
        metadata: SongMetadata,
        frames: Vec<ChipRegisterFrame>,
        digidrums: Vec<DigiDrumSample>,
    ) -> Self {
        debug_assert_eq!(frames.len(), metadata.frame_count as usize);
        DecodedSong {
            metadata: metadata.normalized(),
            frames,
            digidrums,
        }
    }

    /// Header information
    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }

    /// Container revision
    pub fn revision(&self) -> FormatRevision {
        self.metadata.revision
    }

    /// The frame-major register stream
    pub fn frames(&self) -> &[ChipRegisterFrame] {
        &self.frames
    }

    /// Register frame played at `index / frame_rate_hz` seconds
    pub fn frame(&self, index: usize) -> Option<&ChipRegisterFrame> {
        self.frames.get(index)
    }

    /// Number of frames in the register stream
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Embedded DigiDrum samples
    pub fn digidrums(&self) -> &[DigiDrumSample] {
        &self.digidrums
    }

    /// DigiDrum sample referenced by an effect's sample index
    pub fn digidrum(&self, index: usize) -> Option<&DigiDrumSample> {
        self.digidrums.get(index)
    }

    /// Playing time of the song
    pub fn duration(&self) -> Duration {
        self.metadata.duration()
    }
}

/// Trait for decoding one family of YM revisions
pub trait FormatParser {
    /// Decode a complete container
    fn parse(&self, data: &[u8]) -> Result<DecodedSong, FormatError>;

    /// Get parser name
    fn name(&self) -> &str;
}

/// Decode a YM container, dispatching on its magic tag
pub fn decode(data: &[u8]) -> Result<DecodedSong, FormatError> {
    let revision = FormatRevision::from_magic(data)?;
    let song = match revision {
        FormatRevision::V3 | FormatRevision::V3Extended => Ym3Parser::decode(data, revision)?,
        FormatRevision::V5 | FormatRevision::V6 => Ym6Parser::decode(data, revision)?,
    };

    tracing::debug!(
        revision = %revision,
        frames = song.frame_count(),
        rate_hz = song.metadata().frame_rate_hz,
        digidrums = song.digidrums().len(),
        "decoded YM song"
    );
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_dispatch() {
        assert_eq!(FormatRevision::from_magic(b"YM3!"), Ok(FormatRevision::V3));
        assert_eq!(
            FormatRevision::from_magic(b"YM3b...."),
            Ok(FormatRevision::V3Extended)
        );
        assert_eq!(FormatRevision::from_magic(b"YM5!"), Ok(FormatRevision::V5));
        assert_eq!(FormatRevision::from_magic(b"YM6!"), Ok(FormatRevision::V6));
    }

    #[test]
    fn test_unsupported_and_bad_magic() {
        assert_eq!(
            FormatRevision::from_magic(b"YM4!LeOnArD!"),
            Err(FormatError::UnsupportedRevision("YM4!".into()))
        );
        assert_eq!(
            decode(b"RIFF0000"),
            Err(FormatError::BadMagic(*b"RIFF"))
        );
    }

    #[test]
    fn test_short_buffer_is_truncated() {
        assert!(matches!(
            decode(b"YM"),
            Err(FormatError::Truncated { field: "magic", .. })
        ));
    }

    #[test]
    fn test_magic_roundtrip_through_revision() {
        for revision in [
            FormatRevision::V3,
            FormatRevision::V3Extended,
            FormatRevision::V5,
            FormatRevision::V6,
        ] {
            assert_eq!(FormatRevision::from_magic(revision.magic()), Ok(revision));
        }
    }

    #[test]
    fn test_metadata_defaults_applied_after_parse() {
        let meta = SongMetadata::headerless(FormatRevision::V3, 10, 0).normalized();
        assert_eq!(meta.frame_rate_hz, DEFAULT_FRAME_RATE_HZ);
        assert_eq!(meta.chip_clock_hz, DEFAULT_CHIP_CLOCK_HZ);
        assert_eq!(meta.duration(), Duration::from_millis(200));
    }

    #[test]
    fn test_out_of_range_loop_frame_is_reset() {
        let meta = SongMetadata::headerless(FormatRevision::V3Extended, 4, 9).normalized();
        assert_eq!(meta.loop_frame, 0);
    }

    #[test]
    fn test_only_ym6_has_effects() {
        assert!(FormatRevision::V6.has_effects());
        assert!(!FormatRevision::V5.has_effects());
        assert!(!FormatRevision::V3.has_effects());
    }
}
