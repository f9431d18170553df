//! YM3 / YM3b format parser
//!
//! The oldest YM revisions have no structured header: the magic tag is followed
//! directly by a register-major dump of 14 registers per frame (R0..R13; the
//! envelope-shape pair R14/R15 of later revisions is absent). Both variants
//! reserve four bytes after the dump; YM3b stores a little-endian loop frame there.

use super::bytes::{frames_from_register_major, ByteReader};
use super::{DecodedSong, FormatError, FormatParser, FormatRevision, SongMetadata};

/// Registers stored per frame in YM3 dumps
const YM3_REGISTERS: usize = 14;

/// Magic plus the room reserved for the loop trailer
const YM3_OVERHEAD: usize = 8;

/// YM3/YM3b parser
pub struct Ym3Parser;

impl Ym3Parser {
    /// Create a new YM3 parser
    pub fn new() -> Self {
        Ym3Parser
    }

    /// Decode a buffer whose magic already identified `revision`
    pub(crate) fn decode(data: &[u8], revision: FormatRevision) -> Result<DecodedSong, FormatError> {
        if data.len() < YM3_OVERHEAD && revision == FormatRevision::V3Extended {
            return Err(FormatError::Truncated {
                field: "YM3b loop frame",
                offset: data.len().min(4),
                needed: YM3_OVERHEAD.saturating_sub(4),
                available: data.len().saturating_sub(4),
            });
        }

        let frame_count = Self::frame_count(data.len());
        let payload_len = frame_count * YM3_REGISTERS;
        let stray = data.len().saturating_sub(YM3_OVERHEAD) - payload_len;
        if stray != 0 {
            tracing::debug!(stray, "ignoring partial frame after YM3 register dump");
        }

        let mut reader = ByteReader::new(data, 4);
        let payload = reader.take(payload_len, "YM3 register dump")?;
        let frames = frames_from_register_major(payload, frame_count, YM3_REGISTERS);

        let loop_frame = match revision {
            FormatRevision::V3Extended => {
                ByteReader::new(data, data.len() - 4).read_u32_le("YM3b loop frame")?
            }
            _ => 0,
        };

        // frame_count is bounded by the buffer length / 14, far below u32::MAX
        let metadata = SongMetadata::headerless(revision, frame_count as u32, loop_frame);
        Ok(DecodedSong::new(metadata, frames, Vec::new()))
    }

    /// Number of whole frames stored in a buffer of `len` bytes
    fn frame_count(len: usize) -> usize {
        len.saturating_sub(YM3_OVERHEAD) / YM3_REGISTERS
    }
}

impl Default for Ym3Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatParser for Ym3Parser {
    fn parse(&self, data: &[u8]) -> Result<DecodedSong, FormatError> {
        match FormatRevision::from_magic(data)? {
            revision @ (FormatRevision::V3 | FormatRevision::V3Extended) => {
                Self::decode(data, revision)
            }
            other => Err(FormatError::UnsupportedRevision(other.to_string())),
        }
    }

    fn name(&self) -> &str {
        "YM3/YM3b"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ym_parser::{DEFAULT_CHIP_CLOCK_HZ, DEFAULT_FRAME_RATE_HZ};

    fn register_major(frame_count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for reg in 0..14u8 {
            for frame in 0..frame_count {
                data.push((reg << 4) | frame as u8);
            }
        }
        data
    }

    #[test]
    fn test_ym3_with_eight_byte_overhead() {
        let mut data = b"YM3!".to_vec();
        data.extend_from_slice(&register_major(3));
        data.extend_from_slice(&[0u8; 4]);
        assert_eq!(data.len(), 8 + 14 * 3);

        let song = Ym3Parser.parse(&data).unwrap();
        let meta = song.metadata();
        assert_eq!(song.frame_count(), 3);
        assert_eq!(meta.frame_count, 3);
        assert_eq!(meta.loop_frame, 0);
        assert_eq!(meta.frame_rate_hz, DEFAULT_FRAME_RATE_HZ);
        assert_eq!(meta.chip_clock_hz, DEFAULT_CHIP_CLOCK_HZ);
        assert_eq!(meta.title, None);
        assert!(song.digidrums().is_empty());
    }

    #[test]
    fn test_ym3_dump_transposed() {
        let mut data = b"YM3!".to_vec();
        data.extend_from_slice(&register_major(3));
        data.extend_from_slice(&[0u8; 4]);

        let song = Ym3Parser.parse(&data).unwrap();
        assert_eq!(song.frame_count(), 3);
        for (reg, value) in song.frame(1).unwrap().iter().enumerate().take(14) {
            assert_eq!(*value, ((reg as u8) << 4) | 1, "frame 1 register {}", reg);
        }
        // R14/R15 are not stored by YM3
        assert_eq!(song.frame(1).unwrap()[14..], [0, 0]);
    }

    #[test]
    fn test_ym3_without_reserved_tail_loses_last_frame() {
        // 4 + 14 * 3 bytes: the last four bytes are the reserved tail
        let mut data = b"YM3!".to_vec();
        data.extend_from_slice(&register_major(3));
        assert_eq!(data.len(), 4 + 14 * 3);

        let song = Ym3Parser.parse(&data).unwrap();
        assert_eq!(song.frame_count(), 2);
    }

    #[test]
    fn test_ym3_stray_byte_keeps_frame_layout() {
        let mut data = b"YM3!".to_vec();
        data.extend_from_slice(&register_major(2));
        data.extend_from_slice(&[0u8; 4]);
        let exact = Ym3Parser.parse(&data).unwrap();

        data.push(0xAA);
        let padded = Ym3Parser.parse(&data).unwrap();
        assert_eq!(padded.frame_count(), 2);
        assert_eq!(padded.frames(), exact.frames());
        assert_eq!(padded.frame(0).unwrap()[1], 0x10);
    }

    #[test]
    fn test_ym3b_reads_little_endian_loop() {
        let mut data = b"YM3b".to_vec();
        data.extend_from_slice(&register_major(5));
        data.extend_from_slice(&4u32.to_le_bytes());

        let song = Ym3Parser.parse(&data).unwrap();
        assert_eq!(song.revision(), FormatRevision::V3Extended);
        assert_eq!(song.frame_count(), 5);
        assert_eq!(song.metadata().loop_frame, 4);
        assert_eq!(song.frame(4).unwrap()[13], (13 << 4) | 4);
    }

    #[test]
    fn test_ym3b_too_short() {
        let result = Ym3Parser.parse(b"YM3b\x01");
        assert!(matches!(result, Err(FormatError::Truncated { .. })));
    }

    #[test]
    fn test_empty_ym3_has_no_frames() {
        let song = Ym3Parser.parse(b"YM3!").unwrap();
        assert_eq!(song.frame_count(), 0);
        assert_eq!(song.metadata().loop_frame, 0);
    }

    #[test]
    fn test_rejects_structured_revisions() {
        let result = Ym3Parser.parse(b"YM6!LeOnArD!");
        assert!(matches!(result, Err(FormatError::UnsupportedRevision(_))));
    }
}
