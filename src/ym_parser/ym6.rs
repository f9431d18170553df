//! YM5/YM6 format parser for Atari ST chiptunes
//!
//! YM5 and YM6 share one container layout; YM6 additionally encodes timer
//! effects in otherwise unused register bits.
//!
//! Format details:
//! - Header: 34 bytes (magic, `LeOnArD!` check literal, big-endian fields)
//! - Metadata: song name, author, comment (null-terminated strings)
//! - DigiDrum table: length-prefixed samples with their MFP timer setting
//! - Extra data: skipped
//! - Register data: 16 bytes per frame, interleaved or not

use super::bytes::{deinterleave, frames_from_frame_major, ByteReader};
use super::digidrum;
use super::{
    DecodedSong, FormatError, FormatParser, FormatRevision, SongAttributes, SongMetadata,
    REGISTERS_PER_FRAME,
};

/// Check literal following the magic tag
pub const CHECK_STRING: &[u8; 8] = b"LeOnArD!";

/// Size of the fixed YM5/YM6 header
pub const HEADER_SIZE: usize = 34;

/// YM5/YM6 file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ym6Header {
    /// Number of frames in the file
    pub frame_count: u32,
    /// Song attributes (bit 0: interleaved format)
    pub attributes: SongAttributes,
    /// Number of digidrum samples
    pub digidrum_count: u16,
    /// YM master clock frequency in Hz (usually 2,000,000 for ATARI ST)
    pub master_clock: u32,
    /// Original player frame rate in Hz (usually 50)
    pub frame_rate: u16,
    /// Loop frame number (0 to loop at beginning)
    pub loop_frame: u32,
    /// Size of additional data to skip
    pub extra_data_size: u16,
}

/// YM5/YM6 file parser
pub struct Ym6Parser;

impl Ym6Parser {
    /// Parse the fixed header, leaving the reader on the metadata strings
    fn parse_header(reader: &mut ByteReader<'_>) -> Result<Ym6Header, FormatError> {
        let check = reader.take(CHECK_STRING.len(), "check string")?;
        if check != CHECK_STRING {
            return Err(FormatError::ChecksumMismatch {
                found: String::from_utf8_lossy(check).into_owned(),
            });
        }

        Ok(Ym6Header {
            frame_count: reader.read_u32_be("frame count")?,
            attributes: SongAttributes::from_bits_retain(reader.read_u32_be("attributes")?),
            digidrum_count: reader.read_u16_be("digidrum count")?,
            master_clock: reader.read_u32_be("chip clock")?,
            frame_rate: reader.read_u16_be("frame rate")?,
            loop_frame: reader.read_u32_be("loop frame")?,
            extra_data_size: reader.read_u16_be("extra header length")?,
        })
    }

    /// Parse register data (either interleaved or non-interleaved)
    fn parse_register_data(
        reader: &mut ByteReader<'_>,
        frame_count: u32,
        is_interleaved: bool,
    ) -> Result<Vec<[u8; 16]>, FormatError> {
        let frames = frame_count as usize;
        let size = frames
            .checked_mul(REGISTERS_PER_FRAME)
            .ok_or(FormatError::Truncated {
                field: "register stream",
                offset: reader.position(),
                needed: usize::MAX,
                available: reader.remaining(),
            })?;
        let register_bytes = reader.take(size, "register stream")?;

        if is_interleaved {
            // Interleaved format: all r0s, then all r1s, etc.
            Ok(frames_from_frame_major(&deinterleave(register_bytes, frames)))
        } else {
            Ok(frames_from_frame_major(register_bytes))
        }
    }

    /// Decode a buffer whose magic already identified `revision`
    pub(crate) fn decode(data: &[u8], revision: FormatRevision) -> Result<DecodedSong, FormatError> {
        let mut reader = ByteReader::new(data, 4);
        let header = Self::parse_header(&mut reader)?;

        let title = reader.read_cstring("title")?;
        let artist = reader.read_cstring("artist")?;
        let comment = reader.read_cstring("comment")?;

        let digidrums = digidrum::read_table(&mut reader, header.digidrum_count, header.attributes)?;

        reader.skip(usize::from(header.extra_data_size), "extra header data")?;

        let is_interleaved = header.attributes.contains(SongAttributes::INTERLEAVED);
        let frames = Self::parse_register_data(&mut reader, header.frame_count, is_interleaved)?;

        if reader.remaining() > 0 {
            tracing::debug!(
                trailing = reader.remaining(),
                "ignoring data after register stream"
            );
        }

        let metadata = SongMetadata {
            revision,
            frame_count: header.frame_count,
            frame_rate_hz: u32::from(header.frame_rate),
            loop_frame: header.loop_frame,
            attributes: header.attributes,
            chip_clock_hz: header.master_clock,
            title: Some(title),
            artist: Some(artist),
            comment: Some(comment),
        };
        Ok(DecodedSong::new(metadata, frames, digidrums))
    }
}

impl FormatParser for Ym6Parser {
    fn parse(&self, data: &[u8]) -> Result<DecodedSong, FormatError> {
        match FormatRevision::from_magic(data)? {
            revision @ (FormatRevision::V5 | FormatRevision::V6) => Self::decode(data, revision),
            other => Err(FormatError::UnsupportedRevision(other.to_string())),
        }
    }

    fn name(&self) -> &str {
        "YM5/YM6"
    }
}
