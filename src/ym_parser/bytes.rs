//! Byte-order and string helpers shared by the YM decoders.
//!
//! YM5/YM6 header words are stored big-endian while the rest of the container
//! (the YM3b loop trailer) is little-endian. Header words are read in
//! little-endian order and passed through [`swap16`] / [`swap32`].

use super::{ChipRegisterFrame, FormatError, REGISTERS_PER_FRAME};

/// Reverse the byte order of a 16-bit word
#[inline]
pub const fn swap16(value: u16) -> u16 {
    value.rotate_left(8)
}

/// Reverse the byte order of a 32-bit word
#[inline]
pub const fn swap32(value: u32) -> u32 {
    ((value & 0x0000_00FF) << 24)
        | ((value & 0x0000_FF00) << 8)
        | ((value & 0x00FF_0000) >> 8)
        | ((value & 0xFF00_0000) >> 24)
}

/// Forward-only cursor over a container buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at `offset`
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        ByteReader {
            data,
            pos: offset.min(data.len()),
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(FormatError::Truncated {
                field,
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Advance past `len` bytes without inspecting them
    pub fn skip(&mut self, len: usize, field: &'static str) -> Result<(), FormatError> {
        self.take(len, field).map(|_| ())
    }

    /// Read one byte
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, FormatError> {
        Ok(self.take(1, field)?[0])
    }

    /// Read a big-endian 16-bit header word
    pub fn read_u16_be(&mut self, field: &'static str) -> Result<u16, FormatError> {
        let b = self.take(2, field)?;
        Ok(swap16(u16::from_le_bytes([b[0], b[1]])))
    }

    /// Read a big-endian 32-bit header word
    pub fn read_u32_be(&mut self, field: &'static str) -> Result<u32, FormatError> {
        let b = self.take(4, field)?;
        Ok(swap32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
    }

    /// Read a little-endian 32-bit word
    pub fn read_u32_le(&mut self, field: &'static str) -> Result<u32, FormatError> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-terminated single-byte (Latin-1) string
    pub fn read_cstring(&mut self, field: &'static str) -> Result<String, FormatError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::Truncated {
                field,
                offset: self.pos,
                needed: rest.len() + 1,
                available: rest.len(),
            })?;
        let text = rest[..len].iter().map(|&b| b as char).collect();
        self.pos += len + 1;
        Ok(text)
    }
}

/// Transpose a register-major buffer of 16 registers into frame-major order.
///
/// `output[f * 16 + r] = input[r * frames + f]`. `input` must hold `16 * frames` bytes.
pub fn deinterleave(input: &[u8], frames: usize) -> Vec<u8> {
    debug_assert_eq!(input.len(), frames * REGISTERS_PER_FRAME);
    let mut output = vec![0u8; input.len()];
    for reg in 0..REGISTERS_PER_FRAME {
        for frame in 0..frames {
            output[frame * REGISTERS_PER_FRAME + reg] = input[reg * frames + frame];
        }
    }
    output
}

/// Inverse of [`deinterleave`]: frame-major to register-major
pub fn interleave(input: &[u8], frames: usize) -> Vec<u8> {
    debug_assert_eq!(input.len(), frames * REGISTERS_PER_FRAME);
    let mut output = vec![0u8; input.len()];
    for frame in 0..frames {
        for reg in 0..REGISTERS_PER_FRAME {
            output[reg * frames + frame] = input[frame * REGISTERS_PER_FRAME + reg];
        }
    }
    output
}

/// Build frames from a register-major stream holding `registers` registers per frame.
///
/// Registers beyond `registers` are left at zero.
pub fn frames_from_register_major(
    input: &[u8],
    frames: usize,
    registers: usize,
) -> Vec<ChipRegisterFrame> {
    debug_assert!(registers <= REGISTERS_PER_FRAME);
    debug_assert!(input.len() >= frames * registers);
    let mut out = vec![[0u8; REGISTERS_PER_FRAME]; frames];
    for reg in 0..registers {
        let column = &input[reg * frames..(reg + 1) * frames];
        for (frame, value) in out.iter_mut().zip(column) {
            frame[reg] = *value;
        }
    }
    out
}

/// Split a frame-major stream into 16-byte frames
pub fn frames_from_frame_major(input: &[u8]) -> Vec<ChipRegisterFrame> {
    input
        .chunks_exact(REGISTERS_PER_FRAME)
        .map(|chunk| {
            let mut frame = [0u8; REGISTERS_PER_FRAME];
            frame.copy_from_slice(chunk);
            frame
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_matches_known_values() {
        assert_eq!(swap16(0x1234), 0x3412);
        assert_eq!(swap32(0x1234_5678), 0x7856_3412);
        assert_eq!(swap32(0x0000_00FF), 0xFF00_0000);
    }

    #[test]
    fn test_big_endian_fields() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x00, 0x32, 0xAA];
        let mut reader = ByteReader::new(&data, 0);
        assert_eq!(reader.read_u32_be("frame count").unwrap(), 256);
        assert_eq!(reader.read_u16_be("frame rate").unwrap(), 50);
        assert_eq!(reader.read_u8("pad").unwrap(), 0xAA);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_little_endian_word() {
        let mut reader = ByteReader::new(&[0x05, 0x00, 0x00, 0x00], 0);
        assert_eq!(reader.read_u32_le("loop").unwrap(), 5);
    }

    #[test]
    fn test_take_past_end_reports_truncation() {
        let mut reader = ByteReader::new(&[1, 2, 3], 1);
        let err = reader.read_u32_be("chip clock").unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                field: "chip clock",
                offset: 1,
                needed: 4,
                available: 2,
            }
        );
        // A failed read does not move the cursor
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_cstring_latin1() {
        let mut reader = ByteReader::new(b"Caf\xE9\0next\0", 0);
        assert_eq!(reader.read_cstring("title").unwrap(), "Café");
        assert_eq!(reader.read_cstring("artist").unwrap(), "next");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_cstring_without_terminator() {
        let mut reader = ByteReader::new(b"no end", 0);
        assert!(matches!(
            reader.read_cstring("comment"),
            Err(FormatError::Truncated { field: "comment", .. })
        ));
    }

    #[test]
    fn test_deinterleave_two_frames() {
        // Register-major: r0 of both frames, then r1 of both frames, ...
        let input: Vec<u8> = (0..32).collect();
        let output = deinterleave(&input, 2);
        assert_eq!(output[0], 0); // f0 r0
        assert_eq!(output[1], 2); // f0 r1
        assert_eq!(output[16], 1); // f1 r0
        assert_eq!(output[31], 31); // f1 r15
        assert_eq!(interleave(&output, 2), input);
    }

    #[test]
    fn test_fourteen_register_transpose_zero_fills() {
        let input: Vec<u8> = (1..=28).collect();
        let frames = frames_from_register_major(&input, 2, 14);
        assert_eq!(frames[0][0], 1);
        assert_eq!(frames[1][0], 2);
        assert_eq!(frames[0][13], 27);
        assert_eq!(frames[1][13], 28);
        assert_eq!(&frames[0][14..], &[0, 0]);
    }
}
