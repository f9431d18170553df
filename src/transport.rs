//! Register packet transport
//!
//! The receiver expects fixed 17-byte packets: one chip-slot byte followed by
//! the 16 registers of a frame. The receiver firmware writes R0..R13 only,
//! masking each value to its register's width.

use crate::ym_parser::{ChipRegisterFrame, REGISTERS_PER_FRAME};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Bytes per packet on the wire
pub const PACKET_LEN: usize = 1 + REGISTERS_PER_FRAME;

/// Number of chips the receiver drives
pub const CHIP_SLOTS: usize = 3;

/// Valid bits of R0..R13 as applied by the receiver
pub const REGISTER_MASKS: [u8; 14] = [
    0xFF, 0x0F, // A period low/high
    0xFF, 0x0F, // B period low/high
    0xFF, 0x0F, // C period low/high
    0x1F, // noise period
    0x3F, // mixer
    0x1F, 0x1F, 0x1F, // A/B/C volume
    0xFF, 0xFF, // envelope period low/high
    0x0F, // envelope shape
];

/// One register write for one chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet([u8; PACKET_LEN]);

impl Packet {
    /// Packet carrying `frame` for chip `slot`
    pub fn new(slot: u8, frame: &ChipRegisterFrame) -> Self {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[0] = slot;
        bytes[1..].copy_from_slice(frame);
        Packet(bytes)
    }

    /// All-zero registers for chip `slot`
    pub fn silence(slot: u8) -> Self {
        Packet::new(slot, &[0u8; REGISTERS_PER_FRAME])
    }

    /// Clear the bits the receiver would discard; R14/R15 pass through
    pub fn masked(mut self) -> Self {
        for (value, mask) in self.0[1..].iter_mut().zip(REGISTER_MASKS.iter()) {
            *value &= mask;
        }
        self
    }

    /// Target chip slot
    pub fn slot(&self) -> u8 {
        self.0[0]
    }

    /// The 16 register values
    pub fn registers(&self) -> &[u8] {
        &self.0[1..]
    }

    /// Wire representation
    pub fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }
}

/// Transport failures; the affected packet is dropped
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// I/O error on the underlying device
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport has been closed
    #[error("transport closed")]
    Closed,
}

/// Sink for register packets
pub trait Transport {
    /// Write one packet
    fn send(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Push any buffered bytes to the device
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Get transport name
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        (**self).send(packet)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Transport over any byte writer (a serial device node, a file, a buffer)
#[derive(Debug)]
pub struct WriterTransport<W: Write> {
    writer: Option<W>,
    name: String,
}

impl WriterTransport<File> {
    /// Open a device node or file for writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let file = OpenOptions::new().write(true).create(true).open(path)?;
        tracing::debug!(path = %path.display(), "opened transport");
        Ok(WriterTransport::with_name(file, path.display().to_string()))
    }
}

impl<W: Write> WriterTransport<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self::with_name(writer, "writer")
    }

    /// Wrap a writer with a display name
    pub fn with_name(writer: W, name: impl Into<String>) -> Self {
        WriterTransport {
            writer: Some(writer),
            name: name.into(),
        }
    }

    /// Close the transport, returning the writer
    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take()
    }

    /// Borrow the writer
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<W: Write> Transport for WriterTransport<W> {
    fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(packet.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => Err(TransportError::Closed),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Discards packets, counting them (dry runs)
#[derive(Debug, Default, Clone)]
pub struct NullTransport {
    sent: u64,
}

impl NullTransport {
    /// Create a null transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets accepted so far
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Transport for NullTransport {
    fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        tracing::trace!(slot = packet.slot(), registers = ?packet.registers(), "dry-run packet");
        self.sent += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
