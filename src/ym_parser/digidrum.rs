//! DigiDrum sample table decoding
//!
//! DigiDrums are short PCM samples replayed through the volume register of one
//! voice, paced by an MFP timer interrupt.

use super::bytes::ByteReader;
use super::{FormatError, SongAttributes};

/// MFP clock frequency in Hz
pub const MFP_CLOCK: u32 = 2_457_600;

/// MFP timer prescaler divisors for control codes 1..=7
const MFP_PREDIV: [u32; 7] = [4, 10, 16, 50, 64, 100, 200];

/// Lookup table for expanding 4-bit DigiDrum samples (matches ST-Sound reference)
const DIGIDRUM_4BIT_TABLE: [u8; 16] = [0, 1, 2, 2, 4, 6, 9, 12, 17, 24, 35, 48, 72, 103, 165, 255];

/// Divisor selected by an MFP prescaler code; unknown codes divide by 1
pub fn prescaler_factor(code: u8) -> u32 {
    match code {
        1..=7 => MFP_PREDIV[usize::from(code - 1)],
        _ => 1,
    }
}

/// One embedded sample
#[derive(Debug, Clone, PartialEq)]
pub struct DigiDrumSample {
    /// Signed 8-bit PCM
    pub pcm: Vec<i8>,
    /// Nominal replay rate in Hz
    pub nominal_hz: f32,
}

impl DigiDrumSample {
    /// Build a sample from stored bytes, applying the song's sample attributes
    pub fn from_stored(
        raw: &[u8],
        attributes: SongAttributes,
        timer_count: u16,
        prescaler: u8,
    ) -> Self {
        let expanded;
        let bytes = if attributes.contains(SongAttributes::DRUM_4BIT) {
            expanded = decode_4bit(raw);
            &expanded[..]
        } else {
            raw
        };

        let already_signed = attributes.contains(SongAttributes::DRUM_SIGNED);
        let pcm = bytes
            .iter()
            .map(|&b| if already_signed { b as i8 } else { (b ^ 0x80) as i8 })
            .collect();

        DigiDrumSample {
            pcm,
            nominal_hz: nominal_frequency(timer_count, prescaler),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    /// Whether the sample holds no data
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

/// Replay rate implied by an MFP timer setting; 0 when the count is 0
pub fn nominal_frequency(timer_count: u16, prescaler: u8) -> f32 {
    if timer_count == 0 {
        return 0.0;
    }
    let divisor = f64::from(prescaler_factor(prescaler)) * f64::from(timer_count);
    (f64::from(MFP_CLOCK) / divisor) as f32
}

/// Expand 4-bit DigiDrum samples into 8-bit amplitude values
fn decode_4bit(data: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|byte| DIGIDRUM_4BIT_TABLE[(byte & 0x0F) as usize])
        .collect()
}

/// Read `count` entries of `{u32 len, len bytes, u16 timer count, u8 prescaler}`
pub(crate) fn read_table(
    reader: &mut ByteReader<'_>,
    count: u16,
    attributes: SongAttributes,
) -> Result<Vec<DigiDrumSample>, FormatError> {
    let mut samples = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let len = reader.read_u32_be("digidrum length")?;
        let len = usize::try_from(len).map_err(|_| FormatError::Truncated {
            field: "digidrum data",
            offset: reader.position(),
            needed: usize::MAX,
            available: reader.remaining(),
        })?;
        let raw = reader.take(len, "digidrum data")?;
        let timer_count = reader.read_u16_be("digidrum timer count")?;
        let prescaler = reader.read_u8("digidrum prescaler")?;
        samples.push(DigiDrumSample::from_stored(
            raw,
            attributes,
            timer_count,
            prescaler,
        ));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prescaler_table() {
        assert_eq!(prescaler_factor(1), 4);
        assert_eq!(prescaler_factor(4), 50);
        assert_eq!(prescaler_factor(7), 200);
        assert_eq!(prescaler_factor(0), 1);
        assert_eq!(prescaler_factor(9), 1);
    }

    #[test]
    fn test_nominal_frequency() {
        // 2457600 / (4 * 100) = 6144 Hz
        assert_relative_eq!(nominal_frequency(100, 1), 6144.0);
        // Unknown prescaler divides by one
        assert_relative_eq!(nominal_frequency(256, 0), 9600.0);
        assert_relative_eq!(nominal_frequency(0, 3), 0.0);
    }

    #[test]
    fn test_unsigned_samples_are_recentered() {
        let sample = DigiDrumSample::from_stored(&[0x00, 0x80, 0xFF], SongAttributes::empty(), 1, 1);
        assert_eq!(sample.pcm, vec![-128, 0, 127]);
    }

    #[test]
    fn test_signed_samples_are_kept() {
        let sample =
            DigiDrumSample::from_stored(&[0x00, 0x80, 0xFF], SongAttributes::DRUM_SIGNED, 1, 1);
        assert_eq!(sample.pcm, vec![0, -128, -1]);
    }

    #[test]
    fn test_4bit_samples_expand_through_table() {
        let sample = DigiDrumSample::from_stored(&[0x00, 0x0F, 0xF8], SongAttributes::DRUM_4BIT, 1, 1);
        // 0 -> 0, 15 -> 255, low nibble 8 -> 17; then recentred
        assert_eq!(sample.pcm, vec![-128, 127, (17u8 ^ 0x80) as i8]);
        assert_eq!(sample.len(), 3);
    }

    #[test]
    fn test_read_table_truncated_sample() {
        // Declares 8 bytes, provides 2
        let data = [0, 0, 0, 8, 1, 2];
        let mut reader = ByteReader::new(&data, 0);
        let err = read_table(&mut reader, 1, SongAttributes::empty()).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { field: "digidrum data", .. }));
    }
}
