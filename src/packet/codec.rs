//! Pure decoding of the telemetry wire format.
//!
//! A packet travels as a base64url string (`-`/`_` for the 62nd/63rd
//! alphabet characters) and decodes to exactly [`PACKET_LEN`] bytes:
//!
//! | offset | length | field                                  |
//! |--------|--------|----------------------------------------|
//! | 0      | 1      | reserved                               |
//! | 1      | 1      | channel count                          |
//! | 2      | 4      | boolean mask, u32 little-endian        |
//! | 6      | 128    | 32 x f32 little-endian, index 0..31    |
//!
//! Decoding is all-or-nothing: any other length is not a packet. The
//! decoder performs no I/O and holds no state.

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{alphabet, Engine as _};

use crate::error_handling::types::PacketError;

use super::types::{DecodedPacket, Record, CHANNEL_CAPACITY, PACKET_LEN};

/// Senders are inconsistent about keeping the `=` padding when they
/// URL-encode, so accept both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes one query payload into a [`DecodedPacket`].
///
/// The declared channel count is clamped to [`CHANNEL_CAPACITY`]; a
/// sender cannot widen the export watermark past the slots that exist.
pub fn decode(raw: &str) -> Result<DecodedPacket, PacketError> {
    if raw.is_empty() {
        return Err(PacketError::Empty);
    }

    let bytes = URL_SAFE_LENIENT.decode(raw)?;
    if bytes.len() != PACKET_LEN {
        return Err(PacketError::WrongLength(bytes.len()));
    }

    let channel_count = bytes[1].min(CHANNEL_CAPACITY as u8);
    let bools = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

    let mut numbers = [0.0f32; CHANNEL_CAPACITY];
    for (i, slot) in numbers.iter_mut().enumerate() {
        let at = 6 + i * 4;
        *slot = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    }

    Ok(DecodedPacket {
        record: Record { numbers, bools },
        channel_count,
    })
}
