//! Fixed-width two's-complement integer codec.
//!
//! The APT firmware exchanges every numeric field as a little-endian
//! two's-complement integer of a fixed byte width. This module converts between
//! a signed integer and that byte image for any positive width:
//!
//! - Widths up to 16 bytes are range-checked against
//!   `[-2^(8w-1), 2^(8w-1) - 1]` and truncated from the native `i128` image.
//! - Wider fields are the native image followed by sign-extension bytes, so any
//!   `i128` fits and decodes back only if the excess bytes are pure sign.
//!
//! Negative values never need explicit bit flipping: `i128::to_le_bytes` already
//! yields the two's-complement image, and truncating it to `w` bytes is exactly
//! `2^(8w) + value` for in-range values.
//!
//! # Example
//!
//! ```
//! use k10cr1::codec;
//!
//! assert_eq!(codec::encode(-1, 4).unwrap(), vec![0xff, 0xff, 0xff, 0xff]);
//! assert_eq!(codec::decode(&[0xff, 0xff, 0xff, 0x7f]).unwrap(), 2_147_483_647);
//! assert_eq!(codec::encode_hex(136_533, 4).unwrap(), "55150200");
//! ```

use crate::error::{StageError, StageResult};

/// Width of the native integer the codec computes with.
pub const NATIVE_WIDTH: usize = std::mem::size_of::<i128>();

/// Inclusive range representable in `width` bytes of two's complement.
///
/// Returns `None` for width 0, and for widths of 16 bytes or more where every
/// `i128` is representable.
pub fn bounds(width: usize) -> Option<(i128, i128)> {
    if width == 0 || width >= NATIVE_WIDTH {
        return None;
    }
    let bits = 8 * width as u32;
    let max = (1i128 << (bits - 1)) - 1;
    Some((-max - 1, max))
}

/// Encode `value` as `width` little-endian two's-complement bytes.
///
/// # Errors
/// `StageError::Range` if `width` is zero or `value` does not fit.
pub fn encode(value: i128, width: usize) -> StageResult<Vec<u8>> {
    if width == 0 {
        return Err(StageError::range(value, width));
    }
    if let Some((min, max)) = bounds(width) {
        if value < min || value > max {
            return Err(StageError::range(value, width));
        }
    }

    let native = value.to_le_bytes();
    let mut out = Vec::with_capacity(width);
    if width <= NATIVE_WIDTH {
        out.extend_from_slice(&native[..width]);
    } else {
        out.extend_from_slice(&native);
        out.resize(width, sign_fill(native[NATIVE_WIDTH - 1]));
    }
    Ok(out)
}

/// Decode little-endian two's-complement bytes; the slice length is the width.
///
/// # Errors
/// `StageError::Decode` for an empty slice, or for a field wider than 16 bytes
/// whose value does not fit in an `i128`.
pub fn decode(bytes: &[u8]) -> StageResult<i128> {
    let Some(&msb) = bytes.last() else {
        return Err(StageError::Decode("cannot decode an empty field".into()));
    };

    if bytes.len() > NATIVE_WIDTH {
        let (low, high) = bytes.split_at(NATIVE_WIDTH);
        let fill = sign_fill(low[NATIVE_WIDTH - 1]);
        if high.iter().any(|&b| b != fill) {
            return Err(StageError::Decode(format!(
                "{}-byte field holds a value wider than {} bits",
                bytes.len(),
                8 * NATIVE_WIDTH
            )));
        }
        let mut buf = [0u8; NATIVE_WIDTH];
        buf.copy_from_slice(low);
        return Ok(i128::from_le_bytes(buf));
    }

    // Sign-extend into the native image; top bit set means negative.
    let mut buf = [sign_fill(msb); NATIVE_WIDTH];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i128::from_le_bytes(buf))
}

/// Encode as lowercase hex of the little-endian byte image (`2 * width` chars).
pub fn encode_hex(value: i128, width: usize) -> StageResult<String> {
    Ok(hex::encode(encode(value, width)?))
}

/// Decode a hex string produced by [`encode_hex`].
pub fn decode_hex(text: &str) -> StageResult<i128> {
    let bytes = hex::decode(text.trim())
        .map_err(|e| StageError::Decode(format!("invalid hex '{}': {}", text, e)))?;
    decode(&bytes)
}

/// Native 4-byte encoding of a device-unit count.
pub fn encode_i32(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode exactly four bytes into an `i32`.
pub fn decode_i32(bytes: &[u8]) -> StageResult<i32> {
    if bytes.len() != 4 {
        return Err(StageError::InvalidLength {
            expected: 4,
            actual: bytes.len(),
        });
    }
    let value = decode(bytes)?;
    i32::try_from(value).map_err(|_| StageError::Decode(format!("{} overflows i32", value)))
}

fn sign_fill(msb: u8) -> u8 {
    if msb & 0x80 != 0 {
        0xff
    } else {
        0x00
    }
}
