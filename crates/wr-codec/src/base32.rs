// SPDX-License-Identifier: MIT OR Apache-2.0

//! RFC 4648 base32 in lowercase, without padding.
//!
//! Identifier suffixes use this encoding: 16 bytes of entropy become 26
//! characters. Decoding is strict — non-alphabet bytes, impossible
//! lengths, and non-zero trailing bits are all rejected, so every valid
//! string has exactly one byte decoding.

use crate::CodecError;

const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Encode bytes as lowercase base32 with no padding.
///
/// # Examples
///
/// ```
/// assert_eq!(wr_codec::base32::encode(b"f"), "my");
/// assert_eq!(wr_codec::base32::encode(b"foobar"), "mzxw6ytboi");
/// ```
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in data {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Decode a lowercase, unpadded base32 string.
///
/// # Errors
///
/// - [`CodecError::Base32InvalidCharacter`] for bytes outside the alphabet
///   (uppercase included).
/// - [`CodecError::Base32InvalidLength`] for lengths no byte string
///   produces (`len % 8 ∈ {1, 3, 6}`).
/// - [`CodecError::Base32TrailingBits`] when the final character carries
///   bits past the last full byte.
pub fn decode(s: &str) -> Result<Vec<u8>, CodecError> {
    match s.len() % 8 {
        1 | 3 | 6 => return Err(CodecError::Base32InvalidLength { len: s.len() }),
        _ => {}
    }
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for (offset, byte) in s.bytes().enumerate() {
        let value = ALPHABET
            .iter()
            .position(|&a| a == byte)
            .ok_or(CodecError::Base32InvalidCharacter { offset })?;
        acc = (acc << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }
    if bits > 0 && (acc & ((1 << bits) - 1)) != 0 {
        return Err(CodecError::Base32TrailingBits);
    }
    Ok(out)
}
