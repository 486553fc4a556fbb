// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bech32m (BIP-350) encoding for token wire strings.
//!
//! The checksum detects any single-character substitution, which is what
//! makes tampered tokens fail at the format layer before any signature
//! check runs.

use crate::CodecError;
use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};

/// Encode bytes under the given human-readable part.
///
/// # Errors
///
/// Returns [`CodecError::Bech32mInvalidHrp`] if `hrp` is not a valid
/// human-readable part.
///
/// # Examples
///
/// ```
/// let s = wr_codec::bech32m::encode("st", &[1, 2, 3]).unwrap();
/// assert!(s.starts_with("st1"));
/// let (hrp, data) = wr_codec::bech32m::decode(&s).unwrap();
/// assert_eq!(hrp, "st");
/// assert_eq!(data, vec![1, 2, 3]);
/// ```
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, CodecError> {
    let hrp = Hrp::parse(hrp).map_err(|_| CodecError::Bech32mInvalidHrp {
        hrp: hrp.to_string(),
    })?;
    bech32::encode::<Bech32m>(hrp, data).map_err(|_| CodecError::Bech32mChecksumFailed)
}

/// Decode a bech32m string into its human-readable part and payload bytes.
///
/// # Errors
///
/// Returns [`CodecError::Bech32mChecksumFailed`] for anything that is not a
/// well-formed bech32m string — wrong charset, mixed case, or a checksum
/// mismatch (every single-character substitution lands here).
pub fn decode(s: &str) -> Result<(String, Vec<u8>), CodecError> {
    let checked =
        CheckedHrpstring::new::<Bech32m>(s).map_err(|_| CodecError::Bech32mChecksumFailed)?;
    let hrp = checked.hrp().to_lowercase();
    let bytes = checked.byte_iter().collect();
    Ok((hrp, bytes))
}
