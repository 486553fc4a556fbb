// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strict base64url (no padding) for keyring material.

use crate::CodecError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Encode bytes as unpadded base64url.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url string.
///
/// # Errors
///
/// Returns [`CodecError::Base64UrlInvalid`] for `=` padding, `+`/`/` from
/// the standard alphabet, or any other non-alphabet byte.
///
/// # Examples
///
/// ```
/// let s = wr_codec::base64url::encode(&[0xfb, 0xff]);
/// assert_eq!(wr_codec::base64url::decode(&s).unwrap(), vec![0xfb, 0xff]);
/// assert!(wr_codec::base64url::decode("AA==").is_err());
/// ```
pub fn decode(s: &str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| CodecError::Base64UrlInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_padding() {
        assert_eq!(decode("AA==").unwrap_err().code(), "BASE64URL_INVALID");
    }

    #[test]
    fn rejects_standard_alphabet() {
        // 0xfb 0xff encodes to "-_8" url-safe, "+/8" standard.
        assert_eq!(encode(&[0xfb, 0xff]), "-_8");
        assert!(decode("+/8").is_err());
    }

    #[test]
    fn thirty_two_byte_keys_round_trip() {
        let key = [0x42u8; 32];
        let s = encode(&key);
        assert_eq!(decode(&s).unwrap(), key.to_vec());
    }
}
