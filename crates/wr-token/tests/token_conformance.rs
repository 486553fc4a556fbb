// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conformance grid for the token wire format.

use wr_ident::{AttemptId, BrandedId, NodeId, RunId, SessionId};
use wr_keyring::{KeyMaterial, Keyring};
use wr_token::{
    TOKEN_PAYLOAD_LEN, TOKEN_SIGNATURE_LEN, TokenKind, TokenPayload, parse, sign, verify,
};

fn keyring() -> Keyring {
    Keyring::new(KeyMaterial::from_raw(&[0x11; 32]))
}

fn payloads() -> Vec<TokenPayload> {
    let session = SessionId::from_entropy([1; 16]);
    let run = RunId::from_entropy([2; 16]);
    let node = NodeId::from_entropy([3; 16]);
    let attempt = AttemptId::from_entropy([4; 16]);
    vec![
        TokenPayload::State {
            session: session.clone(),
            run: run.clone(),
            node: node.clone(),
            workflow_hash_ref: TokenPayload::workflow_hash_ref_of(&wr_codec::sha256_digest(b"w")),
        },
        TokenPayload::Ack {
            session: session.clone(),
            run: run.clone(),
            node: node.clone(),
            attempt: attempt.clone(),
        },
        TokenPayload::Checkpoint {
            session,
            run,
            node,
            attempt,
        },
    ]
}

#[test]
fn hrp_matches_kind_for_every_payload() {
    let ring = keyring();
    for payload in payloads() {
        let token = sign(&payload, &ring).unwrap();
        let expected_prefix = format!("{}1", payload.kind().hrp());
        assert!(
            token.starts_with(&expected_prefix),
            "{token} does not start with {expected_prefix}"
        );
        let parsed = parse(&token).unwrap();
        assert_eq!(parsed.kind, payload.kind());
        assert_eq!(parsed.payload.len(), TOKEN_PAYLOAD_LEN);
        assert_eq!(parsed.signature.len(), TOKEN_SIGNATURE_LEN);
    }
}

#[test]
fn every_kind_byte_hrp_pairing_is_checked() {
    // Wrap each packed payload under each of the three prefixes; only the
    // matching one parses, the others are kind mismatches.
    for payload in payloads() {
        let packed = payload.pack();
        let mut wire = packed.to_vec();
        wire.extend_from_slice(&[0u8; TOKEN_SIGNATURE_LEN]);
        for hrp_kind in [TokenKind::State, TokenKind::Ack, TokenKind::Checkpoint] {
            let token = wr_codec::bech32m::encode(hrp_kind.hrp(), &wire).unwrap();
            let result = parse(&token);
            if hrp_kind == payload.kind() {
                assert!(result.is_ok());
            } else {
                assert_eq!(
                    result.unwrap_err().code(),
                    "TOKEN_KIND_MISMATCH",
                    "{:?} under {:?} prefix",
                    payload.kind(),
                    hrp_kind
                );
            }
        }
    }
}

#[test]
fn ids_survive_the_binary_round_trip_exactly() {
    let ring = keyring();
    for payload in payloads() {
        let token = sign(&payload, &ring).unwrap();
        let verified = verify(&parse(&token).unwrap(), &ring).unwrap();
        assert_eq!(verified.session(), payload.session());
        assert_eq!(verified.run(), payload.run());
        assert_eq!(verified.node(), payload.node());
        assert_eq!(verified, payload);
    }
}

#[test]
fn truncated_and_padded_wires_are_invalid() {
    let ring = keyring();
    let payload = payloads().remove(0);
    let packed = payload.pack();

    // One byte short.
    let mut short = packed.to_vec();
    short.extend_from_slice(&[0u8; TOKEN_SIGNATURE_LEN - 1]);
    let token = wr_codec::bech32m::encode("st", &short).unwrap();
    assert_eq!(parse(&token).unwrap_err().code(), "TOKEN_INVALID_FORMAT");

    // One byte long.
    let mut long = packed.to_vec();
    long.extend_from_slice(&[0u8; TOKEN_SIGNATURE_LEN + 1]);
    let token = wr_codec::bech32m::encode("st", &long).unwrap();
    assert_eq!(parse(&token).unwrap_err().code(), "TOKEN_INVALID_FORMAT");

    let _ = sign(&payload, &ring).unwrap();
}

#[test]
fn version_zero_payload_is_invalid() {
    let payload = payloads().remove(0);
    let mut packed = payload.pack().to_vec();
    packed[0] = 0;
    packed.extend_from_slice(&[0u8; TOKEN_SIGNATURE_LEN]);
    let token = wr_codec::bech32m::encode("st", &packed).unwrap();
    assert_eq!(parse(&token).unwrap_err().code(), "TOKEN_INVALID_FORMAT");
}

#[test]
fn unknown_kind_byte_is_invalid_not_mismatch() {
    let payload = payloads().remove(0);
    let mut packed = payload.pack().to_vec();
    packed[1] = 9;
    packed.extend_from_slice(&[0u8; TOKEN_SIGNATURE_LEN]);
    let token = wr_codec::bech32m::encode("st", &packed).unwrap();
    assert_eq!(parse(&token).unwrap_err().code(), "TOKEN_INVALID_FORMAT");
}

#[test]
fn verification_consults_previous_key_second() {
    let old = Keyring::new(KeyMaterial::from_raw(&[0x22; 32]));
    let payload = payloads().remove(1);
    let token = sign(&payload, &old).unwrap();

    let rotated = old.rotated(KeyMaterial::from_raw(&[0x33; 32]));
    let parsed = parse(&token).unwrap();
    assert_eq!(verify(&parsed, &rotated).unwrap(), payload);

    // A keyring that never held the signing key refuses.
    let stranger = Keyring::new(KeyMaterial::from_raw(&[0x44; 32]));
    assert_eq!(
        verify(&parsed, &stranger).unwrap_err().code(),
        "TOKEN_BAD_SIGNATURE"
    );
}
