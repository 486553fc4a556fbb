// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixed-width binary token payload.
//!
//! Layout (66 bytes): version byte, kind byte, then four 16-byte slots.
//! Slots one to three are always session, run, and node entropy. The
//! fourth slot depends on the kind: state tokens carry the first 16 bytes
//! of the pinned workflow hash, ack and checkpoint tokens carry the
//! attempt id.

use crate::TokenError;
use wr_codec::{ByteReader, WorkflowHash};
use wr_ident::{AttemptId, BrandedId, NodeId, RunId, SessionId};

/// Version byte at offset 0.
pub const TOKEN_VERSION: u8 = 1;

/// Packed payload length in bytes.
pub const TOKEN_PAYLOAD_LEN: usize = 66;

/// The three token kinds, with their wire byte and human-readable part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Position token handed out after every advance.
    State,
    /// Acknowledgement token for one advance attempt.
    Ack,
    /// Checkpoint token minted on request.
    Checkpoint,
}

impl TokenKind {
    /// Wire byte at payload offset 1.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::State => 0,
            Self::Ack => 1,
            Self::Checkpoint => 2,
        }
    }

    /// Decode the wire byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::State),
            1 => Some(Self::Ack),
            2 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// The bech32m human-readable part for this kind.
    #[must_use]
    pub fn hrp(self) -> &'static str {
        match self {
            Self::State => "st",
            Self::Ack => "ack",
            Self::Checkpoint => "chk",
        }
    }

    /// Decode a human-readable part.
    #[must_use]
    pub fn from_hrp(hrp: &str) -> Option<Self> {
        match hrp {
            "st" => Some(Self::State),
            "ack" => Some(Self::Ack),
            "chk" => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// Decoded token payload, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPayload {
    /// Current position plus the pinned workflow.
    State {
        /// Session the token belongs to.
        session: SessionId,
        /// Run within the session.
        run: RunId,
        /// Node the caller stands at.
        node: NodeId,
        /// First 16 bytes of the pinned workflow hash.
        workflow_hash_ref: [u8; 16],
    },
    /// Acknowledgement of one advance attempt.
    Ack {
        /// Session the token belongs to.
        session: SessionId,
        /// Run within the session.
        run: RunId,
        /// Node being advanced from.
        node: NodeId,
        /// The attempt being acknowledged.
        attempt: AttemptId,
    },
    /// A resumable checkpoint.
    Checkpoint {
        /// Session the token belongs to.
        session: SessionId,
        /// Run within the session.
        run: RunId,
        /// Node the checkpoint was taken at.
        node: NodeId,
        /// Attempt current at checkpoint time.
        attempt: AttemptId,
    },
}

impl TokenPayload {
    /// The kind this payload packs as.
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::State { .. } => TokenKind::State,
            Self::Ack { .. } => TokenKind::Ack,
            Self::Checkpoint { .. } => TokenKind::Checkpoint,
        }
    }

    /// Session id common to every kind.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        match self {
            Self::State { session, .. }
            | Self::Ack { session, .. }
            | Self::Checkpoint { session, .. } => session,
        }
    }

    /// Run id common to every kind.
    #[must_use]
    pub fn run(&self) -> &RunId {
        match self {
            Self::State { run, .. } | Self::Ack { run, .. } | Self::Checkpoint { run, .. } => run,
        }
    }

    /// Node id common to every kind.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        match self {
            Self::State { node, .. } | Self::Ack { node, .. } | Self::Checkpoint { node, .. } => {
                node
            }
        }
    }

    /// The truncated hash reference a state token carries for `hash`.
    #[must_use]
    pub fn workflow_hash_ref_of(hash: &WorkflowHash) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&hash.as_bytes()[..16]);
        out
    }

    /// Pack into the fixed 66-byte wire form.
    #[must_use]
    pub fn pack(&self) -> [u8; TOKEN_PAYLOAD_LEN] {
        let mut out = [0u8; TOKEN_PAYLOAD_LEN];
        out[0] = TOKEN_VERSION;
        out[1] = self.kind().byte();
        let (slot3, slot4): ([u8; 16], [u8; 16]) = match self {
            Self::State {
                node,
                workflow_hash_ref,
                ..
            } => (node.entropy(), *workflow_hash_ref),
            Self::Ack { node, attempt, .. } | Self::Checkpoint { node, attempt, .. } => {
                (node.entropy(), attempt.entropy())
            }
        };
        out[2..18].copy_from_slice(&self.session().entropy());
        out[18..34].copy_from_slice(&self.run().entropy());
        out[34..50].copy_from_slice(&slot3);
        out[50..66].copy_from_slice(&slot4);
        out
    }

    /// Unpack a 66-byte payload.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidFormat`] on a wrong length, version, or
    /// kind byte.
    pub fn unpack(bytes: &[u8]) -> Result<Self, TokenError> {
        let codec = |e: wr_codec::CodecError| TokenError::invalid(e.to_string());
        let mut reader = ByteReader::new(bytes);
        let version = reader.take_u8().map_err(codec)?;
        if version != TOKEN_VERSION {
            return Err(TokenError::invalid(format!(
                "unsupported token version {version}"
            )));
        }
        let kind_byte = reader.take_u8().map_err(codec)?;
        let kind = TokenKind::from_byte(kind_byte).ok_or_else(|| {
            TokenError::invalid(format!("unknown token kind byte {kind_byte}"))
        })?;
        let session = SessionId::from_entropy(reader.take_16().map_err(codec)?);
        let run = RunId::from_entropy(reader.take_16().map_err(codec)?);
        let node = NodeId::from_entropy(reader.take_16().map_err(codec)?);
        let slot4 = reader.take_16().map_err(codec)?;
        reader.finish().map_err(codec)?;

        Ok(match kind {
            TokenKind::State => Self::State {
                session,
                run,
                node,
                workflow_hash_ref: slot4,
            },
            TokenKind::Ack => Self::Ack {
                session,
                run,
                node,
                attempt: AttemptId::from_entropy(slot4),
            },
            TokenKind::Checkpoint => Self::Checkpoint {
                session,
                run,
                node,
                attempt: AttemptId::from_entropy(slot4),
            },
        })
    }
}
