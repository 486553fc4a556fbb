// SPDX-License-Identifier: MIT OR Apache-2.0
//! The outward error envelope.
//!
//! Core components speak their own closed error sets; the RPC layer
//! speaks `{code, message, retry, details}`. The conversions here carry
//! codes through verbatim — a store error never turns into a projection
//! error on the way out — and attach the retry hint where one is
//! meaningful. Tampering detail stays generic: a bad token signature
//! reports the same envelope whichever key failed.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use wr_gate::GateError;

/// Whether (and when) a caller should retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryHint {
    /// Retrying the same call cannot succeed.
    NotRetryable,
    /// Retry after the given delay.
    RetryableAfterMs {
        /// Suggested delay in milliseconds.
        #[serde(rename = "afterMs")]
        after_ms: u64,
    },
}

/// The envelope handed to the outer RPC layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Stable machine-readable code, verbatim from the failing component.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Retry guidance.
    pub retry: RetryHint,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Build a non-retryable envelope.
    #[must_use]
    pub fn terminal(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retry: RetryHint::NotRetryable,
            details: None,
        }
    }

    /// Build a retryable envelope.
    #[must_use]
    pub fn retryable(code: &str, message: impl Into<String>, after_ms: u64) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retry: RetryHint::RetryableAfterMs { after_ms },
            details: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

macro_rules! terminal_from {
    ($($ty:ty),+ $(,)?) => {
        $(impl From<$ty> for ErrorEnvelope {
            fn from(e: $ty) -> Self {
                Self::terminal(e.code(), e.to_string())
            }
        })+
    };
}

terminal_from!(
    wr_codec::CodecError,
    wr_ident::IdError,
    wr_keyring::KeyringError,
    wr_token::TokenError,
    wr_event::SchemaError,
    wr_store::StoreError,
    wr_store::SnapshotStoreError,
    wr_store::PinnedStoreError,
    wr_projection::ProjectionError,
    wr_bundle::BundleError,
);

impl From<wr_store::LockError> for ErrorEnvelope {
    fn from(e: wr_store::LockError) -> Self {
        match e {
            wr_store::LockError::Busy { after_ms } => {
                Self::retryable(e.code(), e.to_string(), after_ms)
            }
            wr_store::LockError::Io { .. } => Self::terminal(e.code(), e.to_string()),
        }
    }
}

impl From<GateError> for ErrorEnvelope {
    fn from(e: GateError) -> Self {
        match &e {
            GateError::Locked { after_ms } => Self::retryable(e.code(), e.to_string(), *after_ms),
            GateError::NotHealthy { health } => {
                let details = serde_json::to_value(health).ok();
                let mut envelope = Self::terminal(e.code(), e.to_string());
                envelope.details = details;
                envelope
            }
            _ => Self::terminal(e.code(), e.to_string()),
        }
    }
}
