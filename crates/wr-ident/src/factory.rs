// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entropy port and the id factory.

use crate::{BrandedId, IdError};
use rand::RngCore;
use rand::rngs::OsRng;

/// Source of identifier entropy.
///
/// The factory asks for 16 bytes per id; an IO-backed source that cannot
/// deliver them reports the short count and the mint fails with
/// [`IdError::EntropyExhausted`] rather than padding.
pub trait EntropySource: Send {
    /// Fill `buf` with entropy, returning the number of bytes written.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Operating-system entropy (`getrandom` via [`OsRng`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| std::io::Error::other(e))?;
        Ok(buf.len())
    }
}

/// Mints fresh branded identifiers from an injected entropy source.
///
/// The factory is a plain owned value handed to the components that mint
/// ids; there is no process-wide instance.
///
/// # Examples
///
/// ```
/// use wr_ident::{IdFactory, OsEntropy, RunId};
///
/// let mut factory = IdFactory::new(OsEntropy);
/// let a: RunId = factory.mint().unwrap();
/// let b: RunId = factory.mint().unwrap();
/// assert_ne!(a, b);
/// ```
pub struct IdFactory {
    source: Box<dyn EntropySource>,
    last: Option<[u8; 16]>,
}

impl std::fmt::Debug for IdFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdFactory").finish_non_exhaustive()
    }
}

impl IdFactory {
    /// Build a factory over the given entropy source.
    pub fn new(source: impl EntropySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            last: None,
        }
    }

    /// Mint a fresh identifier of the requested kind.
    ///
    /// Two consecutive mints never reuse the same entropy: a source stuck
    /// on one value is treated as exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::EntropyExhausted`] if the source fails, returns
    /// fewer than 16 bytes, or repeats the previous draw.
    pub fn mint<T: BrandedId>(&mut self) -> Result<T, IdError> {
        let entropy = self.draw16()?;
        Ok(T::from_entropy(entropy))
    }

    fn draw16(&mut self) -> Result<[u8; 16], IdError> {
        for _ in 0..2 {
            let mut buf = [0u8; 16];
            let written = self
                .source
                .fill(&mut buf)
                .map_err(|_| IdError::EntropyExhausted)?;
            if written < buf.len() {
                return Err(IdError::EntropyExhausted);
            }
            if self.last != Some(buf) {
                self.last = Some(buf);
                return Ok(buf);
            }
        }
        Err(IdError::EntropyExhausted)
    }
}
