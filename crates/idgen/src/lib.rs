//! Short, human-friendly random identifiers.
//!
//! Identifiers are drawn from the operating system CSPRNG over a curated
//! alphabet without visually confusable symbols. [`AllocationPolicy`] holds
//! the pure retry rule the allocator uses when a candidate collides.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use thiserror::Error;

/// Default alphabet: digits and upper-case letters without `0`, `O`, `1`, `I`.
pub const DEFAULT_CHARSET: &str = "23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Errors raised while configuring a generator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdGenError {
    #[error("Charset must contain at least one character")]
    EmptyCharset,
}

/// Non-empty set of symbols identifiers are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    symbols: Vec<char>,
}

impl Charset {
    pub fn new(symbols: &str) -> Result<Self, IdGenError> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.is_empty() {
            return Err(IdGenError::EmptyCharset);
        }
        Ok(Self { symbols })
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn contains(&self, c: char) -> bool {
        self.symbols.contains(&c)
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_CHARSET.chars().collect(),
        }
    }
}

/// Generates `length` symbols, each drawn uniformly from `charset` with the OS CSPRNG.
pub fn generate(length: usize, charset: &Charset) -> String {
    generate_with_rng(&mut OsRng, length, charset)
}

/// Same as [`generate`] with a caller-supplied cryptographic RNG.
pub fn generate_with_rng<R>(rng: &mut R, length: usize, charset: &Charset) -> String
where
    R: Rng + CryptoRng + ?Sized,
{
    (0..length)
        .filter_map(|_| charset.symbols.choose(&mut *rng).copied())
        .collect()
}

/// Source of candidate identifiers for the allocator.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// [`IdGenerator`] backed by the OS CSPRNG.
#[derive(Debug, Clone, Default)]
pub struct SecureIdGenerator {
    charset: Charset,
}

impl SecureIdGenerator {
    pub fn new(charset: Charset) -> Self {
        Self { charset }
    }
}

impl IdGenerator for SecureIdGenerator {
    fn generate(&self, length: usize) -> String {
        generate(length, &self.charset)
    }
}

/// Retry budget and length escalation for identifier allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub base_length: usize,
    pub max_attempts: u32,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            base_length: 8,
            max_attempts: 10,
        }
    }
}

impl AllocationPolicy {
    pub fn new(base_length: usize, max_attempts: u32) -> Self {
        Self {
            base_length,
            max_attempts,
        }
    }

    /// Candidate length for the zero-based `attempt`.
    ///
    /// Attempts 0 and 1 use the base length; from attempt 2 onward each
    /// attempt adds one symbol.
    pub fn length_for_attempt(&self, attempt: u32) -> usize {
        if attempt > 1 {
            self.base_length + (attempt as usize - 1)
        } else {
            self.base_length
        }
    }
}
