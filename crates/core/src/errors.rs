//! Error types

use alloy_primitives::Address;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Numeric failures in tick/price math
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Value out of decimal range in {0}")]
    Overflow(&'static str),

    #[error("Too few significant digits left in {0}")]
    PrecisionLoss(&'static str),

    #[error("Division by zero")]
    DivisionByZero,
}

/// Failure while pricing a single pool
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Insufficient cumulative data: {available} observations, need 2")]
    InsufficientData { available: usize },

    #[error("Division by zero: TWAP price is zero")]
    DivisionByZero,

    #[error("Math error: {0}")]
    Math(MathError),

    #[error("Pool read timed out after {0:?}")]
    Timeout(Duration),
}

impl From<MathError> for PriceError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::DivisionByZero => PriceError::DivisionByZero,
            other => PriceError::Math(other),
        }
    }
}

impl PriceError {
    /// Pipeline stage the error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            PriceError::Transport(_) | PriceError::Timeout(_) => Stage::Read,
            PriceError::Decode(_) | PriceError::InsufficientData { .. } => Stage::Decode,
            PriceError::DivisionByZero | PriceError::Math(_) => Stage::Compute,
        }
    }
}

/// Stage of the per-pool pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Decode,
    Compute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Decode => "decode",
            Stage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// A [`PriceError`] tagged with the pool it came from
#[derive(Debug, Error)]
#[error("{pair} ({pool}) failed at {stage}: {source}")]
pub struct PoolError {
    pub pool: Address,
    pub pair: String,
    pub stage: Stage,
    #[source]
    pub source: PriceError,
}

impl PoolError {
    pub fn new(pool: Address, pair: impl Into<String>, source: PriceError) -> Self {
        Self {
            pool,
            pair: pair.into(),
            stage: source.stage(),
            source,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing RPC endpoint: set rpc_url, TWAP__RPC_URL or RPC_URL")]
    MissingRpcUrl,

    #[error("No pools configured")]
    NoPools,

    #[error("Duplicate pair label: {0}")]
    DuplicatePair(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Result type alias
pub type MathResult<T> = Result<T, MathError>;
pub type PriceResult<T> = Result<T, PriceError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
