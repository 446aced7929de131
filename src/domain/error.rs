// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Transaction failed: {hash:?}, reason: {reason}")]
    Transaction { hash: String, reason: String },

    #[error("Transaction confirmation timeout after {timeout_ms} ms")]
    TxTimeout { timeout_ms: u64 },

    #[error("TWAP deviation too large: current tick {current_tick}, twap tick {twap_tick}")]
    TwapViolation { current_tick: i32, twap_tick: i32 },

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    #[error("Swap reverted: {0}")]
    SwapRevert(String),

    #[error("Mint reverted: {0}")]
    MintRevert(String),

    #[error("Strategy execution error: {0}")]
    Strategy(String),

    #[error("Persisted state unreadable: {0}")]
    StateCorrupt(String),

    #[error("Address {0} is invalid or not checksummed")]
    InvalidAddress(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors that should make the caller ask the endpoint
    /// supervisor to rotate (rate limits, dead sockets, stalled reads).
    pub fn wants_endpoint_rotation(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("too many requests")
            || msg.contains("429")
            || msg.contains("bad_data")
            || msg.contains("timeout")
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_matching_covers_rate_limits_and_timeouts() {
        assert!(AppError::Connection("HTTP 429 Too Many Requests".into()).wants_endpoint_rotation());
        assert!(AppError::TxTimeout { timeout_ms: 60_000 }.wants_endpoint_rotation());
        assert!(AppError::Connection("bad_data from backend".into()).wants_endpoint_rotation());
        assert!(!AppError::SwapRevert("Too little received".into()).wants_endpoint_rotation());
    }
}
