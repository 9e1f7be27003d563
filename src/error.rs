//! Error types shared by every component of the engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed pricing or strategy inputs
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The implied volatility solver could not bracket or converge on a root
    #[error("implied volatility did not converge after {iterations} iterations: {reason}")]
    Convergence { iterations: u32, reason: String },

    #[error("unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    /// Checkpoint dimensions disagree with the live agent
    #[error(
        "checkpoint dimensions {found_state}x{found_action} do not match agent {expected_state}x{expected_action}"
    )]
    DimensionMismatch {
        expected_state: usize,
        expected_action: usize,
        found_state: usize,
        found_action: usize,
    },

    /// Training was requested before the replay buffer holds a full batch.
    /// Callers are expected to skip the update and keep going.
    #[error("replay buffer holds {len} transitions, need {batch_size}")]
    BufferUnderflow { len: usize, batch_size: usize },

    #[error("environment episode has terminated, call reset() first")]
    EnvironmentTerminated,

    #[error("environment has not been reset")]
    EnvironmentNotReset,

    #[error("market data unavailable for {ticker} on {date}: {reason}")]
    DataUnavailable {
        ticker: String,
        date: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding error: {0}")]
    Checkpoint(#[from] postcard::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chart error: {0}")]
    Chart(String),
}

impl EngineError {
    /// Errors a training loop should swallow instead of aborting on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::BufferUnderflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_buffer_underflow_is_recoverable() {
        assert!(EngineError::BufferUnderflow { len: 3, batch_size: 64 }.is_recoverable());
        assert!(!EngineError::EnvironmentTerminated.is_recoverable());
        assert!(!EngineError::InvalidInput("x".into()).is_recoverable());
    }

    #[test]
    fn dimension_mismatch_message_names_both_shapes() {
        let err = EngineError::DimensionMismatch {
            expected_state: 128,
            expected_action: 3,
            found_state: 64,
            found_action: 5,
        };
        let message = err.to_string();
        assert!(message.contains("64x5"));
        assert!(message.contains("128x3"));
    }
}
