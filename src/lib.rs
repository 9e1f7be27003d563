//! Trainable trading decision engine: analysis reports are encoded into a
//! fixed-size state, options are priced with Black-Scholes, and a DQN agent
//! learns action values inside a stepwise trading environment.

pub mod agent;
pub mod charts;
pub mod config;
pub mod constants;
pub mod data;
pub mod encoder;
pub mod env;
pub mod error;
pub mod gym;
pub mod history;
pub mod options;
pub mod types;
pub mod utils;

pub use agent::{train::Trainer, DqnAgent, TrainingStats};
pub use config::EngineConfig;
pub use encoder::{AnalysisRecord, StateEncoder, StateVector};
pub use env::TradingEnvironment;
pub use error::{EngineError, Result};
pub use gym::{Action, ActionValues};
