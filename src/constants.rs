pub const TICKERS: [&str; 3] = ["NVDA", "AAPL", "TSLA"];
pub const TRAINING_DATES: [&str; 4] = ["2024-05-10", "2024-06-15", "2024-07-20", "2024-08-25"];

pub mod files {
    pub const CHECKPOINT_FILE: &str = "weights/dqn_agent.bin";
}

/// Fixed layout of the encoded state vector. Every segment is addressed by
/// offset so the network always sees the same feature in the same slot.
pub mod state {
    pub const STATE_DIM: usize = 128;

    pub const TECHNICAL_OFFSET: usize = 0;
    pub const TECHNICAL_LEN: usize = 16;
    pub const FUNDAMENTAL_OFFSET: usize = 16;
    pub const FUNDAMENTAL_LEN: usize = 16;
    pub const NEWS_OFFSET: usize = 32;
    pub const NEWS_LEN: usize = 8;
    pub const SOCIAL_OFFSET: usize = 40;
    pub const SOCIAL_LEN: usize = 8;
    pub const OPTIONS_OFFSET: usize = 48;
    pub const OPTIONS_LEN: usize = 16;
    /// Options mode flag followed by one presence flag per category
    pub const META_OFFSET: usize = 64;
    pub const META_LEN: usize = 8;
    /// Written by the environment, never by the encoder
    pub const EPISODE_OFFSET: usize = 72;
    pub const EPISODE_LEN: usize = 8;
    pub const RESERVED_OFFSET: usize = 80;
}

pub mod agent {
    pub const ACTION_COUNT: usize = 3;
    pub const HIDDEN_DIMS: [usize; 3] = [256, 128, 64];
    pub const DROPOUT: f64 = 0.2;
    pub const LEARNING_RATE: f64 = 1e-3;
    pub const GAMMA: f64 = 0.99;
    pub const EPSILON_START: f64 = 1.0;
    pub const EPSILON_END: f64 = 0.01;
    pub const EPSILON_DECAY: f64 = 0.995;
    pub const MEMORY_SIZE: usize = 10_000;
    pub const BATCH_SIZE: usize = 64;
    pub const TARGET_SYNC_INTERVAL: u64 = 10;
    pub const MAX_GRAD_NORM: f64 = 1.0;
    /// Episodes averaged by the training statistics
    pub const STATS_WINDOW: usize = 100;
}

pub mod reward {
    pub const SCALE: f64 = 10.0;
    pub const CAP: f64 = 5.0;
    pub const TRANSACTION_COST: f64 = 0.01;
    pub const RISK_WEIGHT: f64 = 0.1;
    pub const TIME_DECAY_WEIGHT: f64 = 0.1;
    pub const GAMMA_WEIGHT: f64 = 0.05;
    /// Take-profit and stop distances priced by the profit-probability variant
    pub const TARGET_PCT: f64 = 0.05;
    pub const STOP_LOSS_PCT: f64 = 0.02;
    pub const SHARPE_WINDOW: usize = 20;
    pub const SHARPE_EPSILON: f64 = 1e-8;
}

pub mod options {
    pub const RISK_FREE_RATE: f64 = 0.04;
    pub const IV_LOWER: f64 = 1e-4;
    pub const IV_UPPER: f64 = 5.0;
    pub const IV_MAX_ITERATIONS: u32 = 100;
    pub const IV_TOLERANCE: f64 = 1e-6;
    pub const DAYS_PER_YEAR: f64 = 365.0;
    pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
    /// Strikes nearest to spot averaged into the ATM implied volatility
    pub const ATM_STRIKES: usize = 5;
    pub const BEARISH_PUT_CALL: f64 = 1.0;
    pub const BULLISH_PUT_CALL: f64 = 0.7;
    pub const IV_PREMIUM_BAND: f64 = 0.10;
}

pub mod env {
    pub const INITIAL_CAPITAL: f64 = 100_000.0;
    pub const MAX_STEPS_PER_EPISODE: usize = 100;
    pub const PRICE_WINDOW: usize = 256;
    pub const DAYS_PER_STEP: f64 = 1.0;
    /// Step volatility of the synthetic random walk
    pub const SYNTHETIC_VOLATILITY: f64 = 0.02;
    pub const SYNTHETIC_START_PRICE: f64 = 100.0;
}

pub mod trainer {
    pub const EPISODES: usize = 1000;
    pub const CHECKPOINT_INTERVAL: usize = 100;
    pub const LOG_INTERVAL: usize = 10;
    pub const MOVING_AVERAGE_WINDOW: usize = 20;
}
