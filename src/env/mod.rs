pub mod env;
pub mod reward;
pub mod trade;

pub use env::{EnvState, StepInfo, StepResult, TradingEnvironment};
pub use reward::{base_reward, sharpe_reward, RewardCalculator, TradeOutcome};
pub use trade::{Position, PositionSide, TradeRecord, TradeStatistics};
