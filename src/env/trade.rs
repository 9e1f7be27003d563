use serde::{Deserialize, Serialize};

use crate::{
    constants::reward::SHARPE_EPSILON,
    env::reward::sharpe_reward,
    utils::mean,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    pub fn direction(&self) -> f64 {
        match self {
            PositionSide::Flat => 0.0,
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// An open position, entered at `entry_price` on `entry_step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub entry_step: usize,
}

impl Position {
    /// Return of the position if it were closed at `price`
    pub fn return_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Flat => 0.0,
            PositionSide::Long => price / self.entry_price - 1.0,
            PositionSide::Short => 1.0 - price / self.entry_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,
    pub entry_step: usize,
    pub exit_step: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    pub return_pct: f64,
    /// Reward of the step that closed the trade, zero when closed by episode end
    pub reward: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    /// Sum of per-trade returns
    pub total_return: f64,
    pub sharpe: f64,
    pub final_capital: f64,
    pub return_pct: f64,
}

impl TradeStatistics {
    pub fn from_trades(trades: &[TradeRecord], initial_capital: f64, final_capital: f64) -> Self {
        let returns: Vec<f64> = trades.iter().map(|trade| trade.return_pct).collect();
        let wins: Vec<f64> = returns.iter().copied().filter(|value| *value > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|value| *value <= 0.0).collect();

        Self {
            total_trades: trades.len(),
            win_rate: if trades.is_empty() {
                0.0
            } else {
                wins.len() as f64 / trades.len() as f64
            },
            average_win: mean(&wins),
            average_loss: mean(&losses),
            total_return: returns.iter().sum(),
            sharpe: sharpe_reward(&returns, SHARPE_EPSILON),
            final_capital,
            return_pct: if initial_capital > 0.0 {
                final_capital / initial_capital - 1.0
            } else {
                0.0
            },
        }
    }
}
