use std::collections::VecDeque;

use tracing::debug;

use crate::{
    config::{RewardConfig, RewardVariant},
    options::Greeks,
    utils::{finite_or, mean, std_dev},
};

/// What one environment step did to the position, as seen by the reward
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeOutcome {
    /// Mark-to-market return of the held position over the step, 0.10 = +10%
    pub pnl_pct: Option<f64>,
    /// A position was opened or closed this step
    pub traded: bool,
    /// Return of a trade closed this step
    pub realized_return: Option<f64>,
    /// Only set while a position is exposed to the market on this step
    pub realized_volatility: Option<f64>,
    pub greeks: Option<Greeks>,
    pub days_held: f64,
    /// Direction of the position held after the step: 1 long, -1 short, 0 flat
    pub exposure: f64,
    /// Estimated chance the next move is up
    pub probability_up: Option<f64>,
}

/// `clamp(sign(pnl) * min(|pnl| * 100 * scale, cap), -cap, cap) - cost`,
/// with the cost only charged when the step traded
pub fn base_reward(pnl_pct: f64, traded: bool, config: &RewardConfig) -> f64 {
    let magnitude = (pnl_pct.abs() * 100.0 * config.scale).min(config.cap);
    let reward = (pnl_pct.signum() * magnitude).clamp(-config.cap, config.cap);
    let reward = if pnl_pct == 0.0 { 0.0 } else { reward };

    if traded {
        reward - config.transaction_cost
    } else {
        reward
    }
}

/// Mean over standard deviation of the given returns, zero below two samples
pub fn sharpe_reward(returns: &[f64], epsilon: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    mean(returns) / (std_dev(returns) + epsilon)
}

/// `(win_rate - 0.5) * 2 + (profit_factor - 1)` over realized trade returns,
/// zero without trades. A trade that returned exactly 0 counts as a loss.
pub fn win_rate_reward(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let (wins, losses): (Vec<f64>, Vec<f64>) = returns.iter().copied().partition(|value| *value > 0.0);
    let win_rate = wins.len() as f64 / returns.len() as f64;

    let gross_win = wins.len() as f64 * mean(&wins);
    let average_loss = mean(&losses);
    let profit_factor = if average_loss != 0.0 {
        gross_win / (losses.len() as f64 * average_loss.abs())
    } else {
        gross_win
    };

    (win_rate - 0.5) * 2.0 + (profit_factor - 1.0)
}

/// Expected return of a position in `direction` that exits at `target` in
/// its favour or `stop` against it, both as fractions of the entry price
pub fn expected_value(direction: f64, probability_up: f64, target: f64, stop: f64) -> f64 {
    let favourable = if direction < 0.0 {
        1.0 - probability_up
    } else {
        probability_up
    };
    target * favourable - stop * (1.0 - favourable)
}

/// Reward family selected by [`RewardVariant`]. The Sharpe and win-rate
/// variants carry state: the most recent realized trade returns.
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    config: RewardConfig,
    realized: VecDeque<f64>,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            realized: VecDeque::with_capacity(config.sharpe_window),
            config,
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Clears the realized trade window, called at episode reset
    pub fn reset(&mut self) {
        self.realized.clear();
    }

    /// Never fails. A missing or non-finite PnL yields zero reward.
    pub fn calculate(&mut self, outcome: &TradeOutcome) -> f64 {
        let Some(pnl_pct) = outcome.pnl_pct.filter(|pnl| pnl.is_finite()) else {
            debug!(pnl = ?outcome.pnl_pct, "non-finite pnl, defaulting reward to zero");
            return 0.0;
        };

        let config = &self.config;
        let reward = match config.variant {
            RewardVariant::Base => base_reward(pnl_pct, outcome.traded, config),
            RewardVariant::RiskAdjusted => {
                let volatility = outcome
                    .realized_volatility
                    .filter(|volatility| volatility.is_finite())
                    .unwrap_or(0.0);
                base_reward(pnl_pct, outcome.traded, config) - config.risk_weight * volatility
            }
            RewardVariant::Options => {
                let (theta, gamma) = outcome.greeks.map_or((0.0, 0.0), |greeks| {
                    (finite_or(greeks.theta, 0.0), finite_or(greeks.gamma, 0.0))
                });
                base_reward(pnl_pct, outcome.traded, config)
                    - config.time_decay_weight * theta.abs() * outcome.days_held.max(0.0)
                    - config.gamma_weight * gamma.abs()
            }
            RewardVariant::Sharpe => {
                let (epsilon, cap) = (config.sharpe_epsilon, config.cap);
                let Some(window) = self.record_realized(outcome) else {
                    return 0.0;
                };
                sharpe_reward(window, epsilon).clamp(-cap, cap)
            }
            RewardVariant::WinRate => {
                let cap = config.cap;
                let Some(window) = self.record_realized(outcome) else {
                    return 0.0;
                };
                win_rate_reward(window).clamp(-cap, cap)
            }
            RewardVariant::ProfitProbability => {
                let value = match outcome.probability_up.filter(|p| p.is_finite()) {
                    Some(probability) if outcome.exposure != 0.0 => expected_value(
                        outcome.exposure,
                        probability.clamp(0.0, 1.0),
                        config.target_pct,
                        config.stop_loss_pct,
                    ),
                    _ => 0.0,
                };
                let cost = if outcome.traded { config.transaction_cost } else { 0.0 };
                (config.scale * value - cost).clamp(-config.cap, config.cap)
            }
        };

        finite_or(reward, 0.0)
    }

    /// Pushes a realized trade return into the window. `None` when the step
    /// closed no trade.
    fn record_realized(&mut self, outcome: &TradeOutcome) -> Option<&[f64]> {
        let realized = outcome.realized_return.filter(|value| value.is_finite())?;
        if self.realized.len() == self.config.sharpe_window {
            self.realized.pop_front();
        }
        self.realized.push_back(realized);
        Some(self.realized.make_contiguous())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn calculator(variant: RewardVariant) -> RewardCalculator {
        RewardCalculator::new(RewardConfig {
            variant,
            ..RewardConfig::default()
        })
    }

    #[test]
    fn test_base_reward_scenario() {
        let reward = base_reward(0.10, true, &RewardConfig::default());
        assert_relative_eq!(reward, 4.99, epsilon = 1e-12);
    }

    #[test]
    fn test_base_reward_is_symmetric_and_capped() {
        let config = RewardConfig::default();
        assert_relative_eq!(base_reward(-0.5, false, &config), -5.0);
        assert_relative_eq!(base_reward(0.001, false, &config), 1.0, epsilon = 1e-12);
        assert_eq!(base_reward(0.0, false, &config), 0.0);
        assert_relative_eq!(base_reward(0.0, true, &config), -0.01);
    }

    #[test]
    fn test_bad_pnl_is_zero_reward() {
        let mut calculator = calculator(RewardVariant::Base);
        for pnl in [None, Some(f64::NAN), Some(f64::INFINITY)] {
            let outcome = TradeOutcome {
                pnl_pct: pnl,
                traded: true,
                ..Default::default()
            };
            assert_eq!(calculator.calculate(&outcome), 0.0);
        }
    }

    #[test]
    fn test_risk_and_options_penalties() {
        let outcome = TradeOutcome {
            pnl_pct: Some(0.001),
            realized_volatility: Some(2.0),
            greeks: Some(Greeks {
                theta: -0.5,
                ..Default::default()
            }),
            days_held: 4.0,
            ..Default::default()
        };

        let risk = calculator(RewardVariant::RiskAdjusted).calculate(&outcome);
        assert_relative_eq!(risk, 1.0 - 0.1 * 2.0, epsilon = 1e-12);

        let options = calculator(RewardVariant::Options).calculate(&outcome);
        assert_relative_eq!(options, 1.0 - 0.1 * 0.5 * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe_window() {
        let mut calculator = RewardCalculator::new(RewardConfig {
            variant: RewardVariant::Sharpe,
            sharpe_window: 3,
            ..RewardConfig::default()
        });
        let realized = |value: f64| TradeOutcome {
            pnl_pct: Some(0.0),
            realized_return: Some(value),
            ..Default::default()
        };

        assert_eq!(calculator.calculate(&TradeOutcome { pnl_pct: Some(0.01), ..Default::default() }), 0.0);
        assert_eq!(calculator.calculate(&realized(0.1)), 0.0);
        let second = calculator.calculate(&realized(0.3));
        assert_relative_eq!(second, sharpe_reward(&[0.1, 0.3], 1e-8), epsilon = 1e-12);

        calculator.calculate(&realized(-0.2));
        let windowed = calculator.calculate(&realized(0.5));
        assert_relative_eq!(windowed, sharpe_reward(&[0.3, -0.2, 0.5], 1e-8), epsilon = 1e-12);
    }

    #[test]
    fn test_options_penalty_includes_gamma() {
        let outcome = TradeOutcome {
            pnl_pct: Some(0.001),
            greeks: Some(Greeks {
                theta: -0.5,
                gamma: 0.2,
                ..Default::default()
            }),
            days_held: 4.0,
            ..Default::default()
        };
        let reward = calculator(RewardVariant::Options).calculate(&outcome);
        assert_relative_eq!(reward, 1.0 - 0.1 * 0.5 * 4.0 - 0.05 * 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_win_rate_reward() {
        assert_eq!(win_rate_reward(&[]), 0.0);
        assert_relative_eq!(win_rate_reward(&[0.1, 0.2, -0.1]), 1.0 / 3.0 + 2.0, epsilon = 1e-12);
        // no losing average: profit factor falls back to the gross win
        assert_relative_eq!(win_rate_reward(&[0.1, 0.1]), 1.0 + (0.2 - 1.0), epsilon = 1e-12);

        let mut calculator = calculator(RewardVariant::WinRate);
        assert_eq!(calculator.calculate(&TradeOutcome { pnl_pct: Some(0.02), ..Default::default() }), 0.0);
        let closed = calculator.calculate(&TradeOutcome {
            pnl_pct: Some(0.0),
            realized_return: Some(0.1),
            traded: true,
            ..Default::default()
        });
        assert_relative_eq!(closed, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_profit_probability_follows_exposure() {
        let mut calculator = calculator(RewardVariant::ProfitProbability);
        let outcome = |exposure: f64, probability: f64, traded: bool| TradeOutcome {
            pnl_pct: Some(0.0),
            exposure,
            probability_up: Some(probability),
            traded,
            ..Default::default()
        };

        assert_relative_eq!(calculator.calculate(&outcome(1.0, 0.5, false)), 0.15, epsilon = 1e-12);
        assert_relative_eq!(calculator.calculate(&outcome(1.0, 0.5, true)), 0.14, epsilon = 1e-12);
        assert_relative_eq!(calculator.calculate(&outcome(1.0, 0.1, false)), -0.13, epsilon = 1e-12);
        assert_relative_eq!(calculator.calculate(&outcome(-1.0, 0.1, false)), 0.43, epsilon = 1e-12);
        assert_eq!(calculator.calculate(&outcome(0.0, 0.9, false)), 0.0);
        assert_relative_eq!(calculator.calculate(&outcome(0.0, 0.9, true)), -0.01, epsilon = 1e-12);
    }
}
