use chrono::NaiveDate;
use tracing::debug;

use crate::{
    config::{EnvConfig, EngineConfig},
    constants::state::EPISODE_LEN,
    data::MarketDataSource,
    encoder::{StateEncoder, StateVector, TradingMode},
    error::{EngineError, Result},
    gym::Action,
    history::EpisodeHistory,
    options::Greeks,
    types::{Data, EpisodeKey},
    utils::symlog,
};

use super::{
    reward::{RewardCalculator, TradeOutcome},
    trade::{Position, PositionSide, TradeRecord, TradeStatistics},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Idle,
    Stepping,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    pub step: usize,
    pub price: f64,
    pub action: Action,
    pub position: PositionSide,
    /// Mark-to-market return of the position held over the step
    pub pnl_pct: f64,
    pub realized_return: Option<f64>,
    pub traded: bool,
    pub capital: f64,
    pub cumulative_reward: f64,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub next_state: StateVector,
    pub reward: f64,
    pub terminal: bool,
    pub info: StepInfo,
}

/// Stepwise simulation over one reference price window per episode
pub struct TradingEnvironment<S: MarketDataSource> {
    config: EnvConfig,
    source: S,
    encoder: StateEncoder,
    reward: RewardCalculator,
    state: EnvState,
    key: Option<EpisodeKey>,
    base_state: StateVector,
    prices: Data,
    cursor: usize,
    step_index: usize,
    cumulative_reward: f64,
    last_step_return: f64,
    up_moves: usize,
    capital: f64,
    position: Option<Position>,
    greeks: Option<Greeks>,
    realized_volatility: Option<f64>,
    trades: Vec<TradeRecord>,
    history: EpisodeHistory,
}

impl<S: MarketDataSource> TradingEnvironment<S> {
    pub fn new(config: &EngineConfig, source: S) -> Self {
        Self {
            config: config.env.clone(),
            source,
            encoder: StateEncoder::new(&config.options),
            reward: RewardCalculator::new(config.reward.clone()),
            state: EnvState::Idle,
            key: None,
            base_state: StateVector::default(),
            prices: Vec::new(),
            cursor: 0,
            step_index: 0,
            cumulative_reward: 0.0,
            last_step_return: 0.0,
            up_moves: 0,
            capital: config.env.initial_capital,
            position: None,
            greeks: None,
            realized_volatility: None,
            trades: Vec::new(),
            history: EpisodeHistory::default(),
        }
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn episode_key(&self) -> Option<&EpisodeKey> {
        self.key.as_ref()
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn history(&self) -> &EpisodeHistory {
        &self.history
    }

    pub fn trade_statistics(&self) -> TradeStatistics {
        TradeStatistics::from_trades(&self.trades, self.config.initial_capital, self.capital)
    }

    /// Loads the (ticker, date) snapshot and starts a new episode
    pub fn reset(&mut self, ticker: &str, date: NaiveDate) -> Result<StateVector> {
        let snapshot = self.source.snapshot(ticker, date)?;
        if snapshot.prices.len() < 2 || snapshot.prices.iter().any(|price| !(price.is_finite() && *price > 0.0)) {
            return Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                date: date.to_string(),
                reason: "price window needs at least 2 positive prices".into(),
            });
        }

        self.base_state = self.encoder.encode(&snapshot.record);
        self.greeks = match (snapshot.record.trading_mode, snapshot.record.options.as_ref()) {
            (TradingMode::Options, Some(report)) => self
                .encoder
                .price_report(report)
                .map(|priced| priced.greeks)
                .ok(),
            _ => None,
        };
        self.realized_volatility = snapshot
            .record
            .technical
            .as_ref()
            .and_then(|technical| technical.volatility);

        self.prices = snapshot.prices;
        self.prices.truncate(self.config.price_window);
        self.key = Some(EpisodeKey::new(ticker, date));
        self.cursor = 0;
        self.step_index = 0;
        self.cumulative_reward = 0.0;
        self.last_step_return = 0.0;
        self.up_moves = 0;
        self.capital = self.config.initial_capital;
        self.position = None;
        self.trades.clear();
        self.history.clear();
        self.reward.reset();
        self.state = EnvState::Stepping;

        debug!(%ticker, %date, prices = self.prices.len(), "environment reset");
        Ok(self.observe())
    }

    pub fn step(&mut self, action: Action) -> Result<StepResult> {
        match self.state {
            EnvState::Idle => return Err(EngineError::EnvironmentNotReset),
            EnvState::Terminal => return Err(EngineError::EnvironmentTerminated),
            EnvState::Stepping => {}
        }

        let previous_price = self.prices[self.cursor];
        self.cursor += 1;
        let price = self.prices[self.cursor];
        let step_return = price / previous_price - 1.0;
        if step_return > 0.0 {
            self.up_moves += 1;
        }
        // Laplace-smoothed share of up moves revealed so far
        let probability_up = (self.up_moves + 1) as f64 / (self.cursor + 2) as f64;

        let held = self.position;
        let pnl_pct = held.map_or(0.0, |position| position.side.direction() * step_return);
        self.capital *= 1.0 + pnl_pct;
        let days_held = held.map_or(0.0, |position| {
            (self.step_index + 1 - position.entry_step) as f64 * self.config.days_per_step
        });

        let (traded, closed) = self.execute(action, price);
        let realized_return = closed.map(|trade| trade.return_pct);
        let exposed = held.is_some() || traded;

        let reward = self.reward.calculate(&TradeOutcome {
            pnl_pct: Some(pnl_pct),
            traded,
            realized_return,
            realized_volatility: self.realized_volatility.filter(|_| exposed),
            greeks: held.and(self.greeks),
            days_held,
            exposure: self.position.map_or(0.0, |position| position.side.direction()),
            probability_up: Some(probability_up),
        });
        if let Some(mut trade) = closed {
            trade.reward = reward;
            self.trades.push(trade);
        }

        self.step_index += 1;
        self.cumulative_reward += reward;
        self.last_step_return = step_return;

        let terminal = self.step_index >= self.config.max_steps_per_episode
            || self.cursor + 1 >= self.prices.len()
            || self.capital <= 0.0
            || self
                .config
                .take_profit_multiple
                .is_some_and(|multiple| self.capital >= multiple * self.config.initial_capital);

        let side = self.position.map_or(PositionSide::Flat, |position| position.side);
        self.history.push(price, action, reward, self.capital, side.direction());

        if terminal {
            self.close_at_end(price);
            self.state = EnvState::Terminal;
        }

        Ok(StepResult {
            next_state: self.observe(),
            reward,
            terminal,
            info: StepInfo {
                step: self.step_index,
                price,
                action,
                position: side,
                pnl_pct,
                realized_return,
                traded,
                capital: self.capital,
                cumulative_reward: self.cumulative_reward,
            },
        })
    }

    /// Applies the action at the newly revealed price. Returns whether a
    /// position was opened or closed, and the closed trade if any.
    fn execute(&mut self, action: Action, price: f64) -> (bool, Option<TradeRecord>) {
        let side = self.position.map(|position| position.side);
        match (action, side) {
            (Action::Buy, None) => {
                self.open(PositionSide::Long, price);
                (true, None)
            }
            (Action::Buy, Some(PositionSide::Short)) | (Action::Sell, Some(PositionSide::Long)) => {
                (true, self.close(price))
            }
            (Action::Sell, None) if self.config.allow_short => {
                self.open(PositionSide::Short, price);
                (true, None)
            }
            _ => (false, None),
        }
    }

    fn open(&mut self, side: PositionSide, price: f64) {
        self.position = Some(Position {
            side,
            entry_price: price,
            entry_step: self.step_index + 1,
        });
    }

    fn close(&mut self, price: f64) -> Option<TradeRecord> {
        let position = self.position.take()?;
        Some(TradeRecord {
            side: position.side,
            entry_step: position.entry_step,
            exit_step: self.step_index + 1,
            entry_price: position.entry_price,
            exit_price: price,
            return_pct: position.return_at(price),
            reward: 0.0,
        })
    }

    /// Positions still open at episode end are closed for the trade log only
    fn close_at_end(&mut self, price: f64) {
        if let Some(trade) = self.close(price) {
            self.trades.push(trade);
        }
    }

    fn episode_context(&self) -> [f64; EPISODE_LEN] {
        let price = self.prices.get(self.cursor).copied().unwrap_or_default();
        let (direction, unrealized) = match self.position {
            Some(position) => (position.side.direction(), position.return_at(price)),
            None => (0.0, 0.0),
        };

        let mut context = [0.0; EPISODE_LEN];
        context[0] = direction;
        context[1] = unrealized;
        context[2] = self.step_index as f64 / self.config.max_steps_per_episode as f64;
        context[3] = self.last_step_return;
        context[4] = symlog(self.capital / self.config.initial_capital - 1.0);
        context
    }

    fn observe(&self) -> StateVector {
        self.base_state.with_episode_context(self.episode_context())
    }
}
