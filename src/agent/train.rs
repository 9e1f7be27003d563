use tracing::{info, warn};

use crate::{
    config::{EngineConfig, TrainerConfig},
    data::MarketDataSource,
    env::{TradeStatistics, TradingEnvironment},
    error::{EngineError, Result},
    gym::Transition,
    history::MetaHistory,
    types::EpisodeKey,
    utils::mean,
};

use super::{DqnAgent, TrainingStats};

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub key: EpisodeKey,
    pub reward: f64,
    pub steps: usize,
    /// Mean loss of the updates run during the episode
    pub loss: Option<f64>,
    pub epsilon: f64,
    pub trades: TradeStatistics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    /// Episodes skipped because their market data was unavailable
    pub skipped: Vec<EpisodeKey>,
    pub stats: TrainingStats,
}

/// Runs training episodes over a fixed rotation of (ticker, date) pairs
pub struct Trainer<S: MarketDataSource> {
    config: TrainerConfig,
    env: TradingEnvironment<S>,
    agent: DqnAgent,
    keys: Vec<EpisodeKey>,
    history: MetaHistory,
}

impl<S: MarketDataSource> Trainer<S> {
    pub fn new(config: &EngineConfig, source: S, agent: DqnAgent, keys: Vec<EpisodeKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(EngineError::Config("trainer needs at least one (ticker, date) pair".into()));
        }
        config.trainer.validate()?;

        Ok(Self {
            config: config.trainer.clone(),
            env: TradingEnvironment::new(config, source),
            agent,
            keys,
            history: MetaHistory::default(),
        })
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    pub fn into_agent(self) -> DqnAgent {
        self.agent
    }

    pub fn history(&self) -> &MetaHistory {
        &self.history
    }

    /// Trains for the configured number of episodes, checkpointing every
    /// `checkpoint_interval` episodes and once more at the end
    pub fn run(&mut self) -> Result<TrainingReport> {
        let mut episodes = Vec::with_capacity(self.config.episodes);
        let mut skipped = Vec::new();
        let mut consecutive_skips = 0;

        for episode in 0..self.config.episodes {
            let key = self.keys[episode % self.keys.len()].clone();

            let summary = match self.run_episode(episode, &key) {
                Ok(summary) => summary,
                Err(error @ EngineError::DataUnavailable { .. }) => {
                    warn!(%key, %error, "skipping episode");
                    skipped.push(key);
                    consecutive_skips += 1;
                    if consecutive_skips >= self.keys.len() {
                        return Err(error);
                    }
                    continue;
                }
                Err(error) => return Err(error),
            };
            consecutive_skips = 0;

            self.history.record(
                &key.ticker,
                summary.reward,
                summary.steps,
                summary.trades.win_rate,
                summary.loss,
                summary.epsilon,
            );

            let finished = episode + 1;
            if finished % self.config.log_interval == 0 {
                let stats = self.agent.training_stats();
                info!(
                    episode = finished,
                    reward = summary.reward,
                    average_reward = stats.average_reward,
                    average_loss = stats.average_loss,
                    epsilon = stats.epsilon,
                    buffer = stats.buffer_size,
                    "training progress"
                );
            }
            if finished % self.config.checkpoint_interval == 0 {
                self.checkpoint()?;

                #[cfg(feature = "debug_training")]
                self.record_episode(finished);
            }

            episodes.push(summary);
        }

        self.checkpoint()?;
        Ok(TrainingReport {
            episodes,
            skipped,
            stats: self.agent.training_stats(),
        })
    }

    /// select_action → step → store → train_step until the episode ends
    pub fn run_episode(&mut self, episode: usize, key: &EpisodeKey) -> Result<EpisodeSummary> {
        let mut state = self.env.reset(&key.ticker, key.date)?;
        let mut losses = Vec::new();
        let mut steps = 0;

        loop {
            let action = self.agent.act(&state, true);
            let result = self.env.step(action)?;
            steps += 1;

            self.agent.store_transition(Transition {
                state,
                action,
                reward: result.reward,
                next_state: result.next_state.clone(),
                terminal: result.terminal,
            });
            match self.agent.train_step() {
                Ok(loss) => losses.push(loss),
                Err(error) if error.is_recoverable() => {}
                Err(error) => return Err(error),
            }

            state = result.next_state;
            if result.terminal {
                break;
            }
        }

        let reward = self.env.cumulative_reward();
        let loss = (!losses.is_empty()).then(|| mean(&losses));
        let epsilon = self.agent.epsilon();
        self.agent.end_episode(reward, loss);

        Ok(EpisodeSummary {
            episode,
            key: key.clone(),
            reward,
            steps,
            loss,
            epsilon,
            trades: self.env.trade_statistics(),
        })
    }

    fn checkpoint(&self) -> Result<()> {
        self.agent.save_model(&self.config.checkpoint_path)?;

        // plots are a side product, never worth aborting training over
        if let Err(error) = self.history.chart(&self.config.plot_dir()) {
            warn!(%error, "could not write training charts");
        }
        Ok(())
    }

    #[cfg(feature = "debug_training")]
    fn record_episode(&self, episode: usize) {
        let dir = self.config.plot_dir().join("episodes").join(episode.to_string());
        if let Err(error) = self.env.history().record(&dir) {
            warn!(%error, episode, "could not write episode charts");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        config::AgentConfig,
        data::{MarketSnapshot, SyntheticSource},
    };

    fn config(dir: &std::path::Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.agent = AgentConfig {
            hidden_dims: vec![16],
            batch_size: 8,
            memory_size: 64,
            seed: Some(1),
            ..Default::default()
        };
        config.env.max_steps_per_episode = 12;
        config.trainer.episodes = 4;
        config.trainer.checkpoint_interval = 2;
        config.trainer.log_interval = 1;
        config.trainer.checkpoint_path = dir.join("agent.bin");
        config
    }

    fn keys() -> Vec<EpisodeKey> {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        vec![EpisodeKey::new("NVDA", date), EpisodeKey::new("AAPL", date)]
    }

    #[test]
    fn test_run_trains_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let agent = DqnAgent::new(config.agent.clone()).unwrap();
        let source = SyntheticSource::new(3).with_window(32);
        let mut trainer = Trainer::new(&config, source, agent, keys()).unwrap();

        let report = trainer.run().unwrap();
        assert_eq!(report.episodes.len(), 4);
        assert_eq!(report.episodes[1].key.ticker, "AAPL");
        assert!(report.episodes.iter().all(|episode| episode.steps <= 12));
        assert_eq!(report.stats.total_episodes, 4);
        assert!(report.stats.train_steps > 0);
        assert!(report.stats.epsilon < 1.0);
        assert!(config.trainer.checkpoint_path.exists());
        assert!(dir.path().join("episode_reward.svg").exists());
        assert_eq!(trainer.history().episodes(), 4);
    }

    struct MissingSource;

    impl MarketDataSource for MissingSource {
        fn snapshot(&mut self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot> {
            Err(EngineError::DataUnavailable {
                ticker: ticker.into(),
                date: date.to_string(),
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn test_gives_up_when_no_data_loads() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let agent = DqnAgent::new(config.agent.clone()).unwrap();
        let mut trainer = Trainer::new(&config, MissingSource, agent, keys()).unwrap();
        assert!(matches!(trainer.run(), Err(EngineError::DataUnavailable { .. })));
    }

    #[test]
    fn test_requires_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let agent = DqnAgent::new(config.agent.clone()).unwrap();
        let result = Trainer::new(&config, SyntheticSource::new(0), agent, Vec::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
