use std::path::Path;

use hashbrown::HashMap;

use crate::{
    charts::general::{multi_line_chart, simple_chart},
    constants::trainer::MOVING_AVERAGE_WINDOW,
    error::Result,
    types::Data,
    utils::{create_folder_if_not_exists, moving_average},
};

/// Per-episode training progress across the whole run
#[derive(Default, Debug, Clone)]
pub struct MetaHistory {
    pub rewards: Data,
    pub lengths: Data,
    pub win_rates: Data,
    /// Mean training loss of each episode, NaN when no update ran
    pub losses: Data,
    pub epsilons: Data,
    pub ticker_rewards: HashMap<String, Data>,
}

impl MetaHistory {
    pub fn record(
        &mut self,
        ticker: &str,
        reward: f64,
        length: usize,
        win_rate: f64,
        loss: Option<f64>,
        epsilon: f64,
    ) {
        self.rewards.push(reward);
        self.lengths.push(length as f64);
        self.win_rates.push(win_rate);
        self.losses.push(loss.unwrap_or(f64::NAN));
        self.epsilons.push(epsilon);
        self.ticker_rewards
            .entry_ref(ticker)
            .or_default()
            .push(reward);
    }

    pub fn episodes(&self) -> usize {
        self.rewards.len()
    }

    pub fn moving_average_reward(&self) -> Data {
        moving_average(&self.rewards, MOVING_AVERAGE_WINDOW)
    }

    pub fn chart(&self, dir: &Path) -> Result<()> {
        if self.rewards.is_empty() {
            return Ok(());
        }
        create_folder_if_not_exists(dir)?;

        let average = self.moving_average_reward();
        multi_line_chart(
            dir,
            "episode_reward",
            &[("reward", self.rewards.as_slice()), ("moving average", average.as_slice())],
        )?;
        simple_chart(dir, "episode_length", &self.lengths)?;
        simple_chart(dir, "win_rate", &self.win_rates)?;
        simple_chart(dir, "loss", &self.losses)?;
        simple_chart(dir, "epsilon", &self.epsilons)?;

        let mut tickers: Vec<&String> = self.ticker_rewards.keys().collect();
        tickers.sort();
        let averaged: Vec<(&str, Data)> = tickers
            .into_iter()
            .map(|ticker| {
                (
                    ticker.as_str(),
                    moving_average(&self.ticker_rewards[ticker], MOVING_AVERAGE_WINDOW),
                )
            })
            .collect();
        let series: Vec<(&str, &[f64])> = averaged
            .iter()
            .map(|(ticker, data)| (*ticker, data.as_slice()))
            .collect();
        multi_line_chart(dir, "ticker_reward", &series)
    }
}
