use std::path::Path;

use crate::{
    charts::general::{multi_line_chart, simple_chart},
    error::Result,
    gym::Action,
    types::Data,
    utils::create_folder_if_not_exists,
};

/// Step-by-step record of one episode
#[derive(Debug, Default, Clone)]
pub struct EpisodeHistory {
    pub prices: Data,
    pub actions: Vec<Action>,
    pub rewards: Data,
    pub capital: Data,
    /// -1 short, 0 flat, +1 long after each step
    pub positions: Data,
}

impl EpisodeHistory {
    pub fn clear(&mut self) {
        self.prices.clear();
        self.actions.clear();
        self.rewards.clear();
        self.capital.clear();
        self.positions.clear();
    }

    pub fn push(&mut self, price: f64, action: Action, reward: f64, capital: f64, position: f64) {
        self.prices.push(price);
        self.actions.push(action);
        self.rewards.push(reward);
        self.capital.push(capital);
        self.positions.push(position);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }

    pub fn action_count(&self, action: Action) -> usize {
        self.actions.iter().filter(|taken| **taken == action).count()
    }

    pub fn record(&self, dir: &Path) -> Result<()> {
        create_folder_if_not_exists(dir)?;

        let mut running = 0.0;
        let cumulative: Data = self
            .rewards
            .iter()
            .map(|reward| {
                running += reward;
                running
            })
            .collect();

        simple_chart(dir, "price", &self.prices)?;
        simple_chart(dir, "capital", &self.capital)?;
        multi_line_chart(
            dir,
            "reward",
            &[("step", self.rewards.as_slice()), ("cumulative", cumulative.as_slice())],
        )?;
        simple_chart(dir, "position", &self.positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let mut history = EpisodeHistory::default();
        history.push(100.0, Action::Buy, -0.01, 100_000.0, 1.0);
        history.push(101.0, Action::Hold, 0.5, 101_000.0, 1.0);
        history.push(102.0, Action::Sell, 0.2, 102_000.0, 0.0);

        assert_eq!(history.len(), 3);
        assert!((history.cumulative_reward() - 0.69).abs() < 1e-12);
        assert_eq!(history.action_count(Action::Hold), 1);

        history.clear();
        assert!(history.is_empty());
    }
}
