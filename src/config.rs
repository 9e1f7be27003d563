use std::{fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{
    constants::{agent, env, files::CHECKPOINT_FILE, options, reward, state::STATE_DIM, trainer},
    error::{EngineError, Result},
    options::StrategyId,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub agent: AgentConfig,
    pub reward: RewardConfig,
    pub env: EnvConfig,
    pub trainer: TrainerConfig,
    pub options: OptionsConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.reward.validate()?;
        self.env.validate()?;
        self.trainer.validate()?;
        self.options.validate()
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::Config(message()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub state_dim: usize,
    pub action_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub dropout: f64,
    pub learning_rate: f64,
    pub gamma: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub epsilon_decay: f64,
    pub memory_size: usize,
    pub batch_size: usize,
    /// Training steps between hard copies of the policy into the target network
    pub target_sync_interval: u64,
    pub max_grad_norm: f64,
    /// Seeds weight init, exploration and minibatch sampling
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_dim: STATE_DIM,
            action_dim: agent::ACTION_COUNT,
            hidden_dims: agent::HIDDEN_DIMS.to_vec(),
            dropout: agent::DROPOUT,
            learning_rate: agent::LEARNING_RATE,
            gamma: agent::GAMMA,
            epsilon_start: agent::EPSILON_START,
            epsilon_end: agent::EPSILON_END,
            epsilon_decay: agent::EPSILON_DECAY,
            memory_size: agent::MEMORY_SIZE,
            batch_size: agent::BATCH_SIZE,
            target_sync_interval: agent::TARGET_SYNC_INTERVAL,
            max_grad_norm: agent::MAX_GRAD_NORM,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.state_dim == STATE_DIM, || {
            format!("state_dim must be {STATE_DIM}, got {}", self.state_dim)
        })?;
        check(self.action_dim == agent::ACTION_COUNT, || {
            format!("action_dim must be {}, got {}", agent::ACTION_COUNT, self.action_dim)
        })?;
        check(
            !self.hidden_dims.is_empty() && self.hidden_dims.iter().all(|dim| *dim > 0),
            || format!("hidden_dims must be non-empty and positive, got {:?}", self.hidden_dims),
        )?;
        check((0.0..1.0).contains(&self.dropout), || {
            format!("dropout must be in [0, 1), got {}", self.dropout)
        })?;
        check(self.learning_rate > 0.0 && self.learning_rate.is_finite(), || {
            format!("learning_rate must be positive, got {}", self.learning_rate)
        })?;
        check((0.0..=1.0).contains(&self.gamma), || {
            format!("gamma must be in [0, 1], got {}", self.gamma)
        })?;
        check(
            (0.0..=1.0).contains(&self.epsilon_end)
                && (0.0..=1.0).contains(&self.epsilon_start)
                && self.epsilon_end <= self.epsilon_start,
            || {
                format!(
                    "epsilon must satisfy 0 <= end <= start <= 1, got start {} end {}",
                    self.epsilon_start, self.epsilon_end
                )
            },
        )?;
        check(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0, || {
            format!("epsilon_decay must be in (0, 1], got {}", self.epsilon_decay)
        })?;
        check(self.batch_size > 0, || "batch_size must be positive".into())?;
        check(self.batch_size <= self.memory_size, || {
            format!(
                "batch_size {} exceeds memory_size {}",
                self.batch_size, self.memory_size
            )
        })?;
        check(self.target_sync_interval > 0, || {
            "target_sync_interval must be positive".into()
        })?;
        check(self.max_grad_norm > 0.0, || {
            format!("max_grad_norm must be positive, got {}", self.max_grad_norm)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardVariant {
    #[default]
    Base,
    RiskAdjusted,
    Options,
    Sharpe,
    WinRate,
    ProfitProbability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub variant: RewardVariant,
    pub scale: f64,
    pub cap: f64,
    pub transaction_cost: f64,
    pub risk_weight: f64,
    pub time_decay_weight: f64,
    pub gamma_weight: f64,
    pub target_pct: f64,
    pub stop_loss_pct: f64,
    /// Realized trades kept by the Sharpe and win-rate variants
    pub sharpe_window: usize,
    pub sharpe_epsilon: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            variant: RewardVariant::Base,
            scale: reward::SCALE,
            cap: reward::CAP,
            transaction_cost: reward::TRANSACTION_COST,
            risk_weight: reward::RISK_WEIGHT,
            time_decay_weight: reward::TIME_DECAY_WEIGHT,
            gamma_weight: reward::GAMMA_WEIGHT,
            target_pct: reward::TARGET_PCT,
            stop_loss_pct: reward::STOP_LOSS_PCT,
            sharpe_window: reward::SHARPE_WINDOW,
            sharpe_epsilon: reward::SHARPE_EPSILON,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("scale", self.scale),
            ("cap", self.cap),
            ("transaction_cost", self.transaction_cost),
            ("risk_weight", self.risk_weight),
            ("time_decay_weight", self.time_decay_weight),
            ("gamma_weight", self.gamma_weight),
            ("target_pct", self.target_pct),
            ("stop_loss_pct", self.stop_loss_pct),
        ] {
            check(value.is_finite() && value >= 0.0, || {
                format!("reward {name} must be a non-negative number, got {value}")
            })?;
        }
        check(self.sharpe_window >= 2, || {
            format!("sharpe_window must be at least 2, got {}", self.sharpe_window)
        })?;
        check(self.sharpe_epsilon > 0.0, || "sharpe_epsilon must be positive".into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub max_steps_per_episode: usize,
    pub initial_capital: f64,
    /// SELL while flat opens a short instead of holding
    pub allow_short: bool,
    /// Ends the episode once capital reaches this multiple of the starting capital
    pub take_profit_multiple: Option<f64>,
    /// Calendar days one step represents, used for option time decay
    pub days_per_step: f64,
    pub price_window: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_steps_per_episode: env::MAX_STEPS_PER_EPISODE,
            initial_capital: env::INITIAL_CAPITAL,
            allow_short: false,
            take_profit_multiple: None,
            days_per_step: env::DAYS_PER_STEP,
            price_window: env::PRICE_WINDOW,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.max_steps_per_episode > 0, || {
            "max_steps_per_episode must be positive".into()
        })?;
        check(self.initial_capital > 0.0, || {
            format!("initial_capital must be positive, got {}", self.initial_capital)
        })?;
        check(self.days_per_step > 0.0, || "days_per_step must be positive".into())?;
        check(self.price_window >= 2, || "price_window must hold at least 2 prices".into())?;
        if let Some(multiple) = self.take_profit_multiple {
            check(multiple > 1.0, || {
                format!("take_profit_multiple must exceed 1, got {multiple}")
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub episodes: usize,
    pub checkpoint_interval: usize,
    pub log_interval: usize,
    pub checkpoint_path: PathBuf,
    /// Directory for progress plots, next to the checkpoint when unset
    pub plot_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: trainer::EPISODES,
            checkpoint_interval: trainer::CHECKPOINT_INTERVAL,
            log_interval: trainer::LOG_INTERVAL,
            checkpoint_path: PathBuf::from(CHECKPOINT_FILE),
            plot_dir: None,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.checkpoint_interval > 0, || "checkpoint_interval must be positive".into())?;
        check(self.log_interval > 0, || "log_interval must be positive".into())
    }

    pub fn plot_dir(&self) -> PathBuf {
        self.plot_dir.clone().unwrap_or_else(|| {
            self.checkpoint_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub risk_free_rate: f64,
    pub iv_lower: f64,
    pub iv_upper: f64,
    pub iv_max_iterations: u32,
    pub iv_tolerance: f64,
    pub allowed_strategies: Vec<StrategyId>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: options::RISK_FREE_RATE,
            iv_lower: options::IV_LOWER,
            iv_upper: options::IV_UPPER,
            iv_max_iterations: options::IV_MAX_ITERATIONS,
            iv_tolerance: options::IV_TOLERANCE,
            allowed_strategies: StrategyId::ALL.to_vec(),
        }
    }
}

impl OptionsConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.risk_free_rate.is_finite(), || "risk_free_rate must be finite".into())?;
        check(self.iv_lower > 0.0 && self.iv_lower < self.iv_upper, || {
            format!(
                "implied volatility bounds must satisfy 0 < lower < upper, got [{}, {}]",
                self.iv_lower, self.iv_upper
            )
        })?;
        check(self.iv_max_iterations > 0, || "iv_max_iterations must be positive".into())?;
        check(self.iv_tolerance > 0.0, || "iv_tolerance must be positive".into())?;
        check(!self.allowed_strategies.is_empty(), || {
            "allowed_strategies must name at least one strategy".into()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "agent": {{ "batch_size": 8, "seed": 7 }}, "reward": {{ "variant": "sharpe" }} }}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.agent.batch_size, 8);
        assert_eq!(config.agent.seed, Some(7));
        assert_eq!(config.agent.memory_size, agent::MEMORY_SIZE);
        assert_eq!(config.reward.variant, RewardVariant::Sharpe);
        assert_eq!(config.env, EnvConfig::default());
    }

    #[test]
    fn test_reward_variant_names() {
        let config: RewardConfig =
            serde_json::from_str(r#"{ "variant": "profit_probability", "stop_loss_pct": 0.03 }"#).unwrap();
        assert_eq!(config.variant, RewardVariant::ProfitProbability);
        assert_eq!(config.stop_loss_pct, 0.03);
        assert_eq!(config.gamma_weight, reward::GAMMA_WEIGHT);

        let config: RewardConfig = serde_json::from_str(r#"{ "variant": "win_rate" }"#).unwrap();
        assert_eq!(config.variant, RewardVariant::WinRate);

        let config = RewardConfig {
            target_pct: -0.05,
            ..RewardConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_impossible_values() {
        let mut config = EngineConfig::default();
        config.agent.batch_size = config.agent.memory_size + 1;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = EngineConfig::default();
        config.agent.state_dim = 64;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.agent.epsilon_end = 1.0;
        config.agent.epsilon_start = 0.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.options.iv_lower = 6.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.options.allowed_strategies.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.env.max_steps_per_episode = 0;
        assert!(config.validate().is_err());
    }
}
