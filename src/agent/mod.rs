use std::path::Path;

use enum_map::EnumMap;
use ndarray::{Array1, Array2};
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::AgentConfig,
    constants::agent::STATS_WINDOW,
    encoder::StateVector,
    error::{EngineError, Result},
    gym::{Action, ActionValues, ReplayBuffer, Transition},
    utils::mean,
};

pub mod adam;
pub mod checkpoint;
pub mod network;
pub mod train;

use adam::Adam;
use checkpoint::{Checkpoint, CHECKPOINT_VERSION};
use network::{clip_gradients, QNetwork};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    pub total_episodes: usize,
    /// Over the last `STATS_WINDOW` episodes
    pub average_reward: f64,
    /// Over the last `STATS_WINDOW` episodes that ran at least one update
    pub average_loss: f64,
    pub epsilon: f64,
    pub train_steps: u64,
    pub buffer_size: usize,
}

/// Deep Q-learning agent. Owns the policy and target networks, the optimizer,
/// the replay buffer and every counter, so independent agents never share
/// state.
pub struct DqnAgent {
    config: AgentConfig,
    policy: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    memory: ReplayBuffer,
    rng: StdRng,
    train_steps: u64,
    decay_steps: u32,
    episode_rewards: Vec<f64>,
    episode_losses: Vec<f64>,
}

impl DqnAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let policy = QNetwork::new(
            config.state_dim,
            &config.hidden_dims,
            config.action_dim,
            config.dropout,
            &mut rng,
        );

        Ok(Self {
            target: policy.clone(),
            optimizer: Adam::new(&policy, config.learning_rate),
            memory: ReplayBuffer::new(config.memory_size),
            policy,
            rng,
            train_steps: 0,
            decay_steps: 0,
            episode_rewards: Vec::new(),
            episode_losses: Vec::new(),
            config,
        })
    }

    /// Loads `path` into a new agent. On failure the agent stays freshly
    /// initialized and the error is handed back for the caller to surface.
    pub fn load_or_fresh(config: AgentConfig, path: &Path) -> Result<(Self, Option<EngineError>)> {
        let mut agent = Self::new(config)?;
        match agent.load_model(path) {
            Ok(()) => Ok((agent, None)),
            Err(error) => {
                warn!(path = %path.display(), %error, "could not load checkpoint, using an untrained agent");
                Ok((agent, Some(error)))
            }
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn decay_steps(&self) -> u32 {
        self.decay_steps
    }

    pub fn epsilon(&self) -> f64 {
        let decayed = self.config.epsilon_start
            * self.config.epsilon_decay.powi(self.decay_steps.min(i32::MAX as u32) as i32);
        decayed.max(self.config.epsilon_end)
    }

    pub fn decay_epsilon(&mut self) {
        self.decay_steps = self.decay_steps.saturating_add(1);
    }

    pub fn reset_epsilon(&mut self) {
        self.decay_steps = 0;
    }

    pub fn q_values(&self, state: &StateVector) -> ActionValues {
        let values = self.policy.predict(state.view());
        EnumMap::from_fn(|action: Action| values[action.index()])
    }

    pub fn greedy_action(&self, state: &StateVector) -> Action {
        let values = self.q_values(state);
        // ties go to the lowest index
        Action::ALL
            .into_iter()
            .rev()
            .max_by_key(|action| OrderedFloat(values[*action]))
            .unwrap_or(Action::Hold)
    }

    pub fn select_action(&mut self, state: &StateVector, epsilon: f64) -> Action {
        if self.rng.gen::<f64>() < epsilon {
            Action::random(&mut self.rng)
        } else {
            self.greedy_action(state)
        }
    }

    /// Explores with the current epsilon while training, acts greedily otherwise
    pub fn act(&mut self, state: &StateVector, training: bool) -> Action {
        let epsilon = if training { self.epsilon() } else { 0.0 };
        self.select_action(state, epsilon)
    }

    /// Softmax over the action values. A relative preference between the
    /// three actions, not a calibrated probability of profit.
    pub fn get_all_action_probabilities(&self, state: &StateVector) -> ActionValues {
        let values = self.q_values(state);
        let max = values.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: ActionValues = EnumMap::from_fn(|action: Action| (values[action] - max).exp());
        let total: f64 = exps.values().sum();
        EnumMap::from_fn(|action: Action| exps[action] / total)
    }

    pub fn store_transition(&mut self, transition: Transition) {
        self.memory.push(transition);
    }

    /// One gradient step on a uniformly sampled minibatch. Returns the MSE
    /// loss, or `BufferUnderflow` while the buffer holds less than a batch.
    pub fn train_step(&mut self) -> Result<f64> {
        let batch_size = self.config.batch_size;
        let batch = self.memory.sample(batch_size, &mut self.rng)?;
        let state_dim = self.config.state_dim;

        let states = Array2::from_shape_fn((batch_size, state_dim), |(row, col)| {
            batch[row].state.view()[col]
        });
        let next_states = Array2::from_shape_fn((batch_size, state_dim), |(row, col)| {
            batch[row].next_state.view()[col]
        });

        let next_values = self.target.forward(next_states.view());
        let targets: Array1<f64> = batch
            .iter()
            .zip(next_values.rows())
            .map(|(transition, row)| {
                let best = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let continuation = if transition.terminal { 0.0 } else { 1.0 };
                transition.reward + self.config.gamma * best * continuation
            })
            .collect();

        let (predicted, cache) = self.policy.forward_train(states.view(), &mut self.rng);
        let mut grad_output = Array2::zeros(predicted.raw_dim());
        let mut loss = 0.0;
        for (row, transition) in batch.iter().enumerate() {
            let column = transition.action.index();
            let error = predicted[[row, column]] - targets[row];
            loss += error * error;
            grad_output[[row, column]] = 2.0 * error / batch_size as f64;
        }
        loss /= batch_size as f64;

        let mut gradients = self.policy.backward(&cache, grad_output);
        clip_gradients(&mut gradients, self.config.max_grad_norm);
        self.optimizer.step(&mut self.policy, &gradients);

        self.train_steps += 1;
        if self.train_steps % self.config.target_sync_interval == 0 {
            self.target = self.policy.clone();
            debug!(train_steps = self.train_steps, "synced target network");
        }

        Ok(loss)
    }

    /// Records a finished training episode and decays epsilon
    pub fn end_episode(&mut self, reward: f64, loss: Option<f64>) {
        self.episode_rewards.push(reward);
        if let Some(loss) = loss.filter(|loss| loss.is_finite()) {
            self.episode_losses.push(loss);
        }
        self.decay_epsilon();
    }

    pub fn training_stats(&self) -> TrainingStats {
        let recent = |values: &[f64]| mean(&values[values.len().saturating_sub(STATS_WINDOW)..]);
        TrainingStats {
            total_episodes: self.episode_rewards.len(),
            average_reward: recent(&self.episode_rewards),
            average_loss: recent(&self.episode_losses),
            epsilon: self.epsilon(),
            train_steps: self.train_steps,
            buffer_size: self.memory.len(),
        }
    }

    pub fn save_model(&self, path: &Path) -> Result<()> {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            state_dim: self.config.state_dim,
            action_dim: self.config.action_dim,
            hidden_dims: self.config.hidden_dims.clone(),
            policy: self.policy.clone(),
            target: self.target.clone(),
            optimizer: self.optimizer.clone(),
            train_steps: self.train_steps,
            decay_steps: self.decay_steps,
            epsilon: self.epsilon(),
            episode_rewards: self.episode_rewards.clone(),
            episode_losses: self.episode_losses.clone(),
        }
        .write(path)
    }

    /// Replaces weights, optimizer state and counters with the checkpoint's.
    /// The agent is left untouched when the checkpoint cannot be used.
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::read(path)?;
        checkpoint.check_dimensions(
            self.config.state_dim,
            self.config.action_dim,
            &self.config.hidden_dims,
        )?;

        self.policy = checkpoint.policy;
        self.target = checkpoint.target;
        self.optimizer = checkpoint.optimizer;
        self.train_steps = checkpoint.train_steps;
        self.decay_steps = checkpoint.decay_steps;
        self.episode_rewards = checkpoint.episode_rewards;
        self.episode_losses = checkpoint.episode_losses;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::constants::state::STATE_DIM;

    fn config() -> AgentConfig {
        AgentConfig {
            hidden_dims: vec![16, 8],
            batch_size: 4,
            memory_size: 32,
            target_sync_interval: 2,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn state(fill: f64) -> StateVector {
        StateVector::from_vec(vec![fill; STATE_DIM]).unwrap()
    }

    fn transition(reward: f64, terminal: bool) -> Transition {
        Transition {
            state: state(0.1),
            action: Action::Buy,
            reward,
            next_state: state(0.2),
            terminal,
        }
    }

    #[test]
    fn test_epsilon_schedule() {
        let mut agent = DqnAgent::new(config()).unwrap();
        assert_eq!(agent.epsilon(), 1.0);
        for _ in 0..10 {
            agent.decay_epsilon();
        }
        assert_eq!(agent.epsilon(), (1.0 * 0.995f64.powi(10)).max(0.01));
        for _ in 0..5000 {
            agent.decay_epsilon();
        }
        assert_eq!(agent.epsilon(), 0.01);
        agent.reset_epsilon();
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn test_train_step_needs_a_full_batch() {
        let mut agent = DqnAgent::new(config()).unwrap();
        agent.store_transition(transition(1.0, false));
        let error = agent.train_step().unwrap_err();
        assert!(error.is_recoverable());
        assert_eq!(agent.train_steps(), 0);
    }

    #[test]
    fn test_train_step_fits_terminal_reward() {
        let mut agent = DqnAgent::new(AgentConfig {
            dropout: 0.0,
            ..config()
        })
        .unwrap();
        for _ in 0..8 {
            agent.store_transition(transition(5.0, true));
        }

        let first = agent.train_step().unwrap();
        let mut last = first;
        for _ in 0..300 {
            last = agent.train_step().unwrap();
        }
        assert!(last < first * 0.1, "loss went from {first} to {last}");
        assert_eq!(agent.train_steps(), 301);
    }

    #[test]
    fn test_target_sync() {
        let mut agent = DqnAgent::new(config()).unwrap();
        for _ in 0..8 {
            agent.store_transition(transition(1.0, true));
        }
        agent.train_step().unwrap();
        assert_ne!(agent.policy, agent.target);
        agent.train_step().unwrap();
        assert_eq!(agent.policy, agent.target);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let agent = DqnAgent::new(config()).unwrap();
        let probabilities = agent.get_all_action_probabilities(&state(0.5));
        let total: f64 = probabilities.values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(probabilities.values().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_greedy_without_exploration() {
        let mut agent = DqnAgent::new(config()).unwrap();
        let probe = state(0.3);
        let greedy = agent.greedy_action(&probe);
        for _ in 0..20 {
            assert_eq!(agent.select_action(&probe, 0.0), greedy);
        }
        assert_eq!(agent.act(&probe, false), greedy);
    }

    #[test]
    fn test_training_stats() {
        let mut agent = DqnAgent::new(config()).unwrap();
        agent.end_episode(2.0, Some(0.5));
        agent.end_episode(4.0, None);
        let stats = agent.training_stats();
        assert_eq!(stats.total_episodes, 2);
        assert_relative_eq!(stats.average_reward, 3.0);
        assert_relative_eq!(stats.average_loss, 0.5);
        assert_relative_eq!(stats.epsilon, 0.995f64.powi(2));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = DqnAgent::new(AgentConfig {
            batch_size: 0,
            ..config()
        });
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
