use rand::{seq::index, Rng};
use ringbuffer::{AllocRingBuffer, RingBuffer};

use crate::{
    encoder::StateVector,
    error::{EngineError, Result},
};

use super::action_discrete::Action;

/// One unit of experience
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: StateVector,
    pub action: Action,
    pub reward: f64,
    pub next_state: StateVector,
    pub terminal: bool,
}

/// Bounded FIFO of transitions; the oldest entry is evicted once full
pub struct ReplayBuffer {
    transitions: AllocRingBuffer<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            transitions: AllocRingBuffer::new(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Uniformly samples `batch_size` distinct transitions
    pub fn sample(&self, batch_size: usize, rng: &mut impl Rng) -> Result<Vec<&Transition>> {
        let len = self.len();
        if len < batch_size {
            return Err(EngineError::BufferUnderflow { len, batch_size });
        }

        Ok(index::sample(rng, len, batch_size)
            .into_iter()
            .filter_map(|index| self.transitions.get(index))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn transition(reward: f64) -> Transition {
        Transition {
            state: StateVector::default(),
            action: Action::Hold,
            reward,
            next_state: StateVector::default(),
            terminal: false,
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let capacity = 5;
        let mut buffer = ReplayBuffer::new(capacity);
        for i in 0..capacity + 3 {
            buffer.push(transition(i as f64));
        }

        assert_eq!(buffer.len(), capacity);
        let rewards: Vec<f64> = buffer.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..10 {
            buffer.push(transition(i as f64));
        }
        let mut rng = StdRng::seed_from_u64(3);
        let batch = buffer.sample(10, &mut rng).unwrap();
        let mut rewards: Vec<i64> = batch.iter().map(|t| t.reward as i64).collect();
        rewards.sort();
        assert_eq!(rewards, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_underflow() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(1.0));
        let mut rng = StdRng::seed_from_u64(3);
        let err = buffer.sample(4, &mut rng).unwrap_err();
        assert!(matches!(err, EngineError::BufferUnderflow { len: 1, batch_size: 4 }));
    }
}
