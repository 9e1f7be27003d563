use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{
    constants::state::{EPISODE_LEN, EPISODE_OFFSET, STATE_DIM},
    error::{EngineError, Result},
    utils::finite_or,
};

/// Exactly `STATE_DIM` finite values laid out by the offsets in
/// `constants::state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector(Array1<f64>);

impl Default for StateVector {
    fn default() -> Self {
        Self(Array1::zeros(STATE_DIM))
    }
}

impl StateVector {
    pub fn from_vec(values: Vec<f64>) -> Result<Self> {
        if values.len() != STATE_DIM {
            return Err(EngineError::InvalidInput(format!(
                "state vector must hold {STATE_DIM} values, got {}",
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|value| !value.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "state vector slot {index} is not finite"
            )));
        }
        Ok(Self(Array1::from_vec(values)))
    }

    /// Builds a vector from a raw buffer the caller guarantees to be full and finite
    pub(crate) fn from_array(values: [f64; STATE_DIM]) -> Self {
        Self(Array1::from_iter(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice().unwrap_or(&[])
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn segment(&self, offset: usize, len: usize) -> &[f64] {
        &self.as_slice()[offset..offset + len]
    }

    /// Copy of this state with the episode context slots replaced
    pub fn with_episode_context(&self, context: [f64; EPISODE_LEN]) -> Self {
        let mut values = self.0.clone();
        for (slot, value) in context.into_iter().enumerate() {
            values[EPISODE_OFFSET + slot] = finite_or(value, 0.0);
        }
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(StateVector::from_vec(vec![0.0; 10]).is_err());
        let mut values = vec![0.0; STATE_DIM];
        values[5] = f64::NAN;
        assert!(StateVector::from_vec(values).is_err());
    }

    #[test]
    fn test_episode_context_only_touches_its_slots() {
        let state = StateVector::from_vec(vec![0.25; STATE_DIM]).unwrap();
        let mut context = [0.0; EPISODE_LEN];
        context[0] = 1.0;
        context[3] = f64::INFINITY;
        let updated = state.with_episode_context(context);

        assert_eq!(updated.get(EPISODE_OFFSET), Some(1.0));
        assert_eq!(updated.get(EPISODE_OFFSET + 3), Some(0.0));
        assert_eq!(updated.get(EPISODE_OFFSET - 1), Some(0.25));
        assert_eq!(updated.get(EPISODE_OFFSET + EPISODE_LEN), Some(0.25));
    }
}
