use std::fmt;

use enum_map::{Enum, EnumMap};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

pub type ActionValues = EnumMap<Action, f64>;

impl Action {
    pub const ALL: [Action; 3] = [Action::Buy, Action::Hold, Action::Sell];

    pub fn size() -> usize {
        Self::ALL.len()
    }

    pub fn index(&self) -> usize {
        match self {
            Action::Buy => 0,
            Action::Hold => 1,
            Action::Sell => 2,
        }
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| EngineError::InvalidInput(format!("no action with index {index}")))
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::size())]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_index(action.index()).unwrap(), action);
        }
        assert_eq!(Action::Buy.index(), 0);
        assert_eq!(Action::Hold.index(), 1);
        assert_eq!(Action::Sell.index(), 2);
        assert!(Action::from_index(3).is_err());
    }
}
