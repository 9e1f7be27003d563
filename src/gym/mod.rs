pub mod action_discrete;
pub mod memory;

pub use action_discrete::{Action, ActionValues};
pub use memory::{ReplayBuffer, Transition};
