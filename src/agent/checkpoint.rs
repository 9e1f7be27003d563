use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{EngineError, Result},
    utils::create_folder_if_not_exists,
};

use super::{adam::Adam, network::QNetwork};

pub const CHECKPOINT_VERSION: u32 = 1;

/// Everything needed to resume an agent exactly where it stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub state_dim: usize,
    pub action_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub policy: QNetwork,
    pub target: QNetwork,
    pub optimizer: Adam,
    pub train_steps: u64,
    pub decay_steps: u32,
    pub epsilon: f64,
    pub episode_rewards: Vec<f64>,
    pub episode_losses: Vec<f64>,
}

impl Checkpoint {
    /// Serializes to a sibling temporary file, syncs it and renames it over
    /// `path` so readers never see a partial checkpoint.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_folder_if_not_exists(parent)?;
        }

        let bytes = postcard::to_stdvec(self)?;
        let tmp = temporary_path(path);

        let written = (|| -> Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)?;
            Ok(())
        })();
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written?;

        info!(path = %path.display(), bytes = bytes.len(), "saved checkpoint");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let checkpoint: Checkpoint = postcard::from_bytes(&bytes)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(EngineError::InvalidInput(format!(
                "checkpoint version {} is not supported, expected {CHECKPOINT_VERSION}",
                checkpoint.version
            )));
        }
        info!(path = %path.display(), train_steps = checkpoint.train_steps, "loaded checkpoint");
        Ok(checkpoint)
    }

    /// Rejects checkpoints whose shape disagrees with the live agent
    pub fn check_dimensions(&self, state_dim: usize, action_dim: usize, hidden_dims: &[usize]) -> Result<()> {
        let shape_mismatch = self.state_dim != state_dim
            || self.action_dim != action_dim
            || self.policy.input_dim() != self.state_dim
            || self.policy.output_dim() != self.action_dim;
        if shape_mismatch {
            return Err(EngineError::DimensionMismatch {
                expected_state: state_dim,
                expected_action: action_dim,
                found_state: self.state_dim,
                found_action: self.action_dim,
            });
        }
        if self.hidden_dims != hidden_dims || self.policy.hidden_dims() != hidden_dims {
            return Err(EngineError::InvalidInput(format!(
                "checkpoint hidden layers {:?} do not match agent {hidden_dims:?}",
                self.hidden_dims
            )));
        }
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".into());
    path.with_file_name(format!("{name}.{}.tmp", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn checkpoint() -> Checkpoint {
        let mut rng = StdRng::seed_from_u64(5);
        let policy = QNetwork::new(6, &[4], 3, 0.1, &mut rng);
        Checkpoint {
            version: CHECKPOINT_VERSION,
            state_dim: 6,
            action_dim: 3,
            hidden_dims: vec![4],
            target: policy.clone(),
            optimizer: Adam::new(&policy, 1e-3),
            policy,
            train_steps: 12,
            decay_steps: 2,
            epsilon: 0.99,
            episode_rewards: vec![1.0, -2.0],
            episode_losses: vec![0.5],
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agent.bin");
        let original = checkpoint();
        original.write(&path).unwrap();

        assert_eq!(Checkpoint::read(&path).unwrap(), original);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_dimension_check() {
        let checkpoint = checkpoint();
        assert!(checkpoint.check_dimensions(6, 3, &[4]).is_ok());
        assert!(matches!(
            checkpoint.check_dimensions(128, 3, &[4]),
            Err(EngineError::DimensionMismatch { found_state: 6, .. })
        ));
        assert!(matches!(
            checkpoint.check_dimensions(6, 3, &[8]),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.bin");
        fs::write(&path, b"not a checkpoint").unwrap();
        assert!(Checkpoint::read(&path).is_err());
    }
}
