//! Best-snapshot checkpointing.
//!
//! Each model role owns one parameter file (`best_canopy_model`,
//! `best_shi_model`, `best_ars_model`) written with Burn's full-precision
//! named MessagePack recorder, so a reloaded model reproduces the saved
//! outputs exactly. A JSON sidecar records when and why the snapshot was taken.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{AirsError, Result};

/// Which fusion model a trainer or checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelRole {
    Canopy,
    SeedHealth,
    AflatoxinRisk,
}

impl ModelRole {
    /// File stem of the role's best snapshot
    pub fn file_stem(self) -> &'static str {
        match self {
            ModelRole::Canopy => "best_canopy_model",
            ModelRole::SeedHealth => "best_shi_model",
            ModelRole::AflatoxinRisk => "best_ars_model",
        }
    }

    /// Name of the validation metric that selects the best snapshot
    pub fn metric_name(self) -> &'static str {
        match self {
            ModelRole::Canopy => "accuracy",
            ModelRole::SeedHealth | ModelRole::AflatoxinRisk => "R2",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            ModelRole::Canopy => "canopy",
            ModelRole::SeedHealth => "shi",
            ModelRole::AflatoxinRisk => "ars",
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Sidecar describing a saved snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub role: ModelRole,
    /// Zero-based epoch that produced the snapshot
    pub epoch: usize,
    pub metric_name: String,
    pub metric_value: f64,
    pub train_loss: f64,
    pub learning_rate: f64,
    pub num_parameters: usize,
    pub backend: String,
    pub timestamp: String,
}

impl CheckpointMetadata {
    pub fn new(
        role: ModelRole,
        epoch: usize,
        metric_value: f64,
        train_loss: f64,
        learning_rate: f64,
        num_parameters: usize,
    ) -> Self {
        Self {
            role,
            epoch,
            metric_name: role.metric_name().to_string(),
            metric_value,
            train_loss,
            learning_rate,
            num_parameters,
            backend: crate::backend::backend_name().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Reads and writes role-named snapshots in one directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the directory if needed
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Result<Self> {
        let checkpoint_dir = checkpoint_dir.into();
        fs::create_dir_all(&checkpoint_dir)?;
        Ok(Self { checkpoint_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Parameter file path without the recorder's extension
    pub fn model_path(&self, role: ModelRole) -> PathBuf {
        self.checkpoint_dir.join(role.file_stem())
    }

    pub fn metadata_path(&self, role: ModelRole) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{}.json", role.file_stem()))
    }

    /// Overwrite the role's snapshot with `model`
    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, metadata: &CheckpointMetadata) -> Result<PathBuf> {
        let path = self.model_path(metadata.role);
        model
            .clone()
            .save_file(path.clone(), &recorder())
            .map_err(|e| AirsError::Checkpoint(format!("failed to save {}: {:?}", path.display(), e)))?;

        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(self.metadata_path(metadata.role), json)?;

        info!(
            "Saved {} snapshot (epoch {}, {} = {:.4}) to {}",
            metadata.role,
            metadata.epoch + 1,
            metadata.metric_name,
            metadata.metric_value,
            path.display()
        );
        Ok(path)
    }

    /// Load the role's snapshot into an identically shaped `model`
    pub fn load<B: Backend, M: Module<B>>(&self, model: M, role: ModelRole, device: &B::Device) -> Result<M> {
        let path = self.model_path(role);
        model
            .load_file(path.clone(), &recorder(), device)
            .map_err(|e| AirsError::Checkpoint(format!("failed to load {}: {:?}", path.display(), e)))
    }

    /// Read the role's sidecar
    pub fn load_metadata(&self, role: ModelRole) -> Result<CheckpointMetadata> {
        let path = self.metadata_path(role);
        if !path.exists() {
            return Err(AirsError::PathNotFound(path));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::MlpConfig;
    use crate::model::encoders::Mlp;
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    #[test]
    fn test_role_file_names() {
        assert_eq!(ModelRole::Canopy.file_stem(), "best_canopy_model");
        assert_eq!(ModelRole::SeedHealth.file_stem(), "best_shi_model");
        assert_eq!(ModelRole::AflatoxinRisk.file_stem(), "best_ars_model");
    }

    #[test]
    fn test_save_and_reload_reproduces_outputs() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let device = Default::default();
        let config = MlpConfig::new(4, vec![8, 2]);

        let model = Mlp::<TestBackend>::new(&config, &device);
        let metadata = CheckpointMetadata::new(ModelRole::SeedHealth, 2, 0.75, 12.5, 1e-3, model.num_params());
        manager.save(&model, &metadata).unwrap();

        let fresh = Mlp::<TestBackend>::new(&config, &device);
        let restored = manager.load(fresh, ModelRole::SeedHealth, &device).unwrap();

        let probe = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.1f32, -0.2, 0.3, 0.4], [1, 4]),
            &device,
        );
        let expected: Vec<f32> = model.forward(probe.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32> = restored.forward(probe).into_data().to_vec().unwrap();
        assert_eq!(expected, actual);

        let loaded_meta = manager.load_metadata(ModelRole::SeedHealth).unwrap();
        assert_eq!(loaded_meta.epoch, 2);
        assert_eq!(loaded_meta.metric_name, "R2");
    }

    #[test]
    fn test_missing_snapshot_is_error() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let model = Mlp::<TestBackend>::new(&MlpConfig::new(2, vec![2]), &device);

        assert!(manager.load(model, ModelRole::Canopy, &device).is_err());
        assert!(matches!(
            manager.load_metadata(ModelRole::Canopy),
            Err(AirsError::PathNotFound(_))
        ));
    }
}
