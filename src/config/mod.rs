use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;

use crate::alphabet::TokenLayout;
use crate::model::BiLMConfig;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/pfam/Pfam-A.train.fasta"),
            test_path: PathBuf::from("data/pfam/Pfam-A.test.fasta"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingHyperparameters {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub seed: u64,
    /// Sequences between progress lines on stderr, 0 disables them.
    pub progress_interval: usize,
}

impl Default for TrainingHyperparameters {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_epochs: 10,
            seed: 1337,
            progress_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    /// L2 penalty applied as Adam weight decay.
    pub l2: f32,
    /// Gradient norm clipping threshold, 0 disables clipping.
    pub clip: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            l2: 0.0,
            clip: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelHyperparameters {
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub tied: bool,
}

impl Default for ModelHyperparameters {
    fn default() -> Self {
        Self {
            embedding_dim: 21,
            hidden_dim: 512,
            num_layers: 2,
            dropout: 0.0,
            tied: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Training curve destination, stdout when unset.
    pub path: Option<PathBuf>,
    /// Checkpoint prefix, no checkpoints when unset.
    pub save_prefix: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TrainingConfig {
    pub dataset: DatasetConfig,
    pub training: TrainingHyperparameters,
    pub optimizer: OptimizerConfig,
    pub model: ModelHyperparameters,
    pub output: OutputConfig,
}

impl TrainingConfig {
    pub fn model_config(&self, layout: TokenLayout) -> BiLMConfig {
        BiLMConfig::for_layout(layout)
            .with_embedding_dim(self.model.embedding_dim)
            .with_hidden_dim(self.model.hidden_dim)
            .with_num_layers(self.model.num_layers)
            .with_dropout(self.model.dropout)
            .with_tied(self.model.tied)
    }

    pub fn validate(&self) -> Result<()> {
        if self.training.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if !(self.optimizer.learning_rate > 0.0) {
            return Err(anyhow!(
                "learning_rate must be positive, got {}",
                self.optimizer.learning_rate
            ));
        }
        if self.optimizer.l2 < 0.0 || self.optimizer.clip < 0.0 {
            return Err(anyhow!(
                "l2 ({}) and clip ({}) must not be negative",
                self.optimizer.l2,
                self.optimizer.clip
            ));
        }
        Ok(())
    }
}

/// Deep-merges the given TOML files in order on top of the built-in defaults.
pub fn load_training_config(paths: &[PathBuf]) -> Result<TrainingConfig> {
    let mut value = Value::Table(toml::value::Table::new());
    for path in paths {
        let overlay = load_value(path)?;
        merge_values(&mut value, overlay);
    }

    value
        .try_into::<TrainingConfig>()
        .map_err(|err| anyhow!(err))
}

fn load_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let table: toml::value::Table = toml::from_str(&content)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
    Ok(Value::Table(table))
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn no_files_gives_defaults() {
        let config = load_training_config(&[]).expect("defaults");
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.num_epochs, 10);
        assert_eq!(config.model.hidden_dim, 512);
        assert!(config.model.tied);
        assert!(config.output.save_prefix.is_none());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn load_merges_in_order() {
        let dir = tempdir().expect("tempdir");

        let base_contents = [
            "[dataset]",
            "train_path = \"train.fa\"",
            "test_path = \"test.fa\"",
            "",
            "[training]",
            "batch_size = 16",
            "num_epochs = 3",
            "",
            "[optimizer]",
            "learning_rate = 0.01",
            "clip = 0.5",
            "",
            "[model]",
            "hidden_dim = 128",
            "num_layers = 3",
        ]
        .join("\n");
        let base = write_config(dir.path(), "base.toml", &base_contents);

        let override_contents = [
            "[training]",
            "num_epochs = 20",
            "",
            "[model]",
            "tied = false",
            "",
            "[output]",
            "save_prefix = \"runs/bilm\"",
        ]
        .join("\n");
        let override_cfg = write_config(dir.path(), "override.toml", &override_contents);

        let config = load_training_config(&[base, override_cfg]).expect("load config");

        assert_eq!(config.dataset.train_path, PathBuf::from("train.fa"));
        assert_eq!(
            config.training,
            TrainingHyperparameters {
                batch_size: 16,
                num_epochs: 20,
                seed: 1337,
                progress_interval: 100,
            }
        );
        assert!((config.optimizer.learning_rate - 0.01).abs() < f64::EPSILON);
        assert!((config.optimizer.clip - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.optimizer.l2, 0.0);
        assert_eq!(config.model.hidden_dim, 128);
        assert_eq!(config.model.num_layers, 3);
        assert!(!config.model.tied);
        assert_eq!(config.output.save_prefix, Some(PathBuf::from("runs/bilm")));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_training_config(&[PathBuf::from("/definitely/not/here.toml")])
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("failed to read configuration file"));
    }

    #[test]
    fn validate_rejects_bad_optimizer_values() {
        let mut config = TrainingConfig::default();
        config.optimizer.learning_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.optimizer.clip = -1.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
