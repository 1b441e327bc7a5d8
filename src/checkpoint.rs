use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::config::Config;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use tracing::debug;

use crate::model::{BiLM, BiLMConfig};

type CheckpointRecorder = BinFileRecorder<FullPrecisionSettings>;

const CHECKPOINT_EXTENSION: &str = "bin";
const MAX_EPOCH_DIGITS: usize = 8;

/// `{prefix}_epoch{NN}.bin`. The extension is spelled out because the recorder
/// rewrites whatever extension the path carries.
pub fn checkpoint_path(prefix: &Path, epoch: usize, digits: usize) -> PathBuf {
    with_suffix(prefix, &format!("_epoch{epoch:0digits$}.{CHECKPOINT_EXTENSION}"))
}

pub fn config_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "_config.json")
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

pub fn save_model_config(prefix: &Path, config: &BiLMConfig) -> Result<PathBuf> {
    let path = config_path(prefix);
    ensure_parent(&path)?;
    config
        .save(&path)
        .with_context(|| format!("failed to write model config {}", path.display()))?;
    debug!("wrote model config to {}", path.display());
    Ok(path)
}

pub fn save_model<B: Backend>(
    model: &BiLM<B>,
    prefix: &Path,
    epoch: usize,
    digits: usize,
) -> Result<PathBuf> {
    let path = checkpoint_path(prefix, epoch, digits);
    ensure_parent(&path)?;
    model
        .clone()
        .save_file(path.clone(), &CheckpointRecorder::new())
        .map_err(|err| anyhow!("failed to save checkpoint {}: {err}", path.display()))?;
    Ok(path)
}

/// Finds the checkpoint written for `epoch`, whatever zero padding was used.
pub fn find_checkpoint(prefix: &Path, epoch: usize) -> Result<PathBuf> {
    (1..=MAX_EPOCH_DIGITS)
        .map(|digits| checkpoint_path(prefix, epoch, digits))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            anyhow!(
                "no checkpoint for epoch {epoch} under prefix {}",
                prefix.display()
            )
        })
}

/// Rebuilds the model from `{prefix}_config.json` and loads one epoch's weights.
pub fn load_model<B: Backend>(
    prefix: &Path,
    epoch: usize,
    device: &B::Device,
) -> Result<(BiLM<B>, BiLMConfig)> {
    let config_file = config_path(prefix);
    let config = BiLMConfig::load(&config_file)
        .map_err(|err| anyhow!("failed to read model config {}: {err}", config_file.display()))?;
    config.validate()?;

    let path = find_checkpoint(prefix, epoch)?;
    let model = config
        .init::<B>(device)
        .load_file(path.clone(), &CheckpointRecorder::new(), device)
        .map_err(|err| anyhow!("failed to load checkpoint {}: {err}", path.display()))?;
    debug!("loaded checkpoint {}", path.display());
    Ok((model, config))
}
