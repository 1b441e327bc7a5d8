use std::io::Write;

use anyhow::Result;
use burn::LearningRate;
use burn::module::{AutodiffModule, Module};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::ElementConversion;
use burn::tensor::backend::{AutodiffBackend, Backend};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::checkpoint::{save_model, save_model_config};
use crate::clipping::clip_grad_norm;
use crate::config::{OptimizerConfig, TrainingConfig};
use crate::dataset::{BatchPlan, PfamBatcher, PfamDataset};
use crate::metrics::{EpochMetrics, Progress, ReportWriter, RunningMean, Split};
use crate::model::{BiLM, BiLMConfig, masked_nll};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub test: EpochMetrics,
}

/// Adam with `l2` as weight decay. Clipping is applied separately by the
/// training loop over the norm of all gradients together.
pub fn adam_config(optimizer: &OptimizerConfig) -> AdamConfig {
    let mut adam = AdamConfig::new();
    if optimizer.l2 > 0.0 {
        adam = adam.with_weight_decay(Some(WeightDecayConfig::new(optimizer.l2)));
    }
    adam
}

/// Runs every epoch's train and test phase, writing one report row per phase
/// and a checkpoint per epoch when a save prefix is configured.
pub fn train<B, W>(
    config: &TrainingConfig,
    model_config: &BiLMConfig,
    train_set: &PfamDataset,
    test_set: &PfamDataset,
    device: &B::Device,
    report: &mut ReportWriter<W>,
) -> Result<(BiLM<B>, Vec<EpochReport>)>
where
    B: AutodiffBackend,
    W: Write,
{
    config.validate()?;
    model_config.validate()?;

    let training = &config.training;
    let num_epochs = training.num_epochs;
    let batch_size = training.batch_size;
    let mask_idx = model_config.mask_idx;
    let save_prefix = config.output.save_prefix.as_deref();

    let mut model = model_config.init::<B>(device);
    info!(
        "initialized model: {} parameters, hidden_dim={}, num_layers={}, tied={}",
        model.num_params(),
        model_config.hidden_dim,
        model_config.num_layers,
        model_config.tied
    );
    let mut optim = adam_config(&config.optimizer).init::<B, BiLM<B>>();
    let lr: LearningRate = config.optimizer.learning_rate;
    let clip = f64::from(config.optimizer.clip);

    if let Some(prefix) = save_prefix {
        save_model_config(prefix, model_config)?;
    }

    let mut rng = StdRng::seed_from_u64(training.seed);
    let batcher = PfamBatcher::<B>::new(device.clone(), mask_idx);

    info!("training model for {num_epochs} epochs");
    report.write_header()?;

    let mut history = Vec::with_capacity(num_epochs);
    for epoch in 1..=num_epochs {
        let plan = BatchPlan::shuffled(train_set.len(), batch_size, &mut rng);
        let mut running = RunningMean::new();
        let mut progress = Progress::new(
            epoch,
            num_epochs,
            Split::Train,
            plan.len(),
            training.progress_interval,
        );

        for batch in batcher.iter(train_set, &plan) {
            let sequences = batch.size();
            let residues = batch.residues;

            let log_probs = model.forward(batch.tokens.clone(), &batch.lengths);
            let output = masked_nll(log_probs, batch.tokens, mask_idx);
            let loss = output.loss.clone().into_scalar().elem::<f64>();
            let correct = output.correct.into_scalar().elem::<i64>() as usize;

            let grads = output.loss.backward();
            let mut grads = GradientsParams::from_grads(grads, &model);
            if clip > 0.0 {
                clip_grad_norm(&model, &mut grads, clip);
            }
            model = optim.step(lr, model, grads);

            running.update(residues, loss, correct);
            progress.advance(sequences, &running);
        }
        progress.finish();

        let train_metrics = running.metrics();
        report.write_row(epoch, Split::Train, &train_metrics)?;

        let progress = Progress::new(
            epoch,
            num_epochs,
            Split::Test,
            test_set.len(),
            training.progress_interval,
        );
        let test_metrics = evaluate(
            &model.valid(),
            test_set,
            device,
            mask_idx,
            batch_size,
            progress,
        );
        report.write_row(epoch, Split::Test, &test_metrics)?;

        if let Some(prefix) = save_prefix {
            let path = save_model(&model, prefix, epoch, report.digits())?;
            info!("saved checkpoint {}", path.display());
        }

        debug!(
            "epoch {epoch}: train log_p={:.5} acc={:.5}, test log_p={:.5} acc={:.5}",
            train_metrics.log_p, train_metrics.accuracy, test_metrics.log_p, test_metrics.accuracy
        );
        history.push(EpochReport {
            epoch,
            train: train_metrics,
            test: test_metrics,
        });
    }

    Ok((model, history))
}

/// Scores a split in file order without tracking gradients.
pub fn evaluate<B: Backend, P: Write>(
    model: &BiLM<B>,
    dataset: &PfamDataset,
    device: &B::Device,
    mask_idx: usize,
    batch_size: usize,
    mut progress: Progress<P>,
) -> EpochMetrics {
    let plan = BatchPlan::sequential(dataset.len(), batch_size);
    let batcher = PfamBatcher::<B>::new(device.clone(), mask_idx);
    let mut running = RunningMean::new();

    for batch in batcher.iter(dataset, &plan) {
        let sequences = batch.size();
        let residues = batch.residues;

        let log_probs = model.forward(batch.tokens.clone(), &batch.lengths);
        let output = masked_nll(log_probs, batch.tokens, mask_idx);
        let loss = output.loss.into_scalar().elem::<f64>();
        let correct = output.correct.into_scalar().elem::<i64>() as usize;

        running.update(residues, loss, correct);
        progress.advance(sequences, &running);
    }
    progress.finish();

    running.metrics()
}
