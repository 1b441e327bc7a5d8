#![recursion_limit = "512"]

pub mod alphabet;
pub mod checkpoint;
pub mod clipping;
pub mod config;
pub mod dataset;
pub mod device;
pub mod fasta;
pub mod metrics;
pub mod model;
pub mod training;

pub use alphabet::{Alphabet, TokenLayout, Uniprot21};
pub use checkpoint::{checkpoint_path, find_checkpoint, load_model, save_model, save_model_config};
pub use clipping::clip_grad_norm;
pub use config::{
    DatasetConfig, ModelHyperparameters, OptimizerConfig, OutputConfig, TrainingConfig,
    TrainingHyperparameters, load_training_config,
};
pub use dataset::{
    BatchPlan, CollatedBatch, PfamBatch, PfamBatcher, PfamDataset, collate, family_from_name,
    load_pfam, preprocess_sequence,
};
pub use device::DeviceChoice;
pub use fasta::{FastaReader, FastaRecord};
pub use metrics::{EpochMetrics, Progress, ReportWriter, RunningMean, Split, epoch_digits};
pub use model::{BiLM, BiLMConfig, MaskedOutput, masked_nll};
pub use training::{EpochReport, adam_config, evaluate, train};
