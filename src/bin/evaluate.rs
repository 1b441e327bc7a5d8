#![recursion_limit = "512"]

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};

use burn::tensor::backend::Backend;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cuda")]
use burn_cuda::{Cuda, CudaDevice};

use pfam_bilm::{
    DeviceChoice, PfamDataset, Progress, ReportWriter, Split, Uniprot21, evaluate, load_model,
    load_pfam, load_training_config,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Score a saved Pfam language model on a FASTA file")]
struct Args {
    /// Path prefix the model was saved under during training.
    #[arg(long, value_name = "PREFIX")]
    save_prefix: PathBuf,
    /// Epoch whose checkpoint should be loaded.
    #[arg(short = 'e', long)]
    epoch: usize,
    /// FASTA file to score [default: the configured test split]
    #[arg(short = 'i', long, value_name = "PATH")]
    input: Option<PathBuf>,
    /// Configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,
    /// Minibatch size [default: from configuration]
    #[arg(short = 'b', long)]
    minibatch_size: Option<usize>,
    /// Device to use: -2 GPU if available, -1 CPU, 0+ GPU index.
    #[arg(short = 'd', long, default_value_t = -2, allow_negative_numbers = true)]
    device: i32,
    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    backend: BackendArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Wgpu,
    Cuda,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_training_config(&args.config)?;
    let batch_size = args.minibatch_size.unwrap_or(config.training.batch_size);
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| config.dataset.test_path.clone());
    let choice = DeviceChoice::from_index(args.device)?;

    let dataset = load_pfam(&input, &Uniprot21::new())
        .with_context(|| format!("failed to load {}", input.display()))?;

    match (choice, args.backend) {
        (DeviceChoice::Cpu, _) => {
            evaluate_backend::<NdArray<f32>>(&args, &dataset, batch_size, NdArrayDevice::Cpu)
        }
        (DeviceChoice::Auto, BackendArg::Wgpu) => {
            evaluate_backend::<Wgpu<f32>>(&args, &dataset, batch_size, WgpuDevice::DefaultDevice)
        }
        (DeviceChoice::Gpu(index), BackendArg::Wgpu) => evaluate_backend::<Wgpu<f32>>(
            &args,
            &dataset,
            batch_size,
            WgpuDevice::DiscreteGpu(index),
        ),
        (choice, BackendArg::Cuda) => {
            #[cfg(feature = "cuda")]
            {
                let device = match choice {
                    DeviceChoice::Gpu(index) => CudaDevice::new(index),
                    _ => CudaDevice::default(),
                };
                evaluate_backend::<Cuda<f32>>(&args, &dataset, batch_size, device)
            }
            #[cfg(not(feature = "cuda"))]
            {
                let _ = choice;
                Err(anyhow!(
                    "cuda backend selected but this build lacks `cuda` feature; rebuild with `--features cuda`"
                ))
            }
        }
    }
}

fn evaluate_backend<B: Backend>(
    args: &Args,
    dataset: &PfamDataset,
    batch_size: usize,
    device: B::Device,
) -> Result<()> {
    if batch_size == 0 {
        return Err(anyhow!("batch size must be positive"));
    }
    let (model, config) = load_model::<B>(&args.save_prefix, args.epoch, &device)?;
    info!(
        "loaded epoch {} from {} on {device:?}",
        args.epoch,
        args.save_prefix.display()
    );

    let progress = Progress::new(args.epoch, args.epoch, Split::Test, dataset.len(), 100);
    let metrics = evaluate(&model, dataset, &device, config.mask_idx, batch_size, progress);

    let mut report = ReportWriter::new(io::stdout(), args.epoch);
    report.write_header()?;
    report.write_row(args.epoch, Split::Test, &metrics)
}
