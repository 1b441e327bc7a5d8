#![recursion_limit = "512"]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};

use burn::tensor::backend::AutodiffBackend;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cuda")]
use burn_cuda::{Cuda, CudaDevice};

use pfam_bilm::{
    BiLMConfig, DeviceChoice, PfamDataset, ReportWriter, TokenLayout, TrainingConfig, Uniprot21,
    load_pfam, load_training_config, train,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a bidirectional LSTM language model on Pfam sequences")]
struct Args {
    /// Configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,
    /// Minibatch size [default: 32]
    #[arg(short = 'b', long)]
    minibatch_size: Option<usize>,
    /// Number of epochs [default: 10]
    #[arg(short = 'n', long)]
    num_epochs: Option<usize>,
    /// Hidden dimension of the LSTM [default: 512]
    #[arg(long)]
    hidden_dim: Option<usize>,
    /// Number of LSTM layers per direction [default: 2]
    #[arg(long)]
    num_layers: Option<usize>,
    /// Dropout after every LSTM layer [default: 0]
    #[arg(long)]
    dropout: Option<f64>,
    /// Use separate LSTM stacks for the two directions.
    #[arg(long)]
    untied: bool,
    /// L2 regularizer [default: 0]
    #[arg(long)]
    l2: Option<f32>,
    /// Learning rate [default: 0.001]
    #[arg(long)]
    lr: Option<f64>,
    /// Gradient clipping max norm [default: 1]
    #[arg(long)]
    clip: Option<f32>,
    /// Device to use: -2 GPU if available, -1 CPU, 0+ GPU index.
    #[arg(short = 'd', long, default_value_t = -2, allow_negative_numbers = true)]
    device: i32,
    /// GPU runtime used for non-CPU devices.
    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    backend: BackendArg,
    /// Where to write the training curve [default: stdout]
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Path prefix for saving models [default: no saving]
    #[arg(long)]
    save_prefix: Option<PathBuf>,
    /// Training FASTA file.
    #[arg(long, value_name = "PATH")]
    train: Option<PathBuf>,
    /// Held-out FASTA file.
    #[arg(long, value_name = "PATH")]
    test: Option<PathBuf>,
    /// Seed for weight initialization and shuffling.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Wgpu,
    Cuda,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = load_training_config(&args.config)?;
    apply_overrides(&mut config, &args);
    config.validate()?;
    let choice = DeviceChoice::from_index(args.device)?;

    let alphabet = Uniprot21::new();
    let model_config = config.model_config(TokenLayout::for_alphabet(&alphabet));
    model_config.validate()?;

    let train_set = load_pfam(&config.dataset.train_path, &alphabet)
        .context("failed to load training sequences")?;
    let test_set = load_pfam(&config.dataset.test_path, &alphabet)
        .context("failed to load test sequences")?;

    let sink: Box<dyn Write> = match &config.output.path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };
    let mut report = ReportWriter::new(sink, config.training.num_epochs);

    let data = TrainingData {
        config: &config,
        model_config: &model_config,
        train_set: &train_set,
        test_set: &test_set,
    };

    match (choice, args.backend) {
        (DeviceChoice::Cpu, _) => train_backend::<Autodiff<NdArray<f32>>>(
            &data,
            NdArrayDevice::Cpu,
            "ndarray",
            &mut report,
        ),
        (choice, BackendArg::Wgpu) => train_backend::<Autodiff<Wgpu<f32>>>(
            &data,
            wgpu_device(choice),
            "wgpu",
            &mut report,
        ),
        (choice, BackendArg::Cuda) => {
            #[cfg(feature = "cuda")]
            {
                train_backend::<Autodiff<Cuda<f32>>>(
                    &data,
                    cuda_device(choice),
                    "cuda",
                    &mut report,
                )
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

struct TrainingData<'a> {
    config: &'a TrainingConfig,
    model_config: &'a BiLMConfig,
    train_set: &'a PfamDataset,
    test_set: &'a PfamDataset,
}

fn train_backend<B>(
    data: &TrainingData<'_>,
    device: B::Device,
    backend_name: &str,
    report: &mut ReportWriter<Box<dyn Write>>,
) -> Result<()>
where
    B: AutodiffBackend,
{
    B::seed(data.config.training.seed);
    info!("using {backend_name} backend on {device:?}");

    let (_model, history) = train::<B, _>(
        data.config,
        data.model_config,
        data.train_set,
        data.test_set,
        &device,
        report,
    )?;

    if let Some(last) = history.last() {
        info!(
            "training complete after {} epochs: test perplexity {:.4}, accuracy {:.4}",
            last.epoch, last.test.perplexity, last.test.accuracy
        );
    }
    Ok(())
}

fn apply_overrides(config: &mut TrainingConfig, args: &Args) {
    if let Some(batch_size) = args.minibatch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(num_epochs) = args.num_epochs {
        config.training.num_epochs = num_epochs;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(hidden_dim) = args.hidden_dim {
        config.model.hidden_dim = hidden_dim;
    }
    if let Some(num_layers) = args.num_layers {
        config.model.num_layers = num_layers;
    }
    if let Some(dropout) = args.dropout {
        config.model.dropout = dropout;
    }
    if args.untied {
        config.model.tied = false;
    }
    if let Some(l2) = args.l2 {
        config.optimizer.l2 = l2;
    }
    if let Some(lr) = args.lr {
        config.optimizer.learning_rate = lr;
    }
    if let Some(clip) = args.clip {
        config.optimizer.clip = clip;
    }
    if let Some(path) = &args.train {
        config.dataset.train_path = path.clone();
    }
    if let Some(path) = &args.test {
        config.dataset.test_path = path.clone();
    }
    if let Some(path) = &args.output {
        config.output.path = Some(path.clone());
    }
    if let Some(prefix) = &args.save_prefix {
        config.output.save_prefix = Some(prefix.clone());
    }
}

fn wgpu_device(choice: DeviceChoice) -> WgpuDevice {
    match choice {
        DeviceChoice::Auto => WgpuDevice::DefaultDevice,
        DeviceChoice::Cpu => WgpuDevice::Cpu,
        DeviceChoice::Gpu(index) => WgpuDevice::DiscreteGpu(index),
    }
}

#[cfg(feature = "cuda")]
fn cuda_device(choice: DeviceChoice) -> CudaDevice {
    match choice {
        DeviceChoice::Gpu(index) => CudaDevice::new(index),
        DeviceChoice::Auto | DeviceChoice::Cpu => CudaDevice::default(),
    }
}
