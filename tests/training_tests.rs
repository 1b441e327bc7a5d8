use std::fs;

use burn::tensor::backend::Backend as BackendTrait;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use pfam_bilm::{
    PfamDataset, Progress, ReportWriter, Split, TokenLayout, TrainingConfig, Uniprot21,
    checkpoint_path, evaluate, load_model, preprocess_sequence, train,
};
use tempfile::tempdir;

type Backend = Autodiff<NdArray<f32>>;
type InnerBackend = NdArray<f32>;

fn toy_dataset(sequences: &[&[u8]]) -> PfamDataset {
    let alphabet = Uniprot21::new();
    PfamDataset::new(
        sequences.iter().map(|_| "toy".to_string()).collect(),
        sequences
            .iter()
            .map(|seq| preprocess_sequence(seq, &alphabet))
            .collect(),
    )
    .expect("toy dataset")
}

fn toy_config(num_epochs: usize) -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.training.batch_size = 3;
    config.training.num_epochs = num_epochs;
    config.training.progress_interval = 0;
    config.training.seed = 7;
    config.model.hidden_dim = 16;
    config.model.num_layers = 1;
    config.optimizer.learning_rate = 1e-2;
    config
}

#[test]
fn writes_one_row_per_split_and_epoch() {
    let train_set = toy_dataset(&[b"ACDEFGHIK", b"LMNPQ", b"RSTVWY", b"ACD", b""]);
    let test_set = toy_dataset(&[b"ACDEF", b"XXKLM"]);
    let config = toy_config(2);
    let model_config = config.model_config(TokenLayout::for_alphabet(&Uniprot21::new()));

    <Backend as BackendTrait>::seed(7);
    let device = <Backend as BackendTrait>::Device::default();
    let mut report = ReportWriter::new(Vec::new(), config.training.num_epochs);

    let (_model, history) =
        train::<Backend, _>(&config, &model_config, &train_set, &test_set, &device, &mut report)
            .expect("train");

    let text = String::from_utf8(report.into_inner()).expect("utf8 report");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "epoch\tsplit\tlog_p\tperplexity\taccuracy");
    assert!(lines[1].starts_with("1\ttrain\t"));
    assert!(lines[2].starts_with("1\ttest\t"));
    assert!(lines[4].starts_with("2\ttest\t"));

    assert_eq!(history.len(), 2);
    for epoch in &history {
        for metrics in [epoch.train, epoch.test] {
            assert!(metrics.log_p.is_finite() && metrics.log_p > 0.0);
            assert!((metrics.perplexity - metrics.log_p.exp()).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&metrics.accuracy));
        }
    }
}

#[test]
fn repeated_sequences_become_easier() {
    let train_set = toy_dataset(&vec![b"ACDEFGHIKL".as_slice(); 6]);
    let test_set = toy_dataset(&[b"ACDEFGHIKL"]);
    let config = toy_config(8);
    let model_config = config.model_config(TokenLayout::for_alphabet(&Uniprot21::new()));

    <Backend as BackendTrait>::seed(11);
    let device = <Backend as BackendTrait>::Device::default();
    let mut report = ReportWriter::new(std::io::sink(), config.training.num_epochs);

    let (_model, history) =
        train::<Backend, _>(&config, &model_config, &train_set, &test_set, &device, &mut report)
            .expect("train");

    let first = history.first().expect("first epoch").train.log_p;
    let last = history.last().expect("last epoch").train.log_p;
    assert!(last < first, "train loss did not improve: {first} -> {last}");
}

#[test]
fn zero_epochs_only_writes_the_header() {
    let train_set = toy_dataset(&[b"ACD"]);
    let test_set = toy_dataset(&[b"ACD"]);
    let config = toy_config(0);
    let model_config = config.model_config(TokenLayout::for_alphabet(&Uniprot21::new()));
    let device = <Backend as BackendTrait>::Device::default();
    let mut report = ReportWriter::new(Vec::new(), 0);

    let (_model, history) =
        train::<Backend, _>(&config, &model_config, &train_set, &test_set, &device, &mut report)
            .expect("train");

    assert!(history.is_empty());
    let text = String::from_utf8(report.into_inner()).expect("utf8 report");
    assert_eq!(text, "epoch\tsplit\tlog_p\tperplexity\taccuracy\n");
}

#[test]
fn checkpoints_reload_with_identical_scores() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("nested").join("bilm");

    let train_set = toy_dataset(&[b"ACDEFGHIK", b"LMNPQ", b"RSTVWY"]);
    let test_set = toy_dataset(&[b"ACDEF", b"KLMNPQR"]);
    let mut config = toy_config(2);
    config.model.tied = false;
    config.output.save_prefix = Some(prefix.clone());
    let model_config = config.model_config(TokenLayout::for_alphabet(&Uniprot21::new()));

    <Backend as BackendTrait>::seed(3);
    let device = <Backend as BackendTrait>::Device::default();
    let mut report = ReportWriter::new(std::io::sink(), config.training.num_epochs);

    let (_model, history) =
        train::<Backend, _>(&config, &model_config, &train_set, &test_set, &device, &mut report)
            .expect("train");

    assert!(checkpoint_path(&prefix, 1, 1).is_file());
    assert!(checkpoint_path(&prefix, 2, 1).is_file());
    assert!(fs::metadata(dir.path().join("nested").join("bilm_config.json")).is_ok());

    let inner_device = <InnerBackend as BackendTrait>::Device::default();
    let (model, loaded_config) =
        load_model::<InnerBackend>(&prefix, 2, &inner_device).expect("load checkpoint");
    assert!(!loaded_config.tied);
    assert!(!model.is_tied());

    let progress = Progress::new(2, 2, Split::Test, test_set.len(), 0);
    let metrics = evaluate(
        &model,
        &test_set,
        &inner_device,
        loaded_config.mask_idx,
        config.training.batch_size,
        progress,
    );
    let expected = history.last().expect("last epoch").test;
    assert!((metrics.log_p - expected.log_p).abs() < 1e-5);
    assert!((metrics.accuracy - expected.accuracy).abs() < 1e-9);
}
