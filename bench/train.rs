use burn::LearningRate;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::Backend as BackendTrait;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use pfam_bilm::{
    BiLM, OptimizerConfig, PfamBatcher, TokenLayout, Uniprot21, adam_config, clip_grad_norm,
    collate, masked_nll,
};

fn training_step_bench(c: &mut Criterion) {
    type Backend = Autodiff<NdArray<f32>>;
    <Backend as BackendTrait>::seed(24);
    let device = <Backend as BackendTrait>::Device::default();

    let layout = TokenLayout::for_alphabet(&Uniprot21::new());
    let model_config = pfam_bilm::BiLMConfig::for_layout(layout).with_hidden_dim(128);
    let base_model = model_config.init::<Backend>(&device);

    let batch_size = 8;
    let sequences: Vec<Vec<u32>> = (0..batch_size)
        .map(|row| {
            let len = 64 + row * 8;
            let mut tokens = vec![0u32];
            tokens.extend((0..len).map(|idx| ((idx + row) % 20) as u32 + 1));
            tokens.push(0);
            tokens
        })
        .collect();
    let batcher = PfamBatcher::<Backend>::new(device.clone(), layout.mask_idx);
    let batch = batcher.batch(collate(&sequences, layout.mask_idx));

    let optimizer = OptimizerConfig::default();
    let optimizer_config = adam_config(&optimizer);
    let clip = f64::from(optimizer.clip);
    let lr: LearningRate = 1e-3;

    c.bench_function("bilm_single_train_step", |b| {
        b.iter_batched(
            || {
                let model = base_model.clone();
                let optimizer = optimizer_config.init::<Backend, BiLM<Backend>>();
                (model, optimizer)
            },
            |(mut model, mut optimizer)| {
                let log_probs = model.forward(batch.tokens.clone(), &batch.lengths);
                let output = masked_nll(log_probs, batch.tokens.clone(), layout.mask_idx);
                let grads = output.loss.backward();
                let mut grads = GradientsParams::from_grads(grads, &model);
                clip_grad_norm(&model, &mut grads, clip);
                model = optimizer.step(lr, model, grads);
                model
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, training_step_bench);
criterion_main!(benches);
