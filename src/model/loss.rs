use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

pub struct MaskedOutput<B: Backend> {
    /// Mean negative log-likelihood over unmasked positions.
    pub loss: Tensor<B, 1>,
    /// Unmasked positions whose argmax prediction equals the target.
    pub correct: Tensor<B, 1, Int>,
}

/// Scores `log_probs` against the input tokens themselves, skipping every
/// position that holds `mask_idx`.
pub fn masked_nll<B: Backend>(
    log_probs: Tensor<B, 3>,
    tokens: Tensor<B, 2, Int>,
    mask_idx: usize,
) -> MaskedOutput<B> {
    let [batch, width, _] = log_probs.dims();

    let mask = tokens.clone().not_equal_elem(mask_idx as i64);
    // masked targets point at class 0 so the gather stays in range
    let targets = tokens.clone().mask_fill(mask.clone().bool_not(), 0);
    let picked = log_probs
        .clone()
        .gather(2, targets.unsqueeze_dim::<3>(2))
        .reshape([batch, width]);

    let weights = mask.clone().float();
    let total = weights.clone().sum();
    let loss = picked.mul(weights).sum().neg().div(total);

    let predicted = log_probs.argmax(2).reshape([batch, width]);
    let correct = predicted.equal(tokens).int().mul(mask.int()).sum();

    MaskedOutput { loss, correct }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, TensorData, activation};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn ignores_masked_positions() {
        let device = Default::default();
        // three classes, mask index 3
        let logits = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(
                vec![
                    2.0f32, 0.0, 0.0, // target 0, predicted 0
                    0.0, 0.0, 2.0, // target 1, predicted 2
                    9.0, 0.0, 0.0, // padding
                ],
                [1, 3, 3],
            ),
            &device,
        );
        let log_probs = activation::log_softmax(logits, 2);
        let tokens = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![0i64, 1, 3], [1, 3]),
            &device,
        );

        let expected: f32 = log_probs
            .clone()
            .into_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .map(|values| -(values[0] + values[4]) / 2.0)
            .expect("to vec");

        let output = masked_nll(log_probs, tokens, 3);
        let loss = output.loss.into_scalar().elem::<f32>();
        let correct = output.correct.into_scalar().elem::<i64>();

        assert!((loss - expected).abs() < 1e-5, "{loss} != {expected}");
        assert_eq!(correct, 1);
    }
}
