use burn::module::Module;
use burn::nn::{Dropout, Embedding, Linear, Lstm};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData, activation};

/// Bidirectional LSTM language model over flanked residue sequences.
///
/// Rows look like `[0, x_1, .., x_n, 0, pad..]`. The forward stream reads the
/// prefix up to each position, the reverse stream reads the suffix after it,
/// and both predictions are combined into one distribution per position.
#[derive(Module, Debug)]
pub struct BiLM<B: Backend> {
    embed: Embedding<B>,
    forward_layers: Vec<Lstm<B>>,
    reverse_layers: Option<Vec<Lstm<B>>>,
    dropout: Dropout,
    head: Linear<B>,
    n_output: usize,
    mask_idx: usize,
}

impl<B: Backend> BiLM<B> {
    pub(crate) fn from_parts(
        embed: Embedding<B>,
        forward_layers: Vec<Lstm<B>>,
        reverse_layers: Option<Vec<Lstm<B>>>,
        dropout: Dropout,
        head: Linear<B>,
        n_output: usize,
        mask_idx: usize,
    ) -> Self {
        Self {
            embed,
            forward_layers,
            reverse_layers,
            dropout,
            head,
            n_output,
            mask_idx,
        }
    }

    pub fn is_tied(&self) -> bool {
        self.reverse_layers.is_none()
    }

    /// Returns log-probabilities `[batch, width, n_output]` for every position.
    ///
    /// `lengths[row]` counts the flanking tokens. Rows must be at least two
    /// tokens wide, which every preprocessed sequence is.
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, lengths: &[usize]) -> Tensor<B, 3> {
        let [batch, width] = tokens.dims();
        assert!(width >= 2, "sequences must include both flanking tokens");
        assert_eq!(batch, lengths.len(), "one length per row is required");
        let device = tokens.device();
        let steps = width - 1;

        let embedded = self.embed_tokens(tokens);
        let embed_dim = embedded.dims()[2];
        let z_forward = embedded.clone().slice_dim(1, 0..steps);
        let z_reverse = embedded.slice_dim(1, 1..width);

        let reverse_index = reverse_index::<B>(lengths, steps, &device);
        let z_reverse = z_reverse.gather(
            1,
            reverse_index
                .clone()
                .unsqueeze_dim::<3>(2)
                .expand([batch, steps, embed_dim]),
        );

        let h_forward = self.run_stack(&self.forward_layers, z_forward);
        let reverse_layers = self.reverse_layers.as_ref().unwrap_or(&self.forward_layers);
        let h_reverse = self.run_stack(reverse_layers, z_reverse);
        let hidden_dim = h_reverse.dims()[2];
        // the reversal permutation is its own inverse
        let h_reverse = h_reverse.gather(
            1,
            reverse_index
                .unsqueeze_dim::<3>(2)
                .expand([batch, steps, hidden_dim]),
        );

        let logp_forward = activation::log_softmax(self.head.forward(h_forward), 2);
        let logp_reverse = activation::log_softmax(self.head.forward(h_reverse), 2)
            * reverse_validity::<B>(lengths, steps, &device)
                .unsqueeze_dim::<3>(2)
                .expand([batch, steps, self.n_output]);

        // position t takes the forward prediction from t-1 and the reverse one from t+1
        let zeros = Tensor::<B, 3>::zeros([batch, 1, self.n_output], &device);
        let logp_forward = Tensor::cat(vec![zeros.clone(), logp_forward], 1);
        let logp_reverse = Tensor::cat(vec![logp_reverse, zeros], 1);

        activation::log_softmax(logp_forward + logp_reverse, 2)
    }

    /// Embeds `tokens` with the mask index (padding and unknown residues)
    /// mapped to a zero vector that receives no gradient.
    fn embed_tokens(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, width] = tokens.dims();
        let keep = tokens
            .clone()
            .not_equal_elem(self.mask_idx as i64)
            .float()
            .unsqueeze_dim::<3>(2);
        let embedded = self.embed.forward(tokens);
        let embed_dim = embedded.dims()[2];
        embedded * keep.expand([batch, width, embed_dim])
    }

    fn run_stack(&self, layers: &[Lstm<B>], input: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut hidden = input;
        for layer in layers {
            let (output, _state) = layer.forward(hidden, None);
            hidden = self.dropout.forward(output);
        }
        hidden
    }
}

/// Per-row index that reverses the first `length - 1` steps and leaves the
/// padding tail in place.
fn reverse_index<B: Backend>(
    lengths: &[usize],
    steps: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let values = reverse_positions(lengths, steps)
        .into_iter()
        .map(|position| position as i64)
        .collect::<Vec<_>>();
    Tensor::from_data(TensorData::new(values, [lengths.len(), steps]), device)
}

fn reverse_validity<B: Backend>(
    lengths: &[usize],
    steps: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut values = Vec::with_capacity(lengths.len() * steps);
    for &length in lengths {
        let valid = length.saturating_sub(1).min(steps);
        values.extend((0..steps).map(|step| if step < valid { 1.0f32 } else { 0.0 }));
    }
    Tensor::from_data(TensorData::new(values, [lengths.len(), steps]), device)
}

fn reverse_positions(lengths: &[usize], steps: usize) -> Vec<usize> {
    let mut positions = Vec::with_capacity(lengths.len() * steps);
    for &length in lengths {
        let valid = length.saturating_sub(1).min(steps);
        positions.extend((0..steps).map(|step| {
            if step < valid {
                valid - 1 - step
            } else {
                step
            }
        }));
    }
    positions
}
