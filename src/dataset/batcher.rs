use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::Rng;
use rand::seq::SliceRandom;

use super::PfamDataset;

/// Host-side padded minibatch, rows sorted by decreasing length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollatedBatch {
    pub tokens: Vec<i64>,
    pub batch: usize,
    pub width: usize,
    pub lengths: Vec<usize>,
    /// `order[row]` is the position of that row in the input slice.
    pub order: Vec<usize>,
    /// Tokens that take part in the objective (everything but `mask_idx`).
    pub residues: usize,
}

pub fn collate<S: AsRef<[u32]>>(items: &[S], mask_idx: usize) -> CollatedBatch {
    let batch = items.len();
    let width = items
        .iter()
        .map(|item| item.as_ref().len())
        .max()
        .unwrap_or(0);

    let mut order: Vec<usize> = (0..batch).collect();
    order.sort_by(|&a, &b| items[b].as_ref().len().cmp(&items[a].as_ref().len()));

    let mut tokens = vec![mask_idx as i64; batch * width];
    let mut lengths = Vec::with_capacity(batch);
    for (row, &source) in order.iter().enumerate() {
        let item = items[source].as_ref();
        let start = row * width;
        for (slot, &token) in tokens[start..start + item.len()].iter_mut().zip(item) {
            *slot = token as i64;
        }
        lengths.push(item.len());
    }

    let residues = tokens
        .iter()
        .filter(|&&token| token != mask_idx as i64)
        .count();

    CollatedBatch {
        tokens,
        batch,
        width,
        lengths,
        order,
        residues,
    }
}

#[derive(Clone, Debug)]
pub struct PfamBatch<B: Backend> {
    pub tokens: Tensor<B, 2, Int>,
    pub lengths: Vec<usize>,
    pub residues: usize,
}

impl<B: Backend> PfamBatch<B> {
    pub fn size(&self) -> usize {
        self.lengths.len()
    }
}

#[derive(Clone, Debug)]
pub struct PfamBatcher<B: Backend> {
    device: B::Device,
    mask_idx: usize,
}

impl<B: Backend> PfamBatcher<B> {
    pub fn new(device: B::Device, mask_idx: usize) -> Self {
        Self { device, mask_idx }
    }

    pub fn batch(&self, collated: CollatedBatch) -> PfamBatch<B> {
        let tokens = Tensor::<B, 2, Int>::from_data(
            TensorData::new(collated.tokens, [collated.batch, collated.width]),
            &self.device,
        );
        PfamBatch {
            tokens,
            lengths: collated.lengths,
            residues: collated.residues,
        }
    }

    pub fn iter<'a>(
        &'a self,
        dataset: &'a PfamDataset,
        plan: &'a BatchPlan,
    ) -> impl Iterator<Item = PfamBatch<B>> + 'a {
        let sequences = dataset.sequences();
        plan.batches().map(move |indices| {
            let items: Vec<&[u32]> = indices
                .iter()
                .map(|&index| sequences[index].as_slice())
                .collect();
            self.batch(collate(&items, self.mask_idx))
        })
    }
}

/// Visiting order of a split for one epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    indices: Vec<usize>,
    batch_size: usize,
}

impl BatchPlan {
    pub fn sequential(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn shuffled<R: Rng + ?Sized>(len: usize, batch_size: usize, rng: &mut R) -> Self {
        let mut plan = Self::sequential(len, batch_size);
        plan.indices.shuffle(rng);
        plan
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn batches(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.indices.chunks(self.batch_size)
    }
}
