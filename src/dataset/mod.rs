mod batcher;
mod pfam;

pub use batcher::{BatchPlan, CollatedBatch, PfamBatch, PfamBatcher, collate};
pub use pfam::{PfamDataset, family_from_name, load_pfam, preprocess_sequence};
