mod bilm;
mod config;
mod loss;

pub use bilm::BiLM;
pub use config::BiLMConfig;
pub use loss::{MaskedOutput, masked_nll};
