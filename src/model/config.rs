use anyhow::{Result, anyhow};
use burn::config::Config;
use burn::nn::{DropoutConfig, EmbeddingConfig, LinearConfig, LstmConfig};
use burn::tensor::backend::Backend;

use crate::alphabet::TokenLayout;

use super::BiLM;

#[derive(Config, Debug)]
pub struct BiLMConfig {
    pub n_input: usize,
    pub n_output: usize,
    /// Input index used for padding, excluded from the objective.
    pub mask_idx: usize,
    #[config(default = 21)]
    pub embedding_dim: usize,
    #[config(default = 512)]
    pub hidden_dim: usize,
    #[config(default = 2)]
    pub num_layers: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    /// Share one LSTM stack between the forward and reverse directions.
    #[config(default = true)]
    pub tied: bool,
}

impl BiLMConfig {
    pub fn for_layout(layout: TokenLayout) -> Self {
        Self::new(layout.n_input, layout.n_output, layout.mask_idx)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_layers == 0 {
            return Err(anyhow!("model requires at least one recurrent layer"));
        }
        if self.hidden_dim == 0 || self.embedding_dim == 0 {
            return Err(anyhow!(
                "hidden_dim ({}) and embedding_dim ({}) must be positive",
                self.hidden_dim,
                self.embedding_dim
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(anyhow!("dropout {} must lie in [0, 1)", self.dropout));
        }
        if self.mask_idx >= self.n_input {
            return Err(anyhow!(
                "mask index {} outside of input vocabulary {}",
                self.mask_idx,
                self.n_input
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BiLM<B> {
        let embed = EmbeddingConfig::new(self.n_input, self.embedding_dim).init(device);
        let forward_layers = self.build_stack(device);
        let reverse_layers = (!self.tied).then(|| self.build_stack(device));
        let dropout = DropoutConfig::new(self.dropout).init();
        let head = LinearConfig::new(self.hidden_dim, self.n_output).init(device);

        BiLM::from_parts(
            embed,
            forward_layers,
            reverse_layers,
            dropout,
            head,
            self.n_output,
            self.mask_idx,
        )
    }

    fn build_stack<B: Backend>(&self, device: &B::Device) -> Vec<burn::nn::Lstm<B>> {
        let mut d_input = self.embedding_dim;
        (0..self.num_layers)
            .map(|_| {
                let layer = LstmConfig::new(d_input, self.hidden_dim, true).init(device);
                d_input = self.hidden_dim;
                layer
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Uniprot21;

    #[test]
    fn defaults_follow_layout() {
        let config = BiLMConfig::for_layout(TokenLayout::for_alphabet(&Uniprot21::new()));
        assert_eq!(config.n_input, 22);
        assert_eq!(config.n_output, 21);
        assert_eq!(config.mask_idx, 21);
        assert_eq!(config.embedding_dim, 21);
        assert_eq!(config.hidden_dim, 512);
        assert_eq!(config.num_layers, 2);
        assert!(config.tied);
        config.validate().expect("default config is valid");
    }

    #[test]
    fn rejects_degenerate_configs() {
        let base = BiLMConfig::new(22, 21, 21);
        assert!(base.clone().with_num_layers(0).validate().is_err());
        assert!(base.clone().with_dropout(1.0).validate().is_err());
        assert!(base.clone().with_hidden_dim(0).validate().is_err());
        assert!(BiLMConfig::new(22, 21, 22).validate().is_err());
    }
}
