use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::Distribution;
use tabular::FeatureLayout;

use crate::config::PretrainConfig;
use crate::model::network::{NetworkOutput, PretrainNetwork};

/// Configuration for the reference masked autoencoder.
///
/// ```text
/// (batch, input_dim) features + missing mask
///   → categorical columns through Embedding(cat_dim → cat_emb_dim)
///   → embedded: (batch, embedded_dim)
///   → hide Bernoulli(pretraining_ratio) cells that are not missing
///   → [Linear → ReLU → Dropout] × n_layers            (encoder)
///   → [Linear → ReLU] × (n_layers - 1) → Linear        (decoder)
///   → reconstruction: (batch, embedded_dim)
/// ```
#[derive(Config, Debug)]
pub struct TabularAutoencoderConfig {
    /// Number of raw feature columns.
    pub input_dim: usize,
    /// Positions of categorical columns.
    #[config(default = "Vec::new()")]
    pub cat_idxs: Vec<usize>,
    /// Cardinality of each categorical column, aligned with `cat_idxs`.
    #[config(default = "Vec::new()")]
    pub cat_dims: Vec<usize>,
    /// Embedding width for every categorical column.
    #[config(default = 1)]
    pub cat_emb_dim: usize,
    /// Width of the hidden layers.
    #[config(default = 16)]
    pub n_hidden: usize,
    /// Linear layers in the encoder (and in the decoder).
    #[config(default = 2)]
    pub n_layers: usize,
    /// Fraction of cells hidden per forward pass.
    #[config(default = 0.5)]
    pub pretraining_ratio: f64,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl TabularAutoencoderConfig {
    /// Config whose categorical layout matches `layout`.
    pub fn from_layout(layout: &FeatureLayout) -> Self {
        Self::new(layout.input_dim)
            .with_cat_idxs(layout.cat_idxs.clone())
            .with_cat_dims(layout.cat_dims.clone())
    }

    /// [`from_layout`](Self::from_layout) with the run's obfuscation ratio.
    pub fn from_pretrain_config(layout: &FeatureLayout, config: &PretrainConfig) -> Self {
        Self::from_layout(layout).with_pretraining_ratio(config.pretraining_ratio)
    }

    /// Width after categorical embedding.
    pub fn embedded_dim(&self) -> usize {
        self.input_dim - self.cat_idxs.len() + self.cat_idxs.len() * self.cat_emb_dim
    }

    /// Initialize a TabularAutoencoder with the given configuration.
    ///
    /// # Panics
    /// Panics if `cat_idxs` and `cat_dims` differ in length or a categorical
    /// index is not below `input_dim`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> TabularAutoencoder<B> {
        assert_eq!(self.cat_idxs.len(), self.cat_dims.len(), "cat_idxs / cat_dims length");
        assert!(
            self.cat_idxs.iter().all(|&i| i < self.input_dim),
            "categorical index out of range"
        );
        let n_layers = self.n_layers.max(1);
        let embedded_dim = self.embedded_dim();

        let embeddings = self
            .cat_dims
            .iter()
            .map(|&dim| EmbeddingConfig::new(dim.max(1), self.cat_emb_dim).init(device))
            .collect();

        let mut encoder = Vec::with_capacity(n_layers);
        let mut d_in = embedded_dim;
        for _ in 0..n_layers {
            encoder.push(LinearConfig::new(d_in, self.n_hidden).init(device));
            d_in = self.n_hidden;
        }

        let mut decoder = Vec::with_capacity(n_layers);
        for layer in 0..n_layers {
            let d_out = if layer + 1 == n_layers { embedded_dim } else { self.n_hidden };
            decoder.push(LinearConfig::new(self.n_hidden, d_out).init(device));
        }

        TabularAutoencoder {
            embeddings,
            encoder,
            decoder,
            dropout: DropoutConfig::new(self.dropout).init(),
            cat_idxs: self.cat_idxs.clone(),
            cat_dims: self.cat_dims.clone(),
            cat_emb_dim: self.cat_emb_dim,
            pretraining_ratio: self.pretraining_ratio,
        }
    }
}

/// Masked autoencoder over mixed numeric/categorical rows.
#[derive(Module, Debug)]
pub struct TabularAutoencoder<B: Backend> {
    embeddings: Vec<Embedding<B>>,
    encoder: Vec<Linear<B>>,
    decoder: Vec<Linear<B>>,
    dropout: Dropout,
    cat_idxs: Vec<usize>,
    cat_dims: Vec<usize>,
    cat_emb_dim: usize,
    pretraining_ratio: f64,
}

impl<B: Backend> TabularAutoencoder<B> {
    /// Embed categorical columns and widen the missing mask to match.
    ///
    /// Returns `(embedded, embedded_missing)`, both `(batch, embedded_dim)`.
    pub fn embed(&self, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> (Tensor<B, 2>, Tensor<B, 2, Bool>) {
        let [batch, cols] = features.dims();
        let mut parts = Vec::with_capacity(cols);
        let mut missing_parts = Vec::with_capacity(cols);

        for j in 0..cols {
            let column = features.clone().slice([0..batch, j..j + 1]);
            let missing = missing_mask.clone().slice([0..batch, j..j + 1]);
            match self.cat_idxs.iter().position(|&c| c == j) {
                Some(k) => {
                    let max_code = self.cat_dims[k].max(1) as i64 - 1;
                    let codes = column.int().clamp(0, max_code);
                    let embedded = self.embeddings[k].forward(codes).reshape([batch, self.cat_emb_dim]);
                    parts.push(embedded);
                    missing_parts.push(Tensor::cat(vec![missing; self.cat_emb_dim], 1));
                }
                None => {
                    parts.push(column);
                    missing_parts.push(missing);
                }
            }
        }

        (Tensor::cat(parts, 1), Tensor::cat(missing_parts, 1))
    }

    fn encode_embedded(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.encoder {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        x
    }

    fn decode(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.decoder.len() - 1;
        let mut x = latent;
        for (i, layer) in self.decoder.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        x
    }

    /// Latent representation without obfuscation. Missing cells are zeroed.
    ///
    /// Output shape: `(batch, n_hidden)`
    pub fn encode(&self, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
        let (embedded, missing) = self.embed(features, missing_mask);
        let present = missing.float().neg().add_scalar(1.0);
        self.encode_embedded(embedded * present)
    }

    /// Obfuscate, encode and reconstruct.
    ///
    /// Input shape: `(batch, input_dim)`
    /// Output tensors: `(batch, embedded_dim)`
    pub fn forward(&self, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> NetworkOutput<B> {
        let device = features.device();
        let (embedded, missing) = self.embed(features, missing_mask);

        let present = missing.float().neg().add_scalar(1.0);
        let hidden = Tensor::<B, 2>::random(
            embedded.shape(),
            Distribution::Bernoulli(self.pretraining_ratio),
            &device,
        ) * present.clone();
        // Hidden cells and missing cells are both withheld from the encoder
        let visible = present * hidden.clone().neg().add_scalar(1.0);

        let latent = self.encode_embedded(embedded.clone() * visible);
        NetworkOutput {
            reconstruction: self.decode(latent),
            embedded,
            obfuscation: hidden.greater_elem(0.5),
        }
    }
}

impl<B: Backend> PretrainNetwork<B> for TabularAutoencoder<B> {
    fn forward(&self, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> NetworkOutput<B> {
        TabularAutoencoder::forward(self, features, missing_mask)
    }
}
