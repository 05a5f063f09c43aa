//! Feature importance of a trained network.
//!
//! The default estimator is permutation importance on the reconstruction
//! loss: shuffle one raw column across the sampled rows, re-score, and take
//! the loss increase. Backend randomness is reseeded before every scoring
//! pass so each column sees the same obfuscation mask as the baseline.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{PretrainError, Result};
use crate::model::bridge::tensor_to_f64;
use crate::model::network::PretrainNetwork;
use crate::training::loss::masked_reconstruction_loss;

/// Upper bound on rows sampled for importance when no size is configured.
pub const IMPORTANCE_SAMPLE_CAP: usize = 100_000;

/// Importance value per input column, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureImportance {
    entries: Vec<(String, f64)>,
}

impl FeatureImportance {
    /// # Errors
    /// Fails if `names` and `values` differ in length.
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(PretrainError::InvalidConfig(format!(
                "importance has {} values for {} columns",
                values.len(),
                names.len()
            )));
        }
        Ok(Self {
            entries: names.into_iter().zip(values).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FeatureImportance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows used for importance: all of them, `configured` of them, or at most
/// [`IMPORTANCE_SAMPLE_CAP`]. Sorted.
pub fn importance_sample_rows<R: Rng + ?Sized>(n_rows: usize, configured: Option<usize>, rng: &mut R) -> Vec<usize> {
    let size = match configured {
        Some(k) => k.min(n_rows),
        None if n_rows > IMPORTANCE_SAMPLE_CAP => {
            tracing::warn!(
                n_rows,
                cap = IMPORTANCE_SAMPLE_CAP,
                "Dataset exceeds importance sample cap; sampling rows"
            );
            IMPORTANCE_SAMPLE_CAP
        }
        None => n_rows,
    };
    if size == n_rows {
        return (0..n_rows).collect();
    }
    let mut rows = rand::seq::index::sample(rng, n_rows, size).into_vec();
    rows.sort_unstable();
    rows
}

/// Computes one importance value per raw input column.
pub trait ImportanceEstimator<B: Backend, M> {
    /// `features` / `missing_mask`: shape `(rows, input_dim)`.
    ///
    /// Returns `input_dim` finite, non-negative values.
    fn estimate(&self, network: &M, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> Vec<f64>;
}

/// Permutation importance on the masked reconstruction loss, normalised to
/// sum to 1 (all zeros when no column matters).
#[derive(Debug, Clone, Copy)]
pub struct PermutationImportance {
    pub seed: u64,
    pub loss_eps: f64,
}

impl PermutationImportance {
    pub fn new(seed: u64, loss_eps: f64) -> Self {
        Self { seed, loss_eps }
    }

    fn score<B: Backend, M: PretrainNetwork<B>>(
        &self,
        network: &M,
        features: Tensor<B, 2>,
        missing_mask: Tensor<B, 2, Bool>,
    ) -> f64 {
        B::seed(self.seed);
        let out = network.forward(features, missing_mask);
        tensor_to_f64(masked_reconstruction_loss(
            out.reconstruction,
            out.embedded,
            out.obfuscation,
            self.loss_eps,
        ))
    }
}

impl<B: Backend, M: PretrainNetwork<B>> ImportanceEstimator<B, M> for PermutationImportance {
    fn estimate(&self, network: &M, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> Vec<f64> {
        let [rows, cols] = features.dims();
        let device = features.device();
        if rows < 2 {
            return vec![0.0; cols];
        }

        let baseline = self.score(network, features.clone(), missing_mask.clone());

        let mut order: Vec<i64> = (0..rows as i64).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));
        let perm = Tensor::<B, 1, Int>::from_data(TensorData::new(order, [rows]), &device);
        let missing_f = missing_mask.float();

        let increases: Vec<f64> = (0..cols)
            .map(|j| {
                let range = [0..rows, j..j + 1];
                let column = features.clone().slice(range.clone()).select(0, perm.clone());
                let permuted = features.clone().slice_assign(range.clone(), column);

                let missing_column = missing_f.clone().slice(range.clone()).select(0, perm.clone());
                let permuted_missing = missing_f.clone().slice_assign(range, missing_column).greater_elem(0.5);

                let increase = self.score(network, permuted, permuted_missing) - baseline;
                if increase.is_finite() {
                    increase.max(0.0)
                } else {
                    0.0
                }
            })
            .collect();

        normalize(increases)
    }
}

/// Scale to sum 1; all-zero input stays all zero.
fn normalize(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.into_iter().map(|v| v / total).collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::autoencoder::TabularAutoencoderConfig;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_sample_rows_all_when_small() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(importance_sample_rows(5, None, &mut rng), vec![0, 1, 2, 3, 4]);
        assert_eq!(importance_sample_rows(5, Some(10), &mut rng).len(), 5);
    }

    #[test]
    fn test_sample_rows_configured() {
        let mut rng = StdRng::seed_from_u64(0);
        let rows = importance_sample_rows(50, Some(8), &mut rng);
        assert_eq!(rows.len(), 8);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|&r| r < 50));
    }

    #[test]
    fn test_sample_rows_capped() {
        let mut rng = StdRng::seed_from_u64(0);
        let rows = importance_sample_rows(IMPORTANCE_SAMPLE_CAP + 10, None, &mut rng);
        assert_eq!(rows.len(), IMPORTANCE_SAMPLE_CAP);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(vec![1.0, 3.0]), vec![0.25, 0.75]);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_permutation_importance_shape_and_range() {
        let device = Default::default();
        let network = TabularAutoencoderConfig::new(3)
            .with_n_hidden(8)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::random([32, 3], Distribution::Normal(0.0, 1.0), &device);
        let missing = x.clone().greater_elem(10.0);

        let values = PermutationImportance::new(5, 1e-9).estimate(&network, x, missing);
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));
        let total: f64 = values.iter().sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9, "total={total}");
    }

    #[test]
    fn test_feature_importance_lookup_and_json() {
        let fi = FeatureImportance::new(vec!["b".into(), "a".into()], vec![0.7, 0.3]).unwrap();
        assert_eq!(fi.get("a"), Some(0.3));
        assert_eq!(fi.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec!["b", "a"]);
        let json = serde_json::to_string(&fi).unwrap();
        assert_eq!(json, r#"{"b":0.7,"a":0.3}"#);

        assert!(FeatureImportance::new(vec!["a".into()], vec![]).is_err());
    }
}
