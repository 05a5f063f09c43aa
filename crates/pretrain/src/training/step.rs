//! Single-batch training and validation steps.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::model::bridge::{tensor_to_f64, Batch};
use crate::model::network::PretrainNetwork;
use crate::training::loss::masked_reconstruction_loss;
use crate::training::metrics::MetricRecord;
use crate::training::optim::{clip_grad_norm, PretrainOptimizer};

/// Per-step settings fixed for the duration of an epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSettings {
    pub learning_rate: f64,
    /// Global gradient-norm threshold.
    pub clip_value: Option<f64>,
    pub loss_eps: f64,
}

/// Forward, masked loss, backward, optional clipping, optimizer update.
///
/// Gradients are built fresh from this step's backward pass, so nothing
/// accumulates across steps. Returns the updated network and a record with
/// `loss` (plus `grad_norm` when clipping is enabled).
pub fn train_step<B, M>(
    network: M,
    optimizer: &mut dyn PretrainOptimizer<M, B>,
    batch: Batch<B>,
    settings: &StepSettings,
) -> (M, MetricRecord)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + PretrainNetwork<B>,
{
    let output = network.forward(batch.features, batch.missing_mask);
    let loss = masked_reconstruction_loss(
        output.reconstruction,
        output.embedded,
        output.obfuscation,
        settings.loss_eps,
    );
    let loss_value = tensor_to_f64(loss.clone());

    let mut grads = GradientsParams::from_grads(loss.backward(), &network);
    let mut record = MetricRecord::new().with("loss", loss_value);
    if let Some(max_norm) = settings.clip_value {
        let norm = clip_grad_norm::<B, M>(&network, &mut grads, max_norm);
        record.insert("grad_norm", norm);
    }

    let network = optimizer.step(settings.learning_rate, network, grads);
    (network, record)
}

/// Forward with the evaluation network, masked loss on the obfuscated
/// complement.
pub fn valid_step<B, M>(network: &M, batch: Batch<B>, loss_eps: f64) -> MetricRecord
where
    B: Backend,
    M: PretrainNetwork<B>,
{
    let output = network.forward(batch.features, batch.missing_mask);
    let loss = masked_reconstruction_loss(
        output.reconstruction,
        output.embedded,
        output.obfuscation.bool_not(),
        loss_eps,
    );
    MetricRecord::new().with("loss", tensor_to_f64(loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::autoencoder::{TabularAutoencoder, TabularAutoencoderConfig};
    use crate::training::loss::DEFAULT_LOSS_EPS;
    use crate::training::optim::OptimizerSpec;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    /// Fixed 16x4 batch; column 1 tracks column 0, the rest oscillate.
    fn batch<B: Backend>(device: &B::Device) -> Batch<B> {
        let values: Vec<f32> = (0..16)
            .flat_map(|i| {
                let t = i as f32 / 4.0;
                [t, 2.0 * t - 1.0, (t * 1.7).sin(), (t * 0.9).cos()]
            })
            .collect();
        Batch {
            features: Tensor::from_data(TensorData::new(values, [16, 4]), device),
            missing_mask: Tensor::from_data(TensorData::new(vec![false; 64], [16, 4]), device),
        }
    }

    #[test]
    fn test_train_step_reduces_loss() {
        let device = Default::default();
        let mut network = TabularAutoencoderConfig::new(4)
            .with_n_hidden(16)
            .init::<TestAutodiffBackend>(&device);
        let mut optimizer = OptimizerSpec::<TabularAutoencoder<TestAutodiffBackend>, TestAutodiffBackend>::Named(
            "adam".into(),
        )
        .build()
        .unwrap();
        let settings = StepSettings {
            learning_rate: 1e-2,
            clip_value: None,
            loss_eps: DEFAULT_LOSS_EPS,
        };

        let mut losses = Vec::new();
        for _ in 0..60 {
            let (next, record) = train_step(network, optimizer.as_mut(), batch(&device), &settings);
            network = next;
            losses.push(record.get("loss").unwrap());
        }
        assert!(losses.iter().all(|l| l.is_finite()));
        let first: f64 = losses[..10].iter().sum::<f64>() / 10.0;
        let last: f64 = losses[50..].iter().sum::<f64>() / 10.0;
        assert!(last < first, "loss should decrease: first={first:.4}, last={last:.4}");
    }

    #[test]
    fn test_train_step_records_grad_norm_when_clipping() {
        let device = Default::default();
        let network = TabularAutoencoderConfig::new(4).init::<TestAutodiffBackend>(&device);
        let mut optimizer = OptimizerSpec::<TabularAutoencoder<TestAutodiffBackend>, TestAutodiffBackend>::Named(
            "sgd".into(),
        )
        .build()
        .unwrap();
        let settings = StepSettings {
            learning_rate: 1e-3,
            clip_value: Some(0.5),
            loss_eps: DEFAULT_LOSS_EPS,
        };
        let (_, record) = train_step(network, optimizer.as_mut(), batch(&device), &settings);
        assert!(record.get("loss").is_some());
        assert!(record.get("grad_norm").unwrap() >= 0.0);
    }

    #[test]
    fn test_valid_step_scores_complement() {
        let device = Default::default();
        // Nothing obfuscated, so the complement covers every cell
        let network = TabularAutoencoderConfig::new(4)
            .with_pretraining_ratio(0.0)
            .init::<TestBackend>(&device);
        let record = valid_step(&network, batch(&device), DEFAULT_LOSS_EPS);
        let loss = record.get("loss").unwrap();
        assert!(loss.is_finite() && loss > 0.0, "got {loss}");
    }
}
