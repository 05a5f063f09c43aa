//! Tensor bridge: resolved host buffers to burn tensors and back.
//!
//! Batches are resolved into plain `Vec`s (possibly on a loader thread) and
//! only become tensors here, on the consumer's device.

use burn::prelude::*;
use burn::tensor::TensorData;
use tabular::ResolvedBatch;

/// One batch of model input on a device.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// `(rows, input_dim)`; categorical cells hold level codes.
    pub features: Tensor<B, 2>,
    /// `(rows, input_dim)`; true where the raw value was missing.
    pub missing_mask: Tensor<B, 2, Bool>,
}

impl<B: Backend> Batch<B> {
    /// Build tensors from a resolved batch.
    ///
    /// # Panics
    /// Panics if the batch buffers do not match `rows * cols`.
    pub fn from_resolved(resolved: &ResolvedBatch, device: &B::Device) -> Self {
        let shape = [resolved.rows, resolved.cols];
        assert_eq!(resolved.features.len(), resolved.rows * resolved.cols, "features buffer size");
        assert_eq!(resolved.missing.len(), resolved.rows * resolved.cols, "missing buffer size");
        let features = Tensor::from_data(TensorData::new(resolved.features.clone(), shape), device);
        let missing_mask = Tensor::from_data(TensorData::new(resolved.missing.clone(), shape), device);
        Self { features, missing_mask }
    }

    pub fn num_rows(&self) -> usize {
        self.features.dims()[0]
    }
}

/// Extract f64 values from a burn tensor of any rank, row-major.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor.into_data().iter::<f32>().map(|v| v as f64).collect()
}

/// Extract a single f64 scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use tabular::{BatchResolver, Column, DefaultResolver, TabularDataset};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_from_resolved_shapes_and_values() {
        let ds = TabularDataset::new(vec![
            Column::numeric("a", vec![Some(1.0), None]),
            Column::numeric("b", vec![Some(3.0), Some(4.0)]),
        ])
        .unwrap();
        let resolved = DefaultResolver.resolve(&ds, &[0, 1]).unwrap();
        let device = Default::default();
        let batch = Batch::<TestBackend>::from_resolved(&resolved, &device);

        assert_eq!(batch.features.dims(), [2, 2]);
        assert_eq!(batch.missing_mask.dims(), [2, 2]);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(tensor_to_vec(batch.features), vec![1.0, 3.0, 0.0, 4.0]);

        let missing: Vec<bool> = batch.missing_mask.into_data().to_vec().unwrap();
        assert_eq!(missing, vec![false, false, true, false]);
    }
}
