//! Optimizer selection and global gradient-norm clipping.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{PretrainError, Result};

/// Object-safe view of a burn [`Optimizer`], so the trainer can hold any of
/// them behind a `Box`.
pub trait PretrainOptimizer<M, B>: Send
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M;
}

impl<M, B, O> PretrainOptimizer<M, B> for O
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
    O: Optimizer<M, B>,
{
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        Optimizer::step(self, lr, module, grads)
    }
}

pub type OptimizerFactory<M, B> = Box<dyn FnOnce() -> Box<dyn PretrainOptimizer<M, B>>>;

/// How the trainer obtains its optimizer.
pub enum OptimizerSpec<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// One of `adam`, `adamw`, `sgd` (case-insensitive).
    Named(String),
    /// Caller-supplied constructor.
    Factory(OptimizerFactory<M, B>),
}

impl<M, B> std::fmt::Debug for OptimizerSpec<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "Named({name:?})"),
            Self::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

impl<M, B> OptimizerSpec<M, B>
where
    M: AutodiffModule<B> + 'static,
    B: AutodiffBackend,
{
    /// Build the optimizer. Unknown names fail with
    /// [`PretrainError::UnsupportedOptimizer`].
    pub fn build(self) -> Result<Box<dyn PretrainOptimizer<M, B>>> {
        match self {
            Self::Factory(factory) => Ok(factory()),
            Self::Named(name) => match name.to_ascii_lowercase().as_str() {
                "adam" => Ok(Box::new(AdamConfig::new().init::<B, M>())),
                "adamw" => Ok(Box::new(AdamWConfig::new().init::<B, M>())),
                "sgd" => Ok(Box::new(SgdConfig::new().init::<B, M>())),
                _ => Err(PretrainError::UnsupportedOptimizer(name)),
            },
        }
    }
}

/// Sums squared gradient entries over every float parameter of a module.
struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum_squares: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let sq: f64 = grad.powf_scalar(2.0).sum().into_scalar().elem();
            self.sum_squares += sq;
        }
    }
}

/// Multiplies every gradient by a constant.
struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm of all gradients of `module`, taken as one vector.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradNormVisitor::<B> {
        grads,
        sum_squares: 0.0,
        _backend: PhantomData,
    };
    module.visit(&mut visitor);
    visitor.sum_squares.sqrt()
}

/// Rescale gradients so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, grads);
    if norm.is_finite() && norm > max_norm {
        let mut visitor = GradScaleVisitor::<B> {
            grads,
            scale: max_norm / (norm + 1e-6),
            _backend: PhantomData,
        };
        module.visit(&mut visitor);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::autoencoder::{TabularAutoencoder, TabularAutoencoderConfig};
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;
    type Model = TabularAutoencoder<TestAutodiffBackend>;

    fn model_and_grads() -> (Model, GradientsParams) {
        let device = Default::default();
        let model = TabularAutoencoderConfig::new(4)
            .with_n_hidden(6)
            .with_pretraining_ratio(1.0)
            .init::<TestAutodiffBackend>(&device);
        let x = Tensor::<TestAutodiffBackend, 2>::random([5, 4], Distribution::Normal(0.0, 3.0), &device);
        let missing = x.clone().greater_elem(100.0);
        let out = model.forward(x, missing);
        let loss = (out.reconstruction - out.embedded).powf_scalar(2.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_build_named_optimizers() {
        for name in ["adam", "AdamW", "sgd"] {
            assert!(
                OptimizerSpec::<Model, TestAutodiffBackend>::Named(name.into()).build().is_ok(),
                "{name} should be supported"
            );
        }
    }

    #[test]
    fn test_unknown_optimizer_rejected() {
        let err = OptimizerSpec::<Model, TestAutodiffBackend>::Named("lbfgs".into())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PretrainError::UnsupportedOptimizer(name) if name == "lbfgs"));
    }

    #[test]
    fn test_clip_bounds_global_norm() {
        let (model, mut grads) = model_and_grads();
        let before = global_grad_norm::<TestAutodiffBackend, _>(&model, &grads);
        assert!(before > 0.01, "test needs a non-trivial gradient, got {before}");

        let max_norm = before / 10.0;
        let reported = clip_grad_norm::<TestAutodiffBackend, _>(&model, &mut grads, max_norm);
        assert!((reported - before).abs() < 1e-9);

        let after = global_grad_norm::<TestAutodiffBackend, _>(&model, &grads);
        assert!(after <= max_norm * 1.001, "after={after}, max={max_norm}");
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let (model, mut grads) = model_and_grads();
        let before = global_grad_norm::<TestAutodiffBackend, _>(&model, &grads);
        clip_grad_norm::<TestAutodiffBackend, _>(&model, &mut grads, before * 2.0);
        let after = global_grad_norm::<TestAutodiffBackend, _>(&model, &grads);
        assert!((after - before).abs() < 1e-4 * before.max(1.0));
    }
}
