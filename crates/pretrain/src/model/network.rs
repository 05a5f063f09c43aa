use burn::prelude::*;

/// Output of one pretraining forward pass.
///
/// All three tensors share the shape `(batch, embedded_dim)`.
#[derive(Debug, Clone)]
pub struct NetworkOutput<B: Backend> {
    /// Network's reconstruction of the embedded input.
    pub reconstruction: Tensor<B, 2>,
    /// Embedded input the reconstruction is compared against.
    pub embedded: Tensor<B, 2>,
    /// True where a value was hidden from the network for this pass.
    pub obfuscation: Tensor<B, 2, Bool>,
}

/// A network that can be pretrained by masked reconstruction.
///
/// Train/eval mode follows burn's convention: the autodiff module is the
/// training network and `AutodiffModule::valid()` yields the evaluation one.
/// Device moves go through `Module::fork` / `Module::to_device`.
pub trait PretrainNetwork<B: Backend>: Module<B> {
    /// Obfuscate part of the input and reconstruct it.
    ///
    /// `features` and `missing_mask` have shape `(batch, input_dim)`.
    fn forward(&self, features: Tensor<B, 2>, missing_mask: Tensor<B, 2, Bool>) -> NetworkOutput<B>;
}
