//! Masked reconstruction loss for self-supervised pretraining.
//!
//! Generic over `B: Backend`; the same function scores training and
//! validation batches and drives permutation importance.

use burn::prelude::*;

/// Stabiliser added to per-column variances and per-row hidden counts.
pub const DEFAULT_LOSS_EPS: f64 = 1e-9;

/// Reconstruction error on hidden cells, normalised by column variance.
///
/// ```text
/// errors   = (predicted - embedded) * mask
/// vars     = var_bias(embedded, dim 0) + eps          (1, d)
/// row_loss = (errors² · (1 / vars)ᵀ) / (Σ_j mask + eps)  (batch, 1)
/// loss     = mean(row_loss)
/// ```
///
/// # Arguments
/// - `predicted`: shape `(batch, d)`, network reconstruction
/// - `embedded`: shape `(batch, d)`, reconstruction target
/// - `obfuscation_mask`: shape `(batch, d)`, true on hidden cells
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`. Rows with nothing hidden contribute 0.
pub fn masked_reconstruction_loss<B: Backend>(
    predicted: Tensor<B, 2>,
    embedded: Tensor<B, 2>,
    obfuscation_mask: Tensor<B, 2, Bool>,
    eps: f64,
) -> Tensor<B, 1> {
    let mask = obfuscation_mask.float();

    let errors = (predicted - embedded.clone()) * mask.clone();
    let squared = errors.powf_scalar(2.0); // (batch, d)

    // Population variance of each target column over the batch
    let inv_vars = (embedded.var_bias(0) + eps).recip(); // (1, d)
    let feature_loss = squared.matmul(inv_vars.transpose()); // (batch, 1)

    let n_hidden = mask.sum_dim(1); // (batch, 1)
    let row_loss = feature_loss / (n_hidden + eps);

    row_loss.mean()
}
