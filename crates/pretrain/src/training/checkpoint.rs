//! In-memory checkpoints of network weights.
//!
//! Weights are serialised with burn's named MessagePack recorder, so a
//! checkpoint is independent of the device the network trained on and can be
//! written to disk as-is.

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};

use crate::error::{PretrainError, Result};

/// Serialised network weights captured at the end of an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    epoch: usize,
    bytes: Vec<u8>,
}

impl Checkpoint {
    /// Serialise `network`'s current weights.
    ///
    /// The trainer moves the network to the CPU device first, so stored
    /// weights never reference accelerator memory.
    pub fn capture<B: Backend, M: Module<B>>(network: &M, epoch: usize) -> Result<Self> {
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::new();
        let bytes = <NamedMpkBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
            &recorder,
            network.clone().into_record(),
            (),
        )
        .map_err(|e| PretrainError::Checkpoint(format!("failed to record epoch {epoch}: {e}")))?;
        Ok(Self { epoch, bytes })
    }

    /// Load these weights into `template` (a network of the same shape).
    pub fn restore<B: Backend, M: Module<B>>(&self, template: M, device: &B::Device) -> Result<M> {
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::new();
        let record = <NamedMpkBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load(
            &recorder,
            self.bytes.clone(),
            device,
        )
        .map_err(|e| PretrainError::Checkpoint(format!("failed to load epoch {}: {e}", self.epoch)))?;
        Ok(template.load_record(record))
    }

    /// Epoch (1-based) after which the weights were captured.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Checkpoints of one run, in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoints {
    items: Vec<Checkpoint>,
}

impl Checkpoints {
    pub(crate) fn push(&mut self, checkpoint: Checkpoint) {
        self.items.push(checkpoint);
    }

    /// Drop anything captured after `epoch` began. Used when that epoch is
    /// cancelled.
    pub(crate) fn discard_from(&mut self, epoch: usize) {
        self.items.retain(|c| c.epoch < epoch);
    }

    /// The `index`-th checkpoint, 1-based.
    pub fn get(&self, index: usize) -> Result<&Checkpoint> {
        index
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .ok_or(PretrainError::CheckpointIndex {
                index,
                count: self.items.len(),
            })
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.items.iter()
    }
}
