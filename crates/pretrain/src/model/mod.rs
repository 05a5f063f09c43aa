//! Network side of pretraining: the collaborator contract the trainer drives,
//! a reference masked autoencoder, and the host-buffer to tensor bridge.

pub mod autoencoder;
pub mod bridge;
pub mod network;
