//! Encoder abstraction.

use super::Adam;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maps a `[T × F]` window to a fixed-width representation.
///
/// Implementations own their weights and know how to backpropagate through
/// their own forward pass. `Cache` carries whatever the backward pass needs;
/// `Gradients` accumulates over a mini-batch before one optimizer step.
pub trait SequenceEncoder: Clone + Send + Sync + Serialize + DeserializeOwned {
    /// Forward-pass state kept for the backward pass.
    type Cache;

    /// Accumulated parameter gradients.
    type Gradients;

    /// Features per time step.
    fn input_size(&self) -> usize;

    /// Width of the encoded representation.
    fn output_size(&self) -> usize;

    /// Encode a window (inference path, nothing cached).
    fn encode(&self, input: ArrayView2<'_, f64>) -> Array1<f64>;

    /// Encode a window and keep what the backward pass needs.
    fn encode_with_cache(&self, input: ArrayView2<'_, f64>) -> (Array1<f64>, Self::Cache);

    /// Zeroed gradient accumulator.
    fn zero_gradients(&self) -> Self::Gradients;

    /// Add the gradients of one window to `grads`, given `dL/d(output)`.
    fn backward(
        &self,
        cache: &Self::Cache,
        grad_output: ArrayView1<'_, f64>,
        grads: &mut Self::Gradients,
    );

    /// Apply accumulated gradients, scaled by `scale`, using optimizer slots
    /// starting at `first_slot`. Returns the next free slot.
    fn apply_gradients(
        &mut self,
        grads: &Self::Gradients,
        scale: f64,
        optimizer: &mut Adam,
        first_slot: usize,
    ) -> usize;

    /// Number of trainable scalars.
    fn parameter_count(&self) -> usize;
}
