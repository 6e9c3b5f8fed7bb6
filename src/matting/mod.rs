mod birefnet;
mod compose;
mod preprocess;

pub use birefnet::BiRefNet;
pub use compose::{composite, CutoutResult};
pub use preprocess::{flatten_to_rgb, to_model_input};

use crate::error::{LoadError, RunError};
use ndarray::{Array2, Array4};
use std::path::Path;

/// Largest accepted intermediate box size. A 4096x4096 input tensor is
/// roughly 200 MB of f32, the practical ceiling for a CPU-resident sidecar.
pub const MAX_BOX_SIZE: u32 = 4096;

/// Compute placement for a loaded model. Chosen once at load time and
/// read-only until the next load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

/// Trait for saliency matting models
/// Allows swapping between backends (BiRefNet variants, test doubles)
pub trait MattingModel: Send {
    /// Run one forward pass over a preprocessed input
    ///
    /// # Arguments
    /// * `input` - Normalized NCHW tensor of shape [1, 3, S, S]
    ///
    /// # Returns
    /// * Saliency map of shape S x S with values squashed to 0.0-1.0
    fn forward(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, RunError>;

    /// The compute placement the model was loaded with
    fn device(&self) -> Device;
}

/// Create the default matting model backend (BiRefNet) from an ONNX file
pub fn load_model(path: &Path, device: Device) -> Result<Box<dyn MattingModel>, LoadError> {
    let model = BiRefNet::load(path, device)?;
    Ok(Box::new(model))
}
