use super::{Device, MattingModel};
use crate::error::{LoadError, RunError};
use ndarray::{Array2, Array4, Ix4};
use ort::{CUDAExecutionProvider, GraphOptimizationLevel, Session};
use std::path::Path;

/// BiRefNet saliency model loaded from an ONNX file
///
/// The network emits one prediction per refinement stage; later stages
/// refine earlier ones, so only the last output is consumed.
pub struct BiRefNet {
    session: Session,
    device: Device,
}

impl BiRefNet {
    /// Deserialize the model graph and place it on the requested device
    ///
    /// ONNX sessions carry no training-time state: inference runs without
    /// gradient tracking or stochastic layers by construction.
    pub fn load(path: &Path, device: Device) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        tracing::info!("Loading matting model from {}", path.display());

        let mut builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .map_err(corrupt)?;

        if device == Device::Cuda {
            tracing::info!("Registering CUDA execution provider");
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(corrupt)?;
        }

        let session = builder.commit_from_file(path).map_err(corrupt)?;

        tracing::info!("Matting model loaded on {:?}", device);

        Ok(Self { session, device })
    }
}

fn corrupt(err: ort::Error) -> LoadError {
    LoadError::CorruptWeights(err.to_string())
}

fn infer(err: ort::Error) -> RunError {
    RunError::InferenceFailed(err.to_string())
}

impl MattingModel for BiRefNet {
    fn forward(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, RunError> {
        let _span = tracing::debug_span!("forward").entered();

        // Later refinement stages are authoritative; keep only the last head
        let last = self.session.outputs.len() - 1;

        let outputs = self
            .session
            .run(ort::inputs![input.view()].map_err(infer)?)
            .map_err(infer)?;

        let logits = outputs[last]
            .try_extract_tensor::<f32>()
            .map_err(infer)?
            .view()
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| RunError::InferenceFailed(format!("unexpected output shape: {e}")))?;

        // Squash logits to [0, 1] and drop the [1, 1, S, S] singleton axes
        let (_, _, h, w) = logits.dim();
        logits
            .mapv(|x| 1.0 / (1.0 + (-x).exp()))
            .into_shape((h, w))
            .map_err(|e| RunError::InferenceFailed(format!("unexpected output shape: {e}")))
    }

    fn device(&self) -> Device {
        self.device
    }
}
