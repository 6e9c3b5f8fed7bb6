use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading a model artifact.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The weights file is missing or unreadable.
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    /// The weights file exists but could not be deserialized into the
    /// expected network graph.
    #[error("model weights could not be deserialized: {0}")]
    CorruptWeights(String),
}

/// Errors from a single inference request.
///
/// None of these unload or corrupt the model handle; the caller decides
/// whether to resubmit, reload, or give up.
#[derive(Debug, Error)]
pub enum RunError {
    /// Inference requested before any successful load.
    #[error("no model loaded")]
    NotLoaded,

    /// The request bytes do not decode to a raster image.
    #[error("input does not decode to an image: {0}")]
    InvalidImage(#[from] image::ImageError),

    /// Box size outside the accepted range.
    #[error("box size {0} is outside 1..={}", crate::matting::MAX_BOX_SIZE)]
    InvalidBoxSize(u32),

    /// The forward pass itself failed (e.g. resource exhaustion).
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
