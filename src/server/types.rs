use serde::{Deserialize, Serialize};

/// Body of POST /load_model
#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_path: String,
    /// Place the model on the CUDA execution provider
    #[serde(default)]
    pub is_cuda: bool,
}

/// Body of POST /run_model
#[derive(Debug, Deserialize)]
pub struct RunModelRequest {
    /// Base64-encoded source image (any decodable raster format)
    pub input_image_base64: String,
    /// Intermediate square resize edge the model sees
    pub box_size: u32,
    /// Stem to persist results under: writes <stem>.png and <stem>_mask.png.
    /// When absent, both artifacts come back inline as base64 PNG.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct RunModelResponse {
    pub success: bool,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_base64: Option<String>,
}
