use super::response::{json_error, json_response};
use super::types::{LoadModelRequest, LoadModelResponse, RunModelRequest, RunModelResponse};
use crate::error::{LoadError, RunError};
use crate::manager::ModelManager;
use crate::matting::{CutoutResult, Device};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hyper::{Body, Request, Response, StatusCode};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

pub async fn health() -> Response<Body> {
    // Liveness only; never takes the model lock, so a probe cannot queue
    // behind a long inference
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

pub async fn load_model(req: Request<Body>, manager: Arc<ModelManager>) -> Response<Body> {
    let body: LoadModelRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    let device = if body.is_cuda { Device::Cuda } else { Device::Cpu };
    tracing::info!("load_model: {} ({:?})", body.model_path, device);

    let result =
        tokio::task::spawn_blocking(move || manager.load(Path::new(&body.model_path), device))
            .await;

    match result {
        Ok(Ok(())) => json_response(StatusCode::OK, &LoadModelResponse { success: true }),
        Ok(Err(err)) => json_error(load_status(&err), &err.to_string()),
        Err(join_err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("load task failed: {join_err}"),
        ),
    }
}

pub async fn run_model(req: Request<Body>, manager: Arc<ModelManager>) -> Response<Body> {
    let body: RunModelRequest = match read_json(req).await {
        Ok(body) => body,
        Err(resp) => return resp,
    };

    // Validate everything the request could get wrong before the model lock
    // is in play: box bounds, base64 framing, image decode
    if let Err(err) = ModelManager::validate_box_size(body.box_size) {
        return json_error(run_status(&err), &err.to_string());
    }

    let bytes = match BASE64.decode(body.input_image_base64.as_bytes()) {
        Ok(bytes) => bytes,
        Err(err) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("input is not valid base64: {err}"),
            )
        }
    };

    let image = match image::load_from_memory(&bytes) {
        Ok(image) => image,
        Err(err) => {
            let err = RunError::InvalidImage(err);
            return json_error(run_status(&err), &err.to_string());
        }
    };

    let box_size = body.box_size;
    let output_path = body.output_path;
    let result = tokio::task::spawn_blocking(move || {
        let cutout = manager
            .run(&image, box_size)
            .map_err(|err| (run_status(&err), err.to_string()))?;
        build_run_response(cutout, output_path)
    })
    .await;

    match result {
        Ok(Ok(resp)) => json_response(StatusCode::OK, &resp),
        Ok(Err((status, message))) => json_error(status, &message),
        Err(join_err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("inference task failed: {join_err}"),
        ),
    }
}

/// Persist or inline the two artifacts of a finished run.
fn build_run_response(
    cutout: CutoutResult,
    output_path: Option<String>,
) -> Result<RunModelResponse, (StatusCode, String)> {
    let (width, height) = cutout.image.dimensions();
    let composite = DynamicImage::ImageRgba8(cutout.image);
    let matte = DynamicImage::ImageLuma8(cutout.matte);

    match output_path {
        Some(stem) => {
            let image_path = format!("{stem}.png");
            let mask_path = format!("{stem}_mask.png");
            composite
                .save(&image_path)
                .map_err(|e| write_error(&image_path, &e))?;
            matte
                .save(&mask_path)
                .map_err(|e| write_error(&mask_path, &e))?;
            tracing::info!("Wrote {} and {}", image_path, mask_path);
            Ok(RunModelResponse {
                success: true,
                width,
                height,
                output_path: Some(image_path),
                mask_path: Some(mask_path),
                image_base64: None,
                mask_base64: None,
            })
        }
        None => Ok(RunModelResponse {
            success: true,
            width,
            height,
            output_path: None,
            mask_path: None,
            image_base64: Some(png_base64(&composite)?),
            mask_base64: Some(png_base64(&matte)?),
        }),
    }
}

fn write_error(path: &str, err: &image::ImageError) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("failed to write {path}: {err}"),
    )
}

fn png_base64(image: &DynamicImage) -> Result<String, (StatusCode, String)> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode png: {e}"),
            )
        })?;
    Ok(BASE64.encode(buf))
}

async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &format!("invalid request: {e}")))
}

fn load_status(err: &LoadError) -> StatusCode {
    match err {
        LoadError::NotFound(_) => StatusCode::NOT_FOUND,
        LoadError::CorruptWeights(_) => StatusCode::BAD_REQUEST,
    }
}

fn run_status(err: &RunError) -> StatusCode {
    match err {
        RunError::NotLoaded => StatusCode::CONFLICT,
        RunError::InvalidImage(_) | RunError::InvalidBoxSize(_) => StatusCode::BAD_REQUEST,
        RunError::InferenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
