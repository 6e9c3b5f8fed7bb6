use image::{imageops, DynamicImage, RgbImage};
use ndarray::Array4;

/// ImageNet channel statistics. These are part of the model's trained
/// contract and must not be made configurable: weights were fitted against
/// inputs normalized with exactly these values.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Flatten any decoded image down to RGB.
///
/// An existing alpha (or luma-alpha) channel is discarded outright, never
/// blended in. Skipping this step would silently change the model's input
/// statistics for RGBA sources.
pub fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    image.to_rgb8()
}

/// Preprocess an RGB image into a normalized NCHW tensor
///
/// Steps:
/// 1. Resize to box_size x box_size (square, aspect distorted)
/// 2. Normalize each channel with the ImageNet mean/std
/// 3. Transpose from HWC to NCHW format
///
/// The resize uses the bilinear (Triangle) filter. The filter is fixed:
/// model weights are interpolation-sensitive, so it must match the
/// training-time transform.
///
/// Returns: Array4<f32> with shape [1, 3, box_size, box_size]
pub fn to_model_input(image: &RgbImage, box_size: u32) -> Array4<f32> {
    let _span = tracing::debug_span!("preprocess").entered();

    let resized = if image.dimensions() != (box_size, box_size) {
        imageops::resize(image, box_size, box_size, imageops::FilterType::Triangle)
    } else {
        image.clone()
    };

    let edge = box_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, edge, edge));

    for y in 0..box_size {
        for x in 0..box_size {
            let pixel = resized.get_pixel(x, y);
            for c in 0..3 {
                let value = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
                tensor[[0, c, y as usize, x as usize]] = value;
            }
        }
    }

    tensor
}
