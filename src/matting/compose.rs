use image::{GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use ndarray::Array2;

/// Terminal artifact of one inference request: the source pixels with the
/// computed matte as alpha, plus the standalone matte itself.
pub struct CutoutResult {
    pub image: RgbaImage,
    pub matte: GrayImage,
}

/// Resize a saliency map to the source image's resolution and merge it in
/// as the alpha channel. Any alpha the source carried was already dropped
/// during preprocessing; the output alpha is the fresh matte, nothing else.
pub fn composite(source: &RgbImage, saliency: &Array2<f32>) -> CutoutResult {
    let _span = tracing::debug_span!("composite").entered();

    let (width, height) = source.dimensions();
    let resized = resize_bilinear_aligned(saliency, width, height);
    let matte = quantize(&resized);

    let image = RgbaImage::from_fn(width, height, |x, y| {
        let rgb = source.get_pixel(x, y);
        let alpha = matte.get_pixel(x, y)[0];
        Rgba([rgb[0], rgb[1], rgb[2], alpha])
    });

    CutoutResult { image, matte }
}

/// Bilinear resize with aligned corners: output corner samples map exactly
/// onto input corner samples. The alignment mode must match the model's
/// training-time interpolation; half-pixel alignment produces a visibly
/// shifted matte at subject edges.
fn resize_bilinear_aligned(map: &Array2<f32>, width: u32, height: u32) -> Array2<f32> {
    let (in_h, in_w) = map.dim();
    let out_h = height as usize;
    let out_w = width as usize;

    if (in_h, in_w) == (out_h, out_w) {
        return map.clone();
    }

    let scale_y = if out_h > 1 {
        (in_h - 1) as f32 / (out_h - 1) as f32
    } else {
        0.0
    };
    let scale_x = if out_w > 1 {
        (in_w - 1) as f32 / (out_w - 1) as f32
    } else {
        0.0
    };

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let src_y = y as f32 * scale_y;
        let src_x = x as f32 * scale_x;
        let y0 = src_y.floor() as usize;
        let x0 = src_x.floor() as usize;
        let y1 = (y0 + 1).min(in_h - 1);
        let x1 = (x0 + 1).min(in_w - 1);
        let dy = src_y - y0 as f32;
        let dx = src_x - x0 as f32;

        let top = map[[y0, x0]] * (1.0 - dx) + map[[y0, x1]] * dx;
        let bottom = map[[y1, x0]] * (1.0 - dx) + map[[y1, x1]] * dx;
        top * (1.0 - dy) + bottom * dy
    })
}

/// Quantize a [0, 1] saliency map to an 8-bit grayscale matte
fn quantize(map: &Array2<f32>) -> GrayImage {
    let (h, w) = map.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let value = (map[[y as usize, x as usize]] * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8;
        Luma([value])
    })
}
