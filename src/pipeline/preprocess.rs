//! Image preprocessing: photo → clean two-level image for the OCR engine.
//!
//! Phone photos of notebooks carry sensor noise, paper texture and uneven
//! ink. The recipe is fixed and runs in three pure steps:
//!
//! 1. **Luminance**: collapse colour to a single 8-bit channel.
//! 2. **Denoise**: non-local means: each pixel becomes a weighted average
//!    of pixels whose surrounding patch looks similar, so flat paper is
//!    smoothed while stroke edges survive.
//! 3. **Binarise**: global threshold chosen by Otsu's method (maximises
//!    between-class variance of the histogram).
//!
//! Output dimensions always equal input dimensions.

use crate::error::ImageError;
use image::{DynamicImage, GrayImage, ImageReader, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::integral_image::integral_squared_image;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Non-local-means parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Filter strength `h`. Larger removes more noise and more detail. Default: 30.
    pub strength: f32,
    /// Half-size of the comparison patch (3 → 7×7). Default: 3.
    pub patch_radius: u32,
    /// Half-size of the search window (10 → 21×21). Default: 10.
    pub search_radius: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            strength: 30.0,
            patch_radius: 3,
            search_radius: 10,
        }
    }
}

/// Decode an image file, sniffing the format from its content.
///
/// # Errors
/// [`ImageError::ReadFailed`] when the file is missing, unreadable, corrupt
/// or in a format the decoder does not support.
pub fn load_image(path: &Path) -> Result<DynamicImage, ImageError> {
    let file = display_name(path);
    let read_failed = |detail: String| ImageError::ReadFailed {
        file: file.clone(),
        detail,
    };

    ImageReader::open(path)
        .map_err(|e| read_failed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| read_failed(e.to_string()))?
        .decode()
        .map_err(|e| read_failed(e.to_string()))
}

/// Convert to a single-channel luminance image.
pub fn to_luminance(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Non-local-means denoising on a grayscale image.
///
/// Pixels outside the image are read from the nearest edge pixel when
/// building patches; candidate centres are restricted to the image.
///
/// Patch distances are computed one search offset at a time: the squared
/// difference between the image and its shifted copy is summed over every
/// patch with a single integral image, so the cost per pixel grows with the
/// search window only, not with the patch size.
pub fn denoise_nl_means(img: &GrayImage, params: &DenoiseParams) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let src = img.as_raw();
    let (w, h) = (i64::from(width), i64::from(height));
    let pr = i64::from(params.patch_radius);
    let sr = i64::from(params.search_radius);
    let side = 2 * pr + 1;
    let patch_area = (side * side) as f32;
    let h2 = params.strength * params.strength;

    let at = |x: i64, y: i64| -> u8 {
        let idx = y.clamp(0, h - 1) * w + x.clamp(0, w - 1);
        src[idx as usize]
    };

    let pixels = (width as usize) * (height as usize);
    let mut weight_sum = vec![0.0f32; pixels];
    let mut value_sum = vec![0.0f32; pixels];

    // Row-major offsets, so each pixel accumulates candidates in scan order.
    for dy in -sr..=sr {
        for dx in -sr..=sr {
            let diff = GrayImage::from_fn(
                (w + 2 * pr) as u32,
                (h + 2 * pr) as u32,
                |i, j| {
                    let (x, y) = (i64::from(i) - pr, i64::from(j) - pr);
                    Luma([at(x, y).abs_diff(at(x + dx, y + dy))])
                },
            );
            let sums = integral_squared_image::<_, u64>(&diff);
            let sum_at = |i: i64, j: i64| sums.get_pixel(i as u32, j as u32)[0];

            for y in 0..h {
                let qy = y + dy;
                if qy < 0 || qy >= h {
                    continue;
                }
                for x in 0..w {
                    let qx = x + dx;
                    if qx < 0 || qx >= w {
                        continue;
                    }
                    let ssd = sum_at(x + side, y + side) + sum_at(x, y)
                        - sum_at(x, y + side)
                        - sum_at(x + side, y);
                    let weight = (-(ssd as f32 / patch_area) / h2).exp();
                    let idx = (y * w + x) as usize;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * f32::from(at(qx, qy));
                }
            }
        }
    }

    // The centre pixel always matches itself, so every weight sum is at least 1.
    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y as usize) * (width as usize) + x as usize;
        let value = (value_sum[idx] / weight_sum[idx]).round().clamp(0.0, 255.0);
        Luma([value as u8])
    })
}

/// Global binarisation at the Otsu level: above → 255, otherwise → 0.
pub fn binarize_otsu(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    debug!("Otsu threshold level: {}", level);
    threshold(img, level, ThresholdType::Binary)
}

/// Run the full recipe on a decoded image.
pub fn preprocess(img: &DynamicImage, params: &DenoiseParams) -> GrayImage {
    let gray = to_luminance(img);
    let denoised = denoise_nl_means(&gray, params);
    binarize_otsu(&denoised)
}

/// Decode `path` and run the full recipe.
pub fn preprocess_file(path: &Path, params: &DenoiseParams) -> Result<GrayImage, ImageError> {
    let img = load_image(path)?;
    debug!(
        "Decoded {} ({}×{})",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(preprocess(&img, params))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
