// Face region preparation ahead of classification

use image::{imageops::FilterType, RgbImage};

use crate::config::PipelineConfig;
use crate::models::ImageRegion;

/// Upscales small regions and applies contrast/brightness normalization
pub fn prepare_region(region: ImageRegion, config: &PipelineConfig) -> RgbImage {
    let pixels = region.into_pixels();
    let mut pixels = if pixels.width() < config.min_region_size
        || pixels.height() < config.min_region_size
    {
        image::imageops::resize(
            &pixels,
            config.upscale_size,
            config.upscale_size,
            FilterType::Triangle,
        )
    } else {
        pixels
    };

    scale_abs(&mut pixels, config.contrast_alpha, config.brightness_beta);
    pixels
}

/// `|alpha * p + beta|`, saturated to the 8-bit range
fn scale_abs(pixels: &mut RgbImage, alpha: f32, beta: f32) {
    for value in pixels.iter_mut() {
        let scaled = (alpha * *value as f32 + beta).abs().round();
        *value = scaled.min(255.0) as u8;
    }
}
