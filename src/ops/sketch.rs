// ============================================================================
// SKETCH PIPELINE - photo -> paintable outline template
// ============================================================================

use std::borrow::Cow;

use image::RgbaImage;
use tracing::debug;

use crate::ops::effects::{OutlineStrategy, extract_outline};
use crate::ops::filters::{gaussian_blur, grayscale};
use crate::settings::AppSettings;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SketchOptions {
    /// Soften the photo with the 3×3 Gaussian before reducing it.
    pub blur: bool,
    pub strategy: OutlineStrategy,
}

impl Default for SketchOptions {
    fn default() -> Self {
        Self {
            blur: true,
            strategy: OutlineStrategy::default(),
        }
    }
}

impl SketchOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            blur: settings.blur_before_outline,
            strategy: settings.outline_strategy,
        }
    }
}

/// Blur (optional) → grayscale → outline.
pub fn build_sketch(photo: &RgbaImage, options: &SketchOptions) -> RgbaImage {
    debug!(
        width = photo.width(),
        height = photo.height(),
        blur = options.blur,
        strategy = options.strategy.name(),
        threshold = options.strategy.threshold(),
        "building sketch"
    );
    let softened: Cow<'_, RgbaImage> = if options.blur {
        Cow::Owned(gaussian_blur(photo))
    } else {
        Cow::Borrowed(photo)
    };
    let gray = grayscale(&softened);
    extract_outline(&gray, options.strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn split_photo() -> RgbaImage {
        // Left half dark red, right half light blue.
        RgbaImage::from_fn(10, 6, |x, _| {
            if x < 5 {
                Rgba([120, 10, 10, 255])
            } else {
                Rgba([150, 200, 255, 255])
            }
        })
    }

    #[test]
    fn sketch_matches_photo_dimensions() {
        let photo = split_photo();
        let sketch = build_sketch(&photo, &SketchOptions::default());
        assert_eq!(sketch.dimensions(), photo.dimensions());
    }

    #[test]
    fn sketch_draws_line_at_region_boundary() {
        let photo = split_photo();
        let options = SketchOptions {
            blur: false,
            strategy: OutlineStrategy::color_difference(),
        };
        let sketch = build_sketch(&photo, &options);
        // Luma 43 vs 191: boundary pixel on the left side is a line.
        assert_eq!(sketch.get_pixel(4, 3), &Rgba([0, 0, 0, 255]));
        assert_eq!(sketch.get_pixel(1, 3), &Rgba([255, 255, 255, 255]));
        assert_eq!(sketch.get_pixel(8, 3), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn options_follow_settings() {
        let mut settings = AppSettings::default();
        settings.outline_strategy = OutlineStrategy::laplacian().with_threshold(99.0);
        settings.blur_before_outline = false;
        let options = SketchOptions::from_settings(&settings);
        assert!(!options.blur);
        assert_eq!(options.strategy.name(), "laplacian");
        assert_eq!(options.strategy.threshold(), 99.0);
    }
}
