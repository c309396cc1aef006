// ============================================================================
// OUTLINE EFFECTS - binary black/white line extraction
// ============================================================================
//
// Two interchangeable strategies turn a (usually blurred + grayscaled) photo
// into a line drawing:
//   - Color difference: mark a pixel when its right or bottom neighbour is
//     further than `threshold` away in RGB space.
//   - Laplacian: amplified second-derivative response of the luminance.
// Both are pure functions of (input, parameters) and return a fully opaque
// raster of the same size as the input.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::filters::{ConvolutionKernel, luminance};

pub const DEFAULT_COLOR_DIFFERENCE_THRESHOLD: f32 = 30.0;
pub const DEFAULT_LAPLACIAN_THRESHOLD: f32 = 150.0;
pub const DEFAULT_LAPLACIAN_AMPLIFICATION: f32 = 8.0;

const LINE: [u8; 4] = [0, 0, 0, 255];
const PAPER: [u8; 4] = [255, 255, 255, 255];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutlineStrategy {
    ColorDifference { threshold: f32 },
    Laplacian { threshold: f32, amplification: f32 },
}

impl Default for OutlineStrategy {
    fn default() -> Self {
        Self::color_difference()
    }
}

impl OutlineStrategy {
    pub fn color_difference() -> Self {
        Self::ColorDifference {
            threshold: DEFAULT_COLOR_DIFFERENCE_THRESHOLD,
        }
    }

    pub fn laplacian() -> Self {
        Self::Laplacian {
            threshold: DEFAULT_LAPLACIAN_THRESHOLD,
            amplification: DEFAULT_LAPLACIAN_AMPLIFICATION,
        }
    }

    /// Parse a strategy name (`color-difference` / `laplacian`) with default parameters.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "color-difference" | "color_difference" | "colordifference" | "color" => {
                Some(Self::color_difference())
            }
            "laplacian" | "edge" => Some(Self::laplacian()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorDifference { .. } => "color-difference",
            Self::Laplacian { .. } => "laplacian",
        }
    }

    pub fn threshold(&self) -> f32 {
        match *self {
            Self::ColorDifference { threshold } | Self::Laplacian { threshold, .. } => threshold,
        }
    }

    pub fn with_threshold(self, threshold: f32) -> Self {
        match self {
            Self::ColorDifference { .. } => Self::ColorDifference { threshold },
            Self::Laplacian { amplification, .. } => Self::Laplacian {
                threshold,
                amplification,
            },
        }
    }
}

/// Run the selected outline strategy.
pub fn extract_outline(src: &RgbaImage, strategy: OutlineStrategy) -> RgbaImage {
    match strategy {
        OutlineStrategy::ColorDifference { threshold } => color_difference_outline(src, threshold),
        OutlineStrategy::Laplacian {
            threshold,
            amplification,
        } => laplacian_outline(src, threshold, amplification),
    }
}

/// Euclidean distance between two RGB triples.
#[inline]
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let dr = a[0] as f32 - b[0] as f32;
    let dg = a[1] as f32 - b[1] as f32;
    let db = a[2] as f32 - b[2] as f32;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Shared driver: `is_line(x, y)` decides each output pixel, rows in parallel.
fn binary_map<F>(w: usize, h: usize, is_line: F) -> RgbaImage
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let mut out = RgbaImage::new(w as u32, h as u32);
    if w == 0 || h == 0 {
        return out;
    }
    let stride = w * 4;
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let pi = x * 4;
            let px = if is_line(x, y) { LINE } else { PAPER };
            row_out[pi..pi + 4].copy_from_slice(&px);
        }
    });
    out
}

/// Neighbour colour-distance outline. A pixel becomes a line when its right
/// or bottom neighbour differs by more than `threshold`; the last column and
/// row only test the neighbour that exists.
pub fn color_difference_outline(src: &RgbaImage, threshold: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let raw = src.as_raw();
    let stride = w * 4;

    let rgb = |x: usize, y: usize| -> [u8; 3] {
        let i = y * stride + x * 4;
        [raw[i], raw[i + 1], raw[i + 2]]
    };

    binary_map(w, h, |x, y| {
        let here = rgb(x, y);
        (x + 1 < w && color_distance(here, rgb(x + 1, y)) > threshold)
            || (y + 1 < h && color_distance(here, rgb(x, y + 1)) > threshold)
    })
}

/// Amplified Laplacian outline over inline luminance.
///
/// Out-of-bounds taps are skipped exactly like [`crate::ops::filters::convolve`],
/// so flat regions touching the border still produce a response there.
pub fn laplacian_outline(src: &RgbaImage, threshold: f32, amplification: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let raw = src.as_raw();
    let stride = w * 4;
    let kernel = ConvolutionKernel::laplacian();
    let size = kernel.size();
    let half = kernel.radius() as isize;

    binary_map(w, h, |x, y| {
        let mut response = 0.0f64;
        for ky in 0..size {
            let py = y as isize + ky as isize - half;
            if py < 0 || py >= h as isize {
                continue;
            }
            for kx in 0..size {
                let px = x as isize + kx as isize - half;
                if px < 0 || px >= w as isize {
                    continue;
                }
                let i = py as usize * stride + px as usize * 4;
                response += luminance(raw[i], raw[i + 1], raw[i + 2]) * kernel.at(kx, ky) as f64;
            }
        }
        (response * amplification as f64).abs() > threshold as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const BLACK: Rgba<u8> = Rgba(LINE);
    const WHITE: Rgba<u8> = Rgba(PAPER);

    #[test]
    fn two_pixel_step_marks_left_pixel_only() {
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        src.put_pixel(1, 0, Rgba([50, 50, 50, 255]));

        let out = color_difference_outline(&src, 30.0);
        // sqrt(3 * 50^2) ~= 86.6 > 30
        assert_eq!(out.get_pixel(0, 0), &BLACK);
        // Last column, single row: no neighbour to compare against.
        assert_eq!(out.get_pixel(1, 0), &WHITE);
    }

    #[test]
    fn threshold_is_strict() {
        let mut src = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        src.put_pixel(1, 0, Rgba([30, 0, 0, 255]));
        let out = color_difference_outline(&src, 30.0);
        assert_eq!(out.get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn bottom_neighbour_is_tested() {
        let mut src = RgbaImage::from_pixel(1, 2, Rgba([255, 255, 255, 255]));
        src.put_pixel(0, 1, Rgba([0, 0, 0, 255]));
        let out = color_difference_outline(&src, 30.0);
        assert_eq!(out.get_pixel(0, 0), &BLACK);
        assert_eq!(out.get_pixel(0, 1), &WHITE);
    }

    #[test]
    fn flat_image_has_no_color_difference_lines() {
        let src = RgbaImage::from_pixel(8, 8, Rgba([120, 80, 40, 10]));
        let out = color_difference_outline(&src, DEFAULT_COLOR_DIFFERENCE_THRESHOLD);
        assert!(out.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn laplacian_flat_interior_is_white_but_border_responds() {
        let src = RgbaImage::from_pixel(5, 5, Rgba([128, 128, 128, 255]));
        let out = laplacian_outline(&src, DEFAULT_LAPLACIAN_THRESHOLD, DEFAULT_LAPLACIAN_AMPLIFICATION);

        for y in 1..4 {
            for x in 1..4 {
                assert_eq!(out.get_pixel(x, y), &WHITE, "interior ({x},{y})");
            }
        }
        // Corner response: (-4 + 2) * 128 * 8 = -2048, well past 150.
        assert_eq!(out.get_pixel(0, 0), &BLACK);
        assert_eq!(out.get_pixel(2, 0), &BLACK);
    }

    #[test]
    fn laplacian_detects_isolated_dot() {
        let mut src = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 255]));
        src.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let out = laplacian_outline(&src, DEFAULT_LAPLACIAN_THRESHOLD, DEFAULT_LAPLACIAN_AMPLIFICATION);
        assert_eq!(out.get_pixel(2, 2), &BLACK);
        assert_eq!(out.get_pixel(2, 1), &BLACK);
        assert_eq!(out.get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn outputs_are_fully_opaque_and_same_size() {
        let src = RgbaImage::from_fn(9, 4, |x, y| Rgba([(x * 30) as u8, (y * 60) as u8, 0, 0]));
        for strategy in [OutlineStrategy::color_difference(), OutlineStrategy::laplacian()] {
            let out = extract_outline(&src, strategy);
            assert_eq!(out.dimensions(), src.dimensions());
            assert!(out.pixels().all(|p| *p == BLACK || *p == WHITE));
        }
    }

    #[test]
    fn strategy_names_round_trip() {
        for s in [OutlineStrategy::color_difference(), OutlineStrategy::laplacian()] {
            assert_eq!(OutlineStrategy::parse(s.name()), Some(s));
        }
        assert_eq!(OutlineStrategy::parse("sobel"), None);
        let custom = OutlineStrategy::laplacian().with_threshold(90.0);
        assert_eq!(custom.threshold(), 90.0);
        assert!(matches!(custom, OutlineStrategy::Laplacian { amplification, .. } if amplification == 8.0));
    }
}
