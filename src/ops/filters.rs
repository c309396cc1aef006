// ============================================================================
// IMAGE FILTERS - kernel convolution, Gaussian blur, grayscale
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::PaintError;

/// Luminosity weights used by grayscale reduction and the Laplacian outline.
pub const LUMA_R: f64 = 0.299;
pub const LUMA_G: f64 = 0.587;
pub const LUMA_B: f64 = 0.114;

/// Unrounded luminosity of an RGB triple.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64
}

/// Rounded luminosity; halves round up.
#[inline]
pub fn luminance_u8(r: u8, g: u8, b: u8) -> u8 {
    (luminance(r, g, b) + 0.5).floor().clamp(0.0, 255.0) as u8
}

/// Square convolution matrix with an explicit divisor.
///
/// Values are stored row-major. The weight is applied after accumulation and
/// is never adjusted for taps that fall outside the image.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvolutionKernel {
    size: usize,
    values: Vec<f32>,
    weight: f32,
}

impl ConvolutionKernel {
    pub fn new(size: usize, values: Vec<f32>, weight: f32) -> Result<Self, PaintError> {
        if size == 0 || size % 2 == 0 {
            return Err(PaintError::InvalidKernel(format!(
                "side length {} is not odd",
                size
            )));
        }
        if values.len() != size * size {
            return Err(PaintError::InvalidKernel(format!(
                "expected {} values for a {}x{} kernel, got {}",
                size * size,
                size,
                size,
                values.len()
            )));
        }
        // `!(w > 0)` also rejects NaN
        if !(weight > 0.0) {
            return Err(PaintError::InvalidKernel(format!(
                "weight must be positive, got {}",
                weight
            )));
        }
        Ok(Self {
            size,
            values,
            weight,
        })
    }

    /// 3×3 Gaussian approximation, weight 16. The blur used before outlining.
    pub fn gaussian_3x3() -> Self {
        Self {
            size: 3,
            values: vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0],
            weight: 16.0,
        }
    }

    /// 5×5 Gaussian approximation, weight 273.
    pub fn gaussian_5x5() -> Self {
        Self {
            size: 5,
            values: vec![
                1.0, 4.0, 7.0, 4.0, 1.0, //
                4.0, 16.0, 26.0, 16.0, 4.0, //
                7.0, 26.0, 41.0, 26.0, 7.0, //
                4.0, 16.0, 26.0, 16.0, 4.0, //
                1.0, 4.0, 7.0, 4.0, 1.0,
            ],
            weight: 273.0,
        }
    }

    /// 3×3 kernel that reproduces its input.
    pub fn identity() -> Self {
        Self {
            size: 3,
            values: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            weight: 1.0,
        }
    }

    /// Unnormalized 4-neighbour Laplacian.
    pub fn laplacian() -> Self {
        Self {
            size: 3,
            values: vec![0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0],
            weight: 1.0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn at(&self, kx: usize, ky: usize) -> f32 {
        self.values[ky * self.size + kx]
    }
}

#[inline]
fn normalize_channel(sum: f32, weight: f32) -> u8 {
    (sum / weight).round().clamp(0.0, 255.0) as u8
}

/// Convolve the RGB channels of `src` with `kernel`.
///
/// Only in-bounds taps contribute, but the sum is still divided by the full
/// kernel weight, so blur kernels darken the outermost rows and columns.
/// Alpha is copied through untouched.
pub fn convolve(src: &RgbaImage, kernel: &ConvolutionKernel) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let src_raw = src.as_raw();
    let stride = w * 4;
    let size = kernel.size();
    let half = kernel.radius() as isize;
    let weight = kernel.weight();

    let mut out = RgbaImage::new(w as u32, h as u32);
    let dst: &mut [u8] = &mut out;

    dst.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut r = 0.0f32;
            let mut g = 0.0f32;
            let mut b = 0.0f32;

            for ky in 0..size {
                let py = y as isize + ky as isize - half;
                if py < 0 || py >= h as isize {
                    continue;
                }
                let row_off = py as usize * stride;
                for kx in 0..size {
                    let px = x as isize + kx as isize - half;
                    if px < 0 || px >= w as isize {
                        continue;
                    }
                    let kv = kernel.at(kx, ky);
                    let si = row_off + px as usize * 4;
                    r += src_raw[si] as f32 * kv;
                    g += src_raw[si + 1] as f32 * kv;
                    b += src_raw[si + 2] as f32 * kv;
                }
            }

            let pi = x * 4;
            row_out[pi] = normalize_channel(r, weight);
            row_out[pi + 1] = normalize_channel(g, weight);
            row_out[pi + 2] = normalize_channel(b, weight);
            row_out[pi + 3] = src_raw[y * stride + pi + 3];
        }
    });

    out
}

/// 3×3 Gaussian blur with the same border behaviour as [`convolve`].
pub fn gaussian_blur(src: &RgbaImage) -> RgbaImage {
    convolve(src, &ConvolutionKernel::gaussian_3x3())
}

/// Luminosity grayscale: `Y = round(0.299R + 0.587G + 0.114B)`, alpha kept.
pub fn grayscale(src: &RgbaImage) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let src_raw = src.as_raw();
    let stride = w * 4;
    let mut out = RgbaImage::new(w as u32, h as u32);
    let dst: &mut [u8] = &mut out;

    // Parallel by row.
    dst.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let lum = luminance_u8(row_in[pi], row_in[pi + 1], row_in[pi + 2]);
            row_out[pi] = lum;
            row_out[pi + 1] = lum;
            row_out[pi + 2] = lum;
            row_out[pi + 3] = row_in[pi + 3];
        }
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([
                (x * 37 % 256) as u8,
                (y * 53 % 256) as u8,
                ((x + y) * 11 % 256) as u8,
                (200 + x % 56) as u8,
            ])
        })
    }

    #[test]
    fn identity_kernel_leaves_pixels_unchanged() {
        let src = gradient(7, 5);
        let out = convolve(&src, &ConvolutionKernel::identity());
        assert_eq!(out, src);
    }

    #[test]
    fn blur_darkens_borders_of_uniform_image() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
        let out = gaussian_blur(&src);

        // Interior pixels see every tap.
        assert_eq!(out.get_pixel(1, 1), &Rgba([100, 100, 100, 255]));
        // Corner: taps 4+2+2+1 = 9 of 16 in bounds -> 56.25 -> 56.
        assert_eq!(out.get_pixel(0, 0), &Rgba([56, 56, 56, 255]));
        // Edge: taps 4+2+2+2+1+1 = 12 of 16 -> 75.
        assert_eq!(out.get_pixel(1, 0), &Rgba([75, 75, 75, 255]));
    }

    #[test]
    fn convolution_keeps_alpha() {
        let src = gradient(6, 6);
        let out = convolve(&src, &ConvolutionKernel::gaussian_5x5());
        for (a, b) in src.pixels().zip(out.pixels()) {
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn unnormalized_kernel_clamps_channels() {
        let src = RgbaImage::from_fn(3, 3, |x, y| {
            if x == 1 && y == 1 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let out = convolve(&src, &ConvolutionKernel::laplacian());
        // Centre: four white neighbours sum to 1020, clamped to 255.
        assert_eq!(out.get_pixel(1, 1)[0], 255);
        // Corner: -4*255 + 255 + 255 is negative, clamped to 0.
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn kernel_validation() {
        assert!(ConvolutionKernel::new(2, vec![1.0; 4], 1.0).is_err());
        assert!(ConvolutionKernel::new(3, vec![1.0; 8], 9.0).is_err());
        assert!(ConvolutionKernel::new(3, vec![1.0; 9], 0.0).is_err());
        assert!(ConvolutionKernel::new(3, vec![1.0; 9], f32::NAN).is_err());
        let k = ConvolutionKernel::new(3, vec![1.0; 9], 9.0).unwrap();
        assert_eq!(k.radius(), 1);
    }

    #[test]
    fn grayscale_uses_luminosity_weights() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 77]));
        let out = grayscale(&src);
        // 0.299 * 255 = 76.245 -> 76
        assert_eq!(out.get_pixel(0, 0), &Rgba([76, 76, 76, 77]));
    }

    #[test]
    fn grayscale_rounds_double_precision_sum() {
        // Sum lands just under 22.5 in f64; single precision rounds it to 23.
        let src = RgbaImage::from_pixel(1, 1, Rgba([0, 36, 12, 255]));
        assert_eq!(grayscale(&src).get_pixel(0, 0), &Rgba([22, 22, 22, 255]));
        assert_eq!(luminance_u8(0, 36, 12), 22);
        assert_eq!(luminance_u8(255, 255, 255), 255);
    }

    #[test]
    fn grayscale_is_idempotent() {
        let src = gradient(16, 9);
        let once = grayscale(&src);
        let twice = grayscale(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_image_passes_through() {
        let src = RgbaImage::new(0, 0);
        assert_eq!(convolve(&src, &ConvolutionKernel::gaussian_3x3()).dimensions(), (0, 0));
        assert_eq!(grayscale(&src).dimensions(), (0, 0));
    }
}
