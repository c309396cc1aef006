use std::f32::consts::TAU;

use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::canvas::{blend_destination_out, blend_source_over};
use crate::settings::AppSettings;

/// Smallest and largest radius of a single spray dot.
pub const SPRAY_DOT_MIN_RADIUS: f32 = 0.5;
pub const SPRAY_DOT_MAX_RADIUS: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    Brush,
    Spray,
    Eraser,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Brush => "brush",
            ToolKind::Spray => "spray",
            ToolKind::Eraser => "eraser",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "brush" => Some(ToolKind::Brush),
            "spray" | "airbrush" => Some(ToolKind::Spray),
            "eraser" => Some(ToolKind::Eraser),
            _ => None,
        }
    }
}

/// Per-stroke tool parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub tool: ToolKind,
    pub color: Rgba<u8>,
    /// Diameter in canvas pixels.
    pub size: f32,
    pub opacity: f32,
    /// Dots scattered per spray sample.
    pub spray_density: u32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            tool: ToolKind::Brush,
            color: Rgba([0, 0, 0, 255]),
            size: 10.0,
            opacity: 0.3,
            spray_density: 50,
        }
    }
}

impl BrushSettings {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            tool: ToolKind::Brush,
            color: settings.brush_color,
            size: settings.brush_size,
            opacity: settings.brush_opacity,
            spray_density: settings.spray_density,
        }
    }

    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }
}

/// A stroke in progress: settings frozen at pointer-down plus the canvas-space path.
#[derive(Clone, Debug)]
pub struct Stroke {
    pub settings: BrushSettings,
    pub points: Vec<(f32, f32)>,
}

impl Stroke {
    pub fn new(settings: BrushSettings, start: (f32, f32)) -> Self {
        Self {
            settings,
            points: vec![start],
        }
    }

    pub fn push(&mut self, point: (f32, f32)) {
        self.points.push(point);
    }

    pub fn last_point(&self) -> Option<(f32, f32)> {
        self.points.last().copied()
    }
}

// ============================================================================
// STROKE RENDERER
// ============================================================================

/// Rasterises strokes onto a single layer buffer. Holds the spray RNG.
pub struct StrokeRenderer {
    rng: StdRng,
}

impl Default for StrokeRenderer {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl StrokeRenderer {
    /// Reproducible spray output.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Render whatever the newest point of `stroke` adds: a spray burst for
    /// spray, otherwise the segment from the previous point. A single-point
    /// brush or eraser stroke draws nothing.
    pub fn render_latest(&mut self, target: &mut RgbaImage, stroke: &Stroke) {
        let n = stroke.points.len();
        let Some(current) = stroke.last_point() else { return };
        match stroke.settings.tool {
            ToolKind::Spray => self.spray_at(target, current, &stroke.settings),
            ToolKind::Brush | ToolKind::Eraser if n >= 2 => {
                draw_segment(target, stroke.points[n - 2], current, &stroke.settings);
            }
            _ => {}
        }
    }

    /// Scatter `spray_density` dots within `size / 2` of `center`.
    pub fn spray_at(&mut self, target: &mut RgbaImage, center: (f32, f32), settings: &BrushSettings) {
        let radius = settings.radius();
        for _ in 0..settings.spray_density {
            let angle = self.rng.gen_range(0.0..TAU);
            let dist = self.rng.r#gen::<f32>() * radius;
            let dot = self.rng.gen_range(SPRAY_DOT_MIN_RADIUS..=SPRAY_DOT_MAX_RADIUS);
            let x = center.0 + angle.cos() * dist;
            let y = center.1 + angle.sin() * dist;
            fill_disc(target, (x, y), dot, settings.color, settings.opacity);
        }
        trace!(x = center.0, y = center.1, dots = settings.spray_density, "spray");
    }
}

/// Round-capped segment of width `settings.size`. Each covered pixel is
/// composited once, so overlapping caps never double up within a segment.
pub fn draw_segment(target: &mut RgbaImage, from: (f32, f32), to: (f32, f32), settings: &BrushSettings) {
    let radius = settings.radius();
    let Some((x0, y0, x1, y1)) = footprint(target, from, to, radius) else { return };

    for y in y0..y1 {
        for x in x0..x1 {
            let centre = (x as f32 + 0.5, y as f32 + 0.5);
            let coverage = rim_coverage(radius, distance_to_segment(centre, from, to));
            if coverage <= 0.0 {
                continue;
            }
            let base = *target.get_pixel(x, y);
            let out = match settings.tool {
                ToolKind::Eraser => blend_destination_out(base, coverage),
                _ => blend_source_over(base, settings.color, settings.opacity * coverage),
            };
            target.put_pixel(x, y, out);
        }
    }
}

fn fill_disc(target: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgba<u8>, opacity: f32) {
    let Some((x0, y0, x1, y1)) = footprint(target, center, center, radius) else { return };
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - center.0;
            let dy = y as f32 + 0.5 - center.1;
            let coverage = rim_coverage(radius, (dx * dx + dy * dy).sqrt());
            if coverage > 0.0 {
                let base = *target.get_pixel(x, y);
                target.put_pixel(x, y, blend_source_over(base, color, opacity * coverage));
            }
        }
    }
}

/// One-pixel anti-aliased edge around a hard disc of `radius`.
#[inline]
fn rim_coverage(radius: f32, dist: f32) -> f32 {
    (radius + 0.5 - dist).clamp(0.0, 1.0)
}

/// Pixel bounds touched by a capsule, clipped to the image.
fn footprint(target: &RgbaImage, a: (f32, f32), b: (f32, f32), radius: f32) -> Option<(u32, u32, u32, u32)> {
    if ![a.0, a.1, b.0, b.1, radius].iter().all(|v| v.is_finite()) {
        return None;
    }
    let reach = radius + 1.0;
    let min_x = (a.0.min(b.0) - reach).floor().max(0.0);
    let min_y = (a.1.min(b.1) - reach).floor().max(0.0);
    let max_x = (a.0.max(b.0) + reach).ceil().min(target.width() as f32);
    let max_y = (a.1.max(b.1) + reach).ceil().min(target.height() as f32);
    if min_x >= max_x || min_y >= max_y {
        return None;
    }
    Some((min_x as u32, min_y as u32, max_x as u32, max_y as u32))
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + abx * t, a.1 + aby * t);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::TRANSPARENT;

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, TRANSPARENT)
    }

    fn brush(size: f32, opacity: f32) -> BrushSettings {
        BrushSettings {
            tool: ToolKind::Brush,
            color: Rgba([200, 40, 40, 255]),
            size,
            opacity,
            spray_density: 50,
        }
    }

    #[test]
    fn brush_segment_uses_configured_opacity() {
        let mut img = blank(12, 12);
        draw_segment(&mut img, (2.0, 5.0), (8.0, 5.0), &brush(4.0, 0.3));
        assert_eq!(img.get_pixel(5, 5), &Rgba([200, 40, 40, 77]));
        assert_eq!(img.get_pixel(5, 9), &TRANSPARENT);
        // Round cap reaches past the end point.
        assert!(img.get_pixel(9, 5)[3] > 0);
    }

    #[test]
    fn zero_length_segment_draws_a_dot() {
        let mut img = blank(10, 10);
        draw_segment(&mut img, (5.0, 5.0), (5.0, 5.0), &brush(4.0, 1.0));
        assert_eq!(img.get_pixel(5, 5), &Rgba([200, 40, 40, 255]));
        assert_eq!(img.get_pixel(0, 0), &TRANSPARENT);
    }

    #[test]
    fn non_finite_points_draw_nothing() {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        let before = img.clone();
        draw_segment(&mut img, (f32::NAN, 0.0), (4.0, 4.0), &brush(4.0, 1.0));
        draw_segment(&mut img, (0.0, 0.0), (f32::INFINITY, 4.0), &brush(4.0, 1.0));
        fill_disc(&mut img, (f32::NAN, f32::NAN), 2.0, Rgba([0, 0, 0, 255]), 1.0);
        assert_eq!(img, before);
    }

    #[test]
    fn eraser_ignores_opacity() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]));
        let eraser = BrushSettings {
            tool: ToolKind::Eraser,
            ..brush(4.0, 0.1)
        };
        draw_segment(&mut img, (1.0, 5.0), (8.0, 5.0), &eraser);
        assert_eq!(img.get_pixel(4, 5), &TRANSPARENT);
        assert_eq!(img.get_pixel(4, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn segment_outside_image_is_clipped() {
        let mut img = blank(4, 4);
        draw_segment(&mut img, (-20.0, -20.0), (-10.0, -10.0), &brush(4.0, 1.0));
        assert!(img.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn single_point_brush_stroke_draws_nothing() {
        let mut img = blank(8, 8);
        let mut renderer = StrokeRenderer::new(1);
        let stroke = Stroke::new(brush(4.0, 1.0), (4.0, 4.0));
        renderer.render_latest(&mut img, &stroke);
        assert!(img.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn spray_is_reproducible_under_seed() {
        let settings = BrushSettings {
            tool: ToolKind::Spray,
            ..brush(16.0, 0.5)
        };
        let mut a = blank(32, 32);
        let mut b = blank(32, 32);
        StrokeRenderer::new(7).spray_at(&mut a, (16.0, 16.0), &settings);
        StrokeRenderer::new(7).spray_at(&mut b, (16.0, 16.0), &settings);
        assert_eq!(a, b);
        assert!(a.pixels().any(|p| p[3] > 0));
    }

    #[test]
    fn spray_stays_within_radius() {
        let settings = BrushSettings {
            tool: ToolKind::Spray,
            spray_density: 200,
            ..brush(10.0, 1.0)
        };
        let mut img = blank(40, 40);
        StrokeRenderer::new(42).spray_at(&mut img, (20.0, 20.0), &settings);
        // radius 5 + dot radius 2 + anti-aliased rim 0.5 + pixel half-diagonal
        let limit = 5.0 + SPRAY_DOT_MAX_RADIUS + 0.5 + 0.75;
        for (x, y, p) in img.enumerate_pixels() {
            if p[3] > 0 {
                let d = ((x as f32 + 0.5 - 20.0).powi(2) + (y as f32 + 0.5 - 20.0).powi(2)).sqrt();
                assert!(d <= limit, "dot at ({x},{y}) is {d} from centre");
            }
        }
    }

    #[test]
    fn zero_density_spray_is_noop() {
        let settings = BrushSettings {
            tool: ToolKind::Spray,
            spray_density: 0,
            ..brush(10.0, 1.0)
        };
        let mut img = blank(10, 10);
        StrokeRenderer::new(3).spray_at(&mut img, (5.0, 5.0), &settings);
        assert!(img.pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn tool_names_round_trip() {
        for tool in [ToolKind::Brush, ToolKind::Spray, ToolKind::Eraser] {
            assert_eq!(ToolKind::parse(tool.name()), Some(tool));
        }
        assert_eq!(ToolKind::parse("lasso"), None);
    }
}
