use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::PaintError;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// LAYER IDS
// ============================================================================

/// The fixed layer set of a canvas. Draw order is ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    /// Read-only background produced by the sketch pipeline.
    Sketch,
    Paint1,
    Paint2,
    Paint3,
}

impl LayerId {
    pub const ALL: [LayerId; 4] = [LayerId::Sketch, LayerId::Paint1, LayerId::Paint2, LayerId::Paint3];
    pub const PAINT: [LayerId; 3] = [LayerId::Paint1, LayerId::Paint2, LayerId::Paint3];

    pub fn index(self) -> usize {
        match self {
            LayerId::Sketch => 0,
            LayerId::Paint1 => 1,
            LayerId::Paint2 => 2,
            LayerId::Paint3 => 3,
        }
    }

    /// Map a numeric id from a file or UI event. Anything outside 0..=3 is `None`.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(LayerId::Sketch),
            1 => Some(LayerId::Paint1),
            2 => Some(LayerId::Paint2),
            3 => Some(LayerId::Paint3),
            _ => None,
        }
    }

    pub fn is_sketch(self) -> bool {
        self == LayerId::Sketch
    }

    /// Position within the paint-only slots (0..3), `None` for the sketch.
    pub fn paint_slot(self) -> Option<usize> {
        self.index().checked_sub(1)
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerId::Sketch => "Sketch",
            LayerId::Paint1 => "Layer 1",
            LayerId::Paint2 => "Layer 2",
            LayerId::Paint3 => "Layer 3",
        }
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub visible: bool,
    /// Shared with history snapshots until the next write.
    pixels: Arc<RgbaImage>,
}

impl Layer {
    fn new(id: LayerId, pixels: RgbaImage) -> Self {
        Self {
            id,
            visible: true,
            pixels: Arc::new(pixels),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Cheap handle to the current buffer (used by snapshot capture).
    pub fn shared_pixels(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }

    /// Mutable pixel access; detaches from any snapshot sharing the buffer.
    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        Arc::make_mut(&mut self.pixels)
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p[3] == 0)
    }
}

// ============================================================================
// CANVAS STATE - sketch + three paint layers of identical size
// ============================================================================

#[derive(Clone, Debug)]
pub struct CanvasState {
    layers: [Layer; 4],
    active_layer: LayerId,
    pub width: u32,
    pub height: u32,
}

impl CanvasState {
    /// Build a stack around `sketch`; paint layers start fully transparent.
    pub fn new(sketch: RgbaImage) -> Self {
        let (width, height) = sketch.dimensions();
        let blank = || RgbaImage::from_pixel(width, height, TRANSPARENT);
        debug!(width, height, "canvas created");
        Self {
            layers: [
                Layer::new(LayerId::Sketch, sketch),
                Layer::new(LayerId::Paint1, blank()),
                Layer::new(LayerId::Paint2, blank()),
                Layer::new(LayerId::Paint3, blank()),
            ],
            active_layer: LayerId::Paint1,
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.index()]
    }

    fn layer_mut(&mut self, id: LayerId) -> &mut Layer {
        &mut self.layers[id.index()]
    }

    pub fn sketch(&self) -> &RgbaImage {
        self.layers[0].pixels()
    }

    pub fn active_layer(&self) -> LayerId {
        self.active_layer
    }

    /// Make `id` the stroke target. The sketch can never be active; returns
    /// whether the selection changed.
    pub fn set_active_layer(&mut self, id: LayerId) -> bool {
        if id.is_sketch() {
            warn!("sketch layer cannot be selected for painting");
            return false;
        }
        let changed = self.active_layer != id;
        self.active_layer = id;
        changed
    }

    /// Pixels of the active paint layer, ready for a stroke.
    pub fn active_pixels_mut(&mut self) -> &mut RgbaImage {
        let id = self.active_layer;
        self.layer_mut(id).pixels_mut()
    }

    /// Replace a paint layer's raster wholesale.
    pub fn set_layer_raster(&mut self, id: LayerId, raster: RgbaImage) -> Result<(), PaintError> {
        self.restore_layer(id, Arc::new(raster))
    }

    /// Like [`Self::set_layer_raster`] but adopts a shared buffer without copying.
    pub fn restore_layer(&mut self, id: LayerId, raster: Arc<RgbaImage>) -> Result<(), PaintError> {
        if id.is_sketch() {
            return Err(PaintError::ReadOnlyLayer);
        }
        if raster.dimensions() != self.dimensions() {
            return Err(PaintError::DimensionMismatch {
                expected: self.dimensions(),
                found: raster.dimensions(),
            });
        }
        self.layer_mut(id).pixels = raster;
        Ok(())
    }

    /// Reset a paint layer to transparent.
    pub fn clear_layer(&mut self, id: LayerId) -> Result<(), PaintError> {
        let (w, h) = self.dimensions();
        self.set_layer_raster(id, RgbaImage::from_pixel(w, h, TRANSPARENT))
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) {
        self.layer_mut(id).visible = visible;
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> bool {
        let layer = self.layer_mut(id);
        layer.visible = !layer.visible;
        layer.visible
    }

    pub fn is_visible(&self, id: LayerId) -> bool {
        self.layer(id).visible
    }

    pub fn visibility(&self) -> [(LayerId, bool); 4] {
        LayerId::ALL.map(|id| (id, self.is_visible(id)))
    }

    /// Fixed draw order: sketch first, then paint layers ascending.
    pub fn composite_order(&self) -> [LayerId; 4] {
        LayerId::ALL
    }

    /// Flatten every visible layer onto a transparent background.
    pub fn composite(&self) -> RgbaImage {
        let mut out = RgbaImage::from_pixel(self.width, self.height, TRANSPARENT);
        for id in self.composite_order() {
            let layer = self.layer(id);
            if layer.visible {
                draw_image_source_over(&mut out, layer.pixels());
            }
        }
        out
    }
}

// ============================================================================
// COMPOSITING
// ============================================================================

/// Source-over of `top` onto `base`, with `opacity` scaling the top alpha.
pub fn blend_source_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return TRANSPARENT;
    }

    let channel = |i: usize| {
        let b = base[i] as f32 / 255.0;
        let t = top[i] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Destination-out: remove `coverage` (0..=1) of the existing alpha.
pub fn blend_destination_out(base: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let coverage = coverage.clamp(0.0, 1.0);
    if coverage >= 1.0 {
        return TRANSPARENT;
    }
    let a = (base[3] as f32 * (1.0 - coverage)).round() as u8;
    if a == 0 {
        TRANSPARENT
    } else {
        Rgba([base[0], base[1], base[2], a])
    }
}

/// Draw `src` at the origin of `dst`, clipped to the overlap.
pub fn draw_image_source_over(dst: &mut RgbaImage, src: &RgbaImage) {
    let w = dst.width().min(src.width()) as usize;
    let h = dst.height().min(src.height()) as usize;
    if w == 0 || h == 0 {
        return;
    }
    let dst_stride = dst.width() as usize * 4;
    let src_stride = src.width() as usize * 4;
    let src_raw = src.as_raw();
    let buf: &mut [u8] = dst;

    buf.par_chunks_mut(dst_stride)
        .take(h)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src_raw[y * src_stride..y * src_stride + w * 4];
            for x in 0..w {
                let i = x * 4;
                let top = Rgba([src_row[i], src_row[i + 1], src_row[i + 2], src_row[i + 3]]);
                if top[3] == 0 {
                    continue;
                }
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                row[i..i + 4].copy_from_slice(&blend_source_over(base, top, 1.0).0);
            }
        });
}

// ============================================================================
// VIEW TRANSFORM - screen <-> canvas mapping
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn new(scale: f32, offset_x: f32, offset_y: f32) -> Self {
        Self {
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Screen point to canvas space. No clamping.
    pub fn to_canvas(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
        (
            (screen_x - self.offset_x) / self.scale,
            (screen_y - self.offset_y) / self.scale,
        )
    }

    pub fn to_screen(&self, canvas_x: f32, canvas_y: f32) -> (f32, f32) {
        (
            canvas_x * self.scale + self.offset_x,
            canvas_y * self.scale + self.offset_y,
        )
    }

    pub fn zoom_in(&mut self, step: f32, max: f32) {
        self.scale = (self.scale + step).min(max);
    }

    pub fn zoom_out(&mut self, step: f32, min: f32) {
        self.scale = (self.scale - step).max(min);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Bring an externally supplied view into `[min, max]` zoom. Non-finite
    /// fields fall back to the defaults.
    pub fn clamped(self, min: f32, max: f32) -> Self {
        let scale = if self.scale.is_finite() { self.scale } else { 1.0 };
        let finite_or_zero = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            scale: scale.max(min).min(max),
            offset_x: finite_or_zero(self.offset_x),
            offset_y: finite_or_zero(self.offset_y),
        }
    }
}
