use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgba, RgbaImage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::canvas::{CanvasState, LayerId, ViewTransform};
use crate::components::colors::{ColorMixRecipe, parse_hex, recipe_for, rgb_to_hex};
use crate::components::history::HistoryManager;
use crate::components::tools::{BrushSettings, Stroke, StrokeRenderer, ToolKind};
use crate::io::flatten_for_export;
use crate::ops::sketch::{SketchOptions, build_sketch};
use crate::settings::AppSettings;

static UNTITLED_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Everything the UI can ask of a session.
///
/// Pointer coordinates are in screen space; the project maps them through
/// its [`ViewTransform`].
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    /// Release or leaving the canvas. Commits the stroke in progress.
    PointerUp,
    SetTool(ToolKind),
    SetBrushColor(Rgba<u8>),
    SetBrushSize(f32),
    SetBrushOpacity(f32),
    SetSprayDensity(u32),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Pan { dx: f32, dy: f32 },
    TogglePanMode,
    SelectLayer(LayerId),
    /// Numeric layer id from an external source; unknown ids are ignored.
    SelectLayerIndex(u32),
    ToggleLayerVisibility(LayerId),
    SetLayerVisibility(LayerId, bool),
    Undo,
    Redo,
    ClearActiveLayer,
    ToggleColorHighlight,
}

/// Single open painting session.
pub struct Project {
    pub id: Uuid,
    pub canvas_state: CanvasState,
    pub history: HistoryManager,
    pub view: ViewTransform,
    pub brush: BrushSettings,
    /// The uploaded photo, used as an optional export background.
    pub original: Option<RgbaImage>,
    pub dominant_colors: Vec<String>,
    pub pan_mode: bool,
    pub color_highlight: bool,
    /// `None` for unsaved/untitled sessions.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,

    zoom_step: f32,
    min_zoom: f32,
    max_zoom: f32,
    renderer: StrokeRenderer,
    stroke: Option<Stroke>,
    pan_anchor: Option<(f32, f32)>,
}

impl Project {
    /// Start a session around an already processed sketch.
    pub fn from_upload(
        original: Option<RgbaImage>,
        sketch: RgbaImage,
        dominant_colors: Vec<String>,
        settings: &AppSettings,
    ) -> Self {
        let name = format!("Untitled-{}", UNTITLED_COUNTER.fetch_add(1, Ordering::Relaxed));
        info!(
            name = %name,
            width = sketch.width(),
            height = sketch.height(),
            colors = dominant_colors.len(),
            "new session"
        );

        let mut project = Self {
            id: Uuid::new_v4(),
            canvas_state: CanvasState::new(sketch),
            history: HistoryManager::new(settings.max_undo_steps),
            view: ViewTransform::default(),
            brush: BrushSettings::from_settings(settings),
            original,
            dominant_colors,
            pan_mode: false,
            color_highlight: true,
            path: None,
            is_dirty: false,
            name,
            zoom_step: settings.zoom_step,
            min_zoom: settings.min_zoom,
            max_zoom: settings.max_zoom,
            renderer: StrokeRenderer::from_entropy(),
            stroke: None,
            pan_anchor: None,
        };
        if let Some([r, g, b]) = project.dominant_colors.first().and_then(|c| parse_hex(c)) {
            project.brush.color = Rgba([r, g, b, 255]);
        }
        project.reset_history();
        project
    }

    /// Run the sketch pipeline on `photo` and start a session on the result.
    pub fn from_photo(photo: RgbaImage, settings: &AppSettings) -> Self {
        let sketch = build_sketch(&photo, &SketchOptions::from_settings(settings));
        Self::from_upload(Some(photo), sketch, Vec::new(), settings)
    }

    /// Forget all history and record the current layers as the initial state.
    pub fn reset_history(&mut self) {
        self.history.clear();
        self.history.push_state(&self.canvas_state);
    }

    /// Make spray output reproducible.
    pub fn set_spray_seed(&mut self, seed: u64) {
        self.renderer.reseed(seed);
    }

    pub fn is_drawing(&self) -> bool {
        self.stroke.is_some()
    }

    /// Apply one UI action. Returns whether anything observable changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        debug!(?action, "dispatch");
        match action {
            Action::PointerDown { x, y } => self.pointer_down(x, y),
            Action::PointerMove { x, y } => self.pointer_move(x, y),
            Action::PointerUp => self.pointer_up(),
            Action::SetTool(tool) => replace(&mut self.brush.tool, tool),
            Action::SetBrushColor(color) => replace(&mut self.brush.color, color),
            Action::SetBrushSize(size) => replace(&mut self.brush.size, size.max(1.0)),
            Action::SetBrushOpacity(opacity) => {
                replace(&mut self.brush.opacity, opacity.clamp(0.0, 1.0))
            }
            Action::SetSprayDensity(density) => replace(&mut self.brush.spray_density, density),
            Action::ZoomIn => {
                let before = self.view.scale;
                self.view.zoom_in(self.zoom_step, self.max_zoom);
                self.view.scale != before
            }
            Action::ZoomOut => {
                let before = self.view.scale;
                self.view.zoom_out(self.zoom_step, self.min_zoom);
                self.view.scale != before
            }
            Action::ResetZoom => {
                let before = self.view;
                self.view.reset();
                self.view != before
            }
            Action::Pan { dx, dy } => {
                self.view.pan_by(dx, dy);
                dx != 0.0 || dy != 0.0
            }
            Action::TogglePanMode => {
                self.pan_mode = !self.pan_mode;
                self.pan_anchor = None;
                true
            }
            Action::SelectLayer(id) => self.canvas_state.set_active_layer(id),
            Action::SelectLayerIndex(index) => match LayerId::from_index(index) {
                Some(id) => self.canvas_state.set_active_layer(id),
                None => {
                    warn!(index, "ignoring unknown layer id");
                    false
                }
            },
            Action::ToggleLayerVisibility(id) => {
                let visible = self.canvas_state.toggle_visibility(id);
                debug!(layer = id.name(), visible, "visibility toggled");
                true
            }
            Action::SetLayerVisibility(id, visible) => {
                let changed = self.canvas_state.is_visible(id) != visible;
                self.canvas_state.set_visibility(id, visible);
                changed
            }
            Action::Undo => self.undo(),
            Action::Redo => self.redo(),
            Action::ClearActiveLayer => self.clear_active_layer(),
            Action::ToggleColorHighlight => {
                self.color_highlight = !self.color_highlight;
                true
            }
        }
    }

    fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        if self.pan_mode {
            self.pan_anchor = Some((x, y));
            return false;
        }
        // A press without a matching release still ends the previous stroke.
        let committed = self.commit_stroke();
        let point = self.view.to_canvas(x, y);
        let stroke = Stroke::new(self.brush, point);
        let marks = stroke_marks_pixels(self.brush.tool);
        if marks {
            self.renderer.render_latest(self.canvas_state.active_pixels_mut(), &stroke);
        }
        debug!(tool = self.brush.tool.name(), layer = self.canvas_state.active_layer().name(), "stroke started");
        self.stroke = Some(stroke);
        marks || committed
    }

    fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        if self.pan_mode {
            let Some((ax, ay)) = self.pan_anchor else { return false };
            self.view.pan_by(x - ax, y - ay);
            self.pan_anchor = Some((x, y));
            return true;
        }
        let point = self.view.to_canvas(x, y);
        let Some(stroke) = self.stroke.as_mut() else { return false };
        stroke.push(point);
        self.renderer.render_latest(self.canvas_state.active_pixels_mut(), stroke);
        true
    }

    fn pointer_up(&mut self) -> bool {
        if self.pan_anchor.take().is_some() {
            return false;
        }
        self.commit_stroke()
    }

    fn commit_stroke(&mut self) -> bool {
        let Some(stroke) = self.stroke.take() else { return false };
        self.history.push_state(&self.canvas_state);
        self.mark_dirty();
        debug!(points = stroke.points.len(), step = self.history.step(), "stroke committed");
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else { return false };
        if let Err(e) = snapshot.restore_into(&mut self.canvas_state) {
            error!("undo restore failed: {e}");
            return false;
        }
        self.mark_dirty();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else { return false };
        if let Err(e) = snapshot.restore_into(&mut self.canvas_state) {
            error!("redo restore failed: {e}");
            return false;
        }
        self.mark_dirty();
        true
    }

    /// Blank the active paint layer as an undoable step.
    pub fn clear_active_layer(&mut self) -> bool {
        let id = self.canvas_state.active_layer();
        if let Err(e) = self.canvas_state.clear_layer(id) {
            error!("clear failed: {e}");
            return false;
        }
        self.history.push_state(&self.canvas_state);
        self.mark_dirty();
        info!(layer = id.name(), "layer cleared");
        true
    }

    /// Nearest pigment recipe for the current brush colour.
    pub fn brush_recipe(&self) -> Option<ColorMixRecipe> {
        let c = self.brush.color;
        recipe_for(&rgb_to_hex([c[0], c[1], c[2]]))
    }

    /// Visible stack flattened for display.
    pub fn composite(&self) -> RgbaImage {
        self.canvas_state.composite()
    }

    /// Flattened image for download.
    pub fn export_image(&self, include_original: bool) -> RgbaImage {
        flatten_for_export(&self.canvas_state, include_original, self.original.as_ref())
    }

    pub fn zoom_limits(&self) -> (f32, f32) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn stroke_marks_pixels(tool: ToolKind) -> bool {
    matches!(tool, ToolKind::Spray)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::canvas::TRANSPARENT;

    fn project() -> Project {
        let sketch = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let mut p = Project::from_upload(None, sketch, vec!["#ff0000".into()], &AppSettings::default());
        p.set_spray_seed(5);
        p
    }

    fn stroke(p: &mut Project, from: (f32, f32), to: (f32, f32)) {
        p.dispatch(Action::PointerDown { x: from.0, y: from.1 });
        p.dispatch(Action::PointerMove { x: to.0, y: to.1 });
        p.dispatch(Action::PointerUp);
    }

    #[test]
    fn upload_seeds_initial_state() {
        let p = project();
        assert_eq!(p.history.step(), 0);
        assert_eq!(p.canvas_state.active_layer(), LayerId::Paint1);
        assert_eq!(p.brush.color, Rgba([255, 0, 0, 255]));
        assert_eq!(p.brush.opacity, 0.3);
        assert!(p.color_highlight);
        assert!(!p.is_dirty);
        assert!(p.name.starts_with("Untitled-"));
    }

    #[test]
    fn stroke_paints_active_layer_and_commits() {
        let mut p = project();
        p.dispatch(Action::SelectLayer(LayerId::Paint2));
        stroke(&mut p, (2.0, 10.0), (18.0, 10.0));

        assert!(p.canvas_state.layer(LayerId::Paint1).is_blank());
        assert!(!p.canvas_state.layer(LayerId::Paint2).is_blank());
        assert_eq!(p.history.step(), 1);
        assert!(p.display_title().ends_with('*'));
    }

    #[test]
    fn pointer_maps_through_view() {
        let mut p = project();
        p.dispatch(Action::ZoomIn);
        p.dispatch(Action::Pan { dx: 10.0, dy: 0.0 });
        let s = p.view.scale;
        // Screen x = canvas 5 * s + 10.
        stroke(&mut p, (5.0 * s + 10.0, 2.0 * s), (5.0 * s + 10.0, 15.0 * s));
        let layer = p.canvas_state.layer(LayerId::Paint1).pixels();
        assert!(layer.get_pixel(5, 8)[3] > 0);
        assert_eq!(layer.get_pixel(15, 8), &TRANSPARENT);
    }

    #[test]
    fn press_without_release_commits_previous_stroke() {
        let mut p = project();
        p.dispatch(Action::PointerDown { x: 2.0, y: 2.0 });
        p.dispatch(Action::PointerMove { x: 18.0, y: 2.0 });
        p.dispatch(Action::PointerDown { x: 2.0, y: 12.0 });
        assert!(p.is_drawing());
        assert_eq!(p.history.step(), 1);
        p.dispatch(Action::PointerMove { x: 18.0, y: 12.0 });
        p.dispatch(Action::PointerUp);
        assert!(!p.is_drawing());
        assert_eq!(p.history.step(), 2);

        p.dispatch(Action::Undo);
        let layer = p.canvas_state.layer(LayerId::Paint1).pixels();
        assert!(layer.get_pixel(10, 2)[3] > 0);
        assert_eq!(layer.get_pixel(10, 12), &TRANSPARENT);
    }

    #[test]
    fn brush_press_keeps_layer_shared_with_history() {
        let mut p = project();
        let before = p.canvas_state.layer(LayerId::Paint1).shared_pixels();
        p.dispatch(Action::PointerDown { x: 5.0, y: 5.0 });
        let after = p.canvas_state.layer(LayerId::Paint1).shared_pixels();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut p = project();
        stroke(&mut p, (2.0, 2.0), (18.0, 2.0));
        stroke(&mut p, (2.0, 12.0), (18.0, 12.0));
        let after_two = p.canvas_state.layer(LayerId::Paint1).pixels().clone();

        assert!(p.dispatch(Action::Undo));
        assert!(p.dispatch(Action::Undo));
        assert!(p.canvas_state.layer(LayerId::Paint1).is_blank());
        assert!(!p.dispatch(Action::Undo));

        assert!(p.dispatch(Action::Redo));
        assert!(p.dispatch(Action::Redo));
        assert_eq!(p.canvas_state.layer(LayerId::Paint1).pixels(), &after_two);
        assert!(!p.dispatch(Action::Redo));
    }

    #[test]
    fn clear_is_undoable() {
        let mut p = project();
        stroke(&mut p, (2.0, 2.0), (18.0, 18.0));
        assert!(p.dispatch(Action::ClearActiveLayer));
        assert!(p.canvas_state.layer(LayerId::Paint1).is_blank());
        assert_eq!(p.history.step(), 2);
        p.dispatch(Action::Undo);
        assert!(!p.canvas_state.layer(LayerId::Paint1).is_blank());
    }

    #[test]
    fn pan_mode_drags_view_without_history() {
        let mut p = project();
        p.dispatch(Action::TogglePanMode);
        p.dispatch(Action::PointerDown { x: 0.0, y: 0.0 });
        p.dispatch(Action::PointerMove { x: 7.0, y: -3.0 });
        p.dispatch(Action::PointerUp);
        assert_eq!((p.view.offset_x, p.view.offset_y), (7.0, -3.0));
        assert_eq!(p.history.step(), 0);
        assert!(p.canvas_state.layer(LayerId::Paint1).is_blank());
    }

    #[test]
    fn unknown_or_sketch_layer_selection_is_ignored() {
        let mut p = project();
        assert!(!p.dispatch(Action::SelectLayerIndex(9)));
        assert!(!p.dispatch(Action::SelectLayerIndex(0)));
        assert!(p.dispatch(Action::SelectLayerIndex(3)));
        assert_eq!(p.canvas_state.active_layer(), LayerId::Paint3);
    }

    #[test]
    fn spray_marks_on_pointer_down() {
        let mut p = project();
        p.dispatch(Action::SetTool(ToolKind::Spray));
        p.dispatch(Action::SetBrushOpacity(1.0));
        p.dispatch(Action::PointerDown { x: 10.0, y: 10.0 });
        assert!(!p.canvas_state.layer(LayerId::Paint1).is_blank());
        p.dispatch(Action::PointerUp);
        assert_eq!(p.history.step(), 1);
    }

    #[test]
    fn zoom_respects_limits() {
        let mut p = project();
        for _ in 0..200 {
            p.dispatch(Action::ZoomOut);
        }
        assert_eq!(p.view.scale, p.zoom_limits().0);
        p.dispatch(Action::ResetZoom);
        assert_eq!(p.view, ViewTransform::default());
    }
}
