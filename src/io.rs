use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::canvas::{CanvasState, LayerId, TRANSPARENT, ViewTransform, draw_image_source_over};
use crate::components::colors::{parse_hex, rgb_to_hex};
use crate::components::tools::ToolKind;
use crate::error::PaintError;
use crate::project::Project;
use crate::settings::AppSettings;

pub const DEFAULT_EXPORT_NAME: &str = "my-painting.png";
pub const PROJECT_FILE_VERSION: &str = "1.0";

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// IMAGE DECODE / ENCODE
// ============================================================================

/// Decode any supported raster file to RGBA8.
pub fn load_image(path: &Path) -> Result<RgbaImage, PaintError> {
    let img = image::open(path)
        .map_err(|e| PaintError::ImageLoad(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), width = img.width(), height = img.height(), "image loaded");
    Ok(img.to_rgba8())
}

pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, PaintError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| PaintError::ImageLoad(e.to_string()))
}

/// Lossless PNG encoding of an RGBA8 raster.
pub fn encode_png<W: Write>(image: &RgbaImage, writer: W) -> Result<(), PaintError> {
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(())
}

/// Raster → `data:image/png;base64,…`.
pub fn encode_raster(image: &RgbaImage) -> Result<String, PaintError> {
    let mut buf = Cursor::new(Vec::new());
    encode_png(image, &mut buf)?;
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, BASE64.encode(buf.into_inner())))
}

/// Inverse of [`encode_raster`]. Accepts any `data:` URL or bare base64.
pub fn decode_raster(data: &str) -> Result<RgbaImage, PaintError> {
    let payload = if let Some(stripped) = data.strip_prefix(PNG_DATA_URL_PREFIX) {
        stripped
    } else if data.starts_with("data:") {
        data.split_once(',').map_or(data, |(_, rest)| rest)
    } else {
        data
    };
    let bytes = BASE64.decode(payload.trim())?;
    decode_image_bytes(&bytes)
}

// ============================================================================
// EXPORT
// ============================================================================

/// Flatten the stack for download.
///
/// Background is the original photo when requested and available, otherwise
/// the sketch if visible. Visible paint layers follow in ascending order.
pub fn flatten_for_export(
    state: &CanvasState,
    include_original: bool,
    original: Option<&RgbaImage>,
) -> RgbaImage {
    let mut out = RgbaImage::from_pixel(state.width, state.height, TRANSPARENT);
    match original {
        Some(photo) if include_original => draw_image_source_over(&mut out, photo),
        _ if state.is_visible(LayerId::Sketch) => draw_image_source_over(&mut out, state.sketch()),
        _ => {}
    }
    for id in LayerId::PAINT {
        let layer = state.layer(id);
        if layer.visible {
            draw_image_source_over(&mut out, layer.pixels());
        }
    }
    out
}

/// Write `image` as PNG.
pub fn export_png(image: &RgbaImage, path: &Path) -> Result<(), PaintError> {
    let file = File::create(path).map_err(|e| {
        PaintError::ContextUnavailable(format!("cannot create {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);
    encode_png(image, &mut writer)?;
    writer.flush()?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "exported");
    Ok(())
}

// ============================================================================
// PROJECT FILE (JSON)
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub project: ProjectSection,
    pub canvas: CanvasSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<LayersSection>,
    #[serde(default)]
    pub settings: SettingsSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSection {
    #[serde(default)]
    pub original_image: Option<String>,
    pub sketch_image: String,
    #[serde(default)]
    pub dominant_colors: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSection {
    /// Single-layer form written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paint_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paint_layers: Option<BTreeMap<String, String>>,
    pub dimensions: Dimensions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayersSection {
    pub active_layer_id: u32,
    #[serde(default)]
    pub layers_visibility: BTreeMap<String, bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsSection {
    pub brush_size: f32,
    pub brush_color: String,
    pub brush_opacity: f32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub is_eraser: bool,
    pub is_pan_mode: bool,
    pub is_color_highlight_enabled: bool,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            brush_size: 10.0,
            brush_color: "#000000".to_string(),
            brush_opacity: 0.3,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            is_eraser: false,
            is_pan_mode: false,
            is_color_highlight_enabled: true,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `paintover-<timestamp>.json`
pub fn default_project_file_name() -> String {
    format!("paintover-{}.json", now_millis())
}

/// Snapshot a session into its serialisable form.
pub fn build_project_file(project: &Project) -> Result<ProjectFile, PaintError> {
    let state = &project.canvas_state;

    let mut paint_layers = BTreeMap::new();
    for id in LayerId::PAINT {
        paint_layers.insert(id.index().to_string(), encode_raster(state.layer(id).pixels())?);
    }
    let layers_visibility = state
        .visibility()
        .iter()
        .map(|(id, visible)| (id.index().to_string(), *visible))
        .collect();

    let original_image = project.original.as_ref().map(encode_raster).transpose()?;
    let c = project.brush.color;

    Ok(ProjectFile {
        version: PROJECT_FILE_VERSION.to_string(),
        timestamp: now_millis(),
        project: ProjectSection {
            original_image,
            sketch_image: encode_raster(state.sketch())?,
            dominant_colors: project.dominant_colors.clone(),
        },
        canvas: CanvasSection {
            paint_layer: None,
            paint_layers: Some(paint_layers),
            dimensions: Dimensions {
                width: state.width,
                height: state.height,
            },
        },
        layers: Some(LayersSection {
            active_layer_id: state.active_layer().index() as u32,
            layers_visibility,
        }),
        settings: SettingsSection {
            brush_size: project.brush.size,
            brush_color: rgb_to_hex([c[0], c[1], c[2]]),
            brush_opacity: project.brush.opacity,
            scale: project.view.scale,
            offset_x: project.view.offset_x,
            offset_y: project.view.offset_y,
            is_eraser: project.brush.tool == ToolKind::Eraser,
            is_pan_mode: project.pan_mode,
            is_color_highlight_enabled: project.color_highlight,
        },
    })
}

/// Serialise `project` to `path` and adopt it as the project's file.
pub fn save_project(project: &mut Project, path: &Path) -> Result<(), PaintError> {
    let file = build_project_file(project)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &file)?;
    project.path = Some(path.to_path_buf());
    project.update_name_from_path();
    project.mark_clean();
    info!(path = %path.display(), "project saved");
    Ok(())
}

fn parse_layer_key(key: &str) -> Option<LayerId> {
    let id = key.trim().parse::<u32>().ok().and_then(LayerId::from_index);
    if id.is_none() {
        warn!(key, "ignoring unknown layer id in project file");
    }
    id
}

/// Build a complete session from a parsed project file. Nothing is shared
/// with any existing session, so a failure leaves the caller's state intact.
pub fn project_from_file(file: ProjectFile, settings: &AppSettings) -> Result<Project, PaintError> {
    let sketch = decode_raster(&file.project.sketch_image)?;
    let expected = (file.canvas.dimensions.width, file.canvas.dimensions.height);
    if sketch.dimensions() != expected {
        return Err(PaintError::DimensionMismatch {
            expected,
            found: sketch.dimensions(),
        });
    }
    let original = file
        .project
        .original_image
        .as_deref()
        .map(decode_raster)
        .transpose()?;

    let mut project = Project::from_upload(original, sketch, file.project.dominant_colors, settings);
    let state = &mut project.canvas_state;

    match (&file.canvas.paint_layers, &file.canvas.paint_layer) {
        (Some(layers), _) => {
            for (key, data) in layers {
                let Some(id) = parse_layer_key(key) else { continue };
                if id.is_sketch() {
                    warn!("project file stores pixels for the sketch layer, ignoring");
                    continue;
                }
                state.set_layer_raster(id, decode_raster(data)?)?;
            }
        }
        (None, Some(legacy)) => {
            state.set_layer_raster(LayerId::Paint1, decode_raster(legacy)?)?;
        }
        (None, None) => {}
    }

    match &file.layers {
        Some(layers) => {
            for (key, visible) in &layers.layers_visibility {
                if let Some(id) = parse_layer_key(key) {
                    state.set_visibility(id, *visible);
                }
            }
            match LayerId::from_index(layers.active_layer_id) {
                Some(id) if !id.is_sketch() => {
                    state.set_active_layer(id);
                }
                _ => warn!(id = layers.active_layer_id, "ignoring invalid active layer"),
            }
        }
        None => {
            state.set_active_layer(LayerId::Paint1);
        }
    }

    let s = &file.settings;
    project.brush.size = s.brush_size.max(1.0);
    project.brush.opacity = s.brush_opacity.clamp(0.0, 1.0);
    if let Some([r, g, b]) = parse_hex(&s.brush_color) {
        project.brush.color = Rgba([r, g, b, 255]);
    }
    project.brush.tool = if s.is_eraser { ToolKind::Eraser } else { ToolKind::Brush };
    let (min_zoom, max_zoom) = project.zoom_limits();
    project.view = ViewTransform::new(s.scale, s.offset_x, s.offset_y).clamped(min_zoom, max_zoom);
    project.pan_mode = s.is_pan_mode;
    project.color_highlight = s.is_color_highlight_enabled;

    project.reset_history();
    Ok(project)
}

/// Read a project file written by [`save_project`] (or the legacy single-layer form).
pub fn load_project(path: &Path, settings: &AppSettings) -> Result<Project, PaintError> {
    let text = std::fs::read_to_string(path)?;
    let file: ProjectFile = serde_json::from_str(&text)
        .map_err(|e| PaintError::ProjectFormat(format!("{}: {}", path.display(), e)))?;
    let mut project = project_from_file(file, settings)?;
    project.path = Some(PathBuf::from(path));
    project.update_name_from_path();
    info!(path = %path.display(), "project loaded");
    Ok(project)
}
