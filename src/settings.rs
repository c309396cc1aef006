use std::fmt::Write as _;
use std::path::PathBuf;

use image::Rgba;
use tracing::{debug, warn};

use crate::components::colors::{parse_hex, rgb_to_hex};
use crate::error::PaintError;
use crate::ops::effects::{
    DEFAULT_COLOR_DIFFERENCE_THRESHOLD, DEFAULT_LAPLACIAN_AMPLIFICATION,
    DEFAULT_LAPLACIAN_THRESHOLD, OutlineStrategy,
};

const SETTINGS_FILE: &str = "paintover_settings.cfg";

/// Application settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Brush diameter in canvas pixels
    pub brush_size: f32,
    pub brush_color: Rgba<u8>,
    /// 0.0..=1.0
    pub brush_opacity: f32,
    /// Dots per spray sample
    pub spray_density: u32,
    /// Maximum number of undo snapshots kept
    pub max_undo_steps: usize,
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Outline extraction used when building a sketch from a photo
    pub outline_strategy: OutlineStrategy,
    pub blur_before_outline: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            brush_size: 10.0,
            brush_color: Rgba([0, 0, 0, 255]),
            brush_opacity: 0.3,
            spray_density: 50,
            max_undo_steps: 50,
            zoom_step: 0.1,
            min_zoom: 0.1,
            max_zoom: 5.0,
            outline_strategy: OutlineStrategy::default(),
            blur_before_outline: true,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/paintover/paintover_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PaintOver\paintover_settings.cfg
    /// On macOS:   ~/Library/Application Support/PaintOver/paintover_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("paintover");
            Some(config_dir.join(SETTINGS_FILE))
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            Some(PathBuf::from(appdata).join("PaintOver").join(SETTINGS_FILE))
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("PaintOver")
                    .join(SETTINGS_FILE),
            )
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load settings from disk, falling back to defaults for a missing file
    /// and for any key that is absent or malformed.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        };
        Self::parse(&content)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), PaintError> {
        let path = Self::settings_path().ok_or_else(|| {
            PaintError::ContextUnavailable("no settings directory on this platform".into())
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_config_string())?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Parse `key=value` lines. Unknown keys are skipped.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        let mut strategy_name: Option<String> = None;
        let mut threshold: Option<f32> = None;
        let mut amplification: Option<f32> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "brush_size" => {
                    s.brush_size = val.parse::<f32>().ok().filter(|v| *v > 0.0).unwrap_or(10.0);
                }
                "brush_color" => {
                    if let Some([r, g, b]) = parse_hex(val) {
                        s.brush_color = Rgba([r, g, b, 255]);
                    }
                }
                "brush_opacity" => {
                    s.brush_opacity = val.parse::<f32>().map(|v| v.clamp(0.0, 1.0)).unwrap_or(0.3);
                }
                "spray_density" => {
                    s.spray_density = val.parse().unwrap_or(50);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(50);
                }
                "zoom_step" => {
                    s.zoom_step = val.parse::<f32>().ok().filter(|v| *v > 0.0).unwrap_or(0.1);
                }
                "min_zoom" => {
                    s.min_zoom = val.parse::<f32>().ok().filter(|v| *v > 0.0).unwrap_or(0.1);
                }
                "max_zoom" => {
                    s.max_zoom = val.parse::<f32>().ok().filter(|v| *v > 0.0).unwrap_or(5.0);
                }
                "outline_strategy" => strategy_name = Some(val.to_string()),
                "outline_threshold" => threshold = val.parse().ok(),
                "laplacian_amplification" => amplification = val.parse().ok(),
                "blur_before_outline" => {
                    s.blur_before_outline = val == "true";
                }
                _ => {
                    warn!(key, "unknown settings key ignored");
                }
            }
        }

        if s.min_zoom > s.max_zoom {
            std::mem::swap(&mut s.min_zoom, &mut s.max_zoom);
        }

        let base = strategy_name
            .as_deref()
            .and_then(OutlineStrategy::parse)
            .unwrap_or_default();
        s.outline_strategy = match base {
            OutlineStrategy::ColorDifference { .. } => OutlineStrategy::ColorDifference {
                threshold: threshold.unwrap_or(DEFAULT_COLOR_DIFFERENCE_THRESHOLD),
            },
            OutlineStrategy::Laplacian { .. } => OutlineStrategy::Laplacian {
                threshold: threshold.unwrap_or(DEFAULT_LAPLACIAN_THRESHOLD),
                amplification: amplification.unwrap_or(DEFAULT_LAPLACIAN_AMPLIFICATION),
            },
        };
        s
    }

    pub fn to_config_string(&self) -> String {
        let mut out = String::new();
        let c = self.brush_color;
        let _ = writeln!(out, "brush_size={}", self.brush_size);
        let _ = writeln!(out, "brush_color={}", rgb_to_hex([c[0], c[1], c[2]]));
        let _ = writeln!(out, "brush_opacity={}", self.brush_opacity);
        let _ = writeln!(out, "spray_density={}", self.spray_density);
        let _ = writeln!(out, "max_undo_steps={}", self.max_undo_steps);
        let _ = writeln!(out, "zoom_step={}", self.zoom_step);
        let _ = writeln!(out, "min_zoom={}", self.min_zoom);
        let _ = writeln!(out, "max_zoom={}", self.max_zoom);
        let _ = writeln!(out, "outline_strategy={}", self.outline_strategy.name());
        let _ = writeln!(out, "outline_threshold={}", self.outline_strategy.threshold());
        if let OutlineStrategy::Laplacian { amplification, .. } = self.outline_strategy {
            let _ = writeln!(out, "laplacian_amplification={}", amplification);
        }
        let _ = writeln!(out, "blur_before_outline={}", self.blur_before_outline);
        out
    }
}
