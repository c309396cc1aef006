// ============================================================================
// PIGMENT RECIPES - nearest mixing recipe for a target colour
// ============================================================================

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::error;

/// The nine tube colours every recipe is expressed in, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pigment {
    TitaniumWhite,
    MarsBlack,
    BurntUmber,
    CadmiumYellow,
    LemonYellow,
    CadmiumRed,
    QuinacridoneMagenta,
    UltramarineBlue,
    PhthaloBlue,
}

impl Pigment {
    pub const ALL: [Pigment; 9] = [
        Pigment::TitaniumWhite,
        Pigment::MarsBlack,
        Pigment::BurntUmber,
        Pigment::CadmiumYellow,
        Pigment::LemonYellow,
        Pigment::CadmiumRed,
        Pigment::QuinacridoneMagenta,
        Pigment::UltramarineBlue,
        Pigment::PhthaloBlue,
    ];

    /// Key used in the palette data.
    pub fn key(&self) -> &'static str {
        match self {
            Pigment::TitaniumWhite => "white",
            Pigment::MarsBlack => "black",
            Pigment::BurntUmber => "umber",
            Pigment::CadmiumYellow => "cadY",
            Pigment::LemonYellow => "lemonY",
            Pigment::CadmiumRed => "cadR",
            Pigment::QuinacridoneMagenta => "mag",
            Pigment::UltramarineBlue => "ultraB",
            Pigment::PhthaloBlue => "phthaloB",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Pigment::TitaniumWhite => "Titanium White",
            Pigment::MarsBlack => "Mars Black",
            Pigment::BurntUmber => "Burnt Umber",
            Pigment::CadmiumYellow => "Cadmium Yellow",
            Pigment::LemonYellow => "Lemon Yellow",
            Pigment::CadmiumRed => "Cadmium Red",
            Pigment::QuinacridoneMagenta => "Quinacridone Magenta",
            Pigment::UltramarineBlue => "Ultramarine Blue",
            Pigment::PhthaloBlue => "Phthalo Blue",
        }
    }
}

/// Parts of each pigment in a mix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PigmentMix {
    pub white: u32,
    pub black: u32,
    pub umber: u32,
    #[serde(rename = "cadY")]
    pub cad_y: u32,
    #[serde(rename = "lemonY")]
    pub lemon_y: u32,
    #[serde(rename = "cadR")]
    pub cad_r: u32,
    pub mag: u32,
    #[serde(rename = "ultraB")]
    pub ultra_b: u32,
    #[serde(rename = "phthaloB")]
    pub phthalo_b: u32,
}

impl PigmentMix {
    pub fn parts(&self, pigment: Pigment) -> u32 {
        match pigment {
            Pigment::TitaniumWhite => self.white,
            Pigment::MarsBlack => self.black,
            Pigment::BurntUmber => self.umber,
            Pigment::CadmiumYellow => self.cad_y,
            Pigment::LemonYellow => self.lemon_y,
            Pigment::CadmiumRed => self.cad_r,
            Pigment::QuinacridoneMagenta => self.mag,
            Pigment::UltramarineBlue => self.ultra_b,
            Pigment::PhthaloBlue => self.phthalo_b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub name: String,
    pub hex: String,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub mix: PigmentMix,
    #[serde(default)]
    pub notes: String,
}

impl PaletteEntry {
    pub fn rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Result of a nearest-colour lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorMixRecipe {
    /// Normalised `#rrggbb` form of the query.
    pub target_hex: String,
    pub entry: PaletteEntry,
    pub distance_squared: u32,
}

impl ColorMixRecipe {
    /// `(display name, parts)` for every pigment actually used.
    pub fn parts(&self) -> Vec<(&'static str, u32)> {
        Pigment::ALL
            .iter()
            .map(|p| (p.display_name(), self.entry.mix.parts(*p)))
            .filter(|(_, parts)| *parts > 0)
            .collect()
    }

    pub fn total_parts(&self) -> u32 {
        self.parts().iter().map(|(_, n)| n).sum()
    }

    pub fn notes(&self) -> &str {
        &self.entry.notes
    }
}

/// Parse `#rgb`, `rgb`, `#rrggbb` or `rrggbb` (any case).
pub fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.trim();
    let digits = digits.strip_prefix('#').unwrap_or(digits);
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match digits.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in digits.chars().enumerate() {
                out[i] = channel(&format!("{c}{c}"))?;
            }
            Some(out)
        }
        6 => Some([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ]),
        _ => None,
    }
}

pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[inline]
fn distance_squared(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Built-in palette, parsed once.
pub fn default_palette() -> &'static [PaletteEntry] {
    static PALETTE: OnceLock<Vec<PaletteEntry>> = OnceLock::new();
    PALETTE.get_or_init(|| {
        serde_json::from_str(include_str!("../data/color_palette_mixer.json")).unwrap_or_else(|e| {
            error!("built-in colour palette is malformed: {e}");
            Vec::new()
        })
    })
}

/// Closest palette entry by squared RGB distance; the first entry wins ties.
/// `None` when `hex` is unparseable or the palette is empty.
pub fn find_closest(hex: &str, palette: &[PaletteEntry]) -> Option<ColorMixRecipe> {
    let target = parse_hex(hex)?;
    let mut best: Option<(&PaletteEntry, u32)> = None;
    for entry in palette {
        let d = distance_squared(target, entry.rgb());
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((entry, d));
        }
    }
    best.map(|(entry, distance_squared)| ColorMixRecipe {
        target_hex: rgb_to_hex(target),
        entry: entry.clone(),
        distance_squared,
    })
}

/// [`find_closest`] against the built-in palette.
pub fn recipe_for(hex: &str) -> Option<ColorMixRecipe> {
    find_closest(hex, default_palette())
}
