// Overlay text: a TrueType face when one is available, 3x5 bitmap glyphs otherwise

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, info};

use crate::error::{EmotionTrackerError, Result};

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
/// TrueType pixel height per unit of text scale
const TRUETYPE_PX_PER_SCALE: f32 = 8.0;

const FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/truetype",
    "/usr/share/fonts/TTF",
    "/usr/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts",
    "/System/Library/Fonts/Supplemental",
    "C:\\Windows\\Fonts",
];

/// Draws and measures overlay text.
///
/// Letters in the bitmap fallback render uppercase and unknown characters
/// render as a filled block.
pub struct TextRenderer {
    font: Option<FontVec>,
}

impl TextRenderer {
    /// Renderer that only uses the built-in bitmap glyphs
    pub fn bitmap() -> Self {
        Self { font: None }
    }

    /// Renderer backed by TrueType/OpenType font data
    pub fn from_font_data(data: Vec<u8>) -> Result<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| EmotionTrackerError::Config(format!("invalid font data: {e}")))?;
        Ok(Self { font: Some(font) })
    }

    /// Looks up `family` (a family name or a font file path) in the usual
    /// system font locations, falling back to the bitmap glyphs
    pub fn load(family: &str) -> Self {
        if family.is_empty() {
            return Self::bitmap();
        }

        for path in font_candidates(family) {
            let Ok(data) = fs::read(&path) else {
                continue;
            };
            match Self::from_font_data(data) {
                Ok(renderer) => {
                    info!("Loaded overlay font from {}", path.display());
                    return renderer;
                }
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        info!("Font '{}' not found, using bitmap text", family);
        Self::bitmap()
    }

    pub fn is_truetype(&self) -> bool {
        self.font.is_some()
    }

    /// Draws `text` with its top-left corner at `(x, y)`, clipped to the image
    pub fn draw(
        &self,
        image: &mut RgbImage,
        x: i32,
        y: i32,
        text: &str,
        color: Rgb<u8>,
        scale: u32,
    ) {
        match &self.font {
            Some(font) => draw_text_mut(image, color, x, y, px_scale(scale), font, text),
            None => draw_bitmap_text(image, x, y, text, color, scale),
        }
    }

    /// Width in pixels of `text` at `scale`
    pub fn width(&self, text: &str, scale: u32) -> u32 {
        match &self.font {
            Some(font) => text_size(px_scale(scale), font, text).0,
            None => text.chars().count() as u32 * advance(scale),
        }
    }

    /// Height in pixels of one line at `scale`
    pub fn height(&self, scale: u32) -> u32 {
        match &self.font {
            Some(font) => font.as_scaled(px_scale(scale)).height().ceil() as u32,
            None => GLYPH_HEIGHT * scale.max(1),
        }
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::bitmap()
    }
}

impl fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRenderer")
            .field("truetype", &self.is_truetype())
            .finish()
    }
}

fn px_scale(scale: u32) -> PxScale {
    PxScale::from(scale.max(1) as f32 * TRUETYPE_PX_PER_SCALE)
}

fn font_candidates(family: &str) -> Vec<PathBuf> {
    let direct = Path::new(family);
    let is_file_name = direct
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"));
    if is_file_name {
        return vec![direct.to_path_buf()];
    }

    let mut candidates = vec![PathBuf::from(format!("{family}.ttf"))];
    for dir in FONT_DIRS {
        candidates.push(Path::new(dir).join(format!("{family}.ttf")));
        candidates.push(Path::new(dir).join(format!("{family}.otf")));
    }
    candidates
}

fn draw_bitmap_text(
    image: &mut RgbImage,
    x: i32,
    y: i32,
    text: &str,
    color: Rgb<u8>,
    scale: u32,
) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(image, cx, y, c, color, scale);
        cx += advance(scale) as i32;
    }
}

fn advance(scale: u32) -> u32 {
    // 3 width + 1 spacing, scaled
    (GLYPH_WIDTH + 1) * scale.max(1)
}

fn draw_char(image: &mut RgbImage, x: i32, y: i32, c: char, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1);
    let rows = glyph(c);

    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            // column 0 is bit 2
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + (col * scale + dx) as i32;
                    let py = y + (row as u32 * scale + dy) as i32;
                    if px >= 0
                        && py >= 0
                        && (px as u32) < image.width()
                        && (py as u32) < image.height()
                    {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x7],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x5, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'Q' => [0x7, 0x5, 0x5, 0x7, 0x1],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x5, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '/' => [0x1, 0x1, 0x2, 0x4, 0x4],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    }
}
