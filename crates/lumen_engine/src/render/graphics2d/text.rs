//! Bitmap and SDF fonts for the 2D draw list
//!
//! Rasterizing a font file is done by an external loader; a [`Font`] is built
//! from the resulting single-channel atlas and its glyph metrics. Layout
//! works in pixels with a top-left origin and y growing downwards.

use std::collections::HashMap;

use crate::foundation::math::Vec2;
use crate::render::device::{GraphicsDevice, TextureFilter, TextureFormat};
use crate::render::texture::Texture;
use crate::render::RenderError;

/// Metrics and atlas location of one glyph, in atlas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    /// Bitmap size
    pub size: Vec2,
    /// Offset from the pen position: x to the left edge, y from the baseline up to the top edge
    pub bearing: Vec2,
    /// Horizontal pen advance
    pub advance: f32,
    /// Top-left atlas coordinate (normalized)
    pub uv_min: Vec2,
    /// Bottom-right atlas coordinate (normalized)
    pub uv_max: Vec2,
}

impl Glyph {
    /// Distance from the baseline down to the bottom edge
    pub fn bottom_bearing(&self) -> f32 {
        self.size.y - self.bearing.y
    }
}

/// Glyph atlas plus metrics
#[derive(Debug, Clone)]
pub struct Font {
    texture: Texture,
    pixel_size: f32,
    glyphs: HashMap<char, Glyph>,
    max_height: f32,
    sdf: bool,
}

impl Font {
    /// Upload an R8 atlas and wrap its metrics
    ///
    /// `pixel_size` is the size the atlas was rasterized at; `sdf` marks a
    /// signed-distance-field atlas.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        atlas_width: u32,
        atlas_height: u32,
        atlas: &[u8],
        pixel_size: f32,
        glyphs: HashMap<char, Glyph>,
        sdf: bool,
    ) -> Result<Self, RenderError> {
        let texture = Texture::from_pixels(
            device,
            atlas_width,
            atlas_height,
            TextureFormat::R8,
            atlas,
            TextureFilter::Linear,
        )?;
        Ok(Self::from_texture(texture, pixel_size, glyphs, sdf))
    }

    /// Wrap an already uploaded atlas
    pub fn from_texture(texture: Texture, pixel_size: f32, glyphs: HashMap<char, Glyph>, sdf: bool) -> Self {
        let max_height = glyphs.values().map(|g| g.size.y).fold(0.0, f32::max);
        log::debug!(
            "Font with {} glyphs at {}px (max height {}, sdf: {})",
            glyphs.len(),
            pixel_size,
            max_height,
            sdf
        );
        Self {
            texture,
            pixel_size: pixel_size.max(1.0),
            glyphs,
            max_height,
            sdf,
        }
    }

    /// Atlas texture
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Size the atlas was rasterized at
    pub fn pixel_size(&self) -> f32 {
        self.pixel_size
    }

    /// Tallest glyph bitmap in atlas pixels
    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    /// Whether the atlas holds distance fields
    pub fn is_sdf(&self) -> bool {
        self.sdf
    }

    /// Look up a glyph
    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(&ch)
    }

    /// Delete the atlas texture
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.texture.release(device);
    }
}

/// One glyph quad placed by [`layout`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedGlyph {
    /// Top-left corner in pixels
    pub min: Vec2,
    /// Bottom-right corner in pixels
    pub max: Vec2,
    /// Top-left atlas coordinate
    pub uv_min: Vec2,
    /// Bottom-right atlas coordinate
    pub uv_max: Vec2,
}

/// Result of laying out a string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    /// Quads in reading order
    pub glyphs: Vec<PlacedGlyph>,
    /// Width of the widest line and total height
    pub size: Vec2,
}

/// Lay out `text` at `origin` with glyphs scaled to `font_size`
///
/// Pen advances are scaled by `font_size / pixel_size`. A newline returns the
/// pen to `origin.x` and moves it down by the font's tallest glyph. The
/// baseline of the first line sits below `origin.y` by the tallest glyph's
/// `bearing.y - bottom_bearing`, applied once for the whole block. Characters
/// without a glyph are skipped.
pub fn layout(font: &Font, text: &str, origin: Vec2, font_size: f32) -> TextLayout {
    let scale = font_size / font.pixel_size();
    let line_height = font.max_height() * scale;

    let first_line = text.split('\n').next().unwrap_or_default();
    let baseline_offset = first_line
        .chars()
        .filter_map(|ch| font.glyph(ch))
        .fold(None::<&Glyph>, |tallest, glyph| match tallest {
            Some(t) if t.size.y >= glyph.size.y => Some(t),
            _ => Some(glyph),
        })
        .map_or(0.0, |tallest| (tallest.bearing.y - tallest.bottom_bearing()) * scale);

    let mut result = TextLayout::default();
    let mut pen = Vec2::new(origin.x, origin.y + baseline_offset);
    let mut line_width: f32 = 0.0;
    let mut lines = 1;

    for ch in text.chars() {
        if ch == '\n' {
            result.size.x = result.size.x.max(line_width);
            line_width = 0.0;
            pen.x = origin.x;
            pen.y += line_height;
            lines += 1;
            continue;
        }

        let Some(glyph) = font.glyph(ch) else {
            continue;
        };

        let min = Vec2::new(pen.x + glyph.bearing.x * scale, pen.y - glyph.bearing.y * scale);
        let max = min + glyph.size * scale;
        if glyph.size.x > 0.0 && glyph.size.y > 0.0 {
            result.glyphs.push(PlacedGlyph {
                min,
                max,
                uv_min: glyph.uv_min,
                uv_max: glyph.uv_max,
            });
        }

        pen.x += glyph.advance * scale;
        line_width += glyph.advance * scale;
    }

    result.size.x = result.size.x.max(line_width);
    result.size.y = lines as f32 * line_height;
    result
}
