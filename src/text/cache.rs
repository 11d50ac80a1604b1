use std::collections::HashMap;

use tracing::{debug, warn};

use crate::foundation::core::TextureRect;
use crate::foundation::error::ReflowResult;
use crate::text::atlas::GlyphAtlas;
use crate::text::raster::{FontRasterizer, GlyphBounds};
use crate::text::TextureSink;

/// Padding around each glyph in the atlas so bilinear sampling (and the one
/// pixel quad expansion in text layout) never bleeds a neighbor.
const GLYPH_PADDING: u32 = 2;

/// Cached glyph: metrics plus where its coverage lives in the atlas.
/// `texture_rect` is empty for glyphs with no visible pixels.
#[derive(Clone, Copy, Debug)]
pub struct Glyph {
    pub advance: f32,
    pub bounds: GlyphBounds,
    pub texture_rect: TextureRect,
}

/// Rendered-glyph cache for one font face.
///
/// Entries are append-only; a glyph once rendered keeps its atlas slot until
/// [`GlyphCache::reset`] throws everything away wholesale. There is no
/// per-glyph eviction, matching how UI text reuses a small working set.
pub struct GlyphCache {
    rasterizer: Box<dyn FontRasterizer>,
    atlas: GlyphAtlas,
    glyphs: HashMap<u64, Glyph>,
    /// Oversampling factor for high-DPI targets. Glyphs render at
    /// `px_size * scale` while metrics stay in logical pixels.
    scale: f32,
}

impl GlyphCache {
    pub fn new(rasterizer: Box<dyn FontRasterizer>) -> Self {
        Self::with_atlas(rasterizer, GlyphAtlas::default())
    }

    pub fn with_atlas(rasterizer: Box<dyn FontRasterizer>, atlas: GlyphAtlas) -> Self {
        Self {
            rasterizer,
            atlas,
            glyphs: HashMap::new(),
            scale: 1.0,
        }
    }

    pub fn font_scale(&self) -> f32 {
        self.scale
    }

    /// Change the oversampling factor. Every cached glyph was rendered at
    /// the old scale, so this resets the cache wholesale.
    pub fn set_font_scale(&mut self, scale: f32) {
        let scale = scale.max(0.01);
        if scale != self.scale {
            self.scale = scale;
            self.reset();
        }
    }

    fn scaled(&self, px_size: u32) -> u32 {
        ((px_size as f32 * self.scale).round() as u32).max(1)
    }

    /// Fetch a glyph, rasterizing and packing it on first use. A glyph the
    /// backend cannot render is cached as empty and never retried; only an
    /// exhausted atlas is an error.
    pub fn glyph(
        &mut self,
        ch: char,
        px_size: u32,
        bold: bool,
        outline: f32,
    ) -> ReflowResult<Glyph> {
        let key = glyph_key(ch, px_size, bold, outline);
        if let Some(glyph) = self.glyphs.get(&key) {
            return Ok(*glyph);
        }
        let rendered = match self
            .rasterizer
            .glyph(ch, self.scaled(px_size), bold, outline * self.scale)
        {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(character = %ch, %err, "glyph rasterization failed; caching an empty glyph");
                let glyph = Glyph {
                    advance: 0.0,
                    bounds: GlyphBounds::default(),
                    texture_rect: TextureRect::default(),
                };
                self.glyphs.insert(key, glyph);
                return Ok(glyph);
            }
        };
        let texture_rect = match &rendered.bitmap {
            Some(bitmap) if bitmap.width > 0 && bitmap.height > 0 => {
                let padded = self.atlas.allocate(
                    bitmap.width + 2 * GLYPH_PADDING,
                    bitmap.height + 2 * GLYPH_PADDING,
                )?;
                let inner = TextureRect::new(
                    padded.x + GLYPH_PADDING,
                    padded.y + GLYPH_PADDING,
                    bitmap.width,
                    bitmap.height,
                );
                self.atlas.write_alpha(inner, &bitmap.alpha);
                inner
            }
            _ => TextureRect::default(),
        };
        let inv = 1.0 / self.scale;
        let glyph = Glyph {
            advance: rendered.advance * inv,
            bounds: GlyphBounds {
                left: rendered.bounds.left * inv,
                top: rendered.bounds.top * inv,
                width: rendered.bounds.width * inv,
                height: rendered.bounds.height * inv,
            },
            texture_rect,
        };
        self.glyphs.insert(key, glyph);
        Ok(glyph)
    }

    pub fn kerning(&self, left: char, right: char, px_size: u32, bold: bool) -> f32 {
        self.rasterizer
            .kerning(left, right, self.scaled(px_size), bold)
            / self.scale
    }

    pub fn line_spacing(&self, px_size: u32) -> f32 {
        self.rasterizer.line_spacing(self.scaled(px_size)) / self.scale
    }

    pub fn ascent(&self, px_size: u32) -> f32 {
        self.rasterizer.ascent(self.scaled(px_size)) / self.scale
    }

    pub fn descent(&self, px_size: u32) -> f32 {
        self.rasterizer.descent(self.scaled(px_size)) / self.scale
    }

    pub fn underline_position(&self, px_size: u32) -> f32 {
        self.rasterizer.underline_position(self.scaled(px_size)) / self.scale
    }

    pub fn underline_thickness(&self, px_size: u32) -> f32 {
        self.rasterizer.underline_thickness(self.scaled(px_size)) / self.scale
    }

    pub fn atlas(&self) -> &GlyphAtlas {
        &self.atlas
    }

    /// Current texture version; compare against the value seen at the last
    /// upload to know whether cached vertices or textures are stale.
    pub fn texture_version(&self) -> u64 {
        self.atlas.version()
    }

    /// Push atlas pixels to a sink if anything changed since `seen_version`.
    /// Returns the version the sink is now caught up to.
    pub fn sync_texture(&self, sink: &mut dyn TextureSink, seen_version: u64) -> u64 {
        let version = self.atlas.version();
        if version != seen_version {
            sink.upload(self.atlas.size(), self.atlas.pixels());
        }
        version
    }

    /// Drop every cached glyph and start over with a fresh atlas. The only
    /// recovery from a full atlas.
    pub fn reset(&mut self) {
        debug!(glyphs = self.glyphs.len(), "resetting glyph cache");
        self.atlas = GlyphAtlas::new(self.atlas.max_size());
        self.glyphs.clear();
    }

    #[cfg(test)]
    pub(crate) fn cached_count(&self) -> usize {
        self.glyphs.len()
    }
}

/// Pack the lookup key into one u64: character, pixel size, bold flag, and
/// the outline thickness quantized to 1/64 px.
fn glyph_key(ch: char, px_size: u32, bold: bool, outline: f32) -> u64 {
    let quantized = (outline * 64.0).round().clamp(0.0, 16383.0) as u64;
    ((bold as u64) << 63) | (quantized << 49) | (((px_size & 0x1FFFF) as u64) << 32) | ch as u64
}
