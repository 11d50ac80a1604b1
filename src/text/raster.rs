use crate::foundation::error::ReflowResult;

/// Placement of a rendered glyph relative to the baseline pen position.
/// `top` is negative for anything reaching above the baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlyphBounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Row-major 8-bit coverage produced by a rasterizer.
#[derive(Clone, Debug)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

/// One rasterized glyph. Whitespace and other invisible glyphs carry an
/// advance but no bitmap.
#[derive(Clone, Debug)]
pub struct RasterizedGlyph {
    pub advance: f32,
    pub bounds: GlyphBounds,
    pub bitmap: Option<GlyphBitmap>,
}

/// The seam between text layout and a concrete font backend.
///
/// All metrics are in pixels at the given size. Implementations must be
/// deterministic: the same inputs yield the same coverage, since results
/// are cached aggressively and never re-rendered.
pub trait FontRasterizer {
    /// Render a glyph. `outline` is the stroke radius in pixels; zero means
    /// a plain fill.
    fn glyph(
        &self,
        ch: char,
        px_size: u32,
        bold: bool,
        outline: f32,
    ) -> ReflowResult<RasterizedGlyph>;

    /// Horizontal kerning adjustment between two neighboring characters.
    fn kerning(&self, left: char, right: char, px_size: u32, bold: bool) -> f32;

    /// Baseline-to-baseline distance.
    fn line_spacing(&self, px_size: u32) -> f32;

    /// Height above the baseline.
    fn ascent(&self, px_size: u32) -> f32;

    /// Depth below the baseline, as a positive number.
    fn descent(&self, px_size: u32) -> f32;

    /// Offset of the underline center below the baseline. Fonts rarely ship
    /// a usable value, so the default is a tenth of the size.
    fn underline_position(&self, px_size: u32) -> f32 {
        px_size as f32 / 10.0
    }

    /// Thickness of underline and strikethrough strokes.
    fn underline_thickness(&self, px_size: u32) -> f32 {
        px_size as f32 / 14.0
    }
}
