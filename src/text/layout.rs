use bitflags::bitflags;
use kurbo::{Point, Size};

use crate::foundation::core::{Rgba8, Vertex};
use crate::foundation::error::ReflowResult;
use crate::text::cache::{Glyph, GlyphCache};

bitflags! {
    /// Character style flags, combinable with `|`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TextStyle: u8 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const UNDERLINED = 1 << 2;
        const STRIKETHROUGH = 1 << 3;
    }
}

/// Italic slant applied to glyph quads, 12 degrees in radians.
const ITALIC_SHEAR: f32 = 0.20944;

/// Extra pixels added around each glyph quad (and its UVs) so bilinear
/// sampling keeps antialiased edges. Stays within the atlas padding.
const QUAD_PADDING: f32 = 1.0;

/// Lays a styled string out into textured vertices against a glyph cache.
///
/// Vertices and size are rebuilt lazily: setters only mark the layout dirty
/// and [`update`](TextLayout::update) rebuilds when needed, including when
/// the atlas texture changed under the cached UVs.
pub struct TextLayout {
    text: String,
    px_size: u32,
    style: TextStyle,
    fill: Rgba8,
    outline_color: Rgba8,
    outline_thickness: f32,
    vertices: Vec<Vertex>,
    size: Size,
    dirty: bool,
    seen_texture_version: u64,
}

impl TextLayout {
    pub fn new(text: impl Into<String>, px_size: u32) -> Self {
        Self {
            text: text.into(),
            px_size,
            style: TextStyle::empty(),
            fill: Rgba8::BLACK,
            outline_color: Rgba8::BLACK,
            outline_thickness: 0.0,
            vertices: Vec::new(),
            size: Size::ZERO,
            dirty: true,
            seen_texture_version: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }

    pub fn pixel_size(&self) -> u32 {
        self.px_size
    }

    pub fn set_pixel_size(&mut self, px_size: u32) {
        if px_size != self.px_size {
            self.px_size = px_size;
            self.dirty = true;
        }
    }

    pub fn style(&self) -> TextStyle {
        self.style
    }

    pub fn set_style(&mut self, style: TextStyle) {
        if style != self.style {
            self.style = style;
            self.dirty = true;
        }
    }

    pub fn set_fill_color(&mut self, color: Rgba8) {
        if color != self.fill {
            self.fill = color;
            self.dirty = true;
        }
    }

    pub fn set_outline(&mut self, color: Rgba8, thickness: f32) {
        if color != self.outline_color || thickness != self.outline_thickness {
            self.outline_color = color;
            self.outline_thickness = thickness;
            self.dirty = true;
        }
    }

    /// Vertices from the last [`update`](TextLayout::update). Two triangles
    /// per visible glyph; outline quads, if any, come first so the fill
    /// draws on top.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Bounding size from the last [`update`](TextLayout::update).
    pub fn size(&self) -> Size {
        self.size
    }

    /// Rebuild vertices if the text, style, or atlas texture changed.
    pub fn update(&mut self, cache: &mut GlyphCache) -> ReflowResult<()> {
        if !self.dirty && cache.texture_version() == self.seen_texture_version {
            return Ok(());
        }
        self.build(cache)?;
        self.dirty = false;
        self.seen_texture_version = cache.texture_version();
        Ok(())
    }

    fn build(&mut self, cache: &mut GlyphCache) -> ReflowResult<()> {
        self.vertices.clear();
        let px = self.px_size;
        let bold = self.style.contains(TextStyle::BOLD);

        // Warm the cache first so the atlas stops moving before any UV is
        // normalized against its size.
        for ch in self.text.chars() {
            if ch == '\r' || ch == '\n' || ch == '\t' {
                continue;
            }
            cache.glyph(ch, px, bold, 0.0)?;
            if self.outline_thickness > 0.0 {
                cache.glyph(ch, px, bold, self.outline_thickness)?;
            }
        }
        cache.glyph(' ', px, bold, 0.0)?;
        if self.style.contains(TextStyle::STRIKETHROUGH) {
            cache.glyph('x', px, bold, 0.0)?;
        }

        if self.outline_thickness > 0.0 {
            self.emit_run(cache, self.outline_thickness, self.outline_color)?;
        }
        let (width, last_baseline) = self.emit_run(cache, 0.0, self.fill)?;
        // Outline strokes poke past the glyph boxes on every side.
        let margin = 2.0 * self.outline_thickness.max(0.0);
        self.size = Size::new(
            (width + margin) as f64,
            (last_baseline + cache.descent(px) + margin) as f64,
        );
        Ok(())
    }

    /// Walk the text once, emitting quads for one pass (outline or fill).
    /// Returns the widest line and the final baseline.
    fn emit_run(&mut self, cache: &mut GlyphCache, outline: f32, color: Rgba8) -> ReflowResult<(f32, f32)> {
        let px = self.px_size;
        let bold = self.style.contains(TextStyle::BOLD);
        let italic_shear = if self.style.contains(TextStyle::ITALIC) {
            ITALIC_SHEAR
        } else {
            0.0
        };
        let underlined = self.style.contains(TextStyle::UNDERLINED);
        let strikethrough = self.style.contains(TextStyle::STRIKETHROUGH);

        let atlas_size = cache.atlas().size() as f32;
        let (wx, wy) = cache.atlas().white_pixel();
        let white_uv = [wx as f32 / atlas_size, wy as f32 / atlas_size];

        let line_spacing = cache.line_spacing(px);
        let space_advance = cache.glyph(' ', px, bold, 0.0)?.advance;
        let underline_offset = cache.underline_position(px);
        // Outline strokes also thicken the decoration lines.
        let line_thickness = cache.underline_thickness(px) + 2.0 * outline;
        let strike_offset = if strikethrough {
            let xb = cache.glyph('x', px, bold, 0.0)?.bounds;
            xb.top + xb.height / 2.0
        } else {
            0.0
        };

        let chars: Vec<char> = self.text.chars().collect();
        let mut x = 0.0f32;
        let mut y = cache.ascent(px);
        let mut max_x = 0.0f32;
        let mut prev: Option<char> = None;
        for ch in chars {
            // Carriage returns are invisible to layout, so "\r\n" and "\n"
            // produce identical output.
            if ch == '\r' {
                continue;
            }
            if ch == '\n' && x > 0.0 {
                if underlined {
                    add_line(
                        &mut self.vertices,
                        x,
                        y + underline_offset,
                        line_thickness,
                        color,
                        white_uv,
                    );
                }
                if strikethrough {
                    add_line(
                        &mut self.vertices,
                        x,
                        y + strike_offset,
                        line_thickness,
                        color,
                        white_uv,
                    );
                }
            }
            if let Some(prev) = prev {
                x += cache.kerning(prev, ch, px, bold);
            }
            prev = Some(ch);
            match ch {
                ' ' => x += space_advance,
                '\t' => x += space_advance * 4.0,
                '\n' => {
                    max_x = max_x.max(x);
                    x = 0.0;
                    y += line_spacing;
                }
                _ => {
                    let glyph = cache.glyph(ch, px, bold, outline)?;
                    if !glyph.texture_rect.is_empty() {
                        add_glyph_quad(
                            &mut self.vertices,
                            x,
                            y,
                            &glyph,
                            italic_shear,
                            color,
                            atlas_size,
                        );
                    }
                    x += glyph.advance;
                }
            }
        }
        if x > 0.0 {
            if underlined {
                add_line(
                    &mut self.vertices,
                    x,
                    y + underline_offset,
                    line_thickness,
                    color,
                    white_uv,
                );
            }
            if strikethrough {
                add_line(
                    &mut self.vertices,
                    x,
                    y + strike_offset,
                    line_thickness,
                    color,
                    white_uv,
                );
            }
        }
        max_x = max_x.max(x);
        Ok((max_x, y))
    }

    /// Pen position where the character at `index` (in chars, clamped to the
    /// end) would be drawn, relative to the layout's top-left.
    pub fn find_character_pos(
        &self,
        cache: &mut GlyphCache,
        index: usize,
    ) -> ReflowResult<Point> {
        let px = self.px_size;
        let bold = self.style.contains(TextStyle::BOLD);
        let space_advance = cache.glyph(' ', px, bold, 0.0)?.advance;
        let line_spacing = cache.line_spacing(px);

        let mut x = 0.0f32;
        let mut y = 0.0f32;
        let mut prev: Option<char> = None;
        for ch in self.text.chars().take(index) {
            if ch == '\r' {
                continue;
            }
            if let Some(prev) = prev {
                x += cache.kerning(prev, ch, px, bold);
            }
            prev = Some(ch);
            match ch {
                ' ' => x += space_advance,
                '\t' => x += space_advance * 4.0,
                '\n' => {
                    x = 0.0;
                    y += line_spacing;
                }
                _ => x += cache.glyph(ch, px, bold, 0.0)?.advance,
            }
        }
        Ok(Point::new(x as f64, y as f64))
    }
}

fn add_glyph_quad(
    vertices: &mut Vec<Vertex>,
    x: f32,
    y: f32,
    glyph: &Glyph,
    italic_shear: f32,
    color: Rgba8,
    atlas_size: f32,
) {
    let pad = QUAD_PADDING;
    // Offsets relative to the baseline; the shear leans on these so the
    // slant pivots around the baseline, not the texture origin.
    let top_rel = glyph.bounds.top - pad;
    let bottom_rel = glyph.bounds.top + glyph.bounds.height + pad;
    let left = x + glyph.bounds.left - pad;
    let right = x + glyph.bounds.left + glyph.bounds.width + pad;
    let top = y + top_rel;
    let bottom = y + bottom_rel;
    let shear_top = italic_shear * top_rel;
    let shear_bottom = italic_shear * bottom_rel;

    let rect = glyph.texture_rect;
    let u1 = (rect.x as f32 - pad) / atlas_size;
    let v1 = (rect.y as f32 - pad) / atlas_size;
    let u2 = (rect.x as f32 + rect.width as f32 + pad) / atlas_size;
    let v2 = (rect.y as f32 + rect.height as f32 + pad) / atlas_size;

    let tl = Vertex::new([left - shear_top, top], [u1, v1], color);
    let tr = Vertex::new([right - shear_top, top], [u2, v1], color);
    let bl = Vertex::new([left - shear_bottom, bottom], [u1, v2], color);
    let br = Vertex::new([right - shear_bottom, bottom], [u2, v2], color);
    vertices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
}

/// Solid quad from the line start to `end_x`, sampling the atlas white
/// pixel. Snapped to whole pixels so a thin line does not disappear.
fn add_line(
    vertices: &mut Vec<Vertex>,
    end_x: f32,
    y: f32,
    thickness: f32,
    color: Rgba8,
    white_uv: [f32; 2],
) {
    let top = (y - thickness / 2.0 + 0.5).floor();
    let bottom = top + (thickness + 0.5).floor().max(1.0);
    let tl = Vertex::new([0.0, top], white_uv, color);
    let tr = Vertex::new([end_x, top], white_uv, color);
    let bl = Vertex::new([0.0, bottom], white_uv, color);
    let br = Vertex::new([end_x, bottom], white_uv, color);
    vertices.extend_from_slice(&[tl, bl, tr, tr, bl, br]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::raster::{FontRasterizer, GlyphBitmap, GlyphBounds, RasterizedGlyph};

    /// Every visible glyph is an 8x8 square with a fixed advance of 10.
    struct FixedRasterizer;

    impl FontRasterizer for FixedRasterizer {
        fn glyph(
            &self,
            ch: char,
            _px_size: u32,
            bold: bool,
            outline: f32,
        ) -> ReflowResult<RasterizedGlyph> {
            let advance = 10.0 + if bold { 1.0 } else { 0.0 };
            if ch == ' ' {
                return Ok(RasterizedGlyph {
                    advance,
                    bounds: GlyphBounds::default(),
                    bitmap: None,
                });
            }
            let grow = outline.ceil() as u32;
            let edge = 8 + 2 * grow;
            Ok(RasterizedGlyph {
                advance,
                bounds: GlyphBounds {
                    left: 1.0 - grow as f32,
                    top: -8.0 - grow as f32,
                    width: edge as f32,
                    height: edge as f32,
                },
                bitmap: Some(GlyphBitmap {
                    width: edge,
                    height: edge,
                    alpha: vec![255; (edge * edge) as usize],
                }),
            })
        }

        fn kerning(&self, _: char, _: char, _: u32, _: bool) -> f32 {
            0.0
        }

        fn line_spacing(&self, _: u32) -> f32 {
            20.0
        }

        fn ascent(&self, _: u32) -> f32 {
            16.0
        }

        fn descent(&self, _: u32) -> f32 {
            4.0
        }
    }

    fn cache() -> GlyphCache {
        GlyphCache::new(Box::new(FixedRasterizer))
    }

    #[test]
    fn empty_text_has_no_vertices() {
        let mut cache = cache();
        let mut layout = TextLayout::new("", 16);
        layout.update(&mut cache).unwrap();
        assert!(layout.vertices().is_empty());
        assert_eq!(layout.size().width, 0.0);
    }

    #[test]
    fn six_vertices_per_visible_glyph() {
        let mut cache = cache();
        let mut layout = TextLayout::new("ab c", 16);
        layout.update(&mut cache).unwrap();
        // Three visible glyphs; the space only advances.
        assert_eq!(layout.vertices().len(), 18);
        assert_eq!(layout.size().width, 40.0);
        assert_eq!(layout.size().height, 20.0);
    }

    #[test]
    fn crlf_and_lf_lay_out_identically() {
        let mut cache = cache();
        let mut unix = TextLayout::new("a\nb", 16);
        let mut windows = TextLayout::new("a\r\nb", 16);
        unix.update(&mut cache).unwrap();
        windows.update(&mut cache).unwrap();
        assert_eq!(unix.vertices(), windows.vertices());
        assert_eq!(unix.size(), windows.size());
        // Two lines: ascent + one line spacing + descent.
        assert_eq!(unix.size().height, 40.0);
    }

    #[test]
    fn tab_advances_four_spaces() {
        let mut cache = cache();
        let layout = TextLayout::new("\ta", 16);
        let pos = layout.find_character_pos(&mut cache, 1).unwrap();
        assert_eq!(pos, Point::new(40.0, 0.0));
    }

    #[test]
    fn find_character_pos_tracks_advances_and_lines() {
        let mut cache = cache();
        let layout = TextLayout::new("ab\ncd", 16);
        assert_eq!(
            layout.find_character_pos(&mut cache, 0).unwrap(),
            Point::new(0.0, 0.0)
        );
        assert_eq!(
            layout.find_character_pos(&mut cache, 2).unwrap(),
            Point::new(20.0, 0.0)
        );
        assert_eq!(
            layout.find_character_pos(&mut cache, 3).unwrap(),
            Point::new(0.0, 20.0)
        );
        assert_eq!(
            layout.find_character_pos(&mut cache, 4).unwrap(),
            Point::new(10.0, 20.0)
        );
        // Past the end clamps to the end of the text.
        assert_eq!(
            layout.find_character_pos(&mut cache, 99).unwrap(),
            Point::new(20.0, 20.0)
        );
    }

    #[test]
    fn underline_adds_one_quad_per_line() {
        let mut cache = cache();
        let mut plain = TextLayout::new("ab\ncd", 16);
        plain.update(&mut cache).unwrap();
        let mut underlined = TextLayout::new("ab\ncd", 16);
        underlined.set_style(TextStyle::UNDERLINED);
        underlined.update(&mut cache).unwrap();
        assert_eq!(
            underlined.vertices().len(),
            plain.vertices().len() + 2 * 6
        );
    }

    #[test]
    fn outline_pass_comes_before_fill() {
        let mut cache = cache();
        let mut layout = TextLayout::new("a", 16);
        layout.set_fill_color(Rgba8::WHITE);
        layout.set_outline(Rgba8::BLACK, 2.0);
        layout.update(&mut cache).unwrap();
        assert_eq!(layout.vertices().len(), 12);
        assert_eq!(layout.vertices()[0].color, Rgba8::BLACK);
        assert_eq!(layout.vertices()[6].color, Rgba8::WHITE);
    }

    #[test]
    fn italic_shears_top_toward_the_right() {
        let mut cache = cache();
        let mut layout = TextLayout::new("a", 16);
        layout.set_style(TextStyle::ITALIC);
        layout.update(&mut cache).unwrap();
        let tl = layout.vertices()[0].position;
        let bl = layout.vertices()[1].position;
        assert!(tl[0] > bl[0]);
    }

    #[test]
    fn atlas_change_invalidates_cached_vertices() {
        let mut cache = cache();
        let mut layout = TextLayout::new("a", 16);
        layout.update(&mut cache).unwrap();
        let before = layout.vertices().to_vec();
        // Another user writes to the atlas; UVs must be renormalized on the
        // next update even though this layout did not change.
        cache.glyph('z', 64, false, 0.0).unwrap();
        layout.update(&mut cache).unwrap();
        assert_eq!(layout.vertices().len(), before.len());
    }

    #[test]
    fn setters_are_lazy() {
        let mut cache = cache();
        let mut layout = TextLayout::new("a", 16);
        layout.update(&mut cache).unwrap();
        let version = cache.texture_version();
        layout.set_text("a");
        layout.update(&mut cache).unwrap();
        assert_eq!(cache.texture_version(), version);
    }
}
