//! Glyph rasterization, atlas packing, and text vertex layout.
//!
//! A [`GlyphCache`] owns a [`FontRasterizer`] and a [`GlyphAtlas`]; rendered
//! glyph coverage lands in the atlas and cached metrics are handed out by
//! value. [`TextLayout`] turns a string plus style into textured vertices
//! against that cache. The pipeline is renderer-agnostic: hosts receive
//! atlas pixels through [`TextureSink`] and draw the vertices however they
//! like.

mod atlas;
mod cache;
mod layout;
mod raster;
mod truetype;

pub use atlas::GlyphAtlas;
pub use cache::{Glyph, GlyphCache};
pub use layout::{TextLayout, TextStyle};
pub use raster::{FontRasterizer, GlyphBitmap, GlyphBounds, RasterizedGlyph};
pub use truetype::TrueTypeRasterizer;

/// Receives atlas pixel uploads. `pixels` is tightly packed RGBA covering
/// the whole `size` by `size` texture; a size change means the atlas grew
/// and the texture must be reallocated.
pub trait TextureSink {
    fn upload(&mut self, size: u32, pixels: &[u8]);
}
