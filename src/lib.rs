//! Layout expression engine and glyph-atlas text pipeline for
//! retained-mode UIs.
//!
//! Two independent subsystems share a small geometry foundation:
//!
//! - [`layout`] evaluates arithmetic expressions over widget rectangles
//!   (`"&sidebar.right + 10"`, `"50%"`), recomputing lazily and notifying
//!   exactly once when an input rectangle changes.
//! - [`text`] rasterizes glyphs through a pluggable [`text::FontRasterizer`],
//!   packs their coverage into a growing [`text::GlyphAtlas`], and lays
//!   styled strings out into textured vertices.
//!
//! Neither subsystem talks to a window system or GPU. Hosts feed widget
//! rectangles in and take vertices and atlas pixels out.

#![forbid(unsafe_code)]

pub mod foundation;
pub mod layout;
pub mod text;

pub use foundation::core::{Point, Rect, Rgba8, Size, TextureRect, Vec2, Vertex};
pub use foundation::error::{ReflowError, ReflowResult};
pub use layout::{
    Axis, ConnectContext, Layout2d, LayoutEngine, LayoutHandle, Operand, Property, SourceId,
};
pub use text::{
    FontRasterizer, Glyph, GlyphAtlas, GlyphBitmap, GlyphBounds, GlyphCache, RasterizedGlyph,
    TextLayout, TextStyle, TextureSink, TrueTypeRasterizer,
};
