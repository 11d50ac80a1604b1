pub use kurbo::{Point, Rect, Size, Vec2};

/// Non-premultiplied 8-bit RGBA color attached to vertices.
///
/// Glyph atlas texels are white with coverage in the alpha channel, so the
/// vertex color is what actually tints rendered text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8::new(255, 255, 255, 255);
    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Pixel rectangle inside a texture. `{0,0,0,0}` marks a glyph with no
/// visible bitmap (e.g. a space).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TextureRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rect covers any pixels at all.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether two rects share at least one pixel.
    pub fn intersects(self, other: TextureRect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// One textured, colored vertex. Text layout emits two triangles (six
/// vertices) per visible glyph with UVs normalized against the atlas size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: Rgba8,
}

impl Vertex {
    pub const fn new(position: [f32; 2], uv: [f32; 2], color: Rgba8) -> Self {
        Self {
            position,
            uv,
            color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_rect_intersection() {
        let a = TextureRect::new(0, 0, 10, 10);
        let b = TextureRect::new(9, 9, 5, 5);
        let c = TextureRect::new(10, 0, 5, 5);
        let empty = TextureRect::default();
        assert!(a.intersects(b));
        assert!(!a.intersects(c));
        assert!(!a.intersects(empty));
    }
}
