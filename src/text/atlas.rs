use tracing::debug;

use crate::foundation::core::TextureRect;
use crate::foundation::error::{ReflowError, ReflowResult};

/// Starting edge length; the atlas doubles as needed up to `max_size`.
const INITIAL_SIZE: u32 = 128;

/// Default ceiling, a conservative fit for any GPU made this decade.
pub(crate) const DEFAULT_MAX_SIZE: u32 = 4096;

/// Shelf-packed RGBA glyph atlas.
///
/// Texels are white with coverage stored in the alpha channel, so tinting
/// happens through vertex colors. A 2x2 white square with full alpha sits in
/// the top-left corner; solid quads (underlines, strikethrough) sample it at
/// pixel (1, 1). The first shelf therefore starts at row 3, leaving a one
/// pixel gap below the square.
pub struct GlyphAtlas {
    size: u32,
    max_size: u32,
    pixels: Vec<u8>,
    shelves: Vec<Shelf>,
    next_shelf_top: u32,
    version: u64,
}

struct Shelf {
    top: u32,
    height: u32,
    /// Pixels already taken from the left edge.
    used: u32,
}

impl Default for GlyphAtlas {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl GlyphAtlas {
    pub fn new(max_size: u32) -> Self {
        let max_size = max_size.max(INITIAL_SIZE);
        Self {
            size: INITIAL_SIZE,
            max_size,
            pixels: fresh_pixels(INITIAL_SIZE),
            shelves: Vec::new(),
            next_shelf_top: 3,
            version: 1,
        }
    }

    /// Edge length in pixels. The atlas is always square.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Bumped on every pixel write and every growth, so consumers can tell
    /// when their copy of the texture went stale.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel coordinate inside the reserved white square, safe to sample
    /// with bilinear filtering.
    pub fn white_pixel(&self) -> (u32, u32) {
        (1, 1)
    }

    /// Reserve a `width` by `height` region, growing the atlas if no shelf
    /// fits. Fails only when growth would exceed the configured maximum.
    /// A zero-area request returns the empty rect.
    pub fn allocate(&mut self, width: u32, height: u32) -> ReflowResult<TextureRect> {
        if width == 0 || height == 0 {
            return Ok(TextureRect::default());
        }
        loop {
            if let Some(rect) = self.try_place(width, height) {
                return Ok(rect);
            }
            self.grow()?;
        }
    }

    /// Pick the existing shelf the glyph wastes the least vertical space in.
    /// A shelf qualifies when the glyph fills 70..100% of its height; below
    /// that a new shelf is opened with a tenth of headroom for neighbors of
    /// slightly differing heights.
    fn try_place(&mut self, width: u32, height: u32) -> Option<TextureRect> {
        let mut best: Option<(usize, f32)> = None;
        for (i, shelf) in self.shelves.iter().enumerate() {
            if shelf.used + width > self.size || height > shelf.height {
                continue;
            }
            let ratio = height as f32 / shelf.height as f32;
            if ratio < 0.7 {
                continue;
            }
            if best.is_none_or(|(_, r)| ratio > r) {
                best = Some((i, ratio));
            }
        }
        if let Some((i, _)) = best {
            let shelf = &mut self.shelves[i];
            let rect = TextureRect::new(shelf.used, shelf.top, width, height);
            shelf.used += width;
            return Some(rect);
        }

        let shelf_height = height + height / 10;
        if width <= self.size && self.next_shelf_top + shelf_height <= self.size {
            let top = self.next_shelf_top;
            self.shelves.push(Shelf {
                top,
                height: shelf_height,
                used: width,
            });
            self.next_shelf_top += shelf_height;
            return Some(TextureRect::new(0, top, width, height));
        }
        None
    }

    /// Double the edge length, keeping existing contents in the top-left
    /// quadrant so previously issued rects stay valid.
    fn grow(&mut self) -> ReflowResult<()> {
        let new_size = self.size * 2;
        if new_size > self.max_size {
            return Err(ReflowError::atlas(format!(
                "glyph atlas would exceed its {} px maximum; reset the cache or raise the limit",
                self.max_size
            )));
        }
        debug!(from = self.size, to = new_size, "growing glyph atlas");
        let mut pixels = fresh_pixels(new_size);
        let old_stride = (self.size * 4) as usize;
        let new_stride = (new_size * 4) as usize;
        for row in 0..self.size as usize {
            let src = row * old_stride;
            let dst = row * new_stride;
            pixels[dst..dst + old_stride].copy_from_slice(&self.pixels[src..src + old_stride]);
        }
        self.pixels = pixels;
        self.size = new_size;
        self.version += 1;
        Ok(())
    }

    /// Store coverage into a previously allocated rect. `alpha` is row-major
    /// and exactly `rect.width * rect.height` bytes.
    pub fn write_alpha(&mut self, rect: TextureRect, alpha: &[u8]) {
        debug_assert_eq!(alpha.len(), (rect.width * rect.height) as usize);
        for y in 0..rect.height {
            for x in 0..rect.width {
                let idx = (((rect.y + y) * self.size + rect.x + x) * 4) as usize;
                self.pixels[idx] = 255;
                self.pixels[idx + 1] = 255;
                self.pixels[idx + 2] = 255;
                self.pixels[idx + 3] = alpha[(y * rect.width + x) as usize];
            }
        }
        self.version += 1;
    }

    #[cfg(test)]
    fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.pixels[((y * self.size + x) * 4 + 3) as usize]
    }
}

/// White texels with zero alpha, except the 2x2 opaque square at the origin.
fn fresh_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for _ in 0..size * size {
        pixels.extend_from_slice(&[255, 255, 255, 0]);
    }
    for y in 0..2u32 {
        for x in 0..2u32 {
            pixels[((y * size + x) * 4 + 3) as usize] = 255;
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_never_overlap() {
        let mut atlas = GlyphAtlas::new(1024);
        let mut rects = Vec::new();
        for i in 0..200u32 {
            let w = 5 + i % 23;
            let h = 7 + i % 17;
            let rect = atlas.allocate(w, h).unwrap();
            assert!(rect.x + rect.width <= atlas.size());
            assert!(rect.y + rect.height <= atlas.size());
            for prev in &rects {
                assert!(!rect.intersects(*prev), "{rect:?} overlaps {prev:?}");
            }
            rects.push(rect);
        }
    }

    #[test]
    fn white_square_survives_growth() {
        let mut atlas = GlyphAtlas::new(4096);
        let rect = atlas.allocate(4, 4).unwrap();
        atlas.write_alpha(rect, &[128; 16]);
        let before = atlas.version();
        // Force at least one doubling.
        while atlas.size() < 512 {
            atlas.allocate(100, 100).unwrap();
        }
        assert!(atlas.version() > before);
        assert_eq!(atlas.alpha_at(1, 1), 255);
        assert_eq!(atlas.alpha_at(rect.x, rect.y), 128);
    }

    #[test]
    fn growth_stops_at_max_size() {
        let mut atlas = GlyphAtlas::new(256);
        let mut failed = false;
        for _ in 0..100 {
            if atlas.allocate(60, 60).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(atlas.size() <= 256);
    }

    #[test]
    fn zero_area_requests_are_empty() {
        let mut atlas = GlyphAtlas::default();
        assert!(atlas.allocate(0, 10).unwrap().is_empty());
        assert!(atlas.allocate(10, 0).unwrap().is_empty());
    }

    #[test]
    fn write_sets_white_texels_with_coverage() {
        let mut atlas = GlyphAtlas::default();
        let rect = atlas.allocate(2, 2).unwrap();
        atlas.write_alpha(rect, &[0, 64, 128, 255]);
        assert_eq!(atlas.alpha_at(rect.x + 1, rect.y), 64);
        assert_eq!(atlas.alpha_at(rect.x, rect.y + 1), 128);
        let idx = ((rect.y * atlas.size() + rect.x) * 4) as usize;
        assert_eq!(&atlas.pixels()[idx..idx + 3], &[255, 255, 255]);
    }
}
