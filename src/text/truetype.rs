use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};

use crate::foundation::error::{ReflowError, ReflowResult};
use crate::text::raster::{FontRasterizer, GlyphBitmap, GlyphBounds, RasterizedGlyph};

/// Rasterizer over a TrueType/OpenType face.
///
/// Bold is synthesized with a one pixel horizontal dilation (plus one pixel
/// of advance); outlines are a chebyshev dilation of the coverage by the
/// rounded-up stroke radius, drawn behind the fill by the layout pass.
pub struct TrueTypeRasterizer {
    font: FontVec,
}

impl TrueTypeRasterizer {
    pub fn from_bytes(data: Vec<u8>) -> ReflowResult<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| ReflowError::font(format!("failed to parse font: {e}")))?;
        Ok(Self { font })
    }
}

impl FontRasterizer for TrueTypeRasterizer {
    fn glyph(
        &self,
        ch: char,
        px_size: u32,
        bold: bool,
        outline: f32,
    ) -> ReflowResult<RasterizedGlyph> {
        let scale = PxScale::from(px_size as f32);
        let scaled = self.font.as_scaled(scale);
        let id = self.font.glyph_id(ch);
        let mut advance = scaled.h_advance(id);
        if bold {
            advance += 1.0;
        }

        let glyph = id.with_scale_and_position(scale, point(0.0, 0.0));
        let Some(outlined) = self.font.outline_glyph(glyph) else {
            return Ok(RasterizedGlyph {
                advance,
                bounds: GlyphBounds::default(),
                bitmap: None,
            });
        };
        let px_bounds = outlined.px_bounds();
        let width = px_bounds.width() as u32;
        let height = px_bounds.height() as u32;
        if width == 0 || height == 0 {
            return Ok(RasterizedGlyph {
                advance,
                bounds: GlyphBounds::default(),
                bitmap: None,
            });
        }

        let mut alpha = vec![0u8; (width * height) as usize];
        outlined.draw(|x, y, coverage| {
            let idx = (y * width + x) as usize;
            if idx < alpha.len() {
                let c = (coverage * 255.0).clamp(0.0, 255.0) as u8;
                alpha[idx] = alpha[idx].max(c);
            }
        });
        let mut bitmap = GlyphBitmap {
            width,
            height,
            alpha,
        };
        let mut left = px_bounds.min.x;
        let mut top = px_bounds.min.y;
        if bold {
            bitmap = dilate_horizontal(&bitmap);
        }
        if outline > 0.0 {
            let radius = outline.ceil() as u32;
            bitmap = dilate_chebyshev(&bitmap, radius);
            left -= radius as f32;
            top -= radius as f32;
        }

        Ok(RasterizedGlyph {
            advance,
            bounds: GlyphBounds {
                left,
                top,
                width: bitmap.width as f32,
                height: bitmap.height as f32,
            },
            bitmap: Some(bitmap),
        })
    }

    fn kerning(&self, left: char, right: char, px_size: u32, _bold: bool) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px_size as f32));
        scaled.kern(self.font.glyph_id(left), self.font.glyph_id(right))
    }

    fn line_spacing(&self, px_size: u32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px_size as f32));
        scaled.height() + scaled.line_gap()
    }

    fn ascent(&self, px_size: u32) -> f32 {
        self.font
            .as_scaled(PxScale::from(px_size as f32))
            .ascent()
    }

    fn descent(&self, px_size: u32) -> f32 {
        // ab_glyph reports descent as negative; callers expect depth.
        -self
            .font
            .as_scaled(PxScale::from(px_size as f32))
            .descent()
    }
}

/// Widen coverage by one pixel to the right. Output is one column wider.
fn dilate_horizontal(src: &GlyphBitmap) -> GlyphBitmap {
    let width = src.width + 1;
    let mut alpha = vec![0u8; (width * src.height) as usize];
    for y in 0..src.height {
        for x in 0..width {
            let here = if x < src.width {
                src.alpha[(y * src.width + x) as usize]
            } else {
                0
            };
            let prev = if x > 0 {
                src.alpha[(y * src.width + x - 1) as usize]
            } else {
                0
            };
            alpha[(y * width + x) as usize] = here.max(prev);
        }
    }
    GlyphBitmap {
        width,
        height: src.height,
        alpha,
    }
}

/// Grow coverage by `radius` pixels in every direction (chessboard metric).
/// Output gains `2 * radius` per axis.
fn dilate_chebyshev(src: &GlyphBitmap, radius: u32) -> GlyphBitmap {
    let r = radius as i64;
    let width = src.width + 2 * radius;
    let height = src.height + 2 * radius;
    let mut alpha = vec![0u8; (width * height) as usize];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut best = 0u8;
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = x - r + dx;
                    let sy = y - r + dy;
                    if sx >= 0 && sy >= 0 && sx < src.width as i64 && sy < src.height as i64 {
                        best = best.max(src.alpha[(sy * src.width as i64 + sx) as usize]);
                    }
                }
            }
            alpha[(y * width as i64 + x) as usize] = best;
        }
    }
    GlyphBitmap {
        width,
        height,
        alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pixel() -> GlyphBitmap {
        GlyphBitmap {
            width: 1,
            height: 1,
            alpha: vec![200],
        }
    }

    #[test]
    fn horizontal_dilation_smears_right() {
        let out = dilate_horizontal(&single_pixel());
        assert_eq!(out.width, 2);
        assert_eq!(out.height, 1);
        assert_eq!(out.alpha, vec![200, 200]);
    }

    #[test]
    fn chebyshev_dilation_fills_the_neighborhood() {
        let out = dilate_chebyshev(&single_pixel(), 1);
        assert_eq!(out.width, 3);
        assert_eq!(out.height, 3);
        assert!(out.alpha.iter().all(|&a| a == 200));
    }

    #[test]
    fn zero_radius_dilation_is_identity() {
        let src = single_pixel();
        let out = dilate_chebyshev(&src, 0);
        assert_eq!(out.alpha, src.alpha);
    }
}
