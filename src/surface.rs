use image::RgbaImage;
use tiny_skia::{ColorU8, Pixmap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// From 0..1 float components, as PDF colour operators supply them.
    pub fn from_unit(r: f32, g: f32, b: f32) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(q(r), q(g), q(b))
    }

    pub fn channels(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn mix(dst: u8, src: u8, alpha: u32) -> u8 {
    let d = dst as u32;
    let s = src as u32;
    ((d * (255 - alpha) + s * alpha + 127) / 255) as u8
}

fn blend(dst: Color, src: Color, coverage: u8) -> Color {
    let alpha = coverage as u32 * src.a as u32 / 255;
    Color {
        r: mix(dst.r, src.r, alpha),
        g: mix(dst.g, src.g, alpha),
        b: mix(dst.b, src.b, alpha),
        a: mix(dst.a, 255, alpha),
    }
}

/// Pixels written and pixels dropped for falling outside the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub written: u32,
    pub discarded: u32,
}

impl DrawStats {
    pub(crate) fn record(&mut self, inside: bool) {
        if inside {
            self.written += 1;
        } else {
            self.discarded += 1;
        }
    }

    pub(crate) fn merge(&mut self, other: DrawStats) {
        self.written += other.written;
        self.discarded += other.discarded;
    }
}

/// Addressable row-major RGBA target, origin top-left.
///
/// Writes outside the surface are discarded and reported by returning
/// `false`; they never panic, so a glyph hanging off the edge does not stop
/// the rest of a string from drawing.
pub trait PixelTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn get_pixel(&self, x: i32, y: i32) -> Option<Color>;
    fn set_pixel(&mut self, x: i32, y: i32, color: Color) -> bool;

    /// Raw bytes of row `y`, four per pixel.
    fn row_mut(&mut self, y: u32) -> Option<&mut [u8]>;

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height()
    }

    /// Fills `len` pixels starting at (`x`, `y`), clipped to the surface.
    /// Returns the number of pixels written.
    fn set_span(&mut self, x: i32, y: i32, len: u32, color: Color) -> u32 {
        if y < 0 || y as u32 >= self.height() {
            return 0;
        }
        let start = x.max(0);
        let end = (x as i64 + len as i64).min(self.width() as i64) as i32;
        let mut written = 0;
        for px in start..end {
            if self.set_pixel(px, y, color) {
                written += 1;
            }
        }
        written
    }

    /// Alpha-composites `color` scaled by `coverage` (0..=255).
    fn blend_pixel(&mut self, x: i32, y: i32, color: Color, coverage: u8) -> bool {
        if coverage == 0 {
            return self.contains(x, y);
        }
        let Some(dst) = self.get_pixel(x, y) else {
            return false;
        };
        self.set_pixel(x, y, blend(dst, color, coverage))
    }

    /// Composites with an independent coverage per colour channel, for
    /// sub-pixel (RGB stripe) glyph output.
    fn blend_sub_pixel(&mut self, x: i32, y: i32, color: Color, coverage: [u8; 3]) -> bool {
        if coverage == [0, 0, 0] {
            return self.contains(x, y);
        }
        let Some(dst) = self.get_pixel(x, y) else {
            return false;
        };
        let out = Color {
            r: blend(dst, color, coverage[0]).r,
            g: blend(dst, color, coverage[1]).g,
            b: blend(dst, color, coverage[2]).b,
            a: blend(dst, color, coverage.into_iter().max().unwrap_or(0)).a,
        };
        self.set_pixel(x, y, out)
    }

    fn fill(&mut self, color: Color) {
        for y in 0..self.height() {
            self.set_span(0, y as i32, self.width(), color);
        }
    }
}

impl PixelTarget for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get_pixel_checked(x as u32, y as u32)
            .map(|p| Color::rgba(p.0[0], p.0[1], p.0[2], p.0[3]))
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        match self.get_pixel_mut_checked(x as u32, y as u32) {
            Some(px) => {
                px.0 = color.channels();
                true
            }
            None => false,
        }
    }

    fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let stride = self.dimensions().0 as usize * 4;
        let start = y as usize * stride;
        let buf: &mut [u8] = self;
        buf.get_mut(start..start + stride)
    }
}

/// `tiny-skia` pixmaps store premultiplied colour; values are converted at
/// the boundary and `row_mut` exposes the premultiplied bytes unchanged.
impl PixelTarget for Pixmap {
    fn width(&self) -> u32 {
        Pixmap::width(self)
    }

    fn height(&self) -> u32 {
        Pixmap::height(self)
    }

    fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 {
            return None;
        }
        self.pixel(x as u32, y as u32).map(|p| {
            let c = p.demultiply();
            Color::rgba(c.red(), c.green(), c.blue(), c.alpha())
        })
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) -> bool {
        if !PixelTarget::contains(self, x, y) {
            return false;
        }
        let idx = y as usize * Pixmap::width(self) as usize + x as usize;
        let value = ColorU8::from_rgba(color.r, color.g, color.b, color.a).premultiply();
        match self.pixels_mut().get_mut(idx) {
            Some(px) => {
                *px = value;
                true
            }
            None => false,
        }
    }

    fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let stride = Pixmap::width(self) as usize * 4;
        let start = y as usize * stride;
        self.data_mut().get_mut(start..start + stride)
    }
}

/// Copies `src` into the rectangle (`x`, `y`, `width`, `height`) of the
/// target with nearest-neighbour sampling, compositing by source alpha.
pub fn draw_image(
    target: &mut dyn PixelTarget,
    src: &RgbaImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> u32 {
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 || width == 0 || height == 0 {
        return 0;
    }
    // Only the part of the rectangle that lands on the target is visited.
    let (x, y) = (x as i64, y as i64);
    let rows = (-y).max(0)..(target.height() as i64 - y).min(height as i64);
    let cols = (-x).max(0)..(target.width() as i64 - x).min(width as i64);
    let mut written = 0;
    for dy in rows {
        let ty = (y + dy) as i32;
        let sy = ((dy as u64 * sh as u64) / height as u64).min(sh as u64 - 1) as u32;
        for dx in cols.clone() {
            let tx = (x + dx) as i32;
            let sx = ((dx as u64 * sw as u64) / width as u64).min(sw as u64 - 1) as u32;
            let p = src.get_pixel(sx, sy).0;
            let color = Color::rgb(p[0], p[1], p[2]);
            if target.blend_pixel(tx, ty, color, p[3]) {
                written += 1;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_writes_are_discarded() {
        let mut img = RgbaImage::new(4, 4);
        assert!(!PixelTarget::set_pixel(&mut img, -1, 0, Color::BLACK));
        assert!(!PixelTarget::set_pixel(&mut img, 4, 0, Color::BLACK));
        assert!(!PixelTarget::blend_pixel(&mut img, 0, 9, Color::BLACK, 255));
        assert_eq!(PixelTarget::set_span(&mut img, -2, 1, 10, Color::WHITE), 4);
    }

    #[test]
    fn blend_pixel_mixes_by_coverage() {
        let mut img = RgbaImage::new(1, 1);
        PixelTarget::fill(&mut img, Color::WHITE);
        PixelTarget::blend_pixel(&mut img, 0, 0, Color::BLACK, 128);
        let p = PixelTarget::get_pixel(&img, 0, 0).unwrap();
        assert!(p.r > 120 && p.r < 135, "got {p:?}");
        assert_eq!(p.a, 255);
    }

    #[test]
    fn sub_pixel_blend_uses_per_channel_coverage() {
        let mut img = RgbaImage::new(1, 1);
        PixelTarget::fill(&mut img, Color::WHITE);
        PixelTarget::blend_sub_pixel(&mut img, 0, 0, Color::BLACK, [255, 0, 128]);
        let p = PixelTarget::get_pixel(&img, 0, 0).unwrap();
        assert_eq!(p.r, 0);
        assert_eq!(p.g, 255);
        assert!(p.b > 120 && p.b < 135);
    }

    #[test]
    fn pixmap_round_trips_opaque_colour() {
        let mut pixmap = Pixmap::new(3, 2).unwrap();
        let c = Color::rgb(10, 200, 30);
        assert!(PixelTarget::set_pixel(&mut pixmap, 2, 1, c));
        assert_eq!(PixelTarget::get_pixel(&pixmap, 2, 1), Some(c));
        assert_eq!(pixmap.row_mut(1).map(|r| r.len()), Some(12));
        assert!(pixmap.row_mut(2).is_none());
    }

    #[test]
    fn draw_image_scales_nearest_neighbour() {
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        src.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let mut dst = RgbaImage::new(4, 2);
        assert_eq!(draw_image(&mut dst, &src, 0, 0, 4, 2), 8);
        assert_eq!(PixelTarget::get_pixel(&dst, 1, 1), Some(Color::rgb(255, 0, 0)));
        assert_eq!(PixelTarget::get_pixel(&dst, 2, 0), Some(Color::rgb(0, 0, 255)));
    }

    #[test]
    fn draw_image_visits_only_the_visible_part() {
        let mut src = RgbaImage::new(1, 1);
        src.put_pixel(0, 0, image::Rgba([0, 255, 0, 255]));
        let mut dst = RgbaImage::new(10, 10);
        assert_eq!(draw_image(&mut dst, &src, i32::MAX - 1, 0, u32::MAX, 5), 0);
        assert_eq!(draw_image(&mut dst, &src, 0, i32::MIN, 3, u32::MAX), 30);
        assert_eq!(
            draw_image(&mut dst, &src, -1_000_000_000, 2, 2_000_000_000, 3),
            30
        );
        assert_eq!(PixelTarget::get_pixel(&dst, 9, 4), Some(Color::rgb(0, 255, 0)));
    }
}
