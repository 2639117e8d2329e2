use crate::cache::LruCache;
use crate::config::RenderConfig;
use crate::debug::{
    COUNTER_CACHE_HITS, COUNTER_CACHE_MISSES, COUNTER_DISCARDED_WRITES, COUNTER_MISSING_GLYPHS,
    DebugLogger,
};
use crate::edge::{self, EdgeFlags, EdgeWorkspace};
use crate::error::RasterError;
use crate::glyph::{Glyph, RenderableGlyph};
use crate::matrix::Matrix;
use crate::sdf::{self, FillMode};
use crate::surface::{Color, DrawStats, PixelTarget};
use crate::truetype::{FontId, TrueTypeFont};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

const SUB_PIXEL_X: f32 = 3.0;
const SUPER_X: usize = 2;
const SUPER_Y: usize = 3;
/// Samples per super-sampled cell including the one-row overrun above and
/// below.
const SUPER_BLOCK: u32 = (SUPER_X * (SUPER_Y + 2)) as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    SubPixel,
    SuperSampled,
}

/// Per-pixel RGB coverage for one glyph at one small scale.
#[derive(Debug, Clone, PartialEq)]
pub struct SubPixelGlyph {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<[u8; 3]>,
    /// Position of cell (0, 0) relative to the pen position on the baseline.
    pub offset_x: f32,
    pub offset_y: f32,
}

impl SubPixelGlyph {
    fn from_workspace(ws: &EdgeWorkspace) -> Self {
        let width = ws.width().div_ceil(SUB_PIXEL_X as usize);
        let height = ws.height();
        let mut cells = vec![[0u8; 3]; width * height];
        for y in 0..height as i32 {
            for cx in 0..width as i32 {
                let base = cx * 3;
                let mut cell = [0u8; 3];
                for (k, channel) in cell.iter_mut().enumerate() {
                    let i = base + k as i32;
                    let v = sample_brightness(ws, i - 1, y)
                        + 2 * sample_brightness(ws, i, y)
                        + sample_brightness(ws, i + 1, y);
                    *channel = (v / 4).min(255) as u8;
                }
                cells[y as usize * width + cx as usize] = cell;
            }
        }
        Self {
            width,
            height,
            cells,
            offset_x: -ws.origin_x / SUB_PIXEL_X,
            offset_y: -ws.baseline,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| *c == [0, 0, 0])
    }
}

/// Brightness of one sub-pixel sample. Interior samples are solid; edge
/// samples are dimmed, less so on slanted sides and more on top edges.
fn sample_brightness(ws: &EdgeWorkspace, x: i32, y: i32) -> u32 {
    let flags = ws.flags(x, y);
    if !flags.contains(EdgeFlags::INSIDE) {
        return 0;
    }
    if flags.contains(EdgeFlags::DROPOUT) || !flags.contains(EdgeFlags::TOUCHED) {
        return 255;
    }
    let mut v: i32 = 176;
    if !ws.is_inside(x, y - 1) {
        v -= 32;
    }
    if flags.intersects(EdgeFlags::DIR_LEFT | EdgeFlags::DIR_RIGHT) {
        v += 24;
    }
    if flags.intersects(EdgeFlags::DIR_UP | EdgeFlags::DIR_DOWN) {
        v += 24;
    }
    v.clamp(0, 255) as u32
}

/// Alpha coverage for one glyph at one large scale.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMask {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<u8>,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoverageMask {
    fn from_workspace(ws: &EdgeWorkspace) -> Self {
        let width = ws.width().div_ceil(SUPER_X);
        let height = ws.height().div_ceil(SUPER_Y);
        let mut alpha = vec![0u8; width * height];
        for row in 0..height {
            let top = (row * SUPER_Y) as i32 - 1;
            for col in 0..width {
                let left = (col * SUPER_X) as i32;
                let mut count = 0u32;
                for sy in top..top + SUPER_Y as i32 + 2 {
                    for sx in left..left + SUPER_X as i32 {
                        if ws.is_inside(sx, sy) {
                            count += 1;
                        }
                    }
                }
                alpha[row * width + col] = (count * 255 / SUPER_BLOCK) as u8;
            }
        }
        Self {
            width,
            height,
            alpha,
            offset_x: -ws.origin_x / SUPER_X as f32,
            offset_y: -ws.baseline / SUPER_Y as f32,
        }
    }
}

/// Target coordinate `offset` cells past `origin`; `None` when it falls
/// outside the `i32` pixel space.
fn cell_coord(origin: i64, offset: usize) -> Option<i32> {
    i32::try_from(origin.saturating_add(offset as i64)).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubPixelKey {
    font: FontId,
    character: Option<char>,
    glyph_index: u16,
    scale_bits: u32,
}

/// Draws glyph outlines onto pixel targets, picking a strategy by scale.
///
/// Small scales go through the sub-pixel renderer and its LRU cache; larger
/// scales are super-sampled on every call.
pub struct GlyphRenderer {
    small_size_threshold: f32,
    cache: Mutex<LruCache<SubPixelKey, Arc<SubPixelGlyph>>>,
    debug: Option<DebugLogger>,
}

impl std::fmt::Debug for GlyphRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphRenderer")
            .field("small_size_threshold", &self.small_size_threshold)
            .finish_non_exhaustive()
    }
}

impl Default for GlyphRenderer {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl GlyphRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            small_size_threshold: config.small_size_threshold,
            cache: Mutex::new(LruCache::new(config.glyph_cache_capacity)),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: DebugLogger) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn strategy_for(&self, scale: f32) -> RenderStrategy {
        if scale < self.small_size_threshold {
            RenderStrategy::SubPixel
        } else {
            RenderStrategy::SuperSampled
        }
    }

    /// Number of sub-pixel renderings currently cached.
    pub fn cached_glyphs(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn count(&self, key: &str, amount: u64) {
        if let Some(debug) = &self.debug {
            debug.increment(key, amount);
        }
    }

    /// Sub-pixel coverage for `glyph`, shared through the render cache.
    pub fn sub_pixel_glyph(&self, glyph: &Glyph, scale: f32) -> Arc<SubPixelGlyph> {
        let build = || {
            let ws = edge::rasterise(glyph, scale * SUB_PIXEL_X, scale);
            Ok::<_, Infallible>(Arc::new(SubPixelGlyph::from_workspace(&ws)))
        };
        let key = SubPixelKey {
            font: glyph.font,
            character: glyph.character,
            glyph_index: glyph.glyph_index,
            scale_bits: scale.to_bits(),
        };
        let cached = match self.cache.lock() {
            Ok(mut cache) => cache.get_or_insert_with(key, build),
            Err(_) => build().map(|table| (table, false)),
        };
        let (table, hit) = match cached {
            Ok(found) => found,
            Err(never) => match never {},
        };
        let counter = if hit {
            COUNTER_CACHE_HITS
        } else {
            COUNTER_CACHE_MISSES
        };
        self.count(counter, 1);
        table
    }

    pub fn super_sampled_glyph(&self, glyph: &Glyph, scale: f32) -> CoverageMask {
        let ws = edge::rasterise(glyph, scale * SUPER_X as f32, scale * SUPER_Y as f32);
        CoverageMask::from_workspace(&ws)
    }

    /// Draws `glyph` with its top-left insertion point at (`dx`, `dy`); the
    /// baseline sits one ascender below.
    pub fn draw_glyph(
        &self,
        target: &mut dyn PixelTarget,
        dx: f32,
        dy: f32,
        scale: f32,
        glyph: &Glyph,
        color: Color,
    ) -> DrawStats {
        let baseline = dy + glyph.ascent as f32 * scale;
        self.draw_glyph_at_baseline(target, dx, baseline, scale, glyph, color)
    }

    pub fn draw_glyph_at_baseline(
        &self,
        target: &mut dyn PixelTarget,
        pen_x: f32,
        baseline: f32,
        scale: f32,
        glyph: &Glyph,
        color: Color,
    ) -> DrawStats {
        let mut stats = DrawStats::default();
        if !glyph.is_renderable() || scale <= 0.0 {
            return stats;
        }
        match self.strategy_for(scale) {
            RenderStrategy::SubPixel => {
                let table = self.sub_pixel_glyph(glyph, scale);
                let x0 = (pen_x + table.offset_x).round() as i64;
                let y0 = (baseline + table.offset_y).round() as i64;
                for (idx, cell) in table.cells.iter().enumerate() {
                    if *cell == [0, 0, 0] {
                        continue;
                    }
                    let x = cell_coord(x0, idx % table.width);
                    let y = cell_coord(y0, idx / table.width);
                    stats.record(match (x, y) {
                        (Some(x), Some(y)) => target.blend_sub_pixel(x, y, color, *cell),
                        _ => false,
                    });
                }
            }
            RenderStrategy::SuperSampled => {
                let mask = self.super_sampled_glyph(glyph, scale);
                let x0 = (pen_x + mask.offset_x).round() as i64;
                let y0 = (baseline + mask.offset_y).round() as i64;
                for (idx, alpha) in mask.alpha.iter().enumerate() {
                    if *alpha == 0 {
                        continue;
                    }
                    let x = cell_coord(x0, idx % mask.width);
                    let y = cell_coord(y0, idx / mask.width);
                    stats.record(match (x, y) {
                        (Some(x), Some(y)) => target.blend_pixel(x, y, color, *alpha),
                        _ => false,
                    });
                }
            }
        }
        self.count(COUNTER_DISCARDED_WRITES, stats.discarded as u64);
        stats
    }

    /// Lays `text` out along one line from the top-left point (`x`, `y`).
    /// Characters without a drawable outline still advance the pen.
    /// Returns the total advance in pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_string(
        &self,
        target: &mut dyn PixelTarget,
        font: &TrueTypeFont,
        x: f32,
        y: f32,
        scale: f32,
        text: &str,
        color: Color,
    ) -> Result<f32, RasterError> {
        let baseline = y + font.ascender() as f32 * scale;
        let mut pen = x;
        for ch in text.chars() {
            let index = font.glyph_index(ch)?;
            match font.read_glyph(ch)? {
                Some(glyph) => {
                    self.draw_glyph_at_baseline(target, pen, baseline, scale, &glyph, color);
                }
                None => {
                    if index == 0 {
                        log::debug!("no glyph for {ch:?} in font {}", font.id());
                        self.count(COUNTER_MISSING_GLYPHS, 1);
                    }
                }
            }
            pen += font.glyph_width(index) as f32 * scale;
        }
        Ok(pen - x)
    }

    pub fn measure_string(
        &self,
        font: &TrueTypeFont,
        scale: f32,
        text: &str,
    ) -> Result<f32, RasterError> {
        let mut width = 0.0;
        for ch in text.chars() {
            width += font.glyph_width(font.glyph_index(ch)?) as f32 * scale;
        }
        Ok(width)
    }

    /// Fills `glyph` through the distance-field path after mapping font
    /// units through `transform`, for rotated or sheared text.
    pub fn draw_glyph_outline(
        &self,
        target: &mut dyn PixelTarget,
        glyph: &Glyph,
        transform: &Matrix,
        color: Color,
    ) -> DrawStats {
        if !glyph.is_renderable() {
            return DrawStats::default();
        }
        let outline = RenderableGlyph::from_glyph(glyph, transform);
        let stats = sdf::fill_renderable(target, &outline, color, FillMode::Winding);
        self.count(COUNTER_DISCARDED_WRITES, stats.discarded as u64);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixOrder;
    use crate::test_font;
    use image::RgbaImage;

    fn font() -> TrueTypeFont {
        TrueTypeFont::parse(test_font::build()).expect("font")
    }

    fn white(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        PixelTarget::fill(&mut img, Color::WHITE);
        img
    }

    #[test]
    fn strategy_follows_threshold() {
        let renderer = GlyphRenderer::default();
        assert_eq!(renderer.strategy_for(0.02), RenderStrategy::SubPixel);
        assert_eq!(renderer.strategy_for(0.5), RenderStrategy::SuperSampled);
    }

    #[test_log::test]
    fn small_and_large_paths_draw_and_small_path_is_cached() {
        let font = font();
        let glyph = font.read_glyph('A').expect("read").expect("glyph");
        let debug = DebugLogger::with_writer(std::io::sink());
        let renderer = GlyphRenderer::default().with_debug(debug.clone());

        let mut small = white(80, 60);
        let stats = renderer.draw_glyph(&mut small, 10.0, 10.0, 0.02, &glyph, Color::BLACK);
        assert!(stats.written > 0);
        assert_eq!(stats.discarded, 0);

        let first = renderer.sub_pixel_glyph(&glyph, 0.02);
        let second = renderer.sub_pixel_glyph(&glyph, 0.02);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_blank());
        assert_eq!(debug.counter(COUNTER_CACHE_MISSES), 1);
        assert_eq!(debug.counter(COUNTER_CACHE_HITS), 2);

        let mut large = white(700, 900);
        let stats = renderer.draw_glyph(&mut large, 10.0, 10.0, 0.5, &glyph, Color::BLACK);
        assert!(stats.written > 0);
        // Solid left leg at font (250, 150); baseline at 10 + 1600 * 0.5.
        let p = PixelTarget::get_pixel(&large, 135, 735).expect("pixel");
        assert_eq!(p, Color::BLACK);
        // Counter centre stays clear.
        let p = PixelTarget::get_pixel(&large, 310, 577).expect("pixel");
        assert_eq!(p, Color::WHITE);
    }

    #[test]
    fn cache_evicts_least_recent_glyph() {
        let font = font();
        let a = font.read_glyph('A').expect("read").expect("glyph");
        let o = font.read_glyph('O').expect("read").expect("glyph");
        let config = RenderConfig::builder()
            .glyph_cache_capacity(1)
            .build()
            .expect("config");
        let renderer = GlyphRenderer::new(&config);
        let first = renderer.sub_pixel_glyph(&a, 0.02);
        renderer.sub_pixel_glyph(&o, 0.02);
        let again = renderer.sub_pixel_glyph(&a, 0.02);
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
        assert_eq!(renderer.cached_glyphs(), 1);
    }

    #[test]
    fn glyph_hanging_off_the_edge_is_clipped() {
        let font = font();
        let glyph = font.read_glyph('A').expect("read").expect("glyph");
        let renderer = GlyphRenderer::default();
        let mut img = white(20, 20);
        let stats = renderer.draw_glyph(&mut img, -10.0, -5.0, 0.02, &glyph, Color::BLACK);
        assert!(stats.discarded > 0);
        assert!(stats.written > 0);
    }

    #[test]
    fn glyph_far_off_the_target_is_discarded() {
        let font = font();
        let glyph = font.read_glyph('A').expect("read").expect("glyph");
        let renderer = GlyphRenderer::default();
        let mut img = white(20, 20);
        for scale in [0.02, 0.5] {
            for (x, baseline) in [(3.0e9, 10.0), (-3.0e9, 10.0), (5.0, f32::MAX), (5.0, f32::MIN)] {
                let stats = renderer.draw_glyph_at_baseline(
                    &mut img,
                    x,
                    baseline,
                    scale,
                    &glyph,
                    Color::BLACK,
                );
                assert_eq!(stats.written, 0);
                assert!(stats.discarded > 0);
            }
        }
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn string_advances_through_unmapped_and_blank_characters() {
        let font = font();
        let renderer = GlyphRenderer::default();
        let mut img = white(200, 60);
        let scale = 0.01;
        let advance = renderer
            .draw_string(&mut img, &font, 2.0, 2.0, scale, "A Z", Color::BLACK)
            .expect("draw");
        let expected = (1200.0 + 600.0 + 500.0) * scale;
        assert!((advance - expected).abs() < 1e-4, "{advance} vs {expected}");
        let measured = renderer.measure_string(&font, scale, "A Z").expect("measure");
        assert!((measured - expected).abs() < 1e-4);
    }

    #[test]
    fn outline_path_fills_rotated_glyph() {
        let font = font();
        let glyph = font.read_glyph('A').expect("read").expect("glyph");
        let renderer = GlyphRenderer::default();
        let mut img = white(120, 120);
        let mut m = Matrix::scaling(0.05, -0.05);
        m.rotate(30.0, MatrixOrder::Append);
        m.translate(30.0, 80.0, MatrixOrder::Append);
        let stats = renderer.draw_glyph_outline(&mut img, &glyph, &m, Color::BLACK);
        assert!(stats.written > 0);
        assert_eq!(stats.discarded, 0);
    }
}
