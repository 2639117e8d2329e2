mod cache;
mod catalog;
mod config;
mod content;
mod debug;
mod edge;
mod error;
mod geometry;
mod glyph;
mod glyph_render;
mod matrix;
mod reader;
mod sdf;
mod surface;
#[cfg(test)]
mod test_font;
mod truetype;

pub use catalog::{FontCatalog, normalize_name, system_font_dirs};
pub use config::{
    DEFAULT_DPI, DEFAULT_GLYPH_CACHE_CAPACITY, DEFAULT_SMALL_SIZE_THRESHOLD, FONT_DIR_ENV,
    RenderConfig, RenderConfigBuilder,
};
pub use content::{
    ContentInterpreter, ContentOp, ContentResources, ContentSink, Operand, PageRenderer, TextRun,
    decode_content,
};
pub use debug::{
    COUNTER_CACHE_HITS, COUNTER_CACHE_MISSES, COUNTER_DISCARDED_WRITES, COUNTER_MISSING_GLYPHS,
    COUNTER_OPERATORS, COUNTER_UNKNOWN_OPERATORS, DebugLogger,
};
pub use edge::{EdgeFlags, EdgeWorkspace, WORKSPACE_PADDING, rasterise, rasterise_contours};
pub use error::RasterError;
pub use geometry::{Point, Vec2, VecSegment2, contour_segments};
pub use glyph::{
    DEFAULT_FLATTEN_TOLERANCE, Glyph, GlyphBounds, GlyphKind, GlyphPoint, RasterContour,
    RenderableGlyph,
};
pub use glyph_render::{CoverageMask, GlyphRenderer, RenderStrategy, SubPixelGlyph};
pub use matrix::{Matrix, MatrixOrder};
pub use reader::TableReader;
pub use sdf::{
    FillMode, LineCap, capsule_distance, draw_line, draw_line_with_cap, draw_pressure_curve,
    fill_polygon, fill_rect, fill_renderable, oriented_box_distance, polygon_distance,
    uneven_capsule_distance,
};
pub use surface::{Color, DrawStats, PixelTarget, draw_image};
pub use truetype::{FontId, FontNames, TrueTypeFont};

use image::RgbaImage;
use std::sync::Arc;

/// Rendering context: configuration, font catalog, glyph renderer and the
/// optional debug log, shared by every page it renders.
pub struct Glyphcast {
    config: RenderConfig,
    catalog: FontCatalog,
    renderer: GlyphRenderer,
    debug: Option<DebugLogger>,
}

impl Glyphcast {
    pub fn new(config: RenderConfig) -> Result<Self, RasterError> {
        let debug = match &config.debug_log {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let mut renderer = GlyphRenderer::new(&config);
        if let Some(logger) = &debug {
            renderer = renderer.with_debug(logger.clone());
        }
        Ok(Self {
            catalog: FontCatalog::from_config(&config),
            config,
            renderer,
            debug,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FontCatalog {
        &self.catalog
    }

    pub fn renderer(&self) -> &GlyphRenderer {
        &self.renderer
    }

    pub fn debug(&self) -> Option<&DebugLogger> {
        self.debug.as_ref()
    }

    /// Looks up a font by name in the catalog.
    pub fn font(&self, name: &str) -> Result<Option<Arc<TrueTypeFont>>, RasterError> {
        self.catalog.resolve(name)
    }

    pub fn page<'a>(
        &'a self,
        resources: &'a ContentResources,
        width_pt: f32,
        height_pt: f32,
    ) -> PageRenderer<'a> {
        let page = PageRenderer::new(&self.renderer, resources, width_pt, height_pt)
            .with_catalog(&self.catalog)
            .with_config(&self.config);
        match &self.debug {
            Some(logger) => page.with_debug(logger.clone()),
            None => page,
        }
    }

    /// Decodes `content` and reconstructs the page it describes.
    pub fn render_content(
        &self,
        resources: &ContentResources,
        width_pt: f32,
        height_pt: f32,
        content: &[u8],
    ) -> Result<RgbaImage, RasterError> {
        let ops = decode_content(content)?;
        let result = self.page(resources, width_pt, height_pt).render_to_image(&ops);
        self.emit_debug_summary("render_content");
        result
    }

    pub fn render_content_png(
        &self,
        resources: &ContentResources,
        width_pt: f32,
        height_pt: f32,
        content: &[u8],
    ) -> Result<Vec<u8>, RasterError> {
        let ops = decode_content(content)?;
        let result = self.page(resources, width_pt, height_pt).render_to_png(&ops);
        self.emit_debug_summary("render_content_png");
        result
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = &self.debug {
            logger.emit_summary(context);
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Object;
    use lopdf::content::{Content, Operation};

    #[test]
    fn renders_content_bytes_with_registered_font() {
        let config = RenderConfig::builder()
            .system_fonts(false)
            .dpi(144.0)
            .build()
            .expect("config");
        let cast = Glyphcast::new(config).expect("glyphcast");
        cast.catalog()
            .register_bytes(test_font::build(), Some("Body"))
            .expect("register");

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"Body".to_vec()), Object::Integer(18)]),
                Operation::new("Td", vec![Object::Integer(4), Object::Integer(8)]),
                Operation::new("Tj", vec![Object::string_literal("AOA")]),
                Operation::new("ET", vec![]),
            ],
        };
        let bytes = content.encode().expect("encode");
        let resources = ContentResources::new();
        let image = cast
            .render_content(&resources, 60.0, 30.0, &bytes)
            .expect("render");
        assert_eq!(image.dimensions(), (120, 60));
        assert!(image.pixels().any(|p| p.0[0] < 128));
    }

    #[test]
    fn unknown_operators_fail_the_page() {
        let config = RenderConfig::builder()
            .system_fonts(false)
            .build()
            .expect("config");
        let cast = Glyphcast::new(config).expect("glyphcast");
        let resources = ContentResources::new();
        let err = cast
            .render_content(&resources, 10.0, 10.0, b"BT ET zz")
            .expect_err("unknown operator");
        assert!(matches!(err, RasterError::UnknownOperator(op) if op == "zz"));
    }
}
