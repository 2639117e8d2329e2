use crate::error::RasterError;
use crate::surface::Color;
use std::path::PathBuf;

/// Scale (pixels per font unit) below which glyphs take the cached
/// sub-pixel path. Tunable, not derived from anything physical.
pub const DEFAULT_SMALL_SIZE_THRESHOLD: f32 = 0.03;
pub const DEFAULT_GLYPH_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_DPI: f32 = 72.0;

/// Colon-separated (`;` on Windows) extra font directories.
pub const FONT_DIR_ENV: &str = "GLYPHCAST_FONT_DIR";

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub small_size_threshold: f32,
    pub glyph_cache_capacity: usize,
    pub font_dirs: Vec<PathBuf>,
    pub system_fonts: bool,
    pub background: Color,
    pub dpi: f32,
    pub debug_log: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            small_size_threshold: DEFAULT_SMALL_SIZE_THRESHOLD,
            glyph_cache_capacity: DEFAULT_GLYPH_CACHE_CAPACITY,
            font_dirs: Vec::new(),
            system_fonts: true,
            background: Color::WHITE,
            dpi: DEFAULT_DPI,
            debug_log: None,
        }
    }
}

impl RenderConfig {
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::new()
    }

    /// Device pixels per PDF point.
    pub fn pixels_per_point(&self) -> f32 {
        self.dpi / DEFAULT_DPI
    }

    /// Configured directories followed by any from the environment.
    pub fn all_font_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.font_dirs.clone();
        if let Some(raw) = std::env::var_os(FONT_DIR_ENV) {
            for dir in std::env::split_paths(&raw) {
                if !dir.as_os_str().is_empty() && !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        dirs
    }
}

pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl Default for RenderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
        }
    }

    pub fn small_size_threshold(mut self, threshold: f32) -> Self {
        self.config.small_size_threshold = threshold;
        self
    }

    pub fn glyph_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.glyph_cache_capacity = capacity;
        self
    }

    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dirs.push(dir.into());
        self
    }

    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.config.system_fonts = enabled;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.config.background = color;
        self
    }

    /// Page reconstruction resolution; 0 means the PDF default of 72.
    pub fn dpi(mut self, dpi: f32) -> Self {
        self.config.dpi = if dpi == 0.0 { DEFAULT_DPI } else { dpi };
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.debug_log = Some(path.into());
        self
    }

    pub fn build(self) -> Result<RenderConfig, RasterError> {
        let c = &self.config;
        if !(c.small_size_threshold.is_finite() && c.small_size_threshold >= 0.0) {
            return Err(RasterError::InvalidConfiguration(format!(
                "small_size_threshold must be a non-negative number, got {}",
                c.small_size_threshold
            )));
        }
        if c.glyph_cache_capacity == 0 {
            return Err(RasterError::InvalidConfiguration(
                "glyph_cache_capacity must be at least 1".to_string(),
            ));
        }
        if !(c.dpi.is_finite() && c.dpi > 0.0) {
            return Err(RasterError::InvalidConfiguration(format!(
                "dpi must be positive, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}
