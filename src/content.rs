use crate::catalog::FontCatalog;
use crate::config::RenderConfig;
use crate::debug::{
    COUNTER_MISSING_GLYPHS, COUNTER_OPERATORS, COUNTER_UNKNOWN_OPERATORS, DebugLogger,
};
use crate::error::{RasterError, image_err, lopdf_err};
use crate::geometry::Vec2;
use crate::glyph_render::GlyphRenderer;
use crate::matrix::{Matrix, MatrixOrder};
use crate::surface::{self, Color, DrawStats, PixelTarget};
use crate::truetype::TrueTypeFont;
use image::{ImageFormat, RgbaImage};
use lopdf::Object;
use lopdf::content::{Content, Operation};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

/// Operators that are recognised but draw nothing here.
const IGNORED_OPERATORS: &[&str] = &[
    // path construction and painting
    "m", "l", "c", "v", "y", "h", "re", "S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "n",
    // clipping
    "W", "W*",
    // colour other than the non-stroking operators tracked for text
    "CS", "cs", "SC", "SCN", "sc", "scn", "G", "RG", "K",
    // line style and graphics state parameters
    "w", "J", "j", "M", "d", "ri", "i", "gs",
    // shading, inline images, marked content, compatibility, type 3 glyphs
    "sh", "BI", "ID", "EI", "BMC", "BDC", "EMC", "MP", "DP", "BX", "EX", "d0", "d1",
];

/// One operand of a content-stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(i64),
    Real(f32),
    Name(String),
    String(Vec<u8>),
    Array(Vec<Operand>),
    Other,
}

impl Operand {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            Operand::Integer(v) => Some(*v as f32),
            Operand::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Operand::String(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<&Object> for Operand {
    fn from(obj: &Object) -> Self {
        match obj {
            Object::Integer(v) => Operand::Integer(*v),
            Object::Real(v) => Operand::Real(*v),
            Object::Name(name) => Operand::Name(String::from_utf8_lossy(name).into_owned()),
            Object::String(bytes, _) => Operand::String(bytes.clone()),
            Object::Array(items) => Operand::Array(items.iter().map(Operand::from).collect()),
            _ => Operand::Other,
        }
    }
}

/// An operator with the operands that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<Operand>,
}

impl ContentOp {
    pub fn new(operator: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }

    /// Exactly `N` numbers, given either as `N` scalar operands or as a
    /// single array operand of length `N`.
    pub fn numbers<const N: usize>(&self) -> Option<[f32; N]> {
        let values: &[Operand] = match self.operands.as_slice() {
            [Operand::Array(items)] if N != 1 || items.len() == 1 => items,
            all => all,
        };
        if values.len() != N {
            return None;
        }
        let mut out = [0.0f32; N];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value.as_number()?;
        }
        Some(out)
    }

    pub fn number(&self, idx: usize) -> Option<f32> {
        self.operands.get(idx)?.as_number()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.operands.get(idx)?.as_name()
    }
}

impl From<&Operation> for ContentOp {
    fn from(op: &Operation) -> Self {
        Self {
            operator: op.operator.clone(),
            operands: op.operands.iter().map(Operand::from).collect(),
        }
    }
}

/// Tokenizes decompressed content-stream bytes.
///
/// The whole stream must parse: an unterminated string, array or
/// dictionary, operands left without an operator, or bytes the tokenizer
/// cannot read are `MalformedContent` errors.
pub fn decode_content(bytes: &[u8]) -> Result<Vec<ContentOp>, RasterError> {
    let expected = count_operators(bytes)?;
    let content = Content::decode(bytes).map_err(lopdf_err)?;
    if content.operations.len() != expected {
        let parsed = content.operations.len();
        let last = content
            .operations
            .last()
            .map(|op| op.operator.as_str())
            .unwrap_or("start of stream");
        return Err(RasterError::MalformedContent(format!(
            "parsed {parsed} of {expected} operators; stream unreadable after {last:?}"
        )));
    }
    Ok(content.operations.iter().map(ContentOp::from).collect())
}

fn is_white(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | 0)
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_operator_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'*' | b'\'' | b'"')
}

fn malformed(what: &str, at: usize) -> RasterError {
    RasterError::MalformedContent(format!("{what} at byte {at}"))
}

/// Structural pass over a content stream: checks that every string, array
/// and dictionary is closed and that the stream ends on an operator, and
/// counts the operators (an inline image counts once).
fn count_operators(bytes: &[u8]) -> Result<usize, RasterError> {
    let len = bytes.len();
    let mut pos = 0;
    let mut operators = 0;
    let mut nesting: Vec<(u8, usize)> = Vec::new();
    let mut pending: Option<usize> = None;
    while pos < len {
        let start = pos;
        let b = bytes[pos];
        match b {
            _ if is_white(b) => pos += 1,
            b'%' => {
                while pos < len && bytes[pos] != b'\n' && bytes[pos] != b'\r' {
                    pos += 1;
                }
            }
            b'(' => {
                pos = skip_literal_string(bytes, pos)?;
                pending.get_or_insert(start);
            }
            b'<' if bytes.get(pos + 1) == Some(&b'<') => {
                nesting.push((b'>', start));
                pending.get_or_insert(start);
                pos += 2;
            }
            b'<' => {
                let close = bytes[pos..]
                    .iter()
                    .position(|c| *c == b'>')
                    .ok_or_else(|| malformed("unterminated hex string", start))?;
                pos += close + 1;
                pending.get_or_insert(start);
            }
            b'[' => {
                nesting.push((b']', start));
                pending.get_or_insert(start);
                pos += 1;
            }
            b']' | b'>' => {
                let width = if b == b'>' { 2 } else { 1 };
                if b == b'>' && bytes.get(pos + 1) != Some(&b'>') {
                    return Err(malformed("unexpected '>'", start));
                }
                match nesting.pop() {
                    Some((close, _)) if close == b => pos += width,
                    _ => return Err(malformed("unbalanced closing delimiter", start)),
                }
            }
            b'/' => {
                pos += 1;
                while pos < len && !is_white(bytes[pos]) && !is_delimiter(bytes[pos]) {
                    pos += 1;
                }
                pending.get_or_insert(start);
            }
            b')' | b'{' | b'}' => return Err(malformed("unexpected delimiter", start)),
            _ if is_operator_byte(b) => {
                while pos < len && is_operator_byte(bytes[pos]) {
                    pos += 1;
                }
                let word = &bytes[start..pos];
                if !nesting.is_empty() || matches!(word, b"true" | b"false" | b"null") {
                    pending.get_or_insert(start);
                } else {
                    if word == b"BI" {
                        pos = skip_inline_image(bytes, pos)?;
                    }
                    operators += 1;
                    pending = None;
                }
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => {
                while pos < len && matches!(bytes[pos], b'0'..=b'9' | b'+' | b'-' | b'.') {
                    pos += 1;
                }
                pending.get_or_insert(start);
            }
            _ => return Err(malformed("unreadable byte", start)),
        }
    }
    if let Some((_, open)) = nesting.last() {
        return Err(malformed("unterminated array or dictionary", *open));
    }
    if let Some(at) = pending {
        return Err(malformed("operands without an operator", at));
    }
    Ok(operators)
}

/// Position just past the `)` closing the literal string opened at `start`.
fn skip_literal_string(bytes: &[u8], start: usize) -> Result<usize, RasterError> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(pos + 1);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    Err(malformed("unterminated string", start))
}

/// Position just past the `EI` ending an inline image whose `BI` ends at
/// `pos`. Image data runs from after `ID` to a white-delimited `EI`.
fn skip_inline_image(bytes: &[u8], pos: usize) -> Result<usize, RasterError> {
    let delimited = |at: usize, word: &[u8]| {
        bytes[at..].starts_with(word)
            && at.checked_sub(1).is_none_or(|p| is_white(bytes[p]))
            && bytes.get(at + word.len()).is_none_or(|b| is_white(*b))
    };
    let data = (pos..bytes.len())
        .find(|at| delimited(*at, b"ID"))
        .ok_or_else(|| malformed("inline image without ID", pos))?
        + 3;
    (data..bytes.len())
        .find(|at| delimited(*at, b"EI"))
        .map(|at| at + 2)
        .ok_or_else(|| malformed("unterminated inline image", pos))
}

/// A string operand ready to be drawn, with the text state in force.
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub bytes: &'a [u8],
    pub font: Option<&'a str>,
    pub font_size: f32,
    pub char_spacing: f32,
    pub word_spacing: f32,
    /// `Tz` as a fraction (1.0 = 100%).
    pub horizontal_scale: f32,
    pub rise: f32,
    pub text_matrix: Matrix,
    pub ctm: Matrix,
    pub color: Color,
    /// False for render modes 3 and 7; the run still advances.
    pub visible: bool,
}

impl TextRun<'_> {
    /// Bytes as characters, one per byte.
    pub fn text(&self) -> String {
        self.bytes.iter().map(|b| char::from(*b)).collect()
    }

    /// Start of the run in user space.
    pub fn position(&self) -> Vec2 {
        self.text_matrix
            .then(self.ctm)
            .transform_point(Vec2::new(0.0, self.rise))
    }

    /// Maps text space, offset by `pen` along the baseline, to user space.
    pub fn text_to_user(&self, pen: f32) -> Matrix {
        Matrix::translation(pen, self.rise)
            .then(self.text_matrix)
            .then(self.ctm)
    }
}

/// Receives the drawing intent recovered from a content stream.
pub trait ContentSink {
    /// Draws (or measures, when invisible) a run and returns its horizontal
    /// displacement in text space, spacing and scaling included.
    fn show_text(&mut self, run: &TextRun<'_>) -> Result<f32, RasterError>;

    /// Draws image XObject `name` into the unit square mapped by `ctm`.
    fn draw_image(&mut self, name: &str, ctm: &Matrix) -> Result<(), RasterError>;
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    font: Option<String>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    rise: f32,
    render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
            font: None,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Color,
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::identity(),
            fill: Color::BLACK,
            text: TextState::default(),
        }
    }
}

/// Walks content operators in order, tracking the transform and text state
/// and forwarding text and image operations to a [`ContentSink`].
#[derive(Debug, Default)]
pub struct ContentInterpreter {
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    in_text: bool,
    debug: Option<DebugLogger>,
}

impl ContentInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: DebugLogger) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn ctm(&self) -> Matrix {
        self.state.ctm
    }

    pub fn text_matrix(&self) -> Matrix {
        self.state.text.matrix
    }

    /// Current text position in user space.
    pub fn text_position(&self) -> Vec2 {
        self.state
            .text
            .matrix
            .then(self.state.ctm)
            .transform_point(Vec2::ZERO)
    }

    pub fn run(
        &mut self,
        ops: &[ContentOp],
        sink: &mut dyn ContentSink,
    ) -> Result<(), RasterError> {
        for op in ops {
            self.apply(op, sink)?;
        }
        Ok(())
    }

    pub fn apply(
        &mut self,
        op: &ContentOp,
        sink: &mut dyn ContentSink,
    ) -> Result<(), RasterError> {
        if let Some(debug) = &self.debug {
            debug.increment(COUNTER_OPERATORS, 1);
        }
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => match self.stack.pop() {
                Some(prev) => self.state = prev,
                None => log::debug!("Q without matching q"),
            },
            "cm" => {
                if let Some([a, b, c, d, e, f]) = self.operands::<6>(op) {
                    self.state
                        .ctm
                        .multiply(&Matrix::new(a, b, c, d, e, f), MatrixOrder::Prepend);
                }
            }
            "g" => {
                if let Some([gray]) = self.operands::<1>(op) {
                    self.state.fill = Color::from_unit(gray, gray, gray);
                }
            }
            "rg" => {
                if let Some([r, g, b]) = self.operands::<3>(op) {
                    self.state.fill = Color::from_unit(r, g, b);
                }
            }
            "k" => {
                if let Some([c, m, y, k]) = self.operands::<4>(op) {
                    let w = 1.0 - k.clamp(0.0, 1.0);
                    self.state.fill =
                        Color::from_unit((1.0 - c) * w, (1.0 - m) * w, (1.0 - y) * w);
                }
            }
            "BT" => {
                if self.in_text {
                    log::debug!("nested BT");
                }
                self.in_text = true;
                self.state.text.matrix = Matrix::identity();
                self.state.text.line_matrix = Matrix::identity();
            }
            "ET" => self.in_text = false,
            "Tf" => match (op.name(0), op.number(1)) {
                (Some(name), Some(size)) => {
                    self.state.text.font = Some(name.to_string());
                    self.state.text.font_size = size;
                }
                _ => self.skip(op),
            },
            "TL" => {
                if let Some([leading]) = self.operands::<1>(op) {
                    self.state.text.leading = leading;
                }
            }
            "Tc" => {
                if let Some([spacing]) = self.operands::<1>(op) {
                    self.state.text.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = self.operands::<1>(op) {
                    self.state.text.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some([percent]) = self.operands::<1>(op) {
                    self.state.text.horizontal_scale = (percent / 100.0).max(0.0);
                }
            }
            "Ts" => {
                if let Some([rise]) = self.operands::<1>(op) {
                    self.state.text.rise = rise;
                }
            }
            "Tr" => {
                if let Some([mode]) = self.operands::<1>(op) {
                    self.state.text.render_mode = (mode as i64).clamp(0, 7);
                }
            }
            "Td" => {
                if let Some([tx, ty]) = self.operands::<2>(op) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = self.operands::<2>(op) {
                    self.state.text.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "T*" => self.next_line(0.0, -self.state.text.leading),
            "Tm" => {
                if let Some([a, b, c, d, e, f]) = self.operands::<6>(op) {
                    let m = Matrix::new(a, b, c, d, e, f);
                    self.state.text.matrix = m;
                    self.state.text.line_matrix = m;
                }
            }
            "Tj" => match op.operands.first().and_then(Operand::as_bytes) {
                Some(bytes) => self.show(bytes, sink)?,
                None => self.skip(op),
            },
            "'" => match op.operands.first().and_then(Operand::as_bytes) {
                Some(bytes) => {
                    self.next_line(0.0, -self.state.text.leading);
                    self.show(bytes, sink)?;
                }
                None => self.skip(op),
            },
            "\"" => match (op.number(0), op.number(1), op.operands.get(2)) {
                (Some(aw), Some(ac), Some(Operand::String(bytes))) => {
                    self.state.text.word_spacing = aw;
                    self.state.text.char_spacing = ac;
                    self.next_line(0.0, -self.state.text.leading);
                    self.show(bytes, sink)?;
                }
                _ => self.skip(op),
            },
            "TJ" => match op.operands.first() {
                Some(Operand::Array(items)) => {
                    for item in items {
                        match item {
                            Operand::String(bytes) => self.show(bytes, sink)?,
                            other => {
                                if let Some(adjust) = other.as_number() {
                                    // Thousandths of text space, subtracted.
                                    let text = &self.state.text;
                                    let tx = -(adjust / 1000.0)
                                        * text.font_size
                                        * text.horizontal_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
                _ => self.skip(op),
            },
            "Do" => match op.name(0) {
                Some(name) => sink.draw_image(name, &self.state.ctm)?,
                None => self.skip(op),
            },
            other if IGNORED_OPERATORS.contains(&other) => {}
            other => {
                if let Some(debug) = &self.debug {
                    debug.increment(COUNTER_UNKNOWN_OPERATORS, 1);
                    debug.log_event("content.unknown_operator", &[("operator", other.to_string())]);
                }
                return Err(RasterError::UnknownOperator(other.to_string()));
            }
        }
        Ok(())
    }

    fn operands<const N: usize>(&self, op: &ContentOp) -> Option<[f32; N]> {
        let values = op.numbers::<N>();
        if values.is_none() {
            self.skip(op);
        }
        values
    }

    fn skip(&self, op: &ContentOp) {
        log::debug!(
            "ignoring '{}' with unexpected operands {:?}",
            op.operator,
            op.operands
        );
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        let text = &mut self.state.text;
        text.line_matrix
            .multiply(&Matrix::translation(tx, ty), MatrixOrder::Prepend);
        text.matrix = text.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.state
            .text
            .matrix
            .multiply(&Matrix::translation(tx, 0.0), MatrixOrder::Prepend);
    }

    fn show(&mut self, bytes: &[u8], sink: &mut dyn ContentSink) -> Result<(), RasterError> {
        if !self.in_text {
            log::debug!("text shown outside BT/ET");
        }
        let text = &self.state.text;
        let run = TextRun {
            bytes,
            font: text.font.as_deref(),
            font_size: text.font_size,
            char_spacing: text.char_spacing,
            word_spacing: text.word_spacing,
            horizontal_scale: text.horizontal_scale,
            rise: text.rise,
            text_matrix: text.matrix,
            ctm: self.state.ctm,
            color: self.state.fill,
            visible: text.render_mode != 3 && text.render_mode != 7,
        };
        let tx = sink.show_text(&run)?;
        self.advance(tx);
        Ok(())
    }
}

/// Fonts and images a content stream refers to by resource name.
#[derive(Debug, Default)]
pub struct ContentResources {
    fonts: HashMap<String, Arc<TrueTypeFont>>,
    images: HashMap<String, RgbaImage>,
}

impl ContentResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_font(&mut self, name: impl Into<String>, font: Arc<TrueTypeFont>) {
        self.fonts.insert(name.into(), font);
    }

    pub fn add_image(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.images.insert(name.into(), image);
    }

    /// Decodes an encoded image (PNG or JPEG) and adds it.
    pub fn add_image_bytes(
        &mut self,
        name: impl Into<String>,
        bytes: &[u8],
    ) -> Result<(), RasterError> {
        let image = image::load_from_memory(bytes).map_err(image_err)?;
        self.add_image(name, image.to_rgba8());
        Ok(())
    }

    pub fn font(&self, name: &str) -> Option<&Arc<TrueTypeFont>> {
        self.fonts.get(name)
    }

    pub fn image(&self, name: &str) -> Option<&RgbaImage> {
        self.images.get(name)
    }
}

/// Reconstructs a page from its content operators onto a raster.
pub struct PageRenderer<'a> {
    glyphs: &'a GlyphRenderer,
    resources: &'a ContentResources,
    catalog: Option<&'a FontCatalog>,
    debug: Option<DebugLogger>,
    width_pt: f32,
    height_pt: f32,
    pixels_per_point: f32,
    background: Color,
}

impl<'a> PageRenderer<'a> {
    pub fn new(
        glyphs: &'a GlyphRenderer,
        resources: &'a ContentResources,
        width_pt: f32,
        height_pt: f32,
    ) -> Self {
        Self {
            glyphs,
            resources,
            catalog: None,
            debug: None,
            width_pt,
            height_pt,
            pixels_per_point: 1.0,
            background: Color::WHITE,
        }
    }

    /// Falls back to `catalog` for font resources the page does not supply.
    pub fn with_catalog(mut self, catalog: &'a FontCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_config(mut self, config: &RenderConfig) -> Self {
        self.pixels_per_point = config.pixels_per_point();
        self.background = config.background;
        self
    }

    pub fn with_debug(mut self, debug: DebugLogger) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width_pt * self.pixels_per_point).ceil().max(1.0) as u32,
            (self.height_pt * self.pixels_per_point).ceil().max(1.0) as u32,
        )
    }

    /// PDF user space (origin bottom-left, points) to device pixels.
    pub fn device_matrix(&self) -> Matrix {
        let s = self.pixels_per_point;
        Matrix::new(s, 0.0, 0.0, -s, 0.0, self.height_pt * s)
    }

    /// Draws `ops` onto an existing target without clearing it.
    pub fn render_into(
        &self,
        target: &mut dyn PixelTarget,
        ops: &[ContentOp],
    ) -> Result<DrawStats, RasterError> {
        let mut sink = RasterSink {
            page: self,
            target,
            device: self.device_matrix(),
            resolved: HashMap::new(),
            stats: DrawStats::default(),
        };
        let mut interpreter = ContentInterpreter::new();
        if let Some(debug) = &self.debug {
            interpreter = interpreter.with_debug(debug.clone());
        }
        interpreter.run(ops, &mut sink)?;
        Ok(sink.stats)
    }

    pub fn render_to_image(&self, ops: &[ContentOp]) -> Result<RgbaImage, RasterError> {
        let (width, height) = self.pixel_size();
        let mut image = RgbaImage::new(width, height);
        PixelTarget::fill(&mut image, self.background);
        self.render_into(&mut image, ops)?;
        Ok(image)
    }

    pub fn render_to_png(&self, ops: &[ContentOp]) -> Result<Vec<u8>, RasterError> {
        let image = self.render_to_image(ops)?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(image_err)?;
        Ok(out.into_inner())
    }
}

struct RasterSink<'p, 't> {
    page: &'p PageRenderer<'p>,
    target: &'t mut dyn PixelTarget,
    device: Matrix,
    resolved: HashMap<String, Option<Arc<TrueTypeFont>>>,
    stats: DrawStats,
}

impl RasterSink<'_, '_> {
    fn font(&mut self, name: &str) -> Result<Option<Arc<TrueTypeFont>>, RasterError> {
        if let Some(font) = self.page.resources.font(name) {
            return Ok(Some(font.clone()));
        }
        if let Some(found) = self.resolved.get(name) {
            return Ok(found.clone());
        }
        let found = match self.page.catalog {
            Some(catalog) => catalog.resolve(name)?,
            None => None,
        };
        if found.is_none() {
            log::warn!("font resource {name:?} not available; text will be measured only");
        }
        self.resolved.insert(name.to_string(), found.clone());
        Ok(found)
    }
}

/// Uniform font-unit scale when `m` maps glyphs onto the device upright,
/// without rotation, shear or mirroring.
fn upright_scale(m: &Matrix) -> Option<f32> {
    let flat = m.m12.abs() < 1e-4 && m.m21.abs() < 1e-4;
    let sx = m.m11;
    let sy = -m.m22;
    (flat && sx > 0.0 && sy > 0.0 && (sx - sy).abs() <= sy * 0.01).then_some(sy)
}

impl ContentSink for RasterSink<'_, '_> {
    fn show_text(&mut self, run: &TextRun<'_>) -> Result<f32, RasterError> {
        let font = match run.font {
            Some(name) => self.font(name)?,
            None => None,
        };
        let th = run.horizontal_scale;
        let Some(font) = font else {
            // Half an em per character, the usual fallback width.
            let mut tx = 0.0;
            for b in run.bytes {
                let space = if *b == b' ' { run.word_spacing } else { 0.0 };
                tx += (0.5 * run.font_size + run.char_spacing + space) * th;
            }
            return Ok(tx);
        };

        let upem = font.height().max(1) as f32;
        let glyph_scale = Matrix::scaling(run.font_size * th / upem, run.font_size / upem);
        let mut pen = 0.0;
        for b in run.bytes {
            let ch = char::from(*b);
            let index = font.glyph_index(ch)?;
            if index == 0 {
                if let Some(debug) = &self.page.debug {
                    debug.increment(COUNTER_MISSING_GLYPHS, 1);
                }
            }
            if run.visible {
                if let Some(glyph) = font.read_glyph(ch)? {
                    let to_device = glyph_scale.then(run.text_to_user(pen)).then(self.device);
                    let stats = match upright_scale(&to_device) {
                        Some(scale) => {
                            let origin = to_device.transform_point(Vec2::ZERO);
                            self.page.glyphs.draw_glyph_at_baseline(
                                &mut *self.target,
                                origin.x,
                                origin.y,
                                scale,
                                &glyph,
                                run.color,
                            )
                        }
                        None => self.page.glyphs.draw_glyph_outline(
                            &mut *self.target,
                            &glyph,
                            &to_device,
                            run.color,
                        ),
                    };
                    self.stats.merge(stats);
                }
            }
            let w0 = font.glyph_width(index) as f32 / upem;
            let space = if *b == b' ' { run.word_spacing } else { 0.0 };
            pen += (w0 * run.font_size + run.char_spacing + space) * th;
        }
        Ok(pen)
    }

    fn draw_image(&mut self, name: &str, ctm: &Matrix) -> Result<(), RasterError> {
        let Some(image) = self.page.resources.image(name) else {
            log::warn!("image resource {name:?} not available");
            return Ok(());
        };
        let m = ctm.then(self.device);
        if m.m12.abs() > 1e-4 || m.m21.abs() > 1e-4 {
            log::debug!("skipping rotated image {name:?}");
            return Ok(());
        }
        let a = m.transform_point(Vec2::new(0.0, 0.0));
        let b = m.transform_point(Vec2::new(1.0, 1.0));
        let x = a.x.min(b.x).round() as i32;
        let y = a.y.min(b.y).round() as i32;
        let width = (a.x - b.x).abs().round() as u32;
        let height = (a.y - b.y).abs().round() as u32;
        let written = surface::draw_image(&mut *self.target, image, x, y, width, height);
        self.stats.written += written;
        Ok(())
    }
}
