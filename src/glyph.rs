use crate::error::RasterError;
use crate::geometry::Vec2;
use crate::matrix::Matrix;
use crate::truetype::FontId;

/// Flattening tolerance in font units used by [`Glyph::normalised_contours`].
pub const DEFAULT_FLATTEN_TOLERANCE: f32 = 1.0;

const MAX_CURVE_STEPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphKind {
    Simple,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPoint {
    pub x: f32,
    pub y: f32,
    pub on_curve: bool,
}

impl GlyphPoint {
    pub fn new(x: f32, y: f32, on_curve: bool) -> Self {
        Self { x, y, on_curve }
    }

    fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Bounding box in font units, y growing upwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphBounds {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl GlyphBounds {
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn of_points<'a>(points: impl IntoIterator<Item = &'a Vec2>) -> Option<GlyphBounds> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut out = GlyphBounds {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        for p in iter {
            out.x_min = out.x_min.min(p.x);
            out.y_min = out.y_min.min(p.y);
            out.x_max = out.x_max.max(p.x);
            out.y_max = out.y_max.max(p.y);
        }
        Some(out)
    }
}

/// One decoded character outline. Immutable once built.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub character: Option<char>,
    pub glyph_index: u16,
    pub font: FontId,
    pub kind: GlyphKind,
    pub bounds: GlyphBounds,
    pub advance_width: u16,
    pub left_side_bearing: i16,
    /// Font ascender, so renderers can place the baseline below a top-left
    /// insertion point.
    pub ascent: i16,
    points: Vec<GlyphPoint>,
    contour_ends: Vec<u16>,
}

impl Glyph {
    /// Validates that contour ends are strictly increasing and that the last
    /// one closes on the final point.
    pub fn new(
        font: FontId,
        glyph_index: u16,
        kind: GlyphKind,
        bounds: GlyphBounds,
        points: Vec<GlyphPoint>,
        contour_ends: Vec<u16>,
    ) -> Result<Self, RasterError> {
        let mut prev: Option<u16> = None;
        for end in &contour_ends {
            if prev.is_some_and(|p| *end <= p) {
                return Err(RasterError::MalformedFont(format!(
                    "glyph {glyph_index}: contour ends not increasing"
                )));
            }
            prev = Some(*end);
        }
        match contour_ends.last() {
            Some(last) if *last as usize + 1 != points.len() => {
                return Err(RasterError::MalformedFont(format!(
                    "glyph {glyph_index}: last contour ends at {last} but glyph has {} points",
                    points.len()
                )));
            }
            None if !points.is_empty() => {
                return Err(RasterError::MalformedFont(format!(
                    "glyph {glyph_index}: points without contours"
                )));
            }
            _ => {}
        }
        Ok(Self {
            character: None,
            glyph_index,
            font,
            kind,
            bounds,
            advance_width: 0,
            left_side_bearing: 0,
            ascent: 0,
            points,
            contour_ends,
        })
    }

    pub fn empty(font: FontId, glyph_index: u16, kind: GlyphKind) -> Self {
        Self {
            character: None,
            glyph_index,
            font,
            kind,
            bounds: GlyphBounds::default(),
            advance_width: 0,
            left_side_bearing: 0,
            ascent: 0,
            points: Vec::new(),
            contour_ends: Vec::new(),
        }
    }

    pub(crate) fn with_metrics(
        mut self,
        advance_width: u16,
        left_side_bearing: i16,
        ascent: i16,
    ) -> Self {
        self.advance_width = advance_width;
        self.left_side_bearing = left_side_bearing;
        self.ascent = ascent;
        self
    }

    pub(crate) fn with_character(mut self, character: char) -> Self {
        self.character = Some(character);
        self
    }

    pub fn points(&self) -> &[GlyphPoint] {
        &self.points
    }

    pub fn contour_ends(&self) -> &[u16] {
        &self.contour_ends
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_renderable(&self) -> bool {
        self.kind == GlyphKind::Simple && !self.points.is_empty()
    }

    /// Raw contour point slices, in file order.
    pub fn contours(&self) -> impl Iterator<Item = &[GlyphPoint]> + '_ {
        let mut start = 0usize;
        self.contour_ends.iter().map(move |end| {
            let end = *end as usize + 1;
            let slice = &self.points[start..end];
            start = end;
            slice
        })
    }

    /// Bounds of the actual points, which may differ from the `glyf` header.
    pub fn point_bounds(&self) -> Option<GlyphBounds> {
        let pts: Vec<Vec2> = self.points.iter().map(GlyphPoint::pos).collect();
        GlyphBounds::of_points(pts.iter())
    }

    pub fn normalised_contours(&self) -> Vec<Vec<Vec2>> {
        self.normalised_contours_with(DEFAULT_FLATTEN_TOLERANCE)
    }

    /// Closed straight-line contours with quadratic curves flattened to
    /// within `tolerance` font units. The closing edge is implicit.
    pub fn normalised_contours_with(&self, tolerance: f32) -> Vec<Vec<Vec2>> {
        let tolerance = if tolerance > 0.0 {
            tolerance
        } else {
            DEFAULT_FLATTEN_TOLERANCE
        };
        let mut out = Vec::with_capacity(self.contour_ends.len());
        for contour in self.contours() {
            let flat = flatten_contour(contour, tolerance);
            if flat.len() >= 2 {
                out.push(flat);
            }
        }
        out
    }
}

fn flatten_contour(points: &[GlyphPoint], tolerance: f32) -> Vec<Vec2> {
    let n = points.len();
    let mut out = Vec::with_capacity(n * 2);
    if n == 0 {
        return out;
    }

    // Rotate so the walk starts on an on-curve point; an all-off-curve
    // contour starts on the implied midpoint between its last and first points.
    let (start, order): (Vec2, Vec<GlyphPoint>) = match points.iter().position(|p| p.on_curve) {
        Some(s) => {
            let seq = (1..=n).map(|k| points[(s + k) % n]).collect();
            (points[s].pos(), seq)
        }
        None => {
            let mid = points[n - 1].pos().midpoint(points[0].pos());
            let mut seq: Vec<GlyphPoint> = points.to_vec();
            seq.push(GlyphPoint::new(mid.x, mid.y, true));
            (mid, seq)
        }
    };

    out.push(start);
    let mut current = start;
    let mut control: Option<Vec2> = None;
    for p in order {
        let pos = p.pos();
        match (p.on_curve, control) {
            (true, Some(c)) => {
                push_quadratic(&mut out, current, c, pos, tolerance);
                control = None;
                current = pos;
            }
            (true, None) => {
                out.push(pos);
                current = pos;
            }
            (false, Some(c)) => {
                let mid = c.midpoint(pos);
                push_quadratic(&mut out, current, c, mid, tolerance);
                current = mid;
                control = Some(pos);
            }
            (false, None) => control = Some(pos),
        }
    }

    // The walk ends back on the start point.
    if out.len() > 1 && out.last() == out.first() {
        out.pop();
    }
    out.dedup();
    out
}

fn push_quadratic(out: &mut Vec<Vec2>, p0: Vec2, c: Vec2, p1: Vec2, tolerance: f32) {
    let dd = (p0 - c * 2.0 + p1).length();
    let steps = ((dd / (8.0 * tolerance)).sqrt().ceil() as usize).clamp(1, MAX_CURVE_STEPS);
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        let a = p0.lerp(c, t);
        let b = c.lerp(p1, t);
        out.push(a.lerp(b, t));
    }
}

/// A closed polyline in render space; the last point connects to the first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RasterContour {
    pub points: Vec<Vec2>,
}

/// Transformed contours ready for distance-field filling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderableGlyph {
    pub contours: Vec<RasterContour>,
}

impl RenderableGlyph {
    pub fn from_glyph(glyph: &Glyph, transform: &Matrix) -> Self {
        let (sx, sy) = transform.axis_scales();
        let scale = sx.max(sy).max(f32::EPSILON);
        let contours = glyph
            .normalised_contours_with(0.2 / scale)
            .into_iter()
            .map(|mut points| {
                transform.transform_points(&mut points);
                RasterContour { points }
            })
            .collect();
        Self { contours }
    }

    pub fn from_polygon(points: &[Vec2], transform: &Matrix) -> Self {
        let mut points = points.to_vec();
        transform.transform_points(&mut points);
        Self {
            contours: vec![RasterContour { points }],
        }
    }

    pub fn transform(&mut self, transform: &Matrix) {
        for contour in &mut self.contours {
            transform.transform_points(&mut contour.points);
        }
    }

    pub fn bounds(&self) -> Option<GlyphBounds> {
        GlyphBounds::of_points(self.contours.iter().flat_map(|c| c.points.iter()))
    }
}
