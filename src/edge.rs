use crate::geometry::{Point, Vec2, VecSegment2};
use crate::glyph::Glyph;
use bitflags::bitflags;

/// Blank samples around the outline so the walk and the renderers'
/// neighbourhood reads never leave the buffer.
pub const WORKSPACE_PADDING: usize = 8;

const HALF_PAD: f32 = (WORKSPACE_PADDING / 2) as f32;

/// Vertical sub-positions used when snapping Y before truncation.
const Y_SUB_POSITIONS: f32 = 2.0;

bitflags! {
    /// Per-sample state written by the edge walk and the fill pass.
    ///
    /// `DIR_UP`/`DIR_DOWN` are in font orientation (Y up), so an upward
    /// edge moves towards smaller workspace rows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EdgeFlags: u8 {
        const INSIDE = 1 << 0;
        const DIR_UP = 1 << 1;
        const DIR_DOWN = 1 << 2;
        const DIR_RIGHT = 1 << 3;
        const DIR_LEFT = 1 << 4;
        const TOUCHED = 1 << 5;
        const DROPOUT = 1 << 6;
    }
}

/// Flag buffer for one glyph at one scale, rows top-down.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWorkspace {
    width: usize,
    height: usize,
    data: Vec<u8>,
    /// Column holding font x = 0, in samples.
    pub origin_x: f32,
    /// Row holding font y = 0 (the baseline), in samples.
    pub baseline: f32,
}

impl EdgeWorkspace {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            origin_x: 0.0,
            baseline: 0.0,
        }
    }

    fn with_size(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
            origin_x: 0.0,
            baseline: 0.0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw flag bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Flags at (`x`, `y`); samples outside the buffer read as empty.
    pub fn flags(&self, x: i32, y: i32) -> EdgeFlags {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return EdgeFlags::empty();
        }
        EdgeFlags::from_bits_truncate(self.data[y as usize * self.width + x as usize])
    }

    pub fn is_inside(&self, x: i32, y: i32) -> bool {
        self.flags(x, y).contains(EdgeFlags::INSIDE)
    }

    pub fn inside_count(&self) -> usize {
        self.data
            .iter()
            .filter(|b| EdgeFlags::from_bits_truncate(**b).contains(EdgeFlags::INSIDE))
            .count()
    }

    fn mark(&mut self, p: Point, flags: EdgeFlags) {
        if p.x < 0 || p.y < 0 || p.x as usize >= self.width || p.y as usize >= self.height {
            return;
        }
        self.data[p.y as usize * self.width + p.x as usize] |= flags.bits();
    }
}

/// Rasterises `glyph` into an edge workspace with independent horizontal and
/// vertical scale factors (pixels per font unit).
///
/// Composite and empty glyphs produce an empty workspace.
pub fn rasterise(glyph: &Glyph, x_scale: f32, y_scale: f32) -> EdgeWorkspace {
    if !glyph.is_renderable() || x_scale <= 0.0 || y_scale <= 0.0 {
        return EdgeWorkspace::empty();
    }
    let tolerance = 0.3 / x_scale.max(y_scale);
    rasterise_contours(&glyph.normalised_contours_with(tolerance), x_scale, y_scale)
}

/// Rasterises closed polylines given in font units (Y up).
pub fn rasterise_contours(contours: &[Vec<Vec2>], x_scale: f32, y_scale: f32) -> EdgeWorkspace {
    let Some((x_min, y_max, x_max, y_min)) = extents(contours) else {
        return EdgeWorkspace::empty();
    };
    if !(x_scale > 0.0 && y_scale > 0.0) {
        return EdgeWorkspace::empty();
    }

    let width = ((x_max - x_min) * x_scale).ceil() as usize + WORKSPACE_PADDING;
    let height = ((y_max - y_min) * y_scale).ceil() as usize + WORKSPACE_PADDING;
    let mut ws = EdgeWorkspace::with_size(width, height);

    let mut snapped: Vec<Vec<Point>> = Vec::with_capacity(contours.len());
    let mut min_error = f32::MAX;
    let mut signed_area = 0.0f32;
    for contour in contours {
        signed_area += shoelace(contour);
        let mut pixels: Vec<Point> = Vec::with_capacity(contour.len());
        for p in contour {
            let sx = (p.x - x_min) * x_scale + HALF_PAD;
            let sy = (y_max - p.y) * y_scale + HALF_PAD;
            let gy = (sy * Y_SUB_POSITIONS).round() / Y_SUB_POSITIONS;
            let iy = gy.floor();
            min_error = min_error.min(sy - iy);
            let px = Point::new(sx.round() as i32, iy as i32);
            if pixels.last() != Some(&px) {
                pixels.push(px);
            }
        }
        while pixels.len() > 1 && pixels.first() == pixels.last() {
            pixels.pop();
        }
        snapped.push(pixels);
    }
    if min_error == f32::MAX {
        min_error = 0.0;
    }

    ws.origin_x = -x_min * x_scale + HALF_PAD;
    ws.baseline = y_max * y_scale + HALF_PAD - min_error;

    // Outer contours are clockwise in font space; a glyph drawn the other
    // way round has its vertical directions swapped so the fill agrees.
    let flip = signed_area > 0.0;
    for pixels in &snapped {
        match pixels.len() {
            0 => {}
            1 => ws.mark(
                pixels[0],
                EdgeFlags::DROPOUT | EdgeFlags::TOUCHED,
            ),
            n => {
                for i in 0..n {
                    walk_edge(&mut ws, pixels[i], pixels[(i + 1) % n], flip);
                }
            }
        }
    }

    fill(&mut ws);
    ws
}

fn extents(contours: &[Vec<Vec2>]) -> Option<(f32, f32, f32, f32)> {
    let mut points = contours.iter().flatten().peekable();
    points.peek()?;
    let (mut x_min, mut y_min) = (f32::MAX, f32::MAX);
    let (mut x_max, mut y_max) = (f32::MIN, f32::MIN);
    for p in points {
        x_min = x_min.min(p.x);
        x_max = x_max.max(p.x);
        y_min = y_min.min(p.y);
        y_max = y_max.max(p.y);
    }
    Some((x_min, y_max, x_max, y_min))
}

/// Twice the signed area, positive for counter-clockwise in Y-up space.
fn shoelace(points: &[Vec2]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| points[i].cross(points[(i + 1) % n]))
        .sum()
}

/// Walks one edge with Bresenham.
///
/// The pixel path is always generated from the upper endpoint so both
/// traversal directions touch the same samples. A vertical step between rows
/// `r` and `r + 1` flags the row-`r` sample, which makes every edge cover a
/// half-open row range and shared vertices count once.
fn walk_edge(ws: &mut EdgeWorkspace, from: Point, to: Point, flip: bool) {
    let horizontal = if (to.x > from.x) != flip {
        EdgeFlags::DIR_RIGHT
    } else {
        EdgeFlags::DIR_LEFT
    };
    // Workspace rows grow downward, so a clockwise (row-increasing) segment
    // is a downward edge in font space.
    let (start, end, vertical) = match VecSegment2::new(from.into(), to.into()) {
        Some(seg) => {
            let vertical = if seg.clockwise != flip {
                EdgeFlags::DIR_DOWN
            } else {
                EdgeFlags::DIR_UP
            };
            (Point::from(seg.a), Point::from(seg.b), vertical)
        }
        // Flat edges never take a vertical step.
        None if from.x <= to.x => (from, to, EdgeFlags::empty()),
        None => (to, from, EdgeFlags::empty()),
    };

    let path = bresenham(start, end);
    ws.mark(start, EdgeFlags::TOUCHED);
    for pair in path.windows(2) {
        let (p, q) = (pair[0], pair[1]);
        let mut flags = EdgeFlags::TOUCHED;
        if q.x != p.x {
            flags |= horizontal;
        }
        ws.mark(q, flags);
        if q.y != p.y {
            ws.mark(p, vertical);
        }
    }
}

fn bresenham(start: Point, end: Point) -> Vec<Point> {
    let dx = (end.x - start.x).abs();
    let dy = -(end.y - start.y).abs();
    let sx = if start.x < end.x { 1 } else { -1 };
    let sy = if start.y < end.y { 1 } else { -1 };
    let mut err = dx + dy;
    let mut p = start;
    let mut out = Vec::with_capacity((dx - dy) as usize + 1);
    out.push(p);
    while p != end {
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            p.x += sx;
        }
        if e2 <= dx {
            err += dx;
            p.y += sy;
        }
        out.push(p);
    }
    out
}

/// Scans each row left to right: an up edge opens a run, a down edge closes
/// it, and a sample carrying both is a single-sample stem.
fn fill(ws: &mut EdgeWorkspace) {
    for row in ws.data.chunks_mut(ws.width.max(1)) {
        let mut inside = false;
        for byte in row.iter_mut() {
            let flags = EdgeFlags::from_bits_truncate(*byte);
            let up = flags.contains(EdgeFlags::DIR_UP);
            let down = flags.contains(EdgeFlags::DIR_DOWN);
            let mark = match (up, down) {
                (true, true) => true,
                (true, false) => {
                    inside = true;
                    true
                }
                (false, true) => {
                    inside = false;
                    true
                }
                (false, false) => {
                    inside || flags.intersects(EdgeFlags::TOUCHED | EdgeFlags::DROPOUT)
                }
            };
            if mark {
                *byte |= EdgeFlags::INSIDE.bits();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_font;
    use crate::truetype::TrueTypeFont;

    fn square(clockwise: bool) -> Vec<Vec2> {
        let mut pts = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 100.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(100.0, 0.0),
        ];
        if !clockwise {
            pts.reverse();
        }
        pts
    }

    fn inside_set(ws: &EdgeWorkspace) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in 0..ws.height() as i32 {
            for x in 0..ws.width() as i32 {
                if ws.is_inside(x, y) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn empty_input_gives_empty_workspace() {
        let ws = rasterise_contours(&[], 1.0, 1.0);
        assert!(ws.is_empty());
        assert_eq!((ws.width(), ws.height()), (0, 0));
    }

    #[test]
    fn square_fills_its_interior() {
        let ws = rasterise_contours(&[square(true)], 0.1, 0.1);
        assert_eq!(ws.width(), 10 + WORKSPACE_PADDING);
        assert!(ws.is_inside(9, 9));
        assert!(!ws.is_inside(1, 1));
        assert!(!ws.is_inside(ws.width() as i32 - 1, 9));
        let count = ws.inside_count();
        assert!((100..=121).contains(&count), "inside count {count}");
    }

    #[test]
    fn traversal_direction_does_not_change_coverage() {
        let cw = rasterise_contours(&[square(true)], 0.13, 0.07);
        let ccw = rasterise_contours(&[square(false)], 0.13, 0.07);
        assert_eq!(inside_set(&cw), inside_set(&ccw));

        let tri_cw = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(33.0, 97.0),
            Vec2::new(71.0, 12.0),
        ];
        let tri_ccw: Vec<Vec2> = tri_cw.iter().rev().copied().collect();
        let a = rasterise_contours(&[tri_cw], 0.31, 0.29);
        let b = rasterise_contours(&[tri_ccw], 0.31, 0.29);
        assert_eq!(inside_set(&a), inside_set(&b));
    }

    #[test]
    fn left_edge_runs_up_and_right_edge_runs_down() {
        for clockwise in [true, false] {
            let ws = rasterise_contours(&[square(clockwise)], 0.1, 0.1);
            let row = ws.height() as i32 / 2;
            let columns = |dir: EdgeFlags| -> Vec<i32> {
                (0..ws.width() as i32)
                    .filter(|&x| ws.flags(x, row).contains(dir))
                    .collect()
            };
            let up = columns(EdgeFlags::DIR_UP);
            let down = columns(EdgeFlags::DIR_DOWN);
            assert!(!up.is_empty() && !down.is_empty(), "clockwise {clockwise}");
            assert!(up.iter().max() < down.iter().min(), "clockwise {clockwise}");
        }
    }

    #[test]
    fn counter_stays_open() {
        let font = TrueTypeFont::parse(test_font::build()).expect("font");
        let glyph = font.read_glyph('A').expect("read").expect("glyph");
        let ws = rasterise(&glyph, 0.05, 0.05);
        assert!(!ws.is_empty());
        // Centre of the counter triangle sits at font (600, 450).
        let cx = (ws.origin_x + 600.0 * 0.05).round() as i32;
        let cy = (ws.baseline - 450.0 * 0.05).round() as i32;
        assert!(!ws.is_inside(cx, cy), "counter at ({cx}, {cy}) was filled");
        // Solid leg of the outer triangle, left of the counter.
        let lx = (ws.origin_x + 250.0 * 0.05).round() as i32;
        let ly = (ws.baseline - 150.0 * 0.05).round() as i32;
        assert!(ws.is_inside(lx, ly));
    }

    #[test]
    fn collapsed_contour_is_marked_dropout() {
        let speck = vec![Vec2::new(0.0, 0.0), Vec2::new(0.3, 0.2), Vec2::new(0.2, 0.4)];
        let ws = rasterise_contours(&[speck], 1.0, 1.0);
        let hits: Vec<EdgeFlags> = ws
            .data()
            .iter()
            .map(|b| EdgeFlags::from_bits_truncate(*b))
            .filter(|f| f.contains(EdgeFlags::DROPOUT))
            .collect();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains(EdgeFlags::INSIDE));
    }

    #[test]
    fn composite_glyph_is_not_rasterised() {
        let font = TrueTypeFont::parse(test_font::build()).expect("font");
        let glyph = font.read_glyph_index(3).expect("read").expect("glyph");
        assert!(rasterise(&glyph, 0.1, 0.1).is_empty());
    }
}
