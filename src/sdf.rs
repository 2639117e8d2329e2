//! Anti-aliased vector drawing by analytic signed distance.
//!
//! Every primitive supplies a distance function (negative inside, positive
//! outside, in pixels) and shares one scan loop. The loop skips ahead over
//! clearly-outside pixels, span-fills clearly-inside runs and shades only the
//! boundary band.

use crate::geometry::{Vec2, VecSegment2, contour_segments};
use crate::glyph::RenderableGlyph;
use crate::surface::{Color, DrawStats, PixelTarget};

/// Margin added around the geometry before clipping to the target.
const BOUNDS_MARGIN: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Even-odd.
    #[default]
    Alternate,
    /// Non-zero winding.
    Winding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Round,
    Flat,
}

/// Distance to a capsule around segment `a`-`b`, measured in the segment's
/// own frame.
pub fn capsule_distance(p: Vec2, a: Vec2, b: Vec2, half_thickness: f32) -> f32 {
    let axis = b - a;
    let len = axis.length();
    if len <= f32::EPSILON {
        return (p - a).length() - half_thickness;
    }
    let dir = axis * (1.0 / len);
    let local = local_frame(p - (a + b) * 0.5, dir);
    let along = (local.x.abs() - len * 0.5).max(0.0);
    Vec2::new(along, local.y).length() - half_thickness
}

/// Distance to the rectangle of width `thickness` whose centre line runs from
/// `a` to `b`, ends cut square.
pub fn oriented_box_distance(p: Vec2, a: Vec2, b: Vec2, thickness: f32) -> f32 {
    let axis = b - a;
    let len = axis.length();
    if len <= f32::EPSILON {
        return (p - a).length() - thickness * 0.5;
    }
    let dir = axis * (1.0 / len);
    let local = local_frame(p - (a + b) * 0.5, dir);
    let q = Vec2::new(local.x.abs() - len * 0.5, local.y.abs() - thickness * 0.5);
    let outside = Vec2::new(q.x.max(0.0), q.y.max(0.0)).length();
    outside + q.x.max(q.y).min(0.0)
}

fn local_frame(v: Vec2, dir: Vec2) -> Vec2 {
    Vec2::new(v.x * dir.x + v.y * dir.y, -v.x * dir.y + v.y * dir.x)
}

/// Distance to the hull of two circles, radius `ra` at `a` and `rb` at `b`.
pub fn uneven_capsule_distance(p: Vec2, a: Vec2, b: Vec2, ra: f32, rb: f32) -> f32 {
    let p = p - a;
    let pb = b - a;
    let h = pb.dot(pb);
    let dr = ra - rb;
    // One circle swallows the other, or the segment is degenerate.
    if h <= dr * dr || h <= f32::EPSILON {
        return (p.length() - ra).min((p - pb).length() - rb);
    }
    let q = Vec2::new(p.dot(Vec2::new(pb.y, -pb.x)).abs(), p.dot(pb)) * (1.0 / h);
    let c = Vec2::new((h - dr * dr).sqrt(), dr);
    let k = c.cross(q);
    let m = c.dot(q);
    let n = q.dot(q);
    if k < 0.0 {
        (h * n).sqrt() - ra
    } else if k > c.x {
        (h * (n + 1.0 - 2.0 * q.y)).sqrt() - rb
    } else {
        m - ra
    }
}

/// Signed distance to a set of closed contours under `mode`.
pub fn polygon_distance(p: Vec2, contours: &[&[Vec2]], mode: FillMode) -> f32 {
    let segments: Vec<VecSegment2> = contours
        .iter()
        .flat_map(|points| contour_segments(points))
        .collect();
    distance_to_edges(p, contours, &segments, mode)
}

/// `polygon_distance` with the crossing segments of `contours` prepared by
/// the caller, so a scan builds them once rather than per pixel.
fn distance_to_edges(
    p: Vec2,
    contours: &[&[Vec2]],
    segments: &[VecSegment2],
    mode: FillMode,
) -> f32 {
    let mut nearest = f32::MAX;
    for points in contours {
        let n = points.len();
        for i in 0..n {
            let v0 = points[i];
            let v1 = points[(i + 1) % n];
            let e = v1 - v0;
            let w = p - v0;
            let ee = e.dot(e);
            let t = if ee > 0.0 {
                (w.dot(e) / ee).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let d = w - e * t;
            nearest = nearest.min(d.dot(d));
        }
    }
    if nearest == f32::MAX {
        return f32::MAX;
    }
    let mut crossings = 0u32;
    let mut winding = 0i32;
    for seg in segments {
        if seg.spans(p.y) && p.x < seg.x_at(p.y) {
            crossings += 1;
            winding += seg.winding();
        }
    }
    let inside = match mode {
        FillMode::Alternate => crossings % 2 == 1,
        FillMode::Winding => winding != 0,
    };
    let d = nearest.sqrt();
    if inside { -d } else { d }
}

/// Integer scan rectangle (inclusive-exclusive) covering `[min, max]` plus a
/// margin, clipped to the target. `None` when nothing is visible.
fn scan_rect(
    target: &dyn PixelTarget,
    min: Vec2,
    max: Vec2,
    margin: f32,
) -> Option<(i32, i32, i32, i32)> {
    if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
        return None;
    }
    let x0 = ((min.x - margin).floor() as i32).max(0);
    let y0 = ((min.y - margin).floor() as i32).max(0);
    let x1 = ((max.x + margin).ceil() as i32).min(target.width() as i32);
    let y1 = ((max.y + margin).ceil() as i32).min(target.height() as i32);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Shared scan loop: samples pixel centres and composites by distance.
fn render_distance(
    target: &mut dyn PixelTarget,
    rect: (i32, i32, i32, i32),
    color: Color,
    distance: impl Fn(Vec2) -> f32,
) -> DrawStats {
    let (x0, y0, x1, y1) = rect;
    let mut stats = DrawStats::default();
    for y in y0..y1 {
        let cy = y as f32 + 0.5;
        let mut x = x0;
        while x < x1 {
            let d = distance(Vec2::new(x as f32 + 0.5, cy));
            if d >= 1.0 {
                x += ((d - 1.0).floor() as i32).clamp(1, x1 - x);
            } else if d <= -2.0 {
                let run = ((-d).floor() as i32).min(x1 - x).max(1);
                if color.a == 255 {
                    let written = target.set_span(x, y, run as u32, color);
                    stats.written += written;
                    stats.discarded += run as u32 - written;
                } else {
                    for px in x..x + run {
                        stats.record(target.blend_pixel(px, y, color, 255));
                    }
                }
                x += run;
            } else {
                let alpha = ((1.0 - d) * 255.0).clamp(0.0, 255.0) as u8;
                if alpha > 0 {
                    stats.record(target.blend_pixel(x, y, color, alpha));
                }
                x += 1;
            }
        }
    }
    stats
}

pub fn draw_line(
    target: &mut dyn PixelTarget,
    thickness: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    color: Color,
) -> DrawStats {
    draw_line_with_cap(target, thickness, x1, y1, x2, y2, color, LineCap::Round)
}

#[allow(clippy::too_many_arguments)]
pub fn draw_line_with_cap(
    target: &mut dyn PixelTarget,
    thickness: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    color: Color,
    cap: LineCap,
) -> DrawStats {
    let a = Vec2::new(x1, y1);
    let b = Vec2::new(x2, y2);
    let half = thickness.max(0.0) * 0.5;
    let min = Vec2::new(x1.min(x2), y1.min(y2));
    let max = Vec2::new(x1.max(x2), y1.max(y2));
    let Some(rect) = scan_rect(target, min, max, half + BOUNDS_MARGIN) else {
        return DrawStats::default();
    };
    match cap {
        LineCap::Round => {
            render_distance(target, rect, color, |p| capsule_distance(p, a, b, half))
        }
        LineCap::Flat => render_distance(target, rect, color, |p| {
            oriented_box_distance(p, a, b, thickness)
        }),
    }
}

/// Draws a stroke through `points` whose radius varies per point, as a
/// union of uneven capsules. A single point draws a dot.
pub fn draw_pressure_curve(
    target: &mut dyn PixelTarget,
    points: &[Vec2],
    radii: &[f32],
    color: Color,
) -> DrawStats {
    let n = points.len().min(radii.len());
    if n == 0 {
        return DrawStats::default();
    }
    let points = &points[..n];
    let radii: Vec<f32> = radii[..n].iter().map(|r| r.max(0.0)).collect();
    let reach = radii.iter().copied().fold(0.0f32, f32::max);
    let mut min = Vec2::new(f32::MAX, f32::MAX);
    let mut max = Vec2::new(f32::MIN, f32::MIN);
    for p in points {
        min = Vec2::new(min.x.min(p.x), min.y.min(p.y));
        max = Vec2::new(max.x.max(p.x), max.y.max(p.y));
    }
    let Some(rect) = scan_rect(target, min, max, reach + BOUNDS_MARGIN) else {
        return DrawStats::default();
    };
    render_distance(target, rect, color, |p| {
        if n == 1 {
            return (p - points[0]).length() - radii[0];
        }
        let mut best = f32::MAX;
        for i in 0..n - 1 {
            let d = uneven_capsule_distance(p, points[i], points[i + 1], radii[i], radii[i + 1]);
            best = best.min(d);
        }
        best
    })
}

pub fn fill_polygon(
    target: &mut dyn PixelTarget,
    points: &[Vec2],
    color: Color,
    mode: FillMode,
) -> DrawStats {
    fill_contours(target, &[points], color, mode)
}

/// Fills transformed glyph contours; holes follow the winding rule.
pub fn fill_renderable(
    target: &mut dyn PixelTarget,
    glyph: &RenderableGlyph,
    color: Color,
    mode: FillMode,
) -> DrawStats {
    let contours: Vec<&[Vec2]> = glyph.contours.iter().map(|c| c.points.as_slice()).collect();
    fill_contours(target, &contours, color, mode)
}

fn fill_contours(
    target: &mut dyn PixelTarget,
    contours: &[&[Vec2]],
    color: Color,
    mode: FillMode,
) -> DrawStats {
    let mut min = Vec2::new(f32::MAX, f32::MAX);
    let mut max = Vec2::new(f32::MIN, f32::MIN);
    let mut any = false;
    for p in contours.iter().flat_map(|c| c.iter()) {
        any = true;
        min = Vec2::new(min.x.min(p.x), min.y.min(p.y));
        max = Vec2::new(max.x.max(p.x), max.y.max(p.y));
    }
    if !any {
        return DrawStats::default();
    }
    let Some(rect) = scan_rect(target, min, max, BOUNDS_MARGIN) else {
        return DrawStats::default();
    };
    let segments: Vec<VecSegment2> = contours
        .iter()
        .flat_map(|points| contour_segments(points))
        .collect();
    render_distance(target, rect, color, |p| {
        distance_to_edges(p, contours, &segments, mode)
    })
}

/// Solid axis-aligned rectangle, written a span per row.
pub fn fill_rect(
    target: &mut dyn PixelTarget,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Color,
) -> DrawStats {
    let top = (y as i64).max(0);
    let bottom = (y as i64 + height as i64).min(target.height() as i64);
    let mut written = 0u64;
    for row in top..bottom {
        written += target.set_span(x, row as i32, width, color) as u64;
    }
    let total = width as u64 * height as u64;
    DrawStats {
        written: written as u32,
        discarded: (total - written).min(u32::MAX as u64) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn canvas(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        PixelTarget::fill(&mut img, Color::WHITE);
        img
    }

    fn dark(img: &RgbaImage, x: i32, y: i32) -> bool {
        PixelTarget::get_pixel(img, x, y).is_some_and(|p| p.r < 100)
    }

    #[test]
    fn capsule_distance_is_signed() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!((capsule_distance(Vec2::new(5.0, 0.0), a, b, 2.0) + 2.0).abs() < 1e-5);
        assert!((capsule_distance(Vec2::new(5.0, 5.0), a, b, 2.0) - 3.0).abs() < 1e-5);
        assert!((capsule_distance(Vec2::new(13.0, 0.0), a, b, 2.0) - 1.0).abs() < 1e-5);
        assert!((oriented_box_distance(Vec2::new(13.0, 0.0), a, b, 4.0) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn uneven_capsule_matches_end_circles() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(20.0, 0.0);
        let left = uneven_capsule_distance(Vec2::new(-8.0, 0.0), a, b, 5.0, 1.0);
        assert!((left - 3.0).abs() < 1e-3, "{left}");
        let right = uneven_capsule_distance(Vec2::new(24.0, 0.0), a, b, 5.0, 1.0);
        assert!((right - 3.0).abs() < 1e-3, "{right}");
        assert!(uneven_capsule_distance(Vec2::new(10.0, 0.0), a, b, 5.0, 1.0) < 0.0);
    }

    #[test]
    fn horizontal_line_band_matches_thickness() {
        let mut img = canvas(60, 30);
        let thickness = 4.0;
        draw_line(&mut img, thickness, 10.0, 15.0, 50.0, 15.0, Color::BLACK);
        for x in 15..45 {
            let rows = (0..30).filter(|y| dark(&img, x, *y)).count() as f32;
            assert!(
                (rows - thickness).abs() <= 1.0,
                "column {x}: band of {rows} rows"
            );
        }
    }

    #[test]
    fn flat_cap_stops_at_endpoints() {
        let mut img = canvas(60, 30);
        draw_line_with_cap(&mut img, 4.0, 10.0, 15.0, 50.0, 15.0, Color::BLACK, LineCap::Flat);
        assert!(dark(&img, 20, 15));
        assert!(!dark(&img, 7, 15));
        let mut round = canvas(60, 30);
        draw_line(&mut round, 4.0, 10.0, 15.0, 50.0, 15.0, Color::BLACK);
        assert!(dark(&round, 8, 15));
    }

    #[test]
    fn self_overlapping_star_differs_between_fill_modes() {
        // Pentagram: the central pentagon is wound twice.
        let center = Vec2::new(50.0, 50.0);
        let star: Vec<Vec2> = (0..5)
            .map(|k| {
                let angle = (-90.0f32 + k as f32 * 144.0).to_radians();
                center + Vec2::new(angle.cos(), angle.sin()) * 40.0
            })
            .collect();
        let mut alternate = canvas(100, 100);
        fill_polygon(&mut alternate, &star, Color::BLACK, FillMode::Alternate);
        let mut winding = canvas(100, 100);
        fill_polygon(&mut winding, &star, Color::BLACK, FillMode::Winding);

        assert!(!dark(&alternate, 50, 50));
        assert!(dark(&winding, 50, 50));
        // The points of the star are wound once and fill either way.
        assert!(dark(&alternate, 50, 16));
        assert!(dark(&winding, 50, 16));
        assert_ne!(alternate, winding);
    }

    #[test]
    fn inner_contour_orientation_decides_the_hole() {
        let outer = [
            Vec2::new(10.0, 10.0),
            Vec2::new(50.0, 10.0),
            Vec2::new(50.0, 50.0),
            Vec2::new(10.0, 50.0),
        ];
        let same = [
            Vec2::new(20.0, 20.0),
            Vec2::new(40.0, 20.0),
            Vec2::new(40.0, 40.0),
            Vec2::new(20.0, 40.0),
        ];
        let mut opposite = same;
        opposite.reverse();

        let fill = |inner: &[Vec2], mode| {
            let mut img = canvas(60, 60);
            fill_contours(&mut img, &[&outer[..], inner], Color::BLACK, mode);
            img
        };
        for mode in [FillMode::Alternate, FillMode::Winding] {
            let img = fill(&opposite, mode);
            assert!(dark(&img, 15, 30), "{mode:?}");
            assert!(!dark(&img, 30, 30), "{mode:?}");
        }
        assert!(!dark(&fill(&same, FillMode::Alternate), 30, 30));
        assert!(dark(&fill(&same, FillMode::Winding), 30, 30));

        // The scan agrees with the standalone distance on both sides of the hole.
        let contours: [&[Vec2]; 2] = [&outer, &same];
        assert!(polygon_distance(Vec2::new(15.0, 30.0), &contours, FillMode::Alternate) < 0.0);
        assert!(polygon_distance(Vec2::new(30.0, 30.0), &contours, FillMode::Alternate) > 0.0);
        assert!(polygon_distance(Vec2::new(30.0, 30.0), &contours, FillMode::Winding) < 0.0);
    }

    #[test]
    fn square_fill_is_opaque_inside_and_soft_at_edge() {
        let mut img = canvas(40, 40);
        let square = [
            Vec2::new(10.0, 10.0),
            Vec2::new(30.0, 10.0),
            Vec2::new(30.0, 30.0),
            Vec2::new(10.0, 30.0),
        ];
        let stats = fill_polygon(&mut img, &square, Color::BLACK, FillMode::Winding);
        assert!(stats.written >= 400);
        assert_eq!(stats.discarded, 0);
        assert_eq!(PixelTarget::get_pixel(&img, 20, 20), Some(Color::BLACK));
        assert_eq!(PixelTarget::get_pixel(&img, 5, 5), Some(Color::WHITE));
        let edge = PixelTarget::get_pixel(&img, 30, 20).expect("pixel");
        assert!(edge.r > 0 && edge.r < 255, "{edge:?}");
    }

    #[test]
    fn pressure_curve_tapers() {
        let mut img = canvas(80, 40);
        let points = [Vec2::new(10.0, 20.0), Vec2::new(70.0, 20.0)];
        draw_pressure_curve(&mut img, &points, &[8.0, 1.0], Color::BLACK);
        let thick = (0..40).filter(|y| dark(&img, 15, *y)).count();
        let thin = (0..40).filter(|y| dark(&img, 65, *y)).count();
        assert!(thick > thin, "thick {thick} thin {thin}");
        assert!(thin >= 1);
    }

    #[test]
    fn fill_rect_clips_and_counts() {
        let mut img = canvas(10, 10);
        let stats = fill_rect(&mut img, 8, 8, 4, 4, Color::BLACK);
        assert_eq!(stats.written, 4);
        assert_eq!(stats.discarded, 12);

        let tall = fill_rect(&mut img, 0, i32::MIN, 2, u32::MAX, Color::BLACK);
        assert_eq!(tall.written, 20);
        assert_eq!(tall.discarded, u32::MAX);
    }
}
