use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3-D cross product.
    pub fn cross(self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        self + (other - self) * t
    }

    pub fn midpoint(self, other: Vec2) -> Vec2 {
        self.lerp(other, 0.5)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Integer pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<Point> for Vec2 {
    fn from(p: Point) -> Self {
        Vec2::new(p.x as f32, p.y as f32)
    }
}

/// Nearest sample; components beyond the `i32` range saturate.
impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Point::new(v.x.round() as i32, v.y.round() as i32)
    }
}

/// Directed edge annotated with its winding direction.
///
/// `a` is always the upper end (smaller y) so scanline code can walk from
/// `a.y` to `b.y`; `clockwise` records whether the original direction was
/// downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VecSegment2 {
    pub a: Vec2,
    pub b: Vec2,
    pub clockwise: bool,
}

impl VecSegment2 {
    /// Builds a segment, returning `None` for horizontal edges, which never
    /// contribute to winding.
    pub fn new(from: Vec2, to: Vec2) -> Option<Self> {
        if from.y == to.y {
            return None;
        }
        if from.y < to.y {
            Some(Self {
                a: from,
                b: to,
                clockwise: true,
            })
        } else {
            Some(Self {
                a: to,
                b: from,
                clockwise: false,
            })
        }
    }

    pub fn min_y(&self) -> f32 {
        self.a.y
    }

    pub fn max_y(&self) -> f32 {
        self.b.y
    }

    /// Winding contribution: +1 for downward edges, -1 for upward ones.
    pub fn winding(&self) -> i32 {
        if self.clockwise { 1 } else { -1 }
    }

    /// X coordinate where the segment crosses the horizontal line `y`.
    pub fn x_at(&self, y: f32) -> f32 {
        let t = (y - self.a.y) / (self.b.y - self.a.y);
        self.a.x + (self.b.x - self.a.x) * t
    }

    /// Half-open vertical extent test, so shared vertices count once.
    pub fn spans(&self, y: f32) -> bool {
        y >= self.a.y && y < self.b.y
    }
}

/// Splits a closed polyline into its non-horizontal edges.
pub fn contour_segments(points: &[Vec2]) -> Vec<VecSegment2> {
    let mut out = Vec::with_capacity(points.len());
    for (idx, from) in points.iter().enumerate() {
        let to = points[(idx + 1) % points.len()];
        if let Some(seg) = VecSegment2::new(*from, to) {
            out.push(seg);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_segments_are_dropped() {
        assert!(VecSegment2::new(Vec2::new(0.0, 1.0), Vec2::new(5.0, 1.0)).is_none());
        let up = VecSegment2::new(Vec2::new(0.0, 4.0), Vec2::new(2.0, 0.0)).unwrap();
        assert!(!up.clockwise);
        assert_eq!(up.min_y(), 0.0);
        assert_eq!(up.winding(), -1);
        assert!((up.x_at(2.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn square_has_two_vertical_edges() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        let segs = contour_segments(&square);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs.iter().map(|s| s.winding()).sum::<i32>(), 0);
    }

    #[test]
    fn points_convert_to_the_nearest_sample() {
        let p = Point::new(-7, 12);
        assert_eq!(Point::from(Vec2::from(p)), p);
        assert_eq!(Point::from(Vec2::new(2.6, -0.4)), Point::new(3, 0));
    }
}
