use crate::error::RasterError;
use crate::geometry::{Point, Vec2};

/// Which side of the existing transform a new matrix is composed on.
///
/// `Prepend` applies the new matrix *before* the existing one,
/// `Append` applies it *after*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixOrder {
    #[default]
    Prepend,
    Append,
}

/// 2-D affine transform in row-vector form:
/// `[x' y'] = [x y 1] * [[m11 m12] [m21 m22] [dx dy]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub m11: f32,
    pub m12: f32,
    pub m21: f32,
    pub m22: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn new(m11: f32, m12: f32, m21: f32, m22: f32, dx: f32, dy: f32) -> Self {
        Self {
            m11,
            m12,
            m21,
            m22,
            dx,
            dy,
        }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotation(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn shearing(shear_x: f32, shear_y: f32) -> Self {
        Self::new(1.0, shear_y, shear_x, 1.0, 0.0, 0.0)
    }

    pub fn elements(&self) -> [f32; 6] {
        [self.m11, self.m12, self.m21, self.m22, self.dx, self.dy]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn determinant(&self) -> f32 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det != 0.0 && det.is_finite()
    }

    /// `self * rhs`: apply `self` first, then `rhs`.
    pub fn then(self, rhs: Matrix) -> Matrix {
        Matrix {
            m11: self.m11 * rhs.m11 + self.m12 * rhs.m21,
            m12: self.m11 * rhs.m12 + self.m12 * rhs.m22,
            m21: self.m21 * rhs.m11 + self.m22 * rhs.m21,
            m22: self.m21 * rhs.m12 + self.m22 * rhs.m22,
            dx: self.dx * rhs.m11 + self.dy * rhs.m21 + rhs.dx,
            dy: self.dx * rhs.m12 + self.dy * rhs.m22 + rhs.dy,
        }
    }

    pub fn multiply(&mut self, other: &Matrix, order: MatrixOrder) {
        *self = match order {
            MatrixOrder::Prepend => other.then(*self),
            MatrixOrder::Append => self.then(*other),
        };
    }

    pub fn translate(&mut self, dx: f32, dy: f32, order: MatrixOrder) {
        self.multiply(&Self::translation(dx, dy), order);
    }

    pub fn scale(&mut self, sx: f32, sy: f32, order: MatrixOrder) {
        self.multiply(&Self::scaling(sx, sy), order);
    }

    pub fn rotate(&mut self, degrees: f32, order: MatrixOrder) {
        self.multiply(&Self::rotation(degrees), order);
    }

    /// Rotation about `center` rather than the origin.
    pub fn rotate_at(&mut self, degrees: f32, center: Vec2, order: MatrixOrder) {
        let about = Self::translation(-center.x, -center.y)
            .then(Self::rotation(degrees))
            .then(Self::translation(center.x, center.y));
        self.multiply(&about, order);
    }

    pub fn shear(&mut self, shear_x: f32, shear_y: f32, order: MatrixOrder) {
        self.multiply(&Self::shearing(shear_x, shear_y), order);
    }

    pub fn inverted(&self) -> Option<Matrix> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        Some(Matrix {
            m11: self.m22 / det,
            m12: -self.m12 / det,
            m21: -self.m21 / det,
            m22: self.m11 / det,
            dx: (self.m21 * self.dy - self.m22 * self.dx) / det,
            dy: (self.m12 * self.dx - self.m11 * self.dy) / det,
        })
    }

    /// Inverts in place. A singular matrix is left untouched and reported.
    pub fn invert(&mut self) -> Result<(), RasterError> {
        let inverse = self.inverted().ok_or(RasterError::NonInvertibleMatrix)?;
        *self = inverse;
        Ok(())
    }

    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x * self.m11 + p.y * self.m21 + self.dx,
            p.x * self.m12 + p.y * self.m22 + self.dy,
        )
    }

    pub fn transform_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            v.x * self.m11 + v.y * self.m21,
            v.x * self.m12 + v.y * self.m22,
        )
    }

    pub fn transform_points(&self, points: &mut [Vec2]) {
        for p in points.iter_mut() {
            *p = self.transform_point(*p);
        }
    }

    /// Integer points are rounded to the nearest pixel after transforming.
    pub fn transform_int_points(&self, points: &mut [Point]) {
        for p in points.iter_mut() {
            let out = self.transform_point(Vec2::new(p.x as f32, p.y as f32));
            *p = Point::new(out.x.round() as i32, out.y.round() as i32);
        }
    }

    pub fn transform_vectors(&self, vectors: &mut [Vec2]) {
        for v in vectors.iter_mut() {
            *v = self.transform_vector(*v);
        }
    }

    pub fn transform_int_vectors(&self, vectors: &mut [Point]) {
        for v in vectors.iter_mut() {
            let out = self.transform_vector(Vec2::new(v.x as f32, v.y as f32));
            *v = Point::new(out.x.round() as i32, out.y.round() as i32);
        }
    }

    /// Length of the transformed unit x and y axes.
    pub fn axis_scales(&self) -> (f32, f32) {
        (
            (self.m11 * self.m11 + self.m12 * self.m12).sqrt(),
            (self.m21 * self.m21 + self.m22 * self.m22).sqrt(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    fn samples() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(-3.5, 7.25),
            Vec2::new(100.0, -40.0),
        ]
    }

    #[test]
    fn transform_then_inverse_round_trips() {
        let mut m = Matrix::identity();
        m.rotate(33.0, MatrixOrder::Append);
        m.scale(2.0, 0.5, MatrixOrder::Append);
        m.shear(0.3, -0.1, MatrixOrder::Prepend);
        m.translate(12.0, -7.0, MatrixOrder::Append);
        assert!(m.is_invertible());

        let original = samples();
        let mut points = original.clone();
        m.transform_points(&mut points);
        let mut inverse = m;
        inverse.invert().unwrap();
        inverse.transform_points(&mut points);
        for (a, b) in original.iter().zip(points.iter()) {
            assert!(close(*a, *b), "{a:?} != {b:?}");
        }
    }

    #[test]
    fn prepend_applies_new_matrix_first() {
        let a = Matrix::translation(10.0, 0.0);
        let b = Matrix::scaling(2.0, 2.0);
        let p = Vec2::new(1.0, 1.0);

        let mut prepended = a;
        prepended.multiply(&b, MatrixOrder::Prepend);
        let expected = a.transform_point(b.transform_point(p));
        assert!(close(prepended.transform_point(p), expected));
        assert!(close(expected, Vec2::new(12.0, 2.0)));

        let mut appended = a;
        appended.multiply(&b, MatrixOrder::Append);
        let expected = b.transform_point(a.transform_point(p));
        assert!(close(appended.transform_point(p), expected));
        assert!(close(expected, Vec2::new(22.0, 2.0)));
    }

    #[test]
    fn rotate_at_keeps_center_fixed() {
        let center = Vec2::new(5.0, 5.0);
        let mut m = Matrix::identity();
        m.rotate_at(90.0, center, MatrixOrder::Append);
        assert!(close(m.transform_point(center), center));
        assert!(close(m.transform_point(Vec2::new(6.0, 5.0)), Vec2::new(5.0, 6.0)));
    }

    #[test]
    fn singular_matrix_is_left_unchanged() {
        let mut m = Matrix::new(1.0, 2.0, 2.0, 4.0, 3.0, 3.0);
        assert!(!m.is_invertible());
        let before = m;
        assert!(matches!(m.invert(), Err(RasterError::NonInvertibleMatrix)));
        assert_eq!(m, before);
        assert!(m.inverted().is_none());
    }

    #[test]
    fn vectors_ignore_translation() {
        let m = Matrix::new(2.0, 0.0, 0.0, 3.0, 50.0, 60.0);
        let mut v = [Vec2::new(1.0, 1.0)];
        m.transform_vectors(&mut v);
        assert!(close(v[0], Vec2::new(2.0, 3.0)));

        let mut p = [Point::new(1, 1)];
        m.transform_int_points(&mut p);
        assert_eq!(p[0], Point::new(52, 63));
        let mut iv = [Point::new(1, 1)];
        m.transform_int_vectors(&mut iv);
        assert_eq!(iv[0], Point::new(2, 3));
    }
}
