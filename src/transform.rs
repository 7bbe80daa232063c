use crate::geometry::{Point, Rect};

/// A 2D affine transformation stored as the top two rows of a 3x3 matrix,
/// row-major: `[a, b, tx, c, d, ty]`.
///
/// Maps `(x, y)` to `(a*x + b*y + tx, c*x + d*y + ty)`. Node transforms
/// compose parent→child the same way world transforms are built during
/// traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub data: [f32; 6],
}

impl Transform {
    /// Identity matrix (no transformation)
    pub const IDENTITY: Self = Self {
        data: [
            1.0, 0.0, 0.0, // row 0
            0.0, 1.0, 0.0, // row 1
        ],
    };

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            data: [
                1.0, 0.0, x, // row 0
                0.0, 1.0, y, // row 1
            ],
        }
    }

    /// Rotation around the origin. Positive angles turn +x towards +y.
    pub fn rotate(angle_radians: f32) -> Self {
        let cos = angle_radians.cos();
        let sin = angle_radians.sin();
        Self {
            data: [
                cos, -sin, 0.0, // row 0
                sin, cos, 0.0, // row 1
            ],
        }
    }

    pub fn rotate_degrees(angle_degrees: f32) -> Self {
        Self::rotate(angle_degrees.to_radians())
    }

    pub fn scale_xy(sx: f32, sy: f32) -> Self {
        Self {
            data: [
                sx, 0.0, 0.0, // row 0
                0.0, sy, 0.0, // row 1
            ],
        }
    }

    /// Shear by the given angles in degrees: `skew_x` leans vertical lines,
    /// `skew_y` leans horizontal lines.
    pub fn skew_degrees(skew_x: f32, skew_y: f32) -> Self {
        Self {
            data: [
                1.0,
                skew_x.to_radians().tan(),
                0.0,
                skew_y.to_radians().tan(),
                1.0,
                0.0,
            ],
        }
    }

    /// Compose this transform with another: self * other
    /// Applies `other` first, then `self`.
    pub fn then(&self, other: &Transform) -> Transform {
        let [a0, b0, tx0, c0, d0, ty0] = self.data;
        let [a1, b1, tx1, c1, d1, ty1] = other.data;
        Transform {
            data: [
                a0 * a1 + b0 * c1,
                a0 * b1 + b0 * d1,
                a0 * tx1 + b0 * ty1 + tx0,
                c0 * a1 + d0 * c1,
                c0 * b1 + d0 * d1,
                c0 * tx1 + d0 * ty1 + ty0,
            ],
        }
    }

    pub fn determinant(&self) -> f32 {
        self.data[0] * self.data[4] - self.data[1] * self.data[3]
    }

    /// Inverse transform, or `None` when the matrix is degenerate (a zero
    /// scale on either axis).
    pub fn try_inverse(&self) -> Option<Transform> {
        let [a, b, tx, c, d, ty] = self.data;
        let det = self.determinant();
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Transform {
            data: [
                d * inv_det,
                -b * inv_det,
                (-d * tx + b * ty) * inv_det,
                -c * inv_det,
                a * inv_det,
                (c * tx - a * ty) * inv_det,
            ],
        })
    }

    /// Inverse transform, falling back to identity for degenerate matrices.
    pub fn inverse(&self) -> Transform {
        self.try_inverse().unwrap_or(Self::IDENTITY)
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let new_x = self.data[0] * x + self.data[1] * y + self.data[2];
        let new_y = self.data[3] * x + self.data[4] * y + self.data[5];
        (new_x, new_y)
    }

    pub fn map_point(&self, p: Point) -> Point {
        let (x, y) = self.transform_point(p.x, p.y);
        Point::new(x, y)
    }

    /// Axis-aligned bounds of the four transformed corners of `rect`.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|p| self.map_point(p));
        Rect::bounding(&corners)
    }

    /// True when the transform has no rotation or skew component.
    pub fn is_axis_aligned(&self) -> bool {
        self.data[1] == 0.0 && self.data[3] == 0.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identity() {
        let t = Transform::identity();
        assert_eq!(t, Transform::IDENTITY);
        assert!(t.is_identity());
    }

    #[test]
    fn test_translate() {
        let t = Transform::translate(10.0, 20.0);
        let (x, y) = t.transform_point(5.0, 5.0);
        assert!(approx_eq(x, 15.0));
        assert!(approx_eq(y, 25.0));
    }

    #[test]
    fn test_rotate() {
        let t = Transform::rotate_degrees(90.0);
        let (x, y) = t.transform_point(1.0, 0.0);
        assert!(approx_eq(x, 0.0));
        assert!(approx_eq(y, 1.0));
    }

    #[test]
    fn test_skew() {
        let t = Transform::skew_degrees(45.0, 0.0);
        let (x, y) = t.transform_point(0.0, 2.0);
        assert!(approx_eq(x, 2.0));
        assert!(approx_eq(y, 2.0));
    }

    #[test]
    fn test_compose() {
        // Point (0,0) -> translate -> (10,0) -> scale -> (20,0)
        let composed = Transform::scale_xy(2.0, 2.0).then(&Transform::translate(10.0, 0.0));
        let (x, y) = composed.transform_point(0.0, 0.0);
        assert!(approx_eq(x, 20.0));
        assert!(approx_eq(y, 0.0));
    }

    #[test]
    fn test_inverse_round_trips() {
        let t = Transform::translate(10.0, 20.0)
            .then(&Transform::rotate_degrees(30.0))
            .then(&Transform::scale_xy(2.0, 0.5));
        let composed = t.then(&t.inverse());
        let (x, y) = composed.transform_point(3.0, 4.0);
        assert!(approx_eq(x, 3.0));
        assert!(approx_eq(y, 4.0));
    }

    #[test]
    fn test_zero_scale_has_no_inverse() {
        let t = Transform::scale_xy(0.0, 1.0);
        assert!(t.try_inverse().is_none());
        assert!(t.inverse().is_identity());
    }

    #[test]
    fn test_map_rect_rotated() {
        let t = Transform::rotate_degrees(90.0);
        let r = t.map_rect(&Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!(approx_eq(r.x, -20.0));
        assert!(approx_eq(r.y, 0.0));
        assert!(approx_eq(r.width, 20.0));
        assert!(approx_eq(r.height, 10.0));
    }
}
