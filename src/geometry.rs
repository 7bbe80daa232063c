//! Points and axis-aligned rectangles in scene units.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_min_max(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x: x_min,
            y: y_min,
            width: x_max - x_min,
            height: y_max - y_min,
        }
    }

    pub fn x_max(&self) -> f32 {
        self.x + self.width
    }

    pub fn y_max(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Half-open containment: the left and top edges are inside, the right and
    /// bottom edges are not.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x_max() && y >= self.y && y < self.y_max()
    }

    /// Overlap test that treats touching edges as overlapping.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x.max(other.x) <= self.x_max().min(other.x_max())
            && self.y.max(other.y) <= self.y_max().min(other.y_max())
    }

    /// Intersection of two rects, or `Rect::ZERO` when they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x_min = self.x.max(other.x);
        let y_min = self.y.max(other.y);
        let x_max = self.x_max().min(other.x_max());
        let y_max = self.y_max().min(other.y_max());
        if x_min > x_max || y_min > y_max {
            return Rect::ZERO;
        }
        Rect::from_min_max(x_min, y_min, x_max, y_max)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_min_max(
            self.x.min(other.x),
            self.y.min(other.y),
            self.x_max().max(other.x_max()),
            self.y_max().max(other.y_max()),
        )
    }

    /// Smallest rect containing all of the given points.
    pub fn bounding(points: &[Point]) -> Rect {
        let mut x_min = f32::MAX;
        let mut y_min = f32::MAX;
        let mut x_max = f32::MIN;
        let mut y_max = f32::MIN;
        for p in points {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }
        if points.is_empty() {
            return Rect::ZERO;
        }
        Rect::from_min_max(x_min, y_min, x_max, y_max)
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x_max(), self.y),
            Point::new(self.x_max(), self.y_max()),
            Point::new(self.x, self.y_max()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_of_overlapping_rects() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        assert_eq!(a.intersection(&b), Rect::new(50.0, 50.0, 50.0, 50.0));
    }

    #[test]
    fn test_intersection_of_disjoint_rects_is_zero() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.intersection(&b), Rect::ZERO);
    }

    #[test]
    fn test_overlaps_includes_touching_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        let c = Rect::new(10.5, 0.0, 10.0, 10.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(r.contains(0.0, 0.0));
        assert!(r.contains(75.0, 75.0));
        assert!(!r.contains(100.0, 50.0));
        assert!(!r.contains(200.0, 200.0));
    }

    #[test]
    fn test_union_and_bounding() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, -5.0, 5.0, 5.0);
        assert_eq!(a.union(&b), Rect::from_min_max(0.0, -5.0, 25.0, 10.0));
        assert_eq!(Rect::bounding(&a.corners()), a);
        assert_eq!(Rect::bounding(&[]), Rect::ZERO);
    }
}
