use crate::geometry::{Point, Rect};

/// Normalized pivot point for a node's rotation, scale and skew.
///
/// `(0, 0)` is the top-left corner of the content rect and `(1, 1)` the
/// bottom-right. Moving the pivot does not move the node: the position
/// always names where the untransformed top-left corner sits in the parent.
///
/// # Example
/// ```ignore
/// // Rotate around the center
/// tree.set_pivot(node, Pivot::CENTER)?;
/// tree.set_rotation(node, 45.0)?;
///
/// // 25% from left, 75% from top
/// tree.set_pivot(node, Pivot::new(0.25, 0.75))?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub x: f32,
    pub y: f32,
}

impl Pivot {
    /// Top-left corner (0, 0) - the default
    pub const TOP_LEFT: Self = Self { x: 0.0, y: 0.0 };

    pub const TOP: Self = Self { x: 0.5, y: 0.0 };

    pub const TOP_RIGHT: Self = Self { x: 1.0, y: 0.0 };

    /// Center of the node (0.5, 0.5)
    pub const CENTER: Self = Self { x: 0.5, y: 0.5 };

    pub const BOTTOM_LEFT: Self = Self { x: 0.0, y: 1.0 };

    pub const BOTTOM: Self = Self { x: 0.5, y: 1.0 };

    pub const BOTTOM_RIGHT: Self = Self { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Resolve the pivot to an offset in local units within `content`.
    pub fn resolve(&self, content: Rect) -> Point {
        Point::new(
            content.x + content.width * self.x,
            content.y + content.height * self.y,
        )
    }

    pub fn is_top_left(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Default for Pivot {
    fn default() -> Self {
        Self::TOP_LEFT
    }
}
