//! Transforms and bounds queries.

use crate::error::{Result, SceneError};
use crate::geometry::{Point, Rect};
use crate::node::Node;
use crate::transform::Transform;
use crate::tree::{NodeId, SceneTree};

impl Node {
    /// Matrix from this node's space into its parent's space.
    ///
    /// Rotation, skew and scale apply around the pivot; `position` is where
    /// the untransformed origin lands.
    pub fn local_transform(&self) -> Transform {
        let p = self.pivot_offset;
        if !self.has_rotation_or_skew() {
            return Transform {
                data: [
                    self.scale_x,
                    0.0,
                    self.position.x + p.x - self.scale_x * p.x,
                    0.0,
                    self.scale_y,
                    self.position.y + p.y - self.scale_y * p.y,
                ],
            };
        }
        Transform::translate(self.position.x + p.x, self.position.y + p.y)
            .then(&Transform::rotate_degrees(self.rotation))
            .then(&Transform::skew_degrees(self.skew_x, self.skew_y))
            .then(&Transform::scale_xy(self.scale_x, self.scale_y))
            .then(&Transform::translate(-p.x, -p.y))
    }
}

impl SceneTree {
    pub fn local_transform(&self, id: NodeId) -> Result<Transform> {
        Ok(self.get(id)?.local_transform())
    }

    /// Matrix from `id`'s space into world (stage) space.
    pub fn world_transform(&self, id: NodeId) -> Result<Transform> {
        let mut world = self.get(id)?.local_transform();
        let mut current = self.get(id)?.parent;
        while let Some(p) = current {
            let node = self.get(p)?;
            world = node.local_transform().then(&world);
            current = node.parent;
        }
        Ok(world)
    }

    /// Matrix from `id`'s space into `target`'s space (world when `None`).
    pub fn transform_to(&self, id: NodeId, target: Option<NodeId>) -> Result<Transform> {
        let target = match target {
            None => return self.world_transform(id),
            Some(t) if t == id => {
                self.get(id)?;
                return Ok(Transform::IDENTITY);
            }
            Some(t) => t,
        };

        // Walk up towards the target first; most queries are ancestor-relative.
        let mut relative = self.get(id)?.local_transform();
        let mut current = self.get(id)?.parent;
        while let Some(p) = current {
            if p == target {
                return Ok(relative);
            }
            let node = self.get(p)?;
            relative = node.local_transform().then(&relative);
            current = node.parent;
        }

        let inverse = self
            .world_transform(target)?
            .try_inverse()
            .ok_or(SceneError::InvalidOperation("target space has zero scale"))?;
        Ok(inverse.then(&relative))
    }

    pub fn transform_point(
        &self,
        id: NodeId,
        point: Point,
        target: Option<NodeId>,
    ) -> Result<Point> {
        Ok(self.transform_to(id, target)?.map_point(point))
    }

    pub fn transform_rect(&self, id: NodeId, rect: Rect, target: Option<NodeId>) -> Result<Rect> {
        if target == Some(id) {
            self.get(id)?;
            return Ok(rect);
        }
        Ok(self.transform_to(id, target)?.map_rect(&rect))
    }

    pub fn local_to_world(&self, id: NodeId, point: Point) -> Result<Point> {
        self.transform_point(id, point, None)
    }

    pub fn world_to_local(&self, id: NodeId, point: Point) -> Result<Point> {
        let inverse = self
            .world_transform(id)?
            .try_inverse()
            .ok_or(SceneError::InvalidOperation("node has zero scale"))?;
        Ok(inverse.map_point(point))
    }

    /// Bounding rect of `id` in `target`'s space (world when `None`).
    ///
    /// Leaves use their content rect. Groups use their clip rect when set,
    /// otherwise the union of their children's bounds.
    pub fn get_bounds(&self, id: NodeId, target: Option<NodeId>) -> Result<Rect> {
        let node = self.get(id)?;
        let rect = self.local_bounds(id)?;

        if target == Some(id) {
            return Ok(rect);
        }
        if target.is_some() && target == node.parent && !node.has_rotation_or_skew() {
            let (sx, sy) = node.scale();
            let m = node.local_transform();
            let (x0, x1) = (m.data[2] + rect.x * sx, m.data[2] + rect.x_max() * sx);
            let (y0, y1) = (m.data[5] + rect.y * sy, m.data[5] + rect.y_max() * sy);
            return Ok(Rect::from_min_max(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)));
        }
        Ok(self.transform_to(id, target)?.map_rect(&rect))
    }

    /// Bounds of `id` in its own space.
    pub(crate) fn local_bounds(&self, id: NodeId) -> Result<Rect> {
        let node = self.get(id)?;
        let group = match node.group() {
            Some(group) => group,
            None => return Ok(node.content_rect),
        };
        if let Some(clip) = group.clip_rect {
            return Ok(clip);
        }

        let mut acc: Option<Rect> = None;
        let mut stack: Vec<(NodeId, Transform)> = Vec::new();
        for &child in group.children.iter().rev() {
            stack.push((child, self.get(child)?.local_transform()));
        }

        while let Some((current, to_group)) = stack.pop() {
            let node = self.get(current)?;
            let rect = match node.group() {
                None => node.content_rect,
                Some(g) => match g.clip_rect {
                    Some(clip) => clip,
                    None if g.children.is_empty() => continue,
                    None => {
                        for &child in g.children.iter().rev() {
                            let local = self.get(child)?.local_transform();
                            stack.push((child, to_group.then(&local)));
                        }
                        continue;
                    }
                },
            };
            let mapped = to_group.map_rect(&rect);
            acc = Some(match acc {
                Some(a) => a.union(&mapped),
                None => mapped,
            });
        }
        Ok(acc.unwrap_or(Rect::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::Pivot;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn rect_approx_eq(a: Rect, b: Rect) -> bool {
        approx_eq(a.x, b.x)
            && approx_eq(a.y, b.y)
            && approx_eq(a.width, b.width)
            && approx_eq(a.height, b.height)
    }

    #[test]
    fn test_bounds_in_own_space_is_content_rect() {
        let mut tree = SceneTree::new();
        let leaf = tree.create_leaf();
        tree.set_content_rect(leaf, Rect::new(0.0, 0.0, 10.0, 20.0)).unwrap();
        tree.set_position(leaf, 100.0, 100.0).unwrap();
        assert_eq!(tree.get_bounds(leaf, Some(leaf)).unwrap(), Rect::new(0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_bounds_in_parent_space_fast_path() {
        let mut tree = SceneTree::new();
        let group = tree.create_group();
        let leaf = tree.create_leaf();
        tree.add_child(group, leaf).unwrap();
        tree.set_size(leaf, 10.0, 20.0).unwrap();
        tree.set_position(leaf, 5.0, 7.0).unwrap();
        tree.set_scale(leaf, 2.0, 0.5).unwrap();

        let fast = tree.get_bounds(leaf, Some(group)).unwrap();
        assert!(rect_approx_eq(fast, Rect::new(5.0, 7.0, 20.0, 10.0)));

        let general = tree
            .transform_to(leaf, Some(group))
            .unwrap()
            .map_rect(&Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!(rect_approx_eq(fast, general));
    }

    #[test]
    fn test_rotation_uses_pivot() {
        let mut tree = SceneTree::new();
        let leaf = tree.create_leaf();
        tree.set_size(leaf, 10.0, 10.0).unwrap();
        tree.set_pivot(leaf, Pivot::CENTER).unwrap();
        tree.set_rotation(leaf, 90.0).unwrap();

        let bounds = tree.get_bounds(leaf, None).unwrap();
        assert!(rect_approx_eq(bounds, Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut tree = SceneTree::new();
        let group = tree.create_group();
        let leaf = tree.create_leaf();
        tree.add_child(group, leaf).unwrap();
        tree.set_position(group, 100.0, 0.0).unwrap();
        tree.set_scale(group, 2.0, 2.0).unwrap();
        tree.set_position(leaf, 10.0, 10.0).unwrap();

        let p = tree.local_to_world(leaf, Point::new(1.0, 1.0)).unwrap();
        assert!(approx_eq(p.x, 122.0));
        assert!(approx_eq(p.y, 22.0));

        let back = tree.world_to_local(leaf, p).unwrap();
        assert!(approx_eq(back.x, 1.0));
        assert!(approx_eq(back.y, 1.0));
    }

    #[test]
    fn test_group_bounds_union_of_children() {
        let mut tree = SceneTree::new();
        let group = tree.create_group();
        let a = tree.create_leaf();
        let b = tree.create_leaf();
        tree.add_child(group, a).unwrap();
        tree.add_child(group, b).unwrap();
        tree.set_size(a, 10.0, 10.0).unwrap();
        tree.set_size(b, 10.0, 10.0).unwrap();
        tree.set_position(b, 30.0, 40.0).unwrap();

        let bounds = tree.get_bounds(group, Some(group)).unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 40.0, 50.0));
    }

    #[test]
    fn test_group_bounds_prefers_clip_rect() {
        let mut tree = SceneTree::new();
        let group = tree.create_group();
        let a = tree.create_leaf();
        tree.add_child(group, a).unwrap();
        tree.set_size(a, 500.0, 500.0).unwrap();
        tree.set_clip_rect(group, Some(Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        tree.set_position(group, 10.0, 10.0).unwrap();

        assert_eq!(tree.get_bounds(group, None).unwrap(), Rect::new(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_bounds_of_disposed_node_fails() {
        let mut tree = SceneTree::new();
        let leaf = tree.create_leaf();
        tree.dispose(leaf);
        assert_eq!(tree.get_bounds(leaf, None), Err(SceneError::Disposed(leaf)));
    }

    #[test]
    fn test_bounds_relative_to_unrelated_node() {
        let mut tree = SceneTree::new();
        let a = tree.create_leaf();
        let b = tree.create_leaf();
        tree.set_size(a, 10.0, 10.0).unwrap();
        tree.set_position(a, 50.0, 50.0).unwrap();
        tree.set_position(b, 20.0, 20.0).unwrap();

        let bounds = tree.get_bounds(a, Some(b)).unwrap();
        assert!(rect_approx_eq(bounds, Rect::new(30.0, 30.0, 10.0, 10.0)));
    }

    #[test]
    fn test_empty_nested_group_adds_nothing() {
        let mut tree = SceneTree::new();
        let group = tree.create_group();
        let empty = tree.create_group();
        let a = tree.create_leaf();
        tree.add_child(group, empty).unwrap();
        tree.add_child(group, a).unwrap();
        tree.set_size(a, 10.0, 10.0).unwrap();
        tree.set_position(a, 20.0, 20.0).unwrap();

        let bounds = tree.get_bounds(group, Some(group)).unwrap();
        assert_eq!(bounds, Rect::new(20.0, 20.0, 10.0, 10.0));
    }

    #[test]
    fn test_bounds_in_zero_scale_space_fails() {
        let mut tree = SceneTree::new();
        let a = tree.create_leaf();
        let flat = tree.create_leaf();
        tree.set_size(a, 10.0, 10.0).unwrap();
        tree.set_scale(flat, 0.0, 1.0).unwrap();

        assert!(matches!(
            tree.get_bounds(a, Some(flat)),
            Err(SceneError::InvalidOperation(_))
        ));
    }
}
