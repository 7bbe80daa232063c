//! Property setters.
//!
//! Geometry setters only flag the outline as changed; the next batching pass
//! that collects the node recomputes its bounds. Setters that change what a
//! node looks like to the batcher (blend, material, visibility) request a new
//! batching pass from the owning batching root.

use crate::error::{Result, SceneError};
use crate::geometry::{Point, Rect};
use crate::hit_test::HitArea;
use crate::node::{BlendMode, Graphics, Node, NodeFlags, Softness};
use crate::pivot::Pivot;
use crate::tree::{NodeId, SceneTree};

impl Node {
    fn refresh_pivot_offset(&mut self) {
        self.pivot_offset = self.pivot.resolve(self.content_rect);
    }

    fn outline_changed(&mut self) {
        self.flags |= NodeFlags::OUTLINE_CHANGED;
    }
}

impl SceneTree {
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.name = Some(name.into());
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        let node = self.get_mut(id)?;
        let position = Point::new(x, y);
        if node.position != position {
            node.position = position;
            node.outline_changed();
        }
        Ok(())
    }

    pub fn set_scale(&mut self, id: NodeId, sx: f32, sy: f32) -> Result<()> {
        let node = self.get_mut(id)?;
        node.scale_x = sx;
        node.scale_y = sy;
        node.outline_changed();
        Ok(())
    }

    /// Rotation in degrees around the pivot.
    pub fn set_rotation(&mut self, id: NodeId, degrees: f32) -> Result<()> {
        let node = self.get_mut(id)?;
        node.rotation = degrees;
        node.outline_changed();
        Ok(())
    }

    /// Shear angles in degrees around the pivot.
    pub fn set_skew(&mut self, id: NodeId, skew_x: f32, skew_y: f32) -> Result<()> {
        let node = self.get_mut(id)?;
        node.skew_x = skew_x;
        node.skew_y = skew_y;
        node.outline_changed();
        Ok(())
    }

    pub fn set_pivot(&mut self, id: NodeId, pivot: Pivot) -> Result<()> {
        let node = self.get_mut(id)?;
        node.pivot = pivot;
        node.refresh_pivot_offset();
        node.outline_changed();
        Ok(())
    }

    /// Resize the content rect, keeping its origin.
    pub fn set_size(&mut self, id: NodeId, width: f32, height: f32) -> Result<()> {
        let rect = self.get(id)?.content_rect;
        self.set_content_rect(id, Rect::new(rect.x, rect.y, width, height))
    }

    /// Local bounds used for hit testing and for the outline of leaves.
    pub fn set_content_rect(&mut self, id: NodeId, rect: Rect) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.content_rect == rect {
            return Ok(());
        }
        node.content_rect = rect;
        node.refresh_pivot_offset();
        node.outline_changed();
        node.flags.remove(NodeFlags::CAPTURED);
        Ok(())
    }

    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) -> Result<()> {
        self.get_mut(id)?.alpha = alpha.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn set_grayed(&mut self, id: NodeId, grayed: bool) -> Result<()> {
        self.get_mut(id)?.grayed = grayed;
        Ok(())
    }

    /// Show or hide a node. Showing an attached node requests batching from
    /// its parent's root, and for a group, from the group itself.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.visible == visible {
            return Ok(());
        }
        node.visible = visible;
        node.outline_changed();
        let is_group = node.is_group();
        let parent = node.parent;
        if visible {
            if let Some(parent) = parent {
                self.invalidate_batching_state(parent, true);
                if is_group {
                    self.invalidate_batching_state(id, true);
                }
            }
        }
        Ok(())
    }

    pub fn set_touchable(&mut self, id: NodeId, touchable: bool) -> Result<()> {
        self.get_mut(id)?.touchable = touchable;
        Ok(())
    }

    pub fn set_blend_mode(&mut self, id: NodeId, blend_mode: BlendMode) -> Result<()> {
        self.get_mut(id)?.blend_mode = blend_mode;
        self.mark_batching_dirty(id)
    }

    /// Attach or clear the renderable payload.
    pub fn set_graphics(&mut self, id: NodeId, graphics: Option<Graphics>) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.graphics == graphics {
            return Ok(());
        }
        node.graphics = graphics;
        self.mark_batching_dirty(id)
    }

    /// Exempt a node from batching: it never moves and nothing moves past it.
    pub fn set_skip_batching(&mut self, id: NodeId, skip: bool) -> Result<()> {
        self.get_mut(id)?.flags.set(NodeFlags::SKIP_BATCHING, skip);
        self.mark_batching_dirty(id)
    }

    pub fn set_hit_area(&mut self, id: NodeId, hit_area: Option<Box<dyn HitArea>>) -> Result<()> {
        self.get_mut(id)?.hit_area = hit_area;
        Ok(())
    }

    /// Let a group reorder its subtree to reduce material switches.
    pub fn set_fairy_batching(&mut self, group: NodeId, enabled: bool) -> Result<()> {
        self.group_data(group)?;
        let node = self.get_mut(group)?;
        if node.flags.contains(NodeFlags::FAIRY_BATCHING) == enabled {
            return Ok(());
        }
        node.flags.set(NodeFlags::FAIRY_BATCHING, enabled);
        self.update_batching_flags(group);
        Ok(())
    }

    /// Clip children to `rect`, given in the group's local space.
    pub fn set_clip_rect(&mut self, group: NodeId, rect: Option<Rect>) -> Result<()> {
        let data = self.group_data_mut(group)?;
        if data.clip_rect == rect {
            return Ok(());
        }
        data.clip_rect = rect;
        self.get_mut(group)?.outline_changed();
        self.update_batching_flags(group);
        self.rebatch_around(group);
        Ok(())
    }

    pub fn set_clip_softness(&mut self, group: NodeId, softness: Option<Softness>) -> Result<()> {
        self.group_data_mut(group)?.clip_softness = softness;
        Ok(())
    }

    /// Use `mask` as a stencil for `group`'s content.
    ///
    /// The mask is a plain reference: it may be one of the group's children
    /// (then it is not drawn as content) or any other node, but not the group
    /// itself or one of its ancestors.
    pub fn set_mask(&mut self, group: NodeId, mask: Option<NodeId>) -> Result<()> {
        let old = self.group_data(group)?.mask;
        if old == mask {
            return Ok(());
        }
        if let Some(m) = mask {
            let node = self.get(m)?;
            if m == group || self.is_ancestor_of(m, group) {
                return Err(SceneError::InvalidOperation(
                    "a group cannot be masked by itself or an ancestor",
                ));
            }
            if node.mask_owner.is_some_and(|owner| owner != group) {
                return Err(SceneError::InvalidOperation(
                    "node is already the mask of another group",
                ));
            }
        }

        if let Some(old) = old {
            if let Ok(old_node) = self.get_mut(old) {
                old_node.mask_owner = None;
            }
        }
        if let Some(m) = mask {
            self.get_mut(m)?.mask_owner = Some(group);
        }
        self.group_data_mut(group)?.mask = mask;
        let node = self.get_mut(group)?;
        node.flags.remove(NodeFlags::MASK_WARNED);
        self.update_batching_flags(group);
        self.rebatch_around(group);
        // A released or claimed mask changes what its own parent draws
        for m in [old, mask].into_iter().flatten() {
            if let Some(parent) = self.node(m).and_then(|n| n.parent) {
                self.invalidate_batching_state(parent, true);
            }
        }
        Ok(())
    }

    /// Draw only where the mask is not.
    pub fn set_reversed_mask(&mut self, group: NodeId, reversed: bool) -> Result<()> {
        self.group_data_mut(group)?.reversed_mask = reversed;
        Ok(())
    }

    /// When false, the group is hit as a whole and its children are not tested.
    pub fn set_touch_children(&mut self, group: NodeId, touch_children: bool) -> Result<()> {
        self.group_data_mut(group)?.touch_children = touch_children;
        Ok(())
    }

    /// When true, the group is hit inside its content rect even where no
    /// child is.
    pub fn set_opaque(&mut self, group: NodeId, opaque: bool) -> Result<()> {
        self.group_data_mut(group)?.opaque = opaque;
        Ok(())
    }

    /// Reuse the painted output of a painting node once it has been captured.
    pub fn set_cache_as_bitmap(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        let node = self.get_mut(id)?;
        node.flags.set(NodeFlags::CACHE_AS_BITMAP, enabled);
        node.flags.remove(NodeFlags::CAPTURED);
        Ok(())
    }

    /// Drop a cached capture so the node is painted again.
    pub fn invalidate_capture(&mut self, id: NodeId) -> Result<()> {
        self.get_mut(id)?.flags.remove(NodeFlags::CAPTURED);
        Ok(())
    }

    /// Render `id` into an offscreen target each frame on behalf of
    /// `requestor` (a bit flag; several requestors may hold painting mode).
    pub fn enter_painting_mode(&mut self, id: NodeId, requestor: u32) -> Result<()> {
        let node = self.get_mut(id)?;
        let was_painting = node.painting_mode != 0;
        node.painting_mode |= requestor;
        if !was_painting && node.painting_mode != 0 {
            node.flags.remove(NodeFlags::CAPTURED);
            log::debug!("{:?} entered painting mode", id);
            self.refresh_painting_batching(id);
        }
        Ok(())
    }

    pub fn leave_painting_mode(&mut self, id: NodeId, requestor: u32) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.painting_mode == 0 {
            return Ok(());
        }
        node.painting_mode &= !requestor;
        if node.painting_mode == 0 {
            log::debug!("{:?} left painting mode", id);
            self.refresh_painting_batching(id);
        }
        Ok(())
    }

    fn refresh_painting_batching(&mut self, id: NodeId) {
        let is_group = self.node(id).is_some_and(Node::is_group);
        if is_group {
            self.update_batching_flags(id);
        } else if let Some(parent) = self.parent(id) {
            self.invalidate_batching_state(parent, true);
        }
    }
}
