//! The per-frame update walk.
//!
//! `SceneTree::update` visits a subtree depth-first with an explicit stack.
//! Each node records its own geometry in the context; each group then
//! opens its clip scope, pushes its alpha and grayed state, and queues its
//! children followed by an exit frame that undoes all of it.
//!
//! Render orders are handed out in one of two ways. Outside any
//! fairy-batching group every node takes the next order as it is visited.
//! Inside one, children are only recorded, and the outermost fairy-batching
//! group assigns orders over its reordered descendants when it exits.

use smallvec::{smallvec, SmallVec};

use crate::backend::RenderBackend;
use crate::context::{FrameStats, UpdateContext};
use crate::error::{Result, SceneError};
use crate::node::{BlendMode, Graphics, NodeFlags};
use crate::render_stats;
use crate::transform::Transform;
use crate::tree::{NodeId, SceneTree};

enum Frame {
    Visit {
        node: NodeId,
        parent_world: Transform,
        /// Take the next render order on visit
        stamp: bool,
    },
    EndMaskWrite,
    Exit(GroupExit),
}

/// What a group must undo once its subtree has been visited.
#[derive(Clone, Copy, Debug)]
struct GroupExit {
    group: NodeId,
    alpha: f32,
    grayed: bool,
    clip_scope: bool,
    painting: bool,
    fairy_batching: bool,
    immediate: bool,
    mask: Option<NodeId>,
    eraser_mark: usize,
}

impl SceneTree {
    /// Update the subtree rooted at `root` for the frame `ctx` is in.
    ///
    /// Records a draw for every visible node that has graphics and stamps
    /// render orders. Draws are submitted by `UpdateContext::end`.
    pub fn update(&mut self, root: NodeId, ctx: &mut UpdateContext) -> Result<()> {
        if !ctx.is_in_frame() {
            return Err(SceneError::InvalidOperation(
                "update called outside of begin/end",
            ));
        }
        let node = self.get(root)?;
        if !node.visible {
            return Ok(());
        }
        let parent_world = match node.parent {
            Some(parent) => self.world_transform(parent)?,
            None => Transform::IDENTITY,
        };

        let mut stack: SmallVec<[Frame; 32]> = smallvec![Frame::Visit {
            node: root,
            parent_world,
            stamp: true,
        }];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit {
                    node,
                    parent_world,
                    stamp,
                } => self.visit(node, parent_world, stamp, ctx, &mut stack),
                Frame::EndMaskWrite => ctx.end_mask_write(),
                Frame::Exit(exit) => self.exit_group(exit, ctx),
            }
        }
        Ok(())
    }

    /// Run one whole frame over the stage: `begin`, `update`, `end`.
    ///
    /// `end` runs even when the update fails, so the context is left ready
    /// for the next frame.
    pub fn render_frame(
        &mut self,
        ctx: &mut UpdateContext,
        backend: &mut dyn RenderBackend,
    ) -> Result<FrameStats> {
        ctx.begin();
        let result = self.update(self.stage(), ctx);
        let stats = ctx.end(self, backend);
        result.map(|()| stats)
    }

    fn visit(
        &mut self,
        id: NodeId,
        parent_world: Transform,
        stamp: bool,
        ctx: &mut UpdateContext,
        stack: &mut SmallVec<[Frame; 32]>,
    ) {
        if stamp {
            self.stamp_order(id, ctx);
        }
        let node = match self.node(id) {
            Some(node) => node,
            None => return,
        };
        render_stats::record_node_updated();

        let world = parent_world.then(&node.local_transform());
        let alpha = ctx.alpha * node.alpha;
        let grayed = ctx.grayed || node.grayed;
        let blend = node.blend_mode;
        let graphics = node.graphics;
        let painting = node.is_painting();
        let cached = painting
            && node
                .flags
                .contains(NodeFlags::CACHE_AS_BITMAP | NodeFlags::CAPTURED);

        if !node.is_group() {
            if cached {
                return;
            }
            if painting {
                ctx.enter_painting_mode();
            }
            self.draw_own(id, graphics, world, alpha, grayed, blend, ctx);
            if painting {
                ctx.leave_painting_mode();
                schedule_capture(id, ctx);
            }
            return;
        }

        self.draw_own(id, graphics, world, alpha, grayed, blend, ctx);
        if cached {
            return;
        }
        if painting {
            ctx.enter_painting_mode();
        }

        let fairy_batching = self
            .node(id)
            .is_some_and(|n| n.flags.contains(NodeFlags::FAIRY_BATCHING));
        let (clip_rect, softness, reversed) = match self.group_data(id) {
            Ok(g) => (g.clip_rect, g.clip_softness, g.reversed_mask),
            Err(_) => return,
        };
        let eraser_mark = ctx.eraser_mark();

        let mut clip_scope = false;
        let mut mask_scope = None;
        if let Some(mask) = self.mask_for_update(id) {
            match ctx.enter_stencil_clip(id, reversed) {
                Ok(()) => {
                    clip_scope = true;
                    mask_scope = Some(mask);
                }
                Err(err) => log::warn!("mask of {:?} ignored this frame: {}", id, err),
            }
        } else if let Some(rect) = clip_rect {
            ctx.enter_rect_clip(id, world.map_rect(&rect), softness);
            clip_scope = true;
        }

        let saved_alpha = ctx.alpha;
        let saved_grayed = ctx.grayed;
        ctx.alpha = alpha;
        ctx.grayed = grayed;
        if fairy_batching {
            ctx.batching_depth += 1;
        }
        let immediate = ctx.batching_depth == 0;

        if immediate {
            if let Some(mask) = mask_scope {
                self.stamp_order(mask, ctx);
            }
        }

        stack.push(Frame::Exit(GroupExit {
            group: id,
            alpha: saved_alpha,
            grayed: saved_grayed,
            clip_scope,
            painting,
            fairy_batching,
            immediate,
            mask: mask_scope,
            eraser_mark,
        }));

        if let Ok(group) = self.group_data(id) {
            for &child in group.children.iter().rev() {
                let drawn = self
                    .node(child)
                    .is_some_and(|n| n.visible && n.mask_owner.is_none());
                if drawn {
                    stack.push(Frame::Visit {
                        node: child,
                        parent_world: world,
                        stamp: immediate,
                    });
                }
            }
        }

        if let Some(mask) = mask_scope {
            let (visible, mask_parent) = match self.node(mask) {
                Some(n) => (n.visible, n.parent),
                None => return,
            };
            if visible {
                let mask_parent_world = match mask_parent {
                    Some(p) if p == id => world,
                    Some(p) => self.world_transform(p).unwrap_or(Transform::IDENTITY),
                    None => Transform::IDENTITY,
                };
                ctx.begin_mask_write(mask);
                stack.push(Frame::EndMaskWrite);
                stack.push(Frame::Visit {
                    node: mask,
                    parent_world: mask_parent_world,
                    stamp: false,
                });
            }
        }
    }

    fn exit_group(&mut self, exit: GroupExit, ctx: &mut UpdateContext) {
        if exit.fairy_batching {
            if ctx.batching_depth == 1 {
                self.set_rendering_order(exit.group, ctx);
            }
            ctx.batching_depth = ctx.batching_depth.saturating_sub(1);
        }
        if exit.immediate {
            if let Some(mask) = exit.mask {
                if let Ok(mask_node) = self.get_mut(mask) {
                    mask_node.eraser_order = ctx.rendering_order;
                    ctx.rendering_order += 1;
                }
            }
        }
        ctx.flush_erasers(exit.eraser_mark);

        ctx.alpha = exit.alpha;
        ctx.grayed = exit.grayed;
        if exit.clip_scope {
            ctx.leave_clipping();
        }
        if exit.painting {
            ctx.leave_painting_mode();
            schedule_capture(exit.group, ctx);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_own(
        &mut self,
        id: NodeId,
        graphics: Option<Graphics>,
        world: Transform,
        alpha: f32,
        grayed: bool,
        blend: BlendMode,
        ctx: &mut UpdateContext,
    ) {
        let key = graphics.map(|g| ctx.submit(id, g, world, alpha, grayed, blend));
        if let Ok(node) = self.get_mut(id) {
            node.batch_key = key;
        }
    }

    /// The mask of `group` if it can be used this frame. A mask that has
    /// been disposed is reported once and then ignored.
    fn mask_for_update(&mut self, group: NodeId) -> Option<NodeId> {
        let mask = self.group_data(group).ok()?.mask?;
        if self.contains(mask) {
            return Some(mask);
        }
        if let Ok(node) = self.get_mut(group) {
            if !node.flags.contains(NodeFlags::MASK_WARNED) {
                node.flags |= NodeFlags::MASK_WARNED;
                log::warn!("mask {:?} of {:?} is disposed, drawing unmasked", mask, group);
            }
        }
        None
    }

    /// Hand the painted output of `id` to the backend and mark it captured.
    pub(crate) fn capture_painting(&mut self, id: NodeId, backend: &mut dyn RenderBackend) {
        let bounds = match self.get_bounds(id, Some(id)) {
            Ok(bounds) => bounds,
            Err(_) => {
                log::warn!("capture of {:?} skipped: node disposed", id);
                return;
            }
        };
        backend.capture(id, bounds);
        if let Ok(node) = self.get_mut(id) {
            node.flags |= NodeFlags::CAPTURED;
        }
    }
}

fn schedule_capture(id: NodeId, ctx: &mut UpdateContext) {
    ctx.on_end(Box::new(move |tree, backend| tree.capture_painting(id, backend)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawKind, RecordingBackend};
    use crate::clip::{ClipUniform, StencilState};
    use crate::geometry::Rect;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn leaf(tree: &mut SceneTree, parent: NodeId, material: u32, x: f32) -> NodeId {
        let id = tree.create_leaf();
        tree.set_size(id, 10.0, 10.0).unwrap();
        tree.set_position(id, x, 0.0).unwrap();
        tree.set_graphics(id, Some(Graphics::new(id.as_u64() as u32, material)))
            .unwrap();
        tree.add_child(parent, id).unwrap();
        id
    }

    fn frame(tree: &mut SceneTree, ctx: &mut UpdateContext) -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        tree.render_frame(ctx, &mut backend).unwrap();
        backend
    }

    #[test]
    fn test_update_requires_frame() {
        let mut tree = SceneTree::new();
        let mut ctx = UpdateContext::default();
        let stage = tree.stage();
        assert!(matches!(
            tree.update(stage, &mut ctx),
            Err(SceneError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_immediate_orders_follow_tree_order() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let a = leaf(&mut tree, stage, 1, 0.0);
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        let b = leaf(&mut tree, group, 1, 20.0);
        let c = leaf(&mut tree, stage, 1, 40.0);

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);

        assert_eq!(backend.drawn_nodes(), vec![a, b, c]);
        let orders: Vec<u32> = [stage, a, group, b, c]
            .iter()
            .map(|&id| tree.node(id).unwrap().render_order())
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_invisible_subtree_is_skipped() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        leaf(&mut tree, group, 1, 0.0);
        let shown = leaf(&mut tree, stage, 1, 0.0);
        tree.set_visible(group, false).unwrap();

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);
        assert_eq!(backend.drawn_nodes(), vec![shown]);
    }

    #[test]
    fn test_alpha_and_grayed_inherit() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        tree.set_alpha(group, 0.5).unwrap();
        tree.set_grayed(group, true).unwrap();
        let inner = leaf(&mut tree, group, 1, 0.0);
        tree.set_alpha(inner, 0.5).unwrap();
        let outer = leaf(&mut tree, stage, 1, 0.0);

        let mut ctx = UpdateContext::default();
        let draws = frame(&mut tree, &mut ctx).submissions();

        assert_eq!(draws[0].node, inner);
        assert!(approx_eq(draws[0].alpha, 0.25));
        assert!(draws[0].grayed);
        assert_eq!(draws[1].node, outer);
        assert!(approx_eq(draws[1].alpha, 1.0));
        assert!(!draws[1].grayed);
    }

    #[test]
    fn test_world_transform_accumulates() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        tree.set_position(group, 100.0, 50.0).unwrap();
        let a = leaf(&mut tree, group, 1, 10.0);

        let mut ctx = UpdateContext::default();
        let draws = frame(&mut tree, &mut ctx).submissions();
        assert_eq!(draws[0].node, a);
        let origin = draws[0]
            .world_transform
            .map_point(crate::geometry::Point::ZERO);
        assert!(approx_eq(origin.x, 110.0));
        assert!(approx_eq(origin.y, 50.0));
    }

    #[test]
    fn test_rect_clip_applies_to_children_only() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        tree.set_position(group, 10.0, 10.0).unwrap();
        tree.set_clip_rect(group, Some(Rect::new(0.0, 0.0, 100.0, 100.0)))
            .unwrap();
        let inside = leaf(&mut tree, group, 1, 0.0);
        let outside = leaf(&mut tree, stage, 1, 0.0);

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);

        let mut clip = None;
        let mut per_node = Vec::new();
        for call in &backend.calls {
            match call {
                crate::backend::BackendCall::Clip(c) => clip = *c,
                crate::backend::BackendCall::Submit(d) => per_node.push((d.node, clip)),
                _ => {}
            }
        }
        let expected = ClipUniform {
            clip_box: crate::clip::clip_box_for(&Rect::new(10.0, 10.0, 100.0, 100.0)),
            softness: [10000.0; 4],
        };
        assert_eq!(per_node, vec![(inside, Some(expected)), (outside, None)]);
        assert_eq!(ctx.clip_depth(), 0);
    }

    #[test]
    fn test_mask_writes_draws_and_erases() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        let mask = leaf(&mut tree, group, 9, 0.0);
        let content = leaf(&mut tree, group, 1, 0.0);
        tree.set_mask(group, Some(mask)).unwrap();

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);

        let states = backend.stencil_per_submission();
        assert_eq!(
            states,
            vec![
                (mask, DrawKind::MaskWrite, StencilState::mask_write(1, 1)),
                (content, DrawKind::Content, StencilState::content(1, 1)),
                (mask, DrawKind::MaskErase, StencilState::mask_erase(1)),
            ]
        );
        let mask_node = tree.node(mask).unwrap();
        let content_order = tree.node(content).unwrap().render_order();
        assert!(mask_node.render_order() < content_order);
        assert!(mask_node.eraser_order() > content_order);
    }

    #[test]
    fn test_reversed_mask_content_expects_clear_bit() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        let mask = leaf(&mut tree, group, 9, 0.0);
        let content = leaf(&mut tree, group, 1, 0.0);
        tree.set_mask(group, Some(mask)).unwrap();
        tree.set_reversed_mask(group, true).unwrap();

        let mut ctx = UpdateContext::default();
        let states = frame(&mut tree, &mut ctx).stencil_per_submission();
        let content_state = states
            .iter()
            .find(|(node, _, _)| *node == content)
            .map(|s| s.2);
        assert_eq!(content_state, Some(StencilState::content(1, 0)));
    }

    #[test]
    fn test_nested_masks_use_next_bit() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let outer = tree.create_group();
        tree.add_child(stage, outer).unwrap();
        let outer_mask = leaf(&mut tree, outer, 9, 0.0);
        tree.set_mask(outer, Some(outer_mask)).unwrap();
        let inner = tree.create_group();
        tree.add_child(outer, inner).unwrap();
        let inner_mask = leaf(&mut tree, inner, 9, 0.0);
        tree.set_mask(inner, Some(inner_mask)).unwrap();
        let content = leaf(&mut tree, inner, 1, 0.0);

        let mut ctx = UpdateContext::default();
        let states = frame(&mut tree, &mut ctx).stencil_per_submission();
        let kinds: Vec<(NodeId, DrawKind)> = states.iter().map(|s| (s.0, s.1)).collect();
        assert_eq!(
            kinds,
            vec![
                (outer_mask, DrawKind::MaskWrite),
                (inner_mask, DrawKind::MaskWrite),
                (content, DrawKind::Content),
                (inner_mask, DrawKind::MaskErase),
                (outer_mask, DrawKind::MaskErase),
            ]
        );
        assert_eq!(states[1].2, StencilState::mask_write(2, 3));
        assert_eq!(states[2].2, StencilState::content(2, 3));
        assert_eq!(states[3].2, StencilState::mask_erase(2));
    }

    #[test]
    fn test_disposed_mask_is_ignored() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        let mask = leaf(&mut tree, stage, 9, 0.0);
        let content = leaf(&mut tree, group, 1, 0.0);
        tree.set_mask(group, Some(mask)).unwrap();
        tree.dispose(mask);

        let mut ctx = UpdateContext::default();
        let states = frame(&mut tree, &mut ctx).stencil_per_submission();
        assert_eq!(
            states,
            vec![(content, DrawKind::Content, StencilState::DISABLED)]
        );
        assert!(tree
            .node(group)
            .unwrap()
            .flags()
            .contains(NodeFlags::MASK_WARNED));
    }

    #[test]
    fn test_fairy_batching_groups_materials() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        tree.set_fairy_batching(group, true).unwrap();
        let a = leaf(&mut tree, group, 1, 0.0);
        let b = leaf(&mut tree, group, 2, 20.0);
        let c = leaf(&mut tree, group, 1, 40.0);

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);
        assert_eq!(backend.drawn_nodes(), vec![a, c, b]);
        assert!(!tree.is_batching_dirty(group));

        // Moving B over C pins C behind it
        tree.set_position(b, 35.0, 0.0).unwrap();
        tree.mark_batching_dirty(group).unwrap();
        let backend = frame(&mut tree, &mut ctx);
        assert_eq!(backend.drawn_nodes(), vec![a, b, c]);
    }

    #[test]
    fn test_batched_draws_break_less() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        for (i, material) in [1, 2, 1, 2].into_iter().enumerate() {
            leaf(&mut tree, group, material, i as f32 * 20.0);
        }

        let mut ctx = UpdateContext::default();
        let mut backend = RecordingBackend::new();
        let plain = tree.render_frame(&mut ctx, &mut backend).unwrap();
        tree.set_fairy_batching(group, true).unwrap();
        let batched = tree.render_frame(&mut ctx, &mut backend).unwrap();

        assert_eq!(plain.batch_breaks, 4);
        assert_eq!(batched.batch_breaks, 2);
    }

    #[test]
    fn test_cache_as_bitmap_skips_after_capture() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let group = tree.create_group();
        tree.add_child(stage, group).unwrap();
        let a = leaf(&mut tree, group, 1, 0.0);
        tree.enter_painting_mode(group, 1).unwrap();
        tree.set_cache_as_bitmap(group, true).unwrap();

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);
        assert_eq!(backend.drawn_nodes(), vec![a]);
        assert_eq!(backend.captures(), vec![group]);

        let backend = frame(&mut tree, &mut ctx);
        assert!(backend.drawn_nodes().is_empty());
        assert!(backend.captures().is_empty());

        tree.invalidate_capture(group).unwrap();
        let backend = frame(&mut tree, &mut ctx);
        assert_eq!(backend.drawn_nodes(), vec![a]);
    }

    #[test]
    fn test_painting_draws_unclipped() {
        let mut tree = SceneTree::new();
        let stage = tree.stage();
        let clip = tree.create_group();
        tree.add_child(stage, clip).unwrap();
        tree.set_clip_rect(clip, Some(Rect::new(0.0, 0.0, 5.0, 5.0)))
            .unwrap();
        let painted = tree.create_group();
        tree.add_child(clip, painted).unwrap();
        tree.enter_painting_mode(painted, 1).unwrap();
        leaf(&mut tree, painted, 1, 0.0);

        let mut ctx = UpdateContext::default();
        let backend = frame(&mut tree, &mut ctx);
        let clips: Vec<Option<ClipUniform>> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                crate::backend::BackendCall::Clip(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(clips, vec![None]);
        assert_eq!(backend.captures(), vec![painted]);
    }
}
