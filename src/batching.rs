//! Draw-order optimization for batching roots.
//!
//! A batching root flattens its visible subtree into a descendants list and
//! moves each draw back towards an earlier draw with the same material, as
//! long as it does not cross anything it overlaps. Nested batching roots
//! appear in the list as single entries and are reordered on their own.
//!
//! The render-order pass then walks the list, stamping the next order on
//! every entry and recursing into nested roots.

use smallvec::SmallVec;

use crate::context::UpdateContext;
use crate::geometry::Rect;
use crate::node::{MaterialKey, NodeFlags};
use crate::render_stats;
use crate::tree::{NodeId, SceneTree};

/// One entry of a descendants list as seen by the reorder pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BatchEntry {
    pub node: NodeId,
    pub material: Option<MaterialKey>,
    pub bounds: Rect,
    pub skip: bool,
}

/// Reorder `entries` in place so that non-overlapping draws sharing a
/// material become adjacent. Returns how many entries moved.
///
/// Entries without a material or flagged `skip` never move. A backward scan
/// stops at a `skip` entry or at the first entry whose bounds overlap (edges
/// touching counts as overlap).
pub(crate) fn reorder_for_batching(entries: &mut Vec<BatchEntry>) -> usize {
    let mut moves = 0;
    for i in 0..entries.len() {
        let current = entries[i];
        let cur_mat = match current.material {
            Some(material) if !current.skip => material,
            _ => continue,
        };

        let mut slot: Option<usize> = None;
        let mut last_mat: Option<MaterialKey> = None;
        let mut boundary = i;
        for j in (0..i).rev() {
            let test = &entries[j];
            if test.skip {
                break;
            }
            if let Some(test_mat) = test.material {
                if last_mat != Some(test_mat) {
                    last_mat = Some(test_mat);
                    boundary = j + 1;
                }
                if cur_mat == test_mat {
                    slot = Some(boundary);
                }
            }
            if current.bounds.overlaps(&test.bounds) {
                if slot.is_none() {
                    slot = Some(boundary);
                }
                break;
            }
        }

        if let Some(k) = slot {
            if k != i {
                let entry = entries.remove(i);
                entries.insert(k, entry);
                moves += 1;
            }
        }
    }
    moves
}

impl SceneTree {
    /// Rebuild the descendants list of `root`, and of every nested batching
    /// root that asked for it along the way.
    pub(crate) fn do_fairy_batching(&mut self, root: NodeId) {
        let mut pending: SmallVec<[NodeId; 8]> = SmallVec::new();
        pending.push(root);
        while let Some(group) = pending.pop() {
            pending.extend(self.batch_group(group));
        }
    }

    fn batch_group(&mut self, root: NodeId) -> Vec<NodeId> {
        match self.get_mut(root) {
            Ok(node) => node.flags.remove(NodeFlags::BATCHING_REQUESTED),
            Err(_) => return Vec::new(),
        }

        let (mut entries, nested) = self.collect_children(root);
        let moves = reorder_for_batching(&mut entries);
        log::trace!(
            "batched {:?}: {} descendants, {} moved",
            root,
            entries.len(),
            moves
        );
        render_stats::record_batching_pass(moves as u64);

        if let Ok(group) = self.group_data_mut(root) {
            group.descendants.clear();
            group.descendants.extend(entries.iter().map(|e| e.node));
        }
        nested
    }

    /// Flatten the visible subtree of `initiator` in paint order.
    ///
    /// Plain groups are walked through; batching roots are kept as single
    /// entries. Bounds are relative to `initiator` and recomputed only when
    /// the entry or one of its ancestors changed since the last pass. Also
    /// returns the nested roots that still need their own pass.
    fn collect_children(&mut self, initiator: NodeId) -> (Vec<BatchEntry>, Vec<NodeId>) {
        let mut entries = Vec::new();
        let mut nested = Vec::new();
        let mask = self.group_data(initiator).ok().and_then(|g| g.mask);

        let mut stack: SmallVec<[(NodeId, usize, bool); 16]> = SmallVec::new();
        stack.push((initiator, 0, false));

        while let Some(&(group, pos, outline_changed)) = stack.last() {
            let child = match self.group_data(group).ok().and_then(|g| g.children.get(pos)) {
                Some(&child) => child,
                None => {
                    stack.pop();
                    continue;
                }
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let node = match self.node(child) {
                Some(node) if node.visible => node,
                _ => continue,
            };
            let changed = outline_changed || node.flags.contains(NodeFlags::OUTLINE_CHANGED);

            if Some(child) != mask {
                let is_root = node.is_batching_root();
                let requested = node.is_batching_dirty();
                let is_group = node.is_group();
                let has_graphics = node.graphics.is_some();

                if !is_group || is_root || has_graphics {
                    let bounds = self.batching_bounds(child, initiator, changed);
                    let node = self.node(child);
                    entries.push(BatchEntry {
                        node: child,
                        material: node.and_then(|n| n.batch_key),
                        bounds,
                        skip: node.is_some_and(|n| n.flags.contains(NodeFlags::SKIP_BATCHING)),
                    });
                }
                if is_root {
                    if requested {
                        nested.push(child);
                    }
                } else if is_group {
                    stack.push((child, 0, changed));
                }
            }

            if let Ok(node) = self.get_mut(child) {
                node.flags.remove(NodeFlags::OUTLINE_CHANGED);
            }
        }
        (entries, nested)
    }

    fn batching_bounds(&mut self, id: NodeId, initiator: NodeId, changed: bool) -> Rect {
        if let Some(outline) = self.node(id).and_then(|n| n.outline) {
            if !changed {
                return outline;
            }
        }
        let rect = self.get_bounds(id, Some(initiator)).unwrap_or_else(|err| {
            log::warn!("bounds of {:?} unavailable for batching: {}", id, err);
            Rect::ZERO
        });
        if let Ok(node) = self.get_mut(id) {
            node.outline = Some(rect);
        }
        rect
    }

    /// Stamp render orders over the descendants list of `root`, recursing
    /// into nested batching roots. The root's mask takes the slot before its
    /// content and the mask eraser the slot after.
    pub(crate) fn set_rendering_order(&mut self, root: NodeId, ctx: &mut UpdateContext) {
        let mut stack: SmallVec<[(NodeId, usize); 8]> = SmallVec::new();
        self.enter_rendering_order(root, ctx, &mut stack);

        while let Some(&(group, pos)) = stack.last() {
            let next = self
                .group_data(group)
                .ok()
                .and_then(|g| g.descendants.get(pos).copied());
            match next {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let (is_mask, is_root) = match self.node(child) {
                        Some(n) => (n.mask_owner.is_some(), n.is_batching_root()),
                        None => continue,
                    };
                    if !is_mask {
                        self.stamp_order(child, ctx);
                    }
                    if is_root {
                        self.enter_rendering_order(child, ctx, &mut stack);
                    }
                }
                None => {
                    stack.pop();
                    if let Some(mask) = self.live_mask(group) {
                        if let Ok(mask_node) = self.get_mut(mask) {
                            mask_node.eraser_order = ctx.rendering_order;
                            ctx.rendering_order += 1;
                        }
                    }
                }
            }
        }
    }

    fn enter_rendering_order(
        &mut self,
        group: NodeId,
        ctx: &mut UpdateContext,
        stack: &mut SmallVec<[(NodeId, usize); 8]>,
    ) {
        if self.is_batching_dirty(group) {
            self.do_fairy_batching(group);
        }
        if let Some(mask) = self.live_mask(group) {
            self.stamp_order(mask, ctx);
        }
        stack.push((group, 0));
    }

    pub(crate) fn stamp_order(&mut self, id: NodeId, ctx: &mut UpdateContext) {
        if let Ok(node) = self.get_mut(id) {
            node.render_order = ctx.rendering_order;
            ctx.rendering_order += 1;
        }
    }

    /// The mask of `group` if it is still alive.
    pub(crate) fn live_mask(&self, group: NodeId) -> Option<NodeId> {
        self.group_data(group)
            .ok()
            .and_then(|g| g.mask)
            .filter(|&mask| self.contains(mask))
    }
}
