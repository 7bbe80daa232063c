//! Arena-based scene storage.
//!
//! The SceneTree stores every node of a stage using a sparse-set architecture
//! with generational indices. Groups own their children through the arena;
//! `parent` links are plain ids, so the tree has no reference cycles.
//!
//! ## Key Features
//!
//! - **Generational Indices**: NodeId contains index + generation, so a handle
//!   to a disposed node can never reach a node allocated later in its slot.
//!
//! - **Dense Storage**: Nodes stored contiguously for cache-friendly iteration
//!   during update and batching passes.
//!
//! - **Swap-Remove**: O(1) removal without creating holes in dense storage.
//!
//! - **Validated Mutation**: Child operations check every precondition before
//!   touching the arena, so a returned error leaves the tree unchanged.
//!
//! - **Batch Invalidation**: Structural changes mark the nearest enclosing
//!   batching root, which rebuilds its descendants list on the next update.

use std::collections::HashSet;

use crate::error::{Result, SceneError};
use crate::node::{GroupData, Node, NodeFlags, NodeKind};

/// Unique identifier for a node in the tree.
///
/// Uses a generational index design:
/// - `index`: Position in the sparse array (reusable after disposal)
/// - `generation`: Version counter that increments when a slot is reused
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Combines generation (high bits) with index (low bits).
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

/// Entry in the sparse map. The generation outlives the node so the next
/// allocation in this slot gets a fresh one.
struct SparseEntry {
    dense_index: Option<usize>,
    generation: u32,
}

/// Notification queued when a subtree joins or leaves the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageEvent {
    AddedToStage(NodeId),
    RemovedFromStage(NodeId),
}

/// Central arena holding the stage and every node created for it.
pub struct SceneTree {
    dense: Vec<Node>,
    sparse: Vec<SparseEntry>,
    free_indices: Vec<u32>,
    stage: NodeId,
    stage_events: Vec<StageEvent>,
}

impl SceneTree {
    /// Create a tree containing only the stage group.
    pub fn new() -> Self {
        let mut tree = Self {
            dense: Vec::new(),
            sparse: Vec::new(),
            free_indices: Vec::new(),
            stage: NodeId::new(0, 0),
            stage_events: Vec::new(),
        };
        tree.stage = tree.allocate(NodeKind::Group(GroupData::new()));
        tree
    }

    /// Root group of the live tree. Nodes below it are "on stage".
    pub fn stage(&self) -> NodeId {
        self.stage
    }

    fn allocate(&mut self, kind: NodeKind) -> NodeId {
        let (sparse_index, generation) = if let Some(idx) = self.free_indices.pop() {
            let entry = &self.sparse[idx as usize];
            (idx, entry.generation.wrapping_add(1))
        } else {
            let idx = self.sparse.len() as u32;
            self.sparse.push(SparseEntry {
                dense_index: None,
                generation: 0,
            });
            (idx, 0)
        };

        let dense_index = self.dense.len();
        self.dense.push(Node::new(kind, sparse_index));
        self.sparse[sparse_index as usize] = SparseEntry {
            dense_index: Some(dense_index),
            generation,
        };

        NodeId::new(sparse_index, generation)
    }

    /// Create a detached leaf node.
    pub fn create_leaf(&mut self) -> NodeId {
        self.allocate(NodeKind::Leaf)
    }

    /// Create a detached, empty group.
    pub fn create_group(&mut self) -> NodeId {
        self.allocate(NodeKind::Group(GroupData::new()))
    }

    /// Get the dense array index for a NodeId, validating generation.
    fn get_dense_index(&self, id: NodeId) -> Option<usize> {
        self.sparse
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.dense_index)
    }

    /// Check if a node is alive.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get_dense_index(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.get_dense_index(id).map(|idx| &self.dense[idx])
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(SceneError::Disposed(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        match self.get_dense_index(id) {
            Some(idx) => Ok(&mut self.dense[idx]),
            None => Err(SceneError::Disposed(id)),
        }
    }

    pub(crate) fn group_data(&self, id: NodeId) -> Result<&GroupData> {
        self.get(id)?.group().ok_or(SceneError::NotAGroup(id))
    }

    pub(crate) fn group_data_mut(&mut self, id: NodeId) -> Result<&mut GroupData> {
        self.get_mut(id)?
            .group_mut()
            .ok_or(SceneError::NotAGroup(id))
    }

    /// Number of live nodes, the stage included.
    pub fn node_count(&self) -> usize {
        self.dense.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, group: NodeId) -> Result<&[NodeId]> {
        Ok(&self.group_data(group)?.children)
    }

    pub fn num_children(&self, group: NodeId) -> Result<usize> {
        Ok(self.group_data(group)?.children.len())
    }

    pub fn get_child_at(&self, group: NodeId, index: usize) -> Result<NodeId> {
        let children = &self.group_data(group)?.children;
        children
            .get(index)
            .copied()
            .ok_or(SceneError::IndexOutOfRange {
                index,
                len: children.len(),
            })
    }

    /// Position of `child` in `group`'s child list, if it is a child.
    pub fn child_index(&self, group: NodeId, child: NodeId) -> Option<usize> {
        self.group_data(group)
            .ok()
            .and_then(|g| g.children.iter().position(|&c| c == child))
    }

    /// True when `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// True for the stage and every node attached below it.
    pub fn is_on_stage(&self, id: NodeId) -> bool {
        self.contains(id) && (id == self.stage || self.is_ancestor_of(self.stage, id))
    }

    /// Append `node` to `group`.
    pub fn add_child(&mut self, group: NodeId, node: NodeId) -> Result<()> {
        let len = self.num_children(group)?;
        let len = if self.parent(node) == Some(group) {
            len - 1
        } else {
            len
        };
        self.add_child_at(group, node, len)
    }

    /// Insert `node` into `group` at `index` (`0..=len`).
    ///
    /// A node already in `group` is moved as by `set_child_index`; a node
    /// owned by another group is detached from it first.
    pub fn add_child_at(&mut self, group: NodeId, node: NodeId, index: usize) -> Result<()> {
        let len = self.num_children(group)?;
        self.get(node)?;
        if index > len {
            return Err(SceneError::IndexOutOfRange { index, len });
        }
        if self.parent(node) == Some(group) {
            return self.set_child_index(group, node, index);
        }
        if node == group || node == self.stage || self.is_ancestor_of(node, group) {
            return Err(SceneError::InvalidOperation(
                "a node cannot be added below itself or the stage",
            ));
        }

        if let Some(old_parent) = self.parent(node) {
            if let Some(old_index) = self.child_index(old_parent, node) {
                self.detach_at(old_parent, old_index);
            }
        }

        self.group_data_mut(group)?.children.insert(index, node);
        self.set_parent_link(node, Some(group));

        if self.is_on_stage(group) {
            self.broadcast_stage_event(node, StageEvent::AddedToStage);
        }
        self.invalidate_batching_state(group, true);
        Ok(())
    }

    /// Remove `node` from `group`, optionally disposing it.
    pub fn remove_child(&mut self, group: NodeId, node: NodeId, dispose: bool) -> Result<()> {
        self.get(node)?;
        let index = self
            .child_index(group, node)
            .ok_or(SceneError::NotAChild {
                node,
                parent: group,
            })?;
        self.remove_child_at(group, index, dispose).map(|_| ())
    }

    /// Remove the child at `index` (`0..len`) and return it.
    ///
    /// Without `dispose` the node survives detached, with no parent.
    pub fn remove_child_at(
        &mut self,
        group: NodeId,
        index: usize,
        dispose: bool,
    ) -> Result<NodeId> {
        let child = self.get_child_at(group, index)?;
        self.detach_at(group, index);
        if dispose {
            self.dispose(child);
        }
        Ok(child)
    }

    /// Remove children in `begin..end`.
    pub fn remove_children(
        &mut self,
        group: NodeId,
        begin: usize,
        end: usize,
        dispose: bool,
    ) -> Result<()> {
        let len = self.num_children(group)?;
        if end > len {
            return Err(SceneError::IndexOutOfRange { index: end, len });
        }
        if begin > end {
            return Err(SceneError::IndexOutOfRange { index: begin, len });
        }
        for _ in begin..end {
            self.remove_child_at(group, begin, dispose)?;
        }
        Ok(())
    }

    /// Detach `node` from its parent, if it has one.
    pub fn remove_from_parent(&mut self, node: NodeId) -> Result<()> {
        let parent = match self.get(node)?.parent {
            Some(parent) => parent,
            None => return Ok(()),
        };
        self.remove_child(parent, node, false)
    }

    /// Move `node` to `index` within `group`. Indices past the end append.
    pub fn set_child_index(&mut self, group: NodeId, node: NodeId, index: usize) -> Result<()> {
        let old_index = self.child_index(group, node);
        if old_index == Some(index) {
            return Ok(());
        }
        let old_index = old_index.ok_or(SceneError::NotAChild {
            node,
            parent: group,
        })?;

        let children = &mut self.group_data_mut(group)?.children;
        children.remove(old_index);
        let index = index.min(children.len());
        children.insert(index, node);

        self.invalidate_batching_state(group, true);
        Ok(())
    }

    pub fn swap_children(&mut self, group: NodeId, a: NodeId, b: NodeId) -> Result<()> {
        let index_a = self
            .child_index(group, a)
            .ok_or(SceneError::NotAChild {
                node: a,
                parent: group,
            })?;
        let index_b = self
            .child_index(group, b)
            .ok_or(SceneError::NotAChild {
                node: b,
                parent: group,
            })?;
        self.swap_children_at(group, index_a, index_b)
    }

    pub fn swap_children_at(&mut self, group: NodeId, i: usize, j: usize) -> Result<()> {
        let children = &mut self.group_data_mut(group)?.children;
        let len = children.len();
        for index in [i, j] {
            if index >= len {
                return Err(SceneError::IndexOutOfRange { index, len });
            }
        }
        children.swap(i, j);
        self.invalidate_batching_state(group, true);
        Ok(())
    }

    /// Place each `nodes[n]` at `indices[n]`.
    ///
    /// Every node must already be a child of `group`, and the result must
    /// still hold each child exactly once.
    pub fn change_children_order(
        &mut self,
        group: NodeId,
        indices: &[usize],
        nodes: &[NodeId],
    ) -> Result<()> {
        if indices.len() != nodes.len() {
            return Err(SceneError::InvalidOperation(
                "indices and nodes must have the same length",
            ));
        }
        let mut reordered = self.children(group)?.to_vec();
        let len = reordered.len();
        for (&index, &node) in indices.iter().zip(nodes) {
            if self.parent(node) != Some(group) {
                return Err(SceneError::NotAChild {
                    node,
                    parent: group,
                });
            }
            if index >= len {
                return Err(SceneError::IndexOutOfRange { index, len });
            }
            reordered[index] = node;
        }
        let unique: HashSet<NodeId> = reordered.iter().copied().collect();
        if unique.len() != len {
            return Err(SceneError::InvalidOperation(
                "reordering would duplicate a child",
            ));
        }

        self.group_data_mut(group)?.children = reordered;
        self.invalidate_batching_state(group, true);
        Ok(())
    }

    /// All nodes below `group`, depth-first.
    ///
    /// Groups come after their own children. With `backward`, children are
    /// walked last-to-first.
    pub fn descendants(&self, group: NodeId, backward: bool) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(group, 0)];
        self.group_data(group)?;

        while let Some((current, pos)) = stack.pop() {
            let children = match self.node(current).and_then(|n| n.group()) {
                Some(g) => &g.children,
                None => continue,
            };
            if pos < children.len() {
                let child = if backward {
                    children[children.len() - 1 - pos]
                } else {
                    children[pos]
                };
                stack.push((current, pos + 1));
                if self.node(child).is_some_and(Node::is_group) {
                    stack.push((child, 0));
                } else {
                    out.push(child);
                }
            } else if current != group {
                out.push(current);
            }
        }
        Ok(out)
    }

    /// Dispose `id` and every node it owns.
    ///
    /// The node is detached from its parent first, then its subtree is
    /// destroyed children-first. Disposing a stale id is a no-op.
    pub fn dispose(&mut self, id: NodeId) {
        if !self.contains(id) {
            log::debug!("dispose of already disposed node {:?} ignored", id);
            return;
        }
        if id == self.stage {
            log::warn!("the stage cannot be disposed");
            return;
        }

        if let Some(parent) = self.parent(id) {
            if let Some(index) = self.child_index(parent, id) {
                self.detach_at(parent, index);
            }
        }

        let doomed = self.subtree_post_order(id);
        log::debug!("disposing {:?} ({} nodes)", id, doomed.len());
        for node in doomed {
            self.release(node);
        }
    }

    /// `root` and everything below it, children before their group.
    fn subtree_post_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            if let Some(group) = self.node(id).and_then(|n| n.group()) {
                for &child in group.children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        out
    }

    /// Remove one node from the arena.
    fn release(&mut self, id: NodeId) {
        let dense_index = match self.get_dense_index(id) {
            Some(idx) => idx,
            None => return,
        };

        let mask = self.dense[dense_index].group().and_then(|g| g.mask);
        if let Some(mask) = mask {
            if let Ok(mask_node) = self.get_mut(mask) {
                if mask_node.mask_owner == Some(id) {
                    mask_node.mask_owner = None;
                }
            }
        }

        let last_dense_index = self.dense.len() - 1;
        self.dense.swap_remove(dense_index);

        // Fix up the moved node's sparse entry
        if dense_index != last_dense_index {
            let moved_sparse_idx = self.dense[dense_index].sparse_index;
            self.sparse[moved_sparse_idx as usize].dense_index = Some(dense_index);
        }

        self.sparse[id.index as usize].dense_index = None;
        self.free_indices.push(id.index);
    }

    /// Unlink the child at `index` from `group`, leaving it detached.
    fn detach_at(&mut self, group: NodeId, index: usize) {
        let child = match self.group_data_mut(group) {
            Ok(g) if index < g.children.len() => g.children.remove(index),
            _ => return,
        };
        if self.is_on_stage(group) {
            self.broadcast_stage_event(child, StageEvent::RemovedFromStage);
        }
        self.set_parent_link(child, None);
        self.invalidate_batching_state(group, true);
    }

    fn set_parent_link(&mut self, node: NodeId, parent: Option<NodeId>) {
        if let Ok(n) = self.get_mut(node) {
            if n.parent != parent {
                n.parent = parent;
                n.flags |= NodeFlags::OUTLINE_CHANGED;
            }
        }
    }

    /// Queue `event` for `root` and every node below it, in tree order.
    fn broadcast_stage_event(&mut self, root: NodeId, event: fn(NodeId) -> StageEvent) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.stage_events.push(event(id));
            if let Some(group) = self.node(id).and_then(|n| n.group()) {
                stack.extend(group.children.iter().rev().copied());
            }
        }
        log::debug!("{:?} for subtree of {:?}", event(root), root);
    }

    /// Drain queued stage notifications.
    pub fn take_stage_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.stage_events)
    }

    /// Request a batching pass for the batching root that owns `id`'s draws.
    ///
    /// With `children_changed` on a batching root, the root itself is marked.
    /// Otherwise the request walks up through the parents until one that is
    /// a batching root is found. Without such an ancestor nothing happens.
    pub fn invalidate_batching_state(&mut self, id: NodeId, children_changed: bool) {
        let (is_root, parent) = match self.node(id) {
            Some(n) => (n.is_batching_root(), n.parent),
            None => return,
        };
        if children_changed && is_root {
            self.request_batching(id);
            return;
        }

        let mut current = parent;
        while let Some(p) = current {
            let node = match self.node(p) {
                Some(n) => n,
                None => return,
            };
            if node.is_batching_root() {
                self.request_batching(p);
                return;
            }
            current = node.parent;
        }
    }

    fn request_batching(&mut self, group: NodeId) {
        if let Ok(node) = self.get_mut(group) {
            node.flags |= NodeFlags::BATCHING_REQUESTED;
            node.flags.remove(NodeFlags::CAPTURED);
        }
    }

    /// Mark the draws of `id` as needing a new batching pass.
    ///
    /// For a group this covers its own children; for a leaf, its siblings.
    pub fn mark_batching_dirty(&mut self, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        if node.is_group() {
            self.invalidate_batching_state(id, true);
        } else if let Some(parent) = node.parent {
            self.invalidate_batching_state(parent, true);
        }
        Ok(())
    }

    /// True when `group` will rebuild its descendants list on the next update.
    pub fn is_batching_dirty(&self, group: NodeId) -> bool {
        self.node(group).is_some_and(Node::is_batching_dirty)
    }

    /// Rebuild the draw lists that include `group`: its own when it is a
    /// batching root, and the one of the root enclosing it.
    pub(crate) fn rebatch_around(&mut self, group: NodeId) {
        self.invalidate_batching_state(group, true);
        if let Some(parent) = self.node(group).and_then(|n| n.parent) {
            self.invalidate_batching_state(parent, true);
        }
    }

    /// Recompute the derived batching-root flag of `group`.
    pub(crate) fn update_batching_flags(&mut self, group: NodeId) {
        let node = match self.get_mut(group) {
            Ok(n) => n,
            Err(_) => return,
        };
        let (has_clip, has_mask) = match node.group() {
            Some(g) => (g.clip_rect.is_some(), g.mask.is_some()),
            None => return,
        };
        let old_value = node.is_batching_root();
        let new_value = node.flags.contains(NodeFlags::FAIRY_BATCHING)
            || has_clip
            || has_mask
            || node.painting_mode > 0;
        node.flags.set(NodeFlags::BATCHING_ROOT, new_value);

        if old_value != new_value {
            if new_value {
                node.flags |= NodeFlags::BATCHING_REQUESTED;
            } else if let Some(g) = node.group_mut() {
                g.descendants.clear();
            }
            if let Some(parent) = node.parent {
                self.invalidate_batching_state(parent, true);
            }
        }
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with_leaves(tree: &mut SceneTree, count: usize) -> (NodeId, Vec<NodeId>) {
        let group = tree.create_group();
        let leaves: Vec<NodeId> = (0..count).map(|_| tree.create_leaf()).collect();
        for &leaf in &leaves {
            tree.add_child(group, leaf).unwrap();
        }
        (group, leaves)
    }

    #[test]
    fn test_tree_create_and_dispose() {
        let mut tree = SceneTree::new();
        let id = tree.create_leaf();
        assert!(tree.contains(id));
        assert_eq!(tree.node_count(), 2);

        tree.dispose(id);
        assert!(!tree.contains(id));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_tree_generational_index() {
        let mut tree = SceneTree::new();
        let id1 = tree.create_leaf();
        tree.dispose(id1);
        let id2 = tree.create_leaf();
        tree.dispose(id2);
        let id3 = tree.create_leaf();

        assert!(!tree.contains(id1));
        assert!(!tree.contains(id2));
        assert!(tree.contains(id3));
        assert_eq!(id1.index, id3.index);
        assert_ne!(id1.generation, id3.generation);
        assert_ne!(id2.generation, id3.generation);
    }

    #[test]
    fn test_tree_swap_remove_fixup() {
        let mut tree = SceneTree::new();
        let id1 = tree.create_leaf();
        let id2 = tree.create_leaf();
        let id3 = tree.create_leaf();

        tree.dispose(id1);

        assert!(!tree.contains(id1));
        assert!(tree.node(id2).is_some());
        assert!(tree.node(id3).is_some());
    }

    #[test]
    fn test_add_child_at_sets_parent() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 2);
        let extra = tree.create_leaf();

        tree.add_child_at(group, extra, 1).unwrap();

        assert_eq!(tree.children(group).unwrap(), &[leaves[0], extra, leaves[1]]);
        assert_eq!(tree.parent(extra), Some(group));
    }

    #[test]
    fn test_add_child_at_rejects_out_of_range() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 2);
        let extra = tree.create_leaf();

        let err = tree.add_child_at(group, extra, 3).unwrap_err();
        assert_eq!(err, SceneError::IndexOutOfRange { index: 3, len: 2 });
        assert_eq!(tree.children(group).unwrap(), leaves.as_slice());
        assert_eq!(tree.parent(extra), None);
    }

    #[test]
    fn test_add_child_moves_between_groups() {
        let mut tree = SceneTree::new();
        let (a, leaves) = group_with_leaves(&mut tree, 2);
        let b = tree.create_group();

        tree.add_child(b, leaves[0]).unwrap();

        assert_eq!(tree.children(a).unwrap(), &[leaves[1]]);
        assert_eq!(tree.children(b).unwrap(), &[leaves[0]]);
        assert_eq!(tree.parent(leaves[0]), Some(b));
    }

    #[test]
    fn test_add_existing_child_moves_it() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);

        tree.add_child_at(group, leaves[2], 0).unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[2], leaves[0], leaves[1]]);

        tree.add_child(group, leaves[2]).unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[0], leaves[1], leaves[2]]);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut tree = SceneTree::new();
        let outer = tree.create_group();
        let inner = tree.create_group();
        tree.add_child(outer, inner).unwrap();

        assert!(matches!(
            tree.add_child(inner, outer),
            Err(SceneError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.add_child(inner, inner),
            Err(SceneError::InvalidOperation(_))
        ));
        let stage = tree.stage();
        assert!(matches!(
            tree.add_child(inner, stage),
            Err(SceneError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_add_child_to_leaf_fails() {
        let mut tree = SceneTree::new();
        let leaf = tree.create_leaf();
        let other = tree.create_leaf();
        assert_eq!(tree.add_child(leaf, other), Err(SceneError::NotAGroup(leaf)));
    }

    #[test]
    fn test_remove_child_at_round_trip() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);
        let extra = tree.create_leaf();

        tree.add_child_at(group, extra, 1).unwrap();
        let removed = tree.remove_child_at(group, 1, false).unwrap();

        assert_eq!(removed, extra);
        assert_eq!(tree.parent(extra), None);
        assert!(tree.contains(extra));
        assert_eq!(tree.children(group).unwrap(), leaves.as_slice());
    }

    #[test]
    fn test_remove_child_at_with_dispose() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 2);

        tree.remove_child_at(group, 0, true).unwrap();

        assert!(!tree.contains(leaves[0]));
        assert_eq!(tree.children(group).unwrap(), &[leaves[1]]);
    }

    #[test]
    fn test_remove_child_at_rejects_out_of_range() {
        let mut tree = SceneTree::new();
        let (group, _) = group_with_leaves(&mut tree, 2);
        assert_eq!(
            tree.remove_child_at(group, 2, false),
            Err(SceneError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_remove_child_not_a_child() {
        let mut tree = SceneTree::new();
        let (group, _) = group_with_leaves(&mut tree, 1);
        let stranger = tree.create_leaf();
        assert_eq!(
            tree.remove_child(group, stranger, false),
            Err(SceneError::NotAChild {
                node: stranger,
                parent: group
            })
        );
    }

    #[test]
    fn test_remove_children_range() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 5);

        tree.remove_children(group, 1, 4, false).unwrap();

        assert_eq!(tree.children(group).unwrap(), &[leaves[0], leaves[4]]);
        assert!(leaves[1..4].iter().all(|&l| tree.parent(l).is_none()));
        assert!(tree.remove_children(group, 1, 3, false).is_err());
    }

    #[test]
    fn test_set_child_index_moves_and_clamps() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);

        tree.set_child_index(group, leaves[0], 10).unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[1], leaves[2], leaves[0]]);

        let stranger = tree.create_leaf();
        assert!(matches!(
            tree.set_child_index(group, stranger, 0),
            Err(SceneError::NotAChild { .. })
        ));
    }

    #[test]
    fn test_swap_children() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);

        tree.swap_children(group, leaves[0], leaves[2]).unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[2], leaves[1], leaves[0]]);

        tree.swap_children_at(group, 0, 1).unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[1], leaves[2], leaves[0]]);

        assert!(tree.swap_children_at(group, 0, 3).is_err());
    }

    #[test]
    fn test_change_children_order() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);

        tree.change_children_order(group, &[0, 2], &[leaves[2], leaves[0]])
            .unwrap();
        assert_eq!(tree.children(group).unwrap(), &[leaves[2], leaves[1], leaves[0]]);
    }

    #[test]
    fn test_change_children_order_rejects_strangers_and_duplicates() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 3);
        let stranger = tree.create_leaf();

        assert!(matches!(
            tree.change_children_order(group, &[0], &[stranger]),
            Err(SceneError::NotAChild { .. })
        ));
        assert!(matches!(
            tree.change_children_order(group, &[0], &[leaves[1]]),
            Err(SceneError::InvalidOperation(_))
        ));
        assert_eq!(tree.children(group).unwrap(), leaves.as_slice());
    }

    #[test]
    fn test_descendants_groups_after_children() {
        let mut tree = SceneTree::new();
        let root = tree.create_group();
        let a = tree.create_leaf();
        let inner = tree.create_group();
        let b = tree.create_leaf();
        let c = tree.create_leaf();
        tree.add_child(root, a).unwrap();
        tree.add_child(root, inner).unwrap();
        tree.add_child(inner, b).unwrap();
        tree.add_child(root, c).unwrap();

        assert_eq!(tree.descendants(root, false).unwrap(), vec![a, b, inner, c]);
        assert_eq!(tree.descendants(root, true).unwrap(), vec![c, b, inner, a]);
    }

    #[test]
    fn test_dispose_cascades_and_is_idempotent() {
        let mut tree = SceneTree::new();
        let outer = tree.create_group();
        let (inner, leaves) = group_with_leaves(&mut tree, 2);
        tree.add_child(outer, inner).unwrap();

        tree.dispose(inner);
        assert!(!tree.contains(inner));
        assert!(leaves.iter().all(|&l| !tree.contains(l)));
        assert!(tree.children(outer).unwrap().is_empty());

        tree.dispose(inner);
        assert!(tree.contains(outer));
    }

    #[test]
    fn test_stage_events_broadcast() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 1);
        assert!(tree.take_stage_events().is_empty());

        let stage = tree.stage();
        tree.add_child(stage, group).unwrap();
        assert_eq!(
            tree.take_stage_events(),
            vec![
                StageEvent::AddedToStage(group),
                StageEvent::AddedToStage(leaves[0]),
            ]
        );

        tree.remove_child(stage, group, false).unwrap();
        assert_eq!(
            tree.take_stage_events(),
            vec![
                StageEvent::RemovedFromStage(group),
                StageEvent::RemovedFromStage(leaves[0]),
            ]
        );
    }

    #[test]
    fn test_batching_dirty_stops_at_nearest_root() {
        let mut tree = SceneTree::new();
        let outer = tree.create_group();
        let root = tree.create_group();
        let inner = tree.create_group();
        tree.add_child(outer, root).unwrap();
        tree.add_child(root, inner).unwrap();

        tree.get_mut(root).unwrap().flags |= NodeFlags::BATCHING_ROOT;
        tree.get_mut(outer).unwrap().flags |= NodeFlags::BATCHING_ROOT;

        let leaf = tree.create_leaf();
        tree.add_child(inner, leaf).unwrap();

        assert!(tree.is_batching_dirty(root));
        assert!(!tree.is_batching_dirty(outer));
        assert!(!tree.is_batching_dirty(inner));
    }

    #[test]
    fn test_batching_dirty_without_root_is_noop() {
        let mut tree = SceneTree::new();
        let (group, leaves) = group_with_leaves(&mut tree, 1);
        tree.mark_batching_dirty(leaves[0]).unwrap();
        assert!(!tree.is_batching_dirty(group));
    }
}
