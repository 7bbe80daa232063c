//! Node storage types.
//!
//! A `Node` is either a leaf or a group. Both carry the same transform and
//! visual state; groups additionally own an ordered child list and the clip,
//! mask and batching state that makes them batching roots. Nodes live in the
//! `SceneTree` arena and are referenced by `NodeId`.

mod bounds;
mod flags;
mod graphics;
mod properties;

pub use flags::NodeFlags;
pub use graphics::{BlendFactor, BlendFactors, BlendMode, Graphics, MaterialId, MaterialKey, MeshId};

use crate::geometry::{Point, Rect};
use crate::hit_test::HitArea;
use crate::pivot::Pivot;
use crate::tree::NodeId;

/// Per-edge softness of a clip rect, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Softness {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Softness {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn uniform(amount: f32) -> Self {
        Self::new(amount, amount, amount, amount)
    }

    pub fn is_zero(&self) -> bool {
        self.left <= 0.0 && self.top <= 0.0 && self.right <= 0.0 && self.bottom <= 0.0
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Leaf,
    Group(GroupData),
}

/// Child list and clip/mask/batching state of a group.
#[derive(Debug)]
pub struct GroupData {
    pub(crate) children: Vec<NodeId>,
    pub(crate) clip_rect: Option<Rect>,
    pub(crate) clip_softness: Option<Softness>,
    pub(crate) mask: Option<NodeId>,
    pub(crate) reversed_mask: bool,
    /// Flattened draw sequence; valid while the group is a batching root and
    /// no batching pass is pending.
    pub(crate) descendants: Vec<NodeId>,
    pub(crate) touch_children: bool,
    pub(crate) opaque: bool,
}

impl GroupData {
    pub(crate) fn new() -> Self {
        Self {
            children: Vec::new(),
            clip_rect: None,
            clip_softness: None,
            mask: None,
            reversed_mask: false,
            descendants: Vec::new(),
            touch_children: true,
            opaque: false,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn clip_rect(&self) -> Option<Rect> {
        self.clip_rect
    }

    pub fn clip_softness(&self) -> Option<Softness> {
        self.clip_softness
    }

    pub fn mask(&self) -> Option<NodeId> {
        self.mask
    }

    pub fn reversed_mask(&self) -> bool {
        self.reversed_mask
    }

    pub fn descendants(&self) -> &[NodeId] {
        &self.descendants
    }

    pub fn touch_children(&self) -> bool {
        self.touch_children
    }

    pub fn opaque(&self) -> bool {
        self.opaque
    }
}

/// A node in the scene tree, containing its visual state and tree links.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: Option<String>,
    /// Parent group (None for the stage and detached nodes)
    pub(crate) parent: Option<NodeId>,
    pub(crate) flags: NodeFlags,

    pub(crate) position: Point,
    pub(crate) scale_x: f32,
    pub(crate) scale_y: f32,
    /// Degrees, clockwise on a y-down screen
    pub(crate) rotation: f32,
    pub(crate) skew_x: f32,
    pub(crate) skew_y: f32,
    pub(crate) pivot: Pivot,
    /// `pivot` resolved against `content_rect`
    pub(crate) pivot_offset: Point,
    pub(crate) content_rect: Rect,

    pub(crate) visible: bool,
    pub(crate) touchable: bool,
    pub(crate) alpha: f32,
    pub(crate) grayed: bool,
    pub(crate) blend_mode: BlendMode,
    pub(crate) graphics: Option<Graphics>,
    pub(crate) hit_area: Option<Box<dyn HitArea>>,

    pub(crate) render_order: u32,
    /// Slot of the stencil eraser draw when this node is an active mask
    pub(crate) eraser_order: u32,
    /// Bounds relative to the batching root that last collected this node
    pub(crate) outline: Option<Rect>,
    /// Material state resolved during the last update
    pub(crate) batch_key: Option<MaterialKey>,
    /// Group using this node as its mask
    pub(crate) mask_owner: Option<NodeId>,
    /// Bitmask of painting-mode requestors
    pub(crate) painting_mode: u32,

    pub(crate) kind: NodeKind,
    /// Back-pointer to sparse array index (for swap-remove fixup)
    pub(crate) sparse_index: u32,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, sparse_index: u32) -> Self {
        Self {
            name: None,
            parent: None,
            flags: NodeFlags::OUTLINE_CHANGED,
            position: Point::ZERO,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            pivot: Pivot::TOP_LEFT,
            pivot_offset: Point::ZERO,
            content_rect: Rect::ZERO,
            visible: true,
            touchable: true,
            alpha: 1.0,
            grayed: false,
            blend_mode: BlendMode::Normal,
            graphics: None,
            hit_area: None,
            render_order: 0,
            eraser_order: 0,
            outline: None,
            batch_key: None,
            mask_owner: None,
            painting_mode: 0,
            kind,
            sparse_index,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn group(&self) -> Option<&GroupData> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Leaf => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut GroupData> {
        match &mut self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Leaf => None,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn scale(&self) -> (f32, f32) {
        (self.scale_x, self.scale_y)
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn skew(&self) -> (f32, f32) {
        (self.skew_x, self.skew_y)
    }

    pub fn pivot(&self) -> Pivot {
        self.pivot
    }

    pub fn pivot_offset(&self) -> Point {
        self.pivot_offset
    }

    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_touchable(&self) -> bool {
        self.touchable
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_grayed(&self) -> bool {
        self.grayed
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn graphics(&self) -> Option<Graphics> {
        self.graphics
    }

    pub fn hit_area(&self) -> Option<&dyn HitArea> {
        self.hit_area.as_deref()
    }

    pub fn render_order(&self) -> u32 {
        self.render_order
    }

    pub fn eraser_order(&self) -> u32 {
        self.eraser_order
    }

    pub fn outline(&self) -> Option<Rect> {
        self.outline
    }

    pub fn batch_key(&self) -> Option<MaterialKey> {
        self.batch_key
    }

    pub fn mask_owner(&self) -> Option<NodeId> {
        self.mask_owner
    }

    pub fn is_batching_root(&self) -> bool {
        self.flags.contains(NodeFlags::BATCHING_ROOT)
    }

    pub fn is_batching_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::BATCHING_REQUESTED)
    }

    pub fn is_painting(&self) -> bool {
        self.painting_mode != 0
    }

    /// True when the transform collapses one axis to nothing.
    pub fn has_zero_scale(&self) -> bool {
        self.scale_x == 0.0 || self.scale_y == 0.0
    }

    pub(crate) fn has_rotation_or_skew(&self) -> bool {
        self.rotation != 0.0 || self.skew_x != 0.0 || self.skew_y != 0.0
    }
}
