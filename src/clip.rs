//! Clip scopes and the backend state derived from them.
//!
//! A rect clip is expressed as a `clip_box` uniform: the shader computes
//! `clip_pos = world.xy * clip_box.zw + clip_box.xy` and discards fragments
//! where `abs(clip_pos) > 1`. Soft edges fade alpha over
//! `(1 - abs(clip_pos)) * softness`.
//!
//! Stencil masks claim one bit each of the 32-bit reference value, so nested
//! masks share one stencil buffer without clearing it between them.

use bytemuck::{Pod, Zeroable};

use crate::geometry::Rect;
use crate::node::Softness;
use crate::tree::NodeId;

/// `clip_box` value that clips everything (used for empty rects).
pub const CLIP_EVERYTHING: [f32; 4] = [2.0, 2.0, 0.0, 0.0];

/// State of one clip scope. The update context keeps the active one plus a
/// stack of the scopes it replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    /// Effective world-space clip rect (rect clips intersect with outer ones)
    pub rect: Rect,
    pub clip_box: [f32; 4],
    pub soft: bool,
    /// Per-edge falloff factors: left, top, right, bottom
    pub softness: [f32; 4],
    /// Group that opened this scope
    pub clip_id: Option<NodeId>,
    /// This scope was opened by a stencil mask rather than a clip rect
    pub is_stencil: bool,
    pub reversed_mask: bool,
    /// Stencil value content must match inside this scope
    pub stencil_compare: u32,
}

impl Default for ClipInfo {
    fn default() -> Self {
        Self {
            rect: Rect::ZERO,
            clip_box: [0.0, 0.0, 0.0, 0.0],
            soft: false,
            softness: [0.0; 4],
            clip_id: None,
            is_stencil: false,
            reversed_mask: false,
            stencil_compare: 0,
        }
    }
}

/// Uniform block uploaded for draws inside a rect clip.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ClipUniform {
    pub clip_box: [f32; 4],
    pub softness: [f32; 4],
}

/// `clip_box` for a world-space rect: `(-cx/hw, -cy/hh, 1/hw, 1/hh)`.
pub fn clip_box_for(rect: &Rect) -> [f32; 4] {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return CLIP_EVERYTHING;
    }
    let hw = rect.width * 0.5;
    let hh = rect.height * 0.5;
    let center = rect.center();
    [-center.x / hw, -center.y / hh, 1.0 / hw, 1.0 / hh]
}

/// Falloff factors for per-edge softness given in screen pixels.
///
/// Edges without softness get `hard_edge`, which makes the fade narrower
/// than a pixel.
pub fn softness_factors(
    rect: &Rect,
    softness: &Softness,
    pixels_per_unit: f32,
    hard_edge: f32,
) -> [f32; 4] {
    let hw = rect.width * 0.5 * pixels_per_unit;
    let hh = rect.height * 0.5 * pixels_per_unit;
    let factor = |half: f32, edge: f32| {
        if edge > 0.0 {
            half / edge
        } else {
            hard_edge
        }
    };
    [
        factor(hw, softness.left),
        factor(hh, softness.top),
        factor(hw, softness.right),
        factor(hh, softness.bottom),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always,
    Equal,
    NotEqual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Replace,
    Zero,
}

/// Stencil test and write configuration for one draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub compare: CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub pass_op: StencilOp,
    pub color_mask_enabled: bool,
}

impl StencilState {
    /// No stencil test.
    pub const DISABLED: Self = Self {
        compare: CompareFunction::Always,
        reference: 0,
        read_mask: 0,
        write_mask: 0,
        pass_op: StencilOp::Keep,
        color_mask_enabled: true,
    };

    /// Content inside the mask level whose bit is `bit`.
    pub fn content(bit: u32, expected: u32) -> Self {
        Self {
            compare: CompareFunction::Equal,
            reference: expected,
            read_mask: bit | (bit - 1),
            write_mask: 0,
            pass_op: StencilOp::Keep,
            color_mask_enabled: true,
        }
    }

    /// Mask geometry setting `bit` wherever all outer masks pass.
    pub fn mask_write(bit: u32, expected: u32) -> Self {
        let outer = expected & (bit - 1);
        Self {
            compare: CompareFunction::Equal,
            reference: outer | bit,
            read_mask: bit - 1,
            write_mask: bit,
            pass_op: StencilOp::Replace,
            color_mask_enabled: false,
        }
    }

    /// Mask geometry redrawn to clear `bit` after the masked content.
    pub fn mask_erase(bit: u32) -> Self {
        Self {
            compare: CompareFunction::Always,
            reference: 0,
            read_mask: 0,
            write_mask: bit,
            pass_op: StencilOp::Zero,
            color_mask_enabled: false,
        }
    }

    /// Content state for the scope described by `clip` with the given
    /// reference bit (0 when no mask is active).
    pub fn for_scope(bit: u32, clip: &ClipInfo) -> Self {
        if bit == 0 {
            Self::DISABLED
        } else {
            Self::content(bit, clip.stencil_compare)
        }
    }
}
