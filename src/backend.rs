//! Interface to the renderer that owns GPU resources.

use crate::clip::{ClipUniform, StencilState};
use crate::geometry::Rect;
use crate::node::{BlendFactors, MaterialId, MeshId};
use crate::transform::Transform;
use crate::tree::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawKind {
    /// Regular colored geometry
    Content,
    /// Mask geometry writing its stencil bit, no color
    MaskWrite,
    /// Mask geometry clearing its stencil bit after the masked content
    MaskErase,
}

/// One geometry submission, in final draw order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawSubmission {
    pub node: NodeId,
    pub kind: DrawKind,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub sorting_order: u32,
    pub world_transform: Transform,
    pub alpha: f32,
    pub grayed: bool,
}

/// Renderer driven by `UpdateContext::end`.
///
/// For every submission the context first sets blend, clip and stencil state,
/// then submits the geometry. Implementations may skip redundant state
/// changes.
pub trait RenderBackend {
    fn set_blend_factors(&mut self, factors: BlendFactors);

    /// `None` disables rect clipping.
    fn set_clip_uniform(&mut self, clip: Option<ClipUniform>);

    fn set_stencil_state(&mut self, state: StencilState);

    fn submit_geometry(&mut self, draw: &DrawSubmission);

    /// Render the subtree of `node` into its offscreen target.
    fn capture(&mut self, _node: NodeId, _bounds: Rect) {}
}

/// Everything a `RecordingBackend` was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Blend(BlendFactors),
    Clip(Option<ClipUniform>),
    Stencil(StencilState),
    Submit(DrawSubmission),
    Capture(NodeId, Rect),
}

/// Backend that records calls instead of rendering.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<BackendCall>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions in the order they were made.
    pub fn submissions(&self) -> Vec<DrawSubmission> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Submit(draw) => Some(*draw),
                _ => None,
            })
            .collect()
    }

    /// Nodes of content submissions, in order.
    pub fn drawn_nodes(&self) -> Vec<NodeId> {
        self.submissions()
            .into_iter()
            .filter(|draw| draw.kind == DrawKind::Content)
            .map(|draw| draw.node)
            .collect()
    }

    pub fn captures(&self) -> Vec<NodeId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Capture(node, _) => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// The stencil state in effect for each submission.
    pub fn stencil_per_submission(&self) -> Vec<(NodeId, DrawKind, StencilState)> {
        let mut current = StencilState::DISABLED;
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                BackendCall::Stencil(state) => current = *state,
                BackendCall::Submit(draw) => out.push((draw.node, draw.kind, current)),
                _ => {}
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn set_blend_factors(&mut self, factors: BlendFactors) {
        self.calls.push(BackendCall::Blend(factors));
    }

    fn set_clip_uniform(&mut self, clip: Option<ClipUniform>) {
        self.calls.push(BackendCall::Clip(clip));
    }

    fn set_stencil_state(&mut self, state: StencilState) {
        self.calls.push(BackendCall::Stencil(state));
    }

    fn submit_geometry(&mut self, draw: &DrawSubmission) {
        self.calls.push(BackendCall::Submit(*draw));
    }

    fn capture(&mut self, node: NodeId, bounds: Rect) {
        self.calls.push(BackendCall::Capture(node, bounds));
    }
}
