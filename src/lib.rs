//! Retained-mode 2D scene graph.
//!
//! Nodes live in a [`SceneTree`]. Once per frame the tree is walked with an
//! [`UpdateContext`], which tracks inherited alpha, clip rects and stencil
//! masks, records one draw per visible node, and submits them to a
//! [`RenderBackend`] in render order. Groups with fairy batching enabled
//! reorder their descendants so that draws sharing a material end up next
//! to each other.
//!
//! ```ignore
//! let mut tree = SceneTree::new();
//! let sprite = tree.create_leaf();
//! tree.set_size(sprite, 32.0, 32.0)?;
//! tree.set_graphics(sprite, Some(Graphics::new(mesh, material)))?;
//! tree.add_child(tree.stage(), sprite)?;
//!
//! let mut ctx = UpdateContext::new(StageConfig::default());
//! tree.render_frame(&mut ctx, &mut backend)?;
//! ```

pub mod backend;
mod batching;
pub mod clip;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod node;
pub mod pivot;
pub mod render_stats;
pub mod transform;
mod traversal;
pub mod tree;

pub use backend::{BackendCall, DrawKind, DrawSubmission, RecordingBackend, RenderBackend};
pub use config::StageConfig;
pub use context::{EndOfFrameTask, FrameStats, UpdateContext};
pub use error::{Result, SceneError};
pub use tree::{NodeId, SceneTree, StageEvent};

pub mod prelude {
    pub use crate::backend::{DrawKind, DrawSubmission, RecordingBackend, RenderBackend};
    pub use crate::clip::{ClipUniform, StencilState};
    pub use crate::geometry::{Point, Rect};
    pub use crate::hit_test::{HitArea, HitTestContext, RectHitArea};
    pub use crate::node::{BlendMode, Graphics, MaterialId, MeshId, NodeFlags, Softness};
    pub use crate::pivot::Pivot;
    pub use crate::transform::Transform;
    pub use crate::{
        FrameStats, NodeId, Result, SceneError, SceneTree, StageConfig, StageEvent, UpdateContext,
    };
}
