use thiserror::Error;

use crate::tree::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Invalid child index {index} (group has {len} children)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Node {node:?} is not a child of {parent:?}")]
    NotAChild { node: NodeId, parent: NodeId },
    #[error("Node {0:?} is not a group")]
    NotAGroup(NodeId),
    #[error("Node {0:?} has been disposed")]
    Disposed(NodeId),
    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("Stencil masks nested deeper than {max} levels")]
    StencilDepthExceeded { max: u32 },
}

pub type Result<T> = std::result::Result<T, SceneError>;
