//! Renderable payload handles and blend state.
//!
//! Meshes and materials are owned by the backend; the scene only carries
//! opaque handles and compares them for batching.

use crate::tree::NodeId;

/// Backend mesh handle (vertices + indices).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// Backend material handle (shader + textures).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Graphics {
    pub mesh: MeshId,
    pub material: MaterialId,
}

impl Graphics {
    pub fn new(mesh: u32, material: u32) -> Self {
        Self {
            mesh: MeshId(mesh),
            material: MaterialId(material),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    None,
    Add,
    Multiply,
    Screen,
    Erase,
    Mask,
    Below,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFactors {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    /// Source color must be premultiplied by alpha before blending
    pub premultiply: bool,
}

impl BlendFactors {
    const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src,
            dst,
            premultiply: false,
        }
    }

    const fn premultiplied(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src,
            dst,
            premultiply: true,
        }
    }
}

impl BlendMode {
    pub fn factors(self) -> BlendFactors {
        use BlendFactor::*;
        match self {
            BlendMode::Normal => BlendFactors::new(SrcAlpha, OneMinusSrcAlpha),
            BlendMode::None => BlendFactors::new(One, One),
            BlendMode::Add => BlendFactors::new(SrcAlpha, One),
            BlendMode::Multiply => BlendFactors::premultiplied(DstColor, OneMinusSrcAlpha),
            BlendMode::Screen => BlendFactors::premultiplied(One, OneMinusSrcColor),
            BlendMode::Erase => BlendFactors::new(Zero, OneMinusSrcAlpha),
            BlendMode::Mask => BlendFactors::new(Zero, SrcAlpha),
            BlendMode::Below => BlendFactors::new(OneMinusDstAlpha, DstAlpha),
            BlendMode::Off => BlendFactors::new(One, Zero),
        }
    }
}

/// Everything that must match for two draws to share one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialKey {
    pub material: MaterialId,
    pub blend: BlendMode,
    pub grayed: bool,
    /// Group whose clip scope the draw was made under
    pub clip_id: Option<NodeId>,
    pub stencil_reference: u32,
}
