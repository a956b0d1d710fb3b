//! Converts a parsed glTF document's flat node array into a virtual-node
//! forest: one tree model unifying glTF nodes, synthesized roots and bone
//! pseudo-nodes, plus per-bone rest/pose decomposition records.
//!
//! The forest is built fully, in one pass, before anything consumes it; host
//! object creation is left to a [`Materialize`] adapter.

mod document;
mod graph;
mod materialize;
mod skeleton;

pub use document::*;
pub use graph::*;
pub use materialize::*;

pub use vnode_math::{compose, decompose, DegenerateTransformError};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    /// The given id is not part of the graph. Programmer error, fatal to the
    /// call that used it.
    UnknownNodeId(VNodeId),
    /// Following parent edges never terminates; fatal to the whole build.
    GraphCycle,
    /// A matrix without a usable TRS factorization. Recoverable, the
    /// identity transform is substituted.
    DegenerateTransform,
    /// A skin whose joints cannot be resolved. Recoverable per mesh, the
    /// referencing nodes import unskinned.
    InvalidSkin(usize),
    /// An out-of-range mesh/camera/light/skin reference on a node.
    /// Recoverable, the single attachment degrades to none.
    MalformedReference(usize, usize),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            Self::UnknownNodeId(id) => format!("unknown node id: {}", id),
            Self::GraphCycle => String::from("node hierarchy contains a cycle"),
            Self::DegenerateTransform => String::from("transform matrix is degenerate"),
            Self::InvalidSkin(skin) => format!("skin {} has no usable joints", skin),
            Self::MalformedReference(node, index) => {
                format!("node {} references out-of-range index {}", node, index)
            }
        };

        write!(f, "{}", string)
    }
}

impl std::error::Error for SceneError {}

impl From<DegenerateTransformError> for SceneError {
    fn from(_: DegenerateTransformError) -> Self {
        Self::DegenerateTransform
    }
}
