#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transform of a glTF node, either explicit TRS fields or a column-major
/// 4x4 matrix. glTF never specifies both.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTransform {
    Trs {
        translation: [f32; 3],
        /// xyzw quaternion.
        rotation: [f32; 4],
        scale: [f32; 3],
    },
    Matrix([f32; 16]),
}

impl Default for NodeTransform {
    fn default() -> Self {
        NodeTransform::Trs {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

/// One entry of the glTF node array.
///
/// Mesh, camera, light and skin references are plain indices into the
/// document's respective arrays; out-of-range values are tolerated and
/// degrade to "no attachment" during graph construction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct NodeDescriptor {
    pub name: Option<String>,
    pub transform: NodeTransform,
    /// Child node indices, in glTF order.
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    pub light: Option<usize>,
    pub skin: Option<usize>,
    /// Morph target weights of the attached mesh.
    pub weights: Vec<f32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct SkinDescriptor {
    pub name: Option<String>,
    /// Joint node indices.
    pub joints: Vec<usize>,
}

/// A parsed glTF document, reduced to what the graph build needs.
///
/// The document is treated as an immutable external value; how it was parsed
/// from JSON or GLB bytes is not this crate's concern. Mesh, camera and
/// light payloads are never inspected, only their array lengths are kept so
/// references can be validated.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct GltfDocument {
    pub nodes: Vec<NodeDescriptor>,
    pub skins: Vec<SkinDescriptor>,
    /// Root-level node indices of the scene to import.
    pub scene_roots: Vec<usize>,
    pub mesh_count: usize,
    pub camera_count: usize,
    pub light_count: usize,
}

impl GltfDocument {
    pub fn new() -> Self {
        Self::default()
    }
}
