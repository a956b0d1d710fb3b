use crate::{GltfDocument, SceneError};
use std::collections::HashMap;
use vnode_math::*;
use vnode_utils::collections::SlotStorage;
use vnode_utils::log::info;

mod builder;

/// Identifies a virtual node: either a glTF node, or one of the nodes the
/// builder synthesizes when the document has no suitable node itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VNodeId {
    /// Index into the document's node array.
    Node(usize),
    /// Synthesized armature root for the given skin index.
    Armature(usize),
    /// Synthesized root above multiple root-level nodes.
    Root,
}

impl std::fmt::Display for VNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(index) => write!(f, "node {}", index),
            Self::Armature(skin) => write!(f, "armature of skin {}", skin),
            Self::Root => write!(f, "scene root"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Bone,
    DummyRoot,
}

/// Rest/pose decomposition of a bone, in armature space.
///
/// `rest_matrix` composed with the pose TRS reproduces the bone node's
/// original local transform; consumers with a single-layer skeleton model can
/// ignore the pose fields and apply the node TRS directly.
#[derive(Debug, Clone)]
pub struct BoneData {
    /// Full armature-space rest matrix, scale included.
    pub arma_mat: Mat4,
    /// `arma_mat` restricted to translation and rotation.
    pub rest_matrix: Mat4,
    pub rest_translation: Vec3,
    pub rest_rotation: Quat,
    /// `arma_mat` applied to the origin.
    pub head: Vec3,
    /// `arma_mat` applied to the unit Y point.
    pub tail: Vec3,
    /// |tail - head|, clamped away from zero.
    pub length: f32,
    /// Armature-space direction the bone's local Z axis maps to; fixes the
    /// bone's twist around the head-tail axis.
    pub roll_target: Vec3,
    pub pose_translation: Vec3,
    pub pose_rotation: Quat,
    pub pose_scale: Vec3,
}

/// Identity of a materialized mesh for adapter-side instancing.
///
/// Two nodes with equal keys may share one host mesh. Weights are compared
/// bit-exact so the key is hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshCacheKey {
    pub mesh: usize,
    pub skin: Option<usize>,
    weights: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct VNode {
    pub(crate) id: VNodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) parent: Option<VNodeId>,
    pub(crate) children: Vec<VNodeId>,
    pub(crate) translation: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    pub(crate) is_arma: bool,
    pub(crate) bone_arma: Option<VNodeId>,
    pub(crate) mesh: Option<usize>,
    pub(crate) camera: Option<usize>,
    pub(crate) light: Option<usize>,
    pub(crate) skin: Option<usize>,
    pub(crate) weights: Vec<f32>,
    pub(crate) bone: Option<BoneData>,
    pub(crate) object_handle: Option<u32>,
}

impl Default for VNode {
    fn default() -> Self {
        Self {
            id: VNodeId::Root,
            kind: NodeKind::Object,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            is_arma: false,
            bone_arma: None,
            mesh: None,
            camera: None,
            light: None,
            skin: None,
            weights: Vec::new(),
            bone: None,
            object_handle: None,
        }
    }
}

impl VNode {
    pub fn id(&self) -> VNodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// glTF node name, or a deterministic default for unnamed and
    /// synthesized nodes.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<VNodeId> {
        self.parent
    }

    /// Children in glTF order; synthesized children come last.
    pub fn children(&self) -> &[VNodeId] {
        &self.children
    }

    /// Local TRS, resolved once at build time from either the explicit TRS
    /// fields or the node matrix.
    pub fn trs(&self) -> (Vec3, Quat, Vec3) {
        (self.translation, self.rotation, self.scale)
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Whether this node is the root of a bone hierarchy.
    pub fn is_armature_root(&self) -> bool {
        self.is_arma
    }

    /// For bones, the armature root that owns this bone.
    pub fn bone_armature(&self) -> Option<VNodeId> {
        self.bone_arma
    }

    pub fn mesh(&self) -> Option<usize> {
        self.mesh
    }

    pub fn camera(&self) -> Option<usize> {
        self.camera
    }

    pub fn light(&self) -> Option<usize> {
        self.light
    }

    pub fn skin(&self) -> Option<usize> {
        self.skin
    }

    pub fn morph_weights(&self) -> &[f32] {
        &self.weights
    }

    /// Rest/pose records; `Some` for every bone once the graph is built.
    pub fn bone(&self) -> Option<&BoneData> {
        self.bone.as_ref()
    }

    /// Handle written by the materialization driver, `None` before.
    pub fn object_handle(&self) -> Option<u32> {
        self.object_handle
    }

    /// Key an adapter may memoize created meshes under, `None` for nodes
    /// without a mesh.
    pub fn mesh_cache_key(&self) -> Option<MeshCacheKey> {
        self.mesh.map(|mesh| MeshCacheKey {
            mesh,
            skin: self.skin,
            weights: self.weights.iter().map(|w| w.to_bits()).collect(),
        })
    }
}

/// The virtual-node forest built from one [`GltfDocument`].
///
/// Immutable after construction except for the object handles written by
/// the materialization driver.
#[derive(Debug, Clone)]
pub struct VNodeGraph {
    pub(crate) nodes: SlotStorage<VNode>,
    pub(crate) slots: HashMap<VNodeId, usize>,
    pub(crate) root: VNodeId,
    pub(crate) skin_errors: Vec<(usize, SceneError)>,
}

impl VNodeGraph {
    /// Builds the full forest: one virtual node per glTF node, skins marked,
    /// a dummy root synthesized when needed, and bone rest/pose records
    /// resolved. Only structural faults (a cyclic hierarchy) fail the build;
    /// everything local to one node or attachment degrades and is logged.
    pub fn from_document(document: &GltfDocument) -> Result<Self, SceneError> {
        let mut graph = builder::build(document)?;
        crate::skeleton::resolve(&mut graph);

        info!(
            "built vnode graph: {} nodes, {} armatures",
            graph.len(),
            graph.armatures().count()
        );

        Ok(graph)
    }

    /// Entry point of the forest: the single root-level node, or the
    /// synthesized dummy root.
    pub fn root(&self) -> VNodeId {
        self.root
    }

    pub(crate) fn slot(&self, id: VNodeId) -> Result<usize, SceneError> {
        match self.slots.get(&id) {
            Some(slot) => Ok(*slot),
            None => Err(SceneError::UnknownNodeId(id)),
        }
    }

    pub fn get(&self, id: VNodeId) -> Result<&VNode, SceneError> {
        Ok(&self.nodes[self.slot(id)?])
    }

    pub fn children_of(&self, id: VNodeId) -> Result<&[VNodeId], SceneError> {
        Ok(self.get(id)?.children())
    }

    pub fn trs_of(&self, id: VNodeId) -> Result<(Vec3, Quat, Vec3), SceneError> {
        Ok(self.get(id)?.trs())
    }

    /// Total node count, synthesized nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VNode> {
        self.nodes.iter().map(|(_, node)| node)
    }

    /// Ids of all armature roots.
    pub fn armatures(&self) -> impl Iterator<Item = VNodeId> + '_ {
        self.iter()
            .filter(|node| node.is_arma)
            .map(|node| node.id)
    }

    /// Bones owned by an armature root, pre-order, parents before children.
    /// Bones of an armature nested inside this one belong to that armature
    /// and are not listed here. Unknown ids yield an empty list.
    pub fn bones_of(&self, armature: VNodeId) -> Vec<VNodeId> {
        let mut bones = Vec::new();
        let mut stack: Vec<VNodeId> = match self.slots.get(&armature) {
            Some(&slot) => self.nodes[slot].children.iter().rev().copied().collect(),
            None => return bones,
        };

        while let Some(id) = stack.pop() {
            let node = &self.nodes[self.slots[&id]];
            if node.kind == NodeKind::Bone && node.bone_arma == Some(armature) {
                bones.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }

        bones
    }

    /// Skins that were dropped during the build, with the reason. The
    /// referencing nodes imported unskinned.
    pub fn skin_errors(&self) -> &[(usize, SceneError)] {
        &self.skin_errors
    }
}
