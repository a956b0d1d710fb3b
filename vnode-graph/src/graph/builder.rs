use super::{NodeKind, VNode, VNodeGraph, VNodeId};
use crate::{GltfDocument, NodeTransform, SceneError, SkinDescriptor};
use std::collections::HashMap;
use vnode_math::{Mat4, Quat, Vec3};
use vnode_utils::collections::SlotStorage;
use vnode_utils::log::warn;

/// Turns the document's flat node array into the virtual-node forest.
///
/// Faults local to one node or attachment degrade and are logged; only a
/// cyclic hierarchy fails the whole build.
pub(crate) fn build(doc: &GltfDocument) -> Result<VNodeGraph, SceneError> {
    let mut graph = VNodeGraph {
        nodes: SlotStorage::with_capacity(doc.nodes.len() + 1),
        slots: HashMap::with_capacity(doc.nodes.len() + 1),
        root: VNodeId::Root,
        skin_errors: Vec::new(),
    };

    create_nodes(&mut graph, doc);
    wire_children(&mut graph, doc)?;
    mark_skins(&mut graph, doc);
    attach_root(&mut graph, doc);

    Ok(graph)
}

fn create_nodes(graph: &mut VNodeGraph, doc: &GltfDocument) {
    for (index, desc) in doc.nodes.iter().enumerate() {
        let (translation, rotation, scale) = resolve_trs(index, &desc.transform);
        let node = VNode {
            id: VNodeId::Node(index),
            name: desc
                .name
                .clone()
                .unwrap_or_else(|| format!("Node_{}", index)),
            translation,
            rotation,
            scale,
            mesh: checked_reference(index, desc.mesh, doc.mesh_count, "mesh"),
            camera: checked_reference(index, desc.camera, doc.camera_count, "camera"),
            light: checked_reference(index, desc.light, doc.light_count, "light"),
            skin: checked_reference(index, desc.skin, doc.skins.len(), "skin"),
            weights: desc.weights.clone(),
            ..Default::default()
        };

        let slot = graph.nodes.push(node);
        graph.slots.insert(VNodeId::Node(index), slot);
    }
}

fn wire_children(graph: &mut VNodeGraph, doc: &GltfDocument) -> Result<(), SceneError> {
    for (index, desc) in doc.nodes.iter().enumerate() {
        for &child in &desc.children {
            if child >= doc.nodes.len() || child == index {
                warn!("{}", SceneError::MalformedReference(index, child));
                continue;
            }

            let child_slot = graph.slots[&VNodeId::Node(child)];
            if graph.nodes[child_slot].parent.is_some() {
                warn!(
                    "node {} already has a parent, dropping edge from node {}",
                    child, index
                );
                continue;
            }

            graph.nodes[child_slot].parent = Some(VNodeId::Node(index));
            let slot = graph.slots[&VNodeId::Node(index)];
            graph.nodes[slot].children.push(VNodeId::Node(child));
        }
    }

    // Every node on a cycle has a parent, so cycles are exactly the nodes
    // unreachable from the parentless set. Each node has at most one parent,
    // so nothing is pushed twice.
    let mut stack: Vec<usize> = (0..doc.nodes.len())
        .filter(|i| graph.nodes[graph.slots[&VNodeId::Node(*i)]].parent.is_none())
        .collect();
    let mut visited = 0;
    while let Some(index) = stack.pop() {
        visited += 1;
        let slot = graph.slots[&VNodeId::Node(index)];
        for &child in graph.nodes[slot].children.iter() {
            if let VNodeId::Node(child) = child {
                stack.push(child);
            }
        }
    }

    if visited != doc.nodes.len() {
        return Err(SceneError::GraphCycle);
    }

    Ok(())
}

fn mark_skins(graph: &mut VNodeGraph, doc: &GltfDocument) {
    for (index, skin) in doc.skins.iter().enumerate() {
        let users: Vec<usize> = (0..doc.nodes.len())
            .filter(|i| graph.nodes[graph.slots[&VNodeId::Node(*i)]].skin == Some(index))
            .collect();
        if users.is_empty() {
            continue;
        }

        if let Err(err) = mark_skin(graph, doc, index, skin) {
            warn!("skin {} dropped, meshes import unskinned: {}", index, err);
            for user in users {
                let slot = graph.slots[&VNodeId::Node(user)];
                graph.nodes[slot].skin = None;
            }
            graph.skin_errors.push((index, err));
        }
    }
}

fn mark_skin(
    graph: &mut VNodeGraph,
    doc: &GltfDocument,
    index: usize,
    skin: &SkinDescriptor,
) -> Result<(), SceneError> {
    if skin.joints.is_empty() || skin.joints.iter().any(|&j| j >= doc.nodes.len()) {
        return Err(SceneError::InvalidSkin(index));
    }

    let arma = match armature_root(graph, skin) {
        Some(id) => id,
        None => synthesize_armature(graph, index, skin),
    };

    let arma_slot = graph.slots[&arma];
    graph.nodes[arma_slot].is_arma = true;

    for &joint in &skin.joints {
        let slot = graph.slots[&VNodeId::Node(joint)];
        let node = &mut graph.nodes[slot];
        node.kind = NodeKind::Bone;
        if node.bone_arma.is_none() {
            node.bone_arma = Some(arma);
        }
    }

    Ok(())
}

fn path_from_root(graph: &VNodeGraph, id: VNodeId) -> Vec<VNodeId> {
    let mut path = vec![id];
    let mut current = id;
    while let Some(parent) = graph.nodes[graph.slots[&current]].parent {
        path.push(parent);
        current = parent;
    }
    path.reverse();
    path
}

/// Deepest common ancestor of the skin's joints that can carry the armature:
/// not a joint or bone itself and free of attachments (`is_arma` stays
/// mutually exclusive with mesh/camera/light/skin). Existing armature roots
/// are reused so skins can share one armature.
fn armature_root(graph: &VNodeGraph, skin: &SkinDescriptor) -> Option<VNodeId> {
    let mut paths = skin
        .joints
        .iter()
        .map(|&joint| path_from_root(graph, VNodeId::Node(joint)));

    let mut prefix = paths.next()?;
    for path in paths {
        let common = prefix
            .iter()
            .zip(path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(common);
    }

    while let Some(candidate) = prefix.pop() {
        let node = &graph.nodes[graph.slots[&candidate]];
        if node.is_arma {
            return Some(candidate);
        }

        let is_joint = match candidate {
            VNodeId::Node(i) => skin.joints.contains(&i),
            _ => false,
        };
        let attached = node.mesh.is_some()
            || node.camera.is_some()
            || node.light.is_some()
            || node.skin.is_some();
        if node.kind == NodeKind::Object && !is_joint && !attached {
            return Some(candidate);
        }
    }

    None
}

/// No glTF node qualifies as the armature root (joints spread over
/// disconnected trees, or every common ancestor is taken): create one and
/// reparent the joints' root-level ancestors under it.
fn synthesize_armature(graph: &mut VNodeGraph, index: usize, skin: &SkinDescriptor) -> VNodeId {
    let id = VNodeId::Armature(index);
    let name = skin
        .name
        .clone()
        .unwrap_or_else(|| format!("Armature_{}", index));

    let slot = graph.nodes.push(VNode {
        id,
        name,
        ..Default::default()
    });
    graph.slots.insert(id, slot);

    for &joint in &skin.joints {
        let top = path_from_root(graph, VNodeId::Node(joint))[0];
        if top == id {
            continue;
        }
        let top_slot = graph.slots[&top];
        graph.nodes[top_slot].parent = Some(id);
        graph.nodes[slot].children.push(top);
    }

    id
}

fn attach_root(graph: &mut VNodeGraph, doc: &GltfDocument) {
    let mut roots: Vec<VNodeId> = Vec::new();
    for &index in &doc.scene_roots {
        if index >= doc.nodes.len() {
            warn!("scene root index {} is out of range", index);
            continue;
        }
        // A scene root may have been captured by a synthesized armature;
        // its tree's top node stands in for it then.
        let top = path_from_root(graph, VNodeId::Node(index))[0];
        if !roots.contains(&top) {
            roots.push(top);
        }
    }

    // Synthesized armatures whose joints live outside the scene's root set.
    let orphans: Vec<VNodeId> = graph
        .iter()
        .filter(|node| node.parent.is_none() && matches!(node.id, VNodeId::Armature(_)))
        .map(|node| node.id)
        .filter(|id| !roots.contains(id))
        .collect();
    roots.extend(orphans);

    if roots.len() == 1 {
        graph.root = roots[0];
        return;
    }

    // Guarantees callers a single entry point; never materialized.
    let slot = graph.nodes.push(VNode {
        id: VNodeId::Root,
        kind: NodeKind::DummyRoot,
        name: String::from("Root"),
        children: roots.clone(),
        ..Default::default()
    });
    graph.slots.insert(VNodeId::Root, slot);

    for id in roots {
        let child_slot = graph.slots[&id];
        graph.nodes[child_slot].parent = Some(VNodeId::Root);
    }
    graph.root = VNodeId::Root;
}

fn resolve_trs(index: usize, transform: &NodeTransform) -> (Vec3, Quat, Vec3) {
    match transform {
        NodeTransform::Trs {
            translation,
            rotation,
            scale,
        } => (
            Vec3::from(*translation),
            unit_quat(index, *rotation),
            Vec3::from(*scale),
        ),
        NodeTransform::Matrix(columns) => {
            match vnode_math::decompose(Mat4::from_cols_array(columns)) {
                Ok(trs) => trs,
                Err(err) => {
                    warn!("node {}: {}, falling back to identity", index, err);
                    (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
                }
            }
        }
    }
}

fn unit_quat(index: usize, rotation: [f32; 4]) -> Quat {
    let q = Quat::from_array(rotation);
    if q.is_finite() && q.length_squared() > 1e-12 {
        q.normalize()
    } else {
        warn!("node {}: unusable rotation quaternion, using identity", index);
        Quat::IDENTITY
    }
}

fn checked_reference(node: usize, reference: Option<usize>, len: usize, what: &str) -> Option<usize> {
    match reference {
        Some(index) if index < len => Some(index),
        Some(index) => {
            warn!(
                "{}, dropping the {} attachment",
                SceneError::MalformedReference(node, index),
                what
            );
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeDescriptor;

    fn node(children: Vec<usize>) -> NodeDescriptor {
        NodeDescriptor {
            children,
            ..Default::default()
        }
    }

    fn translated(children: Vec<usize>, translation: [f32; 3]) -> NodeDescriptor {
        NodeDescriptor {
            children,
            transform: NodeTransform::Trs {
                translation,
                rotation: [0.0, 0.0, 0.0, 1.0],
                scale: [1.0; 3],
            },
            ..Default::default()
        }
    }

    fn assert_forest(graph: &VNodeGraph) {
        // No id may be its own ancestor.
        for node in graph.iter() {
            let mut current = node.parent;
            let mut steps = 0;
            while let Some(parent) = current {
                assert_ne!(parent, node.id, "{} is its own ancestor", node.id);
                current = graph.get(parent).unwrap().parent;
                steps += 1;
                assert!(steps <= graph.len(), "parent chain of {} diverges", node.id);
            }
        }
    }

    #[test]
    fn one_vnode_per_node() {
        let doc = GltfDocument {
            nodes: vec![node(vec![1, 2]), node(vec![]), node(vec![])],
            scene_roots: vec![0],
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.root(), VNodeId::Node(0));
        assert_eq!(
            graph.children_of(VNodeId::Node(0)).unwrap(),
            &[VNodeId::Node(1), VNodeId::Node(2)]
        );
        assert_forest(&graph);
    }

    #[test]
    fn multiple_roots_get_one_dummy_root() {
        let doc = GltfDocument {
            nodes: vec![node(vec![]), node(vec![]), node(vec![])],
            scene_roots: vec![0, 1, 2],
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        // Exactly one vnode per input node plus one dummy root.
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.root(), VNodeId::Root);

        let root = graph.get(VNodeId::Root).unwrap();
        assert_eq!(root.kind(), NodeKind::DummyRoot);
        assert_eq!(
            root.children(),
            &[VNodeId::Node(0), VNodeId::Node(1), VNodeId::Node(2)]
        );
        for i in 0..3 {
            assert_eq!(
                graph.get(VNodeId::Node(i)).unwrap().parent(),
                Some(VNodeId::Root)
            );
        }
        assert_forest(&graph);
    }

    #[test]
    fn cycle_is_fatal() {
        let doc = GltfDocument {
            nodes: vec![node(vec![1]), node(vec![2]), node(vec![0])],
            scene_roots: vec![0],
            ..Default::default()
        };
        assert_eq!(
            VNodeGraph::from_document(&doc).unwrap_err(),
            SceneError::GraphCycle
        );
    }

    #[test]
    fn malformed_child_edges_are_dropped() {
        // Child 9 is out of range; the second edge to 1 repeats a parent.
        let doc = GltfDocument {
            nodes: vec![node(vec![1, 9, 1]), node(vec![])],
            scene_roots: vec![0],
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        assert_eq!(
            graph.children_of(VNodeId::Node(0)).unwrap(),
            &[VNodeId::Node(1)]
        );
        assert_forest(&graph);
    }

    #[test]
    fn skin_marks_joints_and_armature() {
        // Joints 2, 5, 7 all hang off node 1; node 1 becomes the armature.
        let mut nodes = vec![node(vec![]); 8];
        nodes[0] = node(vec![1]);
        nodes[1] = node(vec![2, 5, 7]);
        nodes[3] = NodeDescriptor {
            mesh: Some(0),
            skin: Some(0),
            ..Default::default()
        };
        let doc = GltfDocument {
            nodes,
            skins: vec![SkinDescriptor {
                name: None,
                joints: vec![2, 5, 7],
            }],
            scene_roots: vec![0, 3],
            mesh_count: 1,
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        let arma = graph.get(VNodeId::Node(1)).unwrap();
        assert!(arma.is_armature_root());
        assert_eq!(arma.kind(), NodeKind::Object);

        for &joint in &[2usize, 5, 7] {
            let bone = graph.get(VNodeId::Node(joint)).unwrap();
            assert_eq!(bone.kind(), NodeKind::Bone);
            assert_eq!(bone.bone_armature(), Some(VNodeId::Node(1)));
        }
        assert!(graph.skin_errors().is_empty());
        assert_forest(&graph);
    }

    #[test]
    fn armature_candidate_skips_attached_ancestors() {
        let mut mesh_node = node(vec![2]);
        mesh_node.mesh = Some(0);
        let doc = GltfDocument {
            nodes: vec![node(vec![1]), mesh_node, node(vec![])],
            skins: vec![SkinDescriptor {
                name: None,
                joints: vec![2],
            }],
            scene_roots: vec![0],
            mesh_count: 1,
            ..Default::default()
        };
        let mut with_user = doc;
        with_user.nodes[1].skin = Some(0);
        let graph = VNodeGraph::from_document(&with_user).unwrap();

        // Node 1 carries a mesh, so the armature moves up to node 0.
        assert!(graph.get(VNodeId::Node(0)).unwrap().is_armature_root());
        assert!(!graph.get(VNodeId::Node(1)).unwrap().is_armature_root());
        assert_forest(&graph);
    }

    #[test]
    fn disconnected_joints_get_synthesized_armature() {
        let mut user = node(vec![]);
        user.mesh = Some(0);
        user.skin = Some(0);
        let doc = GltfDocument {
            nodes: vec![node(vec![]), node(vec![]), user],
            skins: vec![SkinDescriptor {
                name: None,
                joints: vec![0, 1],
            }],
            scene_roots: vec![0, 1, 2],
            mesh_count: 1,
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        let arma = graph.get(VNodeId::Armature(0)).unwrap();
        assert!(arma.is_armature_root());
        assert_eq!(arma.children(), &[VNodeId::Node(0), VNodeId::Node(1)]);

        for &joint in &[0usize, 1] {
            let bone = graph.get(VNodeId::Node(joint)).unwrap();
            assert_eq!(bone.kind(), NodeKind::Bone);
            assert_eq!(bone.bone_armature(), Some(VNodeId::Armature(0)));
        }

        // The armature stands in for its captured scene roots under the
        // dummy root.
        let root = graph.get(VNodeId::Root).unwrap();
        assert_eq!(root.children(), &[VNodeId::Armature(0), VNodeId::Node(2)]);
        assert_forest(&graph);
    }

    #[test]
    fn out_of_range_mesh_degrades_to_no_attachment() {
        let mut broken = node(vec![]);
        broken.mesh = Some(99);
        let doc = GltfDocument {
            nodes: vec![node(vec![1]), broken],
            scene_roots: vec![0],
            mesh_count: 2,
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        assert_eq!(graph.get(VNodeId::Node(1)).unwrap().mesh(), None);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn empty_joint_list_drops_the_skin_only() {
        let mut skinned = node(vec![]);
        skinned.mesh = Some(0);
        skinned.skin = Some(0);
        let doc = GltfDocument {
            nodes: vec![node(vec![1]), skinned, node(vec![])],
            skins: vec![SkinDescriptor {
                name: None,
                joints: vec![],
            }],
            scene_roots: vec![0, 2],
            mesh_count: 1,
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        assert_eq!(graph.skin_errors(), &[(0, SceneError::InvalidSkin(0))]);
        // The mesh still imports, unskinned; unrelated nodes are untouched.
        let skinned = graph.get(VNodeId::Node(1)).unwrap();
        assert_eq!(skinned.mesh(), Some(0));
        assert_eq!(skinned.skin(), None);
        assert_eq!(graph.get(VNodeId::Node(2)).unwrap().kind(), NodeKind::Object);
        assert_eq!(graph.armatures().count(), 0);
    }

    #[test]
    fn intermediate_transforms_reach_deep_bones() {
        let mut user = node(vec![]);
        user.mesh = Some(0);
        user.skin = Some(0);
        let doc = GltfDocument {
            nodes: vec![
                node(vec![1, 2, 4]),
                translated(vec![], [1.0, 0.0, 0.0]),
                translated(vec![3], [0.0, 2.0, 0.0]),
                translated(vec![], [0.0, 0.0, 3.0]),
                user,
            ],
            skins: vec![SkinDescriptor {
                name: None,
                joints: vec![1, 3],
            }],
            scene_roots: vec![0],
            mesh_count: 1,
            ..Default::default()
        };
        let graph = VNodeGraph::from_document(&doc).unwrap();

        // Node 2 is not a joint but sits between armature and joint 3; its
        // translation must show up in the bone's armature-space rest.
        assert!(graph.get(VNodeId::Node(0)).unwrap().is_armature_root());
        let bone = graph.get(VNodeId::Node(3)).unwrap().bone().unwrap();
        assert!(bone.head.abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5));
    }
}
