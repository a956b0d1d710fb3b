use crate::graph::{BoneData, NodeKind, VNode, VNodeGraph};
use crate::SceneError;

/// Host adapter creating renderable objects from the finished graph.
///
/// The core stays pure data; everything imperative (object creation, scene
/// linking, armature editing) lives behind this trait. Adapters are free to
/// memoize created meshes per [`VNode::mesh_cache_key`].
pub trait Materialize {
    /// Create a host object for `node`. `parent` is the handle of the
    /// nearest materialized ancestor, `None` at the top of a tree.
    /// Returning `None` means nothing was created for this node; its
    /// children then inherit `parent`.
    fn object(&mut self, node: &VNode, parent: Option<u32>) -> Option<u32>;

    /// Called once per bone of an armature, parents before children, right
    /// after [`object`](Materialize::object) returned for the armature root.
    fn bone(&mut self, armature: Option<u32>, node: &VNode, bone: &BoneData);
}

/// Drives an adapter over the forest, depth-first in child order, starting
/// at the graph root.
///
/// The dummy root is skipped (its children are still visited), bones are
/// delivered with their armature instead of during the plain walk, and every
/// handle the adapter returns is written to its vnode once.
pub fn materialize<M: Materialize>(
    graph: &mut VNodeGraph,
    adapter: &mut M,
) -> Result<(), SceneError> {
    let mut stack = vec![(graph.root(), None)];

    while let Some((id, parent)) = stack.pop() {
        let slot = graph.slot(id)?;

        let handle = match graph.nodes[slot].kind {
            NodeKind::DummyRoot => None,
            // Created below, together with their armature.
            NodeKind::Bone => None,
            NodeKind::Object => {
                let handle = adapter.object(&graph.nodes[slot], parent);
                graph.nodes[slot].object_handle = handle;

                if graph.nodes[slot].is_arma {
                    for bone_id in graph.bones_of(id) {
                        let bone_slot = graph.slot(bone_id)?;
                        let node = &graph.nodes[bone_slot];
                        if let Some(data) = node.bone.as_ref() {
                            adapter.bone(handle, node, data);
                        }
                    }
                }

                handle
            }
        };

        let next_parent = handle.or(parent);
        for &child in graph.nodes[slot].children.iter().rev() {
            stack.push((child, next_parent));
        }
    }

    Ok(())
}
