use crate::graph::{BoneData, NodeKind, VNodeGraph, VNodeId};
use vnode_math::{compose, decompose, Mat4, Quat, Vec3};
use vnode_utils::log::warn;

/// Zero-length bones are not representable in most hosts; shorter bones are
/// stretched to this.
const MIN_BONE_LENGTH: f32 = 1e-4;

/// Computes rest and pose records for every bone of every armature.
///
/// Runs after hierarchy construction and before anything materializes; the
/// rest pass fills the editbone fields of all bones of an armature before
/// the pose pass reads any of them.
pub(crate) fn resolve(graph: &mut VNodeGraph) {
    let armatures: Vec<VNodeId> = graph.armatures().collect();
    for armature in armatures {
        resolve_rest(graph, armature);
        resolve_pose(graph, armature);
    }
}

/// Walks the armature subtree accumulating armature-space matrices (identity
/// at the armature root itself). Non-bone nodes between the root and a joint
/// contribute their transform but get no bone record; bones of an armature
/// nested inside this one are left to that armature's own pass.
fn resolve_rest(graph: &mut VNodeGraph, armature: VNodeId) {
    let root_slot = match graph.slots.get(&armature) {
        Some(&slot) => slot,
        None => return,
    };

    let mut stack: Vec<(VNodeId, Mat4)> = graph.nodes[root_slot]
        .children
        .iter()
        .rev()
        .map(|&child| (child, Mat4::IDENTITY))
        .collect();

    while let Some((id, parent_mat)) = stack.pop() {
        let slot = graph.slots[&id];
        let (t, r, s) = graph.nodes[slot].trs();
        let arma_mat = parent_mat * compose(t, r, s);

        let owned_bone = graph.nodes[slot].kind == NodeKind::Bone
            && graph.nodes[slot].bone_arma == Some(armature);
        if owned_bone {
            let head = arma_mat.transform_point3(Vec3::ZERO);
            let tail = arma_mat.transform_point3(Vec3::Y);
            let roll_target = arma_mat.transform_point3(Vec3::Z) - head;
            let length = (tail - head).length().max(MIN_BONE_LENGTH);

            let (rest_translation, rest_rotation) = match decompose(arma_mat) {
                Ok((t, r, _)) => (t, r),
                Err(err) => {
                    warn!("bone {}: {}, using identity rest", id, err);
                    (Vec3::ZERO, Quat::IDENTITY)
                }
            };

            graph.nodes[slot].bone = Some(BoneData {
                arma_mat,
                rest_matrix: Mat4::from_rotation_translation(rest_rotation, rest_translation),
                rest_translation,
                rest_rotation,
                head,
                tail,
                length,
                roll_target,
                pose_translation: Vec3::ZERO,
                pose_rotation: Quat::IDENTITY,
                pose_scale: Vec3::ONE,
            });
        }

        for &child in graph.nodes[slot].children.iter().rev() {
            stack.push((child, arma_mat));
        }
    }
}

/// Residual transform per bone so that rest composed with pose reproduces
/// the node's original TRS exactly.
fn resolve_pose(graph: &mut VNodeGraph, armature: VNodeId) {
    for id in graph.bones_of(armature) {
        let slot = graph.slots[&id];
        let (t, r, s) = graph.nodes[slot].trs();

        if let Some(bone) = graph.nodes[slot].bone.as_mut() {
            let conjugate = bone.rest_rotation.conjugate();
            bone.pose_translation = conjugate * (t - bone.rest_translation);
            bone.pose_rotation = conjugate * r;
            bone.pose_scale = s;
        }
    }
}
