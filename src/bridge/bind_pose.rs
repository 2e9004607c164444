//! Bind-pose reconciliation.
//!
//! The interchange format stores each skinned mesh's bind pose
//! independently, and meshes sharing a skeleton routinely disagree about a
//! bone's rest transform. The authoring tool needs exactly one bind pose
//! per skeleton, so this module elects a deterministic authority per bone,
//! measures each other skin's disagreement, and stages vertex corrections
//! that make the losing meshes agree with the elected pose.
//!
//! All conventions are column-vector: a bind entry maps bone space to
//! armature space, a skin transform maps mesh space to bone space, and the
//! consistency condition is `bind · skin = mesh_to_armature`.

use glam::{Mat3, Mat4};
use indexmap::IndexMap;

use crate::formats::{BlockData, BlockIndex, NifScene};
use crate::report::{Report, Warning};

/// Tolerance under which two bind candidates are considered in agreement.
pub const BIND_EPSILON: f32 = 1e-4;

/// A staged mutation of one mesh's vertex data. Nothing is written to the
/// record tree until [`apply_corrections`] runs, so a failed batch leaves
/// the input untouched.
#[derive(Debug, Clone)]
pub struct VertexCorrection {
    pub mesh: BlockIndex,
    /// Applied to every vertex position; its 3x3 part to every normal.
    pub matrix: Mat4,
}

/// Result of one reconciliation run: the elected armature-space bind pose
/// per node, and the corrections that make every skin agree with it.
#[derive(Debug, Clone, Default)]
pub struct BindSolution {
    /// Armature-space bind transform per node, keyed in resolution order.
    pub bind: IndexMap<BlockIndex, Mat4>,
    pub corrections: Vec<VertexCorrection>,
}

fn approx_identity(m: Mat4, epsilon: f32) -> bool {
    m.abs_diff_eq(Mat4::IDENTITY, epsilon)
}

/// Solve one consistent bind pose for the skeleton under `root`.
///
/// `poses` holds the armature-space pose matrix of every node reachable
/// from `root` (the accumulated local transforms); it seeds the structural
/// pass for bones no skin references. The record tree is read-only here;
/// the returned corrections are applied separately.
pub fn solve_bind_pose(
    scene: &NifScene,
    root: BlockIndex,
    poses: &IndexMap<BlockIndex, Mat4>,
    report: &mut Report,
) -> BindSolution {
    let mut solution = BindSolution::default();

    // Skinned meshes in tree order, then stable-sorted by descending
    // coverage. The stable sort keeps first-encountered order as the
    // tie-break, which makes authority election deterministic.
    let mut meshes: Vec<(BlockIndex, usize)> = scene
        .tree(root)
        .filter_map(|index| match &scene.block(index).data {
            BlockData::TriShape(shape) => {
                shape.skin.as_ref().map(|skin| (index, skin.coverage()))
            }
            _ => None,
        })
        .collect();
    meshes.sort_by_key(|(_, coverage)| std::cmp::Reverse(*coverage));

    for (mesh, _) in meshes {
        let BlockData::TriShape(shape) = &scene.block(mesh).data else {
            continue;
        };
        let Some(skin) = &shape.skin else { continue };
        let mesh_to_armature = poses.get(&mesh).copied().unwrap_or(Mat4::IDENTITY);

        // First pass: find the first bone whose stored bind disagrees with
        // this mesh. The mismatch is measured in mesh space (identity when
        // the skin agrees); the whole mesh is corrected once, by its
        // inverse, and later bones of this mesh are folded through it.
        let mut mismatch = Mat4::IDENTITY;
        for skin_bone in &skin.bones {
            if let Some(stored) = solution.bind.get(&skin_bone.bone) {
                let m = mesh_to_armature.inverse() * *stored * skin_bone.skin_transform;
                if !approx_identity(m, BIND_EPSILON) {
                    solution.corrections.push(VertexCorrection {
                        mesh,
                        matrix: m.inverse(),
                    });
                    report.push(Warning::ReconciliationDivergence {
                        mesh: scene.block(mesh).name.clone(),
                        bone: scene.block(skin_bone.bone).name.clone(),
                    });
                    mismatch = m;
                    break;
                }
            }
        }

        // Second pass: elect this mesh as authority for every bone that
        // has no bind yet. When the mesh was corrected, the mismatch is
        // folded in so the new entries agree with the corrected geometry;
        // for the divergent bone itself this reproduces the stored entry
        // exactly. Stored entries are never overwritten.
        for skin_bone in &skin.bones {
            solution.bind.entry(skin_bone.bone).or_insert_with(|| {
                mesh_to_armature * mismatch * skin_bone.skin_transform.inverse()
            });
        }
    }

    structural_pass(scene, root, poses, &mut solution, report);
    solution
}

/// Top-down walk giving every remaining node a bind entry derived from its
/// parent: `parent_bind · local_rest`. Nodes with neither a skin-elected
/// bind nor a pose sample fall back to identity with a warning.
fn structural_pass(
    scene: &NifScene,
    root: BlockIndex,
    poses: &IndexMap<BlockIndex, Mat4>,
    solution: &mut BindSolution,
    report: &mut Report,
) {
    let mut parents: IndexMap<BlockIndex, BlockIndex> = IndexMap::new();
    for index in scene.tree(root) {
        if let BlockData::Node(node) = &scene.block(index).data {
            for &child in &node.children {
                parents.insert(child, index);
            }
        }
    }

    // tree() is preorder, so a parent's entry always exists before its
    // children are visited.
    for index in scene.tree(root) {
        if !matches!(scene.block(index).data, BlockData::Node(_)) {
            continue;
        }
        if solution.bind.contains_key(&index) {
            continue;
        }
        let pose = poses.get(&index);
        let entry = match (pose, parents.get(&index)) {
            (Some(pose), Some(parent)) => {
                let parent_bind = solution
                    .bind
                    .get(parent)
                    .copied()
                    .unwrap_or(Mat4::IDENTITY);
                let parent_pose = poses.get(parent).copied().unwrap_or(Mat4::IDENTITY);
                let local_rest = parent_pose.inverse() * *pose;
                parent_bind * local_rest
            }
            (Some(pose), None) => *pose,
            (None, _) => {
                report.push(Warning::UnboundBone {
                    bone: scene.block(index).name.clone(),
                });
                Mat4::IDENTITY
            }
        };
        solution.bind.insert(index, entry);
    }
}

/// Write staged corrections into the record tree. Normals take the 3x3
/// part of the correction and are renormalized.
pub fn apply_corrections(scene: &mut NifScene, corrections: &[VertexCorrection]) {
    for correction in corrections {
        if let BlockData::TriShape(shape) = &mut scene.block_mut(correction.mesh).data {
            let linear = Mat3::from_mat4(correction.matrix);
            for v in &mut shape.vertices {
                *v = correction.matrix.transform_point3(*v);
            }
            for n in &mut shape.normals {
                *n = (linear * *n).normalize_or_zero();
            }
            tracing::debug!(
                "corrected {} vertices of '{}'",
                shape.vertices.len(),
                scene.block(correction.mesh).name
            );
        }
    }
}

/// Export-side inverse of the bind candidate formula: the skin transform
/// that places `mesh_to_armature` geometry into a bone's space at bind.
#[must_use]
pub fn export_skin_transform(bind: Mat4, mesh_to_armature: Mat4) -> Mat4 {
    bind.inverse() * mesh_to_armature
}
