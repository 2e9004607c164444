//! Export orchestration: armature and actions in, record tree out.
//!
//! The inverse of import. No reconciliation is needed here because the
//! scene side has exactly one rest pose by construction; skin transforms
//! are the pure inverse of the import candidate formula.

use glam::{Mat4, Quat, Vec3};

use crate::bridge::axis::{AxisBasis, AxisPair};
use crate::bridge::registry::{translate_name, NameDirection, NodeRegistry};
use crate::bridge::resample::{export_interpolation, flags_from_cyclic, frame_to_time};
use crate::error::{Error, Result};
use crate::formats::{
    BlockData, BlockIndex, ControlledBlock, CycleKind, Key, KeyCurve, KeyframeController,
    KeyframeData, NifScene, NifTransform, RotationKeys, Sequence, TextKey,
};
use crate::report::{Report, Warning};
use crate::scene::{Action, Armature, BoneIndex, FCurve, SceneInterpolation, SceneTimeline};

/// Everything one export run produces. The record scene is freshly built;
/// a failed export returns an error before any output exists, never a
/// partial tree.
#[derive(Debug)]
pub struct NifExport {
    pub scene: NifScene,
    pub skeleton_root: BlockIndex,
    pub animation_roots: Vec<BlockIndex>,
    pub report: Report,
}

#[derive(Debug, Clone)]
struct BoneRest {
    rotation: Mat4,
    translation: Vec3,
    scale: f32,
}

/// Build a record tree for an armature and its actions.
///
/// # Errors
/// [`Error::EmptySkeleton`] for an armature with no bones;
/// [`Error::BoneNotFound`] if any animated channel references a bone the
/// armature does not contain (checked up front, before anything is built);
/// [`Error::InvalidAxisPair`] for a degenerate axis request.
pub fn export_skeleton_and_animation(
    armature: &Armature,
    actions: &[Action],
    timeline: &SceneTimeline,
    axis: AxisPair,
) -> Result<NifExport> {
    let basis = AxisBasis::new(axis)?;
    let mut report = Report::new();

    if armature.is_empty() {
        return Err(Error::EmptySkeleton(armature.name.clone()));
    }

    // Fail fast: every animated bone must exist before any block is built.
    for action in actions {
        for name in action.bone_names() {
            if armature.bone_by_name(name).is_none() {
                return Err(Error::BoneNotFound {
                    bone: name.to_string(),
                    referrer: action.name.clone(),
                });
            }
        }
    }

    let mut scene = NifScene::new();
    let mut registry = NodeRegistry::new();
    let skeleton_root = scene.create_block("NiNode", armature.name.clone())?;

    // Arena order puts parents before children, so each bone's parent
    // block and format-space rest are already known when it is visited.
    let mut format_rests: Vec<Mat4> = Vec::with_capacity(armature.bones.len());
    let mut local_rests: Vec<BoneRest> = Vec::with_capacity(armature.bones.len());
    for (i, bone) in armature.bones.iter().enumerate() {
        let rest_format = basis.rest_to_format(bone.rest_matrix);
        let parent_rest = bone
            .parent
            .map_or(Mat4::IDENTITY, |p| format_rests[p.0]);
        let local_format = parent_rest.inverse() * rest_format;
        format_rests.push(rest_format);

        let block = scene.create_block(
            "NiNode",
            translate_name(&bone.name, NameDirection::ToFormat),
        )?;
        scene.node_mut(block)?.transform = NifTransform::from_mat4(&local_format);

        let parent_block = bone
            .parent
            .and_then(|p| registry.resolve_block(p))
            .unwrap_or(skeleton_root);
        scene.node_mut(parent_block)?.children.push(block);
        registry.register(block, BoneIndex(i));

        let (scale, rotation, translation) = local_format.to_scale_rotation_translation();
        local_rests.push(BoneRest {
            rotation: Mat4::from_quat(rotation),
            translation,
            scale: scale.x,
        });
    }

    let mut animation_roots = Vec::new();
    for action in actions {
        let root = export_action(
            &mut scene,
            &mut registry,
            armature,
            action,
            &local_rests,
            &basis,
            timeline.fps,
            &mut report,
        )?;
        animation_roots.push(root);
    }

    tracing::info!(
        "exported armature '{}' with {} bones, {} sequences",
        armature.name,
        armature.bones.len(),
        animation_roots.len()
    );
    Ok(NifExport {
        scene,
        skeleton_root,
        animation_roots,
        report,
    })
}

#[allow(clippy::too_many_arguments)]
fn export_action(
    scene: &mut NifScene,
    registry: &mut NodeRegistry,
    armature: &Armature,
    action: &Action,
    rests: &[BoneRest],
    basis: &AxisBasis,
    fps: f32,
    report: &mut Report,
) -> Result<BlockIndex> {
    let cyclic = action.curves.iter().any(|(_, c)| c.cyclic);
    let mut controlled = Vec::new();

    for name in action.bone_names() {
        // Presence was verified up front.
        let Some(bone) = armature.bone_by_name(name) else {
            continue;
        };
        let rest = &rests[bone.0];
        let label = format!("{}:{name}", action.name);
        let data = export_bone_channels(action, name, rest, basis, fps, &label, report);
        if data.rotations.is_none() && data.translations.is_empty() && data.scales.is_empty() {
            continue;
        }
        let controller = scene.add_block(
            format!("{}:{name}", action.name),
            BlockData::KeyframeController(KeyframeController {
                flags: flags_from_cyclic(cyclic),
                data,
            }),
        );
        controlled.push(ControlledBlock {
            target_name: translate_name(name, NameDirection::ToFormat),
            controller,
        });
    }

    let text_keys = if action.markers.is_empty() {
        None
    } else {
        let keys: Vec<TextKey> = action
            .markers
            .iter()
            .map(|m| TextKey {
                time: frame_to_time(m.frame, fps),
                label: m.label.clone(),
            })
            .collect();
        Some(registry.register_value_block(scene, &action.name, BlockData::TextKeys(keys)))
    };

    Ok(scene.add_block(
        action.name.clone(),
        BlockData::Sequence(Sequence {
            controlled,
            text_keys,
            cycle: if cyclic { CycleKind::Loop } else { CycleKind::Clamp },
        }),
    ))
}

/// Convert one bone's F-curves back into format-side keyframe data.
/// Euler-authored rotation is exported as quaternion keys; the format's
/// three-channel euler layout only exists for round-tripping legacy
/// content, which the authoring side does not produce.
#[allow(clippy::too_many_arguments)]
fn export_bone_channels(
    action: &Action,
    bone_name: &str,
    rest: &BoneRest,
    basis: &AxisBasis,
    fps: f32,
    label: &str,
    report: &mut Report,
) -> KeyframeData {
    let mut data = KeyframeData::empty();

    let find = |path: &str, index: usize| {
        action
            .curves_for(bone_name)
            .find(|c| c.data_path == path && c.array_index == index)
    };
    if let Some(samples) = gather(std::array::from_fn(|i| find("rotation_quaternion", i))) {
        warn_if_truncated(&samples, label, "rotation_quaternion", report);
        let mut curve = KeyCurve::new(export_interpolation(samples.interpolation));
        for (frame, [w, x, y, z]) in samples.keys {
            let sample = Mat4::from_quat(Quat::from_xyzw(x, y, z, w));
            let m = basis.export_sample(rest.rotation, sample, true);
            curve.keys.push(Key {
                time: frame_to_time(frame, fps),
                value: Quat::from_mat4(&m),
            });
        }
        data.rotations = Some(RotationKeys::Quaternion(curve));
    } else if let Some(samples) = gather(std::array::from_fn(|i| find("rotation_euler", i))) {
        warn_if_truncated(&samples, label, "rotation_euler", report);
        let mut curve = KeyCurve::new(export_interpolation(samples.interpolation));
        for (frame, [x, y, z]) in samples.keys {
            let sample = Mat4::from_euler(glam::EulerRot::XYZ, x, y, z);
            let m = basis.export_sample(rest.rotation, sample, true);
            curve.keys.push(Key {
                time: frame_to_time(frame, fps),
                value: Quat::from_mat4(&m),
            });
        }
        data.rotations = Some(RotationKeys::Quaternion(curve));
    }

    if let Some(samples) = gather(std::array::from_fn(|i| find("location", i))) {
        warn_if_truncated(&samples, label, "location", report);
        data.translations = KeyCurve::new(export_interpolation(samples.interpolation));
        for (frame, [x, y, z]) in samples.keys {
            let sample = Mat4::from_translation(Vec3::new(x, y, z));
            let m = basis.export_sample(rest.rotation, sample, true);
            data.translations.keys.push(Key {
                time: frame_to_time(frame, fps),
                value: m.w_axis.truncate() + rest.translation,
            });
        }
    }

    if let Some(samples) = gather([find("scale", 0)]) {
        data.scales = KeyCurve::new(export_interpolation(samples.interpolation));
        for (frame, [s]) in samples.keys {
            data.scales.keys.push(Key {
                time: frame_to_time(frame, fps),
                value: s * rest.scale,
            });
        }
    }

    data
}

struct Gathered<const N: usize> {
    interpolation: SceneInterpolation,
    keys: Vec<(f32, [f32; N])>,
    /// True when the source curves disagreed on key count and trailing
    /// keys of the longer curves were dropped.
    truncated: bool,
}

fn warn_if_truncated<const N: usize>(
    samples: &Gathered<N>,
    label: &str,
    property: &str,
    report: &mut Report,
) {
    if samples.truncated {
        report.push(Warning::MisalignedKeys {
            channel: format!("{label}.{property}"),
        });
    }
}

/// Zip N parallel F-curves into per-frame value tuples. Curves written by
/// the bridge are key-aligned; host-authored curves that disagree are
/// truncated to the shortest and flagged via [`Gathered::truncated`].
fn gather<const N: usize>(curves: [Option<&FCurve>; N]) -> Option<Gathered<N>> {
    let curves: Vec<&FCurve> = curves.into_iter().collect::<Option<Vec<_>>>()?;
    let len = curves.iter().map(|c| c.keys.len()).min()?;
    let longest = curves.iter().map(|c| c.keys.len()).max()?;
    if len == 0 {
        return None;
    }
    let interpolation = curves[0].keys[0].interpolation;
    let keys = (0..len)
        .map(|k| {
            let frame = curves[0].keys[k].frame;
            let mut values = [0.0_f32; N];
            for (slot, curve) in values.iter_mut().zip(&curves) {
                *slot = curve.keys[k].value;
            }
            (frame, values)
        })
        .collect();
    Some(Gathered {
        interpolation,
        keys,
        truncated: len != longest,
    })
}
