//! Import orchestration: record tree in, armature and actions out.

use glam::{EulerRot, Mat4, Quat, Vec3};
use indexmap::{IndexMap, IndexSet};

use crate::bridge::axis::{infer_axis_pair, AxisBasis, AxisPair};
use crate::bridge::bind_pose::{apply_corrections, solve_bind_pose, BindSolution};
use crate::bridge::registry::{translate_name, NameDirection, NodeRegistry};
use crate::bridge::resample::{
    cycle_from_flags, estimate_frame_rate, map_interpolation, resample_euler, time_to_frame,
};
use crate::error::{Error, Result};
use crate::formats::{
    BlockData, BlockIndex, CycleKind, KeyframeData, NifScene, RotationKeys, TextKey,
};
use crate::report::{Report, Warning};
use crate::scene::{
    Action, Armature, BoneIndex, FCurve, PoseMarker, SceneBone, SceneInterpolation, SceneKey,
    SceneTimeline,
};

/// Everything one import run produces.
#[derive(Debug)]
pub struct SceneImport {
    pub armature: Armature,
    pub actions: Vec<Action>,
    pub timeline: SceneTimeline,
    pub report: Report,
}

/// Accumulated armature-space pose matrix of every block under `root`.
#[must_use]
pub fn accumulate_poses(scene: &NifScene, root: BlockIndex) -> IndexMap<BlockIndex, Mat4> {
    let mut poses = IndexMap::new();
    let mut stack = vec![(root, Mat4::IDENTITY)];
    while let Some((index, parent)) = stack.pop() {
        let world = parent * scene.local_transform(index);
        poses.insert(index, world);
        if let BlockData::Node(node) = &scene.block(index).data {
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
    }
    poses
}

/// Format-local rest transform of one imported bone, kept for converting
/// keyframe samples between the bone's rest-relative frames.
#[derive(Debug, Clone)]
struct BoneRest {
    /// Inverse of the format-local rest rotation; import samples are
    /// rest-relative so only the inverse is ever applied.
    rotation_inv: Mat4,
    translation: Vec3,
    scale: f32,
}

/// One animated target resolved against the armature.
struct Channel<'a> {
    bone: BoneIndex,
    /// Identifier used in warnings ("action:bone").
    label: String,
    cycle: CycleKind,
    data: &'a KeyframeData,
}

/// Build an armature and its animation batch from the record tree.
///
/// When `axis` is `None` the convention is inferred from the dominant
/// direction of bone rest translations. Vertex corrections staged by
/// reconciliation are committed only after every skeleton and animation
/// root has been processed successfully.
///
/// # Errors
/// [`Error::EmptySkeleton`] if `skeleton_root` has no child nodes;
/// [`Error::InvalidAxisPair`] for a degenerate axis request;
/// [`Error::UnexpectedBlockKind`] if the record tree is malformed.
pub fn import_skeleton_and_animation(
    scene: &mut NifScene,
    skeleton_root: BlockIndex,
    animation_roots: &[BlockIndex],
    axis: Option<AxisPair>,
) -> Result<SceneImport> {
    let mut report = Report::new();
    let root_node = scene.node(skeleton_root)?;
    let has_child_nodes = root_node
        .children
        .iter()
        .any(|&c| matches!(scene.block(c).data, BlockData::Node(_)));
    if !has_child_nodes {
        return Err(Error::EmptySkeleton(scene.block(skeleton_root).name.clone()));
    }

    let poses = accumulate_poses(scene, skeleton_root);

    let pair = match axis {
        Some(pair) => pair,
        None => infer_axis_pair(
            scene
                .tree(skeleton_root)
                .skip(1)
                .filter_map(|i| match &scene.block(i).data {
                    BlockData::Node(node) => Some(node.transform.translation),
                    _ => None,
                }),
        ),
    };
    let basis = AxisBasis::new(pair)?;

    let solution = solve_bind_pose(scene, skeleton_root, &poses, &mut report);

    let mut registry = NodeRegistry::new();
    let (armature, rests) =
        build_armature(scene, skeleton_root, &solution, &basis, pair, &mut registry)?;

    // Frame rate is estimated once per batch, over every channel of every
    // animation root.
    let mut all_times: Vec<f32> = Vec::new();
    for &anim_root in animation_roots {
        for_each_keyframe_data(scene, anim_root, |data| {
            all_times.extend(data.all_times());
        })?;
    }
    let fps = estimate_frame_rate(&all_times);

    let mut actions = Vec::new();
    let mut frame_end = 0.0_f32;
    for &anim_root in animation_roots {
        let action = build_action(
            scene,
            anim_root,
            &armature,
            &registry,
            &rests,
            &basis,
            fps,
            &mut report,
        )?;
        for (_, curve) in &action.curves {
            for key in &curve.keys {
                frame_end = frame_end.max(key.frame);
            }
        }
        actions.push(action);
    }

    // Everything succeeded; commit the staged vertex corrections.
    apply_corrections(scene, &solution.corrections);

    tracing::info!(
        "imported armature '{}' with {} bones, {} actions at {fps} fps",
        armature.name,
        armature.bones.len(),
        actions.len()
    );
    Ok(SceneImport {
        armature,
        actions,
        timeline: SceneTimeline {
            fps,
            frame_start: 0.0,
            frame_end,
        },
        report,
    })
}

fn build_armature(
    scene: &NifScene,
    root: BlockIndex,
    solution: &BindSolution,
    basis: &AxisBasis,
    pair: AxisPair,
    registry: &mut NodeRegistry,
) -> Result<(Armature, Vec<BoneRest>)> {
    let mut armature = Armature::new(scene.block(root).name.clone());
    armature.axis_forward = pair.forward.as_str().to_string();
    armature.axis_up = pair.up.as_str().to_string();
    let mut rests: Vec<BoneRest> = Vec::new();

    let mut parents: IndexMap<BlockIndex, BlockIndex> = IndexMap::new();
    for index in scene.tree(root) {
        if let BlockData::Node(node) = &scene.block(index).data {
            for &child in &node.children {
                parents.insert(child, index);
            }
        }
    }

    // A node is a bone when some skin references it or a node on its
    // chain; side branches carrying no skin influence import as helper
    // nodes. A rig without any skins is all bones.
    let mut marked: IndexSet<BlockIndex> = IndexSet::new();
    for index in scene.tree(root) {
        let BlockData::TriShape(shape) = &scene.block(index).data else {
            continue;
        };
        let Some(skin) = &shape.skin else { continue };
        for skin_bone in &skin.bones {
            let mut cursor = skin_bone.bone;
            while marked.insert(cursor) {
                match parents.get(&cursor) {
                    Some(&parent) if parent != root => cursor = parent,
                    _ => break,
                }
            }
        }
    }
    let has_skins = !marked.is_empty();

    // Preorder guarantees parents are registered before their children.
    for index in scene.tree(root).skip(1) {
        if !matches!(scene.block(index).data, BlockData::Node(_)) {
            continue;
        }
        let parent_block = parents.get(&index).copied().unwrap_or(root);
        let parent_bone = if parent_block == root {
            None
        } else {
            registry.resolve_bone(parent_block)
        };

        let bind = solution.bind.get(&index).copied().unwrap_or(Mat4::IDENTITY);
        let parent_bind = solution
            .bind
            .get(&parent_block)
            .copied()
            .unwrap_or(Mat4::IDENTITY);
        let local_format = parent_bind.inverse() * bind;

        // The change of basis is applied to armature-space matrices, once
        // per node; local transforms fall out by re-division, so it never
        // compounds with depth.
        let rest_scene = basis.rest_to_scene(bind);
        let parent_rest_scene = basis.rest_to_scene(parent_bind);
        let local_scene = parent_rest_scene.inverse() * rest_scene;
        let (local_scale, local_rotation, local_translation) =
            local_scene.to_scale_rotation_translation();

        // Descendants of a bone stay bones even without their own skin
        // reference.
        let is_bone = !has_skins
            || marked.contains(&index)
            || parent_bone.is_some_and(|p| armature.bone(p).is_bone);
        let bone = armature.add_bone(SceneBone {
            name: translate_name(&scene.block(index).name, NameDirection::ToScene),
            parent: parent_bone,
            children: Vec::new(),
            rest_matrix: rest_scene,
            local_translation,
            local_rotation,
            local_scale: local_scale.x,
            is_bone,
        });
        registry.register(index, bone);

        let (fmt_scale, fmt_rotation, fmt_translation) = local_format.to_scale_rotation_translation();
        rests.push(BoneRest {
            rotation_inv: Mat4::from_quat(fmt_rotation).inverse(),
            translation: fmt_translation,
            scale: fmt_scale.x,
        });
    }

    Ok((armature, rests))
}

/// Visit the keyframe data of every controller reachable from an
/// animation root, which is either a node subtree with attached
/// controllers or a self-contained sequence.
fn for_each_keyframe_data<F>(scene: &NifScene, anim_root: BlockIndex, mut f: F) -> Result<()>
where
    F: FnMut(&KeyframeData),
{
    match &scene.block(anim_root).data {
        BlockData::Sequence(seq) => {
            for controlled in &seq.controlled {
                let BlockData::KeyframeController(ctrl) = &scene.block(controlled.controller).data
                else {
                    return Err(Error::UnexpectedBlockKind {
                        index: controlled.controller.0,
                        expected: "NiKeyframeController",
                    });
                };
                f(&ctrl.data);
            }
        }
        _ => {
            for index in scene.tree(anim_root) {
                let BlockData::Node(node) = &scene.block(index).data else {
                    continue;
                };
                for &ctrl_index in &node.controllers {
                    let BlockData::KeyframeController(ctrl) = &scene.block(ctrl_index).data else {
                        return Err(Error::UnexpectedBlockKind {
                            index: ctrl_index.0,
                            expected: "NiKeyframeController",
                        });
                    };
                    f(&ctrl.data);
                }
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_action(
    scene: &NifScene,
    anim_root: BlockIndex,
    armature: &Armature,
    registry: &NodeRegistry,
    rests: &[BoneRest],
    basis: &AxisBasis,
    fps: f32,
    report: &mut Report,
) -> Result<Action> {
    let action_name = scene.block(anim_root).name.clone();
    let mut action = Action::new(action_name.clone());

    let (channels, text_keys) =
        collect_channels(scene, anim_root, armature, registry, &action_name, report)?;

    for channel in channels {
        let bone_name = armature.bone(channel.bone).name.clone();
        let rest = &rests[channel.bone.0];
        let cyclic = channel.cycle == CycleKind::Loop;
        build_bone_curves(&mut action, &bone_name, channel, rest, basis, fps, cyclic, report);
    }

    for key in text_keys {
        action.markers.push(PoseMarker {
            frame: time_to_frame(key.time, fps),
            label: key.label.clone(),
        });
    }

    Ok(action)
}

fn collect_channels<'a>(
    scene: &'a NifScene,
    anim_root: BlockIndex,
    armature: &Armature,
    registry: &NodeRegistry,
    action_name: &str,
    report: &mut Report,
) -> Result<(Vec<Channel<'a>>, Vec<TextKey>)> {
    let mut channels = Vec::new();
    let mut text_keys = Vec::new();

    match &scene.block(anim_root).data {
        BlockData::Sequence(seq) => {
            for controlled in &seq.controlled {
                let BlockData::KeyframeController(ctrl) = &scene.block(controlled.controller).data
                else {
                    return Err(Error::UnexpectedBlockKind {
                        index: controlled.controller.0,
                        expected: "NiKeyframeController",
                    });
                };
                let scene_name = translate_name(&controlled.target_name, NameDirection::ToScene);
                let label = format!("{action_name}:{scene_name}");
                let Some(bone) = armature.bone_by_name(&scene_name) else {
                    report.push(Warning::MissingBone {
                        channel: label,
                        bone: scene_name,
                    });
                    continue;
                };
                // Reverse playback has no scene-side counterpart; clamp
                // with a warning, matching the flag-decoded path.
                let cycle = match seq.cycle {
                    CycleKind::Reverse => {
                        report.push(Warning::UnsupportedExtrapolation {
                            channel: label.clone(),
                        });
                        CycleKind::Clamp
                    }
                    other => other,
                };
                channels.push(Channel {
                    bone,
                    label,
                    cycle,
                    data: &ctrl.data,
                });
            }
            if let Some(tk) = seq.text_keys {
                if let BlockData::TextKeys(keys) = &scene.block(tk).data {
                    text_keys.extend(keys.iter().cloned());
                }
            }
        }
        _ => {
            for index in scene.tree(anim_root) {
                let BlockData::Node(node) = &scene.block(index).data else {
                    continue;
                };
                if index == anim_root {
                    if let Some(extra) = node.extra {
                        if let BlockData::TextKeys(keys) = &scene.block(extra).data {
                            text_keys.extend(keys.iter().cloned());
                        }
                    }
                }
                for &ctrl_index in &node.controllers {
                    let BlockData::KeyframeController(ctrl) = &scene.block(ctrl_index).data else {
                        return Err(Error::UnexpectedBlockKind {
                            index: ctrl_index.0,
                            expected: "NiKeyframeController",
                        });
                    };
                    let scene_name =
                        translate_name(&scene.block(index).name, NameDirection::ToScene);
                    let label = format!("{action_name}:{scene_name}");
                    let Some(bone) = registry.resolve_bone(index) else {
                        report.push(Warning::MissingBone {
                            channel: label,
                            bone: scene_name,
                        });
                        continue;
                    };
                    let cycle = cycle_from_flags(ctrl.flags, &label, report);
                    channels.push(Channel {
                        bone,
                        label,
                        cycle,
                        data: &ctrl.data,
                    });
                }
            }
        }
    }
    Ok((channels, text_keys))
}

#[allow(clippy::too_many_arguments)]
fn build_bone_curves(
    action: &mut Action,
    bone_name: &str,
    channel: Channel<'_>,
    rest: &BoneRest,
    basis: &AxisBasis,
    fps: f32,
    cyclic: bool,
    report: &mut Report,
) {
    let data = channel.data;

    match &data.rotations {
        Some(RotationKeys::Quaternion(curve)) if !curve.is_empty() => {
            let interp = map_interpolation(curve.interpolation, &channel.label, report);
            let mut curves: [FCurve; 4] =
                std::array::from_fn(|i| FCurve::new("rotation_quaternion", i));
            for key in &curve.keys {
                let sample = Mat4::from_quat(key.value);
                let m = basis.import_sample(rest.rotation_inv, sample, true);
                let q = Quat::from_mat4(&m);
                let frame = time_to_frame(key.time, fps);
                for (i, value) in [q.w, q.x, q.y, q.z].into_iter().enumerate() {
                    curves[i].keys.push(SceneKey {
                        frame,
                        value,
                        interpolation: interp,
                    });
                }
            }
            push_curves(action, bone_name, curves, cyclic);
        }
        Some(RotationKeys::Euler(axes)) if axes.iter().any(|a| !a.is_empty()) => {
            let interp = axes
                .iter()
                .find(|a| !a.is_empty())
                .map_or(SceneInterpolation::Linear, |a| {
                    map_interpolation(a.interpolation, &channel.label, report)
                });
            let mut curves: [FCurve; 3] = std::array::from_fn(|i| FCurve::new("rotation_euler", i));
            for (time, [x, y, z]) in resample_euler(axes) {
                let sample = Mat4::from_euler(EulerRot::XYZ, x, y, z);
                let m = basis.import_sample(rest.rotation_inv, sample, true);
                let (ex, ey, ez) = Quat::from_mat4(&m).to_euler(EulerRot::XYZ);
                let frame = time_to_frame(time, fps);
                for (i, value) in [ex, ey, ez].into_iter().enumerate() {
                    curves[i].keys.push(SceneKey {
                        frame,
                        value,
                        interpolation: interp,
                    });
                }
            }
            push_curves(action, bone_name, curves, cyclic);
        }
        _ => {}
    }

    if !data.translations.is_empty() {
        let interp = map_interpolation(data.translations.interpolation, &channel.label, report);
        let mut curves: [FCurve; 3] = std::array::from_fn(|i| FCurve::new("location", i));
        for key in &data.translations.keys {
            let sample = Mat4::from_translation(key.value - rest.translation);
            let loc = basis.import_sample(rest.rotation_inv, sample, true).w_axis.truncate();
            let frame = time_to_frame(key.time, fps);
            for (i, value) in [loc.x, loc.y, loc.z].into_iter().enumerate() {
                curves[i].keys.push(SceneKey {
                    frame,
                    value,
                    interpolation: interp,
                });
            }
        }
        push_curves(action, bone_name, curves, cyclic);
    }

    if !data.scales.is_empty() {
        let interp = map_interpolation(data.scales.interpolation, &channel.label, report);
        let mut curves: [FCurve; 3] = std::array::from_fn(|i| FCurve::new("scale", i));
        for key in &data.scales.keys {
            let value = key.value / rest.scale;
            let frame = time_to_frame(key.time, fps);
            for curve in &mut curves {
                curve.keys.push(SceneKey {
                    frame,
                    value,
                    interpolation: interp,
                });
            }
        }
        push_curves(action, bone_name, curves, cyclic);
    }
}

fn push_curves<const N: usize>(
    action: &mut Action,
    bone_name: &str,
    curves: [FCurve; N],
    cyclic: bool,
) {
    for mut curve in curves {
        curve.cyclic = cyclic;
        action.curves.push((bone_name.to_string(), curve));
    }
}
