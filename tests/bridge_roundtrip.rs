//! End-to-end import/export behavior over small hand-built rigs.

use glam::{Mat4, Quat, Vec3};
use nifbridge::bridge::{
    export_skeleton_and_animation, import_skeleton_and_animation, AxisPair,
};
use nifbridge::formats::{
    BlockData, BlockIndex, ControlledBlock, CycleKind, Key, KeyCurve, KeyframeController,
    KeyframeData, NifInterpolation, NifNode, NifScene, NifTransform, RotationKeys, Sequence,
    SkinBone, SkinInstance, TextKey, TriShape,
};
use nifbridge::scene::SceneTimeline;
use nifbridge::{Error, Warning};

fn transform(rot_z: f32, t: Vec3) -> NifTransform {
    NifTransform {
        translation: t,
        rotation: Quat::from_rotation_z(rot_z),
        scale: 1.0,
    }
}

fn node(t: NifTransform) -> BlockData {
    BlockData::Node(NifNode {
        transform: t,
        ..NifNode::default()
    })
}

struct Rig {
    scene: NifScene,
    root: BlockIndex,
    thigh: BlockIndex,
    shin: BlockIndex,
    thigh_pose: Mat4,
    shin_pose: Mat4,
}

/// Root with a two-bone chain using the format's side-prefix naming.
fn build_rig() -> Rig {
    let mut scene = NifScene::new();
    let root = scene.add_block("Scene Root", node(NifTransform::default()));
    let thigh = scene.add_block(
        "Bip01 L Thigh",
        node(transform(0.4, Vec3::new(0.5, 0.0, 1.0))),
    );
    let shin = scene.add_block(
        "Bip01 L Shin",
        node(transform(-0.2, Vec3::new(0.0, 0.0, -0.6))),
    );
    scene.node_mut(root).unwrap().children.push(thigh);
    scene.node_mut(thigh).unwrap().children.push(shin);

    let thigh_pose = scene.local_transform(thigh);
    let shin_pose = thigh_pose * scene.local_transform(shin);
    Rig {
        scene,
        root,
        thigh,
        shin,
        thigh_pose,
        shin_pose,
    }
}

/// Skin the root-level mesh consistently with the stored pose.
fn add_consistent_mesh(rig: &mut Rig) -> BlockIndex {
    let mesh = rig.scene.add_block(
        "body",
        BlockData::TriShape(TriShape {
            vertices: vec![Vec3::new(0.1, 0.2, 0.3), Vec3::new(1.0, 0.0, 0.0)],
            normals: vec![Vec3::Z, Vec3::X],
            skin: Some(SkinInstance {
                skeleton_root: rig.root,
                bones: vec![
                    SkinBone {
                        bone: rig.thigh,
                        skin_transform: rig.thigh_pose.inverse(),
                        weights: vec![(0, 1.0)],
                    },
                    SkinBone {
                        bone: rig.shin,
                        skin_transform: rig.shin_pose.inverse(),
                        weights: vec![(1, 1.0)],
                    },
                ],
            }),
            ..TriShape::default()
        }),
    );
    let root = rig.root;
    rig.scene.node_mut(root).unwrap().children.push(mesh);
    mesh
}

/// A sequence animating the thigh with quaternion rotation and location
/// keys on frame-aligned 30 fps times.
fn add_walk_sequence(rig: &mut Rig) -> BlockIndex {
    let rot_keys: Vec<Key<Quat>> = [0.0_f32, 0.35, 0.7]
        .iter()
        .enumerate()
        .map(|(i, angle)| Key {
            time: i as f32 / 30.0,
            value: Quat::from_rotation_z(*angle),
        })
        .collect();
    let loc_keys: Vec<Key<Vec3>> = (0..3)
        .map(|i| Key {
            time: i as f32 / 30.0,
            value: Vec3::new(0.5, 0.0, 1.0 + 0.1 * i as f32),
        })
        .collect();

    let controller = rig.scene.add_block(
        "walk:thigh",
        BlockData::KeyframeController(KeyframeController {
            flags: 0xC,
            data: KeyframeData {
                rotations: Some(RotationKeys::Quaternion(KeyCurve {
                    interpolation: NifInterpolation::Linear,
                    keys: rot_keys,
                })),
                translations: KeyCurve {
                    interpolation: NifInterpolation::Linear,
                    keys: loc_keys,
                },
                scales: KeyCurve::default(),
            },
        }),
    );
    let text_keys = rig.scene.add_block(
        "walk keys",
        BlockData::TextKeys(vec![TextKey {
            time: 0.0,
            label: "start".to_string(),
        }]),
    );
    rig.scene.add_block(
        "walk",
        BlockData::Sequence(Sequence {
            controlled: vec![ControlledBlock {
                target_name: "Bip01 L Thigh".to_string(),
                controller,
            }],
            text_keys: Some(text_keys),
            cycle: CycleKind::Clamp,
        }),
    )
}

fn axis() -> AxisPair {
    AxisPair::parse("X", "Z").unwrap()
}

#[test]
fn clean_rig_imports_without_warnings() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let walk = add_walk_sequence(&mut rig);
    let root = rig.root;

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[walk], Some(axis())).unwrap();

    assert!(import.report.is_empty(), "{:?}", import.report.warnings());
    assert_eq!(import.armature.bones.len(), 2);
    assert_eq!(import.armature.bones[0].name, "Bip01 Thigh.L");
    assert_eq!(import.armature.bones[1].name, "Bip01 Shin.L");
    assert_eq!(import.timeline.fps, 30.0);
    assert_eq!(import.actions.len(), 1);
    assert_eq!(import.actions[0].markers.len(), 1);
    assert_eq!(import.actions[0].markers[0].label, "start");
}

#[test]
fn skeleton_and_animation_round_trip_within_epsilon() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let walk = add_walk_sequence(&mut rig);
    let root = rig.root;
    let original_thigh = rig.scene.local_transform(rig.thigh);
    let original_shin = rig.scene.local_transform(rig.shin);

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[walk], Some(axis())).unwrap();
    let export = export_skeleton_and_animation(
        &import.armature,
        &import.actions,
        &import.timeline,
        axis(),
    )
    .unwrap();

    assert!(export.report.is_empty());

    // Skeleton: exported locals reproduce the original locals.
    let root_node = export.scene.node(export.skeleton_root).unwrap();
    let thigh_block = root_node.children[0];
    let exported_thigh = export.scene.block(thigh_block);
    assert_eq!(exported_thigh.name, "Bip01 L Thigh");
    assert!(
        export
            .scene
            .local_transform(thigh_block)
            .abs_diff_eq(original_thigh, 1e-4),
        "thigh local transform drifted"
    );
    let shin_block = export.scene.node(thigh_block).unwrap().children[0];
    assert_eq!(export.scene.block(shin_block).name, "Bip01 L Shin");
    assert!(export
        .scene
        .local_transform(shin_block)
        .abs_diff_eq(original_shin, 1e-4));

    // Animation: one sequence, one controlled channel, keys reproduced.
    assert_eq!(export.animation_roots.len(), 1);
    let BlockData::Sequence(seq) = &export.scene.block(export.animation_roots[0]).data else {
        panic!("not a sequence");
    };
    assert_eq!(seq.cycle, CycleKind::Clamp);
    assert_eq!(seq.controlled.len(), 1);
    assert_eq!(seq.controlled[0].target_name, "Bip01 L Thigh");

    let BlockData::KeyframeController(ctrl) = &export.scene.block(seq.controlled[0].controller).data
    else {
        panic!("not a controller");
    };
    let Some(RotationKeys::Quaternion(rot)) = &ctrl.data.rotations else {
        panic!("rotation keys missing");
    };
    let expected_rot = [0.0_f32, 0.35, 0.7];
    assert_eq!(rot.keys.len(), 3);
    for (i, key) in rot.keys.iter().enumerate() {
        assert!((key.time - i as f32 / 30.0).abs() < 1e-6);
        // compare as matrices to ignore quaternion sign
        let expected = Mat4::from_quat(Quat::from_rotation_z(expected_rot[i]));
        assert!(
            Mat4::from_quat(key.value).abs_diff_eq(expected, 1e-4),
            "rotation key {i} drifted: {:?}",
            key.value
        );
    }
    assert_eq!(ctrl.data.translations.keys.len(), 3);
    for (i, key) in ctrl.data.translations.keys.iter().enumerate() {
        let expected = Vec3::new(0.5, 0.0, 1.0 + 0.1 * i as f32);
        assert!(key.value.abs_diff_eq(expected, 1e-4), "location key {i}: {:?}", key.value);
    }

    // Markers come back as text keys.
    let BlockData::TextKeys(keys) = &export.scene.block(seq.text_keys.unwrap()).data else {
        panic!("text keys missing");
    };
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].label, "start");
}

#[test]
fn divergent_skin_is_corrected_and_committed() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);

    // A second, smaller skin that disagrees about the thigh by a known
    // mesh-space discrepancy.
    let discrepancy = Mat4::from_rotation_translation(
        Quat::from_rotation_x(0.25),
        Vec3::new(0.0, 0.3, 0.0),
    );
    let original_vertex = Vec3::new(0.2, 0.0, 0.7);
    let glove = rig.scene.add_block(
        "glove",
        BlockData::TriShape(TriShape {
            vertices: vec![original_vertex],
            normals: vec![Vec3::Y],
            skin: Some(SkinInstance {
                skeleton_root: rig.root,
                bones: vec![SkinBone {
                    bone: rig.thigh,
                    skin_transform: rig.thigh_pose.inverse() * discrepancy,
                    weights: vec![(0, 1.0)],
                }],
            }),
            ..TriShape::default()
        }),
    );
    let root = rig.root;
    rig.scene.node_mut(root).unwrap().children.push(glove);

    let import = import_skeleton_and_animation(&mut rig.scene, root, &[], Some(axis())).unwrap();

    assert_eq!(import.report.divergence_count(), 1);
    assert!(matches!(
        &import.report.warnings()[0],
        Warning::ReconciliationDivergence { mesh, bone }
            if mesh == "glove" && bone == "Bip01 L Thigh"
    ));

    // The correction was committed to the record tree: the glove vertex
    // moved by the inverse discrepancy.
    let BlockData::TriShape(shape) = &rig.scene.block(glove).data else {
        panic!("not a shape");
    };
    let expected = discrepancy.inverse().transform_point3(original_vertex);
    assert!(shape.vertices[0].abs_diff_eq(expected, 1e-4), "{:?}", shape.vertices[0]);
}

#[test]
fn euler_channels_land_on_union_timeline() {
    let mut rig = build_rig();
    let axis_curve = |keys: &[(f32, f32)]| KeyCurve {
        interpolation: NifInterpolation::XyzRotation,
        keys: keys
            .iter()
            .map(|&(time, value)| Key { time, value })
            .collect(),
    };
    let controller = rig.scene.add_block(
        "spin:thigh",
        BlockData::KeyframeController(KeyframeController {
            flags: 0xC,
            data: KeyframeData {
                rotations: Some(RotationKeys::Euler([
                    axis_curve(&[(0.0, 0.0), (1.0, 0.2), (2.0, 0.8)]),
                    axis_curve(&[(0.0, 0.0), (1.5, 0.3)]),
                    axis_curve(&[(0.0, 0.0), (2.0, 0.4)]),
                ])),
                translations: KeyCurve::default(),
                scales: KeyCurve::default(),
            },
        }),
    );
    let spin = rig.scene.add_block(
        "spin",
        BlockData::Sequence(Sequence {
            controlled: vec![ControlledBlock {
                target_name: "Bip01 L Thigh".to_string(),
                controller,
            }],
            text_keys: None,
            cycle: CycleKind::Clamp,
        }),
    );
    let root = rig.root;

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[spin], Some(axis())).unwrap();

    // Whole and half second times land on integer frames at the default
    // rate, so the estimator keeps 30.
    assert_eq!(import.timeline.fps, 30.0);
    let curve = import.actions[0]
        .curves_for("Bip01 Thigh.L")
        .find(|c| c.data_path == "rotation_euler" && c.array_index == 0)
        .expect("euler curve missing");
    let frames: Vec<f32> = curve.keys.iter().map(|k| k.frame).collect();
    assert_eq!(frames, vec![0.0, 30.0, 45.0, 60.0]);
}

#[test]
fn channel_for_unknown_bone_is_skipped_with_warning() {
    let mut rig = build_rig();
    let controller = rig.scene.add_block(
        "wag:tail",
        BlockData::KeyframeController(KeyframeController {
            flags: 0xC,
            data: KeyframeData::empty(),
        }),
    );
    let wag = rig.scene.add_block(
        "wag",
        BlockData::Sequence(Sequence {
            controlled: vec![ControlledBlock {
                target_name: "Bip01 Tail".to_string(),
                controller,
            }],
            text_keys: None,
            cycle: CycleKind::Clamp,
        }),
    );
    let root = rig.root;

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[wag], Some(axis())).unwrap();

    assert_eq!(import.report.warnings().len(), 1);
    assert!(matches!(
        &import.report.warnings()[0],
        Warning::MissingBone { bone, .. } if bone == "Bip01 Tail"
    ));
    assert!(import.actions[0].curves.is_empty());
}

#[test]
fn reverse_sequence_clamps_with_warning() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let walk = add_walk_sequence(&mut rig);
    let BlockData::Sequence(seq) = &mut rig.scene.block_mut(walk).data else {
        panic!("not a sequence");
    };
    seq.cycle = CycleKind::Reverse;
    let root = rig.root;

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[walk], Some(axis())).unwrap();

    assert_eq!(import.report.warnings().len(), 1);
    assert!(matches!(
        &import.report.warnings()[0],
        Warning::UnsupportedExtrapolation { .. }
    ));
    // clamped, not looping
    assert!(import.actions[0].curves.iter().all(|(_, c)| !c.cyclic));
}

#[test]
fn export_warns_on_misaligned_parallel_curves() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let root = rig.root;
    let import = import_skeleton_and_animation(&mut rig.scene, root, &[], Some(axis())).unwrap();

    // Host-authored location triple with 3/1/1 keys.
    let mut action = nifbridge::scene::Action::new("slide");
    for (index, count) in [(0, 3usize), (1, 1), (2, 1)] {
        let mut curve = nifbridge::scene::FCurve::new("location", index);
        for k in 0..count {
            curve.keys.push(nifbridge::scene::SceneKey {
                frame: k as f32,
                value: 0.1 * k as f32,
                interpolation: nifbridge::scene::SceneInterpolation::Linear,
            });
        }
        action.curves.push(("Bip01 Thigh.L".to_string(), curve));
    }

    let export = export_skeleton_and_animation(
        &import.armature,
        &[action],
        &SceneTimeline::default(),
        axis(),
    )
    .unwrap();

    assert_eq!(export.report.warnings().len(), 1);
    assert!(matches!(
        &export.report.warnings()[0],
        Warning::MisalignedKeys { channel } if channel == "slide:Bip01 Thigh.L.location"
    ));
    // truncated to the shortest curve
    let BlockData::Sequence(seq) = &export.scene.block(export.animation_roots[0]).data else {
        panic!("not a sequence");
    };
    let BlockData::KeyframeController(ctrl) = &export.scene.block(seq.controlled[0].controller).data
    else {
        panic!("not a controller");
    };
    assert_eq!(ctrl.data.translations.keys.len(), 1);
}

#[test]
fn unskinned_side_branch_imports_as_helper() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let attach = rig.scene.add_block(
        "AttachPoint",
        node(transform(0.0, Vec3::new(0.0, 0.1, 0.0))),
    );
    let toe = rig.scene.add_block(
        "Bip01 L Toe",
        node(transform(0.0, Vec3::new(0.0, 0.0, -0.2))),
    );
    let root = rig.root;
    let shin_block = rig.shin;
    rig.scene.node_mut(root).unwrap().children.push(attach);
    rig.scene.node_mut(shin_block).unwrap().children.push(toe);

    let import = import_skeleton_and_animation(&mut rig.scene, root, &[], Some(axis())).unwrap();

    let thigh = import.armature.bone_by_name("Bip01 Thigh.L").unwrap();
    // unskinned descendant of a skinned bone stays a bone
    let toe = import.armature.bone_by_name("Bip01 Toe.L").unwrap();
    let helper = import.armature.bone_by_name("AttachPoint").unwrap();
    assert!(import.armature.bone(thigh).is_bone);
    assert!(import.armature.bone(toe).is_bone);
    assert!(!import.armature.bone(helper).is_bone);
}

#[test]
fn export_fails_fast_on_missing_bone() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let root = rig.root;
    let import = import_skeleton_and_animation(&mut rig.scene, root, &[], Some(axis())).unwrap();

    let mut action = nifbridge::scene::Action::new("bad");
    action
        .curves
        .push(("No Such Bone".to_string(), nifbridge::scene::FCurve::new("location", 0)));

    let err = export_skeleton_and_animation(
        &import.armature,
        &[action],
        &SceneTimeline::default(),
        axis(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::BoneNotFound { bone, .. } if bone == "No Such Bone"));
}

#[test]
fn axis_convention_is_inferred_when_not_supplied() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let root = rig.root;

    // Bone translations point along +Z and -Z; the +Z vote wins the tie
    // by enum order and the next identifier becomes up.
    let import = import_skeleton_and_animation(&mut rig.scene, root, &[], None).unwrap();
    assert_eq!(import.armature.axis_forward, "Z");
    assert_eq!(import.armature.axis_up, "-X");
}

#[test]
fn empty_skeleton_root_is_an_error() {
    let mut scene = NifScene::new();
    let root = scene.add_block("Scene Root", node(NifTransform::default()));
    let err = import_skeleton_and_animation(&mut scene, root, &[], Some(axis())).unwrap_err();
    assert!(matches!(err, Error::EmptySkeleton(name) if name == "Scene Root"));
}

#[test]
fn cyclic_curves_round_trip_as_looping_sequence() {
    let mut rig = build_rig();
    add_consistent_mesh(&mut rig);
    let walk = add_walk_sequence(&mut rig);
    // Flip the authored sequence to looping.
    let BlockData::Sequence(seq) = &mut rig.scene.block_mut(walk).data else {
        panic!("not a sequence");
    };
    seq.cycle = CycleKind::Loop;
    let root = rig.root;

    let import =
        import_skeleton_and_animation(&mut rig.scene, root, &[walk], Some(axis())).unwrap();
    assert!(import.actions[0].curves.iter().all(|(_, c)| c.cyclic));

    let export = export_skeleton_and_animation(
        &import.armature,
        &import.actions,
        &import.timeline,
        axis(),
    )
    .unwrap();
    let BlockData::Sequence(seq) = &export.scene.block(export.animation_roots[0]).data else {
        panic!("not a sequence");
    };
    assert_eq!(seq.cycle, CycleKind::Loop);
}
