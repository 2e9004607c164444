//! Host scene-graph collaborator surface.
//!
//! Mirrors what the authoring tool exposes to an importer: an armature of
//! bones with one consistent rest pose, actions made of data-path-keyed
//! F-curves on a fixed-rate timeline, and the timeline itself. The bridge
//! produces these on import and consumes them on export; the host links
//! them into its own object model.

use glam::{Mat4, Quat, Vec3};

/// Index of a bone in an [`Armature`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneIndex(pub usize);

/// One node of the armature tree.
///
/// `rest_matrix` is armature-space; the decomposed local fields are the
/// same pose relative to the parent. Both are kept because animation
/// conversion needs the local rest rotation while skinning needs the
/// armature-space matrix.
#[derive(Debug, Clone)]
pub struct SceneBone {
    pub name: String,
    pub parent: Option<BoneIndex>,
    pub children: Vec<BoneIndex>,
    /// Armature-space rest pose.
    pub rest_matrix: Mat4,
    /// Rest pose relative to the parent bone, decomposed.
    pub local_translation: Vec3,
    pub local_rotation: Quat,
    pub local_scale: f32,
    /// False for helper nodes carried along in the tree that the host
    /// should not treat as deforming bones.
    pub is_bone: bool,
}

/// A skeleton as the authoring tool sees it: a bone arena plus the axis
/// convention it was imported under, kept so export can run the exact
/// inverse conversion.
#[derive(Debug, Clone, Default)]
pub struct Armature {
    pub name: String,
    pub bones: Vec<SceneBone>,
    /// Axis identifiers ("X", "-Y", ...) the armature was built with.
    pub axis_forward: String,
    pub axis_up: String,
}

impl Armature {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a bone, wiring up the parent's child list.
    pub fn add_bone(&mut self, bone: SceneBone) -> BoneIndex {
        let index = BoneIndex(self.bones.len());
        if let Some(parent) = bone.parent {
            self.bones[parent.0].children.push(index);
        }
        self.bones.push(bone);
        index
    }

    #[must_use]
    pub fn bone(&self, index: BoneIndex) -> &SceneBone {
        &self.bones[index.0]
    }

    /// Find a bone by its scene-side name.
    #[must_use]
    pub fn bone_by_name(&self, name: &str) -> Option<BoneIndex> {
        self.bones
            .iter()
            .position(|b| b.name == name)
            .map(BoneIndex)
    }

    /// Bones without a parent, in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = BoneIndex> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| BoneIndex(i))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

/// Interpolation kinds the authoring tool's curves support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneInterpolation {
    Constant,
    Linear,
    Bezier,
}

/// One keyframe of an F-curve, on the fixed-rate timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneKey {
    pub frame: f32,
    pub value: f32,
    pub interpolation: SceneInterpolation,
}

/// A single animated scalar channel, keyed by data path and array index
/// the way the authoring tool addresses properties (e.g.
/// `"rotation_quaternion"` index 0..=3).
#[derive(Debug, Clone)]
pub struct FCurve {
    pub data_path: String,
    pub array_index: usize,
    pub keys: Vec<SceneKey>,
    /// True when the curve carries a cyclic modifier.
    pub cyclic: bool,
}

impl FCurve {
    #[must_use]
    pub fn new(data_path: impl Into<String>, array_index: usize) -> Self {
        Self {
            data_path: data_path.into(),
            array_index,
            keys: Vec::new(),
            cyclic: false,
        }
    }
}

/// A labelled frame on the action (animation group marker).
#[derive(Debug, Clone, PartialEq)]
pub struct PoseMarker {
    pub frame: f32,
    pub label: String,
}

/// One animation batch on the scene side: the F-curves of every animated
/// bone, grouped under the bone's scene-side name.
#[derive(Debug, Clone, Default)]
pub struct Action {
    pub name: String,
    /// `(bone name, curve)` pairs; a bone contributes several curves.
    pub curves: Vec<(String, FCurve)>,
    pub markers: Vec<PoseMarker>,
}

impl Action {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// All curves grouped under `bone`.
    pub fn curves_for(&self, bone: &str) -> impl Iterator<Item = &FCurve> {
        self.curves
            .iter()
            .filter(move |(name, _)| name == bone)
            .map(|(_, curve)| curve)
    }

    /// Names of the bones this action animates, first-seen order.
    #[must_use]
    pub fn bone_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.curves {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

/// Session timeline: frame rate and range, written once per animation
/// batch and read by every channel conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTimeline {
    pub fps: f32,
    pub frame_start: f32,
    pub frame_end: f32,
}

impl Default for SceneTimeline {
    fn default() -> Self {
        Self {
            fps: 30.0,
            frame_start: 0.0,
            frame_end: 0.0,
        }
    }
}
