//! In-memory record tree of the interchange format.
//!
//! This is the walkable, mutable surface handed over by the record
//! serialization layer: an arena of typed blocks with parent/children
//! navigation, decomposed local transforms, keyframe controllers and
//! per-mesh skin data. Binary layout is not handled here.

use glam::{Mat4, Quat, Vec3};

use crate::error::{Error, Result};
use crate::formats::keys::{CycleKind, KeyframeData, TextKey};

/// Index of a block in a [`NifScene`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(pub usize);

/// Decomposed local transform of a record (translation, rotation,
/// uniform scale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NifTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl NifTransform {
    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            self.translation,
        )
    }

    /// Decompose a matrix back into T/R/uniform-S. Non-uniform scale is
    /// flattened to its X component; the authoring side does not produce
    /// it for bones.
    #[must_use]
    pub fn from_mat4(m: &Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale: scale.x,
        }
    }
}

impl Default for NifTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// Per-bone skin record: which bone, the mesh-to-bone-space transform at
/// bind time, and the vertex weights this bone carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinBone {
    pub bone: BlockIndex,
    /// Transforms mesh space into this bone's space at bind time
    /// (the stored inverse-bind transform).
    pub skin_transform: Mat4,
    /// `(vertex index, weight)` pairs.
    pub weights: Vec<(u32, f32)>,
}

/// Skin binding of one mesh: the skeleton it deforms under and the bones
/// that influence it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinInstance {
    pub skeleton_root: BlockIndex,
    pub bones: Vec<SkinBone>,
}

impl SkinInstance {
    /// Number of distinct bones referenced ("coverage"); the bind-pose
    /// reconciliation ordering key.
    #[must_use]
    pub fn coverage(&self) -> usize {
        let mut bones: Vec<BlockIndex> = self.bones.iter().map(|b| b.bone).collect();
        bones.sort_unstable();
        bones.dedup();
        bones.len()
    }
}

/// A hierarchy record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NifNode {
    pub transform: NifTransform,
    pub children: Vec<BlockIndex>,
    /// Keyframe controllers attached to this node (controller chain).
    pub controllers: Vec<BlockIndex>,
    /// Extra-data chain; may hold a `TextKeys` block.
    pub extra: Option<BlockIndex>,
}

/// A triangle-geometry record with optional skin.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriShape {
    pub transform: NifTransform,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub skin: Option<SkinInstance>,
}

/// A keyframe controller record.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeController {
    /// Controller flags; bits 1-2 encode the cycle mode, bit 3 is the
    /// active flag.
    pub flags: u16,
    pub data: KeyframeData,
}

/// One controlled channel of an animation sequence: the target node is
/// referenced by (format-side) name.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlledBlock {
    pub target_name: String,
    pub controller: BlockIndex,
}

/// A self-contained animation batch targeting nodes by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub controlled: Vec<ControlledBlock>,
    pub text_keys: Option<BlockIndex>,
    pub cycle: CycleKind,
}

/// Closed set of record kinds handled by the bridge. One variant per
/// concrete kind; dispatch is by exhaustive match.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Node(NifNode),
    TriShape(TriShape),
    KeyframeController(KeyframeController),
    Sequence(Sequence),
    TextKeys(Vec<TextKey>),
}

impl BlockData {
    /// Value-object kinds carry no identity; content-equal instances are
    /// interchangeable and may be deduplicated on registration.
    #[must_use]
    pub fn is_value_object(&self) -> bool {
        matches!(self, Self::TextKeys(_))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Node(_) => "NiNode",
            Self::TriShape(_) => "NiTriShape",
            Self::KeyframeController(_) => "NiKeyframeController",
            Self::Sequence(_) => "NiControllerSequence",
            Self::TextKeys(_) => "NiTextKeyExtraData",
        }
    }
}

/// A named, typed record.
#[derive(Debug, Clone, PartialEq)]
pub struct NifBlock {
    pub name: String,
    pub data: BlockData,
}

/// Arena of parsed records.
#[derive(Debug, Clone, Default)]
pub struct NifScene {
    pub blocks: Vec<NifBlock>,
}

impl NifScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and return its index.
    pub fn add_block(&mut self, name: impl Into<String>, data: BlockData) -> BlockIndex {
        let index = BlockIndex(self.blocks.len());
        self.blocks.push(NifBlock {
            name: name.into(),
            data,
        });
        index
    }

    /// Type-name-keyed block factory.
    ///
    /// # Errors
    /// Returns [`Error::UnknownBlockType`] for a type name outside the
    /// closed set of handled record kinds.
    pub fn create_block(&mut self, type_name: &str, name: impl Into<String>) -> Result<BlockIndex> {
        let data = match type_name {
            "NiNode" => BlockData::Node(NifNode::default()),
            "NiTriShape" => BlockData::TriShape(TriShape::default()),
            "NiKeyframeController" => BlockData::KeyframeController(KeyframeController {
                flags: 0x000C,
                data: KeyframeData::empty(),
            }),
            "NiControllerSequence" => BlockData::Sequence(Sequence {
                controlled: Vec::new(),
                text_keys: None,
                cycle: CycleKind::Clamp,
            }),
            "NiTextKeyExtraData" => BlockData::TextKeys(Vec::new()),
            other => return Err(Error::UnknownBlockType(other.to_string())),
        };
        let name = name.into();
        tracing::debug!("creating {type_name} block '{name}'");
        Ok(self.add_block(name, data))
    }

    #[must_use]
    pub fn block(&self, index: BlockIndex) -> &NifBlock {
        &self.blocks[index.0]
    }

    pub fn block_mut(&mut self, index: BlockIndex) -> &mut NifBlock {
        &mut self.blocks[index.0]
    }

    /// Borrow a hierarchy record.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedBlockKind`] if the block is not a node.
    pub fn node(&self, index: BlockIndex) -> Result<&NifNode> {
        match &self.block(index).data {
            BlockData::Node(node) => Ok(node),
            _ => Err(Error::UnexpectedBlockKind {
                index: index.0,
                expected: "NiNode",
            }),
        }
    }

    /// Mutably borrow a hierarchy record.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedBlockKind`] if the block is not a node.
    pub fn node_mut(&mut self, index: BlockIndex) -> Result<&mut NifNode> {
        match &mut self.block_mut(index).data {
            BlockData::Node(node) => Ok(node),
            _ => Err(Error::UnexpectedBlockKind {
                index: index.0,
                expected: "NiNode",
            }),
        }
    }

    /// Local transform of a node or geometry block; identity for others.
    #[must_use]
    pub fn local_transform(&self, index: BlockIndex) -> Mat4 {
        match &self.block(index).data {
            BlockData::Node(node) => node.transform.to_mat4(),
            BlockData::TriShape(shape) => shape.transform.to_mat4(),
            _ => Mat4::IDENTITY,
        }
    }

    /// Depth-first preorder walk of the hierarchy under `root`, yielding
    /// `root` itself first. Only node blocks contribute children.
    #[must_use]
    pub fn tree(&self, root: BlockIndex) -> TreeIter<'_> {
        TreeIter {
            scene: self,
            stack: vec![root],
        }
    }
}

/// Iterator over a block subtree, depth-first preorder.
pub struct TreeIter<'a> {
    scene: &'a NifScene,
    stack: Vec<BlockIndex>,
}

impl Iterator for TreeIter<'_> {
    type Item = BlockIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.stack.pop()?;
        if let BlockData::Node(node) = &self.scene.block(index).data {
            // push in reverse so the first child is visited first
            for &child in node.children.iter().rev() {
                self.stack.push(child);
            }
        }
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_children(scene: &mut NifScene, name: &str, children: Vec<BlockIndex>) -> BlockIndex {
        scene.add_block(
            name,
            BlockData::Node(NifNode {
                children,
                ..NifNode::default()
            }),
        )
    }

    #[test]
    fn test_tree_walk_is_preorder() {
        let mut scene = NifScene::new();
        let leaf_a = node_with_children(&mut scene, "a", vec![]);
        let leaf_b = node_with_children(&mut scene, "b", vec![]);
        let mid = node_with_children(&mut scene, "mid", vec![leaf_a, leaf_b]);
        let leaf_c = node_with_children(&mut scene, "c", vec![]);
        let root = node_with_children(&mut scene, "root", vec![mid, leaf_c]);

        let order: Vec<&str> = scene.tree(root).map(|i| scene.block(i).name.as_str()).collect();
        assert_eq!(order, vec!["root", "mid", "a", "b", "c"]);
    }

    #[test]
    fn test_factory_rejects_unknown_type() {
        let mut scene = NifScene::new();
        let err = scene.create_block("NiBogusBlock", "x").unwrap_err();
        assert!(matches!(err, Error::UnknownBlockType(_)));
    }

    #[test]
    fn test_coverage_counts_distinct_bones() {
        let mut scene = NifScene::new();
        let bone = node_with_children(&mut scene, "bone", vec![]);
        let other = node_with_children(&mut scene, "other", vec![]);
        let skin = SkinInstance {
            skeleton_root: bone,
            bones: vec![
                SkinBone { bone, skin_transform: Mat4::IDENTITY, weights: vec![] },
                SkinBone { bone, skin_transform: Mat4::IDENTITY, weights: vec![] },
                SkinBone { bone: other, skin_transform: Mat4::IDENTITY, weights: vec![] },
            ],
        };
        assert_eq!(skin.coverage(), 2);
    }
}
