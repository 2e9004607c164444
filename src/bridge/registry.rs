//! Bidirectional association between format blocks and scene bones, plus
//! bone-name translation between the two naming conventions.

use indexmap::IndexMap;

use crate::formats::{BlockData, BlockIndex, NifScene};
use crate::scene::BoneIndex;

/// Direction of a name translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameDirection {
    /// Format-side name to scene-side name.
    ToScene,
    /// Scene-side name to format-side name.
    ToFormat,
}

/// Translate a bone name between the format's "<prefix> <side> <base>"
/// convention and the scene's "<prefix> <base>.<side>" suffix convention.
///
/// The two directions are exact inverses for any name that matches a rule;
/// anything else passes through unchanged. Empty format-side names become
/// `"noname"` so the scene always gets a usable identifier.
#[must_use]
pub fn translate_name(name: &str, direction: NameDirection) -> String {
    match direction {
        NameDirection::ToScene => {
            if name.is_empty() {
                return "noname".to_string();
            }
            if let Some(base) = name.strip_prefix("Bip01 L ") {
                return format!("Bip01 {base}.L");
            }
            if let Some(base) = name.strip_prefix("Bip01 R ") {
                return format!("Bip01 {base}.R");
            }
            if name.starts_with("NPC L ") && name.ends_with(']') {
                return name
                    .replacen("NPC L ", "NPC ", 1)
                    .replace("[L", "[")
                    .replace(']', "].L");
            }
            if name.starts_with("NPC R ") && name.ends_with(']') {
                return name
                    .replacen("NPC R ", "NPC ", 1)
                    .replace("[R", "[")
                    .replace(']', "].R");
            }
            name.to_string()
        }
        NameDirection::ToFormat => {
            if let Some(base) = name.strip_prefix("Bip01 ") {
                if let Some(core) = base.strip_suffix(".L") {
                    return format!("Bip01 L {core}");
                }
                if let Some(core) = base.strip_suffix(".R") {
                    return format!("Bip01 R {core}");
                }
            }
            if name.starts_with("NPC ") && name.ends_with("].L") {
                return name
                    .replacen("NPC ", "NPC L ", 1)
                    .replace('[', "[L")
                    .replace("].L", "]");
            }
            if name.starts_with("NPC ") && name.ends_with("].R") {
                return name
                    .replacen("NPC ", "NPC R ", 1)
                    .replace('[', "[R")
                    .replace("].R", "]");
            }
            name.to_string()
        }
    }
}

/// Deduplicating two-way map between format blocks and scene bones.
///
/// Iteration order is insertion order on both sides; authority decisions
/// elsewhere rely on that being stable.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    block_to_bone: IndexMap<BlockIndex, BoneIndex>,
    bone_to_block: IndexMap<BoneIndex, BlockIndex>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a block with a bone. Idempotent; re-registering an
    /// existing pair is a no-op and a conflicting re-registration keeps
    /// the first association.
    pub fn register(&mut self, block: BlockIndex, bone: BoneIndex) {
        self.block_to_bone.entry(block).or_insert(bone);
        self.bone_to_block.entry(bone).or_insert(block);
    }

    /// Register a block that carries no identity of its own: if the scene
    /// already holds a content-equal block of the same kind, that block's
    /// index is returned instead of adding a duplicate. Callers must use
    /// the returned index. First content match wins.
    pub fn register_value_block(
        &mut self,
        scene: &mut NifScene,
        name: &str,
        data: BlockData,
    ) -> BlockIndex {
        if data.is_value_object() {
            if let Some(existing) = scene
                .blocks
                .iter()
                .position(|b| b.data == data)
                .map(BlockIndex)
            {
                tracing::debug!("reusing content-equal {} block", data.type_name());
                return existing;
            }
        }
        scene.add_block(name, data)
    }

    #[must_use]
    pub fn resolve_bone(&self, block: BlockIndex) -> Option<BoneIndex> {
        self.block_to_bone.get(&block).copied()
    }

    #[must_use]
    pub fn resolve_block(&self, bone: BoneIndex) -> Option<BlockIndex> {
        self.bone_to_block.get(&bone).copied()
    }

    /// Registered blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.block_to_bone.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::TextKey;

    fn round_trips(format_name: &str, scene_name: &str) {
        assert_eq!(translate_name(format_name, NameDirection::ToScene), scene_name);
        assert_eq!(translate_name(scene_name, NameDirection::ToFormat), format_name);
    }

    #[test]
    fn test_bip_name_round_trip() {
        round_trips("Bip01 L Hand", "Bip01 Hand.L");
        round_trips("Bip01 R UpperArm", "Bip01 UpperArm.R");
    }

    #[test]
    fn test_npc_name_round_trip() {
        round_trips("NPC L Clavicle [LClv]", "NPC Clavicle [Clv].L");
        round_trips("NPC R Foot [RFt ]", "NPC Foot [Ft ].R");
    }

    #[test]
    fn test_unmatched_name_passes_through() {
        round_trips("Bip01", "Bip01");
        round_trips("Quiver", "Quiver");
        // "Bip01 Spine" has no side marker, both directions leave it alone
        assert_eq!(translate_name("Bip01 Spine", NameDirection::ToScene), "Bip01 Spine");
        assert_eq!(translate_name("Bip01 Spine", NameDirection::ToFormat), "Bip01 Spine");
    }

    #[test]
    fn test_empty_name_becomes_noname() {
        assert_eq!(translate_name("", NameDirection::ToScene), "noname");
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = NodeRegistry::new();
        reg.register(BlockIndex(3), BoneIndex(0));
        reg.register(BlockIndex(3), BoneIndex(0));
        reg.register(BlockIndex(3), BoneIndex(7));
        assert_eq!(reg.resolve_bone(BlockIndex(3)), Some(BoneIndex(0)));
        assert_eq!(reg.resolve_block(BoneIndex(0)), Some(BlockIndex(3)));
        assert_eq!(reg.resolve_bone(BlockIndex(9)), None);
    }

    #[test]
    fn test_value_block_dedup() {
        let mut reg = NodeRegistry::new();
        let mut scene = NifScene::new();
        let keys = vec![TextKey { time: 0.0, label: "start".to_string() }];
        let first = reg.register_value_block(&mut scene, "keys", BlockData::TextKeys(keys.clone()));
        let second = reg.register_value_block(&mut scene, "keys", BlockData::TextKeys(keys));
        assert_eq!(first, second);
        assert_eq!(scene.blocks.len(), 1);

        let other = reg.register_value_block(
            &mut scene,
            "keys",
            BlockData::TextKeys(vec![TextKey { time: 1.0, label: "end".to_string() }]),
        );
        assert_ne!(first, other);
        assert_eq!(scene.blocks.len(), 2);
    }
}
