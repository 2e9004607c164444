//! Format-record collaborator surface.
//!
//! The bridge never touches binary record layout; it consumes and produces
//! the already-parsed structures in this module.

pub mod keys;
pub mod nif;

pub use keys::{CycleKind, Key, KeyCurve, KeyframeData, NifInterpolation, RotationKeys, TextKey};
pub use nif::{
    BlockData, BlockIndex, ControlledBlock, KeyframeController, NifBlock, NifNode, NifScene,
    NifTransform, Sequence, SkinBone, SkinInstance, TriShape,
};
