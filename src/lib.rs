//! # nifbridge
//!
//! Semantic bridge between an authoring tool's scene graph and NIF-style
//! scene-interchange records: skeletons, skinned meshes and keyframe
//! animation.
//!
//! Binary record I/O is not handled here. The crate consumes an
//! already-parsed, walkable record tree ([`formats`]) and produces the
//! authoring tool's entities ([`scene`]) — and the reverse. The hard part
//! it owns is reconciliation:
//!
//! - every skinned mesh stores its own bind pose, and meshes sharing a
//!   skeleton routinely disagree; the tool needs exactly one
//!   ([`bridge::bind_pose`]),
//! - keyframes are sampled at arbitrary per-channel timestamps while the
//!   tool runs a fixed-rate timeline ([`bridge::resample`]),
//! - the two sides use different axis conventions, converted exactly once
//!   per hierarchy level ([`bridge::axis`]).
//!
//! ## Example
//!
//! ```no_run
//! use nifbridge::bridge::{import_skeleton_and_animation, AxisPair};
//! use nifbridge::formats::{BlockIndex, NifScene};
//!
//! # fn parse() -> NifScene { NifScene::new() }
//! let mut scene = parse();
//! let axis = AxisPair::parse("X", "Z")?;
//! let import = import_skeleton_and_animation(&mut scene, BlockIndex(0), &[], Some(axis))?;
//! for warning in import.report.warnings() {
//!     eprintln!("{warning:?}");
//! }
//! # Ok::<(), nifbridge::Error>(())
//! ```

pub mod bridge;
pub mod error;
pub mod formats;
pub mod report;
pub mod scene;

pub use bridge::{export_skeleton_and_animation, import_skeleton_and_animation};
pub use error::{Error, Result};
pub use report::{Report, Warning};
