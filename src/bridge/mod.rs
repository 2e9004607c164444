//! The transform bridge: orchestration of axis conversion, bind-pose
//! reconciliation and keyframe resampling into the two public operations.
//!
//! Both entry points are plain functions over explicit inputs. The axis
//! basis, registry and solver are values scoped to one call; nothing is
//! cached or shared between runs.

pub mod axis;
pub mod bind_pose;
pub mod export;
pub mod import;
pub mod registry;
pub mod resample;

pub use axis::{infer_axis_pair, Axis, AxisBasis, AxisPair};
pub use bind_pose::{
    apply_corrections, export_skin_transform, solve_bind_pose, BindSolution, VertexCorrection,
    BIND_EPSILON,
};
pub use export::{export_skeleton_and_animation, NifExport};
pub use import::{accumulate_poses, import_skeleton_and_animation, SceneImport};
pub use registry::{translate_name, NameDirection, NodeRegistry};
pub use resample::{estimate_frame_rate, FPS_CANDIDATES, NATIVE_FPS};
