//! Error types for `nifbridge`

use thiserror::Error;

/// The error type for `nifbridge` operations.
///
/// Only structural impossibilities are errors; data-quality issues
/// (divergent bind poses, weak frame-rate evidence, lossy interpolation)
/// are reported as [`crate::report::Warning`]s instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== Configuration Errors ====================
    /// The requested axis pair cannot form an orthogonal basis.
    #[error("invalid axis pair: forward {forward} and up {up} are not orthogonal")]
    InvalidAxisPair {
        /// The requested forward axis identifier.
        forward: &'static str,
        /// The requested up axis identifier.
        up: &'static str,
    },

    /// An axis identifier string could not be parsed.
    #[error("unknown axis identifier: {0:?} (expected X, Y, Z, -X, -Y or -Z)")]
    UnknownAxis(String),

    // ==================== Skeleton Errors ====================
    /// An animated channel or skin references a bone that does not exist
    /// in the skeleton being exported.
    #[error("bone '{bone}' referenced by '{referrer}' not found in skeleton")]
    BoneNotFound {
        /// The missing bone name.
        bone: String,
        /// The channel or skin that referenced it.
        referrer: String,
    },

    /// The skeleton root has no nodes under it.
    #[error("skeleton root '{0}' contains no nodes")]
    EmptySkeleton(String),

    /// A block index did not resolve to the expected record kind
    /// (internal consistency error in the parsed record tree).
    #[error("block {index} is not a {expected}")]
    UnexpectedBlockKind {
        /// The offending block index.
        index: usize,
        /// The record kind that was required.
        expected: &'static str,
    },

    // ==================== Record Factory Errors ====================
    /// The block factory was asked for a type name it does not know.
    #[error("'{0}': unknown block type (this is probably a bug)")]
    UnknownBlockType(String),
}

/// A specialized Result type for `nifbridge` operations.
pub type Result<T> = std::result::Result<T, Error>;
