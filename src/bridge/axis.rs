//! Change of basis between the authoring tool's axis convention and the
//! interchange format's.
//!
//! The scene side is forward = Y, up = Z. The format side is configurable
//! per title; the basis is an explicit value threaded through every
//! conversion, built once per call and applied exactly once per hierarchy
//! level.

use glam::{Mat3, Mat4, Vec3};

use crate::error::{Error, Result};

/// A signed principal axis.
///
/// Variant order matters: orientation inference indexes into this order
/// and picks the "next" identifier as the up axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    NegX,
    NegY,
    NegZ,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::NegX, Axis::NegY, Axis::NegZ];

    /// Parse an axis identifier as written in host preferences.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAxis`] for anything but `X`, `Y`, `Z`,
    /// `-X`, `-Y`, `-Z`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "X" => Ok(Self::X),
            "Y" => Ok(Self::Y),
            "Z" => Ok(Self::Z),
            "-X" => Ok(Self::NegX),
            "-Y" => Ok(Self::NegY),
            "-Z" => Ok(Self::NegZ),
            other => Err(Error::UnknownAxis(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
            Self::NegX => "-X",
            Self::NegY => "-Y",
            Self::NegZ => "-Z",
        }
    }

    #[must_use]
    pub fn vector(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
            Self::NegX => Vec3::NEG_X,
            Self::NegY => Vec3::NEG_Y,
            Self::NegZ => Vec3::NEG_Z,
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|a| *a == self).unwrap_or(0)
    }
}

/// The forward/up identifiers a basis is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPair {
    pub forward: Axis,
    pub up: Axis,
}

impl AxisPair {
    /// Parse a pair of axis identifier strings.
    ///
    /// # Errors
    /// [`Error::UnknownAxis`] if either string does not name an axis.
    pub fn parse(forward: &str, up: &str) -> Result<Self> {
        Ok(Self {
            forward: Axis::parse(forward)?,
            up: Axis::parse(up)?,
        })
    }
}

/// The active change of basis.
#[derive(Debug, Clone, Copy)]
pub struct AxisBasis {
    pair: AxisPair,
    correction: Mat4,
    correction_inv: Mat4,
}

impl AxisBasis {
    /// Scene-side convention the correction maps onto.
    const SCENE_FORWARD: Vec3 = Vec3::Y;
    const SCENE_UP: Vec3 = Vec3::Z;

    /// Build the basis rotating the format's (forward, up) frame onto the
    /// scene's (Y, Z) frame.
    ///
    /// # Errors
    /// [`Error::InvalidAxisPair`] if forward and up are colinear.
    pub fn new(pair: AxisPair) -> Result<Self> {
        let f = pair.forward.vector();
        let u = pair.up.vector();
        let side = f.cross(u);
        if side.length_squared() < 1e-6 {
            return Err(Error::InvalidAxisPair {
                forward: pair.forward.as_str(),
                up: pair.up.as_str(),
            });
        }

        let from = Mat3::from_cols(f, u, side);
        let to = Mat3::from_cols(
            Self::SCENE_FORWARD,
            Self::SCENE_UP,
            Self::SCENE_FORWARD.cross(Self::SCENE_UP),
        );
        let correction = Mat4::from_mat3(to * from.transpose());

        tracing::debug!(
            "axis basis: forward {} up {}",
            pair.forward.as_str(),
            pair.up.as_str()
        );
        Ok(Self {
            pair,
            correction,
            correction_inv: correction.inverse(),
        })
    }

    #[must_use]
    pub fn pair(&self) -> AxisPair {
        self.pair
    }

    /// Convert a format-side armature-space matrix to scene axes.
    /// Applied once per node while building rest poses; re-deriving under
    /// a different basis starts from the original matrix again, so the
    /// correction never compounds.
    #[must_use]
    pub fn rest_to_scene(&self, m: Mat4) -> Mat4 {
        m * self.correction_inv
    }

    /// Inverse of [`rest_to_scene`](Self::rest_to_scene).
    #[must_use]
    pub fn rest_to_format(&self, m: Mat4) -> Mat4 {
        m * self.correction
    }

    /// Convert one format-side keyframe sample into the bone's
    /// rest-relative scene frame.
    #[must_use]
    pub fn import_sample(&self, rest_rotation_inv: Mat4, sample: Mat4, is_bone: bool) -> Mat4 {
        if is_bone {
            self.correction * rest_rotation_inv * sample * self.correction_inv
        } else {
            rest_rotation_inv * sample
        }
    }

    /// Convert one scene-side keyframe sample back into the format's
    /// bone-local frame. Exact inverse of
    /// [`import_sample`](Self::import_sample).
    #[must_use]
    pub fn export_sample(&self, rest_rotation: Mat4, sample: Mat4, is_bone: bool) -> Mat4 {
        if is_bone {
            rest_rotation * self.correction_inv * sample * self.correction
        } else {
            rest_rotation * sample
        }
    }
}

/// Infer the format's axis convention from bone rest translations.
///
/// Each bone votes for the signed principal axis its translation points
/// along most strongly; the winning direction becomes forward and the next
/// identifier in [`Axis::ALL`] order becomes up. Skeletons with no usable
/// translations vote X.
#[must_use]
pub fn infer_axis_pair<I>(translations: I) -> AxisPair
where
    I: IntoIterator<Item = Vec3>,
{
    let mut votes = [0usize; 6];
    for t in translations {
        let abs = t.abs();
        let axis = if abs.x >= abs.y && abs.x >= abs.z {
            if t.x >= 0.0 { Axis::X } else { Axis::NegX }
        } else if abs.y >= abs.z {
            if t.y >= 0.0 { Axis::Y } else { Axis::NegY }
        } else if t.z >= 0.0 {
            Axis::Z
        } else {
            Axis::NegZ
        };
        votes[axis.index()] += 1;
    }

    let winner = votes
        .iter()
        .enumerate()
        .max_by_key(|(i, count)| (**count, usize::MAX - i))
        .map_or(Axis::X, |(i, _)| Axis::ALL[i]);
    let up = Axis::ALL[(winner.index() + 1) % Axis::ALL.len()];

    tracing::debug!("inferred axis pair: forward {} up {}", winner.as_str(), up.as_str());
    AxisPair { forward: winner, up }
}
