//! Keyframe channel records as stored in the interchange format.
//!
//! A channel is an ordered `(time, value)` sequence for one animated
//! property, sampled at arbitrary per-channel timestamps. Rotation is
//! either quaternion-keyed or split into three independently-timed euler
//! channels; the resampler reconciles the latter onto a shared timeline.

use glam::{Quat, Vec3};

/// Interpolation kind of a format-side key curve.
///
/// Discriminants follow the interchange format's key-type codes; `0` is
/// used by some titles and left undocumented by the format, so it gets its
/// own variant rather than being folded into another kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NifInterpolation {
    Unspecified,
    Linear,
    Quadratic,
    Tbc,
    XyzRotation,
    Const,
}

impl NifInterpolation {
    /// The raw key-type code for this kind.
    #[must_use]
    pub fn raw(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Linear => 1,
            Self::Quadratic => 2,
            Self::Tbc => 3,
            Self::XyzRotation => 4,
            Self::Const => 5,
        }
    }
}

/// Extrapolation of a controller or sequence once playback leaves the
/// keyed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Loop,
    Reverse,
    Clamp,
}

/// A single key of a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
}

/// One keyframe channel: ordered keys plus an interpolation kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCurve<T> {
    pub interpolation: NifInterpolation,
    pub keys: Vec<Key<T>>,
}

impl<T> KeyCurve<T> {
    #[must_use]
    pub fn new(interpolation: NifInterpolation) -> Self {
        Self {
            interpolation,
            keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key timestamps in authored order.
    pub fn times(&self) -> impl Iterator<Item = f32> + '_ {
        self.keys.iter().map(|k| k.time)
    }
}

impl<T> Default for KeyCurve<T> {
    fn default() -> Self {
        Self::new(NifInterpolation::Linear)
    }
}

/// Rotation keys of one controller. Euler-authored rotation keeps three
/// independently-timed scalar channels; quaternion-authored rotation is a
/// single channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RotationKeys {
    Quaternion(KeyCurve<Quat>),
    Euler([KeyCurve<f32>; 3]),
}

impl RotationKeys {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Quaternion(curve) => curve.is_empty(),
            Self::Euler(axes) => axes.iter().all(KeyCurve::is_empty),
        }
    }
}

/// The keyed transform data of one keyframe controller.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeData {
    pub rotations: Option<RotationKeys>,
    pub translations: KeyCurve<Vec3>,
    pub scales: KeyCurve<f32>,
}

impl KeyframeData {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rotations: None,
            translations: KeyCurve::default(),
            scales: KeyCurve::default(),
        }
    }

    /// All key timestamps of this controller, across every channel.
    /// Feed of the frame-rate estimator.
    pub fn all_times(&self) -> Vec<f32> {
        let mut times = Vec::new();
        match &self.rotations {
            Some(RotationKeys::Quaternion(curve)) => times.extend(curve.times()),
            Some(RotationKeys::Euler(axes)) => {
                for axis in axes {
                    times.extend(axis.times());
                }
            }
            None => {}
        }
        times.extend(self.translations.times());
        times.extend(self.scales.times());
        times
    }
}

/// A labelled timestamp (animation group marker).
#[derive(Debug, Clone, PartialEq)]
pub struct TextKey {
    pub time: f32,
    pub label: String,
}
