//! Conversion between the format's irregular per-channel key times and the
//! authoring tool's fixed-rate timeline.
//!
//! Covers frame-rate inference, reconciliation of independently-timed
//! euler channels onto one shared timeline, and the interpolation /
//! extrapolation mapping tables for both directions.

use crate::formats::keys::{CycleKind, KeyCurve, NifInterpolation};
use crate::report::{Report, Warning};
use crate::scene::SceneInterpolation;

/// The authoring tool's default frame rate, used when the evidence does
/// not favour any other candidate.
pub const NATIVE_FPS: f32 = 30.0;

/// Frame rates commonly used by authored content.
pub const FPS_CANDIDATES: [f32; 5] = [20.0, 24.0, 25.0, 30.0, 35.0];

/// Infer the frame rate a set of key times was authored at.
///
/// Scores each candidate by how far every key time lands from an integer
/// frame at that rate and keeps the strict minimum, so the native default
/// wins ties. Computed once per animation batch.
#[must_use]
pub fn estimate_frame_rate(times: &[f32]) -> f32 {
    let mut sorted: Vec<f32> = times.to_vec();
    sorted.sort_by(f32::total_cmp);
    sorted.dedup();

    let score = |fps: f32| -> f32 {
        sorted
            .iter()
            .map(|t| {
                let frame = t * fps;
                (frame - frame.round()).abs()
            })
            .sum()
    };

    let mut best = NATIVE_FPS;
    let mut best_score = score(NATIVE_FPS);
    for fps in FPS_CANDIDATES {
        let s = score(fps);
        if s < best_score {
            best = fps;
            best_score = s;
        }
    }
    tracing::debug!("estimated frame rate: {best} fps ({} key times)", sorted.len());
    best
}

/// Timeline frame for a key time at the given rate.
#[must_use]
pub fn time_to_frame(time: f32, fps: f32) -> f32 {
    (time * fps).round()
}

#[must_use]
pub fn frame_to_time(frame: f32, fps: f32) -> f32 {
    frame / fps
}

/// Sorted, deduplicated union of the three euler channels' key times.
/// Channels with zero keys contribute nothing; disjoint ranges are fine.
#[must_use]
pub fn union_euler_times(axes: &[KeyCurve<f32>; 3]) -> Vec<f32> {
    let mut times: Vec<f32> = axes.iter().flat_map(KeyCurve::times).collect();
    times.sort_by(f32::total_cmp);
    times.dedup();
    times
}

/// Evaluate a scalar channel at `time` with linear interpolation.
///
/// Outside the keyed range the edge segment's slope is extended, so a
/// channel missing a key at a union time still moves consistently with its
/// neighbours. Single-key channels are constant; empty channels are zero.
#[must_use]
pub fn sample_linear(curve: &KeyCurve<f32>, time: f32) -> f32 {
    let keys = &curve.keys;
    match keys.len() {
        0 => 0.0,
        1 => keys[0].value,
        _ => {
            let first = &keys[0];
            let last = &keys[keys.len() - 1];
            if time <= first.time {
                let next = &keys[1];
                first.value + slope(first.time, first.value, next.time, next.value) * (time - first.time)
            } else if time >= last.time {
                let prev = &keys[keys.len() - 2];
                last.value + slope(prev.time, prev.value, last.time, last.value) * (time - last.time)
            } else {
                // first bracketing pair
                let hi = keys.iter().position(|k| k.time >= time).unwrap_or(keys.len() - 1);
                let (a, b) = (&keys[hi - 1], &keys[hi]);
                a.value + slope(a.time, a.value, b.time, b.value) * (time - a.time)
            }
        }
    }
}

fn slope(t0: f32, v0: f32, t1: f32, v1: f32) -> f32 {
    let dt = t1 - t0;
    if dt.abs() < f32::EPSILON {
        0.0
    } else {
        (v1 - v0) / dt
    }
}

/// Resample three independently-timed euler channels onto their shared
/// timeline: one `(time, [x, y, z])` sample per union time.
#[must_use]
pub fn resample_euler(axes: &[KeyCurve<f32>; 3]) -> Vec<(f32, [f32; 3])> {
    union_euler_times(axes)
        .into_iter()
        .map(|t| {
            (
                t,
                [
                    sample_linear(&axes[0], t),
                    sample_linear(&axes[1], t),
                    sample_linear(&axes[2], t),
                ],
            )
        })
        .collect()
}

/// Map a format-side interpolation kind onto the nearest scene-side kind.
/// Quadratic and TBC collapse to bezier; step-like and unspecified kinds
/// fall back to constant with a warning, since the fallback is lossy.
pub fn map_interpolation(
    kind: NifInterpolation,
    channel: &str,
    report: &mut Report,
) -> SceneInterpolation {
    match kind {
        NifInterpolation::Linear | NifInterpolation::XyzRotation => SceneInterpolation::Linear,
        NifInterpolation::Quadratic | NifInterpolation::Tbc => SceneInterpolation::Bezier,
        NifInterpolation::Const | NifInterpolation::Unspecified => {
            report.push(Warning::UnsupportedInterpolation {
                channel: channel.to_string(),
                kind: kind.raw(),
            });
            SceneInterpolation::Constant
        }
    }
}

/// Export-side inverse of [`map_interpolation`].
#[must_use]
pub fn export_interpolation(kind: SceneInterpolation) -> NifInterpolation {
    match kind {
        SceneInterpolation::Linear => NifInterpolation::Linear,
        SceneInterpolation::Bezier => NifInterpolation::Quadratic,
        SceneInterpolation::Constant => NifInterpolation::Const,
    }
}

/// Decode a controller's cycle mode from its flags (bits 1-2). Reverse
/// playback has no scene-side counterpart and clamps with a warning.
pub fn cycle_from_flags(flags: u16, channel: &str, report: &mut Report) -> CycleKind {
    match flags & 0x6 {
        0x0 => CycleKind::Loop,
        0x4 => CycleKind::Clamp,
        _ => {
            report.push(Warning::UnsupportedExtrapolation {
                channel: channel.to_string(),
            });
            CycleKind::Clamp
        }
    }
}

/// Controller flags for an exported curve: active bit plus the cycle mode
/// synthesized from whether the curve carries a cyclic modifier.
#[must_use]
pub fn flags_from_cyclic(cyclic: bool) -> u16 {
    if cyclic { 0x8 } else { 0x8 | 0x4 }
}
