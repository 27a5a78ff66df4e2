//! Keyframe search and curve evaluation.

use crate::diagnostics::WarningLimiter;

use super::channel::{AnimationChannel, Interpolation};
use super::{AnimationError, AnimationResult};

/// Bisection steps before a cubic solve is given up.
pub const MAX_SOLVE_ITERATIONS: usize = 100;

/// Solve tolerances, relative to the segment duration.
const BEZIER_TOLERANCE: f64 = 1e-4;
const HERMITE_TOLERANCE: f64 = 1e-5;

/// Bracketing keys of `t` in a non-decreasing `input`.
///
/// Returns `(i, i)` before the first key or at/after the last key.
pub fn find_keys(input: &[f32], t: f32) -> (usize, usize) {
    let after = input.partition_point(|&k| k <= t);
    if after == 0 {
        (0, 0)
    } else if after >= input.len() {
        let last = input.len().saturating_sub(1);
        (last, last)
    } else {
        (after - 1, after)
    }
}

fn bezier(p0: f64, c0: f64, c1: f64, p1: f64, s: f64) -> f64 {
    let u = 1.0 - s;
    u * u * u * p0 + 3.0 * u * u * s * c0 + 3.0 * u * s * s * c1 + s * s * s * p1
}

fn hermite(p0: f64, m0: f64, m1: f64, p1: f64, s: f64) -> f64 {
    let s2 = s * s;
    let s3 = s2 * s;
    (2.0 * s3 - 3.0 * s2 + 1.0) * p0 + (s3 - 2.0 * s2 + s) * m0 + (-2.0 * s3 + 3.0 * s2) * p1 + (s3 - s2) * m1
}

/// Find `s` in [0, 1] with `curve(s) == t` by bisection. The curve is
/// assumed monotonic with `curve(0) <= t <= curve(1)`.
fn solve(curve: impl Fn(f64) -> f64, t: f64, tolerance: f64) -> Option<f64> {
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..MAX_SOLVE_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let diff = curve(mid) - t;
        if diff.abs() <= tolerance {
            return Some(mid);
        }
        if diff < 0.0 {
            lo = mid;
        } else if diff > 0.0 {
            hi = mid;
        } else {
            // NaN
            return None;
        }
    }
    None
}

/// Value of component `j` of `channel` at `t` between keys `i0` and `i1`.
pub(crate) fn evaluate_segment(
    channel: &AnimationChannel,
    interpolation: Interpolation,
    i0: usize,
    i1: usize,
    j: usize,
    t: f32,
    warnings: &mut WarningLimiter,
) -> AnimationResult<f32> {
    let count = channel.count;
    let v0 = channel.output[i0 * count + j];
    let v1 = channel.output[i1 * count + j];
    let (t0, t1) = (channel.input[i0], channel.input[i1]);
    if t1 <= t0 {
        return Ok(v0);
    }

    match interpolation {
        Interpolation::Step => Ok(v0),
        Interpolation::Linear => {
            let s = (t - t0) / (t1 - t0);
            Ok(v0 + (v1 - v0) * s)
        }
        Interpolation::Bezier | Interpolation::Hermite => {
            let (Some(ins), Some(outs)) = (&channel.in_tangents, &channel.out_tangents) else {
                warnings.warn("missing tangents", || {
                    format!("{:?} segment [{}, {}] has no tangents, evaluating linearly", interpolation, t0, t1)
                });
                let s = (t - t0) / (t1 - t0);
                return Ok(v0 + (v1 - v0) * s);
            };
            let out_base = (i0 * count + j) * 2;
            let in_base = (i1 * count + j) * 2;
            let (c0t, c0v) = (outs[out_base] as f64, outs[out_base + 1] as f64);
            let (c1t, c1v) = (ins[in_base] as f64, ins[in_base + 1] as f64);
            let (t0d, t1d, v0d, v1d) = (t0 as f64, t1 as f64, v0 as f64, v1 as f64);
            let span = t1d - t0d;

            let value = if interpolation == Interpolation::Bezier {
                let s = solve(|s| bezier(t0d, c0t, c1t, t1d, s), t as f64, BEZIER_TOLERANCE * span);
                s.map(|s| bezier(v0d, c0v, c1v, v1d, s))
            } else {
                // Hermite tangents are slopes scaled to the segment
                let s = solve(|s| hermite(t0d, c0t, c1t, t1d, s), t as f64, HERMITE_TOLERANCE * span);
                s.map(|s| hermite(v0d, c0v, c1v, v1d, s))
            };

            value.map(|v| v as f32).ok_or(AnimationError::NoConvergence {
                t,
                t0,
                t1,
                iterations: MAX_SOLVE_ITERATIONS,
            })
        }
    }
}
