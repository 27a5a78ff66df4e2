//! Fixed-rate resampling.
//!
//! All channels of a clip are evaluated on one frame grid; per frame the
//! animated ops are written, each animated bone's local matrix recomposed
//! and decomposed into position / rotation / scale.

use std::collections::HashSet;

use dax_math::{Mat4, Mat4Ext, Quat, QuatExt, Vec3};

use crate::diagnostics::WarningLimiter;
use crate::options::{ConverterOptions, TrackTolerances};
use crate::scene::{NodeId, SceneNodes};
use crate::skeleton::Skeleton;

use super::channel::AnimationChannel;
use super::AnimationResult;

/// Rate used when no channel has a measurable rate.
pub const DEFAULT_FPS: f32 = 30.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ResampleOptions {
    pub fps: Option<f32>,
    /// Shorten the clip to whole frames instead of stretching the rate.
    pub truncate: bool,
    pub remove_constant_tracks: bool,
    pub tolerances: TrackTolerances,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self::from(&ConverterOptions::default())
    }
}

impl From<&ConverterOptions> for ResampleOptions {
    fn from(options: &ConverterOptions) -> Self {
        Self {
            fps: options.animation_fps,
            truncate: options.truncate_resampled_animations,
            remove_constant_tracks: options.remove_constant_tracks,
            tolerances: options.tolerances.clone(),
        }
    }
}

/// Resampled transform of one bone, one entry per frame.
///
/// `positions` / `rotations` / `scales` are the parent-relative local
/// transform; the `rel_*` streams are the delta from the rest pose
/// (inverse rest · local).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Track {
    pub bone: usize,
    pub positions: Option<Vec<f32>>,
    /// xyzw
    pub rotations: Option<Vec<f32>>,
    pub scales: Option<Vec<f32>>,
    pub rel_positions: Option<Vec<f32>>,
    pub rel_rotations: Option<Vec<f32>>,
    pub rel_scales: Option<Vec<f32>>,
}

impl Track {
    pub fn is_empty(&self) -> bool {
        self.positions.is_none() && self.rotations.is_none() && self.scales.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub fps: f32,
    pub frames: usize,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    pub fn duration(&self) -> f32 {
        if self.frames < 2 || self.fps <= 0.0 {
            0.0
        } else {
            (self.frames - 1) as f32 / self.fps
        }
    }
}

/// Frame grid of a clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGrid {
    pub begin: f32,
    pub fps: f32,
    pub frames: usize,
}

impl FrameGrid {
    pub fn time(&self, frame: usize) -> f32 {
        self.begin + frame as f32 / self.fps
    }

    pub fn duration(&self) -> f32 {
        (self.frames - 1) as f32 / self.fps
    }
}

/// Median of the channels' key rates.
pub fn median_fps(channels: &[AnimationChannel]) -> Option<f32> {
    let mut rates: Vec<f32> = channels.iter().filter_map(AnimationChannel::fps).collect();
    if rates.is_empty() {
        return None;
    }
    rates.sort_by(f32::total_cmp);
    let mid = rates.len() / 2;
    Some(if rates.len() % 2 == 0 {
        0.5 * (rates[mid - 1] + rates[mid])
    } else {
        rates[mid]
    })
}

/// Frame grid covering [min begin, max end] of all channels.
///
/// frames = max(2, floor(fps · duration) + 1). With `truncate` the duration
/// shrinks to the whole frames, otherwise the rate stretches to cover it.
pub fn frame_grid(channels: &[AnimationChannel], options: &ResampleOptions) -> FrameGrid {
    let begin = channels.iter().map(|c| c.begin()).fold(f32::INFINITY, f32::min);
    let end = channels.iter().map(|c| c.end()).fold(f32::NEG_INFINITY, f32::max);
    let (begin, end) = if begin.is_finite() && end >= begin {
        (begin, end)
    } else {
        (0.0, 0.0)
    };
    let duration = end - begin;

    let fps = options
        .fps
        .filter(|f| *f > 0.0)
        .or_else(|| median_fps(channels))
        .unwrap_or(DEFAULT_FPS);
    let frames = ((fps * duration + 1e-4).floor() as usize + 1).max(2);

    let fps = if options.truncate || duration <= 0.0 {
        fps
    } else {
        (frames - 1) as f32 / duration
    };
    FrameGrid { begin, fps, frames }
}

struct Sampled {
    bone: usize,
    node: NodeId,
    rest_inverse: Mat4,
    positions: Vec<f32>,
    rotations: Vec<f32>,
    scales: Vec<f32>,
    rel_positions: Vec<f32>,
    rel_rotations: Vec<f32>,
    rel_scales: Vec<f32>,
    max_translation: f32,
    max_angle: f32,
    max_scale: f32,
}

fn push_rotation(stream: &mut Vec<f32>, mut q: Quat) {
    // Keep consecutive quaternions in the same hemisphere
    if stream.len() >= 4 {
        let n = stream.len();
        let prev = Quat::from_xyzw(stream[n - 4], stream[n - 3], stream[n - 2], stream[n - 1]);
        if prev.dot(q) < 0.0 {
            q = -q;
        }
    }
    stream.extend_from_slice(&q.to_array());
}

/// Resample a clip into per-bone tracks.
///
/// Animated ops are restored to their rest values afterwards.
pub fn resample(
    name: &str,
    channels: &[AnimationChannel],
    nodes: &mut SceneNodes,
    skeleton: &Skeleton,
    options: &ResampleOptions,
    warnings: &mut WarningLimiter,
) -> AnimationResult<AnimationClip> {
    let grid = frame_grid(channels, options);
    let animated: HashSet<NodeId> = channels.iter().map(|c| c.target.node).collect();

    nodes.reset_transforms();
    nodes.update_matrices();
    let mut sampled: Vec<Sampled> = skeleton
        .bones
        .iter()
        .enumerate()
        .filter(|(_, b)| animated.contains(&b.node))
        .map(|(bone, b)| Sampled {
            bone,
            node: b.node,
            rest_inverse: nodes.local_matrix(b.node).inverse(),
            positions: Vec::with_capacity(grid.frames * 3),
            rotations: Vec::with_capacity(grid.frames * 4),
            scales: Vec::with_capacity(grid.frames * 3),
            rel_positions: Vec::with_capacity(grid.frames * 3),
            rel_rotations: Vec::with_capacity(grid.frames * 4),
            rel_scales: Vec::with_capacity(grid.frames * 3),
            max_translation: 0.0,
            max_angle: 0.0,
            max_scale: 0.0,
        })
        .collect();

    for frame in 0..grid.frames {
        let t = grid.time(frame);
        nodes.reset_transforms();
        for channel in channels {
            channel.apply(t, nodes, warnings)?;
        }
        for s in &mut sampled {
            let local = nodes.update_local_matrix(s.node);
            let (translation, rotation, scale) = local.decompose();
            s.positions.extend_from_slice(&translation.to_array());
            push_rotation(&mut s.rotations, rotation);
            s.scales.extend_from_slice(&scale.to_array());

            let (rel_t, rel_r, rel_s) = (s.rest_inverse * local).decompose();
            s.rel_positions.extend_from_slice(&rel_t.to_array());
            push_rotation(&mut s.rel_rotations, rel_r);
            s.rel_scales.extend_from_slice(&rel_s.to_array());

            s.max_translation = s.max_translation.max(rel_t.length());
            s.max_angle = s.max_angle.max(rel_r.rotation_angle());
            s.max_scale = s.max_scale.max((rel_s - Vec3::ONE).abs().max_element());
        }
    }

    nodes.reset_transforms();
    nodes.update_matrices();

    let tolerances = &options.tolerances;
    let mut dropped = 0;
    let tracks: Vec<Track> = sampled
        .into_iter()
        .filter_map(|s| {
            let keep = |max: f32, tolerance: f32| !options.remove_constant_tracks || max >= tolerance;
            let keep_position = keep(s.max_translation, tolerances.position);
            let keep_rotation = keep(s.max_angle, tolerances.rotation);
            let keep_scale = keep(s.max_scale, tolerances.scale);
            let track = Track {
                bone: s.bone,
                positions: keep_position.then_some(s.positions),
                rotations: keep_rotation.then_some(s.rotations),
                scales: keep_scale.then_some(s.scales),
                rel_positions: keep_position.then_some(s.rel_positions),
                rel_rotations: keep_rotation.then_some(s.rel_rotations),
                rel_scales: keep_scale.then_some(s.rel_scales),
            };
            if track.is_empty() {
                dropped += 1;
                None
            } else {
                Some(track)
            }
        })
        .collect();

    log::debug!(
        "Clip '{}': {} frames at {:.3} fps, {} tracks ({} constant tracks dropped)",
        name,
        grid.frames,
        grid.fps,
        tracks.len(),
        dropped
    );

    Ok(AnimationClip {
        name: name.to_string(),
        fps: grid.fps,
        frames: grid.frames,
        tracks,
    })
}
