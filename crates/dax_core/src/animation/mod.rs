//! Animation conversion.
//!
//! - [`channel`]: typed channels built from `<sampler>` / `<channel>` pairs
//! - [`interp`]: keyframe search and curve evaluation
//! - [`resample`]: fixed-rate resampling into per-bone tracks
//!
//! Each top-level `<animation>` becomes one clip; nested animations add their
//! channels to the enclosing clip.

pub mod channel;
pub mod interp;
pub mod resample;

pub use channel::{AnimationChannel, Interpolation};
pub use interp::find_keys;
pub use resample::{resample, AnimationClip, ResampleOptions, Track};

use thiserror::Error;

use crate::collada::{Document, ElementId, ElementKind};

/// Name of the clip produced by `single_animation`.
pub const SINGLE_CLIP_NAME: &str = "default";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    #[error("channel source is not a <sampler>")]
    MissingSampler,

    #[error("sampler has no {0} input")]
    MissingInput(&'static str),

    #[error("channel target '{0}' is unresolved")]
    UnresolvedTarget(String),

    #[error("channel target '{0}' is not an animatable transform")]
    UnsupportedTarget(String),

    #[error("channel writes {count} values at offset {offset}, target has {dimension}")]
    TargetOutOfRange {
        offset: usize,
        count: usize,
        dimension: usize,
    },

    #[error("{semantic} source has stride {stride}, expected {expected}")]
    Dimension {
        semantic: &'static str,
        stride: usize,
        expected: usize,
    },

    #[error("{semantic} source holds {len} values, {expected} needed")]
    TooShort {
        semantic: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("INPUT time {time} at key {key} comes before {previous}")]
    UnsortedInput { key: usize, time: f32, previous: f32 },

    #[error("cubic segment [{t0}, {t1}] did not converge at t={t} after {iterations} iterations")]
    NoConvergence {
        t: f32,
        t0: f32,
        t1: f32,
        iterations: usize,
    },
}

pub type AnimationResult<T> = Result<T, AnimationError>;

/// Channels of one output clip.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipChannels {
    pub name: String,
    pub channels: Vec<ElementId>,
}

fn collect_channels(doc: &Document, animation: ElementId, out: &mut Vec<ElementId>) {
    if let ElementKind::Animation(data) = &doc.element(animation).kind {
        out.extend_from_slice(&data.channels);
        for &nested in &data.animations {
            collect_channels(doc, nested, out);
        }
    }
}

/// Group the document's channels into clips.
pub fn clip_channels(doc: &Document, single_animation: bool) -> Vec<ClipChannels> {
    let mut clips: Vec<ClipChannels> = doc
        .animations
        .iter()
        .enumerate()
        .map(|(i, &animation)| {
            let mut channels = Vec::new();
            collect_channels(doc, animation, &mut channels);
            let label = doc.element(animation).label();
            ClipChannels {
                name: if label.is_empty() {
                    format!("animation_{}", i)
                } else {
                    label.to_string()
                },
                channels,
            }
        })
        .filter(|clip| !clip.channels.is_empty())
        .collect();

    if single_animation && !clips.is_empty() {
        let channels = clips.drain(..).flat_map(|c| c.channels).collect();
        clips.push(ClipChannels {
            name: SINGLE_CLIP_NAME.to_string(),
            channels,
        });
    }
    clips
}
