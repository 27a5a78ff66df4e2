//! Typed animation channels.

use std::cmp::Ordering;

use crate::collada::{Document, ElementId, ElementKind, Input, SidAccessor, Source};
use crate::diagnostics::WarningLimiter;
use crate::scene::{OpTarget, SceneNodes};

use super::interp::{evaluate_segment, find_keys};
use super::{AnimationError, AnimationResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    Bezier,
    Hermite,
}

impl Interpolation {
    /// Map a COLLADA interpolation name. Unsupported curves fall back to
    /// STEP.
    pub fn from_name(name: &str) -> Self {
        match name {
            "STEP" => Interpolation::Step,
            "LINEAR" => Interpolation::Linear,
            "BEZIER" => Interpolation::Bezier,
            "HERMITE" => Interpolation::Hermite,
            "CARDINAL" | "BSPLINE" => {
                log::warn!("{} interpolation is not supported, using STEP", name);
                Interpolation::Step
            }
            other => {
                log::warn!("Unknown interpolation '{}', using STEP", other);
                Interpolation::Step
            }
        }
    }

    pub fn needs_tangents(self) -> bool {
        matches!(self, Interpolation::Bezier | Interpolation::Hermite)
    }
}

/// A sampler bound to a slice of one transform op.
///
/// Tangents are stored as (time, value) pairs, `2 * count` floats per key.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationChannel {
    pub target: OpTarget,
    /// First value of the op written by this channel.
    pub offset: usize,
    /// Values written per key.
    pub count: usize,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    pub in_tangents: Option<Vec<f32>>,
    pub out_tangents: Option<Vec<f32>>,
    pub interpolation: Vec<Interpolation>,
}

fn sampler_source<'a>(doc: &'a Document, input: Option<&Input>) -> Option<&'a Source> {
    input.and_then(|i| doc.input_source(i))
}

fn source_values(
    source: &Source,
    semantic: &'static str,
    stride: usize,
    keys: usize,
) -> AnimationResult<Vec<f32>> {
    if source.stride != stride {
        return Err(AnimationError::Dimension {
            semantic,
            stride: source.stride,
            expected: stride,
        });
    }
    let values = source.floats().unwrap_or_default();
    let expected = keys * stride;
    if values.len() < expected {
        return Err(AnimationError::TooShort {
            semantic,
            len: values.len(),
            expected,
        });
    }
    Ok(values[..expected].to_vec())
}

/// Read a tangent source as (time, value) pairs.
///
/// One-dimensional tangents (values only) get times a third of the way to
/// the neighbouring keys.
fn tangent_values(
    source: &Source,
    semantic: &'static str,
    count: usize,
    input: &[f32],
    incoming: bool,
) -> AnimationResult<Vec<f32>> {
    let keys = input.len();
    if source.stride == 2 * count {
        return source_values(source, semantic, 2 * count, keys);
    }
    let values = source_values(source, semantic, count, keys).map_err(|e| match e {
        AnimationError::Dimension { stride, .. } => AnimationError::Dimension {
            semantic,
            stride,
            expected: 2 * count,
        },
        other => other,
    })?;

    let mut pairs = Vec::with_capacity(keys * 2 * count);
    for key in 0..keys {
        let neighbour = if incoming {
            key.checked_sub(1).map(|k| input[k])
        } else {
            input.get(key + 1).copied()
        };
        let time = neighbour.map(|n| input[key] + (n - input[key]) / 3.0).unwrap_or(input[key]);
        for j in 0..count {
            pairs.push(time);
            pairs.push(values[key * count + j]);
        }
    }
    Ok(pairs)
}

/// Key times must never decrease; NaN counts as out of order.
fn check_sorted(input: &[f32]) -> AnimationResult<()> {
    let unsorted = input
        .windows(2)
        .position(|w| w[0].partial_cmp(&w[1]).map_or(true, Ordering::is_gt));
    match unsorted {
        Some(i) => Err(AnimationError::UnsortedInput {
            key: i + 1,
            time: input[i + 1],
            previous: input[i],
        }),
        None => Ok(()),
    }
}

impl AnimationChannel {
    /// Build a channel from a `<channel>` element.
    pub fn create(doc: &Document, nodes: &SceneNodes, channel: ElementId) -> AnimationResult<Self> {
        let ElementKind::Channel(data) = &doc.element(channel).kind else {
            return Err(AnimationError::MissingSampler);
        };

        let target_link = doc.resolver.link(data.target);
        let Some(target_element) = target_link.target else {
            return Err(AnimationError::UnresolvedTarget(target_link.url.clone()));
        };
        let Some(target) = nodes.animation_target(target_element) else {
            return Err(AnimationError::UnsupportedTarget(target_link.url.clone()));
        };
        let dimension = nodes.op(target).kind.dimension();
        let (offset, count) = match target_link.accessor {
            SidAccessor::Whole => (0, dimension),
            SidAccessor::Member(o) | SidAccessor::Array(o) => (o, 1),
        };
        if offset + count > dimension {
            return Err(AnimationError::TargetOutOfRange {
                offset,
                count,
                dimension,
            });
        }

        let sampler = match doc.link_target(data.source).map(|s| &doc.element(s).kind) {
            Some(ElementKind::Sampler(sampler)) => sampler,
            _ => return Err(AnimationError::MissingSampler),
        };

        let input_source =
            sampler_source(doc, sampler.input("INPUT")).ok_or(AnimationError::MissingInput("INPUT"))?;
        if input_source.stride != 1 {
            return Err(AnimationError::Dimension {
                semantic: "INPUT",
                stride: input_source.stride,
                expected: 1,
            });
        }
        let input = input_source.floats().unwrap_or_default().to_vec();
        check_sorted(&input)?;
        let keys = input.len();

        let output_source =
            sampler_source(doc, sampler.input("OUTPUT")).ok_or(AnimationError::MissingInput("OUTPUT"))?;
        let output = source_values(output_source, "OUTPUT", count, keys)?;

        let interpolation = match sampler_source(doc, sampler.input("INTERPOLATION")).and_then(Source::names) {
            Some(names) if names.len() >= keys => names[..keys].iter().map(|n| Interpolation::from_name(n)).collect(),
            Some([name]) => vec![Interpolation::from_name(name); keys],
            Some(names) => {
                log::warn!("INTERPOLATION source has {} entries for {} keys, using LINEAR", names.len(), keys);
                vec![Interpolation::Linear; keys]
            }
            None => vec![Interpolation::Linear; keys],
        };

        let (in_tangents, out_tangents) = if interpolation.iter().any(|i| i.needs_tangents()) {
            let in_source =
                sampler_source(doc, sampler.input("IN_TANGENT")).ok_or(AnimationError::MissingInput("IN_TANGENT"))?;
            let out_source =
                sampler_source(doc, sampler.input("OUT_TANGENT")).ok_or(AnimationError::MissingInput("OUT_TANGENT"))?;
            (
                Some(tangent_values(in_source, "IN_TANGENT", count, &input, true)?),
                Some(tangent_values(out_source, "OUT_TANGENT", count, &input, false)?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            target,
            offset,
            count,
            input,
            output,
            in_tangents,
            out_tangents,
            interpolation,
        })
    }

    pub fn begin(&self) -> f32 {
        self.input.first().copied().unwrap_or(0.0)
    }

    pub fn end(&self) -> f32 {
        self.input.last().copied().unwrap_or(0.0)
    }

    /// Keys per second, if the channel spans a time range.
    pub fn fps(&self) -> Option<f32> {
        let duration = self.end() - self.begin();
        (self.input.len() > 1 && duration > 0.0).then(|| (self.input.len() - 1) as f32 / duration)
    }

    /// Evaluate at `t` into `out` (`count` values). Out-of-range times clamp
    /// to the first/last key with a rate-limited warning.
    pub fn evaluate(&self, t: f32, out: &mut [f32], warnings: &mut WarningLimiter) -> AnimationResult<()> {
        if self.input.is_empty() {
            return Ok(());
        }
        let (begin, end) = (self.begin(), self.end());
        let t = if t < begin || t > end {
            warnings.warn("animation time clamped", || {
                format!("Time {} outside channel range [{}, {}], clamping", t, begin, end)
            });
            t.clamp(begin, end)
        } else {
            t
        };

        let (i0, i1) = find_keys(&self.input, t);
        let interpolation = if i0 == i1 {
            Interpolation::Step
        } else {
            self.interpolation[i0]
        };
        for j in 0..self.count {
            out[j] = evaluate_segment(self, interpolation, i0, i1, j, t, warnings)?;
        }
        Ok(())
    }

    /// Evaluate and write into the target op.
    pub fn apply(&self, t: f32, nodes: &mut SceneNodes, warnings: &mut WarningLimiter) -> AnimationResult<()> {
        let op = nodes.op_mut(self.target);
        let range = self.offset..self.offset + self.count;
        self.evaluate(t, &mut op.data[range], warnings)
    }
}
