//! Skeletons and skinning data.
//!
//! A [`Bone`] wraps a scene node plus the inverse bind matrix used to skin
//! against it. Bones of one skeleton reference their parent by index; after
//! [`Skeleton::add_bone_parents`] every bone whose node has a parent node
//! also has a parent bone.

use std::collections::HashMap;

use dax_math::{Mat4, Mat4Ext};
use thiserror::Error;

use crate::collada::{Document, ElementId, Skin, SourceData};
use crate::mesh::{ChunkData, MAX_INFLUENCES};
use crate::scene::{NodeId, SceneNodes};

/// Inverse bind matrices closer than this are the same bind pose.
pub const BIND_MATRIX_EPSILON: f32 = 1e-5;

/// Weight totals outside this range are left unnormalized.
const MIN_WEIGHT_TOTAL: f32 = 1e-6;
const MAX_WEIGHT_TOTAL: f32 = 1e6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkeletonError {
    #[error("bones {first} and {second} ('{name}') share a node and bind pose but were not merged")]
    UnmergedDuplicate {
        first: usize,
        second: usize,
        name: String,
    },

    #[error("bone {bone} ('{name}') is not preceded by its parent {parent}")]
    OrderViolation {
        bone: usize,
        parent: usize,
        name: String,
    },

    #[error("bone {bone} ('{name}') has a parent node without a bone")]
    MissingParent { bone: usize, name: String },

    #[error("bone {bone} references parent {parent}, skeleton has {count} bones")]
    InvalidParent {
        bone: usize,
        parent: usize,
        count: usize,
    },
}

pub type SkeletonResult<T> = Result<T, SkeletonError>;

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub node: NodeId,
    pub inverse_bind: Mat4,
    pub parent: Option<usize>,
    /// Bound by a skin (as opposed to synthesized from the hierarchy).
    pub skinned: bool,
}

impl Bone {
    /// Same node and, when both are skin-bound, the same bind pose.
    pub fn is_mergeable(&self, other: &Bone) -> bool {
        self.node == other.node
            && (!(self.skinned && other.skinned)
                || self.inverse_bind.approx_eq(&other.inverse_bind, BIND_MATRIX_EPSILON))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// First bone bound to `node`.
    pub fn find_bone(&self, node: NodeId) -> Option<usize> {
        self.bones.iter().position(|b| b.node == node)
    }

    /// Add a bone unless a mergeable one exists; returns its index.
    ///
    /// When merging, a skin-bound bone replaces the bind pose of a
    /// synthesized one.
    pub fn add_bone(&mut self, bone: Bone) -> usize {
        if let Some(index) = self.bones.iter().position(|b| b.is_mergeable(&bone)) {
            let existing = &mut self.bones[index];
            if bone.skinned && !existing.skinned {
                existing.inverse_bind = bone.inverse_bind;
                existing.skinned = true;
            }
            return index;
        }
        self.bones.push(bone);
        self.bones.len() - 1
    }

    /// Merge `other` into this skeleton. Returns the new index of every bone
    /// of `other`.
    pub fn merge(&mut self, other: &Skeleton, nodes: &SceneNodes) -> Vec<usize> {
        let remap = other.bones.iter().map(|b| self.add_bone(b.clone())).collect();
        self.update_parent_indices(nodes);
        remap
    }

    /// Synthesize bones for node parents that have none, until closed.
    ///
    /// Synthesized bones use the inverse of the node's rest world matrix.
    pub fn add_bone_parents(&mut self, nodes: &SceneNodes) {
        let mut added = 0;
        loop {
            let missing: Vec<NodeId> = self
                .bones
                .iter()
                .filter_map(|b| nodes.parent(b.node))
                .filter(|&p| self.find_bone(p).is_none())
                .collect();
            if missing.is_empty() {
                break;
            }
            for node in missing {
                if self.find_bone(node).is_some() {
                    continue;
                }
                self.bones.push(Bone {
                    name: nodes.get(node).name.clone(),
                    node,
                    inverse_bind: nodes.world_matrix(node).inverse(),
                    parent: None,
                    skinned: false,
                });
                added += 1;
            }
        }
        if added > 0 {
            log::debug!("Added {} parent bones", added);
        }
        self.update_parent_indices(nodes);
    }

    /// Point every bone at the bone of its parent node.
    pub fn update_parent_indices(&mut self, nodes: &SceneNodes) {
        let first_bone: HashMap<NodeId, usize> =
            self.bones.iter().enumerate().rev().map(|(i, b)| (b.node, i)).collect();
        for bone in &mut self.bones {
            bone.parent = nodes.parent(bone.node).and_then(|p| first_bone.get(&p).copied());
        }
    }

    fn depth(&self, bone: usize) -> usize {
        let mut depth = 0;
        let mut current = self.bones[bone].parent;
        while let Some(p) = current {
            depth += 1;
            current = self.bones[p].parent;
            if depth > self.bones.len() {
                break;
            }
        }
        depth
    }

    /// Order bones so that parents precede children.
    ///
    /// Stable sort by (depth, prior index of parent, prior index). Returns the
    /// new index of every bone and verifies the result.
    pub fn sort_bones(&mut self) -> SkeletonResult<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.bones.len()).collect();
        let keys: Vec<(usize, usize, usize)> = (0..self.bones.len())
            .map(|i| (self.depth(i), self.bones[i].parent.unwrap_or(0), i))
            .collect();
        order.sort_by_key(|&i| keys[i]);

        let mut remap = vec![0; self.bones.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        let mut sorted: Vec<Bone> = order.iter().map(|&old| self.bones[old].clone()).collect();
        for bone in &mut sorted {
            bone.parent = bone.parent.map(|p| remap[p]);
        }
        self.bones = sorted;

        self.verify_order()?;
        Ok(remap)
    }

    /// Every parent index precedes its child.
    pub fn verify_order(&self) -> SkeletonResult<()> {
        for (i, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= i {
                    return Err(SkeletonError::OrderViolation {
                        bone: i,
                        parent,
                        name: bone.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check the skeleton invariants: valid parent indices, a parent bone
    /// for every parented node and no unmerged duplicates.
    pub fn verify(&self, nodes: &SceneNodes) -> SkeletonResult<()> {
        let count = self.bones.len();
        let mut by_node: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, bone) in self.bones.iter().enumerate() {
            match bone.parent {
                Some(parent) if parent >= count => {
                    return Err(SkeletonError::InvalidParent {
                        bone: i,
                        parent,
                        count,
                    })
                }
                None if nodes.parent(bone.node).is_some() => {
                    return Err(SkeletonError::MissingParent {
                        bone: i,
                        name: bone.name.clone(),
                    })
                }
                _ => {}
            }
            by_node.entry(bone.node).or_default().push(i);
        }

        for same_node in by_node.values() {
            for (k, &a) in same_node.iter().enumerate() {
                for &b in &same_node[k + 1..] {
                    if self.bones[a].is_mergeable(&self.bones[b]) {
                        return Err(SkeletonError::UnmergedDuplicate {
                            first: a,
                            second: b,
                            name: self.bones[a].name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Skin data

/// One joint of a skin controller.
#[derive(Clone, Debug)]
pub struct SkinJoint {
    pub name: String,
    pub element: Option<ElementId>,
    pub inverse_bind: Mat4,
}

/// Resolve the joints of a skin against the candidate skeleton roots.
///
/// `Name_array` joints are scoped ids searched below each root in order,
/// with a global id lookup as fallback; `IDREF_array` joints are global ids.
pub fn skin_joints(doc: &Document, skin: &Skin, roots: &[ElementId]) -> Vec<SkinJoint> {
    let joint_input = skin.joints.iter().find(|i| i.semantic == "JOINT");
    let Some(joint_source) = joint_input.and_then(|i| doc.input_source(i)) else {
        log::warn!("Skin has no JOINT source");
        return Vec::new();
    };
    let by_id = matches!(joint_source.data, SourceData::IdRef(_));
    let names = joint_source.names().unwrap_or_default();

    let bind_matrices = skin
        .joints
        .iter()
        .find(|i| i.semantic == "INV_BIND_MATRIX")
        .and_then(|i| doc.input_source(i))
        .and_then(|s| s.floats().map(|f| (f, s.stride.max(16))));
    if bind_matrices.is_none() {
        log::warn!("Skin has no INV_BIND_MATRIX source, using identity");
    }

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let element = if by_id {
                doc.resolver.resolve_url(name)
            } else {
                doc.resolver
                    .resolve_sid_from_roots(&doc.elements, roots, name)
                    .map(|(e, _)| e)
                    .or_else(|| {
                        let found = doc.resolver.resolve_url(name);
                        if found.is_some() {
                            log::warn!("Joint '{}' not found below the skeleton roots, matched by id", name);
                        }
                        found
                    })
            };
            if element.is_none() {
                log::warn!("Unresolved skin joint '{}'", name);
            }

            let inverse_bind = match bind_matrices {
                Some((values, stride)) if values.len() >= i * stride + 16 => {
                    Mat4::from_row_major(&values[i * stride..i * stride + 16])
                }
                Some(_) => {
                    log::warn!("Missing inverse bind matrix for joint '{}'", name);
                    Mat4::IDENTITY
                }
                None => Mat4::IDENTITY,
            };

            SkinJoint {
                name: name.clone(),
                element,
                inverse_bind,
            }
        })
        .collect()
}

/// Raw (joint, weight) influences per source position.
///
/// Joint index -1 (binding to the bind shape) is skipped.
pub fn skin_influences(doc: &Document, skin: &Skin) -> Vec<Vec<(usize, f32)>> {
    let weights = &skin.weights;
    let joint_offset = weights.inputs.iter().find(|i| i.semantic == "JOINT").map(|i| i.offset);
    let weight_input = weights.inputs.iter().find(|i| i.semantic == "WEIGHT");
    let (Some(joint_offset), Some(weight_input)) = (joint_offset, weight_input) else {
        log::warn!("<vertex_weights> needs JOINT and WEIGHT inputs");
        return Vec::new();
    };
    let (weight_values, weight_stride): (&[f32], usize) = match doc.input_source(weight_input) {
        Some(source) => (source.floats().unwrap_or_default(), source.stride.max(1)),
        None => (&[], 1),
    };

    let stride = weights.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(2);
    let mut result = Vec::with_capacity(weights.vcount.len());
    let mut cursor = 0;
    for &count in &weights.vcount {
        let mut influences = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let base = cursor * stride;
            cursor += 1;
            let (Some(&joint), Some(&weight_index)) = (
                weights.v.get(base + joint_offset),
                weights.v.get(base + weight_input.offset),
            ) else {
                log::warn!("<vertex_weights> <v> array is too short");
                result.push(influences);
                return result;
            };
            if joint < 0 {
                continue;
            }
            let weight = usize::try_from(weight_index)
                .ok()
                .and_then(|w| weight_values.get(w * weight_stride))
                .copied();
            match weight {
                Some(w) => influences.push((joint as usize, w)),
                None => log::warn!("Weight index {} out of range", weight_index),
            }
        }
        result.push(influences);
    }
    result
}

/// Up to four influences of one vertex, heaviest first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompactInfluences {
    pub bones: [u16; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
    /// False when the raw total was outside the normalizable range.
    pub normalized: bool,
}

/// Keep the four heaviest influences and renormalize them.
pub fn compact_influences(influences: &[(u16, f32)]) -> CompactInfluences {
    let mut bones = [0u16; MAX_INFLUENCES];
    let mut weights = [0.0f32; MAX_INFLUENCES];

    for &(bone, weight) in influences {
        let (min_slot, min_weight) = weights
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::INFINITY), |acc, (i, w)| if w < acc.1 { (i, w) } else { acc });
        if weight > min_weight {
            bones[min_slot] = bone;
            weights[min_slot] = weight;
        }
    }

    let mut slots: [usize; MAX_INFLUENCES] = std::array::from_fn(|i| i);
    slots.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));
    let bones = slots.map(|i| bones[i]);
    let mut weights = slots.map(|i| weights[i]);

    let total: f32 = weights.iter().sum();
    let normalized = (MIN_WEIGHT_TOTAL..=MAX_WEIGHT_TOTAL).contains(&total);
    if normalized {
        for w in &mut weights {
            *w /= total;
        }
    }
    CompactInfluences {
        bones,
        weights,
        normalized,
    }
}

/// Fill a chunk's bone index / weight streams from per-position influences
/// (already mapped to bone indices). Returns the number of vertices whose
/// weights could not be normalized.
pub fn compact_skinning_data(chunk: &mut ChunkData, influences: &[Vec<(u16, f32)>]) -> usize {
    let vertex_count = chunk.vertex_count();
    let mut bone_indices = Vec::with_capacity(vertex_count * MAX_INFLUENCES);
    let mut bone_weights = Vec::with_capacity(vertex_count * MAX_INFLUENCES);
    let mut flagged = 0;

    for &position in &chunk.source_positions {
        let raw = influences.get(position as usize).map(Vec::as_slice).unwrap_or(&[]);
        let compact = compact_influences(raw);
        if !compact.normalized {
            flagged += 1;
        }
        bone_indices.extend_from_slice(&compact.bones);
        bone_weights.extend_from_slice(&compact.weights);
    }

    if flagged > 0 {
        log::warn!("{} vertices have skin weights that cannot be normalized", flagged);
    }
    chunk.bone_indices = Some(bone_indices);
    chunk.bone_weights = Some(bone_weights);
    flagged
}

/// Rewrite bone indices through `remap` (old index -> new index).
pub fn remap_bone_indices(chunk: &mut ChunkData, remap: &[usize]) {
    if let Some(indices) = &mut chunk.bone_indices {
        for index in indices.iter_mut() {
            if let Some(&new) = remap.get(*index as usize) {
                *index = new as u16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::load_collada_from_string;
    use crate::scene::ConverterNode;
    use dax_math::Vec3;

    fn chain(names: &[&str]) -> SceneNodes {
        let mut nodes = SceneNodes::new();
        let mut parent = None;
        for (i, name) in names.iter().enumerate() {
            let mut node = ConverterNode::new(*name);
            node.transforms.push(crate::scene::TransformOp::new(
                crate::scene::TransformOpKind::Translate,
                None,
                vec![0.0, i as f32, 0.0],
            ));
            parent = Some(nodes.push_node(node, parent));
        }
        nodes.update_matrices();
        nodes
    }

    fn bone(nodes: &SceneNodes, node: usize) -> Bone {
        Bone {
            name: nodes.get(NodeId(node)).name.clone(),
            node: NodeId(node),
            inverse_bind: nodes.world_matrix(NodeId(node)).inverse(),
            parent: None,
            skinned: true,
        }
    }

    #[test]
    fn test_add_bone_parents_synthesizes_root() {
        let nodes = chain(&["A", "B"]);
        let mut skeleton = Skeleton::new();
        skeleton.add_bone(bone(&nodes, 1));
        skeleton.add_bone_parents(&nodes);
        assert_eq!(skeleton.len(), 2);
        assert!(!skeleton.bones[1].skinned);

        skeleton.sort_bones().unwrap();
        assert_eq!(skeleton.bones[0].name, "A");
        assert_eq!(skeleton.bones[1].name, "B");
        assert_eq!(skeleton.bones[1].parent, Some(0));
        skeleton.verify(&nodes).unwrap();
    }

    #[test]
    fn test_synthesized_bone_uses_rest_world_inverse() {
        let nodes = chain(&["A", "B", "C"]);
        let mut skeleton = Skeleton::new();
        skeleton.add_bone(bone(&nodes, 2));
        skeleton.add_bone_parents(&nodes);
        assert_eq!(skeleton.len(), 3);
        let b = skeleton.find_bone(NodeId(1)).unwrap();
        let origin = skeleton.bones[b].inverse_bind.transform_point3(Vec3::new(0.0, 1.0, 0.0));
        assert!(origin.length() < 1e-6);
    }

    #[test]
    fn test_sort_bones_any_order() {
        let nodes = chain(&["A", "B", "C", "D"]);
        let mut skeleton = Skeleton::new();
        for i in [3, 1, 2, 0] {
            skeleton.add_bone(bone(&nodes, i));
        }
        skeleton.update_parent_indices(&nodes);
        let remap = skeleton.sort_bones().unwrap();
        for (i, b) in skeleton.bones.iter().enumerate() {
            if let Some(p) = b.parent {
                assert!(p < i);
            }
        }
        assert_eq!(remap, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_merge_prefers_skinned() {
        let nodes = chain(&["A", "B"]);
        let mut skeleton = Skeleton::new();
        let mut synthesized = bone(&nodes, 0);
        synthesized.skinned = false;
        synthesized.inverse_bind = Mat4::IDENTITY;
        skeleton.add_bone(synthesized);

        let mut other = Skeleton::new();
        other.add_bone(bone(&nodes, 1));
        other.add_bone(bone(&nodes, 0));
        let remap = skeleton.merge(&other, &nodes);

        assert_eq!(remap, vec![1, 0]);
        assert!(skeleton.bones[0].skinned);
        assert!(skeleton.bones[0].inverse_bind.approx_eq(&nodes.world_matrix(NodeId(0)).inverse(), 1e-6));
        assert_eq!(skeleton.bones[1].parent, Some(0));
    }

    #[test]
    fn test_differing_bind_poses_stay_separate() {
        let nodes = chain(&["A"]);
        let mut skeleton = Skeleton::new();
        skeleton.add_bone(bone(&nodes, 0));
        let mut other = bone(&nodes, 0);
        other.inverse_bind = Mat4::from_translation(Vec3::X);
        assert_eq!(skeleton.add_bone(other), 1);
        skeleton.verify(&nodes).unwrap();

        skeleton.bones[1].inverse_bind = skeleton.bones[0].inverse_bind;
        assert!(matches!(
            skeleton.verify(&nodes),
            Err(SkeletonError::UnmergedDuplicate { .. })
        ));
    }

    #[test]
    fn test_verify_order_violation() {
        let nodes = chain(&["A", "B"]);
        let mut skeleton = Skeleton::new();
        skeleton.bones.push(bone(&nodes, 1));
        skeleton.bones.push(bone(&nodes, 0));
        skeleton.update_parent_indices(&nodes);
        assert!(matches!(
            skeleton.verify_order(),
            Err(SkeletonError::OrderViolation { bone: 0, parent: 1, .. })
        ));
    }

    #[test]
    fn test_compact_keeps_heaviest_four() {
        let c = compact_influences(&[(1, 0.1), (2, 0.4), (3, 0.05), (4, 0.2), (5, 0.25)]);
        assert_eq!(c.bones, [2, 5, 4, 1]);
        let total: f32 = c.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(c.weights[0] >= c.weights[1] && c.weights[1] >= c.weights[2]);
        assert!(c.normalized);
    }

    #[test]
    fn test_compact_flags_degenerate_totals() {
        let c = compact_influences(&[]);
        assert!(!c.normalized);
        assert_eq!(c.weights, [0.0; 4]);

        let c = compact_influences(&[(0, 3.0)]);
        assert!(c.normalized);
        assert_eq!(c.weights, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_compact_skinning_data_per_vertex() {
        let mut chunk = ChunkData {
            positions: vec![0.0; 6],
            source_positions: vec![1, 0],
            ..Default::default()
        };
        let influences = vec![vec![(0, 1.0)], vec![(1, 2.0), (2, 2.0)]];
        let flagged = compact_skinning_data(&mut chunk, &influences);
        assert_eq!(flagged, 0);
        let weights = chunk.bone_weights.unwrap();
        assert!((weights[0] - 0.5).abs() < 1e-6);
        assert!((weights[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_skin_joints_and_influences() {
        let doc = load_collada_from_string(
            r##"<COLLADA>
              <library_controllers><controller id="skin"><skin source="#mesh">
                <source id="joints"><Name_array id="joints-array" count="2">hip knee</Name_array>
                  <technique_common><accessor source="#joints-array" count="2"><param name="JOINT" type="name"/></accessor></technique_common></source>
                <source id="ibm"><float_array id="ibm-array" count="32">
                  1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1
                  1 0 0 0 0 1 0 -1 0 0 1 0 0 0 0 1</float_array>
                  <technique_common><accessor source="#ibm-array" count="2" stride="16"><param name="TRANSFORM" type="float4x4"/></accessor></technique_common></source>
                <source id="w"><float_array id="w-array" count="2">0.25 0.75</float_array>
                  <technique_common><accessor source="#w-array" count="2"><param name="WEIGHT" type="float"/></accessor></technique_common></source>
                <joints><input semantic="JOINT" source="#joints"/><input semantic="INV_BIND_MATRIX" source="#ibm"/></joints>
                <vertex_weights count="2">
                  <input semantic="JOINT" source="#joints" offset="0"/><input semantic="WEIGHT" source="#w" offset="1"/>
                  <vcount>2 1</vcount><v>0 0 1 1 -1 1</v>
                </vertex_weights>
              </skin></controller></library_controllers>
              <library_visual_scenes><visual_scene id="vs">
                <node id="rig"><node id="hip_node" sid="hip" type="JOINT"><node id="knee_node" sid="knee" type="JOINT"/></node></node>
              </visual_scene></library_visual_scenes>
            </COLLADA>"##,
        )
        .unwrap();
        let controller = doc.resolver.resolve_url("skin").unwrap();
        let crate::collada::ElementKind::Controller(c) = &doc.element(controller).kind else {
            panic!("not a controller");
        };
        let skin = c.skin.as_ref().unwrap();
        let rig = doc.resolver.resolve_url("rig").unwrap();

        let joints = skin_joints(&doc, skin, &[rig]);
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[1].element, doc.resolver.resolve_url("knee_node"));
        assert!((joints[1].inverse_bind.w_axis.y + 1.0).abs() < 1e-6);

        let influences = skin_influences(&doc, skin);
        assert_eq!(influences, vec![vec![(0, 0.25), (1, 0.75)], vec![]]);
    }
}
