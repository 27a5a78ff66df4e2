//! Document to model conversion.
//!
//! One [`ConverterContext`] converts one document: it mirrors the visual
//! scene, converts every geometry instance into chunks, builds the shared
//! model skeleton and resamples the animations.
//!
//! # Example
//!
//! ```ignore
//! use dax_core::{collada::load_collada, convert, ConverterOptions};
//!
//! let doc = load_collada("character.dae")?;
//! let model = convert(&doc, &ConverterOptions::default())?;
//! println!("{} chunks, {} bones", model.chunks.len(), model.skeleton.len());
//! ```

use std::collections::{HashMap, HashSet};

use dax_math::{BoundingBox, Mat4, Mat4Ext, Quat, Vec3};
use thiserror::Error;

use crate::animation::{self, AnimationChannel, AnimationClip, AnimationError, ResampleOptions};
use crate::collada::{
    Document, ElementId, ElementKind, Geometry, InstanceGeometry, ParseError, Primitive, PrimitiveKind, Skin,
    Source,
};
use crate::diagnostics::WarningLimiter;
use crate::material::{ConvertedMaterial, MaterialCache};
use crate::mesh::{self, AttributeStream, ChunkData, GeometryChunk, MeshError, VertexAttribute};
use crate::options::{ConverterOptions, OptionsError};
use crate::scene::{NodeId, SceneNodes};
use crate::skeleton::{self, Bone, Skeleton, SkeletonError};

/// Errors that abort a conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("Animation error: {0}")]
    Animation(#[from] AnimationError),

    #[error("Geometry '{geometry}': joint index {joint} out of range, the skin has {count} joints")]
    UnmappedJoint {
        geometry: String,
        joint: usize,
        count: usize,
    },

    #[error("Geometry '{geometry}': {source}")]
    Geometry {
        geometry: String,
        #[source]
        source: MeshError,
    },
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Converted, engine-neutral model.
#[derive(Clone, Debug)]
pub struct Model {
    pub nodes: SceneNodes,
    pub chunks: Vec<GeometryChunk>,
    /// Shared buffers when chunks were merged.
    pub merged: Option<ChunkData>,
    pub skeleton: Skeleton,
    pub materials: Vec<ConvertedMaterial>,
    pub animations: Vec<AnimationClip>,
    pub bounding_box: BoundingBox,
}

impl Model {
    /// Rest local transform of a bone as (translation, rotation, scale).
    pub fn bone_rest_pose(&self, bone: usize) -> (Vec3, Quat, Vec3) {
        self.nodes.local_matrix(self.skeleton.bones[bone].node).decompose()
    }
}

/// Convert a parsed document.
pub fn convert(doc: &Document, options: &ConverterOptions) -> ConvertResult<Model> {
    ConverterContext::new(doc, options.clone()).convert()
}

/// State of one conversion.
pub struct ConverterContext<'a> {
    doc: &'a Document,
    options: ConverterOptions,
    nodes: SceneNodes,
    materials: MaterialCache,
    warnings: WarningLimiter,
    skeleton: Skeleton,
    chunks: Vec<GeometryChunk>,
    /// Global world transform (pre-transform of the roots).
    world: Mat4,
}

fn is_mirroring(matrix: &Mat4) -> bool {
    matrix.determinant() < 0.0
}

/// Map raw skin influences from joint indices to model bones.
///
/// Joints without a scene node lose their influence; a joint index past the
/// end of the joint list is an error.
fn map_influences(
    geometry: &str,
    raw: Vec<Vec<(usize, f32)>>,
    joint_bones: &[Option<usize>],
) -> ConvertResult<Vec<Vec<(u16, f32)>>> {
    raw.into_iter()
        .map(|vertex| {
            let mut mapped = Vec::with_capacity(vertex.len());
            for (joint, weight) in vertex {
                match joint_bones.get(joint) {
                    Some(Some(bone)) => mapped.push((*bone as u16, weight)),
                    Some(None) => {}
                    None => {
                        return Err(ConvertError::UnmappedJoint {
                            geometry: geometry.to_string(),
                            joint,
                            count: joint_bones.len(),
                        })
                    }
                }
            }
            Ok(mapped)
        })
        .collect()
}

impl<'a> ConverterContext<'a> {
    pub fn new(doc: &'a Document, options: ConverterOptions) -> Self {
        let materials = MaterialCache::new(options.remove_texture_path);
        Self {
            doc,
            options,
            nodes: SceneNodes::new(),
            materials,
            warnings: WarningLimiter::new(),
            skeleton: Skeleton::new(),
            chunks: Vec::new(),
            world: Mat4::IDENTITY,
        }
    }

    pub fn convert(mut self) -> ConvertResult<Model> {
        self.options.validate()?;
        self.create_scene();

        let node_ids: Vec<NodeId> = self.nodes.ids().collect();
        for node in node_ids {
            let instances = self.nodes.get(node).geometry_instances.clone();
            for instance in instances {
                self.convert_instance(node, instance)?;
            }
        }

        let clips = if self.options.enable_animations {
            self.create_channels()
        } else {
            Vec::new()
        };

        if self.skeleton.is_empty() && !clips.is_empty() {
            self.create_animation_skeleton(&clips);
        }
        self.finish_skeleton()?;

        let mut animations = Vec::with_capacity(clips.len());
        let resample_options = ResampleOptions::from(&self.options);
        for (name, channels) in &clips {
            animations.push(animation::resample(
                name,
                channels,
                &mut self.nodes,
                &self.skeleton,
                &resample_options,
                &mut self.warnings,
            )?);
        }

        let mut bounding_box = BoundingBox::default();
        for chunk in &self.chunks {
            bounding_box.extend_box(&chunk.bounding_box);
        }
        let merged = if self.options.merge_chunks && !self.chunks.is_empty() {
            Some(mesh::merge_chunk_data(&mut self.chunks))
        } else {
            None
        };
        if self.materials.materials().is_empty() {
            self.materials.default_material();
        }

        log::info!(
            "Converted {} nodes, {} chunks, {} bones, {} materials, {} animations",
            self.nodes.len(),
            self.chunks.len(),
            self.skeleton.len(),
            self.materials.materials().len(),
            animations.len()
        );

        Ok(Model {
            nodes: self.nodes,
            chunks: self.chunks,
            merged,
            skeleton: self.skeleton,
            materials: self.materials.into_materials(),
            animations,
            bounding_box,
        })
    }

    fn create_scene(&mut self) {
        let Some(visual_scene) = self.doc.main_visual_scene() else {
            log::warn!("Document has no visual scene");
            return;
        };
        self.nodes = SceneNodes::from_visual_scene(self.doc, visual_scene);

        let asset = &self.doc.asset;
        let wt = &self.options.world_transform;
        self.world = wt.matrix(asset.up_axis, asset.unit_meter);
        let scale = wt.uniform_scale(asset.unit_meter);
        self.nodes
            .setup_world_transform(self.world, scale, wt.enabled && wt.unit_scale);
    }

    // -----------------------------------------------------------------------
    // Geometry

    fn convert_instance(&mut self, node: NodeId, instance: ElementId) -> ConvertResult<()> {
        let doc = self.doc;
        let ElementKind::InstanceGeometry(data) = &doc.element(instance).kind else {
            return Ok(());
        };
        let Some(target) = doc.link_target(data.url) else {
            log::warn!("Unresolved geometry instance on node '{}'", self.nodes.get(node).name);
            return Ok(());
        };

        match &doc.element(target).kind {
            ElementKind::Geometry(geometry) => {
                let matrix = if self.options.bake_node_transforms {
                    self.nodes.geometry_matrix(node)
                } else {
                    Mat4::IDENTITY
                };
                self.convert_geometry(target, geometry, data, &matrix, None)
            }
            ElementKind::Controller(controller) => {
                let Some(skin) = &controller.skin else {
                    log::warn!(
                        "Controller '{}' has no skin, instance skipped",
                        doc.element(target).label()
                    );
                    return Ok(());
                };
                let Some((geometry_id, geometry)) = doc
                    .link_target(skin.geometry)
                    .and_then(|g| match &doc.element(g).kind {
                        ElementKind::Geometry(geometry) => Some((g, geometry)),
                        _ => None,
                    })
                else {
                    log::warn!("Skin of '{}' has no source geometry", doc.element(target).label());
                    return Ok(());
                };

                let bind_shape = if self.options.apply_bind_shape {
                    Mat4::from_row_major(&skin.bind_shape_matrix)
                } else {
                    Mat4::IDENTITY
                };
                if self.options.enable_skinning {
                    let matrix = self.world * bind_shape;
                    self.convert_geometry(geometry_id, geometry, data, &matrix, Some(skin))
                } else {
                    let matrix = self.nodes.geometry_matrix(node) * bind_shape;
                    self.convert_geometry(geometry_id, geometry, data, &matrix, None)
                }
            }
            other => {
                log::warn!("Geometry instance targets a <{}>", other.type_name());
                Ok(())
            }
        }
    }

    fn convert_geometry(
        &mut self,
        geometry_id: ElementId,
        geometry: &Geometry,
        instance: &InstanceGeometry,
        matrix: &Mat4,
        skin: Option<&Skin>,
    ) -> ConvertResult<()> {
        let doc = self.doc;
        let name = doc.element(geometry_id).label().to_string();
        if let Some(what) = &geometry.unsupported {
            log::debug!("Skipping geometry '{}' (<{}>)", name, what);
            return Ok(());
        }

        let skin_bones = skin.map(|skin| self.create_skin_bones(skin, instance));

        let bindings: HashMap<&str, Option<ElementId>> = instance
            .materials
            .iter()
            .map(|m| (m.symbol.as_str(), doc.link_target(m.target)))
            .collect();

        let primitive_count = geometry.primitives.len();
        for (index, primitive) in geometry.primitives.iter().enumerate() {
            let chunk_name = if primitive_count > 1 {
                format!("{}_{}", name, index)
            } else {
                name.clone()
            };
            let Some(mut data) = self.create_chunk_data(&chunk_name, geometry, primitive)? else {
                continue;
            };

            data.transform(matrix);
            if is_mirroring(matrix) {
                data.flip_winding();
            }
            if self.options.flip_texcoord_v {
                data.flip_texcoord_v();
            }
            if let (Some(skin), Some(bones)) = (skin, &skin_bones) {
                let influences = map_influences(&chunk_name, skeleton::skin_influences(doc, skin), bones)?;
                skeleton::compact_skinning_data(&mut data, &influences);
            }

            let material = match &primitive.material {
                Some(symbol) => {
                    let bound = bindings.get(symbol.as_str()).copied().flatten();
                    if bound.is_none() {
                        log::warn!("Material symbol '{}' of '{}' is not bound", symbol, chunk_name);
                    }
                    self.materials.material_for(doc, bound)
                }
                None => self.materials.default_material(),
            };

            self.chunks.push(GeometryChunk::new(chunk_name, material, data));
        }
        Ok(())
    }

    /// Build the de-indexed data of one primitive. Unsupported primitives are
    /// logged and yield `None`.
    fn create_chunk_data(
        &self,
        name: &str,
        geometry: &Geometry,
        primitive: &Primitive,
    ) -> ConvertResult<Option<ChunkData>> {
        let doc = self.doc;
        if !matches!(
            primitive.kind,
            PrimitiveKind::Triangles | PrimitiveKind::Polylist | PrimitiveKind::Polygons
        ) {
            log::warn!("'{}': {:?} primitives are not supported, skipped", name, primitive.kind);
            return Ok(None);
        }

        let vertex_inputs = geometry
            .vertices
            .map(|v| match &doc.element(v).kind {
                ElementKind::Vertices(vertices) => vertices.inputs.as_slice(),
                _ => &[],
            })
            .unwrap_or(&[]);

        let mut inputs: Vec<(&str, Option<&Source>, usize)> = Vec::new();
        for input in &primitive.inputs {
            if input.semantic == "VERTEX" {
                inputs.extend(
                    vertex_inputs
                        .iter()
                        .map(|vi| (vi.semantic.as_str(), doc.input_source(vi), input.offset)),
                );
            } else {
                inputs.push((input.semantic.as_str(), doc.input_source(input), input.offset));
            }
        }

        let mut streams = Vec::new();
        let mut has_texcoord = false;
        for (semantic, source, offset) in inputs {
            let attribute = match semantic {
                "POSITION" => VertexAttribute::Position,
                "NORMAL" => VertexAttribute::Normal,
                "TEXCOORD" if !has_texcoord => {
                    has_texcoord = true;
                    VertexAttribute::Texcoord
                }
                "TEXCOORD" => {
                    log::debug!("'{}': extra TEXCOORD set ignored", name);
                    continue;
                }
                other => {
                    log::debug!("'{}': {} input ignored", name, other);
                    continue;
                }
            };
            let Some((source, values)) = source.and_then(|s| s.floats().map(|f| (s, f))) else {
                log::warn!("'{}': {} input has no float source", name, semantic);
                continue;
            };
            streams.push(AttributeStream {
                attribute,
                values,
                stride: source.stride,
                index_offset: offset,
            });
        }

        match mesh::create_chunk(&streams, &primitive.indices, primitive.index_stride(), &primitive.vcount) {
            Ok(data) => Ok(Some(data)),
            Err(source @ MeshError::IndexOutOfRange { .. }) => Err(ConvertError::Geometry {
                geometry: name.to_string(),
                source,
            }),
            Err(e) => {
                log::warn!("'{}': {}, primitive dropped", name, e);
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Skeleton

    /// Merge the skin's bones into the model skeleton. Returns the model bone
    /// of every joint.
    fn create_skin_bones(&mut self, skin: &Skin, instance: &InstanceGeometry) -> Vec<Option<usize>> {
        let doc = self.doc;
        let mut roots: Vec<ElementId> = instance
            .skeletons
            .iter()
            .filter_map(|&link| doc.link_target(link))
            .collect();
        if roots.is_empty() {
            roots = self
                .nodes
                .roots()
                .iter()
                .filter_map(|&r| self.nodes.get(r).element)
                .collect();
        }

        let world_inverse = self.world.inverse();
        let mut skin_skeleton = Skeleton::new();
        let joint_bones: Vec<Option<usize>> = skeleton::skin_joints(doc, skin, &roots)
            .into_iter()
            .map(|joint| {
                let node = joint.element.and_then(|e| self.nodes.node_for_element(e))?;
                let post_inverse = self.nodes.get(node).post_transform.inverse();
                Some(skin_skeleton.add_bone(Bone {
                    name: self.nodes.get(node).name.clone(),
                    node,
                    inverse_bind: post_inverse * joint.inverse_bind * world_inverse,
                    parent: None,
                    skinned: true,
                }))
            })
            .collect();

        let unmapped = joint_bones.iter().filter(|b| b.is_none()).count();
        if unmapped > 0 {
            log::warn!("{} skin joints have no scene node, their influences are dropped", unmapped);
        }

        skin_skeleton.add_bone_parents(&self.nodes);
        let remap = self.skeleton.merge(&skin_skeleton, &self.nodes);
        joint_bones.into_iter().map(|b| b.map(|b| remap[b])).collect()
    }

    /// Skeleton of the animated nodes, for documents without skins.
    fn create_animation_skeleton(&mut self, clips: &[(String, Vec<AnimationChannel>)]) {
        let animated: HashSet<NodeId> = clips
            .iter()
            .flat_map(|(_, channels)| channels.iter().map(|c| c.target.node))
            .collect();
        let mut animated: Vec<NodeId> = animated.into_iter().collect();
        animated.sort();
        for node in animated {
            self.skeleton.add_bone(Bone {
                name: self.nodes.get(node).name.clone(),
                node,
                inverse_bind: self.nodes.world_matrix(node).inverse(),
                parent: None,
                skinned: false,
            });
        }
        self.skeleton.add_bone_parents(&self.nodes);
        log::debug!("Built a {} bone skeleton from animated nodes", self.skeleton.len());
    }

    fn finish_skeleton(&mut self) -> ConvertResult<()> {
        if self.skeleton.is_empty() {
            return Ok(());
        }
        if self.options.sort_bones {
            let remap = self.skeleton.sort_bones()?;
            for chunk in &mut self.chunks {
                skeleton::remap_bone_indices(&mut chunk.data, &remap);
            }
        }
        self.skeleton.verify(&self.nodes)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Animation

    fn create_channels(&self) -> Vec<(String, Vec<AnimationChannel>)> {
        animation::clip_channels(self.doc, self.options.single_animation)
            .into_iter()
            .filter_map(|clip| {
                let channels: Vec<AnimationChannel> = clip
                    .channels
                    .iter()
                    .filter_map(|&c| match AnimationChannel::create(self.doc, &self.nodes, c) {
                        Ok(channel) => Some(channel),
                        Err(e) => {
                            log::warn!("Clip '{}': channel skipped: {}", clip.name, e);
                            None
                        }
                    })
                    .collect();
                if channels.is_empty() {
                    log::warn!("Clip '{}' has no usable channels", clip.name);
                    None
                } else {
                    Some((clip.name, channels))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::load_collada_from_string;
    use crate::options::WorldTransformOptions;

    const SKINNED: &str = r##"<COLLADA version="1.4.1">
      <asset><unit meter="1"/><up_axis>Y_UP</up_axis></asset>
      <library_effects><effect id="fx"><profile_COMMON><technique sid="t"><lambert>
        <diffuse><color>0.2 0.4 0.6 1</color></diffuse>
      </lambert></technique></profile_COMMON></effect></library_effects>
      <library_materials><material id="mat" name="Body"><instance_effect url="#fx"/></material></library_materials>
      <library_geometries><geometry id="mesh" name="Body">
        <mesh>
          <source id="pos"><float_array id="pos-a" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
            <technique_common><accessor source="#pos-a" count="4" stride="3"><param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/></accessor></technique_common></source>
          <source id="nrm"><float_array id="nrm-a" count="3">0 0 1</float_array>
            <technique_common><accessor source="#nrm-a" count="1" stride="3"><param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/></accessor></technique_common></source>
          <vertices id="verts"><input semantic="POSITION" source="#pos"/></vertices>
          <triangles material="body" count="2">
            <input semantic="VERTEX" source="#verts" offset="0"/>
            <input semantic="NORMAL" source="#nrm" offset="1"/>
            <p>0 0 1 0 2 0 0 0 2 0 3 0</p>
          </triangles>
        </mesh>
      </geometry></library_geometries>
      <library_controllers><controller id="skin"><skin source="#mesh">
        <source id="joints"><Name_array id="joints-a" count="2">upper lower</Name_array>
          <technique_common><accessor source="#joints-a" count="2"><param name="JOINT" type="name"/></accessor></technique_common></source>
        <source id="ibm"><float_array id="ibm-a" count="32">
          1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1
          1 0 0 0 0 1 0 -1 0 0 1 0 0 0 0 1</float_array>
          <technique_common><accessor source="#ibm-a" count="2" stride="16"><param name="TRANSFORM" type="float4x4"/></accessor></technique_common></source>
        <source id="w"><float_array id="w-a" count="3">1 0.5 0.5</float_array>
          <technique_common><accessor source="#w-a" count="3"><param name="WEIGHT" type="float"/></accessor></technique_common></source>
        <joints><input semantic="JOINT" source="#joints"/><input semantic="INV_BIND_MATRIX" source="#ibm"/></joints>
        <vertex_weights count="4">
          <input semantic="JOINT" source="#joints" offset="0"/><input semantic="WEIGHT" source="#w" offset="1"/>
          <vcount>1 1 2 2</vcount>
          <v>0 0 0 0 0 1 1 2 0 1 1 2</v>
        </vertex_weights>
      </skin></controller></library_controllers>
      <library_animations><animation id="bend">
        <source id="t"><float_array id="t-a" count="2">0 1</float_array>
          <technique_common><accessor source="#t-a" count="2"><param name="TIME" type="float"/></accessor></technique_common></source>
        <source id="a"><float_array id="a-a" count="2">0 90</float_array>
          <technique_common><accessor source="#a-a" count="2"><param name="ANGLE" type="float"/></accessor></technique_common></source>
        <sampler id="s"><input semantic="INPUT" source="#t"/><input semantic="OUTPUT" source="#a"/></sampler>
        <channel source="#s" target="lower_node/rz.ANGLE"/>
      </animation></library_animations>
      <library_visual_scenes><visual_scene id="scene">
        <node id="rig" name="Rig">
          <node id="upper_node" name="Upper" sid="upper" type="JOINT">
            <node id="lower_node" name="Lower" sid="lower" type="JOINT">
              <translate sid="t">0 1 0</translate>
              <rotate sid="rz">0 0 1 0</rotate>
            </node>
          </node>
        </node>
        <node id="character" name="Character">
          <instance_controller url="#skin">
            <skeleton>#rig</skeleton>
            <bind_material><technique_common><instance_material symbol="body" target="#mat"/></technique_common></bind_material>
          </instance_controller>
        </node>
      </visual_scene></library_visual_scenes>
      <scene><instance_visual_scene url="#scene"/></scene>
    </COLLADA>"##;

    fn skinned_model(options: &ConverterOptions) -> Model {
        let doc = load_collada_from_string(SKINNED).unwrap();
        convert(&doc, options).unwrap()
    }

    #[test]
    fn test_skinned_conversion() {
        let model = skinned_model(&ConverterOptions::default());

        assert_eq!(model.chunks.len(), 1);
        let chunk = &model.chunks[0];
        assert_eq!(chunk.name, "Body");
        assert_eq!(chunk.vertex_count, 4);
        assert_eq!(chunk.triangle_count, 2);
        assert_eq!(model.materials[chunk.material].diffuse_color, [0.2, 0.4, 0.6, 1.0]);

        // Rig is synthesized as the parent of Upper
        let names: Vec<&str> = model.skeleton.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Rig", "Upper", "Lower"]);
        assert!(!model.skeleton.bones[0].skinned);
        assert_eq!(model.skeleton.bones[2].parent, Some(1));

        // Vertex 2 is split between both joints
        let indices = chunk.data.bone_indices.as_ref().unwrap();
        let weights = chunk.data.bone_weights.as_ref().unwrap();
        assert_eq!(indices[8..10], [1, 2]);
        assert!((weights[8] - 0.5).abs() < 1e-6);
        assert!((weights[9] - 0.5).abs() < 1e-6);
        for vertex in weights.chunks(4) {
            let total: f32 = vertex.iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_animation_clip() {
        let model = skinned_model(&ConverterOptions::default());
        assert_eq!(model.animations.len(), 1);
        let clip = &model.animations[0];
        assert_eq!(clip.name, "bend");
        assert_eq!(clip.frames, 2);
        assert_eq!(clip.tracks.len(), 1);
        assert_eq!(clip.tracks[0].bone, 2);
        assert!(clip.tracks[0].rotations.is_some());
        assert!(clip.tracks[0].positions.is_none());
    }

    #[test]
    fn test_animations_disabled() {
        let options = ConverterOptions {
            enable_animations: false,
            ..Default::default()
        };
        assert!(skinned_model(&options).animations.is_empty());
    }

    #[test]
    fn test_skinning_disabled_bakes_geometry() {
        let options = ConverterOptions {
            enable_skinning: false,
            enable_animations: false,
            ..Default::default()
        };
        let model = skinned_model(&options);
        assert!(model.skeleton.is_empty());
        assert!(model.chunks[0].data.bone_indices.is_none());
    }

    #[test]
    fn test_world_scale_applies_to_geometry_and_bind_poses() {
        let options = ConverterOptions {
            world_transform: WorldTransformOptions {
                enabled: true,
                scale: 2.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let model = skinned_model(&options);
        assert!((model.bounding_box.max.x - 2.0).abs() < 1e-5);

        // Skinning at rest is the identity on the converted vertices
        let lower = &model.skeleton.bones[2];
        let skin_matrix = model.nodes.world_matrix(lower.node) * lower.inverse_bind;
        assert!(skin_matrix.approx_eq(&Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_unit_scale_bind_poses() {
        let options = ConverterOptions {
            world_transform: WorldTransformOptions {
                enabled: true,
                scale: 2.0,
                unit_scale: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let model = skinned_model(&options);
        let lower = &model.skeleton.bones[2];
        let skin_matrix = model.nodes.world_matrix(lower.node) * lower.inverse_bind;
        assert!(skin_matrix.approx_eq(&Mat4::IDENTITY, 1e-5));
        // Scale stays out of the bone transforms
        let (_, _, scale) = model.bone_rest_pose(2);
        assert!((scale - Vec3::ONE).length() < 1e-5);
    }

    #[test]
    fn test_merge_chunks() {
        let options = ConverterOptions {
            merge_chunks: true,
            ..Default::default()
        };
        let model = skinned_model(&options);
        let merged = model.merged.as_ref().unwrap();
        assert_eq!(merged.vertex_count(), 4);
        assert_eq!(model.chunks[0].vertex_offset, 0);
        assert!(model.chunks[0].data.positions.is_empty());
    }

    #[test]
    fn test_out_of_range_joint_is_fatal() {
        let source = SKINNED.replace("<v>0 0 0 0 0 1 1 2 0 1 1 2</v>", "<v>9 0 0 0 0 1 1 2 0 1 1 2</v>");
        let doc = load_collada_from_string(&source).unwrap();
        let err = convert(&doc, &ConverterOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnmappedJoint { joint: 9, count: 2, .. }));
    }

    #[test]
    fn test_zero_world_scale_is_rejected() {
        let doc = load_collada_from_string(SKINNED).unwrap();
        let mut options = ConverterOptions::default();
        options.world_transform.enabled = true;
        options.world_transform.scale = 0.0;
        let err = convert(&doc, &options).unwrap_err();
        assert!(matches!(err, ConvertError::Options(OptionsError::WorldScale(_))));
    }

    #[test]
    fn test_joint_without_node_loses_influence() {
        let mapped = map_influences("g", vec![vec![(0, 0.5), (1, 0.5)]], &[Some(3), None]).unwrap();
        assert_eq!(mapped, vec![vec![(3, 0.5)]]);
        assert!(map_influences("g", vec![vec![(2, 1.0)]], &[Some(0), None]).is_err());
    }

    #[test]
    fn test_static_geometry_baked_with_node_transform() {
        let doc = load_collada_from_string(
            r##"<COLLADA>
              <library_geometries><geometry id="tri"><mesh>
                <source id="p"><float_array id="p-a" count="9">0 0 0 1 0 0 0 1 0</float_array>
                  <technique_common><accessor source="#p-a" count="3" stride="3"/></technique_common></source>
                <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
                <polylist count="1"><input semantic="VERTEX" source="#v" offset="0"/><vcount>3</vcount><p>0 1 2</p></polylist>
                <lines count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1</p></lines>
              </mesh></geometry></library_geometries>
              <library_visual_scenes><visual_scene id="vs">
                <node id="n"><translate>0 0 5</translate><instance_geometry url="#tri"/></node>
              </visual_scene></library_visual_scenes>
            </COLLADA>"##,
        )
        .unwrap();
        let model = convert(&doc, &ConverterOptions::default()).unwrap();
        assert_eq!(model.chunks.len(), 1);
        assert_eq!(model.chunks[0].name, "tri_0");
        assert!((model.bounding_box.min.z - 5.0).abs() < 1e-6);
        assert_eq!(model.materials.len(), 1);
        assert!(model.skeleton.is_empty());
        assert!(model.animations.is_empty());
    }

    #[test]
    fn test_out_of_range_index_is_fatal() {
        let doc = load_collada_from_string(
            r##"<COLLADA>
              <library_geometries><geometry id="tri"><mesh>
                <source id="p"><float_array id="p-a" count="9">0 0 0 1 0 0 0 1 0</float_array>
                  <technique_common><accessor source="#p-a" count="3" stride="3"/></technique_common></source>
                <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
                <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 7</p></triangles>
              </mesh></geometry></library_geometries>
              <library_visual_scenes><visual_scene id="vs">
                <node id="n"><instance_geometry url="#tri"/></node>
              </visual_scene></library_visual_scenes>
            </COLLADA>"##,
        )
        .unwrap();
        let err = convert(&doc, &ConverterOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Geometry { .. }));
    }
}
