//! COLLADA element graph types.
//!
//! Parsed elements live in an arena (`Document::elements`) and refer to each
//! other through `ElementId` handles and `LinkId`s. Links are resolved after
//! the whole document has been parsed, see [`super::resolver`].

use std::collections::HashMap;

use super::resolver::{AddressResolver, LinkId};

/// Handle of an element in the document arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parsed element: addressing information plus its typed payload.
#[derive(Clone, Debug)]
pub struct Element {
    /// Globally unique id (URL target).
    pub id: Option<String>,
    /// Scoped id, unique within the parent.
    pub sid: Option<String>,
    pub name: Option<String>,
    /// Structural parent in the arena.
    pub parent: Option<ElementId>,
    /// Children searched by SID resolution, in document order.
    pub scoped_children: Vec<ElementId>,
    /// Enclosing FX scope.
    pub fx_parent: Option<ElementId>,
    /// FX symbol table of this scope (newparam sid -> element).
    pub fx_children: HashMap<String, ElementId>,
    pub kind: ElementKind,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: None,
            sid: None,
            name: None,
            parent: None,
            scoped_children: Vec::new(),
            fx_parent: None,
            fx_children: HashMap::new(),
            kind,
        }
    }

    /// Display name: `name`, then `id`, then `sid`.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .or(self.sid.as_deref())
            .unwrap_or("")
    }
}

/// Closed set of element variants.
#[derive(Clone, Debug)]
pub enum ElementKind {
    Source(Source),
    Vertices(Vertices),
    Geometry(Geometry),
    Controller(Controller),
    Animation(Animation),
    Sampler(Sampler),
    Channel(Channel),
    VisualScene(VisualScene),
    Node(Node),
    Transform(Transform),
    InstanceGeometry(InstanceGeometry),
    Instance(Instance),
    Material(Material),
    Effect(Effect),
    EffectTechnique(EffectTechnique),
    /// `profile_COMMON`: an FX scope between effect and technique.
    ProfileCommon,
    NewParam(NewParam),
    Image(Image),
    Camera(Camera),
    Light(Light),
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Source(_) => "source",
            ElementKind::Vertices(_) => "vertices",
            ElementKind::Geometry(_) => "geometry",
            ElementKind::Controller(_) => "controller",
            ElementKind::Animation(_) => "animation",
            ElementKind::Sampler(_) => "sampler",
            ElementKind::Channel(_) => "channel",
            ElementKind::VisualScene(_) => "visual_scene",
            ElementKind::Node(_) => "node",
            ElementKind::Transform(_) => "transform",
            ElementKind::InstanceGeometry(_) => "instance_geometry",
            ElementKind::Instance(_) => "instance",
            ElementKind::Material(_) => "material",
            ElementKind::Effect(_) => "effect",
            ElementKind::EffectTechnique(_) => "technique",
            ElementKind::ProfileCommon => "profile_COMMON",
            ElementKind::NewParam(_) => "newparam",
            ElementKind::Image(_) => "image",
            ElementKind::Camera(_) => "camera",
            ElementKind::Light(_) => "light",
        }
    }
}

/// `<asset>` values the converter cares about.
#[derive(Clone, Debug)]
pub struct Asset {
    pub unit_meter: f32,
    pub up_axis: UpAxis,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            unit_meter: 1.0,
            up_axis: UpAxis::Y,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

// ---------------------------------------------------------------------------
// Data sources

/// Typed payload of a `<source>`.
#[derive(Clone, Debug)]
pub enum SourceData {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Name(Vec<String>),
    IdRef(Vec<String>),
    Bool(Vec<bool>),
}

impl SourceData {
    pub fn len(&self) -> usize {
        match self {
            SourceData::Float(v) => v.len(),
            SourceData::Int(v) => v.len(),
            SourceData::Name(v) | SourceData::IdRef(v) => v.len(),
            SourceData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `<source>`: an array plus its `<technique_common><accessor>`.
#[derive(Clone, Debug)]
pub struct Source {
    pub data: SourceData,
    /// Accessor offset into the array.
    pub offset: usize,
    /// Accessor stride (values per element).
    pub stride: usize,
    /// Accessor count (elements).
    pub count: usize,
    /// Accessor param names, e.g. `X Y Z` or `TIME`.
    pub params: Vec<String>,
}

impl Source {
    pub fn floats(&self) -> Option<&[f32]> {
        match &self.data {
            SourceData::Float(v) => Some(&v[self.offset.min(v.len())..]),
            _ => None,
        }
    }

    pub fn names(&self) -> Option<&[String]> {
        match &self.data {
            SourceData::Name(v) | SourceData::IdRef(v) => Some(&v[self.offset.min(v.len())..]),
            _ => None,
        }
    }
}

/// An `<input>`: semantic, source link and index offset.
#[derive(Clone, Debug)]
pub struct Input {
    pub semantic: String,
    pub source: LinkId,
    pub offset: usize,
    pub set: Option<u32>,
}

/// `<vertices>`: per-position inputs shared by all primitives of a mesh.
#[derive(Clone, Debug, Default)]
pub struct Vertices {
    pub inputs: Vec<Input>,
}

// ---------------------------------------------------------------------------
// Geometry

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    Polylist,
    Polygons,
    Lines,
    Linestrips,
    Trifans,
    Tristrips,
}

impl PrimitiveKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "triangles" => PrimitiveKind::Triangles,
            "polylist" => PrimitiveKind::Polylist,
            "polygons" => PrimitiveKind::Polygons,
            "lines" => PrimitiveKind::Lines,
            "linestrips" => PrimitiveKind::Linestrips,
            "trifans" => PrimitiveKind::Trifans,
            "tristrips" => PrimitiveKind::Tristrips,
            _ => return None,
        })
    }
}

/// One primitive group (`<triangles>`, `<polylist>`, ...).
#[derive(Clone, Debug)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub name: Option<String>,
    /// Material symbol, bound through `<instance_material>`.
    pub material: Option<String>,
    pub count: usize,
    pub inputs: Vec<Input>,
    /// Vertices per face. Filled with 3s for `<triangles>`.
    pub vcount: Vec<u32>,
    /// Flat interleaved index array (`<p>`).
    pub indices: Vec<i32>,
}

impl Primitive {
    /// Number of indices per face corner (max input offset + 1).
    pub fn index_stride(&self) -> usize {
        self.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub sources: Vec<ElementId>,
    pub vertices: Option<ElementId>,
    pub primitives: Vec<Primitive>,
    /// `<convex_mesh>`, `<spline>`, ... or a missing `<mesh>`.
    pub unsupported: Option<String>,
}

// ---------------------------------------------------------------------------
// Controllers

#[derive(Clone, Debug, Default)]
pub struct VertexWeights {
    pub count: usize,
    pub inputs: Vec<Input>,
    pub vcount: Vec<u32>,
    pub v: Vec<i32>,
}

#[derive(Clone, Debug)]
pub struct Skin {
    /// The skinned `<geometry>`.
    pub geometry: LinkId,
    /// Row-major bind shape matrix.
    pub bind_shape_matrix: [f32; 16],
    pub sources: Vec<ElementId>,
    /// `<joints>` inputs (JOINT, INV_BIND_MATRIX).
    pub joints: Vec<Input>,
    pub weights: VertexWeights,
}

#[derive(Clone, Debug, Default)]
pub struct Controller {
    pub skin: Option<Skin>,
    /// `<morph>` controllers are recognised but not converted.
    pub morph: bool,
}

// ---------------------------------------------------------------------------
// Animation

#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub animations: Vec<ElementId>,
    pub sources: Vec<ElementId>,
    pub samplers: Vec<ElementId>,
    pub channels: Vec<ElementId>,
}

#[derive(Clone, Debug, Default)]
pub struct Sampler {
    pub inputs: Vec<Input>,
}

impl Sampler {
    pub fn input(&self, semantic: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.semantic == semantic)
    }
}

#[derive(Clone, Debug)]
pub struct Channel {
    /// URL link to the `<sampler>`.
    pub source: LinkId,
    /// SID link to the animated value.
    pub target: LinkId,
}

// ---------------------------------------------------------------------------
// Scene

#[derive(Clone, Debug, Default)]
pub struct VisualScene {
    pub nodes: Vec<ElementId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeType {
    #[default]
    Node,
    Joint,
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub node_type: NodeType,
    pub layers: Vec<String>,
    /// Transform elements in document order.
    pub transforms: Vec<ElementId>,
    pub nodes: Vec<ElementId>,
    /// `<instance_geometry>` / `<instance_controller>` / other instances.
    pub instances: Vec<ElementId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    Matrix,
    Rotate,
    Translate,
    Scale,
    Lookat,
    Skew,
}

impl TransformKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "matrix" => TransformKind::Matrix,
            "rotate" => TransformKind::Rotate,
            "translate" => TransformKind::Translate,
            "scale" => TransformKind::Scale,
            "lookat" => TransformKind::Lookat,
            "skew" => TransformKind::Skew,
            _ => return None,
        })
    }

    /// Number of values the element carries.
    pub fn dimension(self) -> usize {
        match self {
            TransformKind::Matrix => 16,
            TransformKind::Rotate => 4,
            TransformKind::Translate | TransformKind::Scale => 3,
            TransformKind::Lookat => 9,
            TransformKind::Skew => 7,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Transform {
    pub kind: TransformKind,
    pub data: Vec<f32>,
}

/// `<bind_material>/<technique_common>/<instance_material>`.
#[derive(Clone, Debug)]
pub struct InstanceMaterial {
    pub symbol: String,
    pub target: LinkId,
}

/// `<instance_geometry>` or `<instance_controller>`.
#[derive(Clone, Debug)]
pub struct InstanceGeometry {
    pub url: LinkId,
    pub controller: bool,
    /// `<skeleton>` roots (controllers only).
    pub skeletons: Vec<LinkId>,
    pub materials: Vec<InstanceMaterial>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    Node,
    Camera,
    Light,
}

/// `<instance_node>`, `<instance_camera>`, `<instance_light>`.
#[derive(Clone, Debug)]
pub struct Instance {
    pub kind: InstanceKind,
    pub url: LinkId,
}

// ---------------------------------------------------------------------------
// Materials and effects

#[derive(Clone, Debug, Default)]
pub struct Material {
    pub effect: Option<LinkId>,
}

#[derive(Clone, Debug, Default)]
pub struct Effect {
    /// The `profile_COMMON` scope, if any.
    pub profile: Option<ElementId>,
    pub technique: Option<ElementId>,
    /// Names of profiles that were skipped.
    pub unsupported_profiles: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShadingModel {
    Constant,
    Lambert,
    #[default]
    Phong,
    Blinn,
}

/// A color or a texture reference in an effect technique.
#[derive(Clone, Debug)]
pub enum ColorOrTexture {
    Color([f32; 4]),
    Texture {
        /// FX link to the `sampler2D` newparam.
        sampler: LinkId,
        texcoord: Option<String>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct EffectTechnique {
    pub shading: ShadingModel,
    pub emission: Option<ColorOrTexture>,
    pub ambient: Option<ColorOrTexture>,
    pub diffuse: Option<ColorOrTexture>,
    pub specular: Option<ColorOrTexture>,
    pub shininess: Option<f32>,
    /// Normal / bump map from a vendor `<extra>`.
    pub bump: Option<ColorOrTexture>,
}

#[derive(Clone, Debug)]
pub enum NewParamValue {
    /// `<surface>`: the image is a URL link from `<init_from>`.
    Surface { image: Option<LinkId> },
    /// `<sampler2D>`: the surface is an FX link from `<source>`, or a URL
    /// link to an image from `<instance_image>` (COLLADA 1.5).
    Sampler2D {
        surface: Option<LinkId>,
        image: Option<LinkId>,
    },
    Float(f32),
    Float4([f32; 4]),
    Other,
}

#[derive(Clone, Debug)]
pub struct NewParam {
    pub value: NewParamValue,
}

#[derive(Clone, Debug, Default)]
pub struct Image {
    pub init_from: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Camera {
    pub perspective: bool,
    pub znear: f32,
    pub zfar: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Light {
    pub kind: String,
    pub color: [f32; 3],
}

// ---------------------------------------------------------------------------
// Document

/// A fully parsed and resolved COLLADA document.
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub elements: Vec<Element>,
    pub resolver: AddressResolver,
    pub asset: Asset,
    pub geometries: Vec<ElementId>,
    pub controllers: Vec<ElementId>,
    pub animations: Vec<ElementId>,
    pub visual_scenes: Vec<ElementId>,
    /// `<library_nodes>`, kept as node containers for `<instance_node>`.
    pub node_libraries: Vec<ElementId>,
    pub materials: Vec<ElementId>,
    pub effects: Vec<ElementId>,
    pub images: Vec<ElementId>,
    pub cameras: Vec<ElementId>,
    pub lights: Vec<ElementId>,
    /// `<scene><instance_visual_scene url>`.
    pub scene: Option<LinkId>,
}

impl Document {
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    /// Add an element to the arena under `parent` and register it with the
    /// resolver (id as URL target, sid as scoped child).
    pub fn add_element(&mut self, mut element: Element, parent: Option<ElementId>) -> ElementId {
        let handle = ElementId(self.elements.len() as u32);
        element.parent = parent;
        let id = element.id.clone();
        self.elements.push(element);

        if let Some(id) = id {
            self.resolver.register_url_target(&id, handle);
        }
        if let Some(parent) = parent {
            AddressResolver::register_sid_target(&mut self.elements, parent, handle);
        }
        handle
    }

    /// The target of a resolved link.
    pub fn link_target(&self, link: LinkId) -> Option<ElementId> {
        self.resolver.link(link).target
    }

    pub fn source(&self, id: ElementId) -> Option<&Source> {
        match &self.element(id).kind {
            ElementKind::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Resolve an input's source link to a `<source>`.
    pub fn input_source(&self, input: &Input) -> Option<&Source> {
        self.link_target(input.source).and_then(|id| self.source(id))
    }

    /// Resolve the scene's visual scene, falling back to the first one.
    pub fn main_visual_scene(&self) -> Option<ElementId> {
        self.scene
            .and_then(|link| self.link_target(link))
            .or_else(|| self.visual_scenes.first().copied())
    }

    /// Nearest ancestor (or self) that carries a global id.
    pub fn nearest_id(&self, mut element: ElementId) -> Option<&str> {
        loop {
            let e = self.element(element);
            if let Some(id) = &e.id {
                return Some(id);
            }
            element = e.parent?;
        }
    }
}
