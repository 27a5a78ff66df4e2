//! COLLADA document parser.
//!
//! Walks the XML tree and fills the element arena. Every element that can be
//! addressed (by id, sid or FX sid) is registered while parsing; references
//! between elements are recorded as links and resolved afterwards.
//!
//! # Supported elements
//!
//! - `library_geometries`: `<mesh>` with `triangles`, `polylist`, `polygons`
//!   (other primitive kinds are kept and rejected by the converter)
//! - `library_controllers`: `<skin>` (`<morph>` is recognised and skipped)
//! - `library_animations`: nested `<animation>`, `<sampler>`, `<channel>`
//! - `library_visual_scenes`: nodes, transforms, instances, bound materials
//! - `library_materials`, `library_effects` (`profile_COMMON`), `library_images`
//! - `library_cameras`, `library_lights` (parsed, not converted)

use thiserror::Error;

use super::dom::{parse_bools, parse_floats, XmlElement};
use super::resolver::{AddressResolver, LinkId, LinkKind};
use super::types::*;

/// Errors that can occur during COLLADA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid document structure: {0}")]
    Structure(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a COLLADA XML tree into a resolved [`Document`].
pub fn parse_document(root: &XmlElement) -> ParseResult<Document> {
    let mut parser = ColladaParser::new();
    parser.parse_root(root)?;
    Ok(parser.finish())
}

/// Builds the element arena from an XML tree.
pub struct ColladaParser {
    doc: Document,
}

impl Default for ColladaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ColladaParser {
    pub fn new() -> Self {
        Self {
            doc: Document::default(),
        }
    }

    /// Resolve all links and hand out the document.
    pub fn finish(mut self) -> Document {
        let Document { elements, resolver, .. } = &mut self.doc;
        resolver.resolve_all(elements);
        self.doc
    }

    pub fn parse_root(&mut self, root: &XmlElement) -> ParseResult<()> {
        if root.name != "COLLADA" {
            return Err(ParseError::Structure(format!(
                "root element is <{}>, expected <COLLADA>",
                root.name
            )));
        }
        if let Some(version) = root.attr("version") {
            log::debug!("COLLADA version {}", version);
        }

        for child in &root.children {
            match child.name.as_str() {
                "asset" => self.parse_asset(child),
                "library_geometries" => {
                    for xml in child.children_named("geometry") {
                        let id = self.parse_geometry(xml)?;
                        self.doc.geometries.push(id);
                    }
                }
                "library_controllers" => {
                    for xml in child.children_named("controller") {
                        let id = self.parse_controller(xml)?;
                        self.doc.controllers.push(id);
                    }
                }
                "library_animations" => {
                    for xml in child.children_named("animation") {
                        let id = self.parse_animation(xml, None)?;
                        self.doc.animations.push(id);
                    }
                }
                "library_visual_scenes" => {
                    for xml in child.children_named("visual_scene") {
                        let id = self.parse_visual_scene(xml);
                        self.doc.visual_scenes.push(id);
                    }
                }
                "library_nodes" => {
                    let id = self.parse_visual_scene(child);
                    self.doc.node_libraries.push(id);
                }
                "library_materials" => {
                    for xml in child.children_named("material") {
                        let id = self.parse_material(xml);
                        self.doc.materials.push(id);
                    }
                }
                "library_effects" => {
                    for xml in child.children_named("effect") {
                        let id = self.parse_effect(xml);
                        self.doc.effects.push(id);
                    }
                }
                "library_images" => {
                    for xml in child.children_named("image") {
                        let id = self.parse_image(xml, None);
                        self.doc.images.push(id);
                    }
                }
                "library_cameras" => {
                    for xml in child.children_named("camera") {
                        let id = self.parse_camera(xml);
                        self.doc.cameras.push(id);
                    }
                }
                "library_lights" => {
                    for xml in child.children_named("light") {
                        let id = self.parse_light(xml);
                        self.doc.lights.push(id);
                    }
                }
                "scene" => {
                    if let Some(url) = child.child("instance_visual_scene").and_then(|i| i.attr("url")) {
                        self.doc.scene = Some(self.doc.resolver.create_url_link(url));
                    }
                    if child.child("instance_kinematics_scene").is_some() {
                        log::warn!("Kinematics scenes are not supported");
                    }
                }
                "extra" => {}
                other => log::debug!("Skipping unsupported element <{}>", other),
            }
        }
        Ok(())
    }

    fn add(&mut self, xml: &XmlElement, kind: ElementKind, parent: Option<ElementId>) -> ElementId {
        let mut element = Element::new(kind);
        element.id = xml.attr("id").map(str::to_string);
        element.sid = xml.attr("sid").map(str::to_string);
        element.name = xml.attr("name").map(str::to_string);
        self.doc.add_element(element, parent)
    }

    fn kind_mut(&mut self, id: ElementId) -> &mut ElementKind {
        &mut self.doc.elements[id.index()].kind
    }

    fn url_link(&mut self, url: &str) -> LinkId {
        self.doc.resolver.create_url_link(url)
    }

    fn fx_link(&mut self, sid: &str, scope: ElementId) -> LinkId {
        self.doc.resolver.create_link(LinkKind::Fx, sid, Some(scope), None)
    }

    // -----------------------------------------------------------------------
    // Asset

    fn parse_asset(&mut self, xml: &XmlElement) {
        if let Some(unit) = xml.child("unit") {
            if let Some(meter) = unit.attr("meter").and_then(|m| m.trim().parse::<f32>().ok()) {
                self.doc.asset.unit_meter = meter;
            }
        }
        if let Some(axis) = xml.child_text("up_axis") {
            self.doc.asset.up_axis = match axis {
                "X_UP" => UpAxis::X,
                "Y_UP" => UpAxis::Y,
                "Z_UP" => UpAxis::Z,
                other => {
                    log::warn!("Unknown up axis '{}', assuming Y_UP", other);
                    UpAxis::Y
                }
            };
        }
    }

    // -----------------------------------------------------------------------
    // Sources and inputs

    fn parse_source(&mut self, xml: &XmlElement, parent: Option<ElementId>) -> ParseResult<ElementId> {
        let mut array: Option<(&XmlElement, SourceData)> = None;
        for child in &xml.children {
            let data = match child.name.as_str() {
                "float_array" => SourceData::Float(child.floats()),
                "int_array" => SourceData::Int(child.ints()),
                "Name_array" => SourceData::Name(child.names()),
                "IDREF_array" => SourceData::IdRef(child.names()),
                "bool_array" => SourceData::Bool(parse_bools(child.text())),
                "SIDREF_array" | "token_array" => SourceData::Name(child.names()),
                _ => continue,
            };
            if let Some(count) = child.attr_usize("count") {
                if count != data.len() {
                    log::warn!(
                        "<{}> declares count={} but holds {} values",
                        child.name,
                        count,
                        data.len()
                    );
                }
            }
            array = Some((child, data));
            break;
        }

        let (array_xml, data) = match array {
            Some(a) => a,
            None => {
                log::warn!("<source id=\"{}\"> has no data array", xml.attr("id").unwrap_or(""));
                (xml, SourceData::Float(Vec::new()))
            }
        };

        let mut offset = 0;
        let mut stride = 1;
        let mut count = data.len();
        let mut params = Vec::new();

        if let Some(accessor) = xml.child("technique_common").and_then(|t| t.child("accessor")) {
            let source_ref = accessor.attr("source").unwrap_or("").trim_start_matches('#');
            let array_id = array_xml.attr("id").unwrap_or("");
            if !std::ptr::eq(array_xml, xml) && source_ref != array_id {
                return Err(ParseError::Structure(format!(
                    "accessor of source '{}' references '{}' instead of its own array '{}'",
                    xml.attr("id").unwrap_or(""),
                    source_ref,
                    array_id
                )));
            }
            offset = accessor.attr_usize("offset").unwrap_or(0);
            stride = accessor.attr_usize("stride").unwrap_or(1).max(1);
            count = accessor.attr_usize("count").unwrap_or(data.len() / stride);
            params = accessor
                .children_named("param")
                .map(|p| p.attr("name").unwrap_or("").to_string())
                .collect();
        }

        let source = Source {
            data,
            offset,
            stride,
            count,
            params,
        };
        Ok(self.add(xml, ElementKind::Source(source), parent))
    }

    fn parse_input(&mut self, xml: &XmlElement) -> Option<Input> {
        let (Some(semantic), Some(source)) = (xml.attr("semantic"), xml.attr("source")) else {
            log::warn!("<input> without semantic or source, skipped");
            return None;
        };
        Some(Input {
            semantic: semantic.to_string(),
            source: self.url_link(source),
            offset: xml.attr_usize("offset").unwrap_or(0),
            set: xml.attr("set").and_then(|s| s.trim().parse().ok()),
        })
    }

    fn parse_inputs(&mut self, xml: &XmlElement) -> Vec<Input> {
        xml.children_named("input")
            .filter_map(|i| self.parse_input(i))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Geometry

    fn parse_geometry(&mut self, xml: &XmlElement) -> ParseResult<ElementId> {
        let handle = self.add(xml, ElementKind::Geometry(Geometry::default()), None);
        let mut geometry = Geometry::default();

        let Some(mesh) = xml.child("mesh") else {
            let what = xml
                .children
                .iter()
                .find(|c| c.name != "asset" && c.name != "extra")
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "nothing".to_string());
            log::warn!("Geometry '{}' contains <{}>, only <mesh> is supported", xml.attr("id").unwrap_or(""), what);
            geometry.unsupported = Some(what);
            *self.kind_mut(handle) = ElementKind::Geometry(geometry);
            return Ok(handle);
        };

        for child in &mesh.children {
            match child.name.as_str() {
                "source" => geometry.sources.push(self.parse_source(child, Some(handle))?),
                "vertices" => {
                    let vertices = Vertices {
                        inputs: self.parse_inputs(child),
                    };
                    geometry.vertices = Some(self.add(child, ElementKind::Vertices(vertices), Some(handle)));
                }
                "extra" => {}
                tag => match PrimitiveKind::from_tag(tag) {
                    Some(kind) => geometry.primitives.push(self.parse_primitive(child, kind)),
                    None => log::debug!("Skipping <{}> in mesh", tag),
                },
            }
        }

        *self.kind_mut(handle) = ElementKind::Geometry(geometry);
        Ok(handle)
    }

    fn parse_primitive(&mut self, xml: &XmlElement, kind: PrimitiveKind) -> Primitive {
        let inputs = self.parse_inputs(xml);
        let mut count = xml.attr_usize("count");
        let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);

        let mut indices = Vec::new();
        let mut vcount = Vec::new();
        match kind {
            PrimitiveKind::Triangles => {
                if let Some(p) = xml.child("p") {
                    indices = p.ints();
                }
                let triangles = *count.get_or_insert_with(|| {
                    log::debug!("<triangles> without count, deriving it from <p>");
                    indices.len() / (3 * stride)
                });
                vcount = vec![3; triangles];
            }
            PrimitiveKind::Polylist => {
                if let Some(p) = xml.child("p") {
                    indices = p.ints();
                }
                if let Some(v) = xml.child("vcount") {
                    vcount = v.ints().into_iter().map(|c| c.max(0) as u32).collect();
                }
            }
            PrimitiveKind::Polygons => {
                for p in xml.children_named("p") {
                    let face = p.ints();
                    vcount.push((face.len() / stride) as u32);
                    indices.extend(face);
                }
                if xml.child("ph").is_some() {
                    log::warn!("<polygons> with holes (<ph>) are not supported, holes ignored");
                }
            }
            _ => {
                for p in xml.children_named("p") {
                    indices.extend(p.ints());
                }
            }
        }

        Primitive {
            kind,
            name: xml.attr("name").map(str::to_string),
            material: xml.attr("material").map(str::to_string),
            count: count.unwrap_or(0),
            inputs,
            vcount,
            indices,
        }
    }

    // -----------------------------------------------------------------------
    // Controllers

    fn parse_controller(&mut self, xml: &XmlElement) -> ParseResult<ElementId> {
        let handle = self.add(xml, ElementKind::Controller(Controller::default()), None);
        let mut controller = Controller::default();

        if let Some(skin_xml) = xml.child("skin") {
            let geometry = self.url_link(skin_xml.attr("source").unwrap_or(""));
            let mut bind_shape_matrix = [0.0f32; 16];
            for i in 0..4 {
                bind_shape_matrix[i * 5] = 1.0;
            }
            if let Some(bsm) = skin_xml.child("bind_shape_matrix") {
                let values = bsm.floats();
                if values.len() == 16 {
                    bind_shape_matrix.copy_from_slice(&values);
                } else {
                    log::warn!("bind_shape_matrix has {} values, using identity", values.len());
                }
            }

            let mut sources = Vec::new();
            for source in skin_xml.children_named("source") {
                sources.push(self.parse_source(source, Some(handle))?);
            }

            let joints = skin_xml
                .child("joints")
                .map(|j| self.parse_inputs(j))
                .unwrap_or_default();

            let mut weights = VertexWeights::default();
            if let Some(vw) = skin_xml.child("vertex_weights") {
                weights.count = vw.attr_usize("count").unwrap_or(0);
                weights.inputs = self.parse_inputs(vw);
                weights.vcount = vw
                    .child("vcount")
                    .map(|v| v.ints().into_iter().map(|c| c.max(0) as u32).collect())
                    .unwrap_or_default();
                weights.v = vw.child("v").map(|v| v.ints()).unwrap_or_default();
            } else {
                log::warn!("Skin of controller '{}' has no <vertex_weights>", xml.attr("id").unwrap_or(""));
            }

            controller.skin = Some(Skin {
                geometry,
                bind_shape_matrix,
                sources,
                joints,
                weights,
            });
        } else if xml.child("morph").is_some() {
            log::warn!(
                "Controller '{}' is a morph controller, morph targets are not supported",
                xml.attr("id").unwrap_or("")
            );
            controller.morph = true;
        }

        *self.kind_mut(handle) = ElementKind::Controller(controller);
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Animations

    fn parse_animation(&mut self, xml: &XmlElement, parent: Option<ElementId>) -> ParseResult<ElementId> {
        let handle = self.add(xml, ElementKind::Animation(Animation::default()), parent);
        let mut animation = Animation::default();

        for child in &xml.children {
            match child.name.as_str() {
                "animation" => animation.animations.push(self.parse_animation(child, Some(handle))?),
                "source" => animation.sources.push(self.parse_source(child, Some(handle))?),
                "sampler" => {
                    let sampler = Sampler {
                        inputs: self.parse_inputs(child),
                    };
                    animation
                        .samplers
                        .push(self.add(child, ElementKind::Sampler(sampler), Some(handle)));
                }
                "channel" => {
                    let (Some(source), Some(target)) = (child.attr("source"), child.attr("target")) else {
                        log::warn!("<channel> without source or target, skipped");
                        continue;
                    };
                    let parent_id = self.doc.nearest_id(handle).map(str::to_string);
                    let channel = Channel {
                        source: self.url_link(source),
                        target: self.doc.resolver.create_link(LinkKind::Sid, target, None, parent_id),
                    };
                    animation
                        .channels
                        .push(self.add(child, ElementKind::Channel(channel), Some(handle)));
                }
                "asset" | "extra" => {}
                other => log::debug!("Skipping <{}> in animation", other),
            }
        }

        *self.kind_mut(handle) = ElementKind::Animation(animation);
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Visual scenes

    fn parse_visual_scene(&mut self, xml: &XmlElement) -> ElementId {
        let handle = self.add(xml, ElementKind::VisualScene(VisualScene::default()), None);
        let nodes = xml
            .children_named("node")
            .map(|n| self.parse_node(n, handle))
            .collect();
        if xml.child("evaluate_scene").is_some() {
            log::debug!("Ignoring <evaluate_scene>");
        }
        *self.kind_mut(handle) = ElementKind::VisualScene(VisualScene { nodes });
        handle
    }

    fn parse_node(&mut self, xml: &XmlElement, parent: ElementId) -> ElementId {
        let handle = self.add(xml, ElementKind::Node(Node::default()), Some(parent));
        let mut node = Node {
            node_type: match xml.attr("type") {
                Some("JOINT") => NodeType::Joint,
                _ => NodeType::Node,
            },
            layers: xml
                .attr("layer")
                .map(|l| l.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            ..Default::default()
        };

        for child in &xml.children {
            let tag = child.name.as_str();
            if let Some(kind) = TransformKind::from_tag(tag) {
                let transform = Transform {
                    kind,
                    data: child.floats(),
                };
                node.transforms
                    .push(self.add(child, ElementKind::Transform(transform), Some(handle)));
                continue;
            }
            match tag {
                "node" => node.nodes.push(self.parse_node(child, handle)),
                "instance_geometry" | "instance_controller" => {
                    let instance = self.parse_instance_geometry(child, tag == "instance_controller");
                    node.instances
                        .push(self.add(child, ElementKind::InstanceGeometry(instance), Some(handle)));
                }
                "instance_node" | "instance_camera" | "instance_light" => {
                    let kind = match tag {
                        "instance_node" => InstanceKind::Node,
                        "instance_camera" => InstanceKind::Camera,
                        _ => InstanceKind::Light,
                    };
                    let instance = Instance {
                        kind,
                        url: self.url_link(child.attr("url").unwrap_or("")),
                    };
                    node.instances
                        .push(self.add(child, ElementKind::Instance(instance), Some(handle)));
                }
                "asset" | "extra" => {}
                other => log::debug!("Skipping <{}> in node", other),
            }
        }

        *self.kind_mut(handle) = ElementKind::Node(node);
        handle
    }

    fn parse_instance_geometry(&mut self, xml: &XmlElement, controller: bool) -> InstanceGeometry {
        let url = self.url_link(xml.attr("url").unwrap_or(""));
        let skeletons = xml
            .children_named("skeleton")
            .map(|s| self.url_link(s.text()))
            .collect();

        let mut materials = Vec::new();
        if let Some(technique) = xml
            .child("bind_material")
            .and_then(|b| b.child("technique_common"))
        {
            for im in technique.children_named("instance_material") {
                let (Some(symbol), Some(target)) = (im.attr("symbol"), im.attr("target")) else {
                    log::warn!("<instance_material> without symbol or target, skipped");
                    continue;
                };
                materials.push(InstanceMaterial {
                    symbol: symbol.to_string(),
                    target: self.url_link(target),
                });
            }
        }

        InstanceGeometry {
            url,
            controller,
            skeletons,
            materials,
        }
    }

    // -----------------------------------------------------------------------
    // Materials, effects, images

    fn parse_material(&mut self, xml: &XmlElement) -> ElementId {
        let effect = xml
            .child("instance_effect")
            .and_then(|i| i.attr("url"))
            .map(str::to_string);
        let effect = effect.map(|url| self.url_link(&url));
        if effect.is_none() {
            log::warn!("Material '{}' has no <instance_effect>", xml.attr("id").unwrap_or(""));
        }
        self.add(xml, ElementKind::Material(Material { effect }), None)
    }

    fn parse_effect(&mut self, xml: &XmlElement) -> ElementId {
        let handle = self.add(xml, ElementKind::Effect(Effect::default()), None);
        let mut effect = Effect::default();

        for child in &xml.children {
            match child.name.as_str() {
                "newparam" => self.parse_newparam(child, handle),
                "image" => {
                    self.parse_image(child, Some(handle));
                }
                "profile_COMMON" => {
                    let profile = self.add(child, ElementKind::ProfileCommon, Some(handle));
                    self.doc.elements[profile.index()].fx_parent = Some(handle);
                    effect.profile = Some(profile);

                    for pc in &child.children {
                        match pc.name.as_str() {
                            "newparam" => self.parse_newparam(pc, profile),
                            "image" => {
                                self.parse_image(pc, Some(profile));
                            }
                            "technique" => effect.technique = Some(self.parse_technique(pc, profile)),
                            _ => {}
                        }
                    }
                }
                tag if tag.starts_with("profile_") => {
                    log::warn!(
                        "Effect '{}': {} is not supported, only profile_COMMON",
                        xml.attr("id").unwrap_or(""),
                        tag
                    );
                    effect.unsupported_profiles.push(tag.to_string());
                }
                _ => {}
            }
        }

        *self.kind_mut(handle) = ElementKind::Effect(effect);
        handle
    }

    fn parse_newparam(&mut self, xml: &XmlElement, scope: ElementId) {
        let handle = self.add(
            xml,
            ElementKind::NewParam(NewParam {
                value: NewParamValue::Other,
            }),
            Some(scope),
        );
        self.doc.elements[handle.index()].fx_parent = Some(scope);

        let value = if let Some(surface) = xml.child("surface") {
            let image = surface
                .child("init_from")
                .map(|i| i.text().to_string())
                .map(|id| self.url_link(&id));
            NewParamValue::Surface { image }
        } else if let Some(sampler) = xml.child("sampler2D") {
            let surface = sampler
                .child_text("source")
                .map(str::to_string)
                .map(|sid| self.fx_link(&sid, scope));
            let image = sampler
                .child("instance_image")
                .and_then(|i| i.attr("url"))
                .map(str::to_string)
                .map(|url| self.url_link(&url));
            NewParamValue::Sampler2D { surface, image }
        } else if let Some(f) = xml.child("float") {
            NewParamValue::Float(f.floats().first().copied().unwrap_or(0.0))
        } else if let Some(f) = xml.child("float4") {
            let v = f.floats();
            let mut out = [0.0; 4];
            for (o, x) in out.iter_mut().zip(v) {
                *o = x;
            }
            NewParamValue::Float4(out)
        } else {
            NewParamValue::Other
        };
        *self.kind_mut(handle) = ElementKind::NewParam(NewParam { value });

        match xml.attr("sid") {
            Some(sid) => AddressResolver::register_fx_target(&mut self.doc.elements, scope, sid, handle),
            None => log::warn!("<newparam> without sid"),
        }
    }

    fn parse_technique(&mut self, xml: &XmlElement, profile: ElementId) -> ElementId {
        let handle = self.add(xml, ElementKind::EffectTechnique(EffectTechnique::default()), Some(profile));
        self.doc.elements[handle.index()].fx_parent = Some(profile);
        let mut technique = EffectTechnique::default();

        for child in &xml.children {
            match child.name.as_str() {
                "newparam" => self.parse_newparam(child, handle),
                "image" => {
                    self.parse_image(child, Some(handle));
                }
                model @ ("constant" | "lambert" | "phong" | "blinn") => {
                    technique.shading = match model {
                        "constant" => ShadingModel::Constant,
                        "lambert" => ShadingModel::Lambert,
                        "phong" => ShadingModel::Phong,
                        _ => ShadingModel::Blinn,
                    };
                    for param in &child.children {
                        match param.name.as_str() {
                            "emission" => technique.emission = self.parse_color_or_texture(param, handle),
                            "ambient" => technique.ambient = self.parse_color_or_texture(param, handle),
                            "diffuse" => technique.diffuse = self.parse_color_or_texture(param, handle),
                            "specular" => technique.specular = self.parse_color_or_texture(param, handle),
                            "shininess" => {
                                technique.shininess = param.child("float").and_then(|f| f.floats().first().copied())
                            }
                            _ => {}
                        }
                    }
                }
                "extra" => {
                    // Vendor bump maps: <extra><technique profile="..."><bump><texture/>
                    for vendor in child.children_named("technique") {
                        if let Some(bump) = vendor.child("bump") {
                            technique.bump = self.parse_color_or_texture(bump, handle);
                        }
                    }
                }
                _ => {}
            }
        }

        *self.kind_mut(handle) = ElementKind::EffectTechnique(technique);
        handle
    }

    fn parse_color_or_texture(&mut self, xml: &XmlElement, scope: ElementId) -> Option<ColorOrTexture> {
        if let Some(color) = xml.child("color") {
            let v = color.floats();
            let mut rgba = [0.0, 0.0, 0.0, 1.0];
            for (o, x) in rgba.iter_mut().zip(v) {
                *o = x;
            }
            return Some(ColorOrTexture::Color(rgba));
        }
        if let Some(texture) = xml.child("texture") {
            let Some(sampler) = texture.attr("texture") else {
                log::warn!("<texture> without texture attribute");
                return None;
            };
            return Some(ColorOrTexture::Texture {
                sampler: self.fx_link(sampler, scope),
                texcoord: texture.attr("texcoord").map(str::to_string),
            });
        }
        if xml.child("param").is_some() {
            log::warn!("<param> references in effect colors are not supported");
        }
        None
    }

    fn parse_image(&mut self, xml: &XmlElement, parent: Option<ElementId>) -> ElementId {
        let init_from = xml.child("init_from").map(|init| {
            // COLLADA 1.5 wraps the path in <ref>
            init.child_text("ref").unwrap_or_else(|| init.text()).to_string()
        });
        if init_from.is_none() {
            log::warn!("Image '{}' has no <init_from>", xml.attr("id").unwrap_or(""));
        }
        self.add(xml, ElementKind::Image(Image { init_from }), parent)
    }

    fn parse_camera(&mut self, xml: &XmlElement) -> ElementId {
        let mut camera = Camera::default();
        if let Some(tc) = xml.child("optics").and_then(|o| o.child("technique_common")) {
            let projection = tc.child("perspective").or_else(|| tc.child("orthographic"));
            camera.perspective = tc.child("perspective").is_some();
            if let Some(p) = projection {
                camera.znear = p.child("znear").map(|z| parse_floats(z.text())).and_then(|v| v.first().copied()).unwrap_or(0.1);
                camera.zfar = p.child("zfar").map(|z| parse_floats(z.text())).and_then(|v| v.first().copied()).unwrap_or(1000.0);
            }
        }
        self.add(xml, ElementKind::Camera(camera), None)
    }

    fn parse_light(&mut self, xml: &XmlElement) -> ElementId {
        let mut light = Light::default();
        if let Some(tc) = xml.child("technique_common") {
            if let Some(kind) = tc.children.first() {
                light.kind = kind.name.clone();
                if let Some(color) = kind.child("color") {
                    for (o, x) in light.color.iter_mut().zip(color.floats()) {
                        *o = x;
                    }
                }
            }
        }
        self.add(xml, ElementKind::Light(light), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::dom::parse_xml;
    use crate::collada::resolver::SidAccessor;

    fn parse(xml: &str) -> ParseResult<Document> {
        parse_document(&parse_xml(xml)?)
    }

    #[test]
    fn test_wrong_root_rejected() {
        let result = parse("<scene/>");
        assert!(matches!(result, Err(ParseError::Structure(_))));
    }

    #[test]
    fn test_source_accessor_must_reference_own_array() {
        let result = parse(
            r##"<COLLADA><library_geometries><geometry id="g"><mesh>
                <source id="s"><float_array id="arr" count="3">1 2 3</float_array>
                  <technique_common><accessor source="#other" count="1" stride="3"/></technique_common>
                </source></mesh></geometry></library_geometries></COLLADA>"##,
        );
        assert!(matches!(result, Err(ParseError::Structure(_))));
    }

    #[test]
    fn test_source_accessor() {
        let doc = parse(
            r##"<COLLADA><library_geometries><geometry id="g"><mesh>
                <source id="s"><float_array id="arr" count="6">1 2 3 4 5 6</float_array>
                  <technique_common><accessor source="#arr" count="2" stride="3">
                    <param name="X"/><param name="Y"/><param name="Z"/>
                  </accessor></technique_common>
                </source></mesh></geometry></library_geometries></COLLADA>"##,
        )
        .unwrap();
        let id = doc.resolver.resolve_url("s").unwrap();
        let source = doc.source(id).unwrap();
        assert_eq!(source.stride, 3);
        assert_eq!(source.count, 2);
        assert_eq!(source.params, vec!["X", "Y", "Z"]);
        assert_eq!(source.floats().unwrap().len(), 6);
    }

    #[test]
    fn test_forward_references_resolve() {
        // The scene is declared before the visual scene it instantiates.
        let doc = parse(
            r##"<COLLADA>
                <scene><instance_visual_scene url="#vs"/></scene>
                <library_visual_scenes><visual_scene id="vs">
                  <node id="n" sid="n"><translate sid="t">1 2 3</translate></node>
                </visual_scene></library_visual_scenes>
              </COLLADA>"##,
        )
        .unwrap();
        let vs = doc.main_visual_scene().unwrap();
        assert_eq!(doc.element(vs).id.as_deref(), Some("vs"));
    }

    #[test]
    fn test_channel_target_resolves_to_transform_member() {
        let doc = parse(
            r##"<COLLADA>
                <library_animations><animation id="a">
                  <sampler id="smp"/>
                  <channel source="#smp" target="n/t.Y"/>
                </animation></library_animations>
                <library_visual_scenes><visual_scene id="vs">
                  <node id="n"><translate sid="t">1 2 3</translate></node>
                </visual_scene></library_visual_scenes>
              </COLLADA>"##,
        )
        .unwrap();
        let anim = doc.animations[0];
        let ElementKind::Animation(animation) = &doc.element(anim).kind else {
            panic!("not an animation");
        };
        let ElementKind::Channel(channel) = &doc.element(animation.channels[0]).kind else {
            panic!("not a channel");
        };
        let link = doc.resolver.link(channel.target);
        let target = link.target.unwrap();
        assert!(matches!(doc.element(target).kind, ElementKind::Transform(_)));
        assert_eq!(link.accessor, SidAccessor::Member(1));
        assert_eq!(doc.link_target(channel.source), doc.resolver.resolve_url("smp"));
    }

    #[test]
    fn test_effect_texture_fx_chain() {
        let doc = parse(
            r##"<COLLADA>
                <library_images><image id="img"><init_from>tex/wood.png</init_from></image></library_images>
                <library_effects><effect id="fx"><profile_COMMON>
                  <newparam sid="surf"><surface type="2D"><init_from>img</init_from></surface></newparam>
                  <newparam sid="samp"><sampler2D><source>surf</source></sampler2D></newparam>
                  <technique sid="common"><phong>
                    <diffuse><texture texture="samp" texcoord="UV0"/></diffuse>
                    <specular><color>1 1 1 1</color></specular>
                  </phong></technique>
                </profile_COMMON><profile_GLSL/></effect></library_effects>
              </COLLADA>"##,
        )
        .unwrap();
        let fx = doc.effects[0];
        let ElementKind::Effect(effect) = &doc.element(fx).kind else {
            panic!("not an effect");
        };
        assert_eq!(effect.unsupported_profiles, vec!["profile_GLSL"]);
        let ElementKind::EffectTechnique(technique) = &doc.element(effect.technique.unwrap()).kind else {
            panic!("not a technique");
        };
        let Some(ColorOrTexture::Texture { sampler, .. }) = &technique.diffuse else {
            panic!("diffuse is not a texture");
        };
        let sampler_param = doc.link_target(*sampler).unwrap();
        let ElementKind::NewParam(NewParam {
            value: NewParamValue::Sampler2D { surface: Some(surface), .. },
        }) = &doc.element(sampler_param).kind
        else {
            panic!("not a sampler2D");
        };
        let surface_param = doc.link_target(*surface).unwrap();
        let ElementKind::NewParam(NewParam {
            value: NewParamValue::Surface { image: Some(image) },
        }) = &doc.element(surface_param).kind
        else {
            panic!("not a surface");
        };
        let image = doc.link_target(*image).unwrap();
        let ElementKind::Image(img) = &doc.element(image).kind else {
            panic!("not an image");
        };
        assert_eq!(img.init_from.as_deref(), Some("tex/wood.png"));
    }

    #[test]
    fn test_polygons_and_morph() {
        let doc = parse(
            r##"<COLLADA>
                <library_geometries><geometry id="g"><mesh>
                  <polygons count="2"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2 3</p><p>0 1 2</p></polygons>
                </mesh></geometry></library_geometries>
                <library_controllers><controller id="m"><morph source="#g"/></controller></library_controllers>
              </COLLADA>"##,
        )
        .unwrap();
        let ElementKind::Geometry(geometry) = &doc.element(doc.geometries[0]).kind else {
            panic!("not a geometry");
        };
        assert_eq!(geometry.primitives[0].vcount, vec![4, 3]);
        let ElementKind::Controller(controller) = &doc.element(doc.controllers[0]).kind else {
            panic!("not a controller");
        };
        assert!(controller.morph);
        assert!(controller.skin.is_none());
    }

    #[test]
    fn test_triangles_without_count() {
        let doc = parse(
            r##"<COLLADA>
                <library_geometries><geometry id="g"><mesh>
                  <triangles><input semantic="VERTEX" source="#v" offset="0"/><input semantic="NORMAL" source="#n" offset="1"/>
                    <p>0 0 1 0 2 0 2 0 3 0 0 0</p></triangles>
                  <triangles count="1"><input semantic="VERTEX" source="#v" offset="0"/><p>0 1 2</p></triangles>
                </mesh></geometry></library_geometries>
              </COLLADA>"##,
        )
        .unwrap();
        let ElementKind::Geometry(geometry) = &doc.element(doc.geometries[0]).kind else {
            panic!("not a geometry");
        };
        assert_eq!(geometry.primitives[0].count, 2);
        assert_eq!(geometry.primitives[0].vcount, vec![3, 3]);
        assert_eq!(geometry.primitives[1].count, 1);
        assert_eq!(geometry.primitives[1].vcount, vec![3]);
    }
}
