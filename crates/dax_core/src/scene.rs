//! Converter scene graph.
//!
//! Mirrors a COLLADA visual scene as an arena of [`ConverterNode`]s. Each
//! node keeps its transform elements as independently animatable
//! [`TransformOp`]s, so animation channels can write into them and the local
//! matrix can be recomposed per frame.
//!
//! Matrices are cached: `local_matrix` / `world_matrix` return the cached
//! values, which only change through the explicit `update_*` calls.

use std::collections::HashMap;

use dax_math::{Mat4, Mat4Ext, Vec3};

use crate::collada::{Document, ElementId, ElementKind, InstanceKind, TransformKind};

/// Deepest `<instance_node>` chain that is expanded.
const MAX_INSTANCE_DEPTH: usize = 32;

/// Handle of a node in [`SceneNodes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Animation target: one transform op of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpTarget {
    pub node: NodeId,
    pub op: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformOpKind {
    Matrix,
    Rotate,
    Translate,
    Scale,
}

impl TransformOpKind {
    pub fn dimension(self) -> usize {
        match self {
            TransformOpKind::Matrix => 16,
            TransformOpKind::Rotate => 4,
            TransformOpKind::Translate | TransformOpKind::Scale => 3,
        }
    }
}

/// One animatable transform element.
#[derive(Clone, Debug)]
pub struct TransformOp {
    pub kind: TransformOpKind,
    pub sid: Option<String>,
    /// Values from the document.
    pub rest: Vec<f32>,
    /// Current (possibly animated) values.
    pub data: Vec<f32>,
}

impl TransformOp {
    /// Create an op, padding or truncating `data` to the kind's dimension.
    pub fn new(kind: TransformOpKind, sid: Option<String>, mut data: Vec<f32>) -> Self {
        let dim = kind.dimension();
        if data.len() != dim {
            log::warn!(
                "{:?} transform has {} values, expected {}",
                kind,
                data.len(),
                dim
            );
            let identity = Self::identity_data(kind);
            while data.len() < dim {
                data.push(identity[data.len()]);
            }
            data.truncate(dim);
        }
        Self {
            kind,
            sid,
            rest: data.clone(),
            data,
        }
    }

    fn identity_data(kind: TransformOpKind) -> Vec<f32> {
        match kind {
            TransformOpKind::Matrix => Mat4::IDENTITY.to_row_major().to_vec(),
            TransformOpKind::Rotate => vec![0.0, 0.0, 1.0, 0.0],
            TransformOpKind::Translate => vec![0.0; 3],
            TransformOpKind::Scale => vec![1.0; 3],
        }
    }

    /// Matrix of the current values.
    pub fn matrix(&self) -> Mat4 {
        let d = &self.data;
        match self.kind {
            TransformOpKind::Matrix => Mat4::from_row_major(d),
            TransformOpKind::Rotate => {
                let axis = Vec3::new(d[0], d[1], d[2]);
                if axis.length_squared() < 1e-12 {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis.normalize(), d[3].to_radians())
                }
            }
            TransformOpKind::Translate => Mat4::from_translation(Vec3::new(d[0], d[1], d[2])),
            TransformOpKind::Scale => Mat4::from_scale(Vec3::new(d[0], d[1], d[2])),
        }
    }

    /// Restore the document values.
    pub fn reset(&mut self) {
        self.data.copy_from_slice(&self.rest);
    }
}

/// A node of the converter scene graph.
#[derive(Clone, Debug)]
pub struct ConverterNode {
    pub name: String,
    /// Source `<node>` element.
    pub element: Option<ElementId>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transforms: Vec<TransformOp>,
    pub pre_transform: Mat4,
    pub post_transform: Mat4,
    pub is_joint: bool,
    /// `<instance_geometry>` / `<instance_controller>` elements.
    pub geometry_instances: Vec<ElementId>,
    local: Mat4,
    world: Mat4,
}

impl ConverterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            element: None,
            parent: None,
            children: Vec::new(),
            transforms: Vec::new(),
            pre_transform: Mat4::IDENTITY,
            post_transform: Mat4::IDENTITY,
            is_joint: false,
            geometry_instances: Vec::new(),
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        }
    }

    /// pre · ops (document order) · post, from the current op values.
    pub fn compose_local_matrix(&self) -> Mat4 {
        let mut m = self.pre_transform;
        for op in &self.transforms {
            m *= op.matrix();
        }
        m * self.post_transform
    }
}

/// Arena of converter nodes.
#[derive(Clone, Debug, Default)]
pub struct SceneNodes {
    nodes: Vec<ConverterNode>,
    roots: Vec<NodeId>,
    by_element: HashMap<ElementId, NodeId>,
    targets: HashMap<ElementId, OpTarget>,
}

impl SceneNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a visual scene.
    pub fn from_visual_scene(doc: &Document, visual_scene: ElementId) -> Self {
        let mut scene = Self::new();
        if let ElementKind::VisualScene(vs) = &doc.element(visual_scene).kind {
            for &node in &vs.nodes {
                scene.create_node(doc, node, None, 0);
            }
        }
        scene.update_matrices();
        log::debug!("Created {} scene nodes ({} roots)", scene.len(), scene.roots.len());
        scene
    }

    /// Recursively mirror a `<node>` element under `parent`.
    pub fn create_node(
        &mut self,
        doc: &Document,
        element: ElementId,
        parent: Option<NodeId>,
        instance_depth: usize,
    ) -> Option<NodeId> {
        let source = doc.element(element);
        let ElementKind::Node(node_data) = &source.kind else {
            log::warn!("Element {} is a <{}>, expected <node>", element.0, source.kind.type_name());
            return None;
        };

        let mut node = ConverterNode::new(source.label());
        node.element = Some(element);
        node.parent = parent;
        node.is_joint = node_data.node_type == crate::collada::NodeType::Joint;

        for &t in &node_data.transforms {
            let transform_element = doc.element(t);
            let ElementKind::Transform(transform) = &transform_element.kind else {
                continue;
            };
            let kind = match transform.kind {
                TransformKind::Matrix => TransformOpKind::Matrix,
                TransformKind::Rotate => TransformOpKind::Rotate,
                TransformKind::Translate => TransformOpKind::Translate,
                TransformKind::Scale => TransformOpKind::Scale,
                TransformKind::Lookat | TransformKind::Skew => {
                    log::warn!("Node '{}': <{:?}> transforms are not supported, ignored", node.name, transform.kind);
                    continue;
                }
            };
            let op_index = node.transforms.len();
            node.transforms
                .push(TransformOp::new(kind, transform_element.sid.clone(), transform.data.clone()));
            // The node is pushed right after this loop, at index len().
            self.targets.entry(t).or_insert(OpTarget {
                node: NodeId(self.nodes.len()),
                op: op_index,
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.by_element.entry(element).or_insert(id);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }

        for &instance in &node_data.instances {
            match &doc.element(instance).kind {
                ElementKind::InstanceGeometry(_) => self.nodes[id.0].geometry_instances.push(instance),
                ElementKind::Instance(inst) => match inst.kind {
                    InstanceKind::Node => {
                        if instance_depth >= MAX_INSTANCE_DEPTH {
                            log::error!("<instance_node> nesting too deep below '{}', skipped", self.nodes[id.0].name);
                            continue;
                        }
                        match doc.link_target(inst.url) {
                            Some(target) => {
                                self.create_node(doc, target, Some(id), instance_depth + 1);
                            }
                            None => log::warn!("Unresolved <instance_node> below '{}'", self.nodes[id.0].name),
                        }
                    }
                    InstanceKind::Camera | InstanceKind::Light => {
                        log::debug!("Ignoring {:?} instance on node '{}'", inst.kind, self.nodes[id.0].name)
                    }
                },
                _ => {}
            }
        }

        for &child in &node_data.nodes {
            self.create_node(doc, child, Some(id), instance_depth);
        }

        Some(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> &ConverterNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut ConverterNode {
        &mut self.nodes[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Node created for a `<node>` element (the first one, for instanced nodes).
    pub fn node_for_element(&self, element: ElementId) -> Option<NodeId> {
        self.by_element.get(&element).copied()
    }

    /// Transform op created for a transform element.
    pub fn animation_target(&self, element: ElementId) -> Option<OpTarget> {
        self.targets.get(&element).copied()
    }

    pub fn op(&self, target: OpTarget) -> &TransformOp {
        &self.nodes[target.node.0].transforms[target.op]
    }

    pub fn op_mut(&mut self, target: OpTarget) -> &mut TransformOp {
        &mut self.nodes[target.node.0].transforms[target.op]
    }

    /// Number of ancestors.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id.0].parent;
        while let Some(p) = current {
            depth += 1;
            current = self.nodes[p.0].parent;
        }
        depth
    }

    /// Cached local matrix.
    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        self.nodes[id.0].local
    }

    /// Cached world matrix.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        self.nodes[id.0].world
    }

    /// Recompose the local matrix of one node from its ops.
    pub fn update_local_matrix(&mut self, id: NodeId) -> Mat4 {
        let m = self.nodes[id.0].compose_local_matrix();
        self.nodes[id.0].local = m;
        m
    }

    /// Recompute the world matrix of one node, recursing through its parents.
    pub fn update_world_matrix(&mut self, id: NodeId) -> Mat4 {
        let local = self.update_local_matrix(id);
        let world = match self.nodes[id.0].parent {
            Some(p) => self.update_world_matrix(p) * local,
            None => local,
        };
        self.nodes[id.0].world = world;
        world
    }

    /// Recompute every local and world matrix, parents first.
    pub fn update_matrices(&mut self) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let local = self.update_local_matrix(id);
            let world = match self.nodes[id.0].parent {
                Some(p) => self.nodes[p.0].world * local,
                None => local,
            };
            self.nodes[id.0].world = world;
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
    }

    /// Restore every op to its document values.
    pub fn reset_transforms(&mut self) {
        for node in &mut self.nodes {
            for op in &mut node.transforms {
                op.reset();
            }
        }
    }

    /// Install the global world transform.
    ///
    /// Roots get `world` as pre-transform. With `unit_scale`, every node's
    /// post-transform becomes the inverse uniform scale and every non-root
    /// pre-transform the inverse of its parent's post-transform, so scaling
    /// only reaches translations.
    pub fn setup_world_transform(&mut self, world: Mat4, scale: f32, unit_scale: bool) {
        let unit_scale = if unit_scale && (scale == 0.0 || !scale.is_finite()) {
            log::warn!("Cannot keep scale out of node transforms with world scale {}", scale);
            false
        } else {
            unit_scale
        };
        if unit_scale {
            let post = Mat4::from_scale(Vec3::splat(1.0 / scale));
            for node in &mut self.nodes {
                node.post_transform = post;
            }
        }
        for i in 0..self.nodes.len() {
            match self.nodes[i].parent {
                None => self.nodes[i].pre_transform = world,
                Some(p) if unit_scale => {
                    self.nodes[i].pre_transform = self.nodes[p.0].post_transform.inverse();
                }
                Some(_) => {}
            }
        }
        self.update_matrices();
    }

    /// Matrix that takes geometry from node space to the converted world
    /// space, undoing the post-transform.
    pub fn geometry_matrix(&self, id: NodeId) -> Mat4 {
        let node = &self.nodes[id.0];
        self.world_matrix(id) * node.post_transform.inverse()
    }

    /// Append a node (used by tests and by callers building scenes by hand).
    pub fn push_node(&mut self, mut node: ConverterNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }
}
