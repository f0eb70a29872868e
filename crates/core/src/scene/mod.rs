use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

pub const CAMERA_HOME: Vec3 = Vec3::new(0.0, 2.0, 8.0);
pub const LIGHT_HOME: Vec3 = Vec3::new(0.0, 20.0, 0.0);
pub const DEFAULT_BACKGROUND: &str = "#111e37";

/// Handle for a top-level node in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Linear RGB colour parsed from `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Color {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VisualizerError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map(|value| value as f32 / 255.0)
                .map_err(|_| invalid())
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Color {
    type Error = VisualizerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = |channel: f32| (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
        write!(f, "#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box { size: f32 },
    Sphere { radius: f32 },
    Plane { width: f32, height: f32 },
    /// Flat disc facing +Z.
    Circle { radius: f32 },
    /// Subdivided icosahedron; `detail` is the subdivision level.
    Icosahedron { radius: f32, detail: u32 },
    /// Five-pointed star model.
    Star { size: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Camera,
    Light { intensity: f32 },
    Group,
    Mesh(Shape),
}

impl NodeKind {
    /// Type tag as the rendering layer reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Camera => "PerspectiveCamera",
            Self::Light { .. } => "SpotLight",
            Self::Group => "Group",
            Self::Mesh(_) => "Mesh",
        }
    }

    /// Camera and light nodes survive a scene clear.
    pub fn is_fixture(&self) -> bool {
        let name = self.type_name().to_ascii_lowercase();
        name.contains("camera") || name.contains("light")
    }
}

/// Custom programs a mesh can be drawn with instead of the lit material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Draws the byte spectrum across the mesh.
    Spectrum,
    /// Displaces vertices along their normals with periodic noise.
    NoiseDisplace,
    /// Transparent disc with an opaque rim.
    Ring,
    /// Blends a texture against white by audio level.
    TextureBlend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub wireframe: bool,
    pub emissive: f32,
    pub shader: Option<Shader>,
}

impl Material {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            opacity: 1.0,
            transparent: false,
            wireframe: false,
            emissive: 0.0,
            shader: None,
        }
    }

    pub fn transparent(mut self) -> Self {
        self.transparent = true;
        self
    }

    /// Self-illumination in the material's own colour.
    pub fn emissive(mut self, intensity: f32) -> Self {
        self.emissive = intensity;
        self
    }

    pub fn with_shader(mut self, shader: Shader) -> Self {
        self.shader = Some(shader);
        self
    }
}

/// RGBA8 image shared between the scene and the meshes sampling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(VisualizerError::InvalidConfig(format!(
                "texture of {width}x{height} needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

/// Shader input attached to a mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    Float(f32),
    Vec2([f32; 2]),
    Bytes(Vec<u8>),
    Texture(Arc<Texture>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub material: Option<Material>,
    pub uniforms: BTreeMap<String, Uniform>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            material: None,
            uniforms: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    pub fn mesh(shape: Shape, material: Material) -> Self {
        Self {
            material: Some(material),
            ..Self::new(NodeKind::Mesh(shape))
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Visits this node and every descendant, depth first.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut SceneNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The scene graph shared by every visualizer: a flat list of top-level
/// nodes plus the camera and light fixtures.
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<(NodeId, SceneNode)>,
    next_id: u64,
    background: Color,
    camera: NodeId,
    light: NodeId,
    texture: Option<Arc<Texture>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut scene = Self {
            nodes: Vec::new(),
            next_id: 0,
            background: Color::rgb(
                0x11 as f32 / 255.0,
                0x1e as f32 / 255.0,
                0x37 as f32 / 255.0,
            ),
            camera: NodeId(0),
            light: NodeId(0),
            texture: None,
        };
        scene.camera = scene.add(SceneNode::new(NodeKind::Camera).at(CAMERA_HOME));
        scene.light = scene.add(SceneNode::new(NodeKind::Light { intensity: 5.0 }).at(LIGHT_HOME));
        scene
    }

    /// Appends a top-level node and returns its handle.
    pub fn add(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push((id, node));
        id
    }

    /// Detaches a top-level node, returning it if it was present.
    pub fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        let index = self.nodes.iter().position(|(node_id, _)| *node_id == id)?;
        Some(self.nodes.remove(index).1)
    }

    /// Top-level node by handle.
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes
            .iter()
            .find(|(node_id, _)| *node_id == id)
            .map(|(_, node)| node)
    }

    /// Top-level node by handle, for mutation.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes
            .iter_mut()
            .find(|(node_id, _)| *node_id == id)
            .map(|(_, node)| node)
    }

    /// Whether `id` is still in the scene.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Top-level children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Number of top-level nodes, fixtures included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Removes every top-level node except cameras and lights and returns how
    /// many were dropped.
    pub fn clear_content(&mut self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|(_, node)| node.kind.is_fixture());
        before - self.nodes.len()
    }

    /// Handle of the camera fixture.
    pub fn camera(&self) -> NodeId {
        self.camera
    }

    /// Handle of the light fixture.
    pub fn light(&self) -> NodeId {
        self.light
    }

    /// Puts the camera back at its home pose.
    pub fn reset_camera(&mut self) {
        let camera = self.camera;
        if let Some(node) = self.get_mut(camera) {
            node.position = CAMERA_HOME;
            node.rotation = Quat::IDENTITY;
        }
    }

    /// Moves the light along one axis.
    pub fn set_light_axis(&mut self, axis: Axis, value: f32) {
        let light = self.light;
        if let Some(node) = self.get_mut(light) {
            match axis {
                Axis::X => node.position.x = value,
                Axis::Y => node.position.y = value,
                Axis::Z => node.position.z = value,
            }
        }
    }

    /// Clear colour.
    pub fn background(&self) -> Color {
        self.background
    }

    /// Sets the clear colour from `#rrggbb`.
    pub fn set_background(&mut self, color: &str) -> Result<()> {
        self.background = color.parse()?;
        Ok(())
    }

    /// Recolours every content mesh.
    pub fn set_content_color(&mut self, color: Color) {
        self.for_each_content_material(|material| material.color = color);
    }

    /// The user-supplied image, if one has been loaded.
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        self.texture.as_ref()
    }

    /// Replaces the user-supplied image. Effects that sample it pick the
    /// change up on their next update.
    pub fn set_texture(&mut self, texture: Option<Texture>) {
        self.texture = texture.map(Arc::new);
    }

    /// Flips wireframe rendering on every content mesh.
    pub fn toggle_wireframe(&mut self) {
        self.for_each_content_material(|material| material.wireframe = !material.wireframe);
    }

    fn for_each_content_material(&mut self, mut f: impl FnMut(&mut Material)) {
        for (_, node) in self.nodes.iter_mut().filter(|(_, node)| !node.kind.is_fixture()) {
            node.visit_mut(&mut |node| {
                if let Some(material) = node.material.as_mut() {
                    f(material);
                }
            });
        }
    }
}

/// Top-level nodes a visualizer has attached, so it can remove exactly what
/// it added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedNodes {
    ids: Vec<NodeId>,
}

impl OwnedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` to the scene and records it.
    pub fn attach(&mut self, scene: &mut Scene, node: SceneNode) -> NodeId {
        let id = scene.add(node);
        self.ids.push(id);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Removes every recorded node still present in `scene`.
    pub fn release(&mut self, scene: &mut Scene) -> usize {
        self.ids
            .drain(..)
            .filter(|id| scene.remove(*id).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> SceneNode {
        SceneNode::mesh(Shape::Box { size: 0.4 }, Material::new(Color::WHITE))
    }

    #[test]
    fn new_scene_holds_only_fixtures() {
        let scene = Scene::new();
        assert_eq!(scene.len(), 2);
        assert!(scene.children().all(|(_, node)| node.kind.is_fixture()));
        assert_eq!(scene.get(scene.camera()).unwrap().position, CAMERA_HOME);
        assert_eq!(scene.background().to_string(), DEFAULT_BACKGROUND);
    }

    #[test]
    fn clear_keeps_camera_and_light() {
        let mut scene = Scene::new();
        scene.add(cube());
        scene.add(SceneNode::group().with_child(cube()));

        assert_eq!(scene.clear_content(), 2);
        assert_eq!(scene.len(), 2);
        assert!(scene.contains(scene.camera()));
        assert!(scene.contains(scene.light()));
    }

    #[test]
    fn owned_nodes_release_only_their_own() {
        let mut scene = Scene::new();
        let foreign = scene.add(cube());
        let mut owned = OwnedNodes::new();
        owned.attach(&mut scene, cube());
        owned.attach(&mut scene, cube());

        assert_eq!(owned.release(&mut scene), 2);
        assert!(owned.is_empty());
        assert!(scene.contains(foreign));
        assert_eq!(scene.len(), 3);
    }

    #[test]
    fn parses_hex_colours() {
        let color: Color = "#ff8000".parse().unwrap();
        assert_eq!(color.r, 1.0);
        assert!((color.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(color.b, 0.0);
        assert_eq!(color.to_string(), "#ff8000");

        assert!("ff8000".parse::<Color>().is_err());
        assert!("#ff80".parse::<Color>().is_err());
        assert!("#gg8000".parse::<Color>().is_err());
    }

    #[test]
    fn lighting_and_camera_controls() {
        let mut scene = Scene::new();
        scene.set_light_axis(Axis::X, 4.0);
        assert_eq!(scene.get(scene.light()).unwrap().position.x, 4.0);

        let camera = scene.camera();
        scene.get_mut(camera).unwrap().position = Vec3::splat(3.0);
        scene.reset_camera();
        assert_eq!(scene.get(camera).unwrap().position, CAMERA_HOME);

        assert!(scene.set_background("blue").is_err());
        scene.set_background("#000000").unwrap();
        assert_eq!(scene.background(), Color::rgb(0.0, 0.0, 0.0));
    }

    #[test]
    fn content_styling_reaches_nested_meshes() {
        let mut scene = Scene::new();
        let id = scene.add(SceneNode::group().with_child(cube()));
        scene.set_content_color(Color::rgb(0.0, 1.0, 0.0));
        scene.toggle_wireframe();

        let child = &scene.get(id).unwrap().children[0];
        let material = child.material.as_ref().unwrap();
        assert_eq!(material.color, Color::rgb(0.0, 1.0, 0.0));
        assert!(material.wireframe);
    }

    #[test]
    fn texture_size_must_match_its_bytes() {
        assert!(Texture::new(2, 2, vec![0; 16]).is_ok());
        assert!(Texture::new(2, 2, vec![0; 12]).is_err());
        assert!(Texture::new(0, 2, Vec::new()).is_err());

        let mut scene = Scene::new();
        assert!(scene.texture().is_none());
        scene.set_texture(Some(Texture::new(1, 1, vec![255; 4]).unwrap()));
        assert_eq!(scene.texture().unwrap().rgba(), &[255; 4]);
        scene.set_texture(None);
        assert!(scene.texture().is_none());
    }
}
