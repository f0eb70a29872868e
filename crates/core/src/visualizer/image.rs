use std::sync::Arc;

use glam::Vec3;

use super::{blob::mean_level, FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    params::ConfigurableParameter,
    scene::{Color, Material, NodeId, SceneNode, Shader, Shape, Texture, Uniform},
    Result, VisualizerError,
};

pub const X_POS: &str = "xPos";
pub const Y_POS: &str = "yPos";
pub const Z_POS: &str = "zPos";
pub const X_SCALE: &str = "xScale";
pub const Y_SCALE: &str = "yScale";
pub const USE_SHADER_MATERIAL: &str = "useShaderMaterial";

/// Texture the blend shader samples.
pub const IMAGE_UNIFORM: &str = "img";
/// Mean spectrum level driving the blend.
pub const LEVEL_UNIFORM: &str = "uAudioDataAvg";

const PLANE_SIZE: f32 = 30.0;

/// Large plane showing the user's image. With the shader material on, the
/// image fades in from white as the mean spectrum level rises.
#[derive(Debug)]
pub struct Image {
    base: VisualizerBase,
    plane: Option<NodeId>,
}

impl Image {
    pub const KEY: &'static str = "image";

    pub fn new(_options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        let params = base.params_mut();
        params.insert(X_POS, ConfigurableParameter::range(0.0, -15.0, 15.0, 0.5))?;
        params.insert(Y_POS, ConfigurableParameter::range(1.5, -15.0, 15.0, 0.5))?;
        params.insert(Z_POS, ConfigurableParameter::range(-25.0, -50.0, 10.0, 0.5))?;
        params.insert(X_SCALE, ConfigurableParameter::range(1.0, 0.2, 3.0, 0.1))?;
        params.insert(Y_SCALE, ConfigurableParameter::range(1.0, 0.2, 3.0, 0.1))?;
        params.insert(USE_SHADER_MATERIAL, ConfigurableParameter::toggle(false))?;

        Ok(Self { base, plane: None })
    }
}

/// Switches `plane` to the blend shader, or back to its plain white material
/// when the shader is off or there is no image to blend.
fn apply_material(plane: &mut SceneNode, texture: Option<&Arc<Texture>>, level: Option<f32>) {
    let blend = texture.zip(level);
    if let Some(material) = plane.material.as_mut() {
        material.shader = blend.map(|_| Shader::TextureBlend);
    }
    match blend {
        Some((texture, level)) => {
            let current = plane.uniforms.get(IMAGE_UNIFORM);
            if !matches!(current, Some(Uniform::Texture(bound)) if Arc::ptr_eq(bound, texture)) {
                tracing::debug!(
                    width = texture.width(),
                    height = texture.height(),
                    "binding image texture"
                );
                plane
                    .uniforms
                    .insert(IMAGE_UNIFORM.to_string(), Uniform::Texture(Arc::clone(texture)));
            }
            plane
                .uniforms
                .insert(LEVEL_UNIFORM.to_string(), Uniform::Float(level));
        }
        None => {
            plane.uniforms.remove(IMAGE_UNIFORM);
            plane.uniforms.remove(LEVEL_UNIFORM);
        }
    }
}

impl Visualizer for Image {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let plane = SceneNode::mesh(
            Shape::Plane {
                width: PLANE_SIZE,
                height: PLANE_SIZE,
            },
            Material::new(Color::WHITE),
        )
        .at(Vec3::new(0.0, 1.5, -25.0));
        self.plane = Some(self.base.attach(ctx.scene, plane));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let plane = self
            .plane
            .ok_or_else(|| VisualizerError::msg("image updated before init"))?;
        let params = self.base.params();
        let position = Vec3::new(params.value(X_POS)?, params.value(Y_POS)?, params.value(Z_POS)?);
        let scale = Vec3::new(params.value(X_SCALE)?, params.value(Y_SCALE)?, 1.0);

        let level = if params.is_on(USE_SHADER_MATERIAL)? {
            Some(mean_level(ctx.sampler.refresh(AnalysisDomain::Frequency)?))
        } else {
            None
        };
        let texture = ctx.scene.texture().cloned();

        let node = self.base.node_mut(ctx.scene, plane)?;
        apply_material(node, texture.as_ref(), level);
        node.position = position;
        node.scale = scale;

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}
