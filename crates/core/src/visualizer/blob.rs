use std::f32::consts::PI;

use glam::{Quat, Vec3};

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    render::SurfaceSize,
    scene::{Color, Material, NodeId, SceneNode, Shader, Shape, Uniform},
    Result, VisualizerError,
};

pub const TIME_UNIFORM: &str = "u_time";
pub const FREQUENCY_UNIFORM: &str = "u_frequency";
pub const RESOLUTION_UNIFORM: &str = "u_resolution";

const SPIN_PER_TICK: f32 = PI / 2500.0;

/// Mean of a byte buffer; zero when empty.
pub(crate) fn mean_level(buffer: &[u8]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    buffer.iter().map(|&byte| byte as f32).sum::<f32>() / buffer.len() as f32
}

fn resolution(size: Option<SurfaceSize>) -> Uniform {
    let [width, height] = size.map_or([1.0, 1.0], |size| {
        [size.width as f32, size.height as f32]
    });
    Uniform::Vec2([width, height])
}

/// Wireframe icosphere whose vertices a noise shader pushes outward by the
/// mean spectrum level.
#[derive(Debug)]
pub struct Blob {
    base: VisualizerBase,
    mesh: Option<NodeId>,
}

impl Blob {
    pub const KEY: &'static str = "blob";

    pub fn new(_options: &VisualizerOptions) -> Self {
        Self {
            base: VisualizerBase::new(Self::KEY),
            mesh: None,
        }
    }
}

impl Visualizer for Blob {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let mut material = Material::new(Color::WHITE).with_shader(Shader::NoiseDisplace);
        material.wireframe = true;
        let mut mesh = SceneNode::mesh(
            Shape::Icosahedron {
                radius: 4.0,
                detail: 30,
            },
            material,
        )
        .at(Vec3::new(0.0, 2.0, -3.0));
        mesh.uniforms.insert(TIME_UNIFORM.to_string(), Uniform::Float(0.0));
        mesh.uniforms.insert(FREQUENCY_UNIFORM.to_string(), Uniform::Float(0.0));
        mesh.uniforms.insert(
            RESOLUTION_UNIFORM.to_string(),
            resolution(ctx.backend.surface_size()),
        );

        self.mesh = Some(self.base.attach(ctx.scene, mesh));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let mesh = self
            .mesh
            .ok_or_else(|| VisualizerError::msg("blob updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        let level = mean_level(buffer);
        let surface = ctx.backend.surface_size();

        let node = self.base.node_mut(ctx.scene, mesh)?;
        node.uniforms.insert(TIME_UNIFORM.to_string(), Uniform::Float(ctx.now));
        node.uniforms.insert(FREQUENCY_UNIFORM.to_string(), Uniform::Float(level));
        node.uniforms.insert(RESOLUTION_UNIFORM.to_string(), resolution(surface));
        node.rotation *= Quat::from_rotation_y(SPIN_PER_TICK);

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::tests::Harness;

    #[test]
    fn mean_level_of_bytes() {
        assert_eq!(mean_level(&[]), 0.0);
        assert_eq!(mean_level(&[0, 255]), 127.5);
        assert_eq!(mean_level(&[10; 8]), 10.0);
    }

    #[test]
    fn uniforms_track_time_level_and_surface() {
        let mut harness = Harness::new(1024);
        let mut blob = Blob::new(&VisualizerOptions::default());
        blob.init(&mut harness.ctx(0.0)).unwrap();

        let node = harness.scene.get(blob.mesh.unwrap()).unwrap();
        assert!(node.material.as_ref().unwrap().wireframe);
        assert_eq!(
            node.uniforms.get(RESOLUTION_UNIFORM),
            Some(&Uniform::Vec2([320.0, 240.0]))
        );

        harness.feed_tone(440.0);
        blob.update(&mut harness.ctx(2.5)).unwrap();
        let expected = mean_level(harness.sampler.buffer());
        let node = harness.scene.get(blob.mesh.unwrap()).unwrap();
        assert_eq!(node.uniforms.get(TIME_UNIFORM), Some(&Uniform::Float(2.5)));
        assert_eq!(
            node.uniforms.get(FREQUENCY_UNIFORM),
            Some(&Uniform::Float(expected))
        );
        assert!(expected > 0.0);
        assert_ne!(node.rotation, Quat::IDENTITY);
        blob.teardown(&mut harness.scene, &mut harness.backend);
    }
}
