use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::{AnalysisDomain, TransformSize},
    scene::{Color, Material, NodeId, SceneNode, Shader, Shape, Uniform},
    Result, VisualizerError,
};

/// Name of the byte texture the full-screen shader samples.
pub const AUDIO_DATA_UNIFORM: &str = "tAudioData";

const TRACE_COLOR: Color = Color::rgb(1.0, 1.0, 0.0);

/// Full-screen plane drawing the raw spectrum through a shader uniform.
///
/// Only renders correctly at the default transform size, so it asks the
/// engine to force that size while active.
#[derive(Debug)]
pub struct Pixels {
    base: VisualizerBase,
    plane: Option<NodeId>,
}

impl Pixels {
    pub const KEY: &'static str = "pixels";

    pub fn new(_options: &VisualizerOptions) -> Self {
        Self {
            base: VisualizerBase::new(Self::KEY),
            plane: None,
        }
    }
}

impl Visualizer for Pixels {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn required_transform_size(&self) -> Option<TransformSize> {
        Some(TransformSize::DEFAULT)
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let mut plane = SceneNode::mesh(
            Shape::Plane {
                width: 2.0,
                height: 2.0,
            },
            Material::new(TRACE_COLOR).with_shader(Shader::Spectrum),
        );
        plane.uniforms.insert(
            AUDIO_DATA_UNIFORM.to_string(),
            Uniform::Bytes(vec![0; ctx.sampler.bin_count()]),
        );
        self.plane = Some(self.base.attach(ctx.scene, plane));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let plane = self
            .plane
            .ok_or_else(|| VisualizerError::msg("pixels updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        let node = self.base.node_mut(ctx.scene, plane)?;
        match node.uniforms.get_mut(AUDIO_DATA_UNIFORM) {
            Some(Uniform::Bytes(bytes)) => {
                bytes.clear();
                bytes.extend_from_slice(buffer);
            }
            _ => {
                node.uniforms
                    .insert(AUDIO_DATA_UNIFORM.to_string(), Uniform::Bytes(buffer.to_vec()));
            }
        }

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::tests::Harness;

    #[test]
    fn uniform_mirrors_the_frequency_buffer() {
        let mut harness = Harness::new(2048);
        let mut pixels = Pixels::new(&VisualizerOptions::default());
        assert_eq!(pixels.required_transform_size(), Some(TransformSize::DEFAULT));
        pixels.init(&mut harness.ctx(0.0)).unwrap();

        harness.feed_tone(2_000.0);
        pixels.update(&mut harness.ctx(0.0)).unwrap();

        let plane = harness.scene.get(pixels.plane.unwrap()).unwrap();
        let Some(Uniform::Bytes(bytes)) = plane.uniforms.get(AUDIO_DATA_UNIFORM) else {
            panic!("audio uniform missing");
        };
        assert_eq!(bytes.len(), 1024);
        assert_eq!(bytes.as_slice(), harness.sampler.buffer());
        assert!(bytes.iter().any(|byte| *byte > 0));
        pixels.teardown(&mut harness.scene, &mut harness.backend);
    }
}
