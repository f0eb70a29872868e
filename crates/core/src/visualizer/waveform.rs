use glam::Vec3;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

const SAMPLING_INTERVAL: f32 = 0.02;
const MAX_HEIGHT: f32 = 6.0;
const X_START: f32 = -25.0;
const X_STEP: f32 = 0.93;
const DEPTH: f32 = -12.0;
const CUBE_COLOR: Color = Color::rgb(0xaa as f32 / 255.0, 1.0, 0.0);

/// A row of cubes riding the waveform.
#[derive(Debug)]
pub struct Waveform {
    base: VisualizerBase,
    slots: usize,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    heights: Vec<f32>,
}

impl Waveform {
    pub const KEY: &'static str = "waveform";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        Ok(Self {
            base: VisualizerBase::new(Self::KEY),
            slots: options.slots,
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            heights: Vec::new(),
        })
    }
}

impl Visualizer for Waveform {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut group = SceneNode::group().at(Vec3::new(0.0, 0.0, DEPTH));
        for slot in 0..layout.slots() {
            let x = X_START + X_STEP * (slot + 1) as f32;
            group = group.with_child(
                SceneNode::mesh(Shape::Box { size: 0.4 }, Material::new(CUBE_COLOR))
                    .at(Vec3::new(x, 0.0, 0.0)),
            );
        }

        self.heights = vec![0.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, group));
        tracing::debug!(cubes = layout.slots(), stride = layout.stride(), "waveform ready");
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("waveform updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Time)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.heights,
            MAX_HEIGHT,
        );

        let node = self.base.node_mut(ctx.scene, group)?;
        for (cube, height) in node.children.iter_mut().zip(&self.heights) {
            cube.position.y = *height;
        }

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::tests::Harness;

    fn options(slots: usize) -> VisualizerOptions {
        VisualizerOptions { slots, seed: 1 }
    }

    #[test]
    fn lays_cubes_out_along_x() {
        let mut harness = Harness::new(2048);
        let mut waveform = Waveform::new(&options(50)).unwrap();
        waveform.init(&mut harness.ctx(0.0)).unwrap();

        let group = harness.scene.get(waveform.group.unwrap()).unwrap();
        assert_eq!(group.children.len(), 50);
        assert_eq!(group.position.z, DEPTH);
        assert!((group.children[0].position.x - (X_START + X_STEP)).abs() < 1e-5);
        waveform.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn small_transform_caps_cube_count() {
        let mut harness = Harness::new(32);
        let mut waveform = Waveform::new(&options(50)).unwrap();
        waveform.init(&mut harness.ctx(0.0)).unwrap();

        let group = harness.scene.get(waveform.group.unwrap()).unwrap();
        assert_eq!(group.children.len(), 16);
        waveform.update(&mut harness.ctx(0.0)).unwrap();
        waveform.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn silence_sits_at_mid_height() {
        let mut harness = Harness::new(256);
        let mut waveform = Waveform::new(&options(8)).unwrap();
        waveform.init(&mut harness.ctx(0.0)).unwrap();
        waveform.update(&mut harness.ctx(0.0)).unwrap();

        let expected = 128.0 / 255.0 * MAX_HEIGHT;
        let group = harness.scene.get(waveform.group.unwrap()).unwrap();
        assert!(group
            .children
            .iter()
            .all(|cube| (cube.position.y - expected).abs() < 1e-4));
        waveform.teardown(&mut harness.scene, &mut harness.backend);
    }
}
