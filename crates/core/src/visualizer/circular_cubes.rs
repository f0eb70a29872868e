use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Quat, Vec3};

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

const SAMPLING_INTERVAL: f32 = 0.02;
const MAX_SCALE: f32 = 12.0;
const RADIUS: f32 = 10.0;
const SPIN_PER_TICK: f32 = PI / 2500.0;
const CUBE_COLOR: Color = Color::rgb(1.0, 1.0, 0xdd as f32 / 255.0);

/// Ring of cubes stretched radially by bin energy.
#[derive(Debug)]
pub struct CircularCubes {
    base: VisualizerBase,
    slots: usize,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    scales: Vec<f32>,
}

impl CircularCubes {
    pub const KEY: &'static str = "circular-cubes";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        Ok(Self {
            base: VisualizerBase::new(Self::KEY),
            slots: options.slots,
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            scales: Vec::new(),
        })
    }
}

impl Visualizer for CircularCubes {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let step = TAU / layout.slots().max(1) as f32;
        let mut ring = SceneNode::group().at(Vec3::new(0.0, 2.0, -18.0));
        ring.rotation = Quat::from_rotation_x(FRAC_PI_2);

        for slot in 0..layout.slots() {
            let angle = step * slot as f32;
            let mut cube = SceneNode::mesh(Shape::Box { size: 0.4 }, Material::new(CUBE_COLOR))
                .at(Vec3::new(RADIUS * angle.cos(), 0.0, RADIUS * angle.sin()));
            cube.rotation = Quat::from_rotation_y(-angle);
            ring = ring.with_child(cube);
        }

        self.scales = vec![1.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, ring));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("circular cubes updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        let step = self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.scales,
            MAX_SCALE,
        );
        tracing::trace!(?step, "circular cubes step");

        let ring = self.base.node_mut(ctx.scene, group)?;
        for (cube, scale) in ring.children.iter_mut().zip(&self.scales) {
            cube.scale = Vec3::new(*scale, 1.0, 1.0);
        }
        ring.rotation *= Quat::from_rotation_y(SPIN_PER_TICK);

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::tests::Harness;

    #[test]
    fn cubes_sit_on_the_ring() {
        let mut harness = Harness::new(2048);
        let mut cubes = CircularCubes::new(&VisualizerOptions { slots: 50, seed: 0 }).unwrap();
        cubes.init(&mut harness.ctx(0.0)).unwrap();

        let ring = harness.scene.get(cubes.group.unwrap()).unwrap();
        assert_eq!(ring.children.len(), 50);
        for cube in &ring.children {
            assert!((cube.position.length() - RADIUS).abs() < 1e-3);
        }
        cubes.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn tone_stretches_cubes_and_ring_spins() {
        let mut harness = Harness::new(2048);
        let mut cubes = CircularCubes::new(&VisualizerOptions { slots: 50, seed: 0 }).unwrap();
        cubes.init(&mut harness.ctx(0.0)).unwrap();
        let start = harness.scene.get(cubes.group.unwrap()).unwrap().rotation;

        harness.feed_tone(1_000.0);
        cubes.update(&mut harness.ctx(0.0)).unwrap();

        let ring = harness.scene.get(cubes.group.unwrap()).unwrap();
        assert_ne!(ring.rotation, start);
        assert!(ring.children.iter().any(|cube| cube.scale.x > 0.0));
        assert!(ring.children.iter().all(|cube| cube.scale.y == 1.0));
        cubes.teardown(&mut harness.scene, &mut harness.backend);
    }
}
