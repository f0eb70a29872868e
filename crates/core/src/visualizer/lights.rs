use glam::Vec3;
use rand::prelude::*;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    params::{ConfigurableParameter, BLOOM_PASS},
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

pub const SPEED: &str = "speed";

const SAMPLING_INTERVAL: f32 = 0.03;
const OPACITY_GAIN: f32 = 1.1;
const BOUND: f32 = 30.0;
const PUSH_BACK: f32 = 50.0;
const LIGHT_COLOR: Color = Color::rgb(
    0x2f as f32 / 255.0,
    0xf1 as f32 / 255.0,
    0x09 as f32 / 255.0,
);

/// Drifting translucent orbs that glow with bin energy.
#[derive(Debug)]
pub struct Lights {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    velocities: Vec<Vec3>,
    opacities: Vec<f32>,
}

impl Lights {
    pub const KEY: &'static str = "lights";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        let params = base.params_mut();
        params.insert(SPEED, ConfigurableParameter::range(0.05, 0.01, 1.0, 0.01))?;
        params.set_toggle(BLOOM_PASS, true)?;

        Ok(Self {
            base,
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            velocities: Vec::new(),
            opacities: Vec::new(),
        })
    }

    fn spawn(&mut self) -> (SceneNode, Vec3) {
        let position = Vec3::new(
            self.rng.gen_range(-15.0..25.0),
            self.rng.gen_range(-5.0..10.0),
            -15.0,
        );
        let scale = self.rng.gen_range(0.025..0.085);
        let velocity = Vec3::new(self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0), 1.0)
            .normalize();

        let node = SceneNode::mesh(
            Shape::Sphere { radius: 10.0 },
            Material::new(LIGHT_COLOR).transparent(),
        )
        .at(position)
        .with_scale(Vec3::splat(scale));
        (node, velocity)
    }
}

/// Moves `position` by one drift step and pulls it back once it leaves the
/// visible box.
fn drift(position: &mut Vec3, velocity: Vec3, speed: f32) {
    position.x += velocity.x * speed;
    position.y += velocity.y * speed;
    if position.x.abs() > BOUND || position.y.abs() > BOUND {
        position.x -= velocity.x * PUSH_BACK;
        position.y -= velocity.y * PUSH_BACK;
    }
}

impl Visualizer for Lights {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut group = SceneNode::group();
        self.velocities.clear();
        for _ in 0..layout.slots() {
            let (node, velocity) = self.spawn();
            group = group.with_child(node);
            self.velocities.push(velocity);
        }

        self.opacities = vec![1.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, group));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("lights updated before init"))?;
        let speed = self.base.params().value(SPEED)?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.opacities,
            OPACITY_GAIN,
        );

        let node = self.base.node_mut(ctx.scene, group)?;
        for ((orb, velocity), opacity) in node
            .children
            .iter_mut()
            .zip(&self.velocities)
            .zip(&self.opacities)
        {
            if let Some(material) = orb.material.as_mut() {
                material.opacity = opacity.clamp(0.0, 1.0);
            }
            drift(&mut orb.position, *velocity, speed);
        }

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{render::RenderOutcome, visualizer::tests::Harness};

    #[test]
    fn adds_speed_and_enables_bloom() {
        let lights = Lights::new(&VisualizerOptions::default()).unwrap();
        let params = lights.parameters();
        assert_eq!(params.value(SPEED).unwrap(), 0.05);
        assert!(params.is_on(BLOOM_PASS).unwrap());
        assert_eq!(params.len(), 8);
    }

    #[test]
    fn drift_wraps_back_inside_bounds() {
        let velocity = Vec3::new(1.0, 0.0, 0.0);
        let mut position = Vec3::new(29.9, 0.0, -15.0);
        drift(&mut position, velocity, 0.5);
        assert!((position.x - (30.4 - PUSH_BACK)).abs() < 1e-4);
        assert_eq!(position.z, -15.0);

        let mut position = Vec3::new(0.0, 0.0, -15.0);
        drift(&mut position, velocity, 0.5);
        assert_eq!(position.x, 0.5);
    }

    #[test]
    fn opacity_follows_energy_and_bloom_composites() {
        let mut harness = Harness::new(1024);
        let mut lights = Lights::new(&VisualizerOptions { slots: 16, seed: 4 }).unwrap();
        lights.init(&mut harness.ctx(0.0)).unwrap();

        lights.update(&mut harness.ctx(0.0)).unwrap();
        let group = harness.scene.get(lights.group.unwrap()).unwrap();
        assert!(group
            .children
            .iter()
            .all(|orb| orb.material.as_ref().unwrap().opacity == 0.0));

        let outcome = lights
            .base
            .post_process(&harness.scene, &mut harness.backend)
            .unwrap();
        assert!(matches!(outcome, RenderOutcome::Composited { .. }));
        lights.teardown(&mut harness.scene, &mut harness.backend);
    }
}
