use std::f32::consts::PI;

use glam::{Quat, Vec3};
use rand::prelude::*;

use super::{orbits::random_rotation, FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    params::BLOOM_PASS,
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

const SAMPLING_INTERVAL: f32 = 0.02;
const X_RANGE: (f32, f32) = (-50.0, 50.0);
const Y_RANGE: (f32, f32) = (-50.0, 50.0);
/// Deepest star, relative to the camera.
const FAR_DEPTH: f32 = -100.0;
const STAR_SCALE: f32 = 0.5;
const STAR_GLOW: f32 = 0.8;
const STAR_SPIN_PER_TICK: f32 = PI / 1000.0;
const CAMERA_STEP: f32 = 0.01;
const CAMERA_ROLL_PER_TICK: f32 = PI / 2500.0;
const STAR_COLOR: Color = Color::rgb(1.0, 0.87, 0.35);

/// Glowing stars the camera flies through. Each star pulses with the
/// waveform sample at its slot; stars left behind respawn ahead.
#[derive(Debug)]
pub struct Starfield {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    sizes: Vec<f32>,
}

impl Starfield {
    pub const KEY: &'static str = "starfield";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        base.params_mut().set_toggle(BLOOM_PASS, true)?;

        Ok(Self {
            base,
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            sizes: Vec::new(),
        })
    }

    fn random_depth(rng: &mut StdRng) -> f32 {
        (rng.gen_range(0.0..1.0) * FAR_DEPTH).floor()
    }

    fn spawn(&mut self) -> SceneNode {
        let x = self.rng.gen_range(X_RANGE.0..X_RANGE.1).floor();
        let y = self.rng.gen_range(Y_RANGE.0..Y_RANGE.1).floor();
        let z = Self::random_depth(&mut self.rng);
        let mut star = SceneNode::mesh(
            Shape::Star { size: 1.0 },
            Material::new(STAR_COLOR).emissive(STAR_GLOW),
        )
        .at(Vec3::new(x, y, z))
        .with_scale(Vec3::splat(STAR_SCALE));
        star.rotation = random_rotation(&mut self.rng);
        star
    }
}

impl Visualizer for Starfield {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut field = SceneNode::group();
        for _ in 0..layout.slots() {
            field = field.with_child(self.spawn());
        }

        self.sizes = vec![STAR_SCALE; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, field));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("starfield updated before init"))?;
        let camera = ctx.scene.camera();
        let camera_z = ctx
            .scene
            .get(camera)
            .map(|node| node.position.z)
            .ok_or_else(|| VisualizerError::msg("scene has no camera"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Time)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.sizes,
            1.0,
        );

        let field = self.base.node_mut(ctx.scene, group)?;
        for (star, size) in field.children.iter_mut().zip(&self.sizes) {
            star.scale = Vec3::splat(*size);
            star.rotation *= Quat::from_rotation_y(STAR_SPIN_PER_TICK);
            if camera_z < star.position.z {
                star.position.z = camera_z + Self::random_depth(&mut self.rng);
            }
        }

        if let Some(node) = ctx.scene.get_mut(camera) {
            node.position += node.rotation * Vec3::new(0.0, 0.0, -CAMERA_STEP);
            node.rotation *= Quat::from_rotation_z(-CAMERA_ROLL_PER_TICK);
        }

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scene::CAMERA_HOME, visualizer::tests::Harness};

    #[test]
    fn stars_fill_the_box_ahead_of_the_camera() {
        let mut harness = Harness::new(2048);
        let mut stars = Starfield::new(&VisualizerOptions { slots: 40, seed: 5 }).unwrap();
        assert!(stars.parameters().is_on(BLOOM_PASS).unwrap());
        stars.init(&mut harness.ctx(0.0)).unwrap();

        let field = harness.scene.get(stars.group.unwrap()).unwrap();
        assert_eq!(field.children.len(), 40);
        for star in &field.children {
            assert!((X_RANGE.0..X_RANGE.1).contains(&star.position.x));
            assert!((Y_RANGE.0..Y_RANGE.1).contains(&star.position.y));
            assert!((FAR_DEPTH..=0.0).contains(&star.position.z));
            assert_eq!(star.material.as_ref().unwrap().emissive, STAR_GLOW);
        }
        stars.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn camera_flies_forward_and_rolls() {
        let mut harness = Harness::new(2048);
        let mut stars = Starfield::new(&VisualizerOptions { slots: 10, seed: 5 }).unwrap();
        stars.init(&mut harness.ctx(0.0)).unwrap();

        for tick in 0..3 {
            stars.update(&mut harness.ctx(tick as f32 * 0.016)).unwrap();
        }
        let camera = harness.scene.get(harness.scene.camera()).unwrap();
        assert!(camera.position.z < CAMERA_HOME.z);
        assert_ne!(camera.rotation, Quat::IDENTITY);
        stars.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn stars_behind_the_camera_respawn_ahead() {
        let mut harness = Harness::new(2048);
        let mut stars = Starfield::new(&VisualizerOptions { slots: 10, seed: 5 }).unwrap();
        stars.init(&mut harness.ctx(0.0)).unwrap();
        let group = stars.group.unwrap();
        harness.scene.get_mut(group).unwrap().children[0].position.z = CAMERA_HOME.z + 5.0;

        stars.update(&mut harness.ctx(0.0)).unwrap();
        let star = &harness.scene.get(group).unwrap().children[0];
        assert!(star.position.z <= CAMERA_HOME.z);
        assert!(star.position.z >= CAMERA_HOME.z + FAR_DEPTH);
        stars.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn silence_holds_stars_at_the_waveform_midline() {
        let mut harness = Harness::new(2048);
        let mut stars = Starfield::new(&VisualizerOptions { slots: 10, seed: 5 }).unwrap();
        stars.init(&mut harness.ctx(0.0)).unwrap();

        stars.update(&mut harness.ctx(0.0)).unwrap();
        let field = harness.scene.get(stars.group.unwrap()).unwrap();
        let midline = 128.0 / 255.0;
        assert!(field
            .children
            .iter()
            .all(|star| (star.scale.x - midline).abs() < 1e-6));
        stars.teardown(&mut harness.scene, &mut harness.backend);
    }
}
