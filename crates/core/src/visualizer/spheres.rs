use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Quat, Vec3};
use rand::prelude::*;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

const SAMPLING_INTERVAL: f32 = 0.02;
const MAX_DISTANCE: f32 = 12.0;
const SHELL_RADIUS: f32 = 15.0;
const SPHERE_SCALE: f32 = 0.08;
const SPIN_PER_TICK: f32 = PI / 2500.0;
const SPHERE_COLOR: Color = Color::rgb(
    0x2f as f32 / 255.0,
    0x88 as f32 / 255.0,
    0xf5 as f32 / 255.0,
);

/// Spheres scattered over a shell, pushed out from the centre by bin energy.
#[derive(Debug)]
pub struct Spheres {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    directions: Vec<Vec3>,
    distances: Vec<f32>,
}

impl Spheres {
    pub const KEY: &'static str = "spheres";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        Ok(Self {
            base: VisualizerBase::new(Self::KEY),
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            directions: Vec::new(),
            distances: Vec::new(),
        })
    }

    /// Uniformly distributed unit vector.
    fn random_direction(&mut self) -> Vec3 {
        let z: f32 = self.rng.gen_range(-1.0..=1.0);
        let phi: f32 = self.rng.gen_range(0.0..TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * phi.cos(), r * phi.sin(), z)
    }
}

impl Visualizer for Spheres {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        self.directions = (0..layout.slots()).map(|_| self.random_direction()).collect();
        self.distances = vec![SHELL_RADIUS; layout.slots()];

        let mut shell = SceneNode::group().at(Vec3::new(0.0, 3.0, -25.0));
        shell.rotation = Quat::from_rotation_x(FRAC_PI_2);
        for direction in &self.directions {
            shell = shell.with_child(
                SceneNode::mesh(Shape::Sphere { radius: 10.0 }, Material::new(SPHERE_COLOR))
                    .at(*direction * SHELL_RADIUS)
                    .with_scale(Vec3::splat(SPHERE_SCALE)),
            );
        }

        self.group = Some(self.base.attach(ctx.scene, shell));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("spheres updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.distances,
            MAX_DISTANCE,
        );

        let shell = self.base.node_mut(ctx.scene, group)?;
        for ((sphere, direction), distance) in shell
            .children
            .iter_mut()
            .zip(&self.directions)
            .zip(&self.distances)
        {
            sphere.position = *direction * *distance;
        }
        shell.rotation *= Quat::from_rotation_z(SPIN_PER_TICK);

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}
