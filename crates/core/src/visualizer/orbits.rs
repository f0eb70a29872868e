use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Quat, Vec3};
use rand::prelude::*;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    params::BLOOM_PASS,
    scene::{Color, Material, NodeId, SceneNode, Shape},
    Result, VisualizerError,
};

const SAMPLING_INTERVAL: f32 = 0.02;
const MAX_LEVEL: f32 = 12.0;
const SCALE_PER_LEVEL: f32 = 0.02;
const OPACITY_PER_LEVEL: f32 = 1.1;
const SPIN_PER_TICK: f32 = PI / 500.0;
const ORB_COLOR: Color = Color::rgb(
    0x2f as f32 / 255.0,
    0x88 as f32 / 255.0,
    0xf5 as f32 / 255.0,
);

/// Tilted ellipse traced by one orb.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub major: f32,
    pub minor: f32,
    /// Angular speed in radians per second.
    pub rate: f32,
    pub tilt: Quat,
}

impl Ellipse {
    /// Position on the ellipse at `time` seconds.
    pub fn at(&self, time: f32) -> Vec3 {
        let angle = self.rate * time;
        self.tilt * Vec3::new(self.major * angle.cos(), self.minor * angle.sin(), 0.0)
    }
}

/// Orbs travelling along random tilted ellipses, sized and lit by bin
/// energy.
#[derive(Debug)]
pub struct Orbits {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    paths: Vec<Ellipse>,
    levels: Vec<f32>,
}

impl Orbits {
    pub const KEY: &'static str = "orbits";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        base.params_mut().set_toggle(BLOOM_PASS, true)?;

        Ok(Self {
            base,
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            paths: Vec::new(),
            levels: Vec::new(),
        })
    }

    fn random_ellipse(&mut self) -> Ellipse {
        Ellipse {
            major: self.rng.gen_range(10.0..40.0),
            minor: self.rng.gen_range(2.0..9.0),
            rate: self.rng.gen_range(0.0..1.0),
            tilt: random_rotation(&mut self.rng),
        }
    }
}

/// Uniformly distributed rotation.
pub(crate) fn random_rotation(rng: &mut StdRng) -> Quat {
    let u: f32 = rng.gen_range(0.0..1.0);
    let v: f32 = rng.gen_range(0.0..1.0);
    let w: f32 = rng.gen_range(0.0..1.0);
    let (a, b) = ((1.0 - u).sqrt(), u.sqrt());
    Quat::from_xyzw(
        a * (TAU * v).sin(),
        a * (TAU * v).cos(),
        b * (TAU * w).sin(),
        b * (TAU * w).cos(),
    )
    .normalize()
}

impl Visualizer for Orbits {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut group = SceneNode::group().at(Vec3::new(0.0, 2.5, -25.0));
        group.rotation = Quat::from_rotation_x(FRAC_PI_2);

        self.paths.clear();
        for _ in 0..layout.slots() {
            let path = self.random_ellipse();
            let scale = self.rng.gen_range(0.045..0.085);
            group = group.with_child(
                SceneNode::mesh(
                    Shape::Sphere { radius: 10.0 },
                    Material::new(ORB_COLOR).transparent(),
                )
                .at(path.at(0.0))
                .with_scale(Vec3::splat(scale)),
            );
            self.paths.push(path);
        }

        self.levels = vec![0.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, group));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("orbits updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.levels,
            MAX_LEVEL,
        );

        let now = ctx.now;
        let node = self.base.node_mut(ctx.scene, group)?;
        for ((orb, path), level) in node
            .children
            .iter_mut()
            .zip(&self.paths)
            .zip(&self.levels)
        {
            orb.position = path.at(now);
            orb.scale = Vec3::ONE.normalize() * (level * SCALE_PER_LEVEL);
            if let Some(material) = orb.material.as_mut() {
                material.opacity = (level * OPACITY_PER_LEVEL).clamp(0.0, 1.0);
            }
        }
        node.rotation *= Quat::from_rotation_z(SPIN_PER_TICK);

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}
