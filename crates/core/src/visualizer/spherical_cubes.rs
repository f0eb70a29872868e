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
const MAX_DEPTH: f32 = 12.0;
const SKELETON_RADIUS: f32 = 20.0;
const WIDTH_SEGMENTS: u32 = 32;
const HEIGHT_SEGMENTS: u32 = 16;
const SPIN_PER_TICK: f32 = PI / 2500.0;
const CUBE_COLOR: Color = Color::rgb(1.0, 1.0, 0xdd as f32 / 255.0);

/// Cubes pinned to vertices of a sphere, each pointing at the centre and
/// stretched along that axis by bin energy.
#[derive(Debug)]
pub struct SphericalCubes {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    depths: Vec<f32>,
}

impl SphericalCubes {
    pub const KEY: &'static str = "spherical-cubes";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        Ok(Self {
            base: VisualizerBase::new(Self::KEY),
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            depths: Vec::new(),
        })
    }

    /// A random vertex of a UV sphere with the skeleton's segment counts.
    fn random_vertex(&mut self) -> Vec3 {
        let u = self.rng.gen_range(0..=WIDTH_SEGMENTS) as f32 / WIDTH_SEGMENTS as f32;
        let v = self.rng.gen_range(0..=HEIGHT_SEGMENTS) as f32 / HEIGHT_SEGMENTS as f32;
        let (phi, theta) = (u * TAU, v * PI);
        Vec3::new(
            -SKELETON_RADIUS * phi.cos() * theta.sin(),
            SKELETON_RADIUS * theta.cos(),
            SKELETON_RADIUS * phi.sin() * theta.sin(),
        )
    }
}

/// Turns a cube at `position` so its local +Z points at the origin.
fn facing_centre(position: Vec3) -> Quat {
    let inward = -position.normalize_or_zero();
    if inward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(Vec3::Z, inward)
}

impl Visualizer for SphericalCubes {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut sphere = SceneNode::group().at(Vec3::new(0.0, 2.5, -25.0));
        sphere.rotation = Quat::from_rotation_x(FRAC_PI_2);

        for _ in 0..layout.slots() {
            let position = self.random_vertex();
            let mut cube =
                SceneNode::mesh(Shape::Box { size: 0.4 }, Material::new(CUBE_COLOR)).at(position);
            cube.rotation = facing_centre(position);
            sphere = sphere.with_child(cube);
        }

        self.depths = vec![1.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, sphere));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("spherical cubes updated before init"))?;

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.depths,
            MAX_DEPTH,
        );

        let sphere = self.base.node_mut(ctx.scene, group)?;
        for (cube, depth) in sphere.children.iter_mut().zip(&self.depths) {
            cube.scale = Vec3::new(1.0, 1.0, *depth);
        }
        sphere.rotation *= Quat::from_rotation_y(SPIN_PER_TICK);

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::tests::Harness;

    #[test]
    fn cubes_sit_on_the_skeleton_facing_inward() {
        let mut harness = Harness::new(2048);
        let mut cubes = SphericalCubes::new(&VisualizerOptions { slots: 50, seed: 3 }).unwrap();
        cubes.init(&mut harness.ctx(0.0)).unwrap();

        let sphere = harness.scene.get(cubes.group.unwrap()).unwrap();
        assert_eq!(sphere.children.len(), 50);
        for cube in &sphere.children {
            assert!((cube.position.length() - SKELETON_RADIUS).abs() < 1e-3);
            let forward = cube.rotation * Vec3::Z;
            let inward = -cube.position.normalize();
            assert!(forward.dot(inward) > 0.999);
        }
        cubes.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn energy_stretches_only_the_local_depth() {
        let mut harness = Harness::new(2048);
        let mut cubes = SphericalCubes::new(&VisualizerOptions { slots: 50, seed: 3 }).unwrap();
        cubes.init(&mut harness.ctx(0.0)).unwrap();

        harness.feed_tone(937.5);
        cubes.update(&mut harness.ctx(0.0)).unwrap();

        let sphere = harness.scene.get(cubes.group.unwrap()).unwrap();
        assert!(sphere.children.iter().any(|cube| cube.scale.z > 0.0));
        assert!(sphere
            .children
            .iter()
            .all(|cube| cube.scale.x == 1.0 && cube.scale.y == 1.0));
        assert!(sphere.children.iter().all(|cube| cube.scale.z <= MAX_DEPTH));
        cubes.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn facing_centre_handles_the_origin() {
        assert_eq!(facing_centre(Vec3::ZERO), Quat::IDENTITY);
        let pole = facing_centre(Vec3::new(0.0, SKELETON_RADIUS, 0.0));
        assert!((pole * Vec3::Z - Vec3::NEG_Y).length() < 1e-5);
    }
}
