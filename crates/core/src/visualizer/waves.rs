use glam::Vec3;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    params::{ConfigurableParameter, AFTERIMAGE_PASS},
    scene::{Color, Material, NodeId, SceneNode, Shape, CAMERA_HOME},
    Result, VisualizerError,
};

pub const Z_SEPARATION: &str = "zSeparation";
pub const X_SEPARATION: &str = "xSeparation";
pub const SPEED: &str = "speed";
pub const Y_POS: &str = "yPos";

pub const COLUMNS: usize = 15;

const SAMPLING_INTERVAL: f32 = 0.08;
const MAX_HEIGHT: f32 = 12.0;
const REST_Y: f32 = -5.0;
/// Rows this far past the camera wrap to the back of the field.
const RECYCLE_DISTANCE: f32 = 20.0;
const CUBE_COLOR: Color = Color::rgb(1.0, 1.0, 0xdd as f32 / 255.0);

/// Rows of cubes rolling toward the camera, each row lifted by the waveform.
#[derive(Debug)]
pub struct Waves {
    base: VisualizerBase,
    slots: usize,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    heights: Vec<f32>,
}

impl Waves {
    pub const KEY: &'static str = "waves";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        let params = base.params_mut();
        params.insert(
            Z_SEPARATION,
            ConfigurableParameter::range(-6.0, -10.0, -2.0, 1.0).hidden(),
        )?;
        params.insert(
            X_SEPARATION,
            ConfigurableParameter::range(6.0, 1.0, 10.0, 1.0).hidden(),
        )?;
        params.insert(SPEED, ConfigurableParameter::range(0.1, 0.0, 0.5, 0.01))?;
        params.insert(Y_POS, ConfigurableParameter::range(-2.0, -10.0, 10.0, 1.0))?;
        params.set_toggle(AFTERIMAGE_PASS, true)?;

        Ok(Self {
            base,
            slots: options.slots,
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            heights: Vec::new(),
        })
    }
}

/// Advances every cube toward the camera. A cube that passes `limit` is
/// placed one row spacing behind the row that precedes it.
fn roll_rows(rows: &mut [SceneNode], speed: f32, limit: f32, z_separation: f32) {
    let count = rows.len();
    for index in 0..count {
        let behind = if index == 0 { count - 1 } else { index - 1 };
        for column in 0..rows[index].children.len() {
            rows[index].children[column].position.z += speed;
            if rows[index].children[column].position.z > limit {
                let anchor = rows[behind]
                    .children
                    .first()
                    .map_or(limit, |cube| cube.position.z);
                rows[index].children[column].position.z = anchor + z_separation;
            }
        }
    }
}

impl Visualizer for Waves {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);

        let params = self.base.params();
        let x_separation = params.value(X_SEPARATION)?;
        let z_separation = params.value(Z_SEPARATION)?;
        let y_pos = params.value(Y_POS)?;

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let x_start = -(COLUMNS as f32 / 2.0 * x_separation).floor();
        let mut field = SceneNode::group().at(Vec3::new(0.0, y_pos, 0.0));
        for row_index in 0..layout.slots() {
            let z = row_index as f32 * z_separation;
            let mut row = SceneNode::group();
            for column in 0..COLUMNS {
                let x = x_start + column as f32 * x_separation;
                row = row.with_child(
                    SceneNode::mesh(Shape::Box { size: 0.1 }, Material::new(CUBE_COLOR))
                        .at(Vec3::new(x, REST_Y, z)),
                );
            }
            field = field.with_child(row);
        }

        self.heights = vec![0.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, field));
        tracing::debug!(rows = layout.slots(), columns = COLUMNS, "waves ready");
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("waves updated before init"))?;
        let params = self.base.params();
        let z_separation = params.value(Z_SEPARATION)?;
        let speed = params.value(SPEED)?;
        let y_pos = params.value(Y_POS)?;
        let camera_z = ctx
            .scene
            .get(ctx.scene.camera())
            .map_or(CAMERA_HOME.z, |camera| camera.position.z);

        let buffer = ctx.sampler.refresh(AnalysisDomain::Time)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.heights,
            MAX_HEIGHT,
        );

        let field = self.base.node_mut(ctx.scene, group)?;
        for (row, height) in field.children.iter_mut().zip(&self.heights) {
            for cube in &mut row.children {
                cube.position.y = REST_Y + height;
            }
        }
        roll_rows(
            &mut field.children,
            speed,
            camera_z + RECYCLE_DISTANCE,
            z_separation,
        );
        field.position.y = y_pos;

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{render::PassKind, visualizer::tests::Harness};

    fn row_at(z: f32) -> SceneNode {
        SceneNode::group().with_child(SceneNode::group().at(Vec3::new(0.0, 0.0, z)))
    }

    #[test]
    fn builds_a_grid_of_rows() {
        let mut harness = Harness::new(2048);
        let mut waves = Waves::new(&VisualizerOptions { slots: 10, seed: 0 }).unwrap();
        waves.init(&mut harness.ctx(0.0)).unwrap();

        let field = harness.scene.get(waves.group.unwrap()).unwrap();
        assert_eq!(field.children.len(), 10);
        assert!(field.children.iter().all(|row| row.children.len() == COLUMNS));
        assert_eq!(field.position.y, -2.0);
        assert_eq!(field.children[0].children[0].position.x, -45.0);
        assert_eq!(field.children[1].children[0].position.z, -6.0);
        waves.teardown(&mut harness.scene, &mut harness.backend);
    }

    #[test]
    fn rows_recycle_behind_their_predecessor() {
        let mut rows = vec![row_at(27.9), row_at(-6.0), row_at(-12.0)];
        roll_rows(&mut rows, 0.2, 28.0, -6.0);
        assert!((rows[0].children[0].position.z - (-12.0 - 6.0)).abs() < 1e-4);
        assert!((rows[1].children[0].position.z - (-5.8)).abs() < 1e-4);
        assert!((rows[2].children[0].position.z - (-11.8)).abs() < 1e-4);
    }

    #[test]
    fn afterimage_is_on_and_y_follows_parameter() {
        let mut harness = Harness::new(2048);
        let mut waves = Waves::new(&VisualizerOptions { slots: 4, seed: 0 }).unwrap();
        waves.init(&mut harness.ctx(0.0)).unwrap();

        waves.parameters_mut().set_value(Y_POS, 3.0).unwrap();
        waves.update(&mut harness.ctx(0.0)).unwrap();

        let field = harness.scene.get(waves.group.unwrap()).unwrap();
        assert_eq!(field.position.y, 3.0);
        assert!(harness.backend.pass_kinds().contains(&PassKind::Afterimage));
        assert!(!harness.backend.pass_kinds().contains(&PassKind::Bloom));
        waves.teardown(&mut harness.scene, &mut harness.backend);
    }
}
