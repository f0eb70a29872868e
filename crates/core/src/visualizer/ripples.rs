use glam::Vec3;
use rand::prelude::*;

use super::{FrameContext, Visualizer, VisualizerBase, VisualizerOptions};
use crate::{
    audio::AnalysisDomain,
    interpolate::{SlotLayout, TemporalInterpolator},
    params::ConfigurableParameter,
    scene::{Axis, Color, Material, NodeId, SceneNode, Shader, Shape},
    Result, VisualizerError,
};

/// Fade each ripple with its size rather than drawing it fully opaque.
pub const TOGGLE_MATERIAL_OPACITY: &str = "toggleMaterialOpacity";
/// Draw ripples as rims instead of solid discs.
pub const RIPPLE_SHADER_MATERIAL_ON: &str = "rippleShaderMaterialOn";

const SAMPLING_INTERVAL: f32 = 0.02;
const MAX_LEVEL: f32 = 12.0;
const SCALE_PER_LEVEL: f32 = 1.5;
const OPACITY_DIVISOR: f32 = 10.0;
const LIGHT_DEPTH: f32 = 50.0;
const RIPPLE_COLOR: Color = Color::rgb(
    0x2f as f32 / 255.0,
    0x88 as f32 / 255.0,
    0xf5 as f32 / 255.0,
);

/// Discs scattered over a far wall that swell with bin energy.
#[derive(Debug)]
pub struct Ripples {
    base: VisualizerBase,
    slots: usize,
    rng: StdRng,
    interpolator: TemporalInterpolator,
    group: Option<NodeId>,
    levels: Vec<f32>,
}

impl Ripples {
    pub const KEY: &'static str = "ripples";

    pub fn new(options: &VisualizerOptions) -> Result<Self> {
        let mut base = VisualizerBase::new(Self::KEY);
        let params = base.params_mut();
        params.insert(TOGGLE_MATERIAL_OPACITY, ConfigurableParameter::toggle(true))?;
        params.insert(RIPPLE_SHADER_MATERIAL_ON, ConfigurableParameter::toggle(true))?;

        Ok(Self {
            base,
            slots: options.slots,
            rng: StdRng::seed_from_u64(options.seed),
            interpolator: TemporalInterpolator::new(SAMPLING_INTERVAL)?,
            group: None,
            levels: Vec::new(),
        })
    }

    fn random_position(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-100..100) as f32,
            self.rng.gen_range(-50..50) as f32,
            -100.0,
        )
    }
}

/// Opacity of a ripple drawn at `scale`.
fn ripple_opacity(scale: Vec3, fade: bool) -> f32 {
    if fade {
        (scale.length() / OPACITY_DIVISOR).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

impl Visualizer for Ripples {
    fn base(&self) -> &VisualizerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut VisualizerBase {
        &mut self.base
    }

    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.base.activate(ctx.scene, ctx.backend);
        ctx.scene.set_light_axis(Axis::Z, LIGHT_DEPTH);

        let layout = SlotLayout::new(ctx.sampler.bin_count(), self.slots);
        let mut wall = SceneNode::group().at(Vec3::new(0.0, 2.5, -25.0));
        for _ in 0..layout.slots() {
            let position = self.random_position();
            wall = wall.with_child(
                SceneNode::mesh(
                    Shape::Circle { radius: 5.0 },
                    Material::new(RIPPLE_COLOR).transparent(),
                )
                .at(position),
            );
        }

        self.levels = vec![0.0; layout.slots()];
        self.group = Some(self.base.attach(ctx.scene, wall));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let group = self
            .group
            .ok_or_else(|| VisualizerError::msg("ripples updated before init"))?;
        let fade = self.base.params().is_on(TOGGLE_MATERIAL_OPACITY)?;
        let shader = self
            .base
            .params()
            .is_on(RIPPLE_SHADER_MATERIAL_ON)?
            .then_some(Shader::Ring);

        let buffer = ctx.sampler.refresh(AnalysisDomain::Frequency)?;
        self.base.animate_levels(
            &self.interpolator,
            ctx.now,
            buffer,
            &mut self.levels,
            MAX_LEVEL,
        );

        let wall = self.base.node_mut(ctx.scene, group)?;
        for (ripple, level) in wall.children.iter_mut().zip(&self.levels) {
            ripple.scale = Vec3::ONE.normalize() * (level * SCALE_PER_LEVEL);
            if let Some(material) = ripple.material.as_mut() {
                material.shader = shader;
                material.opacity = ripple_opacity(ripple.scale, fade);
            }
        }

        self.base.post_process(ctx.scene, ctx.backend)?;
        Ok(())
    }
}
