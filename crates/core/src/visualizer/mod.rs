//! Visualizer contract and the built-in effects.
//!
//! Every effect implements [`Visualizer`] and keeps its shared state in a
//! [`VisualizerBase`]: the parameter set, its effect chain, the nodes it owns
//! in the shared scene and the interpolation memory for the current
//! activation.

mod blob;
mod circular_cubes;
mod image;
mod lights;
mod orbits;
mod pixels;
mod ripples;
mod spheres;
mod spherical_cubes;
mod starfield;
mod waveform;
mod waves;

pub use blob::Blob;
pub use circular_cubes::CircularCubes;
pub use image::Image;
pub use lights::Lights;
pub use orbits::{Ellipse, Orbits};
pub use pixels::Pixels;
pub use ripples::Ripples;
pub use spheres::Spheres;
pub use spherical_cubes::SphericalCubes;
pub use starfield::Starfield;
pub use waveform::Waveform;
pub use waves::Waves;

use std::fmt;

use crate::{
    audio::{AudioSampler, TransformSize},
    interpolate::{InterpolationState, SlotLayout, Step, TemporalInterpolator},
    params::{ParameterSchema, ParameterSet},
    render::{EffectChain, RenderBackend, RenderOutcome},
    scene::{NodeId, OwnedNodes, Scene, SceneNode},
    Result, VisualizerError,
};

/// Shared collaborators handed to a visualizer for one call.
pub struct FrameContext<'a> {
    pub scene: &'a mut Scene,
    pub sampler: &'a mut AudioSampler,
    pub backend: &'a mut dyn RenderBackend,
    /// Simulated seconds since playback started.
    pub now: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Active,
    /// Terminal. A discarded instance is never activated again.
    Discarded,
}

/// State every visualizer carries.
#[derive(Debug)]
pub struct VisualizerBase {
    name: &'static str,
    params: ParameterSet,
    chain: Option<EffectChain>,
    owned: OwnedNodes,
    interpolation: InterpolationState,
    lifecycle: Lifecycle,
}

impl VisualizerBase {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: ParameterSet::baseline(),
            chain: None,
            owned: OwnedNodes::new(),
            interpolation: InterpolationState::new(),
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn owned(&self) -> &OwnedNodes {
        &self.owned
    }

    pub fn chain(&self) -> Option<&EffectChain> {
        self.chain.as_ref()
    }

    pub fn interpolation(&self) -> &InterpolationState {
        &self.interpolation
    }

    /// Clears leftover scene content and builds this activation's effect
    /// chain and interpolation state. Returns how many stale nodes were
    /// removed.
    pub fn activate(&mut self, scene: &mut Scene, backend: &mut dyn RenderBackend) -> usize {
        debug_assert_eq!(
            self.lifecycle,
            Lifecycle::Uninitialized,
            "{} activated twice",
            self.name
        );

        let removed = scene.clear_content();
        if removed > 0 {
            tracing::debug!(visualizer = self.name, removed, "cleared residual scene content");
        }
        self.chain = Some(EffectChain::new(backend));
        self.interpolation = InterpolationState::new();
        self.lifecycle = Lifecycle::Active;
        removed
    }

    /// Adds a top-level node owned by this visualizer.
    pub fn attach(&mut self, scene: &mut Scene, node: SceneNode) -> NodeId {
        self.owned.attach(scene, node)
    }

    /// Samples one level per entry of `levels` from `buffer` and advances
    /// them through `interpolator`. Bytes are scaled from `0..=255` onto
    /// `0..=gain`.
    pub fn animate_levels(
        &mut self,
        interpolator: &TemporalInterpolator,
        now: f32,
        buffer: &[u8],
        levels: &mut [f32],
        gain: f32,
    ) -> Step {
        let layout = SlotLayout::new(buffer.len(), levels.len());
        interpolator.step(&mut self.interpolation, now, levels, |slot| {
            layout
                .read(buffer, slot)
                .map_or(0.0, |byte| byte as f32 / 255.0 * gain)
        })
    }

    /// Pushes the current parameters into the chain and renders the frame.
    pub fn post_process(
        &mut self,
        scene: &Scene,
        backend: &mut dyn RenderBackend,
    ) -> Result<RenderOutcome> {
        debug_assert_eq!(
            self.lifecycle,
            Lifecycle::Active,
            "{} rendered while not active",
            self.name
        );

        let Some(chain) = self.chain.as_mut() else {
            backend.draw_scene(scene)?;
            return Ok(RenderOutcome::Direct);
        };
        chain.apply_configuration(&self.params)?;
        chain.render(backend, scene)
    }

    /// Removes owned nodes and releases the effect chain. Returns how many
    /// nodes were removed.
    pub fn teardown(&mut self, scene: &mut Scene, backend: &mut dyn RenderBackend) -> usize {
        let removed = self.owned.release(scene);
        if let Some(mut chain) = self.chain.take() {
            chain.release(backend);
        }
        self.interpolation.clear();
        self.lifecycle = Lifecycle::Discarded;
        tracing::debug!(visualizer = self.name, removed, "visualizer discarded");
        removed
    }

    /// Looks up an owned top-level node for mutation.
    pub fn node_mut<'s>(&self, scene: &'s mut Scene, id: NodeId) -> Result<&'s mut SceneNode> {
        if !self.owned.contains(id) {
            return Err(VisualizerError::msg(format!(
                "{} does not own node {id:?}",
                self.name
            )));
        }
        scene
            .get_mut(id)
            .ok_or_else(|| VisualizerError::msg(format!("{} lost node {id:?}", self.name)))
    }
}

/// One audio-reactive effect.
///
/// Callers drive `init` once, then `update` once per tick while playback
/// runs, then `teardown` when switching away.
pub trait Visualizer {
    fn base(&self) -> &VisualizerBase;

    fn base_mut(&mut self) -> &mut VisualizerBase;

    /// Builds this effect's scene content. Must start from a scene holding
    /// nothing but the camera and light.
    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<()>;

    /// Reads audio, steps interpolation, mutates the scene and renders.
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<()>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn parameters(&self) -> &ParameterSet {
        self.base().params()
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        self.base_mut().params_mut()
    }

    fn parameter_schema(&self) -> ParameterSchema {
        self.parameters().schema()
    }

    /// Analysis resolution this effect insists on, if any.
    fn required_transform_size(&self) -> Option<TransformSize> {
        None
    }

    fn teardown(&mut self, scene: &mut Scene, backend: &mut dyn RenderBackend) -> usize {
        self.base_mut().teardown(scene, backend)
    }
}

/// Construction options shared by every registered effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizerOptions {
    /// Requested number of animated slots.
    pub slots: usize,
    /// Seed for effects that scatter or drift their objects randomly.
    pub seed: u64,
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self { slots: 50, seed: 0x5eed }
    }
}

pub type Constructor = fn(&VisualizerOptions) -> Result<Box<dyn Visualizer>>;

fn boxed<V: Visualizer + 'static>(visualizer: V) -> Box<dyn Visualizer> {
    Box::new(visualizer)
}

/// Maps selection keys onto effect constructors.
#[derive(Clone, Default)]
pub struct VisualizerRegistry {
    entries: Vec<(&'static str, Constructor)>,
}

impl fmt::Debug for VisualizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

impl VisualizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in effect.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Waveform::KEY, |options| Waveform::new(options).map(boxed));
        registry.register(CircularCubes::KEY, |options| {
            CircularCubes::new(options).map(boxed)
        });
        registry.register(Spheres::KEY, |options| Spheres::new(options).map(boxed));
        registry.register(Lights::KEY, |options| Lights::new(options).map(boxed));
        registry.register(Waves::KEY, |options| Waves::new(options).map(boxed));
        registry.register(Pixels::KEY, |options| Ok(boxed(Pixels::new(options))));
        registry.register(Orbits::KEY, |options| Orbits::new(options).map(boxed));
        registry.register(Blob::KEY, |options| Ok(boxed(Blob::new(options))));
        registry.register(Ripples::KEY, |options| Ripples::new(options).map(boxed));
        registry.register(SphericalCubes::KEY, |options| {
            SphericalCubes::new(options).map(boxed)
        });
        registry.register(Starfield::KEY, |options| Starfield::new(options).map(boxed));
        registry.register(Image::KEY, |options| Image::new(options).map(boxed));
        registry
    }

    /// Registers `constructor` under `key`, replacing any earlier entry.
    pub fn register(&mut self, key: &'static str, constructor: Constructor) {
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some(entry) => entry.1 = constructor,
            None => self.entries.push((key, constructor)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(name, _)| *name == key)
    }

    pub fn create(&self, key: &str, options: &VisualizerOptions) -> Result<Box<dyn Visualizer>> {
        let (_, constructor) = self
            .entries
            .iter()
            .find(|(name, _)| *name == key)
            .ok_or_else(|| VisualizerError::UnknownVisualizer(key.to_string()))?;
        constructor(options)
    }
}
