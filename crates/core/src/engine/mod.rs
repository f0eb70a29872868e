//! Frame loop driver.
//!
//! The engine owns every shared resource and guarantees a single active
//! visualizer: switching tears the old one down before the new one builds
//! its scene content.

use std::collections::BTreeMap;

use crate::{
    audio::{AudioSampler, SignalSource, TransformSize},
    config::AppConfig,
    params::ParameterValue,
    render::RenderBackend,
    scene::Scene,
    timeline::PlaybackClock,
    visualizer::{FrameContext, Visualizer, VisualizerOptions, VisualizerRegistry},
    Result, VisualizerError,
};

/// What one call to [`Engine::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The active visualizer ran its update.
    Updated,
    /// Nothing playing or nothing active; the scene was redrawn as is.
    Redrawn,
    /// The tick failed and was dropped. The loop carries on.
    Skipped,
}

pub struct Engine<B: RenderBackend> {
    scene: Scene,
    backend: B,
    sampler: AudioSampler,
    clock: PlaybackClock,
    registry: VisualizerRegistry,
    options: VisualizerOptions,
    active: Option<Box<dyn Visualizer>>,
}

impl<B: RenderBackend> Engine<B> {
    pub fn new(config: &AppConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let mut scene = Scene::new();
        scene.set_background(&config.render.background)?;

        Ok(Self {
            scene,
            backend,
            sampler: AudioSampler::new(config.audio.transform_size, config.audio.spectrum()),
            clock: PlaybackClock::new(),
            registry: VisualizerRegistry::builtin(),
            options: VisualizerOptions {
                slots: config.visualizer.slots,
                ..VisualizerOptions::default()
            },
            active: None,
        })
    }

    /// Builds the engine and activates the configured visualizer with its
    /// parameter overrides.
    pub fn from_config(config: &AppConfig, backend: B) -> Result<Self> {
        let mut engine = Self::new(config, backend)?;
        engine.switch_to_with(&config.visualizer.name, &config.visualizer.overrides)?;
        Ok(engine)
    }

    pub fn with_registry(mut self, registry: VisualizerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn attach_source(&mut self, source: Box<dyn SignalSource>) {
        self.sampler.attach_source(source);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sampler(&self) -> &AudioSampler {
        &self.sampler
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn registry(&self) -> &VisualizerRegistry {
        &self.registry
    }

    pub fn active(&self) -> Option<&dyn Visualizer> {
        self.active.as_deref()
    }

    /// Mutable access for parameter writes. Changes are picked up on the
    /// next tick.
    pub fn active_mut(&mut self) -> Option<&mut (dyn Visualizer + 'static)> {
        self.active.as_deref_mut()
    }

    pub fn switch_to(&mut self, key: &str) -> Result<()> {
        self.switch_to_with(key, &BTreeMap::new())
    }

    /// Replaces the active visualizer with a fresh instance of `key`.
    ///
    /// The new instance is built and configured first, so an unknown key or
    /// a rejected override leaves the current visualizer running.
    pub fn switch_to_with(
        &mut self,
        key: &str,
        overrides: &BTreeMap<String, ParameterValue>,
    ) -> Result<()> {
        let mut next = self.registry.create(key, &self.options)?;
        for (name, value) in overrides {
            next.parameters_mut().apply(name, *value)?;
        }

        if let Some(mut previous) = self.active.take() {
            let removed = previous.teardown(&mut self.scene, &mut self.backend);
            tracing::debug!(from = previous.name(), removed, "switching visualizer");
        }

        self.scene.reset_camera();
        if let Some(size) = next.required_transform_size() {
            if size != self.sampler.transform_size() {
                tracing::info!(
                    visualizer = key,
                    transform_size = size.get(),
                    "forcing transform size"
                );
                self.sampler.change_transform_size(size.get())?;
            }
        }

        let mut ctx = FrameContext {
            scene: &mut self.scene,
            sampler: &mut self.sampler,
            backend: &mut self.backend,
            now: self.clock.elapsed(),
        };
        if let Err(err) = next.init(&mut ctx) {
            next.teardown(&mut self.scene, &mut self.backend);
            return Err(err);
        }

        tracing::info!(visualizer = key, "visualizer active");
        self.active = Some(next);
        Ok(())
    }

    /// Changes the analysis resolution. Refused while the active visualizer
    /// requires a different size.
    pub fn change_transform_size(&mut self, size: usize) -> Result<()> {
        let requested = TransformSize::new(size)?;
        if let Some(active) = self.active.as_deref() {
            if let Some(required) = active.required_transform_size() {
                if required != requested {
                    return Err(VisualizerError::InvalidConfig(format!(
                        "{} only runs at transform size {required}",
                        active.name()
                    )));
                }
            }
        }
        self.sampler.change_transform_size(size)
    }

    /// Advances the clock by `delta` seconds and produces one frame.
    pub fn tick(&mut self, delta: f32) -> TickOutcome {
        let now = self.clock.advance(delta);
        let playing = self.sampler.is_playing();

        match self.active.as_mut() {
            Some(visualizer) if playing => {
                let mut ctx = FrameContext {
                    scene: &mut self.scene,
                    sampler: &mut self.sampler,
                    backend: &mut self.backend,
                    now,
                };
                match visualizer.update(&mut ctx) {
                    Ok(()) => {
                        tracing::trace!(now, "tick");
                        TickOutcome::Updated
                    }
                    Err(err) => {
                        tracing::warn!(%err, visualizer = visualizer.name(), "tick failed");
                        TickOutcome::Skipped
                    }
                }
            }
            _ => match self.backend.draw_scene(&self.scene) {
                Ok(()) => TickOutcome::Redrawn,
                Err(err) => {
                    tracing::warn!(%err, "redraw failed");
                    TickOutcome::Skipped
                }
            },
        }
    }

    /// Tears down the active visualizer and returns its GPU resources.
    pub fn shutdown(&mut self) {
        if let Some(mut visualizer) = self.active.take() {
            visualizer.teardown(&mut self.scene, &mut self.backend);
        }
    }
}

impl<B: RenderBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
