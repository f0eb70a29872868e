//! Post-processing chain shared by every visualizer.
//!
//! The graphics layer itself sits behind [`RenderBackend`]; the chain decides
//! which passes run, in which order, and with which settings.

use serde::{Deserialize, Serialize};

use crate::{
    params::{
        ParameterSet, AFTERIMAGE_DAMP, AFTERIMAGE_PASS, ANTIALIAS, BLOOM_PASS, BLOOM_RADIUS,
        BLOOM_STRENGTH, BLOOM_THRESHOLD,
    },
    scene::Scene,
    Result, VisualizerError,
};

/// Pixel dimensions of a render surface. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn inverse_resolution(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

/// Backend handle for the off-screen targets owned by one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetsId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    SceneRender,
    Afterimage,
    Resolve,
    Bloom,
    Antialias,
}

/// Composited passes always run in this order. Afterimage trails are resolved
/// before bloom sees them, and antialiasing runs last on the final image.
pub const PASS_ORDER: [PassKind; 5] = [
    PassKind::SceneRender,
    PassKind::Afterimage,
    PassKind::Resolve,
    PassKind::Bloom,
    PassKind::Antialias,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomSettings {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AfterimageSettings {
    pub damping: f32,
}

/// Live state of one optional pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectPassState {
    Antialias { enabled: bool },
    Bloom { enabled: bool, settings: BloomSettings },
    Afterimage { enabled: bool, settings: AfterimageSettings },
}

/// Everything the chain reads from a [`ParameterSet`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSettings {
    pub antialias: bool,
    pub bloom_enabled: bool,
    pub bloom: BloomSettings,
    pub afterimage_enabled: bool,
    pub afterimage: AfterimageSettings,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            antialias: true,
            bloom_enabled: false,
            bloom: BloomSettings {
                strength: 0.8,
                radius: 1.0,
                threshold: 0.1,
            },
            afterimage_enabled: false,
            afterimage: AfterimageSettings { damping: 0.5 },
        }
    }
}

impl PassSettings {
    pub fn from_parameters(params: &ParameterSet) -> Result<Self> {
        Ok(Self {
            antialias: params.is_on(ANTIALIAS)?,
            bloom_enabled: params.is_on(BLOOM_PASS)?,
            bloom: BloomSettings {
                strength: params.value(BLOOM_STRENGTH)?,
                radius: params.value(BLOOM_RADIUS)?,
                threshold: params.value(BLOOM_THRESHOLD)?,
            },
            afterimage_enabled: params.is_on(AFTERIMAGE_PASS)?,
            afterimage: AfterimageSettings {
                damping: params.value(AFTERIMAGE_DAMP)?,
            },
        })
    }

    /// Afterimage and bloom need off-screen compositing; antialiasing alone
    /// does not justify it.
    pub fn needs_compositing(&self) -> bool {
        self.afterimage_enabled || self.bloom_enabled
    }

    pub fn states(&self) -> [EffectPassState; 3] {
        [
            EffectPassState::Antialias {
                enabled: self.antialias,
            },
            EffectPassState::Bloom {
                enabled: self.bloom_enabled,
                settings: self.bloom,
            },
            EffectPassState::Afterimage {
                enabled: self.afterimage_enabled,
                settings: self.afterimage,
            },
        ]
    }

    fn enabled(&self, kind: PassKind) -> bool {
        match kind {
            PassKind::SceneRender => true,
            PassKind::Afterimage | PassKind::Resolve => self.afterimage_enabled,
            PassKind::Bloom => self.bloom_enabled,
            PassKind::Antialias => self.antialias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassDescriptor {
    pub kind: PassKind,
    pub enabled: bool,
}

/// One unit of work handed to the backend, carrying the uniforms it needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassCommand {
    /// Renders the scene into the chain's targets, multisampled when
    /// antialiasing is on.
    SceneRender { multisample: bool },
    Afterimage { damping: f32 },
    Resolve,
    Bloom {
        strength: f32,
        radius: f32,
        threshold: f32,
        resolution: SurfaceSize,
    },
    Antialias { inverse_resolution: [f32; 2] },
}

impl PassCommand {
    pub fn kind(&self) -> PassKind {
        match self {
            Self::SceneRender { .. } => PassKind::SceneRender,
            Self::Afterimage { .. } => PassKind::Afterimage,
            Self::Resolve => PassKind::Resolve,
            Self::Bloom { .. } => PassKind::Bloom,
            Self::Antialias { .. } => PassKind::Antialias,
        }
    }
}

/// The graphics layer the chain drives.
pub trait RenderBackend {
    /// Current surface size, or `None` while no surface is attached.
    fn surface_size(&self) -> Option<SurfaceSize>;

    fn allocate_targets(&mut self, size: SurfaceSize) -> Result<TargetsId>;

    fn resize_targets(&mut self, targets: TargetsId, size: SurfaceSize) -> Result<()>;

    fn release_targets(&mut self, targets: TargetsId);

    /// Draws the scene straight to the surface with no post-processing.
    fn draw_scene(&mut self, scene: &Scene) -> Result<()>;

    fn run_pass(&mut self, targets: TargetsId, command: &PassCommand, scene: &Scene)
        -> Result<()>;

    /// Shows the composited result of the last passes.
    fn present(&mut self, targets: TargetsId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Direct,
    Composited { passes: usize },
}

/// Ordered, toggleable post-processing for one visualizer instance.
///
/// A chain built without a surface renders directly until the backend
/// reports one, then allocates its targets on the next frame. A released
/// chain never allocates again.
#[derive(Debug)]
pub struct EffectChain {
    targets: Option<TargetsId>,
    size: Option<SurfaceSize>,
    settings: PassSettings,
    released: bool,
}

impl EffectChain {
    pub fn new(backend: &mut dyn RenderBackend) -> Self {
        let Some(size) = backend.surface_size() else {
            tracing::warn!("no render surface yet; post-processing deferred");
            return Self::disabled();
        };

        let mut chain = Self::disabled();
        if let Err(err) = chain.allocate(backend, size) {
            tracing::warn!(%err, "could not allocate render targets; post-processing disabled");
        }
        chain
    }

    fn disabled() -> Self {
        Self {
            targets: None,
            size: None,
            settings: PassSettings::default(),
            released: false,
        }
    }

    fn allocate(&mut self, backend: &mut dyn RenderBackend, size: SurfaceSize) -> Result<()> {
        let targets = backend.allocate_targets(size)?;
        tracing::debug!(
            ?targets,
            width = size.width,
            height = size.height,
            "effect chain ready"
        );
        self.targets = Some(targets);
        self.size = Some(size);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.targets.is_some()
    }

    pub fn size(&self) -> Option<SurfaceSize> {
        self.size
    }

    pub fn settings(&self) -> &PassSettings {
        &self.settings
    }

    /// Pushes the current parameter values into the live pass state.
    pub fn apply_configuration(&mut self, params: &ParameterSet) -> Result<()> {
        self.settings = PassSettings::from_parameters(params)?;
        Ok(())
    }

    pub fn descriptors(&self) -> [PassDescriptor; 5] {
        PASS_ORDER.map(|kind| PassDescriptor {
            kind,
            enabled: self.settings.enabled(kind),
        })
    }

    /// Enabled passes in pipeline order.
    pub fn commands(&self) -> Vec<PassCommand> {
        let Some(size) = self.size else {
            return Vec::new();
        };
        let settings = &self.settings;

        self.descriptors()
            .into_iter()
            .filter(|descriptor| descriptor.enabled)
            .map(|descriptor| match descriptor.kind {
                PassKind::SceneRender => PassCommand::SceneRender {
                    multisample: settings.antialias,
                },
                PassKind::Afterimage => PassCommand::Afterimage {
                    damping: settings.afterimage.damping,
                },
                PassKind::Resolve => PassCommand::Resolve,
                PassKind::Bloom => PassCommand::Bloom {
                    strength: settings.bloom.strength,
                    radius: settings.bloom.radius,
                    threshold: settings.bloom.threshold,
                    resolution: size,
                },
                PassKind::Antialias => PassCommand::Antialias {
                    inverse_resolution: size.inverse_resolution(),
                },
            })
            .collect()
    }

    /// The one place targets change size.
    pub fn resize(&mut self, backend: &mut dyn RenderBackend, size: SurfaceSize) -> Result<()> {
        if let Some(targets) = self.targets {
            backend.resize_targets(targets, size)?;
            tracing::debug!(
                ?targets,
                width = size.width,
                height = size.height,
                "effect chain resized"
            );
        }
        self.size = Some(size);
        Ok(())
    }

    /// Draws one frame. Targets are allocated here when a surface has
    /// appeared since the chain was built.
    pub fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &Scene,
    ) -> Result<RenderOutcome> {
        if self.targets.is_none() && !self.released {
            if let Some(size) = backend.surface_size() {
                if let Err(err) = self.allocate(backend, size) {
                    tracing::warn!(%err, "could not allocate render targets; drawing directly");
                }
            }
        }

        let Some(targets) = self.targets else {
            backend.draw_scene(scene)?;
            return Ok(RenderOutcome::Direct);
        };

        if let Some(size) = backend.surface_size() {
            if self.size != Some(size) {
                self.resize(backend, size)?;
            }
        }

        if !self.settings.needs_compositing() {
            backend.draw_scene(scene)?;
            return Ok(RenderOutcome::Direct);
        }

        let commands = self.commands();
        for command in &commands {
            backend.run_pass(targets, command, scene)?;
        }
        backend.present(targets)?;
        Ok(RenderOutcome::Composited {
            passes: commands.len(),
        })
    }

    /// Hands the off-screen targets back to the backend. The chain is
    /// disabled afterwards.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        self.released = true;
        if let Some(targets) = self.targets.take() {
            backend.release_targets(targets);
            tracing::debug!(?targets, "effect chain released");
        }
    }
}

impl Drop for EffectChain {
    fn drop(&mut self) {
        if let Some(targets) = self.targets {
            tracing::warn!(?targets, "effect chain dropped without releasing its targets");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Allocate { targets: TargetsId, size: SurfaceSize },
    Resize { targets: TargetsId, size: SurfaceSize },
    Release { targets: TargetsId },
    DrawScene { nodes: usize },
    Pass { targets: TargetsId, command: PassCommand },
    Present { targets: TargetsId },
}

/// Backend without a GPU. Tracks target lifetimes and, when recording,
/// every call it receives.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: Option<SurfaceSize>,
    next_targets: u64,
    live: Vec<(TargetsId, SurfaceSize)>,
    record: bool,
    calls: Vec<BackendCall>,
    frames: u64,
}

impl HeadlessBackend {
    /// A backend that records every call.
    pub fn new(size: Option<SurfaceSize>) -> Self {
        Self {
            size,
            record: true,
            ..Default::default()
        }
    }

    /// A backend that only counts frames.
    pub fn quiet(size: Option<SurfaceSize>) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn set_surface_size(&mut self, size: Option<SurfaceSize>) {
        self.size = size;
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn pass_kinds(&self) -> Vec<PassKind> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Pass { command, .. } => Some(command.kind()),
                _ => None,
            })
            .collect()
    }

    pub fn live_targets(&self) -> usize {
        self.live.len()
    }

    pub fn target_size(&self, targets: TargetsId) -> Option<SurfaceSize> {
        self.live
            .iter()
            .find(|(id, _)| *id == targets)
            .map(|(_, size)| *size)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn log(&mut self, call: BackendCall) {
        tracing::trace!(?call, "backend call");
        if self.record {
            self.calls.push(call);
        }
    }

    fn live_mut(&mut self, targets: TargetsId) -> Result<&mut SurfaceSize> {
        self.live
            .iter_mut()
            .find(|(id, _)| *id == targets)
            .map(|(_, size)| size)
            .ok_or_else(|| VisualizerError::Backend(format!("unknown targets {targets:?}")))
    }
}

impl RenderBackend for HeadlessBackend {
    fn surface_size(&self) -> Option<SurfaceSize> {
        self.size
    }

    fn allocate_targets(&mut self, size: SurfaceSize) -> Result<TargetsId> {
        let targets = TargetsId(self.next_targets);
        self.next_targets += 1;
        self.live.push((targets, size));
        self.log(BackendCall::Allocate { targets, size });
        Ok(targets)
    }

    fn resize_targets(&mut self, targets: TargetsId, size: SurfaceSize) -> Result<()> {
        *self.live_mut(targets)? = size;
        self.log(BackendCall::Resize { targets, size });
        Ok(())
    }

    fn release_targets(&mut self, targets: TargetsId) {
        self.live.retain(|(id, _)| *id != targets);
        self.log(BackendCall::Release { targets });
    }

    fn draw_scene(&mut self, scene: &Scene) -> Result<()> {
        self.frames += 1;
        self.log(BackendCall::DrawScene { nodes: scene.len() });
        Ok(())
    }

    fn run_pass(
        &mut self,
        targets: TargetsId,
        command: &PassCommand,
        _scene: &Scene,
    ) -> Result<()> {
        let size = *self.live_mut(targets)?;
        if let PassCommand::Bloom { resolution, .. } = command {
            if *resolution != size {
                return Err(VisualizerError::Backend(format!(
                    "bloom sized {resolution:?} against targets {size:?}"
                )));
            }
        }
        self.log(BackendCall::Pass {
            targets,
            command: *command,
        });
        Ok(())
    }

    fn present(&mut self, targets: TargetsId) -> Result<()> {
        self.live_mut(targets)?;
        self.frames += 1;
        self.log(BackendCall::Present { targets });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(width: u32, height: u32) -> Option<SurfaceSize> {
        SurfaceSize::new(width, height)
    }

    fn chain_with(params: &ParameterSet, backend: &mut HeadlessBackend) -> EffectChain {
        let mut chain = EffectChain::new(backend);
        chain.apply_configuration(params).unwrap();
        chain
    }

    #[test]
    fn missing_surface_leaves_chain_disabled() {
        let mut backend = HeadlessBackend::new(None);
        let mut chain = EffectChain::new(&mut backend);
        assert!(!chain.is_enabled());

        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();
        chain.apply_configuration(&params).unwrap();

        let outcome = chain.render(&mut backend, &Scene::new()).unwrap();
        assert_eq!(outcome, RenderOutcome::Direct);
        assert!(backend.pass_kinds().is_empty());
        assert_eq!(backend.live_targets(), 0);
    }

    #[test]
    fn surface_attached_later_enables_compositing() {
        let mut backend = HeadlessBackend::new(None);
        let mut chain = EffectChain::new(&mut backend);
        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();
        chain.apply_configuration(&params).unwrap();

        let size = surface(640, 480).unwrap();
        backend.set_surface_size(Some(size));
        let outcome = chain.render(&mut backend, &Scene::new()).unwrap();

        assert!(chain.is_enabled());
        assert_eq!(chain.size(), Some(size));
        assert!(matches!(outcome, RenderOutcome::Composited { .. }));
        assert!(backend.pass_kinds().contains(&PassKind::Bloom));
        assert_eq!(backend.live_targets(), 1);
        chain.release(&mut backend);
        assert_eq!(backend.live_targets(), 0);
    }

    #[test]
    fn released_chain_does_not_allocate_again() {
        let mut backend = HeadlessBackend::new(surface(64, 64));
        let mut chain = EffectChain::new(&mut backend);
        chain.release(&mut backend);

        let outcome = chain.render(&mut backend, &Scene::new()).unwrap();
        assert_eq!(outcome, RenderOutcome::Direct);
        assert_eq!(backend.live_targets(), 0);
    }

    #[test]
    fn optional_passes_off_takes_direct_path() {
        let mut backend = HeadlessBackend::new(surface(640, 480));
        let mut chain = chain_with(&ParameterSet::baseline(), &mut backend);

        let outcome = chain.render(&mut backend, &Scene::new()).unwrap();
        assert_eq!(outcome, RenderOutcome::Direct);
        assert!(backend.pass_kinds().is_empty());
        assert!(matches!(backend.calls().last(), Some(BackendCall::DrawScene { nodes: 2 })));
        chain.release(&mut backend);
    }

    #[test]
    fn afterimage_without_bloom_skips_bloom_uniforms() {
        let mut params = ParameterSet::baseline();
        params.set_toggle(AFTERIMAGE_PASS, true).unwrap();
        params.set_value(AFTERIMAGE_DAMP, 0.5).unwrap();

        let mut backend = HeadlessBackend::new(surface(640, 480));
        let mut chain = chain_with(&params, &mut backend);
        let outcome = chain.render(&mut backend, &Scene::new()).unwrap();

        assert_eq!(outcome, RenderOutcome::Composited { passes: 4 });
        assert_eq!(
            backend.pass_kinds(),
            vec![
                PassKind::SceneRender,
                PassKind::Afterimage,
                PassKind::Resolve,
                PassKind::Antialias
            ]
        );
        assert!(backend.calls().iter().any(|call| matches!(
            call,
            BackendCall::Pass {
                command: PassCommand::Afterimage { damping },
                ..
            } if *damping == 0.5
        )));
        assert!(matches!(backend.calls().last(), Some(BackendCall::Present { .. })));
        chain.release(&mut backend);
    }

    #[test]
    fn passes_follow_fixed_order() {
        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();
        params.set_toggle(AFTERIMAGE_PASS, true).unwrap();

        let mut backend = HeadlessBackend::new(surface(800, 600));
        let mut chain = chain_with(&params, &mut backend);
        chain.render(&mut backend, &Scene::new()).unwrap();
        assert_eq!(backend.pass_kinds(), PASS_ORDER.to_vec());

        params.set_toggle(ANTIALIAS, false).unwrap();
        chain.apply_configuration(&params).unwrap();
        assert_eq!(
            chain.commands()[0],
            PassCommand::SceneRender { multisample: false }
        );
        assert!(!chain.commands().iter().any(|c| c.kind() == PassKind::Antialias));
        chain.release(&mut backend);
    }

    #[test]
    fn applying_configuration_is_idempotent() {
        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();
        params.set_value(BLOOM_STRENGTH, 1.5).unwrap();

        let mut backend = HeadlessBackend::new(surface(320, 240));
        let mut chain = chain_with(&params, &mut backend);
        let first = (*chain.settings(), chain.commands());
        chain.apply_configuration(&params).unwrap();
        assert_eq!((*chain.settings(), chain.commands()), first);
        chain.release(&mut backend);
    }

    #[test]
    fn toggling_off_and_on_restores_settings() {
        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();
        params.set_value(BLOOM_RADIUS, 0.3).unwrap();

        let mut backend = HeadlessBackend::new(surface(320, 240));
        let mut chain = chain_with(&params, &mut backend);
        let before = chain.settings().states();

        params.set_toggle(BLOOM_PASS, false).unwrap();
        chain.apply_configuration(&params).unwrap();
        assert!(!chain.settings().bloom_enabled);

        params.set_toggle(BLOOM_PASS, true).unwrap();
        chain.apply_configuration(&params).unwrap();
        assert_eq!(chain.settings().states(), before);
        chain.release(&mut backend);
    }

    #[test]
    fn surface_resize_is_applied_before_rendering() {
        let mut params = ParameterSet::baseline();
        params.set_toggle(BLOOM_PASS, true).unwrap();

        let mut backend = HeadlessBackend::new(surface(640, 480));
        let mut chain = chain_with(&params, &mut backend);
        backend.set_surface_size(surface(1920, 1080));

        chain.render(&mut backend, &Scene::new()).unwrap();
        let resized = surface(1920, 1080).unwrap();
        assert_eq!(chain.size(), Some(resized));
        assert_eq!(backend.target_size(TargetsId(0)), Some(resized));
        assert!(backend.calls().iter().any(|call| matches!(
            call,
            BackendCall::Pass {
                command: PassCommand::Bloom { resolution, .. },
                ..
            } if *resolution == resized
        )));
        chain.release(&mut backend);
    }

    #[test]
    fn release_returns_targets() {
        let mut backend = HeadlessBackend::new(surface(64, 64));
        let mut chain = EffectChain::new(&mut backend);
        assert_eq!(backend.live_targets(), 1);

        chain.release(&mut backend);
        assert_eq!(backend.live_targets(), 0);
        assert!(!chain.is_enabled());
        chain.release(&mut backend);
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|call| matches!(call, BackendCall::Release { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn rejects_parameter_sets_without_baseline() {
        let mut backend = HeadlessBackend::new(surface(64, 64));
        let mut chain = EffectChain::new(&mut backend);
        assert!(chain.apply_configuration(&ParameterSet::new()).is_err());
        chain.release(&mut backend);
    }
}
