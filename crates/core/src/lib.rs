//! Core library for the audio visualizer.
//!
//! Each module owns one subsystem: signal capture and analysis, temporal
//! interpolation, the post-processing chain, the shared scene and the
//! visualizers that animate it. [`Engine`] ties them together and drives one
//! frame per tick.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod params;
pub mod render;
pub mod scene;
pub mod timeline;
pub mod visualizer;

pub use analysis::{SpectrumAnalyser, SpectrumSettings};
pub use audio::{AnalysisDomain, AudioSampler, SharedSignal, SignalSource, TransformSize};
pub use config::{AppConfig, AudioConfig, RenderConfig, VisualizerConfig};
pub use engine::{Engine, TickOutcome};
pub use error::{Result, VisualizerError};
pub use interpolate::{InterpolationState, SlotLayout, Step, TemporalInterpolator};
pub use params::{ConfigurableParameter, ParameterSchema, ParameterSet, ParameterValue};
pub use render::{EffectChain, HeadlessBackend, PassKind, RenderBackend, RenderOutcome, SurfaceSize};
pub use scene::{Axis, Color, OwnedNodes, Scene, SceneNode, Shader, Texture};
pub use timeline::PlaybackClock;
pub use visualizer::{FrameContext, Visualizer, VisualizerOptions, VisualizerRegistry};
