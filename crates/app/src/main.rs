use std::{f32::consts::TAU, path::PathBuf};

use audio_visualizer_core::{
    AppConfig, Engine, HeadlessBackend, SharedSignal, TickOutcome, VisualizerOptions,
    VisualizerRegistry,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audio_visualizer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            visualizer,
            frames,
            tone,
            transform_size,
        } => run(config.as_ref(), visualizer, frames, tone, transform_size),
        Commands::List => {
            for key in VisualizerRegistry::builtin().keys() {
                println!("{key}");
            }
            Ok(())
        }
        Commands::Params { key } => print_params(&key),
    }
}

fn run(
    config_path: Option<&PathBuf>,
    visualizer: Option<String>,
    frames: u32,
    tone: f32,
    transform_size: Option<usize>,
) -> audio_visualizer_core::Result<()> {
    let mut config = match config_path {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };
    if let Some(name) = visualizer {
        config.visualizer.name = name;
    }
    if let Some(size) = transform_size {
        config.audio.transform_size = size.try_into()?;
    }
    tracing::info!(
        visualizer = %config.visualizer.name,
        frames,
        tone,
        transform_size = config.audio.transform_size.get(),
        "starting headless run"
    );

    let surface = config.render.surface_size()?;
    let mut engine = Engine::from_config(&config, HeadlessBackend::quiet(Some(surface)))?;

    let signal = SharedSignal::new(config.audio.sample_rate);
    engine.attach_source(Box::new(signal.clone()));
    signal.play()?;

    let frame_interval = config.render.frame_interval();
    let mut oscillator = Oscillator::new(tone, config.audio.sample_rate);
    let block = (config.audio.sample_rate as f32 * frame_interval).round() as usize;
    let (mut updated, mut skipped) = (0u32, 0u32);

    for _ in 0..frames {
        signal.push_samples(&oscillator.block(block))?;
        match engine.tick(frame_interval) {
            TickOutcome::Updated => updated += 1,
            TickOutcome::Skipped => skipped += 1,
            TickOutcome::Redrawn => {}
        }
    }

    signal.stop()?;
    engine.shutdown();
    tracing::info!(
        updated,
        skipped,
        presented = engine.backend().frames(),
        elapsed = engine.clock().elapsed(),
        "run finished"
    );
    Ok(())
}

fn print_params(key: &str) -> audio_visualizer_core::Result<()> {
    let visualizer = VisualizerRegistry::builtin().create(key, &VisualizerOptions::default())?;
    let schema = visualizer.parameter_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Continuous sine generator.
struct Oscillator {
    step: f32,
    phase: f32,
}

impl Oscillator {
    fn new(hz: f32, sample_rate: u32) -> Self {
        Self {
            step: TAU * hz / sample_rate.max(1) as f32,
            phase: 0.0,
        }
    }

    fn block(&mut self, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                let sample = self.phase.sin() * 0.8;
                self.phase = (self.phase + self.step) % TAU;
                sample
            })
            .collect()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualizer engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the engine headlessly against a synthetic tone.
    Run {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Visualizer key; overrides the configuration.
        #[arg(short, long)]
        visualizer: Option<String>,
        /// Number of frames to render.
        #[arg(short, long, default_value_t = 300)]
        frames: u32,
        /// Frequency of the synthetic tone in Hz.
        #[arg(long, default_value_t = 440.0)]
        tone: f32,
        /// Analysis window size; must be a power of two.
        #[arg(long)]
        transform_size: Option<usize>,
    },
    /// List the registered visualizers.
    List,
    /// Print the parameter schema of a visualizer as JSON.
    Params {
        /// Visualizer key.
        key: String,
    },
}
