use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{time_domain_byte, SpectrumAnalyser, SpectrumSettings, TIME_DOMAIN_SILENCE},
    Result, VisualizerError,
};

pub const MIN_TRANSFORM_SIZE: usize = 32;
pub const MAX_TRANSFORM_SIZE: usize = 32_768;

/// Analysis window length. Always a power of two between
/// [`MIN_TRANSFORM_SIZE`] and [`MAX_TRANSFORM_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct TransformSize(usize);

impl TransformSize {
    pub const DEFAULT: Self = Self(2048);

    pub fn new(size: usize) -> Result<Self> {
        if size.is_power_of_two() && (MIN_TRANSFORM_SIZE..=MAX_TRANSFORM_SIZE).contains(&size) {
            Ok(Self(size))
        } else {
            Err(VisualizerError::UnsupportedTransformSize(size))
        }
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Number of frequency bins, and the length of every captured buffer.
    pub fn bin_count(self) -> usize {
        self.0 / 2
    }
}

impl Default for TransformSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for TransformSize {
    type Error = VisualizerError;

    fn try_from(value: usize) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TransformSize> for usize {
    fn from(value: TransformSize) -> Self {
        value.0
    }
}

impl fmt::Display for TransformSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which view of the signal a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisDomain {
    /// Energy per frequency bin, 0–255.
    Frequency,
    /// Waveform amplitude, 0–255 centred at 128.
    Time,
}

impl AnalysisDomain {
    /// Byte value a silent signal produces in this domain.
    pub fn neutral(self) -> u8 {
        match self {
            Self::Frequency => 0,
            Self::Time => TIME_DOMAIN_SILENCE,
        }
    }
}

/// Supplies the live signal the sampler analyses. Decoding and transport
/// belong to the implementor; the sampler only reads.
pub trait SignalSource {
    fn is_playing(&self) -> bool;

    fn sample_rate(&self) -> u32;

    /// Seconds of audio played since the last `play`.
    fn elapsed_seconds(&self) -> f32;

    /// Copies the most recent `out.len()` samples into `out`, oldest first.
    /// Slots without history are zero.
    fn copy_latest(&self, out: &mut [f32]);
}

#[derive(Debug)]
struct SignalState {
    sample_rate: u32,
    playing: bool,
    played_samples: u64,
    history: VecDeque<f32>,
}

/// Thread-safe sample feed. A capture or decode thread pushes blocks, the
/// render thread reads the most recent window through [`SignalSource`].
#[derive(Clone)]
pub struct SharedSignal {
    shared: Arc<Mutex<SignalState>>,
}

impl SharedSignal {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SignalState {
                sample_rate,
                playing: false,
                played_samples: 0,
                history: VecDeque::with_capacity(MAX_TRANSFORM_SIZE),
            })),
        }
    }

    pub fn play(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.playing {
            state.playing = true;
            state.played_samples = 0;
        }
        Ok(())
    }

    /// Stops playback and forgets buffered history, so the next snapshot
    /// reads as silence.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.playing = false;
        state.history.clear();
        Ok(())
    }

    /// Appends a block of samples in `[-1, 1]`, keeping at most
    /// [`MAX_TRANSFORM_SIZE`] of history.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut state = self.lock()?;
        if state.playing {
            state.played_samples += samples.len() as u64;
        }

        let keep = samples.len().min(MAX_TRANSFORM_SIZE);
        let overflow = (state.history.len() + keep).saturating_sub(MAX_TRANSFORM_SIZE);
        state.history.drain(..overflow);
        state
            .history
            .extend(samples[samples.len() - keep..].iter().copied());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SignalState>> {
        self.shared
            .lock()
            .map_err(|_| VisualizerError::msg("signal buffer has been poisoned"))
    }

    fn read<T>(&self, neutral: T, f: impl FnOnce(&SignalState) -> T) -> T {
        match self.lock() {
            Ok(state) => f(&*state),
            Err(err) => {
                tracing::warn!(%err, "reading signal as silence");
                neutral
            }
        }
    }
}

impl SignalSource for SharedSignal {
    fn is_playing(&self) -> bool {
        self.read(false, |state| state.playing)
    }

    fn sample_rate(&self) -> u32 {
        self.read(0, |state| state.sample_rate)
    }

    fn elapsed_seconds(&self) -> f32 {
        self.read(0.0, |state| {
            state.played_samples as f32 / state.sample_rate.max(1) as f32
        })
    }

    fn copy_latest(&self, out: &mut [f32]) {
        out.iter_mut().for_each(|sample| *sample = 0.0);
        self.read((), |state| {
            let available = state.history.len().min(out.len());
            let skip = state.history.len() - available;
            let offset = out.len() - available;
            for (slot, sample) in out[offset..]
                .iter_mut()
                .zip(state.history.iter().skip(skip))
            {
                *slot = *sample;
            }
        });
    }
}

impl fmt::Debug for SharedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSignal").finish()
    }
}

/// Owns the analysis buffer every visualizer reads.
///
/// The buffer is `transform_size / 2` bytes long. Changing the transform size
/// swaps in a freshly allocated buffer.
pub struct AudioSampler {
    transform_size: TransformSize,
    source: Option<Box<dyn SignalSource>>,
    analyser: SpectrumAnalyser,
    window: Vec<f32>,
    buffer: Vec<u8>,
}

impl AudioSampler {
    pub fn new(transform_size: TransformSize, settings: SpectrumSettings) -> Self {
        Self {
            transform_size,
            source: None,
            analyser: SpectrumAnalyser::new(settings),
            window: vec![0.0; transform_size.get()],
            buffer: vec![0; transform_size.bin_count()],
        }
    }

    /// Connects a signal and resets smoothing history.
    pub fn attach_source(&mut self, source: Box<dyn SignalSource>) {
        tracing::debug!(sample_rate = source.sample_rate(), "signal source attached");
        self.source = Some(source);
        self.analyser.reset();
    }

    /// Disconnects the signal; later captures return neutral buffers.
    pub fn detach_source(&mut self) -> Option<Box<dyn SignalSource>> {
        self.source.take()
    }

    /// Whether a signal is connected, playing or not.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// True while an attached source reports playback.
    pub fn is_playing(&self) -> bool {
        self.source.as_ref().map_or(false, |source| source.is_playing())
    }

    /// Playback position of the source, or zero without one.
    pub fn elapsed_seconds(&self) -> f32 {
        self.source
            .as_ref()
            .map_or(0.0, |source| source.elapsed_seconds())
    }

    /// Current analysis window size.
    pub fn transform_size(&self) -> TransformSize {
        self.transform_size
    }

    /// Length of every captured buffer.
    pub fn bin_count(&self) -> usize {
        self.transform_size.bin_count()
    }

    /// The most recently captured snapshot.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Reallocates the buffer for a new analysis resolution. Unsupported sizes
    /// are rejected and leave the sampler untouched.
    pub fn change_transform_size(&mut self, size: usize) -> Result<()> {
        let transform_size = TransformSize::new(size)?;
        if transform_size == self.transform_size {
            return Ok(());
        }

        tracing::debug!(
            from = self.transform_size.get(),
            to = size,
            "changing transform size"
        );
        self.transform_size = transform_size;
        self.window = vec![0.0; transform_size.get()];
        self.buffer = vec![0; transform_size.bin_count()];
        Ok(())
    }

    /// Fills `out` with per-bin energy. Without a source the result is silence.
    pub fn capture_frequency_domain(&mut self, out: &mut [u8]) -> Result<()> {
        let Some(source) = self.source.as_ref() else {
            out.iter_mut().for_each(|byte| *byte = AnalysisDomain::Frequency.neutral());
            return Ok(());
        };

        source.copy_latest(&mut self.window);
        self.analyser.frequency_bytes(&self.window, out)
    }

    /// Fills `out` with waveform amplitude centred at 128.
    pub fn capture_time_domain(&mut self, out: &mut [u8]) {
        let Some(source) = self.source.as_ref() else {
            out.iter_mut().for_each(|byte| *byte = AnalysisDomain::Time.neutral());
            return;
        };

        source.copy_latest(&mut self.window);
        for (byte, sample) in out.iter_mut().zip(self.window.iter()) {
            *byte = time_domain_byte(*sample);
        }
    }

    /// Captures `domain` into the owned buffer and returns it.
    pub fn refresh(&mut self, domain: AnalysisDomain) -> Result<&[u8]> {
        let mut buffer = std::mem::take(&mut self.buffer);
        let captured = match domain {
            AnalysisDomain::Frequency => self.capture_frequency_domain(&mut buffer),
            AnalysisDomain::Time => {
                self.capture_time_domain(&mut buffer);
                Ok(())
            }
        };
        self.buffer = buffer;
        captured?;
        Ok(&self.buffer)
    }
}

impl fmt::Debug for AudioSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSampler")
            .field("transform_size", &self.transform_size)
            .field("has_source", &self.source.is_some())
            .field("analyser", &self.analyser)
            .finish()
    }
}
