use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

pub const DEFAULT_SMOOTHING_TIME_CONSTANT: f32 = 0.8;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// Byte value of a silent time-domain sample.
pub const TIME_DOMAIN_SILENCE: u8 = 128;

/// Tunables for the byte spectrum produced by [`SpectrumAnalyser`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSettings {
    /// Weight of the previous frame in `[0, 1]`. Zero disables smoothing.
    pub smoothing_time_constant: f32,
    /// Power mapped to byte 0.
    pub min_decibels: f32,
    /// Power mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            smoothing_time_constant: DEFAULT_SMOOTHING_TIME_CONSTANT,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }
}

impl SpectrumSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(VisualizerError::InvalidConfig(format!(
                "smoothing time constant {} is outside 0..=1",
                self.smoothing_time_constant
            )));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(VisualizerError::InvalidConfig(format!(
                "min decibels {} must be below max decibels {}",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}

/// Windowed real FFT with per-bin temporal smoothing, reduced to one byte per
/// frequency bin.
///
/// The plan, scratch space and smoothing history are cached for the last
/// transform size seen and rebuilt when a window of a different length comes
/// in, so a size change never blends history from two resolutions.
pub struct SpectrumAnalyser {
    settings: SpectrumSettings,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SpectrumAnalyser {
    pub fn new(settings: SpectrumSettings) -> Self {
        Self {
            settings,
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn settings(&self) -> &SpectrumSettings {
        &self.settings
    }

    /// Drops the smoothing history while keeping the cached plan.
    pub fn reset(&mut self) {
        if let Some(fft) = self.fft.as_mut() {
            fft.smoothed.iter_mut().for_each(|value| *value = 0.0);
        }
    }

    /// Transforms one analysis window and writes `min(out.len(), window.len() / 2)`
    /// bin energies into `out`.
    pub fn frequency_bytes(&mut self, window: &[f32], out: &mut [u8]) -> Result<()> {
        let len = window.len();
        if len < 2 {
            out.iter_mut().for_each(|byte| *byte = 0);
            return Ok(());
        }

        let settings = self.settings;
        let fft = self.prepare_fft(len);

        for (index, value) in window.iter().enumerate() {
            fft.input[index] = *value * blackman_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let tau = settings.smoothing_time_constant;
        let range = settings.max_decibels - settings.min_decibels;
        let scale = 1.0 / len as f32;

        for (bin, smoothed) in fft.smoothed.iter_mut().enumerate() {
            let magnitude = fft.spectrum[bin].norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
        }

        for (byte, smoothed) in out.iter_mut().zip(fft.smoothed.iter()) {
            *byte = if *smoothed <= f32::MIN_POSITIVE {
                0
            } else {
                let decibels = 20.0 * smoothed.log10();
                (255.0 * (decibels - settings.min_decibels) / range).clamp(0.0, 255.0) as u8
            };
        }

        Ok(())
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(false, |fft| fft.size != size) {
            tracing::debug!(size, "re-planning analysis transform");
            self.fft = None;
        }

        let planner = &mut self.planner;
        self.fft
            .get_or_insert_with(|| FftResources::plan(planner, size))
    }
}

/// Converts a waveform sample in `[-1, 1]` to its byte representation, with
/// silence at [`TIME_DOMAIN_SILENCE`].
pub fn time_domain_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
    smoothed: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        Self {
            size,
            plan,
            scratch,
            spectrum,
            input,
            smoothed: vec![0.0; size / 2],
        }
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("settings", &self.settings)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a2 = 0.5 * ALPHA;
    let phase = 2.0 * PI * index as f32 / len as f32;
    a0 - 0.5 * phase.cos() + a2 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_at_bin(bin: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut analyser = SpectrumAnalyser::new(SpectrumSettings::default());
        let mut out = vec![7u8; 64];
        analyser.frequency_bytes(&[0.0; 128], &mut out).unwrap();
        assert!(out.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyser = SpectrumAnalyser::new(SpectrumSettings {
            smoothing_time_constant: 0.0,
            min_decibels: -100.0,
            max_decibels: 0.0,
        });
        let mut out = vec![0u8; 128];
        analyser
            .frequency_bytes(&sine_at_bin(16, 256), &mut out)
            .unwrap();

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, byte)| **byte)
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak, 16);
        assert!(out[15] < out[16] && out[17] < out[16]);
        assert_eq!(out[100], 0);
    }

    #[test]
    fn smoothing_decays_instead_of_dropping() {
        let mut analyser = SpectrumAnalyser::new(SpectrumSettings::default());
        let mut out = vec![0u8; 128];
        analyser
            .frequency_bytes(&sine_at_bin(8, 256), &mut out)
            .unwrap();
        let loud = out[8];

        analyser.frequency_bytes(&[0.0; 256], &mut out).unwrap();
        assert!(out[8] > 0);
        assert!(out[8] <= loud);
    }

    #[test]
    fn changing_window_length_discards_history() {
        let mut analyser = SpectrumAnalyser::new(SpectrumSettings::default());
        let mut out = vec![0u8; 128];
        analyser
            .frequency_bytes(&sine_at_bin(8, 256), &mut out)
            .unwrap();

        let mut small = vec![0u8; 64];
        analyser.frequency_bytes(&[0.0; 128], &mut small).unwrap();
        assert!(small.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn time_domain_bytes_are_centred() {
        assert_eq!(time_domain_byte(0.0), TIME_DOMAIN_SILENCE);
        assert_eq!(time_domain_byte(1.0), 255);
        assert_eq!(time_domain_byte(-1.0), 0);
        assert_eq!(time_domain_byte(4.0), 255);
    }

    #[test]
    fn rejects_inverted_decibel_range() {
        let settings = SpectrumSettings {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
