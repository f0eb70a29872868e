//! Sample-and-hold-then-interpolate motion for audio-driven slots.
//!
//! Audio snapshots are re-read every tick but only promoted to new targets
//! once per sampling interval. Between promotions each slot moves linearly
//! from the value it had when the target was taken toward that target.

use crate::{Result, VisualizerError};

/// Maps animated slots onto buffer indices with a fixed stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    buffer_len: usize,
    stride: usize,
    slots: usize,
}

impl SlotLayout {
    /// Lays out up to `requested` slots over a buffer of `buffer_len` samples.
    ///
    /// The stride is `max(1, buffer_len / requested)`; when the buffer is
    /// shorter than the request only `buffer_len` slots fit.
    pub fn new(buffer_len: usize, requested: usize) -> Self {
        let stride = if requested == 0 {
            1
        } else {
            (buffer_len / requested).max(1)
        };
        let slots = requested.min(buffer_len.div_ceil(stride));
        Self {
            buffer_len,
            stride,
            slots,
        }
    }

    /// Distance in samples between neighbouring slots.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of slots that read distinct samples.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Length of the buffer the layout was computed for.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Buffer index read by `slot`, clamped to the last sample so callers
    /// holding more objects than [`slots`](Self::slots) never read past the end.
    /// `None` for an empty buffer.
    pub fn index(&self, slot: usize) -> Option<usize> {
        if self.buffer_len == 0 {
            return None;
        }
        Some(slot.saturating_mul(self.stride).min(self.buffer_len - 1))
    }

    /// Reads the sample for `slot`.
    pub fn read(&self, buffer: &[u8], slot: usize) -> Option<u8> {
        self.index(slot).and_then(|index| buffer.get(index).copied())
    }
}

/// Per-activation interpolation memory. Built empty when a visualizer is
/// activated and dropped with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationState {
    last_sample_time: Option<f32>,
    origins: Vec<f32>,
    targets: Vec<f32>,
}

impl InterpolationState {
    /// Unprimed state; the next step samples directly.
    pub fn new() -> Self {
        Self::default()
    }

    /// When the current targets were taken.
    pub fn last_sample_time(&self) -> Option<f32> {
        self.last_sample_time
    }

    /// Values the slots are moving toward.
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Whether a target set has been taken since the last clear.
    pub fn is_primed(&self) -> bool {
        self.last_sample_time.is_some()
    }

    /// Forgets all targets so the next step primes again.
    pub fn clear(&mut self) {
        self.last_sample_time = None;
        self.origins.clear();
        self.targets.clear();
    }
}

/// What a call to [`TemporalInterpolator::step`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// No prior targets existed: values were sampled and written directly.
    Primed,
    /// A new target set was captured; current values are left unchanged.
    Sampled,
    /// Current values were moved toward the stored targets by factor `t`.
    Interpolated { t: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalInterpolator {
    interval: f32,
}

impl TemporalInterpolator {
    /// Interpolator taking new targets every `interval` seconds. The
    /// interval must be finite and positive.
    pub fn new(interval: f32) -> Result<Self> {
        if interval.is_finite() && interval > 0.0 {
            Ok(Self { interval })
        } else {
            Err(VisualizerError::InvalidSamplingInterval(interval))
        }
    }

    /// Seconds between target samples.
    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// Advances `current` for time `now`.
    ///
    /// `sample(i)` yields the freshly derived value for slot `i`; it is only
    /// consulted when a new target set is taken. A change in slot count
    /// re-primes the state, as does time running backwards.
    pub fn step(
        &self,
        state: &mut InterpolationState,
        now: f32,
        current: &mut [f32],
        mut sample: impl FnMut(usize) -> f32,
    ) -> Step {
        let last = match state.last_sample_time {
            Some(last) if state.targets.len() == current.len() && now >= last => last,
            _ => {
                state.targets.clear();
                state.targets.extend((0..current.len()).map(&mut sample));
                current.copy_from_slice(&state.targets);
                state.origins.clear();
                state.origins.extend_from_slice(current);
                state.last_sample_time = Some(now);
                return Step::Primed;
            }
        };

        let elapsed = now - last;
        if elapsed >= self.interval {
            state.origins.copy_from_slice(current);
            for (slot, target) in state.targets.iter_mut().enumerate() {
                *target = sample(slot);
            }
            state.last_sample_time = Some(now);
            return Step::Sampled;
        }

        let t = elapsed / self.interval;
        for ((value, origin), target) in current
            .iter_mut()
            .zip(state.origins.iter())
            .zip(state.targets.iter())
        {
            *value = lerp(*origin, *target, t);
        }
        Step::Interpolated { t }
    }
}

/// Linear blend from `from` at `t = 0` to `to` at `t = 1`.
pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}
