/// Simulated time in seconds, advanced once per animation tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    time_seconds: f32,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> f32 {
        self.time_seconds
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Moves the clock by `delta`, never below zero. Non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f32) -> f32 {
        if delta.is_finite() {
            self.time_seconds = (self.time_seconds + delta).max(0.0);
        }
        self.time_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_monotonically() {
        let mut clock = PlaybackClock::new();
        assert_eq!(clock.advance(0.5), 0.5);
        clock.advance(-1.0);
        assert_eq!(clock.elapsed(), 0.0);
        clock.advance(f32::NAN);
        assert_eq!(clock.elapsed(), 0.0);
        clock.advance(0.25);
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
    }
}
