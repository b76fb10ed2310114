/// Fades shorter than this snap to the target immediately
pub const MIN_FADE_SECONDS: f32 = 0.001;

/// Per-frame linear volume ramp.
///
/// A fade of `fade` seconds takes `ceil(fade * rate)` frames. The last step
/// lands exactly on the target, so the multiplier never overshoots it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRamp {
    current: f32,
    target: f32,
    step: f32,
    steps_left: u64,
}

impl Default for VolumeRamp {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl VolumeRamp {
    pub fn new(volume: f32) -> Self {
        let volume = volume.max(0.0);
        Self {
            current: volume,
            target: volume,
            step: 0.0,
            steps_left: 0,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_fading(&self) -> bool {
        self.steps_left > 0
    }

    pub fn set_target(&mut self, target: f32, fade_seconds: f32, sample_rate: u32) {
        let target = target.max(0.0);
        self.target = target;
        if fade_seconds >= MIN_FADE_SECONDS && sample_rate > 0 {
            let steps = (f64::from(fade_seconds) * f64::from(sample_rate)).ceil().max(1.0) as u64;
            self.step = (target - self.current) / steps as f32;
            self.steps_left = steps;
        } else {
            self.snap();
        }
    }

    /// Jump to the target, abandoning any fade in progress
    pub fn snap(&mut self) {
        self.current = self.target;
        self.step = 0.0;
        self.steps_left = 0;
    }

    /// Multiplier for the next frame; advances the ramp by one frame.
    pub fn next_gain(&mut self) -> f32 {
        let gain = self.current;
        if self.steps_left > 0 {
            self.steps_left -= 1;
            if self.steps_left == 0 {
                self.current = self.target;
            } else {
                let next = self.current + self.step;
                self.current = if self.step < 0.0 {
                    next.max(self.target)
                } else {
                    next.min(self.target)
                };
            }
        }
        gain
    }

    /// Scale the first `frames` interleaved frames of `samples`.
    pub fn apply(&mut self, samples: &mut [f32], channels: usize, frames: usize) {
        if !self.is_fading() && self.current == 1.0 {
            return;
        }
        for frame in samples.chunks_exact_mut(channels).take(frames) {
            let gain = self.next_gain();
            for sample in frame {
                *sample *= gain;
            }
        }
    }
}
