use petalsonic_bridge::{AudioRenderer, Result};
use std::time::Duration;

/// Test tone that glides between two pitches as engine time advances
pub struct SineRenderer {
    base_frequency: f32,
    phase: f32,
    elapsed: Duration,
}

impl SineRenderer {
    pub fn new(base_frequency: f32) -> Self {
        Self {
            base_frequency,
            phase: 0.0,
            elapsed: Duration::ZERO,
        }
    }

    fn frequency(&self) -> f32 {
        // One octave sweep up and back every four seconds.
        let t = (self.elapsed.as_secs_f32() / 4.0).fract();
        let sweep = 1.0 - (2.0 * t - 1.0).abs();
        self.base_frequency * (1.0 + sweep)
    }
}

impl AudioRenderer for SineRenderer {
    fn fill(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) -> Result<usize> {
        let channels_usize = channels as usize;
        let step = self.frequency() / sample_rate as f32;

        for frame in buffer.chunks_exact_mut(channels_usize) {
            let sample = (self.phase * 2.0 * std::f32::consts::PI).sin() * 0.1; // Low volume
            frame.fill(sample);

            self.phase += step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }

        Ok(buffer.len() / channels_usize)
    }

    fn update(&mut self, delta: Duration) {
        self.elapsed += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_whole_frames_with_identical_channels() {
        let mut renderer = SineRenderer::new(440.0);
        let mut buffer = [0.0f32; 16];
        let frames = renderer.fill(&mut buffer, 48000, 2).unwrap();

        assert_eq!(frames, 8);
        for frame in buffer.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(buffer.iter().all(|s| s.abs() <= 0.1));
    }

    #[test]
    fn update_sweeps_frequency() {
        let mut renderer = SineRenderer::new(220.0);
        assert_eq!(renderer.frequency(), 220.0);
        renderer.update(Duration::from_secs(2));
        assert!((renderer.frequency() - 440.0).abs() < 1e-3);
    }
}
