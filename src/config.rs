//! Configuration for the PetalSonic bridge

use crate::error::{BridgeError, Result};

/// Highest channel count a renderer may be configured with.
pub const MAX_CHANNELS: u16 = 8;
/// Lowest accepted output sample rate.
pub const MIN_SAMPLE_RATE: u32 = 16_000;
/// Highest accepted output sample rate.
pub const MAX_SAMPLE_RATE: u32 = 96_000;
/// Largest renderer or host buffer, in frames.
pub const MAX_FRAMES_PER_BUFFER: usize = 8192;
/// Largest ring size as a multiple of one buffer.
pub const MAX_BUFFER_MULTIPLIER: usize = 64;

/// What happens to the part of a host buffer the bridge could not fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StarvationPolicy {
    /// Leave the unfilled remainder exactly as the host handed it over
    #[default]
    LeaveUntouched,
    /// Overwrite the unfilled remainder with silence
    ZeroFill,
}

/// Configuration descriptor for an audio bridge
#[derive(Debug, Clone)]
pub struct BridgeDesc {
    /// Number of interleaved output channels
    pub channels: u16,
    /// Frames produced by a single renderer call
    pub frames_per_buffer: usize,
    /// Output sample rate handed to the renderer
    pub sample_rate: u32,
    /// Ring size as a multiple of one host buffer
    pub buffer_multiplier: usize,
    /// Buffers the frame update tries to keep rendered ahead (0 disables)
    pub prerender_buffers: usize,
    /// Treatment of the unfilled remainder on underrun
    pub starvation_policy: StarvationPolicy,
    /// Bound of the event queue; events are dropped when it is full
    pub event_capacity: usize,
}

impl Default for BridgeDesc {
    fn default() -> Self {
        Self {
            channels: 2,
            frames_per_buffer: 512,
            sample_rate: 48000,
            buffer_multiplier: 10,
            prerender_buffers: 2,
            starvation_policy: StarvationPolicy::LeaveUntouched,
            event_capacity: 256,
        }
    }
}

impl BridgeDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn frames_per_buffer(mut self, frames: usize) -> Self {
        self.frames_per_buffer = frames;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn buffer_multiplier(mut self, multiplier: usize) -> Self {
        self.buffer_multiplier = multiplier;
        self
    }

    pub fn prerender_buffers(mut self, buffers: usize) -> Self {
        self.prerender_buffers = buffers;
        self
    }

    pub fn starvation_policy(mut self, policy: StarvationPolicy) -> Self {
        self.starvation_policy = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Checks that the descriptor describes a usable bridge.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(BridgeError::Configuration(format!(
                "Channel count {} out of range (1..={})",
                self.channels, MAX_CHANNELS
            )));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(BridgeError::Configuration(format!(
                "Sample rate {} out of range ({}..={})",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if self.frames_per_buffer == 0 || self.frames_per_buffer > MAX_FRAMES_PER_BUFFER {
            return Err(BridgeError::Configuration(format!(
                "Frames per buffer {} out of range (1..={})",
                self.frames_per_buffer, MAX_FRAMES_PER_BUFFER
            )));
        }
        // With a multiplier of 1 a single pull could never exceed one sample.
        if !(2..=MAX_BUFFER_MULTIPLIER).contains(&self.buffer_multiplier) {
            return Err(BridgeError::Configuration(format!(
                "Buffer multiplier {} out of range (2..={})",
                self.buffer_multiplier, MAX_BUFFER_MULTIPLIER
            )));
        }
        if self.event_capacity == 0 {
            return Err(BridgeError::Configuration(
                "Event capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Samples produced by one renderer call.
    pub fn chunk_capacity(&self) -> usize {
        self.frames_per_buffer * self.channels as usize
    }

    /// Ring size for a host that requests `host_frames_per_buffer` frames per callback.
    ///
    /// The larger of the configured and host buffer sizes is used so that a
    /// single host pull always fits comfortably inside the ring.
    pub fn ring_capacity(&self, host_frames_per_buffer: usize) -> Result<usize> {
        if host_frames_per_buffer > MAX_FRAMES_PER_BUFFER {
            return Err(BridgeError::Configuration(format!(
                "Host buffer of {} frames exceeds {}",
                host_frames_per_buffer, MAX_FRAMES_PER_BUFFER
            )));
        }
        self.frames_per_buffer
            .max(host_frames_per_buffer)
            .checked_mul(self.channels as usize)
            .and_then(|samples| samples.checked_mul(self.buffer_multiplier))
            .ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "Ring for {} frames x {} channels x {} overflows",
                    self.frames_per_buffer, self.channels, self.buffer_multiplier
                ))
            })
    }

    /// Samples the frame update keeps rendered ahead of the consumer.
    pub fn prerender_target(&self) -> usize {
        self.prerender_buffers.saturating_mul(self.chunk_capacity())
    }
}
