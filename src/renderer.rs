//! The seam between the bridge and whatever produces audio.

use crate::error::Result;
use std::time::Duration;

/// Source of rendered audio, typically one active engine session.
///
/// The bridge calls [`fill`](AudioRenderer::fill) whenever it needs another chunk. The
/// buffer it passes is scratch space owned by the bridge; its contents are copied out
/// before `fill` returns to the caller, so implementations must not keep it.
pub trait AudioRenderer: Send {
    /// Render one chunk of interleaved samples into the front of `buffer`.
    ///
    /// Returns the number of frames written (frames = samples / channels). An error or a
    /// zero frame count means the engine has nothing to give right now.
    fn fill(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) -> Result<usize>;

    /// Advance engine time by `delta`. Called once per frame update.
    fn update(&mut self, _delta: Duration) {}
}

impl<F> AudioRenderer for F
where
    F: FnMut(&mut [f32], u32, u16) -> Result<usize> + Send,
{
    fn fill(&mut self, buffer: &mut [f32], sample_rate: u32, channels: u16) -> Result<usize> {
        self(buffer, sample_rate, channels)
    }
}
