//! Pull bridge between an on-demand renderer and a fixed-cadence host callback.
//!
//! Two contexts share an [`AudioBridge`]:
//!
//! 1. **Frame update** (non real-time): calls [`AudioBridge::update`] once per host frame,
//!    which advances renderer time and opportunistically renders ahead.
//! 2. **Audio callback** (real-time): calls [`AudioBridge::pull`] with the host's output
//!    buffer. Missing data is rendered on the spot, one chunk at a time, until the request
//!    can be served or the renderer gives up.
//!
//! The ring is guarded by one mutex held only while indices are inspected or samples are
//! copied. The real-time path never waits for the renderer: if the frame update is
//! rendering at that moment, the pull is served from what is already buffered.

use crate::config::{BridgeDesc, StarvationPolicy};
use crate::error::{BridgeError, Result};
use crate::events::{BridgeEvent, BridgeStats};
use crate::renderer::AudioRenderer;
use crate::ring_buffer::{SampleRing, WriteOutcome};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

/// Outcome of a single host pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    /// Samples the host asked for
    pub requested: usize,
    /// Samples copied from the ring, all at the front of the host buffer
    pub delivered: usize,
}

impl PullReport {
    pub fn is_starved(&self) -> bool {
        self.delivered < self.requested
    }
}

struct RingState {
    ring: SampleRing,
    channels: u16,
    chunk_capacity: usize,
    policy: StarvationPolicy,
}

impl RingState {
    /// Largest request the fill loop can satisfy without overrunning the ring.
    fn max_pull(&self) -> usize {
        (self.ring.capacity() + 1).saturating_sub(self.chunk_capacity)
    }
}

struct RenderSlot {
    renderer: Option<Box<dyn AudioRenderer>>,
    scratch: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    prerender_target: usize,
}

#[derive(Default)]
struct Counters {
    samples_rendered: AtomicU64,
    samples_consumed: AtomicU64,
    underruns: AtomicU64,
    overflow_resets: AtomicU64,
}

/// Owns the ring, the bound renderer and everything shared between producer and consumer.
pub struct AudioBridge {
    desc: Mutex<BridgeDesc>,
    state: Mutex<RingState>,
    slot: Mutex<RenderSlot>,
    counters: Counters,
    event_sender: Sender<BridgeEvent>,
    event_receiver: Receiver<BridgeEvent>,
}

impl AudioBridge {
    /// Creates a bridge sized for `desc` with no renderer bound.
    ///
    /// The ring starts sized for `desc.frames_per_buffer`; call
    /// [`reconfigure`](Self::reconfigure) once the host buffer size is known.
    pub fn new(desc: BridgeDesc) -> Result<Self> {
        desc.validate()?;
        let (event_sender, event_receiver) = crossbeam_channel::bounded(desc.event_capacity);

        let ring = SampleRing::new(desc.ring_capacity(desc.frames_per_buffer)?)?;
        log::info!(
            "Audio bridge created: {} channels, {} frames per buffer, {} Hz, ring of {} samples",
            desc.channels,
            desc.frames_per_buffer,
            desc.sample_rate,
            ring.capacity()
        );

        Ok(Self {
            state: Mutex::new(RingState {
                ring,
                channels: desc.channels,
                chunk_capacity: desc.chunk_capacity(),
                policy: desc.starvation_policy,
            }),
            slot: Mutex::new(RenderSlot {
                renderer: None,
                scratch: vec![0.0; desc.chunk_capacity()],
                sample_rate: desc.sample_rate,
                channels: desc.channels,
                prerender_target: desc.prerender_target(),
            }),
            desc: Mutex::new(desc),
            counters: Counters::default(),
            event_sender,
            event_receiver,
        })
    }

    /// Creates a bridge and binds `renderer` to it.
    pub fn with_renderer<R>(desc: BridgeDesc, renderer: R) -> Result<Self>
    where
        R: AudioRenderer + 'static,
    {
        let bridge = Self::new(desc)?;
        bridge.bind_renderer(renderer);
        Ok(bridge)
    }

    /// Binds the renderer that feeds the ring, replacing any previous one.
    pub fn bind_renderer<R>(&self, renderer: R)
    where
        R: AudioRenderer + 'static,
    {
        self.lock_slot().renderer = Some(Box::new(renderer));
        log::info!("Renderer bound to audio bridge");
        self.emit(BridgeEvent::RendererBound);
    }

    /// Unbinds the current renderer. Pulls starve until another one is bound.
    pub fn unbind_renderer(&self) -> Option<Box<dyn AudioRenderer>> {
        let previous = self.lock_slot().renderer.take();
        if previous.is_some() {
            log::info!("Renderer unbound from audio bridge");
            self.emit(BridgeEvent::RendererUnbound);
        }
        previous
    }

    pub fn is_bound(&self) -> bool {
        self.lock_slot().renderer.is_some()
    }

    /// Applies a new audio configuration.
    ///
    /// Reallocates the ring for the larger of the configured and host buffer sizes and
    /// resets both indices, discarding anything buffered. Must not run concurrently with
    /// [`pull`](Self::pull) or the producer. The event queue keeps the capacity it was
    /// created with.
    pub fn reconfigure(&self, desc: BridgeDesc, host_frames_per_buffer: usize) -> Result<()> {
        desc.validate()?;
        let capacity = desc.ring_capacity(host_frames_per_buffer)?;

        let mut current = self.lock_desc();
        let mut slot = self.lock_slot();
        let mut state = self.lock_state();

        state.ring.reallocate(capacity)?;
        state.channels = desc.channels;
        state.chunk_capacity = desc.chunk_capacity();
        state.policy = desc.starvation_policy;

        slot.scratch = vec![0.0; desc.chunk_capacity()];
        slot.sample_rate = desc.sample_rate;
        slot.channels = desc.channels;
        slot.prerender_target = desc.prerender_target();

        log::info!(
            "Audio bridge reconfigured: {} channels, {} frames per buffer (host {}), ring of {} samples",
            desc.channels,
            desc.frames_per_buffer,
            host_frames_per_buffer,
            capacity
        );
        let channels = desc.channels;
        *current = desc;

        drop(state);
        drop(slot);
        drop(current);
        self.emit(BridgeEvent::Reconfigured { capacity, channels });
        Ok(())
    }

    /// Unbinds the renderer and releases the ring storage.
    pub fn shutdown(&self) {
        self.unbind_renderer();
        self.lock_state().ring.release();
        log::info!("Audio bridge shut down");
    }

    /// Renders one chunk and appends it to the ring, waiting for the renderer if another
    /// context is using it.
    ///
    /// Returns the number of samples written.
    pub fn render_chunk(&self) -> Result<usize> {
        self.produce(true, |_| true)
            .map(|written| written.unwrap_or_default())
    }

    /// Fills `dest` with interleaved samples for the host audio callback.
    ///
    /// Renders missing data one chunk at a time until the request can be served. If the
    /// renderer fails first, whatever is buffered is delivered at the front of `dest` and
    /// the remainder is handled by the configured [`StarvationPolicy`].
    pub fn pull(&self, dest: &mut [f32], channels: u16) -> PullReport {
        let (expected, max_pull, policy) = {
            let state = self.lock_state();
            (state.channels, state.max_pull(), state.policy)
        };

        if channels != expected {
            log::error!(
                "Channel mismatch in audio callback (configured: {}, requested: {})",
                expected,
                channels
            );
            self.emit(BridgeEvent::ChannelMismatch {
                expected,
                actual: channels,
            });
        }

        let requested = dest.len();
        let mut delivered = 0;
        if max_pull > 0 {
            for segment in dest.chunks_mut(max_pull) {
                let copied = self.pull_segment(segment);
                delivered += copied;
                if copied < segment.len() {
                    break;
                }
            }
        }

        self.counters
            .samples_consumed
            .fetch_add(delivered as u64, Ordering::Relaxed);

        let report = PullReport {
            requested,
            delivered,
        };
        if report.is_starved() {
            if policy == StarvationPolicy::ZeroFill {
                dest[delivered..].fill(0.0);
            }
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Audio bridge underrun: delivered {} of {} samples",
                delivered,
                requested
            );
            self.emit(BridgeEvent::Underrun {
                requested,
                delivered,
            });
        }
        report
    }

    /// Advances renderer time and renders ahead of the audio callback.
    ///
    /// Keeps rendering while less than the pre-render target is buffered and a whole
    /// chunk still fits. Returns the number of samples rendered.
    pub fn update(&self, delta: Duration) -> usize {
        let (target, chunk) = {
            let mut slot = self.lock_slot();
            let Some(renderer) = slot.renderer.as_mut() else {
                return 0;
            };
            renderer.update(delta);
            (slot.prerender_target as u64, slot.scratch.len() as u64)
        };

        let mut rendered = 0;
        loop {
            match self.produce(true, |ring| ring.available() < target && ring.free() >= chunk) {
                Ok(Some(samples)) => rendered += samples,
                Ok(None) => break,
                Err(e) => {
                    log::debug!("Pre-render stopped: {}", e);
                    break;
                }
            }
        }
        rendered
    }

    /// Drains pending events.
    pub fn poll_events(&self) -> Vec<BridgeEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            samples_rendered: self.counters.samples_rendered.load(Ordering::Relaxed),
            samples_consumed: self.counters.samples_consumed.load(Ordering::Relaxed),
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            overflow_resets: self.counters.overflow_resets.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> BridgeDesc {
        self.lock_desc().clone()
    }

    pub fn channels(&self) -> u16 {
        self.lock_state().channels
    }

    pub fn capacity(&self) -> usize {
        self.lock_state().ring.capacity()
    }

    pub fn available(&self) -> u64 {
        self.lock_state().ring.available()
    }

    pub fn write_index(&self) -> u64 {
        self.lock_state().ring.write_index()
    }

    pub fn read_index(&self) -> u64 {
        self.lock_state().ring.read_index()
    }

    /// Largest number of samples a single fill loop serves; longer pulls are split.
    pub fn max_pull(&self) -> usize {
        self.lock_state().max_pull()
    }

    fn pull_segment(&self, segment: &mut [f32]) -> usize {
        let needed = segment.len() as u64;
        loop {
            if self.lock_state().ring.available() >= needed {
                break;
            }
            match self.produce(false, |ring| ring.available() < needed) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    log::debug!("Producer stopped during pull: {}", e);
                    break;
                }
            }
        }
        self.lock_state().ring.read_into(segment)
    }

    /// Producer side: one renderer call, one copy into the ring.
    ///
    /// `wanted` is checked against the ring while the renderer slot is held, so no other
    /// producer can change the fill level between the check and the write. Returns
    /// `Ok(None)` when it declines. Buffer state is only modified once the renderer has
    /// delivered a valid chunk.
    fn produce<F>(&self, wait: bool, wanted: F) -> Result<Option<usize>>
    where
        F: FnOnce(&SampleRing) -> bool,
    {
        let mut slot = if wait {
            self.lock_slot()
        } else {
            match self.slot.try_lock() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return Err(BridgeError::RendererUnavailable),
            }
        };

        let RenderSlot {
            renderer,
            scratch,
            sample_rate,
            channels,
            ..
        } = &mut *slot;
        let renderer = renderer.as_mut().ok_or(BridgeError::RendererUnavailable)?;
        if !wanted(&self.lock_state().ring) {
            return Ok(None);
        }

        let frames = renderer.fill(scratch, *sample_rate, *channels)?;
        if frames == 0 {
            return Err(BridgeError::Render("renderer produced no frames".into()));
        }
        let Some(len) = frames
            .checked_mul(*channels as usize)
            .filter(|&len| len <= scratch.len())
        else {
            return Err(BridgeError::Render(format!(
                "renderer reported {} frames but the buffer holds {}",
                frames,
                scratch.len() / *channels as usize
            )));
        };

        let outcome = self.lock_state().ring.write(&scratch[..len])?;
        drop(slot);

        self.counters
            .samples_rendered
            .fetch_add(len as u64, Ordering::Relaxed);
        log::debug!("Rendered chunk of {} frames ({} samples)", frames, len);

        if let WriteOutcome::OverflowReset { discarded } = outcome {
            self.counters.overflow_resets.fetch_add(1, Ordering::Relaxed);
            self.emit(BridgeEvent::OverflowReset { discarded });
        }
        Ok(Some(len))
    }

    fn emit(&self, event: BridgeEvent) {
        if let Err(TrySendError::Full(event)) = self.event_sender.try_send(event) {
            log::debug!("Event queue full, dropping {:?}", event);
        }
    }

    fn lock_desc(&self) -> MutexGuard<'_, BridgeDesc> {
        self.desc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slot(&self) -> MutexGuard<'_, RenderSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    /// Counts up from 0, one value per sample; fails once `budget` chunks were rendered.
    struct CountingRenderer {
        next: f32,
        budget: Option<usize>,
    }

    impl CountingRenderer {
        fn unlimited() -> Self {
            Self {
                next: 0.0,
                budget: None,
            }
        }

        fn with_budget(chunks: usize) -> Self {
            Self {
                next: 0.0,
                budget: Some(chunks),
            }
        }
    }

    impl AudioRenderer for CountingRenderer {
        fn fill(&mut self, buffer: &mut [f32], _sample_rate: u32, channels: u16) -> Result<usize> {
            if let Some(budget) = self.budget.as_mut() {
                if *budget == 0 {
                    return Err(BridgeError::RendererUnavailable);
                }
                *budget -= 1;
            }
            for sample in buffer.iter_mut() {
                *sample = self.next;
                self.next += 1.0;
            }
            Ok(buffer.len() / channels as usize)
        }
    }

    fn small_desc() -> BridgeDesc {
        BridgeDesc::new()
            .channels(2)
            .frames_per_buffer(4)
            .buffer_multiplier(5)
    }

    #[test]
    fn new_bridge_is_unbound_and_empty() {
        let bridge = AudioBridge::new(small_desc()).unwrap();
        assert!(!bridge.is_bound());
        assert_eq!(bridge.capacity(), 40);
        assert_eq!(bridge.available(), 0);
        assert_eq!(bridge.max_pull(), 33);
    }

    #[test]
    fn invalid_desc_is_rejected() {
        assert!(AudioBridge::new(BridgeDesc::new().channels(0)).is_err());
        assert!(matches!(
            AudioBridge::new(BridgeDesc::new().frames_per_buffer(usize::MAX / 4)),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn reconfigure_rejects_oversized_host_buffer() {
        let bridge = AudioBridge::new(small_desc()).unwrap();
        assert!(matches!(
            bridge.reconfigure(small_desc(), usize::MAX / 4),
            Err(BridgeError::Configuration(_))
        ));
        assert_eq!(bridge.capacity(), 40);
    }

    #[test]
    fn render_without_renderer_fails_fast() {
        let bridge = AudioBridge::new(small_desc()).unwrap();
        assert!(matches!(
            bridge.render_chunk(),
            Err(BridgeError::RendererUnavailable)
        ));
        assert_eq!(bridge.write_index(), 0);
    }

    #[test]
    fn pull_renders_until_request_is_covered() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        let mut out = [0.0; 20];
        let report = bridge.pull(&mut out, 2);

        assert!(!report.is_starved());
        assert_eq!(bridge.write_index(), 24);
        assert_eq!(bridge.read_index(), 20);
        let expected: Vec<f32> = (0..20).map(|v| v as f32).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn starved_pull_leaves_remainder_untouched() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::with_budget(1)).unwrap();
        let mut out = [-1.0; 20];
        let report = bridge.pull(&mut out, 2);

        assert_eq!(
            report,
            PullReport {
                requested: 20,
                delivered: 8
            }
        );
        assert_eq!(&out[..8], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!(out[8..].iter().all(|&s| s == -1.0));
        assert_eq!(bridge.stats().underruns, 1);
        assert!(bridge.poll_events().contains(&BridgeEvent::Underrun {
            requested: 20,
            delivered: 8
        }));
    }

    #[test]
    fn zero_fill_policy_silences_remainder() {
        let desc = small_desc().starvation_policy(StarvationPolicy::ZeroFill);
        let bridge = AudioBridge::with_renderer(desc, CountingRenderer::with_budget(1)).unwrap();
        let mut out = [-1.0; 12];
        bridge.pull(&mut out, 2);

        assert_eq!(out[7], 7.0);
        assert!(out[8..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn zero_frame_render_counts_as_failure() {
        let bridge =
            AudioBridge::with_renderer(small_desc(), |_: &mut [f32], _: u32, _: u16| -> Result<usize> { Ok(0) }).unwrap();
        let mut out = [5.0; 4];
        let report = bridge.pull(&mut out, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(out, [5.0; 4]);
    }

    #[test]
    fn oversized_frame_count_is_rejected() {
        let bridge =
            AudioBridge::with_renderer(small_desc(), |_: &mut [f32], _: u32, _: u16| -> Result<usize> {
            Ok(64)
        }).unwrap();
        assert!(matches!(bridge.render_chunk(), Err(BridgeError::Render(_))));
        assert_eq!(bridge.write_index(), 0);
    }

    #[test]
    fn frame_count_overflowing_sample_count_is_rejected() {
        let bridge = AudioBridge::with_renderer(
            small_desc(),
            |_: &mut [f32], _: u32, _: u16| -> Result<usize> { Ok(usize::MAX) },
        )
        .unwrap();
        assert!(matches!(bridge.render_chunk(), Err(BridgeError::Render(_))));
        assert_eq!(bridge.write_index(), 0);

        // The slot is released, so the audio path can still reach the renderer.
        let mut out = [1.0; 4];
        assert_eq!(bridge.pull(&mut out, 2).delivered, 0);
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn channel_mismatch_is_reported_but_served() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        bridge.poll_events();
        let mut out = [0.0; 8];
        let report = bridge.pull(&mut out, 1);

        assert_eq!(report.delivered, 8);
        assert_eq!(
            bridge.poll_events(),
            vec![BridgeEvent::ChannelMismatch {
                expected: 2,
                actual: 1
            }]
        );
    }

    #[test]
    fn long_pull_is_served_in_segments() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        let mut out = vec![0.0; 100];
        let report = bridge.pull(&mut out, 2);

        assert!(!report.is_starved());
        assert_eq!(bridge.stats().overflow_resets, 0);
        let expected: Vec<f32> = (0..100).map(|v| v as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn update_prerenders_up_to_target() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let renderer = move |buffer: &mut [f32], _: u32, channels: u16| -> Result<usize> {
            counter.fetch_add(1, Ordering::Relaxed);
            buffer.fill(0.5);
            Ok(buffer.len() / channels as usize)
        };
        let desc = small_desc().prerender_buffers(3);
        let bridge = AudioBridge::with_renderer(desc, renderer).unwrap();

        assert_eq!(bridge.update(Duration::from_millis(16)), 24);
        assert_eq!(bridge.available(), 24);
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        // Already at target: nothing more is rendered.
        assert_eq!(bridge.update(Duration::from_millis(16)), 0);
    }

    #[test]
    fn update_never_overruns_the_ring() {
        let desc = small_desc().prerender_buffers(100);
        let bridge = AudioBridge::with_renderer(desc, CountingRenderer::unlimited()).unwrap();

        assert_eq!(bridge.update(Duration::ZERO), 40);
        assert_eq!(bridge.available(), 40);
        assert_eq!(bridge.stats().overflow_resets, 0);
    }

    #[test]
    fn update_forwards_time_to_renderer() {
        struct Clock(Arc<Mutex<Duration>>);
        impl AudioRenderer for Clock {
            fn fill(&mut self, _: &mut [f32], _: u32, _: u16) -> Result<usize> {
                Err(BridgeError::RendererUnavailable)
            }
            fn update(&mut self, delta: Duration) {
                *self.0.lock().unwrap() += delta;
            }
        }

        let elapsed = Arc::new(Mutex::new(Duration::ZERO));
        let bridge = AudioBridge::with_renderer(small_desc(), Clock(elapsed.clone())).unwrap();
        bridge.update(Duration::from_millis(10));
        bridge.update(Duration::from_millis(6));
        assert_eq!(*elapsed.lock().unwrap(), Duration::from_millis(16));
    }

    #[test]
    fn reconfigure_resets_and_resizes() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        bridge.render_chunk().unwrap();
        assert_eq!(bridge.available(), 8);

        bridge
            .reconfigure(small_desc().channels(1).frames_per_buffer(8), 16)
            .unwrap();
        assert_eq!(bridge.capacity(), 16 * 5);
        assert_eq!(bridge.available(), 0);
        assert_eq!(bridge.write_index(), 0);
        assert_eq!(bridge.channels(), 1);
        assert_eq!(bridge.render_chunk().unwrap(), 8);
        assert!(bridge.poll_events().contains(&BridgeEvent::Reconfigured {
            capacity: 80,
            channels: 1
        }));
    }

    #[test]
    fn shutdown_starves_pulls() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        bridge.shutdown();

        assert!(!bridge.is_bound());
        assert_eq!(bridge.capacity(), 0);
        let mut out = [2.0; 6];
        let report = bridge.pull(&mut out, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(out, [2.0; 6]);
    }

    #[test]
    fn unbind_returns_previous_renderer() {
        let bridge = AudioBridge::with_renderer(small_desc(), CountingRenderer::unlimited()).unwrap();
        assert!(bridge.unbind_renderer().is_some());
        assert!(bridge.unbind_renderer().is_none());
        assert_eq!(
            bridge.poll_events(),
            vec![BridgeEvent::RendererBound, BridgeEvent::RendererUnbound]
        );
    }

    #[test]
    fn full_event_queue_drops_newest() {
        let desc = small_desc().event_capacity(1);
        let bridge = AudioBridge::new(desc).unwrap();
        bridge.bind_renderer(CountingRenderer::unlimited());
        bridge.unbind_renderer();
        assert_eq!(bridge.poll_events(), vec![BridgeEvent::RendererBound]);
    }
}
