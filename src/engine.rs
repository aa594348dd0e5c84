use crate::bridge::AudioBridge;
use crate::config::BridgeDesc;
use crate::error::{BridgeError, Result};
use crate::events::BridgeEvent;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Output engine that drives an [`AudioBridge`] from the default device's audio callback
pub struct BridgeEngine {
    desc: BridgeDesc,
    bridge: Arc<AudioBridge>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    error_sender: Sender<BridgeEvent>,
    error_receiver: Receiver<BridgeEvent>,
}

impl BridgeEngine {
    /// Create a new output engine for `bridge` with the given configuration
    pub fn new(desc: BridgeDesc, bridge: Arc<AudioBridge>) -> Result<Self> {
        desc.validate()?;
        let (error_sender, error_receiver) = crossbeam_channel::bounded(desc.event_capacity);
        Ok(Self {
            desc,
            bridge,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            error_sender,
            error_receiver,
        })
    }

    /// Open the default output device and start pulling from the bridge
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            BridgeError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.frames_per_buffer as u32),
        };

        // The host suspends callbacks while the stream is not yet playing, so this is the
        // configuration-change point for the ring.
        self.bridge
            .reconfigure(self.desc.clone(), self.desc.frames_per_buffer)?;

        let default_config = device.default_output_config().map_err(|e| {
            BridgeError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            _ => {
                return Err(BridgeError::AudioFormat("Unsupported sample format".into()));
            }
        };

        stream
            .play()
            .map_err(|e| BridgeError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Bridge engine started: {} Hz, {} channels, {} frames per buffer",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.frames_per_buffer
        );

        Ok(())
    }

    /// Stop the output stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Bridge engine stopped");
        }
        Ok(())
    }

    /// Check if the engine is currently running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Get the number of frames delivered to the device since start
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Get the engine configuration
    pub fn config(&self) -> &BridgeDesc {
        &self.desc
    }

    pub fn bridge(&self) -> &Arc<AudioBridge> {
        &self.bridge
    }

    /// Drain bridge events together with any errors reported by the output stream
    pub fn poll_events(&self) -> Vec<BridgeEvent> {
        let mut events = self.bridge.poll_events();
        events.extend(self.error_receiver.try_iter());
        events
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let bridge = self.bridge.clone();
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let error_sender = self.error_sender.clone();
        let channels = self.desc.channels;
        let channels_usize = channels as usize;

        // Sized once for the fixed host buffer; larger host buffers are served in pieces.
        let mut scratch = vec![0.0f32; self.desc.chunk_capacity()];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(T::from_sample(0.0f32));
                        return;
                    }

                    let delivered = fill_device_buffer(&bridge, &mut scratch, data, channels);
                    frames_processed.fetch_add(delivered / channels_usize, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    report_stream_error(&error_sender, err.to_string());
                },
                None,
            )
            .map_err(|e| BridgeError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

/// Queues a stream error for `poll_events`. Returns false if the queue dropped it.
fn report_stream_error(sender: &Sender<BridgeEvent>, error: String) -> bool {
    match sender.try_send(BridgeEvent::StreamError { error }) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            log::debug!("Event queue full, dropping {:?}", event);
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Pulls `data.len()` samples from `bridge` through `scratch` and converts them to the
/// device format.
///
/// Works in pieces of `scratch.len()` samples so the callback never allocates. Everything
/// after the first short piece is silence. Returns the number of samples delivered.
fn fill_device_buffer<T>(
    bridge: &AudioBridge,
    scratch: &mut [f32],
    data: &mut [T],
    channels: u16,
) -> usize
where
    T: SizedSample + FromSample<f32>,
{
    let silence = T::from_sample(0.0f32);
    if scratch.is_empty() {
        data.fill(silence);
        return 0;
    }

    let mut delivered = 0;
    let mut starved = false;
    for piece in data.chunks_mut(scratch.len()) {
        if starved {
            piece.fill(silence);
            continue;
        }

        // Starved samples stay silent.
        let scratch = &mut scratch[..piece.len()];
        scratch.fill(0.0);
        let report = bridge.pull(scratch, channels);

        for (out, &sample) in piece.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(sample);
        }
        delivered += report.delivered;
        starved = report.is_starved();
    }
    delivered
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
