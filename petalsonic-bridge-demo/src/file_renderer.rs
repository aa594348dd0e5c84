use anyhow::{Context, Result, anyhow, bail};
use petalsonic_bridge::{AudioRenderer, BridgeError};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decoded audio file rendered in a loop, one bridge chunk at a time
pub struct FileRenderer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    cursor: usize,
}

impl FileRenderer {
    /// Decode the whole file at `path` into interleaved `f32` samples
    pub fn from_path(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow!("Failed to detect audio format: {:?}", e))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track found"))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Sample rate not found"))?;
        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| anyhow!("Channel count not found"))?
            .count() as u16;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| anyhow!("Failed to create decoder: {:?}", e))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(e) => bail!("Error reading packet: {:?}", e),
            };

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(_)) => continue, // recoverable corruption
                Err(e) => bail!("Error decoding packet: {:?}", e),
            };

            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        if samples.is_empty() {
            bail!("{} contains no audio", path);
        }

        log::info!(
            "Decoded {}: {} Hz, {} channels, {} frames",
            path,
            sample_rate,
            channels,
            samples.len() / channels as usize
        );

        Ok(Self {
            samples,
            sample_rate,
            channels,
            cursor: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioRenderer for FileRenderer {
    fn fill(
        &mut self,
        buffer: &mut [f32],
        _sample_rate: u32,
        channels: u16,
    ) -> petalsonic_bridge::Result<usize> {
        if channels != self.channels {
            return Err(BridgeError::AudioFormat(format!(
                "File has {} channels, bridge expects {}",
                self.channels, channels
            )));
        }

        for sample in buffer.iter_mut() {
            *sample = self.samples[self.cursor];
            self.cursor = (self.cursor + 1) % self.samples.len();
        }
        Ok(buffer.len() / channels as usize)
    }
}
