use crate::file_renderer::FileRenderer;
use crate::sine_renderer::SineRenderer;
use anyhow::{Context, Result, bail};
use petalsonic_bridge::{AudioBridge, BridgeDesc, BridgeEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug)]
pub struct CliArgs {
    pub file: Option<String>,
    pub seconds: u64,
    pub frames_per_buffer: usize,
}

impl CliArgs {
    pub fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Self {
            file: None,
            seconds: 5,
            frames_per_buffer: 512,
        };

        let mut args = args.skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--file" => parsed.file = Some(args.next().context("--file needs a path")?),
                "--seconds" => {
                    parsed.seconds = args
                        .next()
                        .context("--seconds needs a value")?
                        .parse()
                        .context("--seconds must be a whole number")?;
                }
                "--frames" => {
                    parsed.frames_per_buffer = args
                        .next()
                        .context("--frames needs a value")?
                        .parse()
                        .context("--frames must be a whole number")?;
                }
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

pub fn run(args: CliArgs) -> Result<()> {
    let mut desc = BridgeDesc::new().frames_per_buffer(args.frames_per_buffer);

    let bridge = match &args.file {
        Some(path) => {
            let renderer = FileRenderer::from_path(path)?;
            desc = desc
                .sample_rate(renderer.sample_rate())
                .channels(renderer.channels());
            AudioBridge::with_renderer(desc.clone(), renderer)?
        }
        None => AudioBridge::with_renderer(desc.clone(), SineRenderer::new(220.0))?,
    };
    let bridge = Arc::new(bridge);

    let mut engine = BridgeEngine::new(desc, bridge.clone())?;
    engine.start()?;
    log::info!("Playing for {} seconds...", args.seconds);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut last_frame = Instant::now();
    while Instant::now() < deadline {
        let now = Instant::now();
        let rendered = bridge.update(now - last_frame);
        last_frame = now;
        if rendered > 0 {
            log::debug!("Pre-rendered {} samples", rendered);
        }

        for event in engine.poll_events() {
            if event.is_error() {
                log::warn!("{:?}", event);
            } else {
                log::info!("{:?}", event);
            }
        }

        std::thread::sleep(FRAME_INTERVAL);
    }

    engine.stop()?;
    bridge.shutdown();

    let stats = bridge.stats();
    log::info!(
        "Done: {} frames to device, {} samples rendered, {} consumed, {} underruns, {} overflow resets",
        engine.frames_processed(),
        stats.samples_rendered,
        stats.samples_consumed,
        stats.underruns,
        stats.overflow_resets
    );
    Ok(())
}
