//! # PetalSonic Bridge
//!
//! A real-time safe pull bridge between an audio renderer that produces chunks on demand
//! and a host audio callback that asks for a fixed number of samples on a real-time thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalsonic_bridge::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let desc = BridgeDesc::default();
//! let bridge = Arc::new(AudioBridge::new(desc.clone())?);
//!
//! // Anything that renders interleaved samples on request can feed the bridge
//! bridge.bind_renderer(|buffer: &mut [f32], _sample_rate: u32, channels: u16| -> Result<usize> {
//!     buffer.fill(0.0);
//!     Ok(buffer.len() / channels as usize)
//! });
//!
//! let mut engine = BridgeEngine::new(desc, bridge.clone())?;
//! engine.start()?;
//!
//! // Once per game frame: advance renderer time and render ahead
//! bridge.update(Duration::from_millis(16));
//!
//! for event in engine.poll_events() {
//!     if event.is_error() {
//!         println!("{:?}", event);
//!     }
//! }
//! # Ok::<(), BridgeError>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Frame update**: calls [`AudioBridge::update`] once per frame to pre-render
//! 2. **Audio callback**: calls [`AudioBridge::pull`], rendering missing chunks on the spot
//! 3. **Ring**: a [`SampleRing`] shared by both under a single mutex
//!
//! When the renderer cannot keep up, the callback delivers what is buffered and never
//! waits. See [`StarvationPolicy`] for what happens to the rest of the host buffer.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod renderer;
pub mod ring_buffer;

pub use bridge::{AudioBridge, PullReport};
pub use config::{BridgeDesc, StarvationPolicy};
pub use engine::BridgeEngine;
pub use error::{BridgeError, Result};
pub use events::{BridgeEvent, BridgeStats};
pub use renderer::AudioRenderer;
pub use ring_buffer::{SampleRing, WriteOutcome};
