//! # datastream-rs: fixed-rate multi-channel data acquisition
//!
//! A small acquisition pipeline that samples an arbitrary number of named
//! value channels on a timer, buffers each channel's history, and optionally
//! streams aligned rows of all channels to a CSV file.
//!
//! ## Architecture
//!
//! - **Channels**: each [`Channel`](channel::Channel) owns a bounded raw
//!   intake queue (drop-and-reset on overflow) and a fixed-capacity history
//!   ring of processed samples. Value production and text rendering are
//!   external capabilities ([`Sampler`](channel::Sampler),
//!   [`Renderer`](channel::Renderer)).
//! - **Orchestrator**: [`DataStreamer`](stream::DataStreamer) drives every
//!   channel plus a synthetic timestamp channel in lockstep from a dedicated
//!   sampling thread, so row N of every channel corresponds to the same
//!   instant.
//! - **Recording**: an independent on/off flag observed by the loop at tick
//!   granularity; while on, each accepted tick appends one flushed CSV row.
//! - **Processing**: the host drains raw queues into history on its own
//!   schedule via [`DataStreamer::process_stream_queues`](stream::DataStreamer::process_stream_queues),
//!   decoupling producer and consumer timing.
//!
//! The loop reports recording transitions and I/O failures as
//! [`StreamEvent`](stream::StreamEvent)s over a bounded crossbeam channel.
//!
//! ## Example
//!
//! ```ignore
//! use datastream_rs::{BufferConfig, Channel, DataStreamer, DisplayRenderer, StreamConfig};
//! use std::time::Duration;
//!
//! fn main() -> datastream_rs::Result<()> {
//!     let config = StreamConfig {
//!         tick_interval: Duration::from_millis(10),
//!         ..Default::default()
//!     };
//!     let (mut streamer, events) = DataStreamer::new(config)?;
//!
//!     let mut phase = 0.0f64;
//!     let sine = streamer.register_channel(Channel::new(
//!         "sine",
//!         BufferConfig::new(256, 100_000),
//!         move || {
//!             phase += 0.01;
//!             phase.sin()
//!         },
//!         |v: &f64| format!("{:.4}", v),
//!     )?)?;
//!
//!     streamer.start_streaming()?;
//!     streamer.start_recording();
//!
//!     // Host loop: drain queues into history on its own cadence.
//!     for _ in 0..100 {
//!         std::thread::sleep(Duration::from_millis(16));
//!         streamer.process_stream_queues();
//!     }
//!     println!("latest: {:?}, history: {}", sine.latest(), sine.history_snapshot().len());
//!
//!     let file = streamer.stop_recording();
//!     streamer.stop_streaming();
//!     println!("recorded to {:?}", file);
//!     for event in events.try_iter() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod stream;

// Re-export commonly used types
pub use channel::{Channel, DisplayRenderer, Renderer, Sampler, StreamChannel};
pub use config::{BufferConfig, StreamConfig};
pub use error::{DataStreamError, Result};
pub use stream::{AlwaysReady, DataGate, DataStreamer, StreamEvent, TIMESTAMP_CHANNEL_NAME};
