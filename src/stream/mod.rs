//! Streaming orchestrator
//!
//! [`DataStreamer`] owns the ordered channel list plus the synthetic
//! timestamp channel, and drives everything from a background sampling loop:
//!
//! - **Streaming** runs the loop: every accepted tick samples the timestamp
//!   and every registered channel in lockstep, so row N of every channel
//!   corresponds to the same instant.
//! - **Recording** is an independent flag the loop observes at the top of
//!   each tick; while on, each accepted tick appends one comma-separated row
//!   to a CSV file. Toggling it repeatedly within one streaming session
//!   produces a distinct file per session.
//! - **Processing** is externally paced: the host calls
//!   [`DataStreamer::process_stream_queues`] on its own schedule to drain raw
//!   queues into each channel's history ring.
//!
//! The loop publishes [`StreamEvent`]s (recording started/stopped, I/O
//! failures) over a bounded crossbeam channel returned by
//! [`DataStreamer::new`]; events are dropped, never blocked on, when the host
//! does not drain them.

pub(crate) mod recorder;
pub(crate) mod worker;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::channel::{Channel, StreamChannel};
use crate::config::{BufferConfig, StreamConfig};
use crate::error::{DataStreamError, Result};
use worker::StreamWorker;

/// Name of the auto-created timestamp channel, and its CSV column header
pub const TIMESTAMP_CHANNEL_NAME: &str = "Timestamp";

/// Capacity of the event queue between the loop and the host
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Gates each tick's data fetch
///
/// Consulted once per tick before sampling; returning `false` skips the
/// tick entirely (no sampling, no row), letting an external clock or source
/// gate acquisition without stopping the loop.
pub trait DataGate: Send {
    /// Whether new data is available this tick
    fn has_new_data(&mut self) -> bool;
}

impl<F> DataGate for F
where
    F: FnMut() -> bool + Send,
{
    fn has_new_data(&mut self) -> bool {
        self()
    }
}

/// Default gate: data is always available
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl DataGate for AlwaysReady {
    fn has_new_data(&mut self) -> bool {
        true
    }
}

/// Notifications published by the sampling loop
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A recording file was opened and its header written
    RecordingStarted {
        /// Path of the newly created file
        path: PathBuf,
    },
    /// A recording file was closed
    RecordingStopped {
        /// Path of the closed file
        path: PathBuf,
        /// Number of data rows it holds (excluding the header)
        rows_written: u64,
    },
    /// File I/O failed; the recording session was abandoned but the loop
    /// keeps running
    RecordingError {
        /// Description of the failure
        message: String,
    },
}

/// State shared between the orchestrator and the loop thread
pub(crate) struct SharedState {
    /// Loop-alive flag; cleared by `stop_streaming`, observed every tick and
    /// while spinning
    pub(crate) streaming: AtomicBool,
    /// Recording request; transitions are applied by the loop at tick
    /// granularity
    pub(crate) recording: AtomicBool,
    /// Path of the file currently being written; `None` means inactive
    pub(crate) current_file: Mutex<Option<PathBuf>>,
    /// Explicit header override; synthesized from channel names when `None`
    pub(crate) header_override: Mutex<Option<String>>,
}

/// Orchestrates lockstep sampling of all channels and CSV recording
///
/// Channels are registered once, at setup, and live for the orchestrator's
/// lifetime; registering while streaming is unsupported. Dropping the
/// orchestrator stops the loop and closes any open recording file.
pub struct DataStreamer {
    config: StreamConfig,
    channels: Vec<Arc<dyn StreamChannel>>,
    timestamp: Option<Arc<Channel<f64>>>,
    origin: Arc<Mutex<Instant>>,
    gate: Arc<Mutex<Box<dyn DataGate>>>,
    shared: Arc<SharedState>,
    events_tx: Sender<StreamEvent>,
    worker: Option<JoinHandle<()>>,
}

impl DataStreamer {
    /// Create a new orchestrator and the receiving end of its event stream
    ///
    /// Fails with `InvalidConfiguration` for a zero tick interval.
    pub fn new(config: StreamConfig) -> Result<(Self, Receiver<StreamEvent>)> {
        config.validate()?;
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let streamer = Self {
            config,
            channels: Vec::new(),
            timestamp: None,
            origin: Arc::new(Mutex::new(Instant::now())),
            gate: Arc::new(Mutex::new(Box::new(AlwaysReady) as Box<dyn DataGate>)),
            shared: Arc::new(SharedState {
                streaming: AtomicBool::new(false),
                recording: AtomicBool::new(false),
                current_file: Mutex::new(None),
                header_override: Mutex::new(None),
            }),
            events_tx,
            worker: None,
        };
        Ok((streamer, events_rx))
    }

    /// Replace the default always-ready data gate
    pub fn with_gate(self, gate: impl DataGate + 'static) -> Self {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Box::new(gate);
        self
    }

    /// Register a channel, appending it to the CSV column order
    ///
    /// The first registration also creates the timestamp channel, sized to
    /// match; later registrations must carry the same two buffer capacities
    /// or fail with `InvalidConfiguration` without mutating the channel list.
    /// Must be called before [`DataStreamer::start_streaming`]; registering
    /// while streaming is unsupported.
    ///
    /// Returns a shared handle so the host can read the channel's history
    /// and latest value.
    pub fn register_channel<T: Clone + Send + 'static>(
        &mut self,
        channel: Channel<T>,
    ) -> Result<Arc<Channel<T>>> {
        match &self.timestamp {
            None => {
                let buffers =
                    BufferConfig::new(channel.raw_capacity(), channel.history_capacity());
                self.timestamp = Some(Arc::new(self.make_timestamp_channel(buffers)?));
            }
            Some(timestamp) => {
                if channel.raw_capacity() != timestamp.raw_capacity()
                    || channel.history_capacity() != timestamp.history_capacity()
                {
                    return Err(DataStreamError::InvalidConfiguration(format!(
                        "channel '{}' buffer capacities ({}, {}) do not match ({}, {})",
                        channel.name(),
                        channel.raw_capacity(),
                        channel.history_capacity(),
                        timestamp.raw_capacity(),
                        timestamp.history_capacity(),
                    )));
                }
            }
        }

        let handle = Arc::new(channel);
        self.channels.push(Arc::clone(&handle) as Arc<dyn StreamChannel>);
        Ok(handle)
    }

    /// Start the background sampling loop
    ///
    /// An already-streaming orchestrator is stopped first (idempotent
    /// restart). Resets the session origin used by relative timestamps. The
    /// streaming flag is set before the loop begins iterating.
    pub fn start_streaming(&mut self) -> Result<()> {
        self.stop_streaming();

        let timestamp = self.timestamp.clone().ok_or_else(|| {
            DataStreamError::InvalidConfiguration(
                "cannot start streaming with no channels registered".to_string(),
            )
        })?;

        *self.origin.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.shared.streaming.store(true, Ordering::SeqCst);

        let mut worker = StreamWorker::new(
            self.channels.clone(),
            timestamp,
            Arc::clone(&self.gate),
            Arc::clone(&self.shared),
            self.config.tick_interval,
            self.config.record_dir.clone(),
            self.config.record_prepend.clone(),
            self.events_tx.clone(),
        );
        match std::thread::Builder::new()
            .name("datastream-worker".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.streaming.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop the background sampling loop
    ///
    /// No-op when not streaming. Forces recording off; the loop closes any
    /// open file on its way out. Joins the loop thread, so no further file
    /// I/O occurs after this returns.
    pub fn stop_streaming(&mut self) {
        if !self.shared.streaming.load(Ordering::SeqCst) && self.worker.is_none() {
            return;
        }
        self.shared.recording.store(false, Ordering::SeqCst);
        self.shared.streaming.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("stream worker thread panicked");
            }
        }
    }

    /// Drain every channel's raw queue into its history ring
    ///
    /// Called by the consumer on its own schedule, decoupled from the
    /// sampling loop. Because all channels are sampled in lockstep, the
    /// timestamp channel's queue doubles as the "anything to process?" proxy:
    /// when it is empty this returns immediately. Channels drain in
    /// registration order, the timestamp last.
    pub fn process_stream_queues(&self) {
        let Some(timestamp) = &self.timestamp else {
            return;
        };
        if !timestamp.has_pending() {
            return;
        }
        for channel in &self.channels {
            channel.process_queue();
        }
        timestamp.process_queue();
    }

    /// Request recording
    ///
    /// A pure flag toggle: the loop opens the file at the top of its next
    /// tick, so file creation is tick-granular, not call-synchronous. Calling
    /// this twice in a row opens a single file. Has no effect unless
    /// streaming.
    pub fn start_recording(&self) {
        self.shared.recording.store(true, Ordering::SeqCst);
    }

    /// Request the end of recording
    ///
    /// Returns the path of the file that is about to stop being written, or
    /// `None` when no file is open (the inactive sentinel). The loop closes
    /// the file at the top of its next tick; callers that need the file
    /// closed must also stop streaming or wait at least one tick interval.
    pub fn stop_recording(&self) -> Option<PathBuf> {
        self.shared.recording.store(false, Ordering::SeqCst);
        self.current_file()
    }

    /// Override the header line written at the start of each recording
    ///
    /// Without an override the header is synthesized as the timestamp column
    /// name followed by every channel name in registration order.
    pub fn set_header(&self, header: impl Into<String>) {
        *self
            .shared
            .header_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(header.into());
    }

    /// Whether the sampling loop is running
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Whether recording is requested
    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// Path of the recording file currently open, if any
    pub fn current_file(&self) -> Option<PathBuf> {
        self.shared
            .current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered channels (excluding the timestamp channel)
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Handle to the auto-created timestamp channel
    pub fn timestamp_channel(&self) -> Option<Arc<Channel<f64>>> {
        self.timestamp.clone()
    }

    /// Build the timestamp channel: session-relative elapsed seconds or
    /// absolute epoch seconds, rendered with microsecond precision
    fn make_timestamp_channel(&self, buffers: BufferConfig) -> Result<Channel<f64>> {
        let use_absolute = self.config.use_absolute_timestamp;
        let origin = Arc::clone(&self.origin);
        let sampler = move || {
            if use_absolute {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0)
            } else {
                origin
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .elapsed()
                    .as_secs_f64()
            }
        };
        Channel::new(TIMESTAMP_CHANNEL_NAME, buffers, sampler, |v: &f64| {
            format!("{:.6}", v)
        })
    }
}

impl Drop for DataStreamer {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DisplayRenderer;
    use std::time::Duration;

    fn test_config() -> StreamConfig {
        StreamConfig {
            tick_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn int_channel(name: &str, buffers: BufferConfig) -> Channel<i64> {
        Channel::new(name, buffers, || 42i64, DisplayRenderer).expect("valid buffers")
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let config = StreamConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            DataStreamer::new(config),
            Err(DataStreamError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_first_registration_creates_matching_timestamp() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        assert!(streamer.timestamp_channel().is_none());

        streamer
            .register_channel(int_channel("a", BufferConfig::new(4, 8)))
            .expect("register");

        let timestamp = streamer.timestamp_channel().expect("timestamp");
        assert_eq!(timestamp.name(), TIMESTAMP_CHANNEL_NAME);
        assert_eq!(timestamp.raw_capacity(), 4);
        assert_eq!(timestamp.history_capacity(), 8);
        assert_eq!(streamer.channel_count(), 1);
    }

    #[test]
    fn test_capacity_mismatch_rejected_without_mutation() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        streamer
            .register_channel(int_channel("a", BufferConfig::new(4, 8)))
            .expect("register");

        let err = streamer
            .register_channel(int_channel("b", BufferConfig::new(4, 16)))
            .unwrap_err();
        assert!(matches!(err, DataStreamError::InvalidConfiguration(_)));
        assert_eq!(streamer.channel_count(), 1);

        let err = streamer
            .register_channel(int_channel("c", BufferConfig::new(2, 8)))
            .unwrap_err();
        assert!(matches!(err, DataStreamError::InvalidConfiguration(_)));
        assert_eq!(streamer.channel_count(), 1);
    }

    #[test]
    fn test_start_streaming_requires_channels() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        assert!(matches!(
            streamer.start_streaming(),
            Err(DataStreamError::InvalidConfiguration(_))
        ));
        assert!(!streamer.is_streaming());
    }

    #[test]
    fn test_stop_streaming_when_idle_is_noop() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        streamer.stop_streaming();
        assert!(!streamer.is_streaming());
    }

    #[test]
    fn test_stop_recording_when_idle_returns_inactive_sentinel() {
        let (streamer, _events) = DataStreamer::new(test_config()).expect("new");
        assert!(!streamer.is_recording());
        assert_eq!(streamer.stop_recording(), None);
        assert_eq!(streamer.current_file(), None);
    }

    #[test]
    fn test_recording_flag_toggles() {
        let (streamer, _events) = DataStreamer::new(test_config()).expect("new");
        streamer.start_recording();
        assert!(streamer.is_recording());
        streamer.stop_recording();
        assert!(!streamer.is_recording());
    }

    #[test]
    fn test_process_queues_gated_on_timestamp_queue() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        let handle = streamer
            .register_channel(int_channel("a", BufferConfig::new(4, 8)))
            .expect("register");
        let timestamp = streamer.timestamp_channel().expect("timestamp");

        // A pending sample on a data channel alone is not drained: the
        // timestamp queue is the all-channels proxy and it is empty.
        handle.sample();
        streamer.process_stream_queues();
        assert!(handle.history_snapshot().is_empty());
        assert!(handle.has_pending());

        // Once the timestamp has a pending sample, everything drains.
        timestamp.sample();
        streamer.process_stream_queues();
        assert_eq!(handle.history_snapshot(), vec![42]);
        assert!(!handle.has_pending());
        assert!(!timestamp.has_pending());
        assert_eq!(timestamp.history_snapshot().len(), 1);
    }

    #[test]
    fn test_relative_timestamp_starts_near_zero() {
        let (mut streamer, _events) = DataStreamer::new(test_config()).expect("new");
        streamer
            .register_channel(int_channel("a", BufferConfig::new(4, 8)))
            .expect("register");
        let timestamp = streamer.timestamp_channel().expect("timestamp");

        timestamp.sample();
        let value = timestamp.latest().expect("sampled");
        assert!((0.0..1.0).contains(&value));
    }

    #[test]
    fn test_absolute_timestamp_is_epoch_scale() {
        let config = StreamConfig {
            tick_interval: Duration::from_millis(1),
            use_absolute_timestamp: true,
            ..Default::default()
        };
        let (mut streamer, _events) = DataStreamer::new(config).expect("new");
        streamer
            .register_channel(int_channel("a", BufferConfig::new(4, 8)))
            .expect("register");
        let timestamp = streamer.timestamp_channel().expect("timestamp");

        timestamp.sample();
        let value = timestamp.latest().expect("sampled");
        // Well past 2001-09-09 in epoch seconds.
        assert!(value > 1_000_000_000.0);
    }
}
