//! The background sampling loop
//!
//! One [`StreamWorker`] runs on a dedicated thread per streaming session. Each
//! tick it:
//!
//! 1. busy-polls until at least `tick_interval` has passed since the previous
//!    tick (low-latency pacing at the cost of one occupied core; the spin
//!    also watches the stop flag so shutdown is never delayed by a quiet
//!    tick);
//! 2. applies any pending recording transition: open a new CSV file when the
//!    flag turned on, close it when the flag turned off. Toggles are observed
//!    here, at tick granularity, never in the caller;
//! 3. asks the data gate whether new data is available; a `false` skips the
//!    tick entirely, with no sampling and no row;
//! 4. samples the timestamp channel and every data channel in the same
//!    logical step, which is what keeps CSV rows column-aligned;
//! 5. while recording, assembles the full row in memory and appends it with
//!    an immediate flush.
//!
//! On loop exit any open file is closed before the thread terminates.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::channel::{Channel, StreamChannel};
use crate::stream::recorder::CsvRecorder;
use crate::stream::{DataGate, SharedState, StreamEvent};

pub(crate) struct StreamWorker {
    channels: Vec<Arc<dyn StreamChannel>>,
    timestamp: Arc<Channel<f64>>,
    gate: Arc<Mutex<Box<dyn DataGate>>>,
    shared: Arc<SharedState>,
    tick_interval: Duration,
    recorder: CsvRecorder,
    events_tx: Sender<StreamEvent>,
    dropped_events: u64,
    last_tick: Instant,
}

impl StreamWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: Vec<Arc<dyn StreamChannel>>,
        timestamp: Arc<Channel<f64>>,
        gate: Arc<Mutex<Box<dyn DataGate>>>,
        shared: Arc<SharedState>,
        tick_interval: Duration,
        record_dir: Option<PathBuf>,
        record_prepend: Option<String>,
        events_tx: Sender<StreamEvent>,
    ) -> Self {
        Self {
            channels,
            timestamp,
            gate,
            shared,
            tick_interval,
            recorder: CsvRecorder::new(record_dir, record_prepend),
            events_tx,
            dropped_events: 0,
            last_tick: Instant::now(),
        }
    }

    /// Run the sampling loop until the streaming flag drops
    pub fn run(&mut self) {
        tracing::info!(interval = ?self.tick_interval, "stream worker started");

        while self.shared.streaming.load(Ordering::SeqCst) {
            if !self.pace() {
                break;
            }

            self.apply_recording_transition();

            let has_new_data = {
                let mut gate = self
                    .gate
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                gate.has_new_data()
            };
            if !has_new_data {
                continue;
            }

            self.sample_all();

            if self.recorder.is_open() {
                self.write_row();
            }
        }

        // Final cleanup: a stop while recording closes the file here.
        if self.recorder.is_open() {
            self.finish_recording();
        }
        if self.dropped_events > 0 {
            tracing::warn!(dropped = self.dropped_events, "stream events dropped");
        }
        tracing::info!("stream worker stopped");
    }

    /// Busy-poll until the next tick is due
    ///
    /// Returns `false` if the streaming flag dropped while waiting.
    fn pace(&mut self) -> bool {
        while self.last_tick.elapsed() < self.tick_interval {
            if !self.shared.streaming.load(Ordering::Relaxed) {
                return false;
            }
            std::hint::spin_loop();
        }
        self.last_tick = Instant::now();
        true
    }

    /// Open or close the recording file when the flag changed since the
    /// previous tick
    fn apply_recording_transition(&mut self) {
        let want_recording = self.shared.recording.load(Ordering::SeqCst);
        if want_recording && !self.recorder.is_open() {
            let header = {
                let override_header = self
                    .shared
                    .header_override
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                override_header.clone()
            }
            .unwrap_or_else(|| self.synthesize_header());

            match self.recorder.open(&header) {
                Ok(path) => {
                    *self
                        .shared
                        .current_file
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(path.clone());
                    self.emit(StreamEvent::RecordingStarted { path });
                }
                Err(e) => {
                    tracing::error!("failed to open recording file: {}", e);
                    self.shared.recording.store(false, Ordering::SeqCst);
                    self.emit(StreamEvent::RecordingError {
                        message: e.to_string(),
                    });
                }
            }
        } else if !want_recording && self.recorder.is_open() {
            self.finish_recording();
        }
    }

    /// Default header: timestamp column followed by every channel name in
    /// registration order
    fn synthesize_header(&self) -> String {
        let mut header = String::from(self.timestamp.name());
        for channel in &self.channels {
            header.push(',');
            header.push_str(channel.name());
        }
        header
    }

    /// Sample the timestamp and every channel in lockstep
    fn sample_all(&self) {
        self.timestamp.sample();
        for channel in &self.channels {
            channel.sample();
        }
    }

    /// Assemble and append one row
    ///
    /// The row is built completely in memory first; a missing cell aborts the
    /// tick's row rather than emitting a truncated line.
    fn write_row(&mut self) {
        let Some(mut row) = self.timestamp.render_latest() else {
            return;
        };
        for channel in &self.channels {
            match channel.render_latest() {
                Some(cell) => {
                    row.push(',');
                    row.push_str(&cell);
                }
                None => {
                    tracing::warn!(channel = channel.name(), "missing sample, row skipped");
                    return;
                }
            }
        }

        if let Err(e) = self.recorder.write_row(&row) {
            tracing::error!("failed to write row: {}", e);
            self.shared.recording.store(false, Ordering::SeqCst);
            self.emit(StreamEvent::RecordingError {
                message: e.to_string(),
            });
            self.finish_recording();
        }
    }

    /// Close the open file and publish the stop event
    fn finish_recording(&mut self) {
        let (path, rows_written) = self.recorder.close();
        *self
            .shared
            .current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(path) = path {
            self.emit(StreamEvent::RecordingStopped { path, rows_written });
        }
    }

    /// Try to publish an event, counting drops instead of blocking the loop
    fn emit(&mut self, event: StreamEvent) {
        if self.events_tx.try_send(event).is_err() {
            self.dropped_events += 1;
        }
    }
}
