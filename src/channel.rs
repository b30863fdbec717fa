//! Channels: named, independently buffered data sources
//!
//! A [`Channel`] owns the double buffer for one data stream:
//!
//! - a bounded **raw intake queue** fed by the sampling loop. The overflow
//!   policy is drop-and-reset: a sample arriving at a full queue discards the
//!   entire queue before being enqueued, bounding memory and signalling that
//!   processing has fallen behind;
//! - a fixed-capacity **history ring** of processed samples, filled by
//!   draining the raw queue through the channel's optional transform.
//!
//! The sampling loop pushes into the raw queue while an external consumer
//! drains it on its own schedule, so both sides go through one mutex per
//! channel, held for the whole push or the whole drain. The latest raw sample
//! and the renderer read live under the same exclusive region.
//!
//! Value production and text rendering are external capabilities, modeled as
//! the [`Sampler`] and [`Renderer`] traits. Both have blanket impls for plain
//! closures, so a channel is typically built from a `FnMut() -> T` and either
//! a `Fn(&T) -> String` or [`DisplayRenderer`].

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::BufferConfig;
use crate::error::Result;

/// Produces a new sample value each time it is invoked.
///
/// Invoked once per accepted tick by the sampling loop. Sampling is
/// infallible by contract; a supplier that can fail must decide on a
/// fallback value itself.
pub trait Sampler<T>: Send {
    /// Produce the next value
    fn sample(&mut self) -> T;
}

impl<T, F> Sampler<T> for F
where
    F: FnMut() -> T + Send,
{
    fn sample(&mut self) -> T {
        self()
    }
}

/// Renders a sampled value as its text form for CSV cells
pub trait Renderer<T>: Send + Sync {
    /// Produce the text representation of a value
    fn render(&self, value: &T) -> String;
}

impl<T, F> Renderer<T> for F
where
    F: Fn(&T) -> String + Send + Sync,
{
    fn render(&self, value: &T) -> String {
        self(value)
    }
}

/// Renderer that formats values through their [`Display`] impl
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayRenderer;

impl<T: Display> Renderer<T> for DisplayRenderer {
    fn render(&self, value: &T) -> String {
        value.to_string()
    }
}

/// Mutable channel state guarded by the channel's single mutex.
///
/// The sampler lives here because sampling mutates both it and the queue in
/// one step; keeping everything behind one lock makes push, drain, and render
/// mutually exclusive per channel.
struct ChannelState<T> {
    sampler: Box<dyn Sampler<T>>,
    raw: VecDeque<T>,
    latest: Option<T>,
    history: VecDeque<T>,
}

/// One named data stream with a bounded raw queue and a history ring
pub struct Channel<T> {
    name: String,
    raw_capacity: usize,
    history_capacity: usize,
    transform: Option<Box<dyn Fn(T) -> T + Send + Sync>>,
    renderer: Box<dyn Renderer<T>>,
    state: Mutex<ChannelState<T>>,
}

impl<T: Clone + Send + 'static> Channel<T> {
    /// Create a new channel
    ///
    /// Fails with `InvalidConfiguration` if either buffer capacity is zero.
    pub fn new(
        name: impl Into<String>,
        buffers: BufferConfig,
        sampler: impl Sampler<T> + 'static,
        renderer: impl Renderer<T> + 'static,
    ) -> Result<Self> {
        buffers.validate()?;
        Ok(Self {
            name: name.into(),
            raw_capacity: buffers.raw_capacity,
            history_capacity: buffers.history_capacity,
            transform: None,
            renderer: Box::new(renderer),
            state: Mutex::new(ChannelState {
                sampler: Box::new(sampler),
                raw: VecDeque::with_capacity(buffers.raw_capacity),
                latest: None,
                history: VecDeque::with_capacity(buffers.history_capacity),
            }),
        })
    }

    /// Set a pure transform applied to each value as it moves from the raw
    /// queue into history
    pub fn with_transform(mut self, transform: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Channel name, used as the CSV column header
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw intake queue capacity
    pub fn raw_capacity(&self) -> usize {
        self.raw_capacity
    }

    /// History ring capacity
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Take one sample: invoke the sampler, remember the value as the latest
    /// raw sample, and enqueue it.
    ///
    /// Overflow is drop-and-reset: if the queue is already at capacity the
    /// whole queue is discarded before the new sample is enqueued.
    pub fn sample(&self) {
        let mut state = self.state();
        let value = state.sampler.sample();
        if state.raw.len() >= self.raw_capacity {
            tracing::trace!(channel = %self.name, "raw queue full, resetting");
            state.raw.clear();
        }
        state.latest = Some(value.clone());
        state.raw.push_back(value);
    }

    /// Drain the raw queue completely into the history ring
    ///
    /// Each queued value is transformed (identity if no transform is set) and
    /// pushed onto history, evicting the oldest entry when full. The whole
    /// drain happens under one lock acquisition, so no sample is lost to or
    /// read twice by a concurrent [`Channel::sample`]. Returns immediately
    /// when the queue is empty.
    pub fn process_queue(&self) {
        let mut state = self.state();
        if state.raw.is_empty() {
            return;
        }
        while let Some(value) = state.raw.pop_front() {
            let value = match &self.transform {
                Some(f) => f(value),
                None => value,
            };
            if state.history.len() >= self.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(value);
        }
    }

    /// Render the latest raw sample as text
    ///
    /// Returns `None` before the first sample. Rows in a recording are built
    /// from this value, i.e. from the sampling path, not from processed
    /// history: whether `process_queue` has run does not change recorded
    /// output.
    pub fn render_latest(&self) -> Option<String> {
        let state = self.state();
        state.latest.as_ref().map(|v| self.renderer.render(v))
    }

    /// The latest raw sample, if any
    pub fn latest(&self) -> Option<T> {
        self.state().latest.clone()
    }

    /// Whether the raw queue holds unprocessed samples
    pub fn has_pending(&self) -> bool {
        !self.state().raw.is_empty()
    }

    /// Number of samples currently waiting in the raw queue
    pub fn pending_len(&self) -> usize {
        self.state().raw.len()
    }

    /// Copy of the processed history, oldest first
    pub fn history_snapshot(&self) -> Vec<T> {
        self.state().history.iter().cloned().collect()
    }

    fn state(&self) -> MutexGuard<'_, ChannelState<T>> {
        // A poisoning panic can only come from an external capability; the
        // buffers themselves stay consistent, so keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("raw_capacity", &self.raw_capacity)
            .field("history_capacity", &self.history_capacity)
            .finish_non_exhaustive()
    }
}

/// Type-erased channel surface used by the orchestrator
///
/// Lets the orchestrator hold channels of different value types in one
/// ordered list while driving sampling, draining, and row rendering.
pub trait StreamChannel: Send + Sync {
    /// Channel name / CSV column header
    fn name(&self) -> &str;
    /// Raw intake queue capacity
    fn raw_capacity(&self) -> usize;
    /// History ring capacity
    fn history_capacity(&self) -> usize;
    /// Take one sample (see [`Channel::sample`])
    fn sample(&self);
    /// Drain the raw queue into history (see [`Channel::process_queue`])
    fn process_queue(&self);
    /// Render the latest raw sample (see [`Channel::render_latest`])
    fn render_latest(&self) -> Option<String>;
    /// Whether unprocessed samples are pending
    fn has_pending(&self) -> bool;
}

impl<T: Clone + Send + 'static> StreamChannel for Channel<T> {
    fn name(&self) -> &str {
        Channel::name(self)
    }

    fn raw_capacity(&self) -> usize {
        Channel::raw_capacity(self)
    }

    fn history_capacity(&self) -> usize {
        Channel::history_capacity(self)
    }

    fn sample(&self) {
        Channel::sample(self)
    }

    fn process_queue(&self) {
        Channel::process_queue(self)
    }

    fn render_latest(&self) -> Option<String> {
        Channel::render_latest(self)
    }

    fn has_pending(&self) -> bool {
        Channel::has_pending(self)
    }
}
