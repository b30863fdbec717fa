//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll a condition until it holds or the timeout expires
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Read a recorded file as lines
pub fn read_lines(path: impl AsRef<Path>) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("read recording")
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Gate that reports new data for exactly `allowed` ticks, then never again
pub fn limited_gate(allowed: usize) -> impl FnMut() -> bool + Send {
    let granted = AtomicUsize::new(0);
    move || granted.fetch_add(1, Ordering::SeqCst) < allowed
}

/// Gate that replays a fixed true/false pattern, then reports false forever
pub fn pattern_gate(pattern: Vec<bool>) -> impl FnMut() -> bool + Send {
    let tick = Arc::new(AtomicUsize::new(0));
    move || {
        let i = tick.fetch_add(1, Ordering::SeqCst);
        pattern.get(i).copied().unwrap_or(false)
    }
}
