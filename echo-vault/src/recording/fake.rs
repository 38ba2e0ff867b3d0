//! Scripted capture device for tests and headless runs
//!
//! Every stream counts how often its track is stopped so tests can assert
//! the device is released exactly once.

use async_trait::async_trait;
use bytes::Bytes;
use echo_common::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::capture::{AudioCapture, CaptureConstraints, CaptureStream, WAV_MIME};

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    stops: AtomicUsize,
    live: AtomicUsize,
}

/// Capture device whose permission answer can be toggled
#[derive(Debug, Clone, Default)]
pub struct FakeCapture {
    deny: Arc<AtomicBool>,
    counters: Arc<Counters>,
    last_constraints: Arc<std::sync::Mutex<Option<CaptureConstraints>>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer future `open` calls with a permission error
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Total `stop_tracks` calls across every stream
    pub fn stop_calls(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        *self.last_constraints.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        *self.last_constraints.lock().unwrap_or_else(|e| e.into_inner()) = Some(*constraints);
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::Permission("Permission denied by user".to_string()));
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            counters: Arc::clone(&self.counters),
            next_chunk: 0,
            stopped: false,
        }))
    }
}

struct FakeStream {
    counters: Arc<Counters>,
    next_chunk: usize,
    stopped: bool,
}

impl FakeStream {
    fn chunk(&mut self) -> Bytes {
        self.next_chunk += 1;
        Bytes::from(format!("chunk-{};", self.next_chunk))
    }
}

impl CaptureStream for FakeStream {
    fn take_chunks(&mut self) -> Vec<Bytes> {
        if self.stopped {
            return Vec::new();
        }
        vec![self.chunk()]
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        Ok(vec![self.chunk()])
    }

    fn stop_tracks(&mut self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        if !self.stopped {
            self.stopped = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn mime_type(&self) -> &str {
        WAV_MIME
    }
}
