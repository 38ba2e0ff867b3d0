//! Silent playback backend for tests and headless runs
//!
//! Position only moves when a test says so.

use echo_common::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{AudioPlayback, PlaybackHandle};
use crate::recording::AudioClip;

#[derive(Debug, Default)]
struct HandleState {
    position: f64,
    duration: f64,
    playing: bool,
    released: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakePlayback {
    loads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    handles: Arc<Mutex<Vec<Arc<Mutex<HandleState>>>>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Handles loaded and not yet released
    pub fn live_handles(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.lock().unwrap_or_else(|e| e.into_inner()).released)
            .count()
    }

    /// Move every playing handle to its end
    pub fn finish_all(&self) {
        for handle in self.handles.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
            if state.playing {
                state.position = state.duration;
                state.playing = false;
            }
        }
    }
}

impl AudioPlayback for FakePlayback {
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>> {
        if clip.is_empty() {
            return Err(Error::Playback("Clip is empty".to_string()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);

        let state = Arc::new(Mutex::new(HandleState {
            duration: clip.duration_secs.unwrap_or(0.0),
            ..Default::default()
        }));
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&state));

        Ok(Box::new(FakeHandle {
            state,
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct FakeHandle {
    state: Arc<Mutex<HandleState>>,
    releases: Arc<AtomicUsize>,
}

impl FakeHandle {
    fn state(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackHandle for FakeHandle {
    fn play(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.released {
            return Err(Error::Playback("Handle released".to_string()));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.state().playing = false;
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.state().position = position_secs;
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.state().position
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(self.state().duration)
    }

    fn is_ended(&self) -> bool {
        let state = self.state();
        !state.playing && state.duration > 0.0 && state.position >= state.duration
    }

    fn release(&mut self) {
        let mut state = self.state();
        if !state.released {
            state.released = true;
            state.playing = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
