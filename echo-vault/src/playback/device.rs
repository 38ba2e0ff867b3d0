//! Speaker playback through cpal
//!
//! Each loaded clip gets an output thread owning the cpal stream. The
//! callback reads from shared decoded samples, resampling linearly to the
//! device rate and mapping channels by index.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use echo_common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{AudioPlayback, PlaybackHandle};
use crate::recording::wav::{decode_wav, DecodedAudio};
use crate::recording::AudioClip;

const STOP_POLL: Duration = Duration::from_millis(20);
const READY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct CpalPlayback {
    device_name: Option<String>,
}

impl CpalPlayback {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

/// State shared between the handle and the audio callback
struct Shared {
    audio: DecodedAudio,
    /// Read position in source frames
    cursor: Mutex<f64>,
    playing: AtomicBool,
    released: AtomicBool,
}

impl Shared {
    fn frames(&self) -> f64 {
        self.audio.frames() as f64
    }

    /// Fill one interleaved output frame, advancing by `step` source frames
    fn next_frame(&self, out: &mut [f32], step: f64) {
        if !self.playing.load(Ordering::Relaxed) {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let frames = self.audio.frames();
        let index = cursor.floor() as usize;
        if index >= frames {
            out.iter_mut().for_each(|s| *s = 0.0);
            self.playing.store(false, Ordering::Relaxed);
            return;
        }

        let channels = self.audio.format.channels.max(1) as usize;
        let next = (index + 1).min(frames - 1);
        let frac = (*cursor - index as f64) as f32;
        for (c, sample) in out.iter_mut().enumerate() {
            let src = c.min(channels - 1);
            let a = self.audio.samples[index * channels + src];
            let b = self.audio.samples[next * channels + src];
            *sample = a + (b - a) * frac;
        }
        *cursor += step;
    }
}

fn build_output_stream(device_name: Option<&str>, shared: Arc<Shared>) -> Result<Stream> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::Playback(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(name)),
        None => None,
    }
    .or_else(|| host.default_output_device())
    .ok_or_else(|| Error::Playback("No output device available".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| Error::Playback(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels as usize;
    let step = shared.audio.format.sample_rate as f64 / config.sample_rate.0 as f64;

    debug!(
        "Playback config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let err_fn = |err: cpal::StreamError| error!("Playback stream error: {}", err);
    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    shared.next_frame(frame, step);
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut scratch = vec![0.0f32; channels];
                for frame in data.chunks_mut(channels) {
                    shared.next_frame(&mut scratch, step);
                    for (out, s) in frame.iter_mut().zip(&scratch) {
                        *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::Playback(format!(
                "Unsupported output sample format: {:?}",
                other
            )));
        }
    }
    .map_err(|e| Error::Playback(format!("Failed to build stream: {}", e)))?;

    Ok(stream)
}

impl AudioPlayback for CpalPlayback {
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>> {
        let audio = decode_wav(&clip.bytes)?;
        if audio.frames() == 0 {
            return Err(Error::Playback("Clip contains no audio".to_string()));
        }

        let shared = Arc::new(Shared {
            audio,
            cursor: Mutex::new(0.0),
            playing: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_shared = Arc::clone(&shared);
        let device_name = self.device_name.clone();
        let thread = std::thread::Builder::new()
            .name("echo-playback".to_string())
            .spawn(move || {
                let stream = match build_output_stream(device_name.as_deref(), Arc::clone(&thread_shared)) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Playback(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while !thread_shared.released.load(Ordering::SeqCst) {
                    std::thread::sleep(STOP_POLL);
                }
                drop(stream);
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn playback thread: {}", e)))?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                shared.released.store(true, Ordering::SeqCst);
                return Err(Error::Playback("Output device did not start".to_string()));
            }
        }

        info!(
            "Loaded clip for playback ({:.1} s)",
            shared.audio.duration_secs()
        );
        Ok(Box::new(CpalHandle {
            shared,
            thread: Some(thread),
        }))
    }
}

struct CpalHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle for CpalHandle {
    fn play(&mut self) -> Result<()> {
        if self.shared.released.load(Ordering::SeqCst) {
            return Err(Error::Playback("Playback already released".to_string()));
        }
        self.shared.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        let rate = self.shared.audio.format.sample_rate as f64;
        let target = (position_secs.max(0.0) * rate).min(self.shared.frames());
        *self.shared.cursor.lock().unwrap_or_else(|e| e.into_inner()) = target;
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        let cursor = *self.shared.cursor.lock().unwrap_or_else(|e| e.into_inner());
        cursor.min(self.shared.frames()) / self.shared.audio.format.sample_rate as f64
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(self.shared.audio.duration_secs())
    }

    fn is_ended(&self) -> bool {
        let cursor = *self.shared.cursor.lock().unwrap_or_else(|e| e.into_inner());
        cursor >= self.shared.frames()
    }

    fn release(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.released.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Playback thread panicked");
            }
        }
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        self.release();
    }
}
