//! Microphone capture through cpal
//!
//! cpal streams are not `Send`, so each capture runs on its own thread that
//! owns the stream until told to stop. Samples cross to the session as
//! 16-bit PCM chunks over a channel.

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use echo_common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::capture::{AudioCapture, AudioClip, CaptureConstraints, CaptureStream, WAV_MIME};
use super::wav::{encode_wav, pcm16_chunk, PcmFormat};

/// How often the capture thread checks for a stop request
const STOP_POLL: Duration = Duration::from_millis(20);

/// Default (or named) input device
#[derive(Debug, Clone, Default)]
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

fn select_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        let mut devices = host
            .input_devices()
            .map_err(|e| Error::Permission(format!("Failed to enumerate input devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        warn!("Input device '{}' not found, falling back to default", name);
    }
    host.default_input_device()
        .ok_or_else(|| Error::Permission("No input device available".to_string()))
}

fn build_input_stream(
    device_name: Option<&str>,
    tx: mpsc::Sender<Vec<i16>>,
) -> Result<(Stream, PcmFormat)> {
    let device = select_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| Error::Permission(format!("Input device unusable: {}", e)))?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    let format = PcmFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    info!(
        "Capturing from {} ({} Hz, {} ch, {:?})",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        format.sample_rate,
        format.channels,
        sample_format
    );

    let err_fn = |err: cpal::StreamError| error!("Capture stream error: {}", err);
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = data
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let _ = tx.send(samples);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(data.to_vec());
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let samples = data.iter().map(|s| (*s as i32 - 32768) as i16).collect();
                let _ = tx.send(samples);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::Permission(format!(
                "Unsupported input sample format: {:?}",
                other
            )));
        }
    }
    .map_err(|e| Error::Permission(format!("Failed to open input stream: {}", e)))?;

    Ok((stream, format))
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        // cpal exposes no voice processing switches; the host applies its own
        debug!("Requested capture processing: {:?}", constraints);

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<PcmFormat>>();
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<i16>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("echo-capture".to_string())
            .spawn(move || {
                let (stream, format) = match build_input_stream(device_name.as_deref(), chunk_tx) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Permission(format!(
                        "Failed to start capture: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(format));

                while !stop_flag.load(Ordering::SeqCst) {
                    std::thread::sleep(STOP_POLL);
                }
                drop(stream);
                debug!("Capture thread exiting");
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn capture thread: {}", e)))?;

        let format = ready_rx
            .await
            .map_err(|_| Error::Permission("Capture thread exited early".to_string()))??;

        Ok(Box::new(CpalCaptureStream {
            rx: chunk_rx,
            stop,
            thread: Some(thread),
            format,
        }))
    }
}

struct CpalCaptureStream {
    rx: mpsc::Receiver<Vec<i16>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    format: PcmFormat,
}

impl CpalCaptureStream {
    fn drain(&self) -> Vec<Bytes> {
        self.rx.try_iter().map(|samples| pcm16_chunk(&samples)).collect()
    }

    fn join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

impl CaptureStream for CpalCaptureStream {
    fn take_chunks(&mut self) -> Vec<Bytes> {
        self.drain()
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        self.join();
        Ok(self.drain())
    }

    fn stop_tracks(&mut self) {
        self.join();
    }

    fn mime_type(&self) -> &str {
        WAV_MIME
    }

    fn assemble(&self, chunks: &[Bytes]) -> Result<AudioClip> {
        encode_wav(chunks, self.format)
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        self.join();
    }
}
