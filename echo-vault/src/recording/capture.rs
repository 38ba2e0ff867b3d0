//! Microphone capture abstraction and the assembled clip type

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use echo_common::{Error, Result};
use serde::Serialize;

/// MIME type of clips produced by the device capture
pub const WAV_MIME: &str = "audio/wav";

/// Processing requested from the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureConstraints {
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    /// Preferred channel count; the device may choose otherwise
    pub channels: u16,
}

impl CaptureConstraints {
    /// Voice memo profile: all processing on, mono
    pub fn voice() -> Self {
        Self {
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
            channels: 1,
        }
    }
}

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub mime_type: String,
    /// Decoded duration, when the container reports one
    pub duration_secs: Option<f64>,
}

impl AudioClip {
    pub fn new(bytes: Bytes, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of microphone streams
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Acquire an input stream and begin chunked capture.
    ///
    /// Fails with [`echo_common::Error::Permission`] when access is denied or
    /// no input device exists.
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>>;
}

/// A live microphone stream producing encoded chunks
pub trait CaptureStream: Send {
    /// Chunks captured since the previous call, in order
    fn take_chunks(&mut self) -> Vec<Bytes>;

    /// Flush and return the final chunk(s). Capture ends.
    fn finish(&mut self) -> Result<Vec<Bytes>>;

    /// Stop every underlying track and release the device
    fn stop_tracks(&mut self);

    fn mime_type(&self) -> &str;

    /// Join chunks into a playable clip
    fn assemble(&self, chunks: &[Bytes]) -> Result<AudioClip> {
        let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            buf.extend_from_slice(chunk);
        }
        Ok(AudioClip::new(buf.freeze(), self.mime_type()))
    }
}

/// Capture for hosts without audio input; every open is a permission failure
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInputDevice;

#[async_trait]
impl AudioCapture for NoInputDevice {
    async fn open(&self, _constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        Err(Error::Permission("No input device available".to_string()))
    }
}
