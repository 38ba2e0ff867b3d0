//! WAV container helpers (hound)
//!
//! Capture streams emit raw 16-bit little-endian PCM chunks; these helpers
//! wrap them into a WAV clip and decode clips back to float samples for
//! playback.

use bytes::Bytes;
use echo_common::{Error, Result};
use std::io::Cursor;

use super::capture::{AudioClip, WAV_MIME};

/// Layout of interleaved PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encode interleaved samples as a little-endian PCM chunk
pub fn pcm16_chunk(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(out)
}

/// Wrap PCM chunks into a 16-bit WAV clip
pub fn encode_wav(chunks: &[Bytes], format: PcmFormat) -> Result<AudioClip> {
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(Error::Internal(format!("Invalid PCM format {:?}", format)));
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    let mut samples_written: u64 = 0;
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec)
            .map_err(|e| Error::Internal(format!("WAV encoding failed: {}", e)))?;
        for chunk in chunks {
            for pair in chunk.chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .map_err(|e| Error::Internal(format!("WAV encoding failed: {}", e)))?;
                samples_written += 1;
            }
        }
        writer
            .finalize()
            .map_err(|e| Error::Internal(format!("WAV encoding failed: {}", e)))?;
    }

    let frames = samples_written / format.channels as u64;
    let duration = frames as f64 / format.sample_rate as f64;
    Ok(AudioClip::new(Bytes::from(buffer), WAV_MIME).with_duration(duration))
}

/// Decoded clip as interleaved f32 samples in [-1, 1]
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub format: PcmFormat,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.format.sample_rate as f64
    }
}

/// Decode a WAV clip
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Playback(format!("Unreadable audio: {}", e)))?;
    let spec = reader.spec();
    let format = PcmFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };

    let samples: std::result::Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };

    let samples = samples.map_err(|e| Error::Playback(format!("Corrupt audio data: {}", e)))?;
    Ok(DecodedAudio { samples, format })
}
