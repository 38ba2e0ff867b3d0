//! Recording Session: microphone capture, timed auto-stop and clip assembly

pub mod capture;
pub mod controller;
#[cfg(feature = "device-audio")]
pub mod device;
pub mod fake;
pub mod session;
pub mod wav;

pub use capture::{AudioCapture, AudioClip, CaptureConstraints, CaptureStream, NoInputDevice};
pub use controller::{RecordingController, RecordingStatus};
pub use session::{RecordedClip, RecordingPolicy, RecordingSession};
