//! Capture/encode pipeline interfaces consumed by the broadcast pumps.
//!
//! The engine never talks to camera hardware directly. A video source hands
//! out encoded access units, an audio source hands out encoded frames, and
//! both get every buffer back once it has been sent:
//!
//! ```text
//! open ──► next_access_unit ──► (broadcast) ──► release ──► ... ──► close
//! ```
//!
//! [`channel`] provides a ready-made implementation for producers that push
//! frames from their own thread (a hardware callback, a file reader, a test).

pub mod channel;

use std::time::Duration;

use crate::config::{AudioConfig, VideoConfig};
use crate::error::Result;

pub use channel::{
    AudioSender, ChannelAudioPipeline, ChannelVideoPipeline, VideoSender, audio_channel,
    video_channel,
};

/// One complete encoded video frame in Annex B byte-stream format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Vec<u8>,
}

impl AccessUnit {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// One encoded audio frame (nominally 20 ms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Source of encoded video, driven by the video pump.
pub trait VideoPipeline: Send {
    /// Open the encoder and request its output stream.
    fn open(&mut self, config: &VideoConfig) -> Result<()>;

    /// Non-blocking pull. `Ok(None)` means no access unit is ready yet.
    fn next_access_unit(&mut self) -> Result<Option<AccessUnit>>;

    /// Hand a unit back once every session has been served.
    fn release(&mut self, unit: AccessUnit);

    /// Cancel the stream and close the encoder.
    fn close(&mut self);
}

/// Source of encoded audio, driven by the audio pump.
pub trait AudioPipeline: Send {
    /// Open capture and the encoder.
    fn open(&mut self, config: &AudioConfig) -> Result<()>;

    /// Wait up to `timeout` for the next encoded frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>>;

    fn release(&mut self, frame: AudioFrame);

    /// Stop capture and close the input.
    fn close(&mut self);
}
