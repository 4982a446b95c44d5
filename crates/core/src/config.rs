//! Stream configuration supplied at [`Server`](crate::Server) creation.
//!
//! These are plain value objects: the server copies them into an `Arc` on
//! construction and never mutates them afterwards. Loading them from a file
//! or the command line is the caller's business (see the `camrtsp-server`
//! binary for a `clap`-based example).

use crate::error::{Result, RtspError};
use crate::media::rtp::RTP_HEADER_LEN;

/// Default RTSP path, e.g. `rtsp://camera:554/stream`.
pub const DEFAULT_STREAM_PATH: &str = "/stream";

/// Default RTSP listen port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Default size of one RTP datagram including its 12-byte header.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

/// Largest UDP payload that fits an IPv4 datagram.
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Top-level configuration of one published stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Path component of the stream URL (must start with `/`).
    pub stream_path: String,
    /// Interface the RTSP listener binds to.
    pub bind_host: String,
    /// RTSP listen port. `0` picks an ephemeral port (useful in tests).
    pub port: u16,
    /// When `false`, [`Server::start`](crate::Server::start) refuses to run.
    pub enabled: bool,
    /// Host advertised in the SDP `c=` line and the stream URL.
    /// When `None`, SDP uses `0.0.0.0` and the URL uses the local address.
    pub public_host: Option<String>,
    /// Maximum RTP datagram size including the 12-byte header.
    pub max_packet_size: usize,
    pub video_config: VideoConfig,
    pub audio_config: AudioConfig,
    /// Publish an audio track next to the video track.
    pub audio_enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_RTSP_PORT,
            enabled: true,
            public_host: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            video_config: VideoConfig::default(),
            audio_config: AudioConfig::default(),
            audio_enabled: false,
        }
    }
}

impl StreamConfig {
    /// Reject configurations the pumps cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.stream_path.starts_with('/') {
            return Err(RtspError::InvalidConfig(format!(
                "stream path {:?} must start with '/'",
                self.stream_path
            )));
        }
        if self.video_config.codec_type != VideoCodec::H264 {
            return Err(RtspError::InvalidConfig(format!(
                "video codec {:?} is not supported, only H.264 is streamed",
                self.video_config.codec_type
            )));
        }
        if self.video_config.fps == 0 {
            return Err(RtspError::InvalidConfig("video fps must be non-zero".into()));
        }
        if self.max_packet_size <= RTP_HEADER_LEN || self.max_packet_size > MAX_UDP_PAYLOAD {
            return Err(RtspError::InvalidConfig(format!(
                "max packet size {} must be in {}..={}",
                self.max_packet_size,
                RTP_HEADER_LEN + 1,
                MAX_UDP_PAYLOAD
            )));
        }
        if self.audio_enabled && self.audio_config.sample_rate == 0 {
            return Err(RtspError::InvalidConfig("audio sample rate must be non-zero".into()));
        }
        Ok(())
    }

    /// Largest payload one RTP packet can carry.
    pub fn max_payload_size(&self) -> usize {
        self.max_packet_size - RTP_HEADER_LEN
    }
}

/// Encoder parameters handed to [`VideoPipeline::open`](crate::pipeline::VideoPipeline::open).
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in kbit/s.
    pub bitrate: u32,
    pub gop_size: u32,
    pub profile: VideoProfile,
    pub codec_type: VideoCodec,
    pub br_mode: BitrateMode,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 25,
            bitrate: 2000,
            gop_size: 50,
            profile: VideoProfile::Main,
            codec_type: VideoCodec::H264,
            br_mode: BitrateMode::Cbr,
        }
    }
}

impl VideoConfig {
    /// RTP timestamp increment per access unit on the 90 kHz video clock.
    pub fn timestamp_increment(&self) -> u32 {
        VIDEO_CLOCK_RATE / self.fps.max(1)
    }
}

/// RTP clock rate for video (RFC 3551 §5).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProfile {
    Baseline,
    Main,
    High,
}

/// Encoder output format. Only H.264 passes [`StreamConfig::validate`]:
/// SDP and parameter-set capture are H.264 specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    /// Encoding name for the SDP `a=rtpmap` line.
    pub fn encoding_name(self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::H265 => "H265",
        }
    }
}

/// Encoder rate control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateMode {
    Cbr,
    Vbr,
}

/// Capture and encoder parameters handed to
/// [`AudioPipeline::open`](crate::pipeline::AudioPipeline::open).
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub codec_type: AudioCodec,
    /// Bitrate in kbit/s (AAC only).
    pub bitrate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 16,
            codec_type: AudioCodec::Pcma,
            bitrate: 64,
        }
    }
}

impl AudioConfig {
    /// RTP timestamp increment per frame, assuming fixed 20 ms framing.
    pub fn timestamp_increment(&self) -> u32 {
        self.sample_rate / 50
    }
}

/// Audio codec produced by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// G.711 μ-law.
    Pcmu,
    /// G.711 A-law.
    Pcma,
    Aac,
    /// A codec id the engine has no mapping for; sent as A-law.
    Other(u32),
}

impl AudioCodec {
    /// Map a codec name (`pcmu`, `ulaw`, `pcma`, `alaw`, `aac`).
    /// Unknown names fall back to A-law.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "pcmu" | "ulaw" | "g711u" => Self::Pcmu,
            "pcma" | "alaw" | "g711a" => Self::Pcma,
            "aac" => Self::Aac,
            other => {
                tracing::warn!(codec = other, "unknown audio codec, falling back to A-law");
                Self::Pcma
            }
        }
    }

    /// RTP payload type (RFC 3551 static types for G.711, 97 for AAC).
    pub fn payload_type(self) -> u8 {
        match self {
            Self::Pcmu => 0,
            Self::Pcma | Self::Other(_) => 8,
            Self::Aac => 97,
        }
    }

    /// Encoding name for the SDP `a=rtpmap` line.
    pub fn encoding_name(self) -> &'static str {
        match self {
            Self::Pcmu => "PCMU",
            Self::Pcma | Self::Other(_) => "PCMA",
            Self::Aac => "MPEG4-GENERIC",
        }
    }
}
