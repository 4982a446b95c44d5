//! Media payload handling: RTP packet construction and H.264 parameter sets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded frame is split into one or more RTP packets. Every packet
//! carries a 12-byte fixed header (see [`rtp::build_packet`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video, the sample rate for audio.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of an access unit.
//!
//! ## Payloadization
//!
//! Frames are split as raw byte streams ([`rtp::fragment`]), not NAL-aware
//! RFC 6184 fragmentation. Strict clients may reject this; it matches the
//! camera firmware this engine replaces.
//!
//! | Media | Payload type | Clock |
//! |-------|--------------|-------|
//! | H.264 | 96 (dynamic) | 90000 |
//! | G.711 μ-law | 0 | sample rate |
//! | G.711 A-law | 8 | sample rate |
//! | AAC | 97 (dynamic) | sample rate |

pub mod h264;
pub mod rtp;

/// Dynamic RTP payload type used for the video track.
pub const VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Which track of a session a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// SDP `a=control` name of the track.
    pub fn control(self) -> &'static str {
        match self {
            Self::Video => "track0",
            Self::Audio => "track1",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}
