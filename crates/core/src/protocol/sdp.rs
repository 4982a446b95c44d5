//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- <ts> <ts> IN IP4 0.0.0.0                 ← origin (ts = unix seconds)
//! s=RTSP Session                               ← session name
//! c=IN IP4 <host>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;...           ← codec parameters
//! a=control:track0                             ← track control URL
//! m=audio 0 RTP/AVP <pt>                       ← only when audio is enabled
//! a=rtpmap:<pt> <encoding>/<rate>[/<channels>]
//! a=control:track1
//! ```

use crate::config::{AudioConfig, StreamConfig, VIDEO_CLOCK_RATE};
use crate::media::h264::ParameterSets;
use crate::media::{MediaKind, VIDEO_PAYLOAD_TYPE};

/// Generate the SDP session description for a stream.
///
/// `origin` is the Unix second count used as both session id and version.
/// `params` supplies `profile-level-id` and, once captured,
/// `sprop-parameter-sets`.
pub fn generate_sdp(config: &StreamConfig, params: &ParameterSets, origin: u64) -> String {
    let host = config.public_host.as_deref().unwrap_or("0.0.0.0");
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o=- {origin} {origin} IN IP4 0.0.0.0"));
    sdp.push("s=RTSP Session".to_string());
    sdp.push(format!("c=IN IP4 {host}"));
    sdp.push("t=0 0".to_string());

    sdp.push(format!("m=video 0 RTP/AVP {VIDEO_PAYLOAD_TYPE}"));
    sdp.push(format!(
        "a=rtpmap:{VIDEO_PAYLOAD_TYPE} {}/{VIDEO_CLOCK_RATE}",
        config.video_config.codec_type.encoding_name()
    ));
    sdp.push(format!("a=fmtp:{VIDEO_PAYLOAD_TYPE} {}", params.fmtp()));
    sdp.push(format!("a=control:{}", MediaKind::Video.control()));

    if config.audio_enabled {
        sdp.extend(audio_section(&config.audio_config));
    }

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

fn audio_section(audio: &AudioConfig) -> [String; 3] {
    let pt = audio.codec_type.payload_type();
    let mut rtpmap = format!(
        "a=rtpmap:{pt} {}/{}",
        audio.codec_type.encoding_name(),
        audio.sample_rate
    );
    if audio.channels > 1 {
        rtpmap.push_str(&format!("/{}", audio.channels));
    }
    [
        format!("m=audio 0 RTP/AVP {pt}"),
        rtpmap,
        format!("a=control:{}", MediaKind::Audio.control()),
    ]
}
