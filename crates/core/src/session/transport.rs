use std::net::SocketAddr;

use crate::error::Result;
use crate::media::MediaKind;
use crate::media::rtp::{RtpState, fragment};
use crate::transport::udp::RtpSocketPair;

/// Client RTP port assumed for video when SETUP carries no `client_port`.
pub const DEFAULT_VIDEO_CLIENT_PORT: u16 = 8000;
/// Client RTP port assumed for audio when SETUP carries no `client_port`.
pub const DEFAULT_AUDIO_CLIENT_PORT: u16 = 8002;

/// Parsed client-side transport info from the RTSP `Transport` header.
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=8000-8001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=8000-8001;server_port=40312-40313
/// ```
///
/// Only `RTP/AVP` over UDP is served; interleaved TCP is detected so the
/// handler can refuse it (RFC 2326 §10.12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    /// `(rtp, rtcp)` from `client_port=`, when present and numeric.
    pub client_ports: Option<(u16, u16)>,
    /// Client asked for `RTP/AVP/TCP` or `interleaved=` channels.
    pub interleaved: bool,
}

impl TransportHeader {
    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// `client_port=N` without an RTCP half implies `N+1`.
    ///
    /// ## Examples
    ///
    /// ```
    /// use camrtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
    /// assert_eq!(th.client_ports, Some((8000, 8001)));
    /// assert!(!th.interleaved);
    ///
    /// assert_eq!(TransportHeader::parse("RTP/AVP;unicast").client_ports, None);
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut client_ports = None;
        let mut interleaved = false;

        for part in header.split(';') {
            let part = part.trim();
            if part.eq_ignore_ascii_case("RTP/AVP/TCP") || part.starts_with("interleaved=") {
                interleaved = true;
            } else if let Some(ports) = part.strip_prefix("client_port=") {
                let mut halves = ports.splitn(2, '-');
                let rtp = halves.next().and_then(|p| p.trim().parse::<u16>().ok());
                let rtcp = halves.next().and_then(|p| p.trim().parse::<u16>().ok());
                client_ports = match (rtp, rtcp) {
                    (Some(rtp), Some(rtcp)) => Some((rtp, rtcp)),
                    (Some(rtp), None) => Some((rtp, rtp.wrapping_add(1))),
                    _ => None,
                };
            }
        }

        TransportHeader {
            client_ports,
            interleaved,
        }
    }
}

/// Outcome of sending one access unit to one track.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub packets: usize,
    /// Payload bytes (excluding RTP headers) that reached the socket.
    pub bytes: usize,
    pub failures: usize,
}

/// RTP transport state of one track (video or audio) of one session.
///
/// Created during SETUP; mutated afterwards only by the broadcast pump of
/// its media kind while it holds the registry lock.
#[derive(Debug)]
pub struct RtpTrack {
    pub kind: MediaKind,
    rtp: RtpState,
    sockets: RtpSocketPair,
    /// Client RTP receive address (`client_ip:client_rtp_port`).
    pub client_rtp: SocketAddr,
    /// Client RTCP address (unused: no RTCP is sent).
    pub client_rtcp: SocketAddr,
    pub server_rtp_port: u16,
    pub server_rtcp_port: u16,
}

impl RtpTrack {
    /// Create a track with a random SSRC, sequence and timestamp.
    pub fn new(
        kind: MediaKind,
        sockets: RtpSocketPair,
        client_rtp: SocketAddr,
        client_rtcp: SocketAddr,
    ) -> Result<Self> {
        let (server_rtp_port, server_rtcp_port) = sockets.ports()?;
        Ok(Self {
            kind,
            rtp: RtpState::random(),
            sockets,
            client_rtp,
            client_rtcp,
            server_rtp_port,
            server_rtcp_port,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.rtp.ssrc
    }

    /// Sequence number of the next packet (for `RTP-Info`).
    pub fn sequence(&self) -> u16 {
        self.rtp.sequence()
    }

    /// Timestamp of the next packet (for `RTP-Info`).
    pub fn timestamp(&self) -> u32 {
        self.rtp.timestamp()
    }

    /// `Transport` response header value.
    pub fn transport_header(&self) -> String {
        format!(
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
            self.client_rtp.port(),
            self.client_rtcp.port(),
            self.server_rtp_port,
            self.server_rtcp_port
        )
    }

    /// Chunk `data`, send one RTP packet per chunk, marker on the last.
    ///
    /// Send failures are logged and counted but never abort the unit:
    /// RTP over UDP is best-effort. Every packet built consumes a sequence
    /// number, so a failed send shows up to the client as loss.
    pub fn send_access_unit(
        &mut self,
        payload_type: u8,
        data: &[u8],
        max_packet_size: usize,
    ) -> SendReport {
        let mut report = SendReport::default();
        let max_payload = max_packet_size.saturating_sub(crate::media::rtp::RTP_HEADER_LEN);

        for (chunk, last) in fragment(data, max_payload) {
            let packet = self.rtp.packet(payload_type, last, chunk, max_packet_size);
            report.packets += 1;
            match self.sockets.send_rtp(&packet, self.client_rtp) {
                Ok(_) => report.bytes += chunk.len(),
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        kind = %self.kind,
                        client = %self.client_rtp,
                        error = %e,
                        "RTP send failed"
                    );
                }
            }
        }

        tracing::trace!(
            kind = %self.kind,
            packets = report.packets,
            bytes = report.bytes,
            next_seq = self.rtp.sequence(),
            "access unit sent"
        );
        report
    }

    pub fn advance_timestamp(&mut self, increment: u32) {
        self.rtp.advance_timestamp(increment);
    }
}
