/// Length of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// Build one RTP packet: fixed header followed by a payload chunk.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Version is always 2; padding, extension and CSRC count are always 0.
/// The payload is truncated so the packet never exceeds `capacity` bytes.
pub fn build_packet(
    payload_type: u8,
    marker: bool,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    payload: &[u8],
    capacity: usize,
) -> Vec<u8> {
    let room = capacity.saturating_sub(RTP_HEADER_LEN);
    let payload = if payload.len() > room {
        tracing::warn!(len = payload.len(), room, "RTP payload truncated to packet capacity");
        &payload[..room]
    } else {
        payload
    };

    let mut packet = Vec::with_capacity(RTP_HEADER_LEN + payload.len());
    packet.push(2 << 6);
    packet.push(((marker as u8) << 7) | (payload_type & 0x7f));
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Split an access unit into payload chunks of at most `max_payload` bytes.
///
/// This is raw byte-stream chunking: chunk boundaries ignore NAL unit
/// boundaries. An input of length `L` yields `ceil(L / max_payload)` chunks;
/// the boolean is `true` only for the final chunk (the RTP marker).
pub fn fragment(data: &[u8], max_payload: usize) -> impl Iterator<Item = (&[u8], bool)> {
    let max_payload = max_payload.max(1);
    let count = data.len().div_ceil(max_payload);
    data.chunks(max_payload)
        .enumerate()
        .map(move |(i, chunk)| (chunk, i + 1 == count))
}

/// Per-track RTP sender state (RFC 3550 §5.1).
///
/// - **SSRC**: random, fixed for the lifetime of the track (RFC 3550 §8.1).
/// - **Sequence number**: 16-bit, random start, incremented once per packet
///   written, wrapping.
/// - **Timestamp**: 32-bit, random start, advanced once per broadcast cycle.
#[derive(Debug, Clone)]
pub struct RtpState {
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpState {
    pub fn new(ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        tracing::debug!(
            ssrc = format_args!("{:#010X}", ssrc),
            sequence,
            timestamp,
            "RTP state created"
        );
        Self {
            ssrc,
            sequence,
            timestamp,
        }
    }

    /// Random SSRC, initial sequence number and initial timestamp, as
    /// recommended by RFC 3550 §5.1 to make known-plaintext attacks harder.
    pub fn random() -> Self {
        Self::new(rand::random(), rand::random(), rand::random())
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Build the next packet of this track and advance the sequence number.
    pub fn packet(&mut self, payload_type: u8, marker: bool, payload: &[u8], capacity: usize) -> Vec<u8> {
        let packet = build_packet(
            payload_type,
            marker,
            self.sequence,
            self.timestamp,
            self.ssrc,
            payload,
            capacity,
        );
        self.sequence = self.sequence.wrapping_add(1);
        packet
    }

    /// Advance the RTP timestamp (e.g. `90000 / fps` per video frame).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}
