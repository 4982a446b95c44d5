//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One TCP
//!   connection per client, with a thread per connection.
//!
//! - **UDP** ([`udp`]): carries RTP media packets. Every set-up track binds
//!   its own RTP/RTCP socket pair, closed when the session goes away.
//!
//! Interleaved TCP transport (RFC 2326 §10.12) is refused at SETUP.

pub mod tcp;
pub mod udp;

pub use udp::RtpSocketPair;
