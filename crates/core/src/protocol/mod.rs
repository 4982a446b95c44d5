//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: framing the
//! byte stream into requests, parsing them, routing methods through the
//! session state machine, building responses and generating SDP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://camera/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate UDP transport for `track0` / `track1` |
//! | PLAY | §10.5 | Start media delivery |
//! | PAUSE | §10.6 | Suspend media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER / SET_PARAMETER | §10.8–10.9 | Keepalive |
//!
//! Anything else is answered `405 Method Not Allowed`.

pub mod framing;
pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use framing::{Frame, RequestFramer};
pub use handler::{MethodHandler, Reply};
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
