use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::StreamConfig;
use crate::media::MediaKind;
use crate::media::h264::SharedParameterSets;
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::session::transport::{DEFAULT_AUDIO_CLIENT_PORT, DEFAULT_VIDEO_CLIENT_PORT};
use crate::session::{
    InvalidTransition, RtpTrack, SessionId, SessionRegistry, SessionState, TransportHeader,
};
use crate::transport::udp::RtpSocketPair;

/// Methods advertised in the OPTIONS `Public` header.
pub const PUBLIC_METHODS: &str = "DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE";

/// Response to one request, plus whether the connection ends after it.
#[derive(Debug)]
pub struct Reply {
    pub response: RtspResponse,
    /// Set after TEARDOWN: the connection thread writes the response and exits.
    pub close: bool,
}

impl From<RtspResponse> for Reply {
    fn from(response: RtspResponse) -> Self {
        Reply {
            response,
            close: false,
        }
    }
}

/// Handles RTSP method requests for a single TCP connection.
///
/// Every connection owns exactly one session, registered on accept. The
/// handler drives that session through its state machine and keeps the
/// connection's CSeq echo value.
pub struct MethodHandler {
    registry: SessionRegistry,
    config: Arc<StreamConfig>,
    params: SharedParameterSets,
    session_id: SessionId,
    peer_addr: SocketAddr,
    /// Last CSeq seen on this connection, echoed when a request has none.
    cseq: String,
}

impl MethodHandler {
    pub fn new(
        registry: SessionRegistry,
        config: Arc<StreamConfig>,
        params: SharedParameterSets,
        session_id: SessionId,
        peer_addr: SocketAddr,
    ) -> Self {
        MethodHandler {
            registry,
            config,
            params,
            session_id,
            peer_addr,
            cseq: "0".to_string(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The CSeq that will be echoed if the next request omits one.
    pub fn cseq(&self) -> &str {
        &self.cseq
    }

    pub fn handle(&mut self, request: &RtspRequest) -> Reply {
        if let Some(cseq) = request.cseq() {
            self.cseq = cseq.to_string();
        }
        tracing::debug!(
            session_id = self.session_id,
            method = %request.method,
            uri = %request.uri,
            cseq = %self.cseq,
            "RTSP request"
        );

        match &request.method {
            Method::Options => self.handle_options().into(),
            Method::Describe => self.handle_describe(&request.uri).into(),
            Method::Setup => self.handle_setup(request).into(),
            Method::Play => self.handle_play(&request.uri).into(),
            Method::Pause => self.handle_pause().into(),
            Method::Teardown => self.handle_teardown(),
            Method::GetParameter | Method::SetParameter => self.handle_parameter().into(),
            Method::Other(name) => {
                tracing::warn!(method = %name, cseq = %self.cseq, "unsupported RTSP method");
                self.method_not_allowed().into()
            }
        }
    }

    /// Response for a request that could not be parsed or framed.
    pub fn bad_request(&self) -> RtspResponse {
        RtspResponse::bad_request().with_cseq(&self.cseq)
    }

    fn handle_options(&self) -> RtspResponse {
        RtspResponse::ok()
            .with_cseq(&self.cseq)
            .add_header("Public", PUBLIC_METHODS)
    }

    fn handle_describe(&self, uri: &str) -> RtspResponse {
        if self
            .registry
            .with_session(self.session_id, |s| s.uri = uri.to_string())
            .is_none()
        {
            return self.session_gone();
        }

        let origin = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let body = sdp::generate_sdp(&self.config, &self.params.read(), origin);

        RtspResponse::ok()
            .with_cseq(&self.cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", uri)
            .with_body(body)
    }

    fn handle_setup(&self, request: &RtspRequest) -> RtspResponse {
        let Some(transport) = request.get_header("Transport") else {
            tracing::warn!(cseq = %self.cseq, "SETUP missing Transport header");
            return self.bad_request();
        };
        let transport = TransportHeader::parse(transport);

        // Only RTP/AVP over UDP is served (RFC 2326 §10.12).
        if transport.interleaved {
            tracing::warn!(cseq = %self.cseq, "client requested interleaved TCP transport");
            return RtspResponse::unsupported_transport()
                .with_cseq(&self.cseq)
                .add_header("Unsupported", "RTP/AVP/TCP");
        }

        match self.registry.state(self.session_id) {
            None => return self.session_gone(),
            Some(SessionState::Playing) => {
                tracing::warn!(session_id = self.session_id, "SETUP refused while playing");
                return self.method_not_allowed();
            }
            Some(_) => {}
        }

        let kind = if self.config.audio_enabled && request.uri.contains("track1") {
            MediaKind::Audio
        } else {
            MediaKind::Video
        };
        let (client_rtp_port, client_rtcp_port) = transport.client_ports.unwrap_or(match kind {
            MediaKind::Video => (DEFAULT_VIDEO_CLIENT_PORT, DEFAULT_VIDEO_CLIENT_PORT + 1),
            MediaKind::Audio => (DEFAULT_AUDIO_CLIENT_PORT, DEFAULT_AUDIO_CLIENT_PORT + 1),
        });
        let client_rtp = SocketAddr::new(self.peer_addr.ip(), client_rtp_port);
        let client_rtcp = SocketAddr::new(self.peer_addr.ip(), client_rtcp_port);

        let track = match RtpSocketPair::bind(&self.config.bind_host)
            .and_then(|sockets| RtpTrack::new(kind, sockets, client_rtp, client_rtcp))
        {
            Ok(track) => track,
            Err(e) => {
                tracing::error!(session_id = self.session_id, %kind, error = %e, "failed to allocate RTP sockets");
                return RtspResponse::internal_error().with_cseq(&self.cseq);
            }
        };

        let transport_response = track.transport_header();
        let ssrc = track.ssrc();
        let server_rtp_port = track.server_rtp_port;

        match self
            .registry
            .with_session(self.session_id, |s| s.setup_track(track))
        {
            None => self.session_gone(),
            Some(Err(e)) => {
                tracing::warn!(session_id = self.session_id, error = %e, "SETUP rejected");
                self.method_not_allowed()
            }
            Some(Ok(())) => {
                tracing::info!(
                    session_id = self.session_id,
                    %kind,
                    %client_rtp,
                    server_rtp_port,
                    ssrc = %format!("{ssrc:#010x}"),
                    "track set up"
                );
                RtspResponse::ok()
                    .with_cseq(&self.cseq)
                    .add_header("Transport", &transport_response)
                    .add_header("Session", &self.session_id.to_string())
            }
        }
    }

    fn handle_play(&self, request_uri: &str) -> RtspResponse {
        let outcome = self.registry.with_session(self.session_id, |s| {
            s.play()?;
            let base = if s.uri.is_empty() { request_uri } else { s.uri.as_str() };
            let base = base.trim_end_matches('/');
            let rtp_info = [MediaKind::Video, MediaKind::Audio]
                .into_iter()
                .filter_map(|kind| {
                    s.track(kind).map(|t| {
                        format!(
                            "url={base}/{};seq={};rtptime={}",
                            kind.control(),
                            t.sequence(),
                            t.timestamp()
                        )
                    })
                })
                .collect::<Vec<_>>()
                .join(",");
            Ok::<_, InvalidTransition>(rtp_info)
        });

        match outcome {
            None => self.session_gone(),
            Some(Err(e)) => {
                tracing::warn!(session_id = self.session_id, error = %e, "PLAY rejected");
                self.method_not_allowed()
            }
            Some(Ok(rtp_info)) => {
                tracing::info!(session_id = self.session_id, "session started playing");
                let mut resp = RtspResponse::ok()
                    .with_cseq(&self.cseq)
                    .add_header("Session", &self.session_id.to_string())
                    .add_header("Range", "npt=0.000-");
                if !rtp_info.is_empty() {
                    resp = resp.add_header("RTP-Info", &rtp_info);
                }
                resp
            }
        }
    }

    fn handle_pause(&self) -> RtspResponse {
        match self.registry.with_session(self.session_id, |s| s.pause()) {
            None => self.session_gone(),
            Some(Err(e)) => {
                tracing::warn!(session_id = self.session_id, error = %e, "PAUSE rejected");
                self.method_not_allowed()
            }
            Some(Ok(())) => {
                tracing::info!(session_id = self.session_id, "session paused");
                RtspResponse::ok()
                    .with_cseq(&self.cseq)
                    .add_header("Session", &self.session_id.to_string())
            }
        }
    }

    /// Always succeeds: the session is removed (closing its UDP sockets)
    /// before the response is written.
    fn handle_teardown(&self) -> Reply {
        self.registry.remove(self.session_id);
        tracing::info!(session_id = self.session_id, "session terminated via TEARDOWN");
        Reply {
            response: RtspResponse::ok()
                .with_cseq(&self.cseq)
                .add_header("Session", &self.session_id.to_string()),
            close: true,
        }
    }

    /// GET_PARAMETER / SET_PARAMETER are keep-alives (RFC 2326 §10.8).
    fn handle_parameter(&self) -> RtspResponse {
        tracing::trace!(cseq = %self.cseq, "parameter keepalive");
        RtspResponse::ok()
            .with_cseq(&self.cseq)
            .add_header("Session", &self.session_id.to_string())
    }

    fn method_not_allowed(&self) -> RtspResponse {
        RtspResponse::method_not_allowed().with_cseq(&self.cseq)
    }

    /// The session was removed under us (server shutting down).
    fn session_gone(&self) -> RtspResponse {
        tracing::warn!(session_id = self.session_id, "request for a session no longer registered");
        RtspResponse::internal_error().with_cseq(&self.cseq)
    }
}
