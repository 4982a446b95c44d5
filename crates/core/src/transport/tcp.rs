use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::config::StreamConfig;
use crate::error::{ParseErrorKind, RtspError};
use crate::media::h264::SharedParameterSets;
use crate::protocol::framing::{Frame, RECV_BUFFER_SIZE, RequestFramer};
use crate::protocol::{MethodHandler, Reply, RtspRequest};
use crate::session::{Session, SessionId, SessionRegistry};

/// How often the acceptor re-checks the cancellation token while idle.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Join handles of running connection threads.
pub type ConnectionHandles = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Shared state handed to every connection thread.
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: SessionRegistry,
    pub config: Arc<StreamConfig>,
    pub params: SharedParameterSets,
    pub token: CancellationToken,
}

/// Non-blocking TCP accept loop.
///
/// Checks the cancellation token between accepts with a 50ms poll interval
/// so that [`Server::stop`](crate::Server::stop) can terminate it promptly.
/// The listener is dropped (closed) when the loop exits.
pub fn accept_loop(listener: TcpListener, ctx: ConnectionContext, handles: ConnectionHandles) {
    while !ctx.token.is_cancelled() {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if let Err(e) = spawn_connection(stream, peer_addr, &ctx, &handles) {
                    tracing::warn!(%peer_addr, error = %e, "connection rejected");
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                ctx.token.wait_timeout(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                if !ctx.token.is_cancelled() {
                    tracing::warn!(error = %e, "TCP accept error");
                }
                ctx.token.wait_timeout(ACCEPT_POLL_INTERVAL);
            }
        }
        handles.lock().retain(|h| !h.is_finished());
    }
    tracing::debug!("accept loop exited");
}

/// Register a session for a freshly accepted connection and start its thread.
fn spawn_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: &ConnectionContext,
    handles: &ConnectionHandles,
) -> crate::Result<()> {
    stream.set_nonblocking(false)?;
    let control = stream
        .try_clone()
        .map_err(|e| RtspError::Resource(format!("control socket clone: {e}")))?;

    let session_id = ctx.registry.allocate_id();
    ctx.registry.insert(
        Session::new(session_id, peer_addr, ctx.config.audio_enabled).with_control(control),
    );

    let handler = MethodHandler::new(
        ctx.registry.clone(),
        ctx.config.clone(),
        ctx.params.clone(),
        session_id,
        peer_addr,
    );
    let conn = Connection {
        stream,
        framer: RequestFramer::default(),
        handler,
        registry: ctx.registry.clone(),
        session_id,
        peer_addr,
    };

    let spawned = thread::Builder::new()
        .name(format!("rtsp-session-{session_id}"))
        .spawn(move || conn.run());
    match spawned {
        Ok(handle) => {
            handles.lock().push(handle);
            tracing::info!(%peer_addr, session_id, "client connected");
            Ok(())
        }
        Err(e) => {
            ctx.registry.remove(session_id);
            Err(RtspError::Resource(format!("session thread: {e}")))
        }
    }
}

/// A single RTSP client connection with its own lifecycle.
struct Connection {
    stream: TcpStream,
    framer: RequestFramer,
    handler: MethodHandler,
    registry: SessionRegistry,
    session_id: SessionId,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Run the request loop. The session leaves the registry when the
    /// connection is dropped, including on unwind.
    fn run(mut self) {
        let reason = self.serve();
        tracing::info!(peer = %self.peer_addr, session_id = self.session_id, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn serve(&mut self) -> &'static str {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return "connection closed",
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return "read error",
            };
            self.framer.push(&buf[..n]);

            while let Some(frame) = self.framer.next_frame() {
                let reply = self.respond(frame);

                tracing::debug!(
                    peer = %self.peer_addr,
                    status = reply.response.status_code,
                    "response"
                );

                if self
                    .stream
                    .write_all(reply.response.serialize().as_bytes())
                    .is_err()
                {
                    return "write error";
                }
                if reply.close {
                    return "teardown";
                }
            }
        }
    }

    fn respond(&mut self, frame: Frame) -> Reply {
        let head = match frame {
            Frame::Request { head, .. } => head,
            Frame::Overflow => return self.reject(ParseErrorKind::RequestTooLarge),
        };
        let Ok(text) = std::str::from_utf8(&head) else {
            return self.reject(ParseErrorKind::InvalidEncoding);
        };
        match RtspRequest::parse(text) {
            Ok(request) => self.handler.handle(&request),
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                self.handler.bad_request().into()
            }
        }
    }

    fn reject(&self, kind: ParseErrorKind) -> Reply {
        let error = RtspError::Parse { kind };
        tracing::warn!(peer = %self.peer_addr, %error, "rejecting request");
        self.handler.bad_request().into()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.remove(self.session_id);
    }
}
