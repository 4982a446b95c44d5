//! RTSP session state and the registry of live sessions.
//!
//! One session exists per accepted RTSP connection. It is created when the
//! connection is accepted (state `Init`), driven by the connection thread
//! through the RTSP methods, and removed from the registry on TEARDOWN,
//! connection close or read error.
//!
//! ## Session lifecycle
//!
//! ```text
//! accept          -> Init
//! SETUP (video)   -> Ready      (from Init or Ready)
//! PLAY            -> Playing    (from Ready only)
//! PAUSE           -> Ready      (from Playing only)
//! TEARDOWN        -> (removed)  (from any state)
//! TCP disconnect  -> (removed)
//! ```
//!
//! ## Locking
//!
//! All session state lives inside the [`SessionRegistry`] behind a single
//! mutex. The connection thread mutates its own entry (SETUP, PLAY, ...)
//! and the broadcast pumps walk every entry while holding the same lock for
//! a whole fan-out, so RTP sequence/timestamp fields are never written by
//! two threads at once. A slow `send_to` on one session delays SETUP/PLAY
//! handling on every other.

pub mod transport;

use std::collections::HashMap;
use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::media::MediaKind;
pub use transport::{RtpTrack, SendReport, TransportHeader};

/// Server-assigned session identifier, sent as the `Session` header.
pub type SessionId = u32;

/// RTSP session state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no video transport negotiated yet.
    Init,
    /// Video transport configured; not delivering media.
    Ready,
    /// Media is being delivered (RTP packets sent to client).
    Playing,
    /// Declared for RECORD support; never entered.
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Playing => "PLAYING",
            Self::Recording => "RECORDING",
        };
        f.write_str(name)
    }
}

/// A method was issued in a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub method: &'static str,
    pub state: SessionState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not allowed in state {}", self.method, self.state)
    }
}

/// A single RTSP client session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer_addr: SocketAddr,
    state: SessionState,
    /// URI recorded by DESCRIBE (base for `RTP-Info` URLs).
    pub uri: String,
    video: Option<RtpTrack>,
    audio: Option<RtpTrack>,
    /// Whether the audio pump may deliver to this session.
    pub audio_enabled: bool,
    active: bool,
    /// Clone of the control connection, used to unblock the connection
    /// thread on server shutdown.
    control: Option<TcpStream>,
}

impl Session {
    pub fn new(id: SessionId, peer_addr: SocketAddr, audio_enabled: bool) -> Self {
        Session {
            id,
            peer_addr,
            state: SessionState::Init,
            uri: String::new(),
            video: None,
            audio: None,
            audio_enabled,
            active: true,
            control: None,
        }
    }

    /// Attach the control connection so [`SessionRegistry::shutdown_all`]
    /// can interrupt a blocked read.
    pub fn with_control(mut self, stream: TcpStream) -> Self {
        self.control = Some(stream);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_playing(&self) -> bool {
        self.active && self.state == SessionState::Playing
    }

    pub fn track(&self, kind: MediaKind) -> Option<&RtpTrack> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
        }
    }

    /// The track a pump of `kind` should deliver to, if the session is
    /// currently eligible for that media.
    pub fn deliverable_track(&mut self, kind: MediaKind) -> Option<&mut RtpTrack> {
        if !self.is_playing() {
            return None;
        }
        match kind {
            MediaKind::Video => self.video.as_mut(),
            MediaKind::Audio if self.audio_enabled => self.audio.as_mut(),
            MediaKind::Audio => None,
        }
    }

    /// Install a freshly negotiated track (SETUP).
    ///
    /// A video track moves the session to `Ready`; an audio track leaves the
    /// state alone. SETUP is refused once the session is playing so the pump
    /// stays the only writer of live RTP state.
    pub fn setup_track(&mut self, track: RtpTrack) -> Result<(), InvalidTransition> {
        if self.state == SessionState::Playing {
            return Err(InvalidTransition {
                method: "SETUP",
                state: self.state,
            });
        }
        match track.kind {
            MediaKind::Video => {
                self.video = Some(track);
                self.transition(SessionState::Ready);
            }
            MediaKind::Audio => {
                self.audio = Some(track);
                self.audio_enabled = true;
            }
        }
        Ok(())
    }

    /// `Ready -> Playing`.
    pub fn play(&mut self) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Ready {
            return Err(InvalidTransition {
                method: "PLAY",
                state: self.state,
            });
        }
        self.transition(SessionState::Playing);
        Ok(())
    }

    /// `Playing -> Ready`.
    pub fn pause(&mut self) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Playing {
            return Err(InvalidTransition {
                method: "PAUSE",
                state: self.state,
            });
        }
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Stop delivery and interrupt the control connection.
    fn deactivate(&mut self) {
        self.active = false;
        if let Some(control) = &self.control {
            let _ = control.shutdown(Shutdown::Both);
        }
    }

    fn transition(&mut self, state: SessionState) {
        tracing::debug!(session_id = self.id, old_state = %self.state, new_state = %state, "state transition");
        self.state = state;
    }
}

/// Thread-safe registry of live sessions, keyed by [`SessionId`].
///
/// Cloning is cheap and shares the same underlying map. Ids come from a
/// per-registry counter, so independent servers never collide.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    next_id: Arc<AtomicU32>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh session id.
    pub fn allocate_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a session.
    pub fn insert(&self, session: Session) {
        let id = session.id;
        let mut sessions = self.sessions.lock();
        sessions.insert(id, session);
        tracing::debug!(session_id = id, total_sessions = sessions.len(), "session registered");
    }

    /// Remove a session; dropping it closes its RTP/RTCP sockets.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = id, total_sessions = sessions.len(), "session removed");
        }
        removed
    }

    /// Run `f` on one session under the registry lock.
    pub fn with_session<R>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.lock().get_mut(&id).map(f)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.with_session(id, |s| s.state())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold the registry lock for a whole broadcast cycle.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard(self.sessions.lock())
    }

    /// Mark every session inactive and shut down its control connection,
    /// which makes each connection thread's blocking read return.
    pub fn shutdown_all(&self) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values_mut() {
            session.deactivate();
        }
    }

    /// Drop every session (and their sockets).
    pub fn clear(&self) {
        let mut sessions = self.sessions.lock();
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            tracing::debug!(removed = count, "registry cleared");
        }
    }
}

/// Exclusive access to every session for the duration of one fan-out.
pub struct RegistryGuard<'a>(MutexGuard<'a, HashMap<SessionId, Session>>);

impl RegistryGuard<'_> {
    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.0.values_mut()
    }
}
