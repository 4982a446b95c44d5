use std::net::{IpAddr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cancel::CancellationToken;
use crate::config::StreamConfig;
use crate::error::{Result, RtspError};
use crate::media::h264::{ParameterSets, SharedParameterSets};
use crate::pipeline::{AudioPipeline, VideoPipeline};
use crate::pump::{self, PumpContext, StreamCounters};
use crate::session::SessionRegistry;
use crate::transport::tcp::{self, ConnectionContext, ConnectionHandles};

/// Snapshot of delivery statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// RTP payload bytes sent, video and audio, summed over sessions.
    pub bytes_sent: u64,
    /// Video access units broadcast.
    pub frames_sent: u64,
    pub audio_frames_sent: u64,
    /// Sessions currently registered (connected clients).
    pub sessions_count: usize,
}

/// Threads and handles that exist only while the server runs.
struct Running {
    token: CancellationToken,
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
    video_pump: JoinHandle<Box<dyn VideoPipeline>>,
    audio_pump: Option<JoinHandle<Box<dyn AudioPipeline>>>,
    connections: ConnectionHandles,
}

/// RTSP streaming server for one camera stream.
///
/// Owns the configuration, session registry, pipelines and every thread it
/// spawns. Several servers can run side by side in one process; nothing is
/// global.
///
/// ```text
/// new ──► start ──► stop ──► start ──► ... ──► destroy / drop
/// ```
///
/// While stopped the server holds its pipelines closed; while running they
/// belong to the pump threads and are handed back on [`stop`](Self::stop).
pub struct Server {
    config: Arc<StreamConfig>,
    registry: SessionRegistry,
    params: SharedParameterSets,
    counters: Arc<StreamCounters>,
    video: Option<Box<dyn VideoPipeline>>,
    audio: Option<Box<dyn AudioPipeline>>,
    running: Option<Running>,
}

impl Server {
    /// Create a stopped server.
    ///
    /// `audio` is required when `config.audio_enabled` is set and ignored
    /// otherwise.
    pub fn new(
        config: StreamConfig,
        video: Box<dyn VideoPipeline>,
        audio: Option<Box<dyn AudioPipeline>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.audio_enabled && audio.is_none() {
            return Err(RtspError::InvalidConfig(
                "audio enabled but no audio pipeline supplied".into(),
            ));
        }

        tracing::debug!(
            path = %config.stream_path,
            port = config.port,
            audio = config.audio_enabled,
            "server created"
        );

        Ok(Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            params: ParameterSets::shared(),
            counters: Arc::new(StreamCounters::new()),
            video: Some(video),
            audio,
            running: None,
        })
    }

    /// Open the pipelines, bind the listener and start every thread.
    ///
    /// On any failure everything acquired so far is released in reverse
    /// order and the server stays stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(RtspError::AlreadyRunning);
        }
        if !self.config.enabled {
            return Err(RtspError::StreamDisabled(self.config.stream_path.clone()));
        }

        let mut video = self
            .video
            .take()
            .ok_or_else(|| RtspError::video_pipeline("pipeline lost by an earlier failed start"))?;
        if let Err(e) = video.open(&self.config.video_config) {
            self.video = Some(video);
            return Err(e);
        }

        let audio = if self.config.audio_enabled {
            let Some(mut audio) = self.audio.take() else {
                self.restore(Some(video), None);
                return Err(RtspError::audio_pipeline("pipeline lost by an earlier failed start"));
            };
            if let Err(e) = audio.open(&self.config.audio_config) {
                self.audio = Some(audio);
                self.restore(Some(video), None);
                return Err(e);
            }
            Some(audio)
        } else {
            None
        };

        let (listener, local_addr) = match self.bind_listener() {
            Ok(bound) => bound,
            Err(e) => {
                self.restore(Some(video), audio);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let pump_ctx = PumpContext {
            registry: self.registry.clone(),
            config: self.config.clone(),
            counters: self.counters.clone(),
            token: token.clone(),
        };

        let params = self.params.clone();
        let ctx = pump_ctx.clone();
        let video_pump = match spawn("video-pump", move || pump::run_video(video, ctx, params)) {
            Ok(handle) => handle,
            Err(e) => {
                self.restore(None, audio);
                return Err(e);
            }
        };

        let audio_pump = match audio {
            Some(audio) => {
                let ctx = pump_ctx.clone();
                match spawn("audio-pump", move || pump::run_audio(audio, ctx)) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        self.reclaim(&token, video_pump, None);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let connections: ConnectionHandles = Arc::default();
        let conn_ctx = ConnectionContext {
            registry: self.registry.clone(),
            config: self.config.clone(),
            params: self.params.clone(),
            token: token.clone(),
        };
        let handles = connections.clone();
        let acceptor = match spawn("rtsp-acceptor", move || tcp::accept_loop(listener, conn_ctx, handles)) {
            Ok(handle) => handle,
            Err(e) => {
                self.reclaim(&token, video_pump, audio_pump);
                return Err(e);
            }
        };

        self.running = Some(Running {
            token,
            local_addr,
            acceptor,
            video_pump,
            audio_pump,
            connections,
        });

        tracing::info!(addr = %local_addr, url = %self.stream_url(), "RTSP server listening");
        Ok(())
    }

    /// Stop every thread, close the pipelines and drop all sessions.
    ///
    /// Calling `stop` on a stopped server is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        tracing::info!("server stopping");

        running.token.cancel();
        if running.acceptor.join().is_err() {
            tracing::warn!("acceptor thread panicked");
        }
        self.reclaim(&running.token, running.video_pump, running.audio_pump);

        self.registry.shutdown_all();
        let connections: Vec<_> = running.connections.lock().drain(..).collect();
        for handle in connections {
            if handle.join().is_err() {
                tracing::warn!("connection thread panicked");
            }
        }
        self.registry.clear();

        tracing::info!(
            frames_sent = self.counters.frames_sent(),
            bytes_sent = self.counters.bytes_sent(),
            "server stopped"
        );
        Ok(())
    }

    /// Stop (if running) and release everything.
    pub fn destroy(mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "error while stopping server");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address the RTSP listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            bytes_sent: self.counters.bytes_sent(),
            frames_sent: self.counters.frames_sent(),
            audio_frames_sent: self.counters.audio_frames_sent(),
            sessions_count: self.registry.len(),
        }
    }

    /// `rtsp://<host>:<port><path>` for clients to open.
    ///
    /// The host is the configured public host, else the bind address when
    /// it is specific, else the primary local IPv4 address.
    pub fn stream_url(&self) -> String {
        let host = match &self.config.public_host {
            Some(host) => host.clone(),
            None => self
                .config
                .bind_host
                .parse::<IpAddr>()
                .ok()
                .filter(|ip| !ip.is_unspecified())
                .or_else(local_ip)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
        };
        let port = self.local_addr().map_or(self.config.port, |a| a.port());
        format!("rtsp://{host}:{port}{}", self.config.stream_path)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn bind_listener(&self) -> Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind((self.config.bind_host.as_str(), self.config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        Ok((listener, local_addr))
    }

    /// Put pipelines that never reached a pump back, closing opened ones.
    fn restore(&mut self, video: Option<Box<dyn VideoPipeline>>, audio: Option<Box<dyn AudioPipeline>>) {
        if let Some(mut video) = video {
            video.close();
            self.video = Some(video);
        }
        if let Some(mut audio) = audio {
            audio.close();
            self.audio = Some(audio);
        }
    }

    /// Cancel, join the pumps and take their pipelines back.
    fn reclaim(
        &mut self,
        token: &CancellationToken,
        video_pump: JoinHandle<Box<dyn VideoPipeline>>,
        audio_pump: Option<JoinHandle<Box<dyn AudioPipeline>>>,
    ) {
        token.cancel();
        let video = video_pump
            .join()
            .map_err(|_| tracing::warn!("video pump panicked"))
            .ok();
        let audio = audio_pump.and_then(|handle| {
            handle
                .join()
                .map_err(|_| tracing::warn!("audio pump panicked"))
                .ok()
        });
        self.restore(video, audio);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "error while stopping server");
        }
    }
}

fn spawn<T, F>(name: &str, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| RtspError::Resource(format!("{name} thread: {e}")))
}

/// Primary local IPv4 address, found by routing a UDP socket (no packet
/// is sent).
fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
