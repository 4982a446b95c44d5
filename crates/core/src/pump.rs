//! Broadcast pumps: drain a pipeline and fan each unit out as RTP.
//!
//! One pump thread runs per enabled media type. Each cycle pulls one access
//! unit (or audio frame), then, holding the registry lock for the whole
//! fan-out, sends it to every session that is playing and has a track of
//! that kind, and advances that track's timestamp. The unit is released back
//! to the pipeline afterwards.
//!
//! The pump owns its pipeline for as long as it runs and hands it back as
//! the thread's return value, so the server can close and reopen it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::StreamConfig;
use crate::media::h264::SharedParameterSets;
use crate::media::{MediaKind, VIDEO_PAYLOAD_TYPE};
use crate::pipeline::{AudioPipeline, VideoPipeline};
use crate::session::SessionRegistry;

/// Wait between pulls when the pipeline has nothing ready.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long the audio pump blocks in [`AudioPipeline::next_frame`].
pub const AUDIO_PULL_TIMEOUT: Duration = Duration::from_millis(100);

/// Aggregate delivery counters, shared by both pumps and read by
/// [`Server::stats`](crate::Server::stats).
#[derive(Debug, Default)]
pub struct StreamCounters {
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
    audio_frames_sent: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: MediaKind, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        let frames = match kind {
            MediaKind::Video => &self.frames_sent,
            MediaKind::Audio => &self.audio_frames_sent,
        };
        frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Payload bytes that reached a socket, both media types.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Video access units pulled and broadcast.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn audio_frames_sent(&self) -> u64 {
        self.audio_frames_sent.load(Ordering::Relaxed)
    }
}

/// Result of one fan-out cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Sessions that received the unit.
    pub sessions: usize,
    pub packets: usize,
    /// Payload bytes sent, summed over sessions.
    pub bytes: usize,
    pub failures: usize,
}

/// Everything a pump thread needs besides its pipeline.
#[derive(Clone)]
pub struct PumpContext {
    pub registry: SessionRegistry,
    pub config: Arc<StreamConfig>,
    pub counters: Arc<StreamCounters>,
    pub token: CancellationToken,
}

/// Send `data` to every session eligible for `kind`, then advance each
/// served track's timestamp by `timestamp_increment`.
///
/// The registry lock is held for the whole cycle, so no SETUP, PLAY or
/// TEARDOWN can interleave with a half-sent unit.
pub fn broadcast(
    registry: &SessionRegistry,
    kind: MediaKind,
    payload_type: u8,
    data: &[u8],
    max_packet_size: usize,
    timestamp_increment: u32,
) -> FanOut {
    let mut fan_out = FanOut::default();
    let mut sessions = registry.lock();

    for session in sessions.sessions_mut() {
        let Some(track) = session.deliverable_track(kind) else {
            continue;
        };
        let report = track.send_access_unit(payload_type, data, max_packet_size);
        track.advance_timestamp(timestamp_increment);

        fan_out.sessions += 1;
        fan_out.packets += report.packets;
        fan_out.bytes += report.bytes;
        fan_out.failures += report.failures;
    }

    fan_out
}

/// Video pump body. Returns the pipeline once the token is cancelled.
pub fn run_video(
    mut pipeline: Box<dyn VideoPipeline>,
    ctx: PumpContext,
    params: SharedParameterSets,
) -> Box<dyn VideoPipeline> {
    let increment = ctx.config.video_config.timestamp_increment();
    tracing::info!(timestamp_increment = increment, "video pump started");

    while !ctx.token.is_cancelled() {
        match pipeline.next_access_unit() {
            Ok(Some(unit)) => {
                if !params.read().is_complete() {
                    params.write().observe(&unit.data);
                }

                let fan_out = broadcast(
                    &ctx.registry,
                    MediaKind::Video,
                    VIDEO_PAYLOAD_TYPE,
                    &unit.data,
                    ctx.config.max_packet_size,
                    increment,
                );
                ctx.counters.record(MediaKind::Video, fan_out.bytes);
                tracing::trace!(
                    len = unit.data.len(),
                    sessions = fan_out.sessions,
                    packets = fan_out.packets,
                    "access unit broadcast"
                );

                pipeline.release(unit);
            }
            Ok(None) => {
                ctx.token.wait_timeout(POLL_INTERVAL);
            }
            Err(e) => {
                tracing::warn!(error = %e, "video pipeline pull failed");
                ctx.token.wait_timeout(POLL_INTERVAL);
            }
        }
    }

    tracing::info!(frames_sent = ctx.counters.frames_sent(), "video pump stopped");
    pipeline
}

/// Audio pump body. Returns the pipeline once the token is cancelled.
pub fn run_audio(mut pipeline: Box<dyn AudioPipeline>, ctx: PumpContext) -> Box<dyn AudioPipeline> {
    let audio = &ctx.config.audio_config;
    let payload_type = audio.codec_type.payload_type();
    let increment = audio.timestamp_increment();
    tracing::info!(payload_type, timestamp_increment = increment, "audio pump started");

    while !ctx.token.is_cancelled() {
        match pipeline.next_frame(AUDIO_PULL_TIMEOUT) {
            Ok(Some(frame)) => {
                let fan_out = broadcast(
                    &ctx.registry,
                    MediaKind::Audio,
                    payload_type,
                    &frame.data,
                    ctx.config.max_packet_size,
                    increment,
                );
                ctx.counters.record(MediaKind::Audio, fan_out.bytes);
                tracing::trace!(
                    len = frame.data.len(),
                    sessions = fan_out.sessions,
                    "audio frame broadcast"
                );

                pipeline.release(frame);
            }
            Ok(None) => {
                ctx.token.wait_timeout(POLL_INTERVAL);
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio pipeline pull failed");
                ctx.token.wait_timeout(POLL_INTERVAL);
            }
        }
    }

    tracing::info!(audio_frames_sent = ctx.counters.audio_frames_sent(), "audio pump stopped");
    pipeline
}
