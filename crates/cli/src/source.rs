//! File-backed frame producers standing in for the camera encoder.

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camrtsp::media::h264::split_access_units;
use camrtsp::pipeline::{AudioSender, VideoSender};
use camrtsp::{AudioCodec, AudioConfig, CancellationToken, RtspError};

/// Audio frame duration the engine's RTP clock assumes.
const AUDIO_FRAME_INTERVAL: Duration = Duration::from_millis(20);

const ADTS_HEADER_LEN: usize = 7;

/// Stream an Annex B H.264 file into the video pipeline at `fps`.
pub fn spawn_video(
    path: &Path,
    fps: u32,
    tx: VideoSender,
    token: CancellationToken,
    repeat: bool,
) -> camrtsp::Result<JoinHandle<()>> {
    let stream = std::fs::read(path)?;
    let units = split_access_units(&stream);
    if units.is_empty() {
        return Err(RtspError::InvalidConfig(format!(
            "{}: no H.264 access units found",
            path.display()
        )));
    }
    tracing::info!(path = %path.display(), access_units = units.len(), fps, "video source loaded");

    let interval = Duration::from_secs(1) / fps.max(1);
    spawn("video-source", move || {
        play_out(&units, interval, &token, repeat, |unit| tx.try_send(unit))
    })
}

/// Stream an encoded audio file into the audio pipeline, one frame per 20 ms.
pub fn spawn_audio(
    path: &Path,
    config: &AudioConfig,
    tx: AudioSender,
    token: CancellationToken,
    repeat: bool,
) -> camrtsp::Result<JoinHandle<()>> {
    let data = std::fs::read(path)?;
    let frames = split_audio(&data, config);
    if frames.is_empty() {
        return Err(RtspError::InvalidConfig(format!(
            "{}: no audio frames found",
            path.display()
        )));
    }
    tracing::info!(path = %path.display(), frames = frames.len(), codec = ?config.codec_type, "audio source loaded");

    spawn("audio-source", move || {
        play_out(&frames, AUDIO_FRAME_INTERVAL, &token, repeat, |frame| tx.try_send(frame))
    })
}

/// Split an audio file into frames: ADTS frames for AAC, 20 ms of 8-bit
/// samples for G.711.
pub fn split_audio(data: &[u8], config: &AudioConfig) -> Vec<Vec<u8>> {
    match config.codec_type {
        AudioCodec::Aac => split_adts(data),
        _ => {
            let frame_len = (config.sample_rate / 50) as usize * config.channels.max(1) as usize;
            data.chunks(frame_len.max(1)).map(<[u8]>::to_vec).collect()
        }
    }
}

/// Split an AAC ADTS stream at its frame-length fields. Stops at the first
/// byte that is not a sync word or a frame running past the end.
pub fn split_adts(data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos + ADTS_HEADER_LEN <= data.len() {
        let header = &data[pos..pos + ADTS_HEADER_LEN];
        if header[0] != 0xFF || header[1] & 0xF0 != 0xF0 {
            tracing::warn!(offset = pos, "lost ADTS sync");
            break;
        }
        let len = ((header[3] as usize & 0x03) << 11) | ((header[4] as usize) << 3) | (header[5] as usize >> 5);
        if len < ADTS_HEADER_LEN || pos + len > data.len() {
            break;
        }
        frames.push(data[pos..pos + len].to_vec());
        pos += len;
    }
    frames
}

fn play_out(
    frames: &[Vec<u8>],
    interval: Duration,
    token: &CancellationToken,
    repeat: bool,
    mut push: impl FnMut(Vec<u8>) -> camrtsp::Result<bool>,
) {
    let mut dropped = 0u64;
    loop {
        for frame in frames {
            match push(frame.clone()) {
                Ok(true) => {}
                Ok(false) => dropped += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "source stopped");
                    return;
                }
            }
            if token.wait_timeout(interval) {
                tracing::debug!(dropped, "source cancelled");
                return;
            }
        }
        if !repeat {
            tracing::info!(dropped, "source reached end of file");
            return;
        }
    }
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> camrtsp::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| RtspError::Resource(format!("{name} thread: {e}")))
}
