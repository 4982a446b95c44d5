use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

use super::{AccessUnit, AudioFrame, AudioPipeline, VideoPipeline};
use crate::config::{AudioConfig, VideoConfig};
use crate::error::{Result, RtspError};

/// Create a bounded video handoff holding at most `depth` access units.
///
/// The producer keeps the [`VideoSender`]; the [`ChannelVideoPipeline`] goes
/// to [`Server::new`](crate::Server::new).
pub fn video_channel(depth: usize) -> (VideoSender, ChannelVideoPipeline) {
    let (tx, rx) = mpsc::sync_channel(depth);
    (
        VideoSender { tx },
        ChannelVideoPipeline {
            rx,
            opened: false,
            disconnected: false,
        },
    )
}

/// Create a bounded audio handoff holding at most `depth` frames.
pub fn audio_channel(depth: usize) -> (AudioSender, ChannelAudioPipeline) {
    let (tx, rx) = mpsc::sync_channel(depth);
    (
        AudioSender { tx },
        ChannelAudioPipeline {
            rx,
            opened: false,
            disconnected: false,
        },
    )
}

/// Producer half of a [`video_channel`].
#[derive(Clone)]
pub struct VideoSender {
    tx: SyncSender<AccessUnit>,
}

impl VideoSender {
    /// Queue an access unit, blocking while the channel is full.
    pub fn send(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(AccessUnit::new(data))
            .map_err(|_| RtspError::video_pipeline("pipeline closed"))
    }

    /// Queue an access unit without blocking.
    ///
    /// Returns `Ok(false)` when the channel is full and the unit was dropped,
    /// which is what a live encoder does when nobody keeps up.
    pub fn try_send(&self, data: Vec<u8>) -> Result<bool> {
        match self.tx.try_send(AccessUnit::new(data)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(RtspError::video_pipeline("pipeline closed")),
        }
    }
}

/// Producer half of an [`audio_channel`].
#[derive(Clone)]
pub struct AudioSender {
    tx: SyncSender<AudioFrame>,
}

impl AudioSender {
    pub fn send(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(AudioFrame::new(data))
            .map_err(|_| RtspError::audio_pipeline("pipeline closed"))
    }

    pub fn try_send(&self, data: Vec<u8>) -> Result<bool> {
        match self.tx.try_send(AudioFrame::new(data)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(RtspError::audio_pipeline("pipeline closed")),
        }
    }
}

/// Consumer half of a [`video_channel`].
///
/// Once every sender is dropped the pipeline reports "no unit ready"
/// forever; the pump keeps polling until the server stops.
pub struct ChannelVideoPipeline {
    rx: Receiver<AccessUnit>,
    opened: bool,
    disconnected: bool,
}

impl VideoPipeline for ChannelVideoPipeline {
    fn open(&mut self, config: &VideoConfig) -> Result<()> {
        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate = config.bitrate,
            "video channel pipeline opened"
        );
        self.opened = true;
        Ok(())
    }

    fn next_access_unit(&mut self) -> Result<Option<AccessUnit>> {
        if !self.opened {
            return Err(RtspError::video_pipeline("pipeline not open"));
        }
        match self.rx.try_recv() {
            Ok(unit) => Ok(Some(unit)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    self.disconnected = true;
                    tracing::info!("video producer disconnected");
                }
                Ok(None)
            }
        }
    }

    fn release(&mut self, unit: AccessUnit) {
        drop(unit);
    }

    fn close(&mut self) {
        let pending = self.rx.try_iter().count();
        self.opened = false;
        tracing::debug!(discarded = pending, "video channel pipeline closed");
    }
}

/// Consumer half of an [`audio_channel`].
pub struct ChannelAudioPipeline {
    rx: Receiver<AudioFrame>,
    opened: bool,
    disconnected: bool,
}

impl AudioPipeline for ChannelAudioPipeline {
    fn open(&mut self, config: &AudioConfig) -> Result<()> {
        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            codec = ?config.codec_type,
            "audio channel pipeline opened"
        );
        self.opened = true;
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>> {
        if !self.opened {
            return Err(RtspError::audio_pipeline("pipeline not open"));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                if !self.disconnected {
                    self.disconnected = true;
                    tracing::info!("audio producer disconnected");
                }
                Ok(None)
            }
        }
    }

    fn release(&mut self, frame: AudioFrame) {
        drop(frame);
    }

    fn close(&mut self) {
        let pending = self.rx.try_iter().count();
        self.opened = false;
        tracing::debug!(discarded = pending, "audio channel pipeline closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_units_in_order() {
        let (tx, mut pipeline) = video_channel(4);
        pipeline.open(&VideoConfig::default()).unwrap();
        assert_eq!(pipeline.next_access_unit().unwrap(), None);

        tx.send(vec![1]).unwrap();
        tx.send(vec![2]).unwrap();
        assert_eq!(pipeline.next_access_unit().unwrap().unwrap().data, vec![1]);
        let unit = pipeline.next_access_unit().unwrap().unwrap();
        assert_eq!(unit.data, vec![2]);
        pipeline.release(unit);
    }

    #[test]
    fn pull_before_open_fails() {
        let (_tx, mut pipeline) = video_channel(1);
        assert!(pipeline.next_access_unit().is_err());
    }

    #[test]
    fn try_send_drops_when_full() {
        let (tx, _pipeline) = video_channel(1);
        assert!(tx.try_send(vec![1]).unwrap());
        assert!(!tx.try_send(vec![2]).unwrap());
    }

    #[test]
    fn send_after_pipeline_dropped_fails() {
        let (tx, pipeline) = audio_channel(1);
        drop(pipeline);
        assert!(tx.send(vec![0]).is_err());
    }

    #[test]
    fn disconnected_producer_reads_as_empty() {
        let (tx, mut pipeline) = audio_channel(2);
        pipeline.open(&AudioConfig::default()).unwrap();
        tx.send(vec![9; 160]).unwrap();
        drop(tx);
        let frame = pipeline.next_frame(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame.data.len(), 160);
        assert_eq!(pipeline.next_frame(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn audio_pull_times_out() {
        let (_tx, mut pipeline) = audio_channel(1);
        pipeline.open(&AudioConfig::default()).unwrap();
        assert_eq!(pipeline.next_frame(Duration::from_millis(5)).unwrap(), None);
    }
}
