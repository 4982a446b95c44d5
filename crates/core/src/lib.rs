pub mod cancel;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod protocol;
pub mod pump;
pub mod server;
pub mod session;
pub mod transport;

pub use cancel::CancellationToken;
pub use config::{AudioCodec, AudioConfig, StreamConfig, VideoConfig};
pub use error::{Result, RtspError};
pub use pipeline::{AccessUnit, AudioFrame, AudioPipeline, VideoPipeline};
pub use server::{Server, ServerStats};
