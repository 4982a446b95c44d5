mod source;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use camrtsp::config::DEFAULT_MAX_PACKET_SIZE;
use camrtsp::pipeline::{audio_channel, video_channel};
use camrtsp::{
    AudioCodec, AudioConfig, AudioPipeline, CancellationToken, Server, StreamConfig, VideoConfig,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Frames buffered between a file source and its pump.
const CHANNEL_DEPTH: usize = 8;

#[derive(Clone, Copy, ValueEnum)]
enum AudioCodecArg {
    Pcma,
    Pcmu,
    Aac,
}

impl From<AudioCodecArg> for AudioCodec {
    fn from(arg: AudioCodecArg) -> Self {
        match arg {
            AudioCodecArg::Pcma => AudioCodec::Pcma,
            AudioCodecArg::Pcmu => AudioCodec::Pcmu,
            AudioCodecArg::Aac => AudioCodec::Aac,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "camrtsp-server",
    about = "RTSP server streaming an H.264 file the way an IP camera would"
)]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// RTSP port
    #[arg(long, short, default_value_t = 8554)]
    port: u16,

    /// Stream path
    #[arg(long, default_value = camrtsp::config::DEFAULT_STREAM_PATH)]
    path: String,

    /// Host advertised in SDP and the stream URL
    #[arg(long)]
    public_host: Option<String>,

    /// Annex B H.264 elementary stream
    #[arg(long)]
    video: PathBuf,

    #[arg(long, default_value_t = 25)]
    fps: u32,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Bitrate in kbit/s
    #[arg(long, default_value_t = 2000)]
    bitrate: u32,

    /// Encoded audio file (raw G.711 or AAC ADTS)
    #[arg(long)]
    audio: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = AudioCodecArg::Pcma)]
    audio_codec: AudioCodecArg,

    #[arg(long, default_value_t = 8000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 1)]
    channels: u8,

    /// Maximum RTP datagram size
    #[arg(long, default_value_t = DEFAULT_MAX_PACKET_SIZE)]
    max_packet_size: usize,

    /// Restart the files when they end
    #[arg(long = "loop")]
    repeat: bool,
}

impl Args {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            stream_path: self.path.clone(),
            bind_host: self.bind.clone(),
            port: self.port,
            public_host: self.public_host.clone(),
            max_packet_size: self.max_packet_size,
            video_config: VideoConfig {
                width: self.width,
                height: self.height,
                fps: self.fps,
                bitrate: self.bitrate,
                gop_size: self.fps * 2,
                ..VideoConfig::default()
            },
            audio_config: AudioConfig {
                sample_rate: self.sample_rate,
                channels: self.channels,
                codec_type: self.audio_codec.into(),
                ..AudioConfig::default()
            },
            audio_enabled: self.audio.is_some(),
            ..StreamConfig::default()
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("camrtsp-server: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> camrtsp::Result<()> {
    let config = args.stream_config();
    let token = CancellationToken::new();

    let (video_tx, video) = video_channel(CHANNEL_DEPTH);
    let mut sources = vec![source::spawn_video(
        &args.video,
        args.fps,
        video_tx,
        token.clone(),
        args.repeat,
    )?];

    let audio: Option<Box<dyn AudioPipeline>> = match &args.audio {
        Some(path) => {
            let (audio_tx, audio) = audio_channel(CHANNEL_DEPTH);
            sources.push(source::spawn_audio(
                path,
                &config.audio_config,
                audio_tx,
                token.clone(),
                args.repeat,
            )?);
            Some(Box::new(audio))
        }
        None => None,
    };

    let mut server = Server::new(config, Box::new(video), audio)?;
    if let Err(e) = server.start() {
        token.cancel();
        return Err(e);
    }

    println!("Streaming at {} (press Enter to stop)", server.stream_url());

    let stdin_token = token.clone();
    thread::spawn(move || {
        let mut input = String::new();
        let _ = io::stdin().read_line(&mut input);
        stdin_token.cancel();
    });

    while !token.wait_timeout(STATS_INTERVAL) {
        let stats = server.stats();
        println!(
            "sessions={} frames={} audio_frames={} bytes={}",
            stats.sessions_count, stats.frames_sent, stats.audio_frames_sent, stats.bytes_sent
        );
    }

    for handle in sources {
        let _ = handle.join();
    }
    server.stop()
}
