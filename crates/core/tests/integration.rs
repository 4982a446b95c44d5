//! Integration tests: real RTSP clients against a running server.
//!
//! Each test starts a server on an ephemeral port of 127.0.0.1, drives it
//! over TCP and receives RTP on local UDP sockets. Frames are pushed through
//! the channel pipelines.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use camrtsp::error::PipelineStage;
use camrtsp::pipeline::{AudioSender, VideoSender, audio_channel, video_channel};
use camrtsp::{
    AccessUnit, AudioCodec, AudioConfig, AudioFrame, AudioPipeline, RtspError, Server,
    StreamConfig, VideoConfig, VideoPipeline,
};

const TIMEOUT: Duration = Duration::from_secs(2);

struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    uri: String,
}

impl Client {
    fn connect(server: &Server) -> Self {
        let addr = server.local_addr().expect("server running");
        let stream = TcpStream::connect_timeout(&addr, TIMEOUT).expect("connect to server");
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_write_timeout(Some(TIMEOUT)).unwrap();
        Client {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
            uri: format!("rtsp://{addr}/stream"),
        }
    }

    fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).unwrap();
        self.writer.flush().unwrap();
    }

    fn read_response(&mut self) -> Response {
        let mut status_line = String::new();
        self.reader.read_line(&mut status_line).unwrap();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| panic!("bad status line: {status_line:?}"));

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').unwrap();
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let mut response = Response {
            status,
            headers,
            body: String::new(),
        };
        if let Some(len) = response.header("Content-Length").and_then(|v| v.parse::<usize>().ok()) {
            let mut body = vec![0u8; len];
            self.reader.read_exact(&mut body).unwrap();
            response.body = String::from_utf8(body).unwrap();
        }
        response
    }

    fn request(&mut self, method: &str, uri: &str, cseq: u32, extra: &str) -> Response {
        self.send(&format!("{method} {uri} RTSP/1.0\r\nCSeq: {cseq}\r\n{extra}\r\n"));
        let response = self.read_response();
        assert_eq!(
            response.header("CSeq"),
            Some(cseq.to_string().as_str()),
            "{method}: CSeq must be echoed"
        );
        response
    }

    fn setup(&mut self, track: &str, cseq: u32, rtp: &UdpSocket) -> Response {
        let port = rtp.local_addr().unwrap().port();
        let uri = format!("{}/{track}", self.uri);
        self.request(
            "SETUP",
            &uri,
            cseq,
            &format!("Transport: RTP/AVP;unicast;client_port={port}-{}\r\n", port + 1),
        )
    }
}

fn test_config() -> StreamConfig {
    StreamConfig {
        bind_host: "127.0.0.1".into(),
        port: 0,
        ..StreamConfig::default()
    }
}

fn video_server(config: StreamConfig) -> (Server, VideoSender) {
    let (tx, video) = video_channel(8);
    let mut server = Server::new(config, Box::new(video), None).unwrap();
    server.start().expect("server start");
    (server, tx)
}

fn av_server(codec: AudioCodec) -> (Server, VideoSender, AudioSender) {
    let (vtx, video) = video_channel(8);
    let (atx, audio) = audio_channel(8);
    let mut config = StreamConfig {
        audio_enabled: true,
        ..test_config()
    };
    config.audio_config.codec_type = codec;
    let mut server = Server::new(config, Box::new(video), Some(Box::new(audio))).unwrap();
    server.start().expect("server start");
    (server, vtx, atx)
}

fn rtp_receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(TIMEOUT)).unwrap();
    socket
}

/// Counters are bumped after the fan-out, so a client can see a packet
/// slightly before the stats reflect it.
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

struct RtpPacket {
    marker: bool,
    payload_type: u8,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    payload_len: usize,
}

fn recv_rtp(socket: &UdpSocket) -> RtpPacket {
    let mut buf = [0u8; 2048];
    let (n, _) = socket.recv_from(&mut buf).expect("RTP packet");
    assert!(n >= 12, "short RTP packet");
    assert_eq!(buf[0], 0x80, "RTP version 2, no padding/extension/CSRC");
    RtpPacket {
        marker: buf[1] & 0x80 != 0,
        payload_type: buf[1] & 0x7f,
        sequence: u16::from_be_bytes([buf[2], buf[3]]),
        timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        payload_len: n - 12,
    }
}

#[test]
fn full_handshake_and_rtp_delivery() {
    let (mut server, tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();
    let rtp = rtp_receiver();

    let options = client.request("OPTIONS", &uri, 1, "");
    assert_eq!(options.status, 200);
    assert_eq!(options.header("Public"), Some("DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE"));
    assert_eq!(options.header("Server"), Some("camrtsp/0.1"));

    let describe = client.request("DESCRIBE", &uri, 2, "Accept: application/sdp\r\n");
    assert_eq!(describe.status, 200);
    assert_eq!(describe.header("Content-Type"), Some("application/sdp"));
    assert_eq!(
        describe.header("Content-Length"),
        Some(describe.body.len().to_string().as_str())
    );
    assert!(describe.body.starts_with("v=0\r\n"));
    assert_eq!(describe.body.matches("m=").count(), 1);
    assert!(describe.body.contains("a=rtpmap:96 H264/90000\r\n"));
    assert!(describe.body.contains("a=control:track0\r\n"));

    let setup = client.setup("track0", 3, &rtp);
    assert_eq!(setup.status, 200);
    let session = setup.header("Session").unwrap().to_string();
    assert!(setup.header("Transport").unwrap().contains(";server_port="));

    let play = client.request("PLAY", &uri, 4, &format!("Session: {session}\r\n"));
    assert_eq!(play.status, 200);
    assert_eq!(play.header("Range"), Some("npt=0.000-"));
    let rtp_info = play.header("RTP-Info").unwrap();
    assert!(rtp_info.starts_with(&format!("url={uri}/track0;seq=")));

    // 3000 bytes at the default 1500-byte packet size: 1488 + 1488 + 24.
    tx.send(vec![0xAB; 3000]).unwrap();
    let packets: Vec<_> = (0..3).map(|_| recv_rtp(&rtp)).collect();
    assert_eq!(
        packets.iter().map(|p| p.payload_len).collect::<Vec<_>>(),
        vec![1488, 1488, 24]
    );
    assert_eq!(
        packets.iter().map(|p| p.marker).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    for pair in packets.windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence.wrapping_add(1));
        assert_eq!(pair[1].timestamp, pair[0].timestamp);
        assert_eq!(pair[1].ssrc, pair[0].ssrc);
    }
    assert!(packets.iter().all(|p| p.payload_type == 96));

    tx.send(vec![0xCD; 100]).unwrap();
    let next = recv_rtp(&rtp);
    assert!(next.marker);
    assert_eq!(next.sequence, packets[2].sequence.wrapping_add(1));
    assert_eq!(next.timestamp, packets[0].timestamp.wrapping_add(90_000 / 25));

    let teardown = client.request("TEARDOWN", &uri, 5, &format!("Session: {session}\r\n"));
    assert_eq!(teardown.status, 200);
    assert_eq!(server.stats().sessions_count, 0);
    assert!(wait_until(|| server.stats().frames_sent == 2));
    assert!(wait_until(|| server.stats().bytes_sent == 3100));

    server.stop().unwrap();
}

#[test]
fn play_before_setup_is_rejected() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();

    let play = client.request("PLAY", &uri, 7, "");
    assert_eq!(play.status, 405);

    let pause = client.request("PAUSE", &uri, 8, "");
    assert_eq!(pause.status, 405);

    let unknown = client.request("RECORD", &uri, 9, "");
    assert_eq!(unknown.status, 405);

    // The connection survives every rejection.
    assert_eq!(client.request("OPTIONS", &uri, 10, "").status, 200);
    server.destroy();
}

#[test]
fn pause_stops_delivery_and_play_resumes() {
    let (server, tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();
    let rtp = rtp_receiver();

    client.setup("track0", 1, &rtp);
    client.request("PLAY", &uri, 2, "");
    tx.send(vec![1; 10]).unwrap();
    let first = recv_rtp(&rtp);

    assert_eq!(client.request("PAUSE", &uri, 3, "").status, 200);
    tx.send(vec![2; 10]).unwrap();
    rtp.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut buf = [0u8; 64];
    assert!(rtp.recv_from(&mut buf).is_err(), "no RTP while paused");

    assert_eq!(client.request("PLAY", &uri, 4, "").status, 200);
    rtp.set_read_timeout(Some(TIMEOUT)).unwrap();
    tx.send(vec![3; 10]).unwrap();
    let resumed = recv_rtp(&rtp);
    assert_eq!(resumed.sequence, first.sequence.wrapping_add(1));
    assert_eq!(resumed.timestamp, first.timestamp.wrapping_add(3600));
    server.destroy();
}

#[test]
fn audio_track_described_and_delivered() {
    let (server, _vtx, atx) = av_server(AudioCodec::Pcmu);
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();
    let video_rtp = rtp_receiver();
    let audio_rtp = rtp_receiver();

    let describe = client.request("DESCRIBE", &uri, 1, "");
    assert_eq!(describe.body.matches("m=").count(), 2);
    assert!(describe.body.contains("m=audio 0 RTP/AVP 0\r\n"));
    assert!(describe.body.contains("a=rtpmap:0 PCMU/8000\r\n"));
    assert!(describe.body.contains("a=control:track1\r\n"));

    assert_eq!(client.setup("track0", 2, &video_rtp).status, 200);
    assert_eq!(client.setup("track1", 3, &audio_rtp).status, 200);
    let play = client.request("PLAY", &uri, 4, "");
    assert!(play.header("RTP-Info").unwrap().contains("/track1;seq="));

    atx.send(vec![0x55; 160]).unwrap();
    let first = recv_rtp(&audio_rtp);
    assert_eq!(first.payload_type, 0);
    assert!(first.marker);
    assert_eq!(first.payload_len, 160);

    atx.send(vec![0x55; 160]).unwrap();
    let second = recv_rtp(&audio_rtp);
    assert_eq!(second.sequence, first.sequence.wrapping_add(1));
    assert_eq!(second.timestamp, first.timestamp.wrapping_add(8000 / 50));
    assert!(wait_until(|| server.stats().audio_frames_sent == 2));
    server.destroy();
}

#[test]
fn track1_without_audio_sets_up_video() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let rtp = rtp_receiver();
    let setup = client.setup("track1", 1, &rtp);
    assert_eq!(setup.status, 200);
    let uri = client.uri.clone();
    assert_eq!(client.request("PLAY", &uri, 2, "").status, 200);
    server.destroy();
}

#[test]
fn pipelined_and_malformed_requests() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();

    client.send(&format!(
        "OPTIONS {uri} RTSP/1.0\r\nCSeq: 1\r\n\r\nGET_PARAMETER {uri} RTSP/1.0\r\nCSeq: 2\r\n\r\n"
    ));
    let first = client.read_response();
    let second = client.read_response();
    assert_eq!(first.header("CSeq"), Some("1"));
    assert_eq!(second.header("CSeq"), Some("2"));
    assert!(second.header("Session").is_some());

    client.send("GARBAGE\r\n\r\n");
    let bad = client.read_response();
    assert_eq!(bad.status, 400);
    assert_eq!(bad.header("CSeq"), Some("2"), "previous CSeq is echoed");

    assert_eq!(client.request("OPTIONS", &uri, 3, "").status, 200);
    server.destroy();
}

#[test]
fn unbounded_content_length_is_rejected() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();
    assert!(wait_until(|| server.stats().sessions_count == 1));

    client.send("SET_PARAMETER * RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 18446744073709551615\r\n\r\n");
    assert_eq!(client.read_response().status, 400);
    assert_eq!(server.stats().sessions_count, 1);

    assert_eq!(client.request("OPTIONS", &uri, 2, "").status, 200);
    assert_eq!(server.stats().sessions_count, 1);
    server.destroy();
}

#[test]
fn full_receive_buffer_is_reset() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();

    // Exactly one buffer's worth, so nothing is left over after the reset.
    client.send(&"A".repeat(camrtsp::protocol::framing::RECV_BUFFER_SIZE));
    let rejected = client.read_response();
    assert_eq!(rejected.status, 400);
    assert_eq!(rejected.header("CSeq"), Some("0"));

    assert_eq!(client.request("OPTIONS", &uri, 1, "").status, 200);
    assert_eq!(server.stats().sessions_count, 1);
    server.destroy();
}

#[test]
fn every_playing_client_receives_each_frame() {
    let (server, tx) = video_server(test_config());

    let mut receivers = Vec::new();
    let mut clients = Vec::new();
    for cseq in 1..=3 {
        let mut client = Client::connect(&server);
        let rtp = rtp_receiver();
        let setup = client.setup("track0", cseq, &rtp);
        assert_eq!(setup.status, 200);
        receivers.push(rtp);
        clients.push(client);
    }
    for client in clients.iter_mut().take(2) {
        let uri = client.uri.clone();
        assert_eq!(client.request("PLAY", &uri, 10, "").status, 200);
    }

    let frame: Vec<u8> = (0..2000).map(|i| (i % 251) as u8).collect();
    tx.send(frame.clone()).unwrap();

    let mut ssrcs = Vec::new();
    for rtp in &receivers[..2] {
        let mut payload = Vec::new();
        let mut buf = [0u8; 2048];
        let mut first_seq = None;
        for i in 0..2u16 {
            let (n, _) = rtp.recv_from(&mut buf).expect("RTP packet");
            let seq = u16::from_be_bytes([buf[2], buf[3]]);
            let first = *first_seq.get_or_insert(seq);
            assert_eq!(seq, first.wrapping_add(i));
            assert_eq!(buf[1] & 0x80 != 0, i == 1);
            if i == 0 {
                ssrcs.push(u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]));
            }
            payload.extend_from_slice(&buf[12..n]);
        }
        assert_eq!(payload, frame);
    }
    assert_ne!(ssrcs[0], ssrcs[1]);

    receivers[2]
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut buf = [0u8; 2048];
    assert!(receivers[2].recv_from(&mut buf).is_err(), "READY client must get nothing");

    assert!(wait_until(|| server.stats().bytes_sent == 4000));
    server.destroy();
}

#[test]
fn interleaved_setup_is_refused() {
    let (server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = format!("{}/track0", client.uri);
    let setup = client.request(
        "SETUP",
        &uri,
        1,
        "Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n",
    );
    assert_eq!(setup.status, 461);
    server.destroy();
}

#[test]
fn stop_disconnects_clients() {
    let (mut server, _tx) = video_server(test_config());
    let mut client = Client::connect(&server);
    let uri = client.uri.clone();
    client.request("OPTIONS", &uri, 1, "");
    assert_eq!(server.stats().sessions_count, 1);

    server.stop().unwrap();
    assert_eq!(server.stats().sessions_count, 0);
    let mut buf = [0u8; 16];
    let read = client.reader.get_mut().read(&mut buf);
    assert!(matches!(read, Ok(0) | Err(_)), "connection must be closed");
}

#[test]
fn independent_servers_coexist() {
    let (a, _atx) = video_server(test_config());
    let (b, _btx) = video_server(test_config());
    assert_ne!(a.local_addr(), b.local_addr());

    let mut ca = Client::connect(&a);
    let mut cb = Client::connect(&b);
    let (ua, ub) = (ca.uri.clone(), cb.uri.clone());
    assert_eq!(ca.request("OPTIONS", &ua, 1, "").status, 200);
    assert_eq!(cb.request("OPTIONS", &ub, 1, "").status, 200);
    assert_eq!(a.stats().sessions_count, 1);
    assert_eq!(b.stats().sessions_count, 1);
}

/// Video pipeline that records lifecycle calls.
struct TrackedVideo {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl VideoPipeline for TrackedVideo {
    fn open(&mut self, _config: &VideoConfig) -> camrtsp::Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn next_access_unit(&mut self) -> camrtsp::Result<Option<AccessUnit>> {
        Ok(None)
    }

    fn release(&mut self, _unit: AccessUnit) {}

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct BrokenMicrophone;

impl AudioPipeline for BrokenMicrophone {
    fn open(&mut self, _config: &AudioConfig) -> camrtsp::Result<()> {
        Err(RtspError::audio_pipeline("no capture device"))
    }

    fn next_frame(&mut self, _timeout: Duration) -> camrtsp::Result<Option<AudioFrame>> {
        Ok(None)
    }

    fn release(&mut self, _frame: AudioFrame) {}

    fn close(&mut self) {}
}

#[test]
fn failed_audio_open_rolls_back_start() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let video = TrackedVideo {
        opened: opened.clone(),
        closed: closed.clone(),
    };
    let config = StreamConfig {
        audio_enabled: true,
        ..test_config()
    };
    let mut server = Server::new(config, Box::new(video), Some(Box::new(BrokenMicrophone))).unwrap();

    let err = server.start().unwrap_err();
    assert!(matches!(
        err,
        RtspError::Pipeline {
            stage: PipelineStage::Audio,
            ..
        }
    ));
    assert!(!server.is_running());
    assert!(server.local_addr().is_none());
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1, "video is closed on rollback");

    // Retrying reopens the same pipelines.
    assert!(server.start().is_err());
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[test]
fn restart_reopens_pipelines() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let video = TrackedVideo {
        opened: opened.clone(),
        closed: closed.clone(),
    };
    let mut server = Server::new(test_config(), Box::new(video), None).unwrap();

    server.start().unwrap();
    server.stop().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    server.start().unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    drop(server);
    assert_eq!(closed.load(Ordering::SeqCst), 2, "drop stops the server");
}

#[test]
fn bind_failure_keeps_server_stopped() {
    let (running, _tx) = video_server(test_config());
    let taken: SocketAddr = running.local_addr().unwrap();

    let (_tx2, video) = video_channel(1);
    let config = StreamConfig {
        port: taken.port(),
        ..test_config()
    };
    let mut server = Server::new(config, Box::new(video), None).unwrap();
    assert!(matches!(server.start(), Err(RtspError::Io(_))));
    assert!(!server.is_running());
}
