use std::net::{SocketAddr, UdpSocket};

use crate::error::{Result, RtspError};

/// Server-side RTP/RTCP socket pair for one track of one session.
///
/// Each track binds its own two ephemeral UDP sockets, so the ports
/// advertised in the SETUP `server_port` parameter are real and distinct
/// per session. RTCP is bound but carries no traffic: there is no
/// feedback loop.
///
/// This layer is address-only. It does not know about sessions. The
/// caller resolves session state to client addresses before calling
/// [`send_rtp`](Self::send_rtp). Dropping the pair closes both sockets.
#[derive(Debug)]
pub struct RtpSocketPair {
    rtp: UdpSocket,
    rtcp: UdpSocket,
}

impl RtpSocketPair {
    /// Bind an RTP and an RTCP socket on ephemeral ports of `host`.
    pub fn bind(host: &str) -> Result<Self> {
        let rtp = UdpSocket::bind((host, 0))
            .map_err(|e| RtspError::Resource(format!("RTP socket: {e}")))?;
        let rtcp = UdpSocket::bind((host, 0))
            .map_err(|e| RtspError::Resource(format!("RTCP socket: {e}")))?;
        Ok(Self { rtp, rtcp })
    }

    /// Local `(rtp, rtcp)` ports, as advertised in `server_port=`.
    pub fn ports(&self) -> Result<(u16, u16)> {
        Ok((self.rtp.local_addr()?.port(), self.rtcp.local_addr()?.port()))
    }

    /// Send one RTP packet to the client.
    pub fn send_rtp(&self, packet: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.rtp.send_to(packet, addr)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_distinct_ports() {
        let pair = RtpSocketPair::bind("127.0.0.1").unwrap();
        let (rtp, rtcp) = pair.ports().unwrap();
        assert_ne!(rtp, 0);
        assert_ne!(rtp, rtcp);
    }

    #[test]
    fn sends_to_client() {
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let pair = RtpSocketPair::bind("127.0.0.1").unwrap();
        let sent = pair.send_rtp(&[1, 2, 3], client.local_addr().unwrap()).unwrap();
        assert_eq!(sent, 3);

        let mut buf = [0u8; 16];
        let (n, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }
}
