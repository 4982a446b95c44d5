/// Default per-connection receive buffer size.
pub const RECV_BUFFER_SIZE: usize = 4096;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// One unit produced by the [`RequestFramer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete request: head (including the blank line) and body.
    Request { head: Vec<u8>, body: Vec<u8> },
    /// The buffer filled up without a complete request. Buffered bytes
    /// were discarded.
    Overflow,
}

/// Splits the RTSP byte stream of one connection into requests.
///
/// Bytes are appended with [`push`](Self::push); [`next_frame`](Self::next_frame)
/// yields each complete request once its `\r\n\r\n` terminator (and any
/// `Content-Length` body) has arrived. Pipelined requests come out one by
/// one; unconsumed bytes stay at the front of the buffer for the next read.
///
/// If `capacity` bytes accumulate without a terminator, or a request
/// declares a head plus body larger than `capacity`, the buffer is reset.
/// That loses data, but bounds memory per connection.
#[derive(Debug)]
pub struct RequestFramer {
    buf: Vec<u8>,
    capacity: usize,
}

impl Default for RequestFramer {
    fn default() -> Self {
        Self::with_capacity(RECV_BUFFER_SIZE)
    }
}

impl RequestFramer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        // Stray CRLFs between requests are keep-alive noise.
        let leading = self
            .buf
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        if leading > 0 {
            self.buf.drain(..leading);
        }

        if let Some(pos) = find(&self.buf, TERMINATOR) {
            let head_len = pos + TERMINATOR.len();
            let body_len = content_length(&self.buf[..head_len]);
            let Some(total) = head_len
                .checked_add(body_len)
                .filter(|&total| total <= self.capacity)
            else {
                return Some(self.overflow());
            };

            if self.buf.len() < total {
                return None;
            }

            let mut head: Vec<u8> = self.buf.drain(..total).collect();
            let body = head.split_off(head_len);
            return Some(Frame::Request { head, body });
        }

        if self.buf.len() >= self.capacity {
            return Some(self.overflow());
        }
        None
    }

    fn overflow(&mut self) -> Frame {
        tracing::warn!(buffered = self.buf.len(), "RTSP receive buffer overflow, resetting");
        self.buf.clear();
        Frame::Overflow
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `Content-Length` of a request head, `0` when absent or unparsable.
fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
