/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Server: camrtsp/0.1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: chain [`with_cseq`](Self::with_cseq),
/// [`add_header`](Self::add_header) and [`with_body`](Self::with_body), then
/// call [`serialize`](Self::serialize). `CSeq` always comes first, followed
/// by `Server`; `Content-Length` is computed automatically when a body is
/// present.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub cseq: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "camrtsp/0.1";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            cseq: None,
            headers: Vec::new(),
            body: None,
        }
    }

    /// 200 OK: success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request: malformed or missing required header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 405 Method Not Allowed: unknown method, or not valid in the
    /// session's current state.
    pub fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed")
    }

    /// 461 Unsupported Transport: e.g. TCP-interleaved (RFC 2326 §11.3.13).
    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    /// 500 Internal Server Error: resource allocation failed.
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    pub fn with_cseq(mut self, cseq: &str) -> Self {
        self.cseq = Some(cseq.to_string());
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        if let Some(cseq) = &self.cseq {
            response.push_str(&format!("CSeq: {}\r\n", cseq));
        }
        response.push_str(&format!("Server: {}\r\n", SERVER_AGENT));

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = RtspResponse::ok()
            .with_cseq("1")
            .add_header("Public", "OPTIONS");
        let s = resp.serialize();
        assert_eq!(
            s,
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nServer: camrtsp/0.1\r\nPublic: OPTIONS\r\n\r\n"
        );
    }

    #[test]
    fn serialize_with_body() {
        let resp = RtspResponse::ok()
            .with_cseq("2")
            .with_body("v=0\r\n".to_string());
        let s = resp.serialize();
        assert!(s.contains("Server: camrtsp/0.1\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn cseq_precedes_server() {
        let s = RtspResponse::method_not_allowed().with_cseq("7").serialize();
        let cseq = s.find("CSeq: 7").unwrap();
        let server = s.find("Server:").unwrap();
        assert!(cseq < server);
        assert!(s.starts_with("RTSP/1.0 405 Method Not Allowed\r\n"));
    }

    #[test]
    fn error_status_lines() {
        assert!(RtspResponse::bad_request().serialize().starts_with("RTSP/1.0 400 Bad Request\r\n"));
        assert!(
            RtspResponse::unsupported_transport()
                .serialize()
                .starts_with("RTSP/1.0 461 Unsupported Transport\r\n")
        );
        assert_eq!(RtspResponse::internal_error().status_code, 500);
    }
}
