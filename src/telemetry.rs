use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use thiserror::Error;
use tungstenite::http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use tungstenite::http::{Method, Request, StatusCode, Uri};

use crate::config::NetworkConfig;
use crate::state::{Readings, TelemetryPayload};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("network error: {0}")]
    Transport(#[from] io::Error),
    #[error("endpoint answered {status}")]
    Rejected { status: u16, body: Option<String> },
}

impl SendError {
    /// HTTP status of a rejected request, `None` for anything that never got an answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            SendError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Posts joystick readings to the control endpoint, one request per call.
pub struct TelemetryClient {
    endpoint: Uri,
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl TelemetryClient {
    pub fn new(config: &NetworkConfig) -> Result<Self, SendError> {
        let invalid = || SendError::InvalidEndpoint(config.endpoint.clone());
        let endpoint: Uri = config.endpoint.parse().map_err(|_| invalid())?;
        if endpoint.scheme_str() != Some("http") {
            return Err(invalid());
        }
        let host = endpoint.host().ok_or_else(invalid)?.to_string();
        let port = endpoint.port_u16().unwrap_or(80);

        Ok(TelemetryClient {
            endpoint,
            host,
            port,
            timeout: config.request_timeout(),
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Local address the kernel picks to reach the endpoint. Sends nothing.
    pub fn local_address(&self) -> io::Result<IpAddr> {
        let remote = self.resolve()?;
        let socket = UdpSocket::bind(if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" })?;
        socket.connect(remote)?;
        Ok(socket.local_addr()?.ip())
    }

    pub fn send(&self, readings: &Readings) -> Result<(), SendError> {
        let body = TelemetryPayload::new(readings).to_json()?;
        let request = self.build_request(body)?;

        // Dropped on every return path, closing the connection
        let mut stream = self.connect()?;
        write_request(&mut stream, &request)?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw)?;
        let (status, body) = parse_response(&raw)?;

        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(SendError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8(body).ok(),
            })
        }
    }

    fn build_request(&self, body: String) -> Result<Request<String>, SendError> {
        let authority = match self.endpoint.port_u16() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(HOST, authority)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len())
            .header(CONNECTION, "close")
            .body(body)
            .map_err(|_| SendError::InvalidEndpoint(self.endpoint.to_string()))
    }

    fn resolve(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", self.host)))
    }

    /// Tries every resolved address in turn, like `TcpStream::connect`.
    fn connect(&self) -> io::Result<TcpStream> {
        let stream = match self.timeout {
            Some(timeout) => {
                let mut last_error = None;
                let mut connected = None;
                for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                match (connected, last_error) {
                    (Some(stream), _) => stream,
                    (None, Some(e)) => return Err(e),
                    (None, None) => {
                        return Err(io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", self.host)));
                    }
                }
            }
            None => TcpStream::connect((self.host.as_str(), self.port))?,
        };
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        Ok(stream)
    }
}

fn write_request<W: Write>(out: &mut W, request: &Request<String>) -> io::Result<()> {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");

    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    for (name, value) in request.headers() {
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value.to_str().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    out.write_all(head.as_bytes())?;
    out.write_all(request.body().as_bytes())?;
    out.flush()
}

/// Splits a raw HTTP/1.x response into status and decoded body.
fn parse_response(raw: &[u8]) -> io::Result<(StatusCode, Vec<u8>)> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| malformed("no header terminator"))?;
    let head = std::str::from_utf8(&raw[..split]).map_err(|_| malformed("header is not UTF-8"))?;
    let body = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    if !parts.next().is_some_and(|v| v.starts_with("HTTP/1.")) {
        return Err(malformed("bad status line"));
    }
    let status = parts
        .next()
        .and_then(|code| StatusCode::from_bytes(code.as_bytes()).ok())
        .ok_or_else(|| malformed("bad status code"))?;

    let headers: Vec<(&str, &str)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();
    let header = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| *value)
    };

    let chunked = header(TRANSFER_ENCODING.as_str())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Ok((status, decode_chunked(body)?));
    }

    let content_length = header(CONTENT_LENGTH.as_str()).and_then(|v| v.parse::<usize>().ok());
    let body = match content_length {
        Some(len) => &body[..len.min(body.len())],
        None => body,
    };
    Ok((status, body.to_vec()))
}

fn malformed(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed response: {}", what))
}

/// Joins the chunks of a `Transfer-Encoding: chunked` body up to the last (empty) chunk.
fn decode_chunked(mut rest: &[u8]) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| malformed("truncated chunk size"))?;
        let size_line = std::str::from_utf8(&rest[..line_end]).map_err(|_| malformed("bad chunk size"))?;
        // Chunk extensions follow a ';'
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| malformed("bad chunk size"))?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if rest.len() < size {
            return Err(malformed("truncated chunk"));
        }
        body.extend_from_slice(&rest[..size]);
        rest = rest[size..].strip_prefix(b"\r\n").ok_or_else(|| malformed("missing chunk terminator"))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Accepts one connection, returns the request body, answers with `status`.
    fn mock_endpoint(status: &'static str, reply: &'static str) -> (String, JoinHandle<(String, String)>) {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reply.len(),
            reply
        );
        mock_endpoint_raw(response)
    }

    /// Same as `mock_endpoint` but writes `response` verbatim.
    fn mock_endpoint_raw(response: String) -> (String, JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/v1/remotecontrol/joysticks", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 512];
            let (head, body) = loop {
                let n = stream.read(&mut chunk).unwrap();
                raw.extend_from_slice(&chunk[..n]);
                if let Some(split) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
                    let length: usize = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length: "))
                        .unwrap()
                        .parse()
                        .unwrap();
                    while raw.len() < split + 4 + length {
                        let n = stream.read(&mut chunk).unwrap();
                        raw.extend_from_slice(&chunk[..n]);
                    }
                    break (head, String::from_utf8(raw[split + 4..split + 4 + length].to_vec()).unwrap());
                }
            };

            stream.write_all(response.as_bytes()).unwrap();
            (head, body)
        });

        (url, handle)
    }

    fn client(endpoint: String) -> TelemetryClient {
        let config = NetworkConfig {
            endpoint,
            request_timeout_ms: Some(5000),
            ..NetworkConfig::default()
        };
        TelemetryClient::new(&config).unwrap()
    }

    #[test]
    fn send_succeeds_on_200() {
        let (url, server) = mock_endpoint("200 OK", "");
        client(url).send(&[200; 8]).unwrap();

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("POST /api/v1/remotecontrol/joysticks HTTP/1.1"));
        assert!(head.contains("content-type: application/json"));

        let sent: serde_json::Value = serde_json::from_str(&body).unwrap();
        let expected: serde_json::Value =
            serde_json::from_str(r#"{"Joysticks": [200,200,200,200,200,200,200,200]}"#).unwrap();
        assert_eq!(sent, expected);
    }

    #[test]
    fn non_200_is_rejected_with_body() {
        let (url, server) = mock_endpoint("500 Internal Server Error", "boom");
        let err = client(url).send(&[10, 20, 30, 40, 50, 60, 70, -1]).unwrap_err();
        server.join().unwrap();

        assert_eq!(err.status(), Some(500));
        match err {
            SendError::Rejected { body, .. } => assert_eq!(body.as_deref(), Some("boom")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let url = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/joysticks", listener.local_addr().unwrap())
        };

        let err = client(url).send(&[0; 8]).unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn dropped_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/joysticks", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let err = client(url).send(&[0; 8]).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, SendError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn endpoint_must_be_http() {
        for endpoint in ["https://example.com/x", "not a url", "/relative/path"] {
            let config = NetworkConfig { endpoint: endpoint.to_string(), ..NetworkConfig::default() };
            assert!(matches!(TelemetryClient::new(&config), Err(SendError::InvalidEndpoint(_))), "{}", endpoint);
        }
    }

    #[test]
    fn parse_response_truncates_to_content_length() {
        let raw = b"HTTP/1.1 404 Not Found\r\ncontent-length: 3\r\n\r\nabcdef";
        let (status, body) = parse_response(raw).unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"abc");

        assert!(parse_response(b"garbage").is_err());
        assert!(parse_response(b"SMTP 200\r\n\r\n").is_err());
    }

    #[test]
    fn parse_response_decodes_chunked_body() {
        let raw = b"HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n11\r\n{\"isSuccess\":false}\r\n0\r\n\r\n";
        let (status, body) = parse_response(raw).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, br#"{"isSuccess":false}"#);

        let split = b"HTTP/1.1 500 Oops\r\ntransfer-encoding: chunked\r\n\r\n4;ext=1\r\nboom\r\n2\r\n!!\r\n0\r\n\r\n";
        assert_eq!(parse_response(split).unwrap().1, b"boom!!");

        let truncated = b"HTTP/1.1 500 Oops\r\nTransfer-Encoding: chunked\r\n\r\n10\r\nshort";
        assert!(parse_response(truncated).is_err());
    }

    #[test]
    fn chunked_rejection_carries_decoded_body() {
        let (url, server) = mock_endpoint_raw(String::from(
            "HTTP/1.1 400 Bad Request\r\nTransfer-Encoding: chunked\r\n\r\n11\r\n{\"isSuccess\":false}\r\n0\r\n\r\n",
        ));

        let err = client(url).send(&[0; 8]).unwrap_err();
        server.join().unwrap();
        match err {
            SendError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.as_deref(), Some(r#"{"isSuccess":false}"#));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn timeout_path_connects_to_resolved_address() {
        let (url, server) = mock_endpoint("200 OK", "");
        let url = url.replace("127.0.0.1", "localhost");
        client(url).send(&[50; 8]).unwrap();
        server.join().unwrap();
    }
}
