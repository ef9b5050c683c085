/// HTTP/1.1 message framing for transport sessions. Response heads and chunk
/// sizes are parsed with `httparse`.
use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::Url;

const HTTP_VERSION: &str = "HTTP/1.1";
const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Request line, `Host`, framing headers and body for `url`.
    pub fn new(method: Method, url: &Url, body: Vec<u8>) -> Self {
        let mut headers = vec![("Host".to_string(), url.authority())];
        if !body.is_empty() || method == Method::Post {
            headers.push(("Content-Length".to_string(), body.len().to_string()));
        }
        headers.push(("Connection".to_string(), "close".to_string()));

        Self {
            method,
            target: url.target.clone(),
            headers,
            body,
        }
    }

    /// Add or replace a header (case-insensitive name match).
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.method, self.target, HTTP_VERSION);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Read one complete response. Interim 1xx responses are skipped.
pub async fn read_response<R>(stream: &mut R, method: Method) -> io::Result<HttpResponse>
where
    R: AsyncRead + Unpin,
{
    let mut reader = ResponseReader::new(stream);
    loop {
        let (status, reason, headers) = reader.read_head().await?;
        if (100..200).contains(&status) && status != 101 {
            continue;
        }

        let body = if method == Method::Head || status == 204 || status == 304 {
            Vec::new()
        } else {
            reader.read_body(&headers).await?
        };

        return Ok(HttpResponse {
            status,
            reason,
            headers,
            body,
        });
    }
}

type ResponseHead = (u16, String, Vec<(String, String)>);

/// Bytes received but not yet consumed, in front of the stream.
struct ResponseReader<'a, R> {
    stream: &'a mut R,
    buf: Vec<u8>,
}

impl<'a, R> ResponseReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    fn new(stream: &'a mut R) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Append whatever the stream has next. Returns 0 at EOF.
    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = self.stream.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    async fn read_head(&mut self) -> io::Result<ResponseHead> {
        loop {
            if let Some((consumed, head)) = parse_head(&self.buf)? {
                self.buf.drain(..consumed);
                return Ok(head);
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(invalid_data("response head too large".to_string()));
            }
            if self.fill().await? == 0 {
                return Err(if self.buf.is_empty() {
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before response",
                    )
                } else {
                    invalid_data("connection closed inside headers".to_string())
                });
            }
        }
    }

    async fn read_body(&mut self, headers: &[(String, String)]) -> io::Result<Vec<u8>> {
        let chunked = find_header(headers, "Transfer-Encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return self.read_chunked().await;
        }

        let mut body = Vec::new();
        match find_header(headers, "Content-Length") {
            Some(len) => {
                let len: u64 = len
                    .parse()
                    .map_err(|_| invalid_data(format!("bad Content-Length: {len}")))?;
                self.read_exact_into(len, &mut body).await?;
            }
            None => {
                body.append(&mut self.buf);
                self.stream.read_to_end(&mut body).await?;
            }
        }
        Ok(body)
    }

    async fn read_chunked(&mut self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let size = loop {
                match httparse::parse_chunk_size(&self.buf) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        self.buf.drain(..consumed);
                        break size;
                    }
                    Ok(httparse::Status::Partial) => self.fill_or_eof("chunk size").await?,
                    Err(_) => return Err(invalid_data("bad chunk size".to_string())),
                }
            };

            if size == 0 {
                self.skip_trailers().await?;
                return Ok(body);
            }

            self.read_exact_into(size, &mut body).await?;
            while self.buf.len() < 2 {
                self.fill_or_eof("chunk terminator").await?;
            }
            if &self.buf[..2] != b"\r\n" {
                return Err(invalid_data("chunk not terminated by CRLF".to_string()));
            }
            self.buf.drain(..2);
        }
    }

    async fn skip_trailers(&mut self) -> io::Result<()> {
        loop {
            let mut trailers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            match httparse::parse_headers(&self.buf, &mut trailers) {
                Ok(httparse::Status::Complete((consumed, _))) => {
                    self.buf.drain(..consumed);
                    return Ok(());
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => return Err(invalid_data(format!("bad chunked trailer: {e}"))),
            }
            if self.buf.len() > MAX_HEADER_BYTES {
                return Err(invalid_data("chunked trailer too large".to_string()));
            }
            self.fill_or_eof("chunked trailer").await?;
        }
    }

    /// Move exactly `len` bytes into `body`. The buffer grows with the data
    /// actually received, never ahead of it.
    async fn read_exact_into(&mut self, len: u64, body: &mut Vec<u8>) -> io::Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() && self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body truncated: {} of {len} bytes", len - remaining),
                ));
            }
            let take = usize::try_from(remaining).map_or(self.buf.len(), |r| r.min(self.buf.len()));
            body.extend(self.buf.drain(..take));
            remaining -= take as u64;
        }
        Ok(())
    }

    async fn fill_or_eof(&mut self, inside: &str) -> io::Result<()> {
        if self.fill().await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed inside {inside}"),
            ));
        }
        Ok(())
    }
}

/// Parse a complete response head from the front of `buf`, if there is one.
fn parse_head(buf: &[u8]) -> io::Result<Option<(usize, ResponseHead)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let consumed = match response.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => consumed,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(invalid_data(format!("malformed response head: {e}"))),
    };

    let status = response
        .code
        .ok_or_else(|| invalid_data("missing status code".to_string()))?;
    let reason = response.reason.unwrap_or_default().to_string();
    let headers = response
        .headers
        .iter()
        .map(|h| {
            let value = std::str::from_utf8(h.value)
                .map_err(|_| invalid_data(format!("non-UTF-8 value for header {}", h.name)))?;
            Ok((h.name.to_string(), value.trim().to_string()))
        })
        .collect::<io::Result<Vec<_>>>()?;

    Ok(Some((consumed, (status, reason, headers))))
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(mut raw: &[u8]) -> io::Result<HttpResponse> {
        read_response(&mut raw, Method::Post).await
    }

    #[test]
    fn test_request_serialization() {
        let url = Url::parse("http://cms.local:8080/xmds.php?v=5").unwrap();
        let mut request = HttpRequest::new(Method::Post, &url, b"<x/>".to_vec());
        request.set_header("Content-Type", "text/xml; charset=utf-8");

        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert!(text.starts_with("POST /xmds.php?v=5 HTTP/1.1\r\n"));
        assert!(text.contains("Host: cms.local:8080\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Content-Type: text/xml; charset=utf-8\r\n"));
        assert!(text.ends_with("\r\n\r\n<x/>"));
    }

    #[test]
    fn test_get_without_body_has_no_length() {
        let url = Url::parse("https://cms.local/").unwrap();
        let request = HttpRequest::new(Method::Get, &url, Vec::new());
        assert_eq!(request.header("host"), Some("cms.local"));
        assert!(request.header("Content-Length").is_none());
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let resp = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-A: b\r\n\r\nhelloEXTRA")
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.header("x-a"), Some("b"));
        assert_eq!(resp.body, b"hello");
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nTrailer: x\r\n\r\n";
        let resp = parse(raw).await.unwrap();
        assert_eq!(resp.body, b"Wikipedia");
    }

    #[tokio::test]
    async fn test_body_until_eof_and_interim_response() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.0 500 Internal Server Error\r\n\r\nfault";
        let resp = parse(raw).await.unwrap();
        assert_eq!(resp.status, 500);
        assert!(!resp.is_success());
        assert_eq!(resp.body_text(), "fault");
    }

    #[tokio::test]
    async fn test_large_body_is_not_capped() {
        let body = vec![b'a'; 8 * 1024 * 1024];
        let mut raw = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        raw.extend_from_slice(&body);
        let resp = parse(&raw).await.unwrap();
        assert_eq!(resp.body.len(), body.len());
    }

    #[tokio::test]
    async fn test_malformed_responses() {
        assert_eq!(
            parse(b"").await.unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert_eq!(
            parse(b"SSH-2.0-OpenSSH\r\n\r\n").await.unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
                .await
                .unwrap_err()
                .kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[tokio::test]
    async fn test_oversized_chunk_fails_without_allocating() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    1\r\na\r\nffffffffffffffff\r\nzz\r\n0\r\n\r\n";
        let err = parse(raw).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    10000000000000000\r\nzz\r\n";
        let err = parse(raw).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_head_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for part in [&b"HTTP/1.1 200 O"[..], b"K\r\nContent-Le", b"ngth: 3\r\n\r", b"\nabc"] {
                server.write_all(part).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let resp = read_response(&mut client, Method::Get).await.unwrap();
        writer.await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"abc");
    }

    #[tokio::test]
    async fn test_chunk_without_terminator_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcXY0\r\n\r\n";
        assert_eq!(parse(raw).await.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
