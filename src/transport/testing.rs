/// Loopback HTTP fixtures for tests.
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one request (head plus `Content-Length` body) from a client.
pub async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !request_complete(&data) {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&data).to_string()
}

fn request_complete(data: &[u8]) -> bool {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(data) {
        Ok(httparse::Status::Complete(head)) => {
            let length = request
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("Content-Length"))
                .and_then(|h| std::str::from_utf8(h.value).ok()?.trim().parse::<usize>().ok())
                .unwrap_or(0);
            data.len() >= head + length
        }
        _ => false,
    }
}

/// Body part of a raw request read with [`read_request`].
pub fn request_body(request: &str) -> &str {
    request.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or_default()
}

pub fn http_reply(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

/// 200 reply whose SOAP body is `<{operation}Response><{field}>value</{field}>`.
pub fn soap_reply(operation: &str, field: &str, value: &str) -> String {
    let value = quick_xml::escape::escape(value);
    http_reply(
        "200 OK",
        &format!(
            "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\">\
             <SOAP-ENV:Body><ns1:{operation}Response xmlns:ns1=\"urn:xmds\">\
             <{field}>{value}</{field}></ns1:{operation}Response></SOAP-ENV:Body></SOAP-ENV:Envelope>"
        ),
    )
}

/// Serve every connection with `respond(request) -> raw reply`.
pub async fn serve<F>(respond: F) -> SocketAddr
where
    F: Fn(String) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = std::sync::Arc::new(respond);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                let reply = respond(request);
                stream.write_all(reply.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });
    addr
}
