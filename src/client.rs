use crate::error::Error;
use crate::gzip;
use crate::response::{parse_response_head, ResponseHead};
use bytes::{Buf, BytesMut};
use log::debug;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use url::Url;

const DEFAULT_USER_AGENT: &str = "pulsar-flow-client";
const READ_TIMEOUT_SECS: u64 = 10;

/// A fully buffered HTTP/1.1 response. Bodies served with
/// `Content-Encoding: gzip` have already been decompressed.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    pub description: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn text(&self) -> Result<String, Error> {
        Ok(String::from_utf8(self.body.clone())?)
    }
}

pub async fn get(url: &str) -> Result<HttpResponse, Error> {
    request("GET", url, &[], &[]).await
}

pub async fn get_with_headers(url: &str, headers: &[(String, String)]) -> Result<HttpResponse, Error> {
    request("GET", url, headers, &[]).await
}

pub async fn post(url: &str, body: &[u8], content_type: &str) -> Result<HttpResponse, Error> {
    let headers = [("Content-Type".to_string(), content_type.to_string())];
    request("POST", url, &headers, body).await
}

async fn request(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Result<HttpResponse, Error> {
    let parsed_url = Url::parse(url)?;
    if parsed_url.scheme() != "http" {
        return Err(Error::InvalidSchemeURL("http"));
    }

    let host = parsed_url.host_str().ok_or(Error::URLNoHost)?;
    let port = parsed_url.port().unwrap_or(80);

    // The Host header keeps the port only when the URL spelled one out
    let host_field = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => String::from(host),
    };

    let request_path = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nAccept: */*\r\nAccept-Encoding: gzip\r\n",
        method, request_path, host_field,
    );
    let user_supplied_agent = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("user-agent"));
    if !user_supplied_agent {
        request.push_str(&format!("User-Agent: {}\r\n", DEFAULT_USER_AGENT));
    }
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    if method != "GET" && method != "HEAD" {
        request.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    request.push_str("\r\n");

    debug!("client request: {}", request);

    let mut stream = TcpStream::connect(format!("{}:{}", host, port)).await?;
    stream.write_all(request.as_bytes()).await?;
    if method != "GET" && method != "HEAD" {
        stream.write_all(body).await?;
    }

    let mut rxbuf = BytesMut::with_capacity(16 * 1024);
    let head = loop {
        if read_more(&mut stream, &mut rxbuf).await? == 0 {
            return Err(Error::IncompleteHTTPResponse);
        }
        if let Some(head) = parse_response_head(&mut rxbuf)? {
            break head;
        }
    };

    let body = read_body(&mut stream, &mut rxbuf, &head).await?;

    // Transparent gzip decoding of the response body
    let body = if head.header("content-encoding") == Some("gzip") {
        debug!("decoding gzipped body");
        gzip::decompress(&body)?
    } else {
        body
    };

    Ok(HttpResponse {
        status_code: head.status_code,
        description: head.description,
        headers: head.headers,
        body,
    })
}

// One buffered socket read with the crate's read timeout applied, to
// drop servers that accept the connection and then go silent
async fn read_more<R: AsyncRead + Unpin>(reader: &mut R, rxbuf: &mut BytesMut) -> Result<usize, Error> {
    let n = timeout(Duration::from_secs(READ_TIMEOUT_SECS), reader.read_buf(rxbuf))
        .await
        .map_err(|_| Error::IncompleteHTTPResponse)??;
    Ok(n)
}

async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    rxbuf: &mut BytesMut,
    head: &ResponseHead,
) -> Result<Vec<u8>, Error> {
    if head
        .header("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    {
        return read_chunked_body(reader, rxbuf).await;
    }

    if let Some(content_length) = head.header("content-length") {
        let length: usize = content_length
            .parse()
            .map_err(|_| Error::InvalidContentLength)?;
        while rxbuf.len() < length {
            if read_more(reader, rxbuf).await? == 0 {
                return Err(Error::IncompleteHTTPResponse);
            }
        }
        return Ok(rxbuf.split_to(length).to_vec());
    }

    // Neither framing header present, the body runs until the server
    // closes the connection
    loop {
        if read_more(reader, rxbuf).await? == 0 {
            return Ok(rxbuf.split().to_vec());
        }
    }
}

fn find_crlf(buf: &BytesMut) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}

async fn read_chunked_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    rxbuf: &mut BytesMut,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    loop {
        let line_end = loop {
            match find_crlf(rxbuf) {
                Some(pos) => break pos,
                None => {
                    if read_more(reader, rxbuf).await? == 0 {
                        return Err(Error::InvalidChunkedEncoding);
                    }
                }
            }
        };

        // Chunk extensions after a semicolon are allowed and ignored
        let size_line = std::str::from_utf8(&rxbuf[..line_end])
            .map_err(|_| Error::InvalidChunkedEncoding)?;
        let size_field = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| Error::InvalidChunkedEncoding)?;
        rxbuf.advance(line_end + 2);

        if size == 0 {
            // Skip optional trailers until the final blank line
            loop {
                if rxbuf.len() >= 2 && &rxbuf[..2] == b"\r\n" {
                    rxbuf.advance(2);
                    return Ok(body);
                }
                match find_crlf(rxbuf) {
                    Some(pos) => rxbuf.advance(pos + 2),
                    None => {
                        if read_more(reader, rxbuf).await? == 0 {
                            return Ok(body);
                        }
                    }
                }
            }
        }

        // The chunk data is followed by its own CRLF
        while rxbuf.len() < size + 2 {
            if read_more(reader, rxbuf).await? == 0 {
                return Err(Error::InvalidChunkedEncoding);
            }
        }
        body.extend_from_slice(&rxbuf[..size]);
        rxbuf.advance(size + 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_from(raw: &[u8], head_raw: &[u8]) -> Result<Vec<u8>, Error> {
        let mut head_buf = BytesMut::from(head_raw);
        let head = parse_response_head(&mut head_buf).unwrap().unwrap();
        let mut rxbuf = BytesMut::new();
        let mut reader = raw;
        read_body(&mut reader, &mut rxbuf, &head).await
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let body = body_from(
            b"Hello worldTRAILING GARBAGE",
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(body, b"Hello world");
    }

    #[tokio::test]
    async fn test_eof_delimited_body() {
        let body = body_from(b"the whole stream", b"HTTP/1.1 200 OK\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(body, b"the whole stream");
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let raw = b"5\r\nHello\r\n6\r\n world\r\n0\r\n\r\n";
        let body = body_from(raw, b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(body, b"Hello world");
    }

    #[tokio::test]
    async fn test_chunked_body_with_extension() {
        let raw = b"b;name=value\r\nHello world\r\n0\r\n\r\n";
        let body = body_from(raw, b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(body, b"Hello world");
    }

    #[tokio::test]
    async fn test_truncated_content_length_fails() {
        let result = body_from(b"Hel", b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n").await;
        assert!(result.is_err());
    }
}
