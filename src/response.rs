use crate::error::Error;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;

const MAX_HEADERS: usize = 64;

/// The status line and headers of an HTTP/1.1 response. Header names
/// are lowercased on store so lookups are case-insensitive, the way
/// HTTP requires.
#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    pub status_code: u16,
    pub description: String,
    pub headers: HashMap<String, String>,
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Tries to parse a complete response head from the front of `rxbuf`.
///
/// Returns `Ok(None)` while the head is still incomplete, leaving the
/// buffer untouched so the caller can keep appending socket reads. On
/// success only the head bytes are consumed: whatever the server sent
/// after the blank line stays in the buffer. For a WebSocket upgrade
/// that remainder may already contain the first frame.
pub fn parse_response_head(rxbuf: &mut BytesMut) -> Result<Option<ResponseHead>, Error> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut header_storage);

    let parsed_len = match response.parse(rxbuf)? {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(parsed_len) => parsed_len,
    };

    let mut head = ResponseHead {
        status_code: response.code.unwrap_or(0),
        description: response.reason.unwrap_or_default().to_string(),
        headers: HashMap::with_capacity(response.headers.len()),
    };
    for header in response.headers.iter() {
        head.headers.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).to_string(),
        );
    }

    rxbuf.advance(parsed_len);
    Ok(Some(head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_head_consumes_nothing() {
        let mut rxbuf = BytesMut::from(&b"HTTP/1.1 101 Switching Protocols\r\nUpgr"[..]);
        assert!(parse_response_head(&mut rxbuf).unwrap().is_none());
        assert_eq!(rxbuf.len(), 39);
    }

    #[test]
    fn test_complete_head_leaves_body_bytes() {
        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n\x81\x05Hello";
        let mut rxbuf = BytesMut::from(&raw[..]);
        let head = parse_response_head(&mut rxbuf).unwrap().unwrap();
        assert_eq!(head.status_code, 101);
        assert_eq!(head.description, "Switching Protocols");
        assert_eq!(head.header("upgrade"), Some("websocket"));
        // Lookup is case-insensitive
        assert_eq!(
            head.header("Sec-WebSocket-Accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        // The first frame arrived in the same read and must survive
        assert_eq!(&rxbuf[..], b"\x81\x05Hello");
    }

    #[test]
    fn test_garbage_head_is_an_error() {
        let mut rxbuf = BytesMut::from(&b"\x81\x05Hello"[..]);
        assert!(parse_response_head(&mut rxbuf).is_err());
    }
}
