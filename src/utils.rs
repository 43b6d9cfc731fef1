use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::distr::Alphanumeric;
use rand::{thread_rng, Rng};
use sha1::{Digest, Sha1};

pub(crate) const UUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub(crate) fn generate_websocket_accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(UUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

// 22 random alphanumeric characters padded to the base64 length the
// server expects
pub(crate) fn generate_websocket_key() -> String {
    let random_part: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(22)
        .map(char::from)
        .collect();
    format!("{}==", random_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_key_shape() {
        let key = generate_websocket_key();
        assert_eq!(key.len(), 24);
        assert!(key.ends_with("=="));
        assert!(key[..22].bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_accept_value_rfc_example() {
        // The handshake example from RFC 6455 section 1.3
        let accept = generate_websocket_accept_value("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
