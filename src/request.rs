use crate::config::ClientConfig;
use crate::error::Error;
use url::Url;

const DEFAULT_USER_AGENT: &str = "pulsar-flow-client";

// Function used for client connections, parsing the ws URL for
// constructing the handshake request, which includes the
// sec-websocket-key, the URL path and another relevant info. This
// function also returns the hostname with the port since this is
// necessary for establishing the TCP socket
pub fn build_upgrade_request(
    ws_url: &str,
    key: &str,
    config: &ClientConfig,
) -> Result<(String, String), Error> {
    let parsed_url = Url::parse(ws_url)?;

    // Clause just to validate the user has passed the proper URL scheme.
    // TLS is out of scope for this crate, so only plain ws is accepted
    if parsed_url.scheme() != "ws" {
        return Err(Error::InvalidSchemeURL("ws"));
    }

    let host = parsed_url.host_str().ok_or(Error::URLNoHost)?;
    let port = parsed_url.port().unwrap_or(80);

    // We need the port together with the host for establishing a TCP
    // connection, and the same value goes into the Host header
    let host_with_port = format!("{}:{}", host, port);

    let request_path = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    // Since we already have all the info, it isn't worth converting
    // everything to a HTTP request type, and considering everything is
    // bits into the TCP packets, we simply manipulate the string and
    // convert it to bytes when sending to the server
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {}\r\n",
        request_path, host_with_port, key,
    );

    let user_supplied_agent = config
        .extra_headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("user-agent"));
    if !user_supplied_agent {
        let agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        request.push_str(&format!("User-Agent: {}\r\n", agent));
    }

    // The deflate flag only offers the extension, the codec itself is
    // not implemented
    if config.permessage_deflate {
        request.push_str("Sec-WebSocket-Extensions: permessage-deflate\r\n");
    }

    for (name, value) in &config.extra_headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");

    Ok((request, host_with_port))
}
