/// Knobs for a client connection. The defaults match a plain RFC 6455
/// session: keepalive pings disabled, automatic Pong replies on, the
/// server's Sec-WebSocket-Accept checked against the RFC derivation.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between keepalive Pings. `None` disables the keepalive.
    pub ping_interval_secs: Option<u64>,
    /// Reply to incoming Pings with a Pong carrying the same payload
    pub enable_pong: bool,
    /// Verify the Sec-WebSocket-Accept header of the upgrade response
    pub validate_accept_key: bool,
    /// Offers the permessage-deflate extension in the upgrade request.
    /// The codec itself is not implemented: an acceptance is not taken
    /// up and incoming compressed frames are refused
    pub permessage_deflate: bool,
    /// Overrides the default User-Agent header of the upgrade request
    pub user_agent: Option<String>,
    /// Extra headers appended to the upgrade request
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ping_interval_secs: None,
            enable_pong: true,
            validate_accept_key: true,
            permessage_deflate: false,
            user_agent: None,
            extra_headers: Vec::new(),
        }
    }
}
