use std::io;
use std::string::FromUtf8Error;
use httparse::Error as HttpParseError;
use thiserror::Error;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    // General Errors
    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // URL Errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("Invalid scheme in URL, expected `{0}`")]
    InvalidSchemeURL(&'static str),

    #[error("URL has no host")]
    URLNoHost,

    // Handshake Errors
    #[error("Could not resolve host: `{0}`")]
    HostResolution(String),

    #[error("Server didn't upgrade the connection, status code: {0}")]
    NoUpgrade(u16),

    #[error("Server didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    #[error("Connection closed before the handshake completed")]
    IncompleteHandshake,

    // Framing Errors
    #[error("Invalid Opcode")]
    InvalidOpcode,

    #[error("Frame payload length has the top bit set")]
    PayloadLength,

    #[error("RSV not zero")]
    RSVNotZero,

    #[error("Control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("Control frame with invalid payload size, can't be greater than 125")]
    ControlFramePayloadSize,

    // Fragmentation Errors
    #[error("Invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("Incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("Invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    // HTTP Errors
    #[error("{source}")]
    HttpParseError {
        #[from]
        source: HttpParseError,
    },

    #[error("Incomplete HTTP response")]
    IncompleteHTTPResponse,

    #[error("Invalid Content-Length header")]
    InvalidContentLength,

    #[error("Invalid chunked transfer encoding")]
    InvalidChunkedEncoding,

    // Compression / Decompression Errors
    #[error("gzip stream is corrupted or truncated")]
    GzipDecode,
}
