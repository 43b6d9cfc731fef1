//! Client-side WebSockets and Pulsar-over-WebSocket messaging for the
//! Tokio stack.
//!
//! This library offers three layers on top of a single-threaded event
//! loop: a small HTTP/1.1 client with transparent gzip decoding, a
//! [WebSocket Protocol RFC](https://datatracker.ietf.org/doc/html/rfc6455)
//! client performing handshakes, reading frames, parsing masks and
//! handling opcodes, and a Pulsar producer/consumer that multiplexes
//! topics over cached WebSocket connections.
//!
//! The whole crate is cooperative on one thread: run it from a
//! current-thread runtime inside a `tokio::task::LocalSet`. Nothing is
//! thrown at user code, every outcome arrives through a callback or a
//! `Result`.

pub mod client;
pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod gzip;
pub mod pulsar;
pub mod request;
pub mod response;
mod utils;
