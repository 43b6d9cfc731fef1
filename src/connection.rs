use crate::close::{
    ABNORMAL_CLOSE_CODE, ABNORMAL_CLOSE_MESSAGE, INVALID_CLOSE_CODE_MESSAGE,
    INVALID_CLOSE_REASON_MESSAGE, INVALID_PAYLOAD_DATA_CODE, INVALID_PAYLOAD_DATA_MESSAGE,
    NORMAL_CLOSURE_CODE, NO_STATUS_CODE, NO_STATUS_MESSAGE, PROTOCOL_ERROR_CODE,
    PROTOCOL_ERROR_MESSAGE,
};
use crate::close::is_valid_close_code;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::event::{CloseInfo, ErrorInfo, OnMessageCallback, OpenInfo, WebSocketEvent};
use crate::frame::{encode_frame, encode_message, parse_frame, Frame, OpCode};
use crate::request::build_upgrade_request;
use crate::response::parse_response_head;
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use bytes::BytesMut;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::spawn_local;
use tokio::time::{interval, sleep, Duration};

const PING_MESSAGE: &str = "pulsar-flow::heartbeat";
const CLOSING_MAXIMUM_WAITING_DELAY_MS: u64 = 300;
const RECONNECT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        };
        write!(f, "{}", name)
    }
}

enum WriteOp {
    Data(Vec<u8>),
    Shutdown,
}

enum Flow {
    Continue,
    Break,
}

// Fragments of a message in progress are kept in a chunk list and only
// concatenated once the final fragment lands
struct FragmentedMessage {
    kind: OpCode,
    chunks: Vec<Vec<u8>>,
}

impl FragmentedMessage {
    fn merged(&self) -> Vec<u8> {
        let total: usize = self.chunks.iter().map(Vec::len).sum();
        let mut message = Vec::with_capacity(total);
        for chunk in &self.chunks {
            message.extend_from_slice(chunk);
        }
        message
    }
}

struct ConnectionState {
    config: ClientConfig,
    ready_state: ReadyState,
    // Last URL passed to connect, reused by the reconnect timer
    url: String,
    close_code: u16,
    close_reason: String,
    close_wire_size: usize,
    close_remote: bool,
    // Recorded at handshake time. Negotiation never succeeds while the
    // deflate codec is a placeholder, so incoming rsv1 frames stay fatal
    deflate_negotiated: bool,
    tx: Option<UnboundedSender<WriteOp>>,
    kill: Option<Rc<Notify>>,
    reconnect_running: bool,
    reconnect_suspended: bool,
    connect_retries: u32,
    pong_received: bool,
    ping_count: u64,
}

/// A client-side RFC 6455 WebSocket connection.
///
/// The whole lifecycle is driven from the current-thread event loop:
/// `connect` spawns the connection task on the current `LocalSet`, and
/// everything the connection has to say comes back through the
/// message callback. Cloning the handle is cheap and every clone talks
/// to the same connection.
pub struct WebSocketClient {
    state: Rc<RefCell<ConnectionState>>,
    callback: Rc<RefCell<OnMessageCallback>>,
}

impl Clone for WebSocketClient {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            callback: Rc::clone(&self.callback),
        }
    }
}

impl Default for WebSocketClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(ConnectionState {
                config,
                ready_state: ReadyState::Closed,
                url: String::new(),
                close_code: NORMAL_CLOSURE_CODE,
                close_reason: String::new(),
                close_wire_size: 0,
                close_remote: false,
                deflate_negotiated: false,
                tx: None,
                kill: None,
                reconnect_running: false,
                reconnect_suspended: false,
                connect_retries: 0,
                pong_received: false,
                ping_count: 0,
            })),
            callback: Rc::new(RefCell::new(Box::new(|_| {}))),
        }
    }

    /// Installs the sink every connection event is delivered to,
    /// replacing the previous one.
    pub fn set_on_message_callback(&self, callback: impl FnMut(&WebSocketEvent) + 'static) {
        *self.callback.borrow_mut() = Box::new(callback);
    }

    /// Starts connecting to a ws URL. The call returns immediately: the
    /// DNS lookup, TCP connect and HTTP upgrade all run on the event
    /// loop, and the outcome arrives through the callback as either an
    /// `Open` event or an `Error` event followed by reconnect attempts.
    pub fn connect(&self, url: &str) {
        {
            let mut state = self.state.borrow_mut();
            if state.ready_state != ReadyState::Closed {
                warn!("connect called while {}", state.ready_state);
                return;
            }
            state.ready_state = ReadyState::Connecting;
            state.url = url.to_string();
            state.reconnect_suspended = false;
        }

        let client = self.clone();
        let url = url.to_string();
        spawn_local(async move {
            client.run_connection(url).await;
        });
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Sends one message, text or binary. Returns whether the message
    /// was accepted into the send path: refused when the connection
    /// isn't Open or Closing, and text data that isn't valid UTF-8 is
    /// refused with a 1007 close.
    pub fn send(&self, data: &[u8], binary: bool) -> bool {
        if !self.accepts_writes() {
            return false;
        }
        if !binary && std::str::from_utf8(data).is_err() {
            warn!("refusing to send text with invalid UTF-8");
            self.close(INVALID_PAYLOAD_DATA_CODE, INVALID_PAYLOAD_DATA_MESSAGE);
            return false;
        }
        let opcode = if binary { OpCode::Binary } else { OpCode::Text };
        self.send_data(opcode, data)
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send_data(OpCode::Text, text.as_bytes())
    }

    pub fn send_binary(&self, data: &[u8]) -> bool {
        self.send_data(OpCode::Binary, data)
    }

    /// Sends a Ping frame. Control payloads are capped at 125 bytes.
    pub fn ping(&self, payload: &[u8]) -> bool {
        if payload.len() > 125 {
            return false;
        }
        self.send_data(OpCode::Ping, payload)
    }

    /// Starts the close handshake: records the code and reason, sends
    /// the Close frame and waits for the peer to echo it, force-closing
    /// after 300 ms. A no-op when already Closing or Closed, except
    /// that the reconnect timer is always stopped.
    pub fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.state.borrow_mut();
            state.reconnect_suspended = true;
            match state.ready_state {
                ReadyState::Closing | ReadyState::Closed => return,
                ReadyState::Connecting => {
                    // No close handshake to run yet, just tear the
                    // attempt down
                    state.ready_state = ReadyState::Closed;
                    state.close_code = code;
                    state.close_reason = reason.to_string();
                    state.close_wire_size = 0;
                    state.close_remote = false;
                    if let Some(tx) = state.tx.take() {
                        let _ = tx.send(WriteOp::Shutdown);
                    }
                    if let Some(kill) = state.kill.take() {
                        kill.notify_one();
                    }
                    drop(state);
                    self.emit(WebSocketEvent::Close(CloseInfo {
                        code,
                        reason: reason.to_string(),
                        remote: false,
                    }));
                    return;
                }
                ReadyState::Open => {}
            }
            state.ready_state = ReadyState::Closing;
            state.close_code = code;
            state.close_reason = reason.to_string();
            state.close_wire_size = 0;
            state.close_remote = false;
        }
        self.send_close_frame(code, reason);

        // The peer gets a bounded amount of time to echo the close
        // frame back before the socket is torn down underneath it
        let client = self.clone();
        spawn_local(async move {
            sleep(Duration::from_millis(CLOSING_MAXIMUM_WAITING_DELAY_MS)).await;
            let (code, reason, still_closing) = {
                let state = client.state.borrow();
                (
                    state.close_code,
                    state.close_reason.clone(),
                    state.ready_state == ReadyState::Closing,
                )
            };
            if still_closing {
                debug!("close handshake timed out, force-closing");
                client.close_socket_and_switch_to_closed(code, reason, 0, false);
            }
        });
    }

    fn accepts_writes(&self) -> bool {
        matches!(
            self.state.borrow().ready_state,
            ReadyState::Open | ReadyState::Closing
        )
    }

    fn send_data(&self, opcode: OpCode, payload: &[u8]) -> bool {
        if !self.accepts_writes() {
            return false;
        }
        let frames = encode_message(opcode, false, payload);
        let state = self.state.borrow();
        let Some(tx) = state.tx.as_ref() else {
            return false;
        };
        for frame in frames {
            if tx.send(WriteOp::Data(frame)).is_err() {
                return false;
            }
        }
        true
    }

    fn send_close_frame(&self, code: u16, reason: &str) {
        // 1005 must never appear on the wire, it maps to an empty close
        // payload
        let mut payload = Vec::with_capacity(2 + reason.len());
        if code != NO_STATUS_CODE {
            payload.extend_from_slice(&code.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
        }
        let frame = encode_frame(OpCode::Close, true, false, &payload);
        let state = self.state.borrow();
        if let Some(tx) = state.tx.as_ref() {
            let _ = tx.send(WriteOp::Data(frame));
        }
    }

    fn emit(&self, event: WebSocketEvent) {
        let mut callback = self.callback.borrow_mut();
        (*callback)(&event);
    }

    async fn run_connection(self, url: String) {
        let key = generate_websocket_key();
        let config = self.state.borrow().config.clone();

        let (request, host_with_port) = match build_upgrade_request(&url, &key, &config) {
            Ok(parts) => parts,
            Err(err) => {
                self.transport_error(format!("could not parse url `{}`: {}", url, err));
                return;
            }
        };

        let addr = match lookup_host(&host_with_port).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr,
                None => {
                    self.transport_error(Error::HostResolution(host_with_port.clone()).to_string());
                    return;
                }
            },
            Err(err) => {
                self.transport_error(format!(
                    "could not resolve host `{}`: {}",
                    host_with_port, err
                ));
                return;
            }
        };

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                self.transport_error(format!("connection to {} failed: {}", host_with_port, err));
                return;
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = unbounded_channel();
        let kill = Rc::new(Notify::new());
        {
            let mut state = self.state.borrow_mut();
            state.tx = Some(tx.clone());
            state.kill = Some(kill.clone());
        }
        spawn_local(write_loop(write_half, rx));

        if tx.send(WriteOp::Data(request.into_bytes())).is_err() {
            self.transport_error("could not write the handshake request".to_string());
            return;
        }

        let mut buf_reader = BufReader::new(read_half);
        let mut rxbuf = BytesMut::with_capacity(16 * 1024);

        // Read until the whole upgrade response head is buffered. The
        // server may well have sent the first frames in the same
        // packet: those bytes stay in rxbuf for the dispatch loop below
        let head = loop {
            tokio::select! {
                _ = kill.notified() => return,
                read = buf_reader.read_buf(&mut rxbuf) => match read {
                    Ok(0) => {
                        self.transport_error(Error::IncompleteHandshake.to_string());
                        return;
                    }
                    Ok(_) => match parse_response_head(&mut rxbuf) {
                        Ok(Some(head)) => break head,
                        Ok(None) => {}
                        Err(err) => {
                            self.transport_error(format!("HTTP parsing error: {}", err));
                            return;
                        }
                    },
                    Err(err) => {
                        self.transport_error(format!("read failed during handshake: {}", err));
                        return;
                    }
                }
            }
        };

        if head.status_code != 101 {
            self.transport_error(Error::NoUpgrade(head.status_code).to_string());
            return;
        }
        if config.validate_accept_key {
            let expected = generate_websocket_accept_value(&key);
            if head.header("sec-websocket-accept") != Some(expected.as_str()) {
                self.transport_error(Error::InvalidAcceptKey.to_string());
                return;
            }
        }

        let deflate_accepted = config.permessage_deflate
            && head
                .header("sec-websocket-extensions")
                .is_some_and(|extensions| extensions.contains("permessage-deflate"));
        if deflate_accepted {
            warn!("server accepted permessage-deflate, which is not implemented, continuing uncompressed");
        }

        {
            let mut state = self.state.borrow_mut();
            state.ready_state = ReadyState::Open;
            // An accepted offer is not taken up while the deflate codec
            // is missing, so compressed frames stay a protocol error
            state.deflate_negotiated = false;
            state.connect_retries = 0;
            state.pong_received = false;
        }
        info!("connection to {} established", url);
        let protocol = head
            .header("sec-websocket-protocol")
            .unwrap_or_default()
            .to_string();
        self.emit(WebSocketEvent::Open(OpenInfo {
            uri: url.clone(),
            headers: head.headers.clone(),
            protocol,
        }));
        self.start_ping_timer();

        let mut assembly: Option<FragmentedMessage> = None;
        loop {
            loop {
                match parse_frame(&mut rxbuf) {
                    Ok(Some(frame)) => {
                        if let Flow::Break = self.dispatch(frame, &mut assembly) {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("framing error: {}", err);
                        self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                        rxbuf.clear();
                        break;
                    }
                }
            }
            tokio::select! {
                _ = kill.notified() => return,
                read = buf_reader.read_buf(&mut rxbuf) => match read {
                    Ok(0) => {
                        self.handle_read_error();
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("socket read failed: {}", err);
                        self.handle_read_error();
                        return;
                    }
                }
            }
        }
    }

    /// One frame through the receive path: reserved bit and control
    /// frame validation, fragmented message reassembly, Ping/Pong and
    /// the close handshake.
    fn dispatch(&self, frame: Frame, assembly: &mut Option<FragmentedMessage>) -> Flow {
        // If the reserved bits are received as non-zero in the absence
        // of any negotiated extension, the connection needs to fail
        // immediately
        let deflate_negotiated = self.state.borrow().deflate_negotiated;
        if frame.rsv2 || frame.rsv3 || (frame.rsv1 && !deflate_negotiated) {
            warn!("{}", Error::RSVNotZero);
            self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
            return Flow::Continue;
        }

        if frame.opcode.is_control() {
            // Control frames can't be fragmented and their payload is
            // capped at 125 octets
            if !frame.final_fragment {
                warn!("{}", Error::ControlFramesFragmented);
                self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                return Flow::Continue;
            }
            if frame.payload.len() > 125 {
                warn!("{}", Error::ControlFramePayloadSize);
                self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                return Flow::Continue;
            }
        }

        match frame.opcode {
            // A fragmented message starts with a Text or Binary opcode
            // and the fin bit clear. The opcode is recorded here since
            // the final fragment arrives as a Continue and doesn't tell
            // the message kind
            OpCode::Text | OpCode::Binary if !frame.final_fragment => {
                if assembly.is_some() {
                    warn!("{}", Error::FragmentedInProgress);
                    self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                } else {
                    *assembly = Some(FragmentedMessage {
                        kind: frame.opcode,
                        chunks: vec![frame.payload],
                    });
                    self.emit(WebSocketEvent::Fragment);
                }
            }
            OpCode::Continue => match assembly {
                Some(fragmented) => {
                    fragmented.chunks.push(frame.payload);
                    if frame.final_fragment {
                        let message = fragmented.merged();
                        let binary = fragmented.kind == OpCode::Binary;
                        *assembly = None;
                        self.deliver_message(message, binary);
                    } else {
                        self.emit(WebSocketEvent::Fragment);
                    }
                }
                None => {
                    warn!("{}", Error::InvalidContinuationFrame);
                    self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                }
            },
            OpCode::Text | OpCode::Binary => {
                if assembly.is_some() {
                    warn!("{}", Error::InvalidFrameFragmentation);
                    self.close(PROTOCOL_ERROR_CODE, PROTOCOL_ERROR_MESSAGE);
                } else {
                    let binary = frame.opcode == OpCode::Binary;
                    self.deliver_message(frame.payload, binary);
                }
            }
            OpCode::Ping => {
                let enable_pong = self.state.borrow().config.enable_pong;
                if enable_pong {
                    self.send_data(OpCode::Pong, &frame.payload);
                }
                self.emit(WebSocketEvent::Ping(frame.payload));
            }
            OpCode::Pong => {
                self.state.borrow_mut().pong_received = true;
                self.emit(WebSocketEvent::Pong(frame.payload));
            }
            OpCode::Close => return self.dispatch_close(frame),
        }
        Flow::Continue
    }

    fn deliver_message(&self, payload: Vec<u8>, binary: bool) {
        // The text opcode MUST carry valid UTF-8
        if !binary && std::str::from_utf8(&payload).is_err() {
            warn!("received text message with invalid UTF-8");
            self.close(INVALID_PAYLOAD_DATA_CODE, INVALID_PAYLOAD_DATA_MESSAGE);
            return;
        }
        self.emit(WebSocketEvent::Message { payload, binary });
    }

    fn dispatch_close(&self, frame: Frame) -> Flow {
        let wire_size = frame.wire_size();
        let (mut code, mut reason) = if frame.payload.len() >= 2 {
            let code = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
            match std::str::from_utf8(&frame.payload[2..]) {
                Ok(reason) => (code, reason.to_string()),
                Err(_) => (
                    INVALID_PAYLOAD_DATA_CODE,
                    INVALID_CLOSE_REASON_MESSAGE.to_string(),
                ),
            }
        } else {
            (NO_STATUS_CODE, NO_STATUS_MESSAGE.to_string())
        };
        if !is_valid_close_code(code) {
            code = PROTOCOL_ERROR_CODE;
            reason = INVALID_CLOSE_CODE_MESSAGE.to_string();
        }

        let echo_of_ours = {
            let state = self.state.borrow();
            state.ready_state == ReadyState::Closing
                && code == state.close_code
                && reason == state.close_reason
        };
        if echo_of_ours {
            self.close_socket_and_switch_to_closed(code, reason, wire_size, false);
        } else {
            // The peer initiated the close, echo the frame back before
            // dropping the socket
            self.send_close_frame(code, &reason);
            self.close_socket_and_switch_to_closed(code, reason, wire_size, true);
        }
        Flow::Break
    }

    fn close_socket_and_switch_to_closed(
        &self,
        code: u16,
        reason: String,
        wire_size: usize,
        remote: bool,
    ) {
        {
            let mut state = self.state.borrow_mut();
            if state.ready_state == ReadyState::Closed {
                return;
            }
            state.ready_state = ReadyState::Closed;
            state.close_code = code;
            state.close_reason = reason.clone();
            state.close_wire_size = wire_size;
            state.close_remote = remote;
            if let Some(tx) = state.tx.take() {
                let _ = tx.send(WriteOp::Shutdown);
            }
            if let Some(kill) = state.kill.take() {
                kill.notify_one();
            }
            debug!(
                "closed: code {} reason `{}` wire size {} remote {}",
                state.close_code, state.close_reason, state.close_wire_size, state.close_remote
            );
        }
        self.emit(WebSocketEvent::Close(CloseInfo {
            code,
            reason,
            remote,
        }));
    }

    // Unexpected end of stream. In the Closing state the peer simply
    // hung up instead of echoing our close frame, anywhere else it's an
    // abnormal closure
    fn handle_read_error(&self) {
        let (closing, code, reason) = {
            let state = self.state.borrow();
            (
                state.ready_state == ReadyState::Closing,
                state.close_code,
                state.close_reason.clone(),
            )
        };
        if closing {
            self.close_socket_and_switch_to_closed(code, reason, 0, false);
        } else {
            self.close_socket_and_switch_to_closed(
                ABNORMAL_CLOSE_CODE,
                ABNORMAL_CLOSE_MESSAGE.to_string(),
                0,
                true,
            );
        }
    }

    fn transport_error(&self, reason: String) {
        let retries = {
            let mut state = self.state.borrow_mut();
            state.ready_state = ReadyState::Closed;
            if let Some(tx) = state.tx.take() {
                let _ = tx.send(WriteOp::Shutdown);
            }
            if let Some(kill) = state.kill.take() {
                kill.notify_one();
            }
            state.connect_retries += 1;
            state.connect_retries
        };
        error!("{}", reason);
        self.emit(WebSocketEvent::Error(ErrorInfo { reason, retries }));
        self.start_reconnect_timer();
    }

    // Armed from the transport-error path. Re-fires every second while
    // the connection is down and a URL is known, and stops on a
    // successful handshake or a user-initiated close
    fn start_reconnect_timer(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.reconnect_running || state.reconnect_suspended || state.url.is_empty() {
                return;
            }
            state.reconnect_running = true;
        }

        let weak_state = Rc::downgrade(&self.state);
        let weak_callback = Rc::downgrade(&self.callback);
        spawn_local(async move {
            let mut ticker = interval(Duration::from_millis(RECONNECT_INTERVAL_MS));
            // The first tick of a tokio interval fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (Some(state), Some(callback)) = (weak_state.upgrade(), weak_callback.upgrade())
                else {
                    return;
                };
                let client = WebSocketClient { state, callback };
                let (ready_state, url, suspended) = {
                    let state = client.state.borrow();
                    (
                        state.ready_state,
                        state.url.clone(),
                        state.reconnect_suspended,
                    )
                };
                if suspended || url.is_empty() || ready_state == ReadyState::Open {
                    client.state.borrow_mut().reconnect_running = false;
                    return;
                }
                if ready_state == ReadyState::Closed {
                    info!("reconnecting to {}", url);
                    client.connect(&url);
                }
                // An attempt already in flight just waits for the next
                // tick
            }
        });
    }

    fn start_ping_timer(&self) {
        let interval_secs = match self.state.borrow().config.ping_interval_secs {
            Some(secs) if secs > 0 => secs,
            _ => return,
        };

        let weak_state = Rc::downgrade(&self.state);
        let weak_callback = Rc::downgrade(&self.callback);
        spawn_local(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (Some(state), Some(callback)) = (weak_state.upgrade(), weak_callback.upgrade())
                else {
                    return;
                };
                let client = WebSocketClient { state, callback };
                if !client.is_connected() {
                    return;
                }
                {
                    let mut state = client.state.borrow_mut();
                    if state.ping_count > 0 && !state.pong_received {
                        debug!("no pong received since the last ping");
                    }
                    state.pong_received = false;
                    state.ping_count += 1;
                }
                if !client.send_data(OpCode::Ping, PING_MESSAGE.as_bytes()) {
                    debug!("failed to send keepalive ping");
                }
            }
        });
    }
}

async fn write_loop(mut write_half: WriteHalf<TcpStream>, mut rx: UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Data(bytes) => {
                if let Err(err) = write_half.write_all(&bytes).await {
                    error!("socket write failed: {}", err);
                    break;
                }
            }
            WriteOp::Shutdown => break,
        }
    }
    let _ = write_half.shutdown().await;
}
