use crate::error::Error;
use bytes::BytesMut;
use rand::random;

// Outgoing messages whose payload reaches this size are split into
// fragments of exactly this many bytes, with the Continue opcode.
pub const CHUNK_SIZE: usize = 1 << 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A single decoded WebSocket frame, already unmasked.
///
/// The reserved bits are kept as decoded so the connection can fail
/// the session when they are set without a negotiated extension.
#[derive(Debug, Clone)]
pub struct Frame {
    pub final_fragment: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(final_fragment: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            final_fragment,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    // The size the frame occupied on the wire, header included
    pub fn wire_size(&self) -> usize {
        let len = self.payload.len();
        let extended = if len >= 65536 {
            8
        } else if len >= 126 {
            2
        } else {
            0
        };
        2 + extended + len
    }
}

/// Tries to pull one complete frame from the front of `rxbuf`.
///
/// Returns `Ok(None)` when not enough bytes are buffered yet, without
/// consuming anything. The caller keeps appending socket reads to the
/// buffer and retries. A masked frame is unusual coming from a server,
/// but it's permitted and unmasked here.
pub fn parse_frame(rxbuf: &mut BytesMut) -> Result<Option<Frame>, Error> {
    if rxbuf.len() < 2 {
        return Ok(None);
    }

    // The first bit in the first byte in the frame tells us whether the
    // current frame is the final fragment of a message, the next three
    // are the reserved extension bits, and the last 4 bits are the opcode
    let final_fragment = (rxbuf[0] & 0b10000000) != 0;
    let rsv1 = (rxbuf[0] & 0b01000000) != 0;
    let rsv2 = (rxbuf[0] & 0b00100000) != 0;
    let rsv3 = (rxbuf[0] & 0b00010000) != 0;

    // The first bit of the second byte is the "Mask bit," it tells us if
    // the payload is masked or not, and the remaining 7 bits hold the
    // payload length or an escape for the extended length encodings
    let masked = (rxbuf[1] & 0b10000000) != 0;
    let length_byte = rxbuf[1] & 0b01111111;

    let mut header_size = 2;
    match length_byte {
        126 => header_size += 2,
        127 => header_size += 8,
        _ => {}
    }
    if masked {
        header_size += 4;
    }

    if rxbuf.len() < header_size {
        return Ok(None);
    }

    let payload_len = match length_byte {
        126 => u16::from_be_bytes([rxbuf[2], rxbuf[3]]) as u64,
        127 => {
            let mut be_bytes = [0u8; 8];
            be_bytes.copy_from_slice(&rxbuf[2..10]);
            let length = u64::from_be_bytes(be_bytes);
            // Per RFC 6455 the most significant bit of the 64-bit
            // length must be zero
            if length & (1 << 63) != 0 {
                return Err(Error::PayloadLength);
            }
            length
        }
        length => length as u64,
    };

    if (rxbuf.len() - header_size) < payload_len as usize {
        return Ok(None);
    }

    let opcode = OpCode::from(rxbuf[0] & 0b00001111)?;

    let header = rxbuf.split_to(header_size);
    let mut payload = rxbuf.split_to(payload_len as usize).to_vec();

    // The mask is applied using a simple bitwise XOR operation. Each byte
    // of the payload data is XOR'd with the corresponding byte (modulo 4)
    // of the 4-byte mask, so applying it again recovers the original data.
    if masked {
        let mask = &header[header_size - 4..];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok(Some(Frame {
        final_fragment,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        payload,
    }))
}

/// Serializes one client frame: header, extended length, fresh masking
/// key, payload XOR'd in place. The returned buffer is written to the
/// socket in a single send.
pub fn encode_frame(opcode: OpCode, final_fragment: bool, compress: bool, payload: &[u8]) -> Vec<u8> {
    let payload_len = payload.len();
    let mut buf = Vec::with_capacity(2 + 8 + 4 + payload_len);

    // The first byte of a websockets frame contains the final fragment
    // bit, the RSV1 bit when the frame opens a compressed message, and
    // the OpCode
    let mut first_byte = (final_fragment as u8) << 7 | opcode.as_u8();
    if compress && opcode != OpCode::Continue {
        first_byte |= 0b01000000;
    }
    buf.push(first_byte);

    // According to Websockets RFC, if the payload length is less than
    // 126 it's written in the length bits directly, if it fits 16 bits
    // it's escaped with 126 plus two big-endian bytes, otherwise it's
    // escaped with 127 plus eight big-endian bytes. The MSB of the
    // length byte is always set here, since clients must mask
    if payload_len < 126 {
        buf.push(0b1000_0000 | payload_len as u8);
    } else if payload_len < 65536 {
        buf.push(126 | 0b1000_0000);
        buf.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        buf.push(127 | 0b1000_0000);
        buf.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    // All frames sent from the client need to have the payload masked
    // with a fresh 4-byte key, placed right after the length bytes
    let mask: [u8; 4] = random();
    buf.extend_from_slice(&mask);

    let header_size = buf.len();
    buf.extend_from_slice(payload);
    for (i, byte) in buf[header_size..].iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    buf
}

/// Serializes a whole message, splitting payloads of `CHUNK_SIZE` bytes
/// or more into a fragmented sequence. The first fragment keeps the data
/// opcode with the fin bit clear, intermediate fragments use Continue,
/// and the last fragment uses Continue with the fin bit set. Each
/// fragment gets its own masking key. The compress bit is only ever set
/// on the first fragment.
pub fn encode_message(opcode: OpCode, compress: bool, payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.len() < CHUNK_SIZE || opcode.is_control() {
        return vec![encode_frame(opcode, true, compress, payload)];
    }

    let chunks = payload.chunks(CHUNK_SIZE);
    let total_chunks = chunks.len();

    let mut frames = Vec::with_capacity(total_chunks);
    for (i, chunk) in chunks.enumerate() {
        let is_final = i == total_chunks - 1;
        let chunk_opcode = if i == 0 { opcode } else { OpCode::Continue };

        frames.push(encode_frame(chunk_opcode, is_final, compress && i == 0, chunk));
    }

    frames
}
