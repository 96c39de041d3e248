//! Binary API frame codec.
//!
//! Every API frame has the same envelope:
//!
//! ```text
//! [0x7E][len_hi][len_lo][frame data: len bytes][checksum]
//! ```
//!
//! The checksum is `0xFF - (sum of frame data mod 256)`, so the frame data
//! plus checksum always sum to `0xFF`.
//!
//! The uplink uses three frame types:
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `0x20` | to modem | transmit payload to an IPv4 destination |
//! | `0x08` | to modem | local AT command (API mode only) |
//! | `0x88` | from modem | local AT command response |
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use rover_uplink::xbee::frame::{ApiFrame, TxIpv4Request};
//!
//! let request = TxIpv4Request::new(Ipv4Addr::new(10, 0, 0, 2), 80, b"ping");
//! let bytes = request.encode().unwrap();
//! assert_eq!(bytes[0], 0x7E);
//! assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]), 4 + 12);
//!
//! let (frame, used) = ApiFrame::decode(&bytes).unwrap();
//! assert_eq!(used, bytes.len());
//! assert_eq!(frame.frame_type, 0x20);
//! ```

use std::fmt;
use std::net::Ipv4Addr;

/// Frame start delimiter.
pub const START_DELIMITER: u8 = 0x7E;

/// Transmit request to an IPv4 destination.
pub const FRAME_TYPE_TX_IPV4: u8 = 0x20;

/// Local AT command request.
pub const FRAME_TYPE_AT_COMMAND: u8 = 0x08;

/// Local AT command response.
pub const FRAME_TYPE_AT_RESPONSE: u8 = 0x88;

/// Frame id used for every transmit request.
pub const TX_FRAME_ID: u8 = 0x01;

/// Transmit-IPv4 frame data bytes before the payload:
/// type, id, address (4), destination port (2), source port (2), protocol, options.
pub const TX_IPV4_HEADER_LEN: usize = 12;

/// Largest payload whose length still fits the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - TX_IPV4_HEADER_LEN;

/// Source port; zero lets the modem pick an ephemeral port.
pub const SOURCE_PORT_EPHEMERAL: u16 = 0;

/// Transmit option: leave the socket open after sending.
pub const OPTION_LEAVE_OPEN: u8 = 0x00;

/// Envelope overhead: delimiter, two length bytes, checksum.
const ENVELOPE_LEN: usize = 4;

/// IP protocol selector of a transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// UDP datagram.
    Udp = 0,
    /// TCP stream.
    Tcp = 1,
}

impl Protocol {
    fn from_byte(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0 => Ok(Self::Udp),
            1 => Ok(Self::Tcp),
            other => Err(FrameError::InvalidField {
                field: "protocol",
                value: other,
            }),
        }
    }
}

/// Compute the API checksum over frame data.
pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum = frame_data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// A decoded API frame: type byte plus the rest of the frame data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFrame {
    /// Frame type (first byte of frame data).
    pub frame_type: u8,
    /// Frame data after the type byte.
    pub data: Vec<u8>,
}

impl ApiFrame {
    /// Create a frame from its type and body.
    pub fn new(frame_type: u8, data: Vec<u8>) -> Self {
        Self { frame_type, data }
    }

    /// Serialize with delimiter, length and checksum.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let frame_len = self.data.len() + 1;
        if frame_len > u16::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                len: self.data.len(),
                max: u16::MAX as usize - 1,
            });
        }

        let mut bytes = Vec::with_capacity(frame_len + ENVELOPE_LEN);
        bytes.push(START_DELIMITER);
        bytes.extend_from_slice(&(frame_len as u16).to_be_bytes());
        bytes.push(self.frame_type);
        bytes.extend_from_slice(&self.data);
        bytes.push(checksum(&bytes[3..]));
        Ok(bytes)
    }

    /// Decode one frame from the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        if bytes.len() < 3 {
            return Err(FrameError::Truncated {
                needed: 3,
                got: bytes.len(),
            });
        }
        if bytes[0] != START_DELIMITER {
            return Err(FrameError::BadDelimiter(bytes[0]));
        }

        let frame_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        if frame_len == 0 {
            return Err(FrameError::LengthMismatch {
                declared: 0,
                actual: bytes.len().saturating_sub(ENVELOPE_LEN),
            });
        }
        let total = frame_len + ENVELOPE_LEN;
        if bytes.len() < total {
            return Err(FrameError::Truncated {
                needed: total,
                got: bytes.len(),
            });
        }

        let frame_data = &bytes[3..3 + frame_len];
        let expected = checksum(frame_data);
        let actual = bytes[3 + frame_len];
        if expected != actual {
            return Err(FrameError::BadChecksum { expected, actual });
        }

        let frame = Self {
            frame_type: frame_data[0],
            data: frame_data[1..].to_vec(),
        };
        Ok((frame, total))
    }
}

/// Transmit request for an IPv4 destination (frame type `0x20`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIpv4Request<'a> {
    /// Destination address.
    pub destination: Ipv4Addr,
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Payload bytes, sent verbatim.
    pub payload: &'a [u8],
}

impl<'a> TxIpv4Request<'a> {
    /// Create a TCP transmit request.
    pub fn new(destination: Ipv4Addr, port: u16, payload: &'a [u8]) -> Self {
        Self {
            destination,
            port,
            protocol: Protocol::Tcp,
            payload,
        }
    }

    /// Use a different protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Value of the frame length field (payload + 12).
    pub fn frame_len(&self) -> usize {
        self.payload.len() + TX_IPV4_HEADER_LEN
    }

    /// Frame data: everything between the length field and the checksum.
    fn frame_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.frame_len());
        data.push(FRAME_TYPE_TX_IPV4);
        data.push(TX_FRAME_ID);
        data.extend_from_slice(&self.destination.octets());
        data.extend_from_slice(&self.port.to_be_bytes());
        data.extend_from_slice(&SOURCE_PORT_EPHEMERAL.to_be_bytes());
        data.push(self.protocol as u8);
        data.push(OPTION_LEAVE_OPEN);
        data.extend_from_slice(self.payload);
        data
    }

    /// Checksum byte this request will carry.
    pub fn checksum(&self) -> u8 {
        checksum(&self.frame_data())
    }

    /// Serialize the complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let data = self.frame_data();
        let mut bytes = Vec::with_capacity(data.len() + ENVELOPE_LEN);
        bytes.push(START_DELIMITER);
        bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&data);
        bytes.push(checksum(&data));
        Ok(bytes)
    }
}

/// Fields of a decoded transmit-IPv4 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIpv4Frame {
    /// Frame id.
    pub frame_id: u8,
    /// Destination address.
    pub destination: Ipv4Addr,
    /// Destination port.
    pub port: u16,
    /// Source port.
    pub source_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Transmit options.
    pub options: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl TryFrom<&ApiFrame> for TxIpv4Frame {
    type Error = FrameError;

    fn try_from(frame: &ApiFrame) -> Result<Self, Self::Error> {
        if frame.frame_type != FRAME_TYPE_TX_IPV4 {
            return Err(FrameError::UnexpectedType(frame.frame_type));
        }
        let d = &frame.data;
        // Header without the type byte
        if d.len() < TX_IPV4_HEADER_LEN - 1 {
            return Err(FrameError::Truncated {
                needed: TX_IPV4_HEADER_LEN - 1,
                got: d.len(),
            });
        }
        Ok(Self {
            frame_id: d[0],
            destination: Ipv4Addr::new(d[1], d[2], d[3], d[4]),
            port: u16::from_be_bytes([d[5], d[6]]),
            source_port: u16::from_be_bytes([d[7], d[8]]),
            protocol: Protocol::from_byte(d[9])?,
            options: d[10],
            payload: d[11..].to_vec(),
        })
    }
}

/// Local AT command request (frame type `0x08`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommandFrame<'a> {
    /// Frame id echoed back in the response; zero suppresses the response.
    pub frame_id: u8,
    /// Two-letter command mnemonic.
    pub command: [u8; 2],
    /// Optional parameter bytes.
    pub parameter: &'a [u8],
}

impl<'a> AtCommandFrame<'a> {
    /// Create a command frame.
    pub fn new(frame_id: u8, command: [u8; 2], parameter: &'a [u8]) -> Self {
        Self {
            frame_id,
            command,
            parameter,
        }
    }

    /// Serialize the complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut data = Vec::with_capacity(3 + self.parameter.len());
        data.push(self.frame_id);
        data.extend_from_slice(&self.command);
        data.extend_from_slice(self.parameter);
        ApiFrame::new(FRAME_TYPE_AT_COMMAND, data).encode()
    }
}

/// Local AT command response (frame type `0x88`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommandResponse {
    /// Frame id of the request.
    pub frame_id: u8,
    /// Command mnemonic.
    pub command: [u8; 2],
    /// Status: 0 OK, 1 error, 2 invalid command, 3 invalid parameter.
    pub status: u8,
    /// Returned value, if any.
    pub data: Vec<u8>,
}

impl AtCommandResponse {
    /// Whether the modem accepted the command.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

impl TryFrom<&ApiFrame> for AtCommandResponse {
    type Error = FrameError;

    fn try_from(frame: &ApiFrame) -> Result<Self, Self::Error> {
        if frame.frame_type != FRAME_TYPE_AT_RESPONSE {
            return Err(FrameError::UnexpectedType(frame.frame_type));
        }
        let d = &frame.data;
        if d.len() < 4 {
            return Err(FrameError::Truncated {
                needed: 4,
                got: d.len(),
            });
        }
        Ok(Self {
            frame_id: d[0],
            command: [d[1], d[2]],
            status: d[3],
            data: d[4..].to_vec(),
        })
    }
}

/// Frame encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the 16-bit length field.
    PayloadTooLarge { len: usize, max: usize },
    /// Not enough bytes for a complete frame.
    Truncated { needed: usize, got: usize },
    /// First byte is not the start delimiter.
    BadDelimiter(u8),
    /// Declared length is inconsistent with the frame.
    LengthMismatch { declared: usize, actual: usize },
    /// Checksum byte does not match the frame data.
    BadChecksum { expected: u8, actual: u8 },
    /// Frame type is not the one being decoded.
    UnexpectedType(u8),
    /// A field holds a value outside its defined range.
    InvalidField { field: &'static str, value: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large: {} bytes (max {})", len, max)
            }
            Self::Truncated { needed, got } => {
                write!(f, "truncated frame: need {} bytes, got {}", needed, got)
            }
            Self::BadDelimiter(b) => write!(f, "bad start delimiter: 0x{:02X}", b),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "length mismatch: declared {}, actual {}", declared, actual)
            }
            Self::BadChecksum { expected, actual } => write!(
                f,
                "bad checksum: expected 0x{:02X}, got 0x{:02X}",
                expected, actual
            ),
            Self::UnexpectedType(t) => write!(f, "unexpected frame type: 0x{:02X}", t),
            Self::InvalidField { field, value } => {
                write!(f, "invalid {}: 0x{:02X}", field, value)
            }
        }
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: Ipv4Addr = Ipv4Addr::new(10, 156, 143, 137);

    /// Checksum computed only over the fields that carry data:
    /// type, id, address, destination port, protocol and payload.
    fn reference_checksum(addr: Ipv4Addr, port: u16, protocol: u8, payload: &[u8]) -> u8 {
        let mut sum: u32 = FRAME_TYPE_TX_IPV4 as u32 + TX_FRAME_ID as u32;
        sum += addr.octets().iter().map(|b| *b as u32).sum::<u32>();
        sum += port.to_be_bytes().iter().map(|b| *b as u32).sum::<u32>();
        sum += protocol as u32;
        sum += payload.iter().map(|b| *b as u32).sum::<u32>();
        0xFF - (sum % 256) as u8
    }

    /// Independent byte-by-byte decoder for transmit frames.
    fn decode_by_hand(bytes: &[u8]) -> (Ipv4Addr, u16, u8, Vec<u8>) {
        assert_eq!(bytes[0], 0x7E);
        let len = ((bytes[1] as usize) << 8) | bytes[2] as usize;
        assert_eq!(bytes.len(), len + 4);
        assert_eq!(bytes[3], 0x20);
        assert_eq!(bytes[4], 0x01);
        let addr = Ipv4Addr::new(bytes[5], bytes[6], bytes[7], bytes[8]);
        let port = ((bytes[9] as u16) << 8) | bytes[10] as u16;
        assert_eq!(&bytes[11..13], &[0, 0]);
        let protocol = bytes[13];
        assert_eq!(bytes[14], 0);
        let payload = bytes[15..bytes.len() - 1].to_vec();
        let total: u32 = bytes[3..].iter().map(|b| *b as u32).sum();
        assert_eq!(total % 256, 0xFF, "frame data plus checksum must sum to 0xFF");
        (addr, port, protocol, payload)
    }

    // ==================== Transmit Frame Tests ====================

    #[test]
    fn test_empty_payload_layout() {
        let bytes = TxIpv4Request::new(DEST, 80, &[]).encode().unwrap();

        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..3], &[0x7E, 0x00, 0x0C]);
        assert_eq!(
            &bytes[3..15],
            &[0x20, 0x01, 10, 156, 143, 137, 0x00, 0x50, 0x00, 0x00, 0x01, 0x00]
        );
        assert_eq!(bytes[15], reference_checksum(DEST, 80, 1, &[]));
    }

    #[test]
    fn test_64_byte_payload_length_and_checksum() {
        let payload: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(7).wrapping_add(3)).collect();
        let request = TxIpv4Request::new(DEST, 8080, &payload);
        let bytes = request.encode().unwrap();

        assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]), 64 + 12);
        assert_eq!(bytes.len(), 64 + 16);
        let expected = reference_checksum(DEST, 8080, 1, &payload);
        assert_eq!(*bytes.last().unwrap(), expected);
        assert_eq!(request.checksum(), expected);
    }

    #[test]
    fn test_known_checksum_value() {
        // 0x20 + 0x01 + 10 + 0 + 0 + 1 + 0x00 + 0x50 + 0x01 = 0x7D
        let bytes = TxIpv4Request::new(Ipv4Addr::new(10, 0, 0, 1), 80, &[])
            .encode()
            .unwrap();
        assert_eq!(*bytes.last().unwrap(), 0xFF - 0x7D);
    }

    #[test]
    fn test_roundtrip_with_independent_decoder() {
        let payload = b"POST /api/message HTTP/1.1\r\nHost: robot\r\n\r\nS1=42";
        let bytes = TxIpv4Request::new(DEST, 443, payload).encode().unwrap();

        let (addr, port, protocol, body) = decode_by_hand(&bytes);
        assert_eq!(addr, DEST);
        assert_eq!(port, 443);
        assert_eq!(protocol, 1);
        assert_eq!(body, payload);
    }

    #[test]
    fn test_roundtrip_through_api_decoder() {
        let payload = [0x7E, 0x00, 0xFF, 0x11];
        let bytes = TxIpv4Request::new(DEST, 9750, &payload)
            .with_protocol(Protocol::Udp)
            .encode()
            .unwrap();

        let (frame, used) = ApiFrame::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        let tx = TxIpv4Frame::try_from(&frame).unwrap();
        assert_eq!(tx.frame_id, TX_FRAME_ID);
        assert_eq!(tx.destination, DEST);
        assert_eq!(tx.port, 9750);
        assert_eq!(tx.source_port, 0);
        assert_eq!(tx.protocol, Protocol::Udp);
        assert_eq!(tx.options, OPTION_LEAVE_OPEN);
        assert_eq!(tx.payload, payload);
    }

    #[test]
    fn test_port_is_big_endian() {
        let bytes = TxIpv4Request::new(DEST, 0x1234, &[]).encode().unwrap();
        assert_eq!(&bytes[9..11], &[0x12, 0x34]);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let result = TxIpv4Request::new(DEST, 80, &payload).encode();
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    // ==================== Decoder Tests ====================

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut bytes = TxIpv4Request::new(DEST, 80, b"x").encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            ApiFrame::decode(&bytes),
            Err(FrameError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_delimiter() {
        assert_eq!(
            ApiFrame::decode(&[0x00, 0x00, 0x01, 0x08, 0xF7]),
            Err(FrameError::BadDelimiter(0x00))
        );
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = TxIpv4Request::new(DEST, 80, b"hello").encode().unwrap();
        assert!(matches!(
            ApiFrame::decode(&bytes[..bytes.len() - 2]),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_reports_consumed_length_with_trailing_bytes() {
        let mut bytes = AtCommandFrame::new(2, *b"AI", &[]).encode().unwrap();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&[0x7E, 0x00]);
        let (_, used) = ApiFrame::decode(&bytes).unwrap();
        assert_eq!(used, frame_len);
    }

    // ==================== AT Command Frame Tests ====================

    #[test]
    fn test_at_command_frame_bytes() {
        // 0x08 + 0x02 + 'A' + 'I' = 0x94, checksum 0x6B
        let bytes = AtCommandFrame::new(2, *b"AI", &[]).encode().unwrap();
        assert_eq!(bytes, vec![0x7E, 0x00, 0x04, 0x08, 0x02, b'A', b'I', 0x6B]);
    }

    #[test]
    fn test_at_command_frame_with_parameter() {
        let bytes = AtCommandFrame::new(3, *b"AP", &[0]).encode().unwrap();
        let (frame, _) = ApiFrame::decode(&bytes).unwrap();
        assert_eq!(frame.frame_type, FRAME_TYPE_AT_COMMAND);
        assert_eq!(frame.data, vec![3, b'A', b'P', 0]);
    }

    #[test]
    fn test_at_response_decode() {
        let bytes = ApiFrame::new(FRAME_TYPE_AT_RESPONSE, vec![2, b'A', b'I', 0, 0x23])
            .encode()
            .unwrap();
        let (frame, _) = ApiFrame::decode(&bytes).unwrap();
        let response = AtCommandResponse::try_from(&frame).unwrap();
        assert_eq!(response.frame_id, 2);
        assert_eq!(&response.command, b"AI");
        assert!(response.is_ok());
        assert_eq!(response.data, vec![0x23]);
    }

    #[test]
    fn test_at_response_wrong_type() {
        let frame = ApiFrame::new(FRAME_TYPE_TX_IPV4, vec![0; 11]);
        assert_eq!(
            AtCommandResponse::try_from(&frame),
            Err(FrameError::UnexpectedType(FRAME_TYPE_TX_IPV4))
        );
    }
}
