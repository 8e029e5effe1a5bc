//! STUN message encoding and decoding (RFC 5389, Binding method only)
//!
//! Only what a Binding client needs is implemented: building a request and
//! reading the reflected address (or error code) out of the response. Classic
//! RFC 3489 servers answer with MAPPED-ADDRESS instead of XOR-MAPPED-ADDRESS;
//! both are understood.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Fixed header length
pub const HEADER_LEN: usize = 20;

/// RFC 5389 magic cookie
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Transaction identifier length
pub const TRANSACTION_ID_LEN: usize = 12;

pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS: u16 = 0x0101;
pub const BINDING_ERROR: u16 = 0x0111;

pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
// Pre-standard code point still sent by some older servers.
pub const ATTR_XOR_MAPPED_ADDRESS_OLD: u16 = 0x8020;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// 96-bit STUN transaction id
pub type TransactionId = [u8; TRANSACTION_ID_LEN];

/// Decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message too short: {0} bytes")]
    TooShort(usize),

    #[error("not a STUN message")]
    NotStun,

    #[error("declared length {declared} exceeds datagram body {available}")]
    BadLength { declared: usize, available: usize },

    #[error("transaction id does not match the request")]
    TransactionMismatch,

    #[error("unexpected message type 0x{0:04x}")]
    UnexpectedType(u16),

    #[error("truncated attribute 0x{0:04x}")]
    TruncatedAttribute(u16),
}

/// What a Binding response told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingResponse {
    /// Binding success; `mapped` is `None` when no address attribute was present
    Success { mapped: Option<SocketAddr> },
    /// Binding error response
    Error { code: u16, reason: String },
}

/// Build a Binding request with the given transaction id
pub fn encode_binding_request(transaction_id: &TransactionId) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    buf[2..4].copy_from_slice(&0u16.to_be_bytes());
    buf[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    buf[8..20].copy_from_slice(transaction_id);
    buf
}

/// Decode a Binding response to the request carrying `transaction_id`
pub fn decode_response(
    buf: &[u8],
    transaction_id: &TransactionId,
) -> Result<BindingResponse, MessageError> {
    if buf.len() < HEADER_LEN {
        return Err(MessageError::TooShort(buf.len()));
    }
    // The two most significant bits of every STUN message are zero.
    if buf[0] & 0xC0 != 0 {
        return Err(MessageError::NotStun);
    }

    let msg_type = u16::from_be_bytes([buf[0], buf[1]]);
    let declared = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let available = buf.len() - HEADER_LEN;
    if declared > available {
        return Err(MessageError::BadLength {
            declared,
            available,
        });
    }
    if buf[4..8] != MAGIC_COOKIE.to_be_bytes() || buf[8..20] != transaction_id[..] {
        return Err(MessageError::TransactionMismatch);
    }

    let body = &buf[HEADER_LEN..HEADER_LEN + declared];
    match msg_type {
        BINDING_SUCCESS => {
            let mut xor_mapped = None;
            let mut mapped = None;
            for attr in Attributes::new(body) {
                let (attr_type, value) = attr?;
                match attr_type {
                    ATTR_XOR_MAPPED_ADDRESS | ATTR_XOR_MAPPED_ADDRESS_OLD => {
                        xor_mapped = xor_mapped.or(parse_address(value, Some(transaction_id)));
                    }
                    ATTR_MAPPED_ADDRESS => {
                        mapped = mapped.or(parse_address(value, None));
                    }
                    _ => {}
                }
            }
            Ok(BindingResponse::Success {
                mapped: xor_mapped.or(mapped),
            })
        }
        BINDING_ERROR => {
            let mut code = 0;
            let mut reason = String::new();
            for attr in Attributes::new(body) {
                let (attr_type, value) = attr?;
                if attr_type == ATTR_ERROR_CODE && value.len() >= 4 {
                    code = u16::from(value[2] & 0x07) * 100 + u16::from(value[3]);
                    reason = String::from_utf8_lossy(&value[4..]).into_owned();
                }
            }
            Ok(BindingResponse::Error { code, reason })
        }
        other => Err(MessageError::UnexpectedType(other)),
    }
}

/// Iterator over `(type, value)` attribute pairs, honoring 4-byte padding
struct Attributes<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> Attributes<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, offset: 0 }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<(u16, &'a [u8]), MessageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.body[self.offset..];
        if rest.len() < 4 {
            return None;
        }

        let attr_type = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        if rest.len() < 4 + len {
            self.offset = self.body.len();
            return Some(Err(MessageError::TruncatedAttribute(attr_type)));
        }

        let padded = (len + 3) & !3;
        self.offset = (self.offset + 4 + padded).min(self.body.len());
        Some(Ok((attr_type, &rest[4..4 + len])))
    }
}

/// Parse a (XOR-)MAPPED-ADDRESS value; `xor_with` carries the transaction id for XOR decoding
fn parse_address(value: &[u8], xor_with: Option<&TransactionId>) -> Option<SocketAddr> {
    if value.len() < 4 {
        return None;
    }

    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    let cookie = MAGIC_COOKIE.to_be_bytes();
    if xor_with.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    let ip = match family {
        FAMILY_IPV4 if value.len() >= 8 => {
            let mut octets = [value[4], value[5], value[6], value[7]];
            if xor_with.is_some() {
                for (o, k) in octets.iter_mut().zip(cookie.iter()) {
                    *o ^= k;
                }
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            if let Some(tid) = xor_with {
                let key: Vec<u8> = cookie.iter().chain(tid.iter()).copied().collect();
                for (o, k) in octets.iter_mut().zip(key.iter()) {
                    *o ^= k;
                }
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}
