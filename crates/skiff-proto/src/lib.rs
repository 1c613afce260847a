//! Skiff tunnel framing.
//!
//! Two exchanges ride on QUIC bidirectional streams:
//! - the session hello, sent once on the first stream after the handshake;
//! - the stream request/response, sent at the head of every relayed stream.
//!
//! Addresses use the SOCKS5 layout (atyp + address + port) so a SOCKS5
//! request can be forwarded without re-encoding. Parsers are incremental and
//! zero-copy where the result borrows from the input.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::BytesMut;

pub const PROTOCOL_VERSION: u8 = 1;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Maximum domain name length.
pub const MAX_DOMAIN_LEN: usize = 255;

const STATUS_OK: u8 = 0x00;
const STATUS_FAILED: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    InvalidVersion(u8),
    InvalidCommand(u8),
    InvalidAtyp(u8),
    InvalidDomainLen,
    InvalidUtf8,
    InvalidStatus(u8),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion(v) => write!(f, "unsupported protocol version {v}"),
            Self::InvalidCommand(c) => write!(f, "invalid command 0x{c:02x}"),
            Self::InvalidAtyp(a) => write!(f, "invalid address type 0x{a:02x}"),
            Self::InvalidDomainLen => write!(f, "invalid domain length"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8"),
            Self::InvalidStatus(s) => write!(f, "invalid status byte 0x{s:02x}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that can occur when writing protocol data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Domain name exceeds 255 bytes.
    DomainTooLong,
    /// A length-prefixed field exceeds 65535 bytes.
    FieldTooLong,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainTooLong => write!(f, "domain longer than {MAX_DOMAIN_LEN} bytes"),
            Self::FieldTooLong => write!(f, "field longer than {} bytes", u16::MAX),
        }
    }
}

impl std::error::Error for WriteError {}

/// Parse result for incremental parsing.
///
/// - `Complete(T)` - parsing succeeded.
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total bytes** needed.
/// - `Invalid(e)` - protocol violation, the stream should be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRef<'a> {
    Ipv4([u8; 4]),
    Ipv6([u8; 16]),
    Domain(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRef<'a> {
    pub host: HostRef<'a>,
    pub port: u16,
}

impl AddressRef<'_> {
    pub fn to_owned(&self) -> Address {
        let host = match &self.host {
            HostRef::Ipv4(ip) => Host::Ipv4(Ipv4Addr::from(*ip)),
            HostRef::Ipv6(ip) => Host::Ipv6(Ipv6Addr::from(*ip)),
            HostRef::Domain(d) => Host::Domain(String::from_utf8_lossy(d).into_owned()),
        };
        Address {
            host,
            port: self.port,
        }
    }
}

/// Owned destination address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: Host,
    pub port: u16,
}

impl Address {
    pub fn as_ref(&self) -> AddressRef<'_> {
        let host = match &self.host {
            Host::Ipv4(ip) => HostRef::Ipv4(ip.octets()),
            Host::Ipv6(ip) => HostRef::Ipv6(ip.octets()),
            Host::Domain(d) => HostRef::Domain(d.as_bytes()),
        };
        AddressRef {
            host,
            port: self.port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::Ipv6(ip) => write!(f, "[{ip}]:{}", self.port),
            Host::Domain(d) => write!(f, "{d}:{}", self.port),
        }
    }
}

/// Session hello sent by the client right after the QUIC handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub version: u8,
    pub up_bps: u64,
    pub down_bps: u64,
    pub name: &'a [u8],
    pub extra: &'a [u8],
    pub frame_len: usize,
}

/// Status reply used both for the session hello and for each stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status<'a> {
    pub ok: bool,
    pub message: &'a [u8],
    pub frame_len: usize,
}

impl Status<'_> {
    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(self.message).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest<'a> {
    pub command: u8,
    pub address: AddressRef<'a>,
    pub frame_len: usize,
}

// ============================================================================
// Writers
// ============================================================================

#[allow(clippy::cast_possible_truncation)]
pub fn write_client_hello(
    buf: &mut BytesMut,
    up_bps: u64,
    down_bps: u64,
    name: &[u8],
    extra: &[u8],
) -> Result<(), WriteError> {
    if name.len() > u16::MAX as usize || extra.len() > u16::MAX as usize {
        return Err(WriteError::FieldTooLong);
    }
    buf.extend_from_slice(&[PROTOCOL_VERSION]);
    buf.extend_from_slice(&up_bps.to_be_bytes());
    buf.extend_from_slice(&down_bps.to_be_bytes());
    write_short_field(buf, name);
    write_short_field(buf, extra);
    Ok(())
}

/// Writes a status reply. An `ok` reply normally carries an empty message.
pub fn write_status(buf: &mut BytesMut, ok: bool, message: &[u8]) -> Result<(), WriteError> {
    if message.len() > u16::MAX as usize {
        return Err(WriteError::FieldTooLong);
    }
    buf.extend_from_slice(&[if ok { STATUS_OK } else { STATUS_FAILED }]);
    write_short_field(buf, message);
    Ok(())
}

pub fn write_stream_request(buf: &mut BytesMut, address: &AddressRef<'_>) -> Result<(), WriteError> {
    if let HostRef::Domain(d) = &address.host
        && d.len() > MAX_DOMAIN_LEN
    {
        return Err(WriteError::DomainTooLong);
    }
    buf.extend_from_slice(&[CMD_CONNECT, address_atyp(address)]);
    write_address_unchecked(buf, address);
    Ok(())
}

// ============================================================================
// Parsers
// ============================================================================

#[inline]
pub fn parse_client_hello(buf: &[u8]) -> ParseResult<ClientHello<'_>> {
    const FIXED: usize = 1 + 8 + 8;
    if buf.is_empty() {
        return ParseResult::Incomplete(1);
    }
    if buf[0] != PROTOCOL_VERSION {
        return ParseResult::Invalid(ParseError::InvalidVersion(buf[0]));
    }
    if buf.len() < FIXED {
        return ParseResult::Incomplete(FIXED);
    }
    let up_bps = read_u64(&buf[1..9]);
    let down_bps = read_u64(&buf[9..17]);

    let (name, name_end) = match parse_short_field(buf, FIXED) {
        ParseResult::Complete(v) => v,
        ParseResult::Incomplete(n) => return ParseResult::Incomplete(n),
        ParseResult::Invalid(e) => return ParseResult::Invalid(e),
    };
    let (extra, end) = match parse_short_field(buf, name_end) {
        ParseResult::Complete(v) => v,
        ParseResult::Incomplete(n) => return ParseResult::Incomplete(n),
        ParseResult::Invalid(e) => return ParseResult::Invalid(e),
    };

    ParseResult::Complete(ClientHello {
        version: buf[0],
        up_bps,
        down_bps,
        name,
        extra,
        frame_len: end,
    })
}

#[inline]
pub fn parse_status(buf: &[u8]) -> ParseResult<Status<'_>> {
    if buf.is_empty() {
        return ParseResult::Incomplete(1);
    }
    let ok = match buf[0] {
        STATUS_OK => true,
        STATUS_FAILED => false,
        other => return ParseResult::Invalid(ParseError::InvalidStatus(other)),
    };
    match parse_short_field(buf, 1) {
        ParseResult::Complete((message, end)) => ParseResult::Complete(Status {
            ok,
            message,
            frame_len: end,
        }),
        ParseResult::Incomplete(n) => ParseResult::Incomplete(n),
        ParseResult::Invalid(e) => ParseResult::Invalid(e),
    }
}

#[inline]
pub fn parse_stream_request(buf: &[u8]) -> ParseResult<StreamRequest<'_>> {
    if buf.len() < 2 {
        return ParseResult::Incomplete(2);
    }
    let command = buf[0];
    if command != CMD_CONNECT {
        return ParseResult::Invalid(ParseError::InvalidCommand(command));
    }
    match parse_address(buf[1], &buf[2..]) {
        ParseResult::Complete((address, len)) => ParseResult::Complete(StreamRequest {
            command,
            address,
            frame_len: 2 + len,
        }),
        ParseResult::Incomplete(n) => ParseResult::Incomplete(2 + n),
        ParseResult::Invalid(e) => ParseResult::Invalid(e),
    }
}

/// Parse a SOCKS5-layout address (without the atyp byte) from `buf`.
///
/// Returns the address and the number of bytes consumed.
#[inline]
pub fn parse_address(atyp: u8, buf: &[u8]) -> ParseResult<(AddressRef<'_>, usize)> {
    match atyp {
        ATYP_IPV4 => {
            if buf.len() < 6 {
                return ParseResult::Incomplete(6);
            }
            let host = HostRef::Ipv4([buf[0], buf[1], buf[2], buf[3]]);
            let port = read_u16(&buf[4..6]);
            ParseResult::Complete((AddressRef { host, port }, 6))
        }
        ATYP_DOMAIN => {
            if buf.is_empty() {
                return ParseResult::Incomplete(1);
            }
            let len = buf[0] as usize;
            if len == 0 {
                return ParseResult::Invalid(ParseError::InvalidDomainLen);
            }
            let need = 1 + len + 2;
            if buf.len() < need {
                return ParseResult::Incomplete(need);
            }
            let domain = &buf[1..1 + len];
            if std::str::from_utf8(domain).is_err() {
                return ParseResult::Invalid(ParseError::InvalidUtf8);
            }
            let port = read_u16(&buf[1 + len..need]);
            ParseResult::Complete((
                AddressRef {
                    host: HostRef::Domain(domain),
                    port,
                },
                need,
            ))
        }
        ATYP_IPV6 => {
            if buf.len() < 18 {
                return ParseResult::Incomplete(18);
            }
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&buf[0..16]);
            let port = read_u16(&buf[16..18]);
            ParseResult::Complete((
                AddressRef {
                    host: HostRef::Ipv6(ip),
                    port,
                },
                18,
            ))
        }
        other => ParseResult::Invalid(ParseError::InvalidAtyp(other)),
    }
}

/// Writes address without validation. Caller must ensure domain length <= 255.
#[allow(clippy::cast_possible_truncation)]
fn write_address_unchecked(buf: &mut BytesMut, address: &AddressRef<'_>) {
    match address.host {
        HostRef::Ipv4(ip) => buf.extend_from_slice(&ip),
        HostRef::Ipv6(ip) => buf.extend_from_slice(&ip),
        HostRef::Domain(domain) => {
            debug_assert!(domain.len() <= MAX_DOMAIN_LEN);
            buf.extend_from_slice(&[domain.len() as u8]);
            buf.extend_from_slice(domain);
        }
    }
    buf.extend_from_slice(&address.port.to_be_bytes());
}

#[inline]
fn address_atyp(address: &AddressRef<'_>) -> u8 {
    match address.host {
        HostRef::Ipv4(_) => ATYP_IPV4,
        HostRef::Ipv6(_) => ATYP_IPV6,
        HostRef::Domain(_) => ATYP_DOMAIN,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_short_field(buf: &mut BytesMut, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u16).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Parse a u16-length-prefixed field starting at `offset`; returns the field
/// and the offset just past it.
#[inline]
fn parse_short_field(buf: &[u8], offset: usize) -> ParseResult<(&[u8], usize)> {
    if buf.len() < offset + 2 {
        return ParseResult::Incomplete(offset + 2);
    }
    let len = read_u16(&buf[offset..offset + 2]) as usize;
    let end = offset + 2 + len;
    if buf.len() < end {
        return ParseResult::Incomplete(end);
    }
    ParseResult::Complete((&buf[offset + 2..end], end))
}

#[inline]
fn read_u16(buf: &[u8]) -> u16 {
    debug_assert!(buf.len() >= 2, "read_u16 requires at least 2 bytes");
    u16::from_be_bytes([buf[0], buf[1]])
}

#[inline]
fn read_u64(buf: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[..8]);
    u64::from_be_bytes(raw)
}
