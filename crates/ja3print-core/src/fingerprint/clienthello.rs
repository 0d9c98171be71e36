use std::borrow::Cow;

use tls_parser::nom::Err as NomErr;
use tls_parser::{parse_tls_raw_record, TlsRecordType};
use tracing::debug;

use crate::fingerprint::grease::is_grease;
use crate::fingerprint::types::ClientHelloFields;

const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;
const HANDSHAKE_HEADER_LEN: usize = 4;
const RANDOM_LEN: usize = 32;

/// Extension type: Supported Groups (formerly Elliptic Curves).
pub const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
/// Extension type: EC Point Formats.
pub const EXT_EC_POINT_FORMATS: u16 = 0x000b;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{field} length {len} is not a multiple of {width}")]
    UnalignedList {
        field: &'static str,
        len: usize,
        width: usize,
    },
    #[error("not a TLS handshake record (content type 0x{0:02x})")]
    NotHandshake(u8),
    #[error("not a ClientHello message (handshake type 0x{0:02x})")]
    NotClientHello(u8),
    #[error("TLS parse error: {0}")]
    TlsParseError(String),
}

/// Bounds-checked big-endian cursor over a borrowed byte span.
///
/// Every read checks the declared size against what is left, so a length
/// field can never run past the buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        if n > self.buf.len() {
            return Err(ParseError::Truncated {
                field,
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, ParseError> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, ParseError> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self, field: &'static str) -> Result<usize, ParseError> {
        let b = self.take(3, field)?;
        Ok(((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    /// Read a vector prefixed by a 1-byte length.
    fn vec8(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let len = self.u8(field)? as usize;
        self.take(len, field)
    }

    /// Read a vector prefixed by a 2-byte length.
    fn vec16(&mut self, field: &'static str) -> Result<&'a [u8], ParseError> {
        let len = self.u16(field)? as usize;
        self.take(len, field)
    }
}

/// Decode a byte vector of 2-byte codes, rejecting a dangling odd byte.
fn u16_list<'a>(
    bytes: &'a [u8],
    field: &'static str,
) -> Result<impl Iterator<Item = u16> + 'a, ParseError> {
    if bytes.len() % 2 != 0 {
        return Err(ParseError::UnalignedList {
            field,
            len: bytes.len(),
            width: 2,
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]])))
}

/// Parse a ClientHello handshake message into the fields used by JA3.
///
/// The input starts at the handshake header (type + 24-bit length), i.e. the
/// record layer framing has already been stripped. GREASE values are dropped
/// from the cipher, extension and group lists; everything else keeps wire
/// order, duplicates included.
pub fn parse_client_hello(message: &[u8]) -> Result<ClientHelloFields, ParseError> {
    let mut r = Reader::new(message);

    let msg_type = r.u8("handshake type")?;
    if msg_type != HANDSHAKE_TYPE_CLIENT_HELLO {
        return Err(ParseError::NotClientHello(msg_type));
    }
    let len = r.u24("handshake length")?;
    let mut body = Reader::new(r.take(len, "handshake body")?);
    if !r.is_empty() {
        debug!("{} bytes follow the ClientHello message", r.remaining());
    }

    let version = body.u16("client version")?;
    body.take(RANDOM_LEN, "random")?;
    body.vec8("session id")?;
    let ciphers = u16_list(body.vec16("cipher suites")?, "cipher suites")?
        .filter(|c| !is_grease(*c))
        .collect();
    body.vec8("compression methods")?;

    let mut fields = ClientHelloFields {
        version,
        ciphers,
        ..Default::default()
    };

    // SSLv3-era hellos may end right after the compression methods.
    if body.is_empty() {
        debug!("ClientHello carries no extensions block");
        return Ok(fields);
    }

    parse_extensions(body.vec16("extensions")?, &mut fields)?;
    if !body.is_empty() {
        debug!("{} bytes follow the extensions block", body.remaining());
    }

    debug!(
        "Parsed ClientHello: version=0x{:04x}, {} ciphers, {} extensions, {} groups, {} point formats",
        fields.version,
        fields.ciphers.len(),
        fields.extensions.len(),
        fields.groups.len(),
        fields.point_formats.len()
    );

    Ok(fields)
}

fn parse_extensions(block: &[u8], fields: &mut ClientHelloFields) -> Result<(), ParseError> {
    let mut r = Reader::new(block);

    while !r.is_empty() {
        let ext_type = r.u16("extension type")?;
        let data = r.vec16("extension data")?;

        if is_grease(ext_type) {
            continue;
        }
        fields.extensions.push(ext_type);

        match ext_type {
            EXT_SUPPORTED_GROUPS => {
                let mut ext = Reader::new(data);
                fields.groups = u16_list(ext.vec16("supported groups")?, "supported groups")?
                    .filter(|g| !is_grease(*g))
                    .collect();
            }
            EXT_EC_POINT_FORMATS => {
                let mut ext = Reader::new(data);
                fields.point_formats = ext.vec8("ec point formats")?.to_vec();
            }
            _ => {}
        }
    }

    Ok(())
}

/// Parse raw bytes from a TCP stream into `ClientHelloFields`.
///
/// The input should be the raw bytes peeked from a TCP connection,
/// starting with the TLS record header.
pub fn parse_client_hello_record(raw: &[u8]) -> Result<ClientHelloFields, ParseError> {
    let message = handshake_message(raw)?;
    parse_client_hello(&message)
}

/// Strip TLS record framing and return the first handshake message.
///
/// A ClientHello may be fragmented over several consecutive handshake
/// records; fragments are joined until the length announced in the handshake
/// header is covered. The single-record case borrows without copying.
pub fn handshake_message(raw: &[u8]) -> Result<Cow<'_, [u8]>, ParseError> {
    let mut rest = raw;
    let mut message: Cow<'_, [u8]> = Cow::Borrowed(&[]);

    loop {
        if let Some(total) = handshake_len(&message) {
            if message.len() >= total {
                return Ok(message);
            }
        }

        if rest.is_empty() {
            return Err(ParseError::Truncated {
                field: "handshake message",
                needed: handshake_len(&message).unwrap_or(HANDSHAKE_HEADER_LEN),
                remaining: message.len(),
            });
        }

        let (tail, record) = parse_tls_raw_record(rest).map_err(|e| match e {
            NomErr::Incomplete(needed) => {
                let n = match needed {
                    tls_parser::nom::Needed::Size(s) => s.get(),
                    tls_parser::nom::Needed::Unknown => 0,
                };
                ParseError::Truncated {
                    field: "TLS record",
                    needed: rest.len() + n,
                    remaining: rest.len(),
                }
            }
            _ => ParseError::TlsParseError(format!("{}", e)),
        })?;

        if record.hdr.record_type != TlsRecordType::Handshake {
            return Err(ParseError::NotHandshake(record.hdr.record_type.0));
        }

        if message.is_empty() {
            message = Cow::Borrowed(record.data);
        } else {
            debug!("Joining handshake fragment of {} bytes", record.data.len());
            message.to_mut().extend_from_slice(record.data);
        }
        rest = tail;
    }
}

/// Total size (header included) announced by a handshake header, if enough
/// bytes are present to read it.
pub(crate) fn handshake_len(message: &[u8]) -> Option<usize> {
    if message.len() < HANDSHAKE_HEADER_LEN {
        return None;
    }
    let body_len =
        ((message[1] as usize) << 16) | ((message[2] as usize) << 8) | message[3] as usize;
    Some(HANDSHAKE_HEADER_LEN + body_len)
}
