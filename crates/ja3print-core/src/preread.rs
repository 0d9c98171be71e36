use tracing::{debug, warn};

use crate::fingerprint::clienthello::handshake_len;
use crate::variables::ClientHelloSource;

const RECORD_HEADER_LEN: usize = 5;
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// Default cap on buffered preread bytes.
pub const DEFAULT_MAX_PREREAD: usize = 32 * 1024;

/// State of a connection's preread buffer after the latest push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrereadStatus {
    /// The ClientHello is not fully buffered yet.
    NeedMore,
    /// Every record carrying the first handshake message is buffered.
    Complete,
    /// The stream does not start with a TLS handshake record.
    NotTls,
    /// The ClientHello would exceed the configured buffer cap.
    TooLarge,
}

impl PrereadStatus {
    /// Whether the host should stop reading and move on.
    pub fn is_final(self) -> bool {
        self != PrereadStatus::NeedMore
    }
}

/// Accumulates the first bytes of one connection until a complete TLS
/// ClientHello is available for fingerprinting.
///
/// All received bytes are kept so the host can replay them upstream. Once a
/// final status is reached the buffer never changes state again, so a
/// ClientHello that was available stays available.
pub struct PrereadBuffer {
    data: Vec<u8>,
    /// End offset of the last record holding the ClientHello.
    hello_end: Option<usize>,
    status: PrereadStatus,
    max_len: usize,
}

impl PrereadBuffer {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_PREREAD)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            data: Vec::new(),
            hello_end: None,
            status: PrereadStatus::NeedMore,
            max_len,
        }
    }

    /// Append bytes read from the connection and re-check completeness.
    ///
    /// Bytes pushed after a final status are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> PrereadStatus {
        if self.status.is_final() {
            return self.status;
        }

        self.data.extend_from_slice(chunk);
        self.status = self.scan();

        match self.status {
            PrereadStatus::NeedMore => {
                debug!("Buffering ClientHello: {} bytes so far", self.data.len());
            }
            PrereadStatus::Complete => {
                debug!(
                    "ClientHello buffered: {} bytes ({} total)",
                    self.hello_end.unwrap_or(0),
                    self.data.len()
                );
            }
            PrereadStatus::NotTls => {
                debug!("Stream does not start with a TLS handshake record");
            }
            PrereadStatus::TooLarge => {
                warn!(
                    "ClientHello exceeds preread limit of {} bytes, giving up",
                    self.max_len
                );
            }
        }

        self.status
    }

    pub fn status(&self) -> PrereadStatus {
        self.status
    }

    /// Everything received so far, for replay to the upstream.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Walk the record headers and decide whether the first handshake
    /// message is fully buffered.
    fn scan(&mut self) -> PrereadStatus {
        if self
            .data
            .first()
            .is_some_and(|b| *b != CONTENT_TYPE_HANDSHAKE)
        {
            return PrereadStatus::NotTls;
        }

        let mut pos = 0;
        // first handshake bytes, enough to read the message length
        let mut header: Vec<u8> = Vec::with_capacity(4);
        let mut payload = 0usize;

        loop {
            if self.data.len() < pos + RECORD_HEADER_LEN {
                return self.need_more();
            }

            let content_type = self.data[pos];
            if content_type != CONTENT_TYPE_HANDSHAKE {
                if pos == 0 {
                    return PrereadStatus::NotTls;
                }
                // Handshake cut short by another record type; let the
                // parser report it.
                self.hello_end = Some(pos);
                return PrereadStatus::Complete;
            }

            let record_len =
                u16::from_be_bytes([self.data[pos + 3], self.data[pos + 4]]) as usize;
            let record_end = pos + RECORD_HEADER_LEN + record_len;
            if record_end > self.max_len {
                return PrereadStatus::TooLarge;
            }
            if self.data.len() < record_end {
                return self.need_more();
            }

            let body = &self.data[pos + RECORD_HEADER_LEN..record_end];
            let missing = 4usize.saturating_sub(header.len());
            header.extend_from_slice(&body[..missing.min(body.len())]);
            payload += record_len;
            pos = record_end;

            if let Some(total) = handshake_len(&header) {
                if payload >= total {
                    self.hello_end = Some(pos);
                    return PrereadStatus::Complete;
                }
                if total + RECORD_HEADER_LEN > self.max_len {
                    return PrereadStatus::TooLarge;
                }
            }
        }
    }

    fn need_more(&self) -> PrereadStatus {
        if self.data.len() >= self.max_len {
            PrereadStatus::TooLarge
        } else {
            PrereadStatus::NeedMore
        }
    }
}

impl Default for PrereadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHelloSource for PrereadBuffer {
    fn client_hello(&self) -> Option<&[u8]> {
        self.hello_end.map(|end| &self.data[..end])
    }
}
