use std::collections::TryReserveError;

use thiserror::Error;

use crate::fingerprint::clienthello::ParseError;

/// Errors raised while evaluating a fingerprint for one connection.
///
/// All of them are local to a single evaluation: nothing is retried and the
/// connection itself is left untouched.
#[derive(Debug, Error)]
pub enum Ja3Error {
    /// No connection state or no complete ClientHello is available yet.
    #[error("no TLS session available")]
    NoSession,

    /// The ClientHello bytes violate the TLS structure.
    #[error("malformed ClientHello: {0}")]
    MalformedInput(#[from] ParseError),

    /// The output buffer for the fingerprint could not be reserved or written.
    #[error("failed to allocate fingerprint buffer")]
    AllocationFailure,
}

impl From<TryReserveError> for Ja3Error {
    fn from(_: TryReserveError) -> Self {
        Ja3Error::AllocationFailure
    }
}

// `write!` into a `String` only fails when the string cannot grow.
impl From<std::fmt::Error> for Ja3Error {
    fn from(_: std::fmt::Error) -> Self {
        Ja3Error::AllocationFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_errors_are_allocation_failures() {
        assert!(matches!(
            Ja3Error::from(std::fmt::Error),
            Ja3Error::AllocationFailure
        ));

        let reserve = Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err();
        assert!(matches!(
            Ja3Error::from(reserve),
            Ja3Error::AllocationFailure
        ));
    }

    #[test]
    fn parse_errors_are_malformed_input() {
        let err = Ja3Error::from(ParseError::NotClientHello(0x02));
        assert!(matches!(err, Ja3Error::MalformedInput(_)));
        assert_eq!(
            err.to_string(),
            "malformed ClientHello: not a ClientHello message (handshake type 0x02)"
        );
    }
}
