//! JA3 fingerprinting of TLS ClientHello messages during a connection's
//! preread phase.
//!
//! The pipeline is: raw record bytes → [`fingerprint::clienthello`] →
//! [`fingerprint::types::ClientHelloFields`] → [`fingerprint::ja3`] string and
//! MD5 digest. [`variables`] exposes both as the named values `ja3` and
//! `ja3_hash`; [`preread`] buffers a connection's first bytes until a whole
//! ClientHello is available.

pub mod error;
pub mod fingerprint;
pub mod preread;
pub mod variables;

pub use error::Ja3Error;
