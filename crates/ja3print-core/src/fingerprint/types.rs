/// ClientHello fields that make up a JA3 fingerprint.
///
/// Built fresh for every evaluation and dropped once the fingerprint has been
/// rendered. GREASE values are already removed from `ciphers`, `extensions`
/// and `groups`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHelloFields {
    /// Legacy client version from the ClientHello body (e.g., 0x0303 for TLS 1.2)
    pub version: u16,
    /// Cipher suite values in wire order
    pub ciphers: Vec<u16>,
    /// Extension type codes in wire order
    pub extensions: Vec<u16>,
    /// Supported groups / named curves (from extension 0x000a)
    pub groups: Vec<u16>,
    /// EC point format values (from extension 0x000b)
    pub point_formats: Vec<u8>,
}

/// Result of a JA3 fingerprint computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja3Result {
    /// 32-character lowercase MD5 hex digest of `raw_string`
    pub hash: String,
    /// The canonical fingerprint string before hashing
    pub raw_string: String,
}
