/// Reserved GREASE values (RFC 8701).
///
/// Clients sprinkle these into cipher, extension and group lists to keep
/// servers tolerant of unknown codes. They carry no meaning for a fingerprint.
pub const GREASE_VALUES: [u16; 16] = [
    0x0A0A, 0x1A1A, 0x2A2A, 0x3A3A, 0x4A4A, 0x5A5A, 0x6A6A, 0x7A7A, 0x8A8A, 0x9A9A, 0xAAAA,
    0xBABA, 0xCACA, 0xDADA, 0xEAEA, 0xFAFA,
];

/// Check if a u16 value is one of the 16 GREASE values.
pub fn is_grease(val: u16) -> bool {
    GREASE_VALUES.contains(&val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grease_values() {
        for v in GREASE_VALUES {
            assert!(is_grease(v), "0x{:04X} should be GREASE", v);
            // every entry follows the 0x?A?A shape
            assert_eq!(v & 0x0F0F, 0x0A0A);
            assert_eq!(v >> 8, v & 0xFF);
        }
    }

    #[test]
    fn test_non_grease_values() {
        assert!(!is_grease(0x0301)); // TLS 1.0
        assert!(!is_grease(0x0303)); // TLS 1.2
        assert!(!is_grease(0xC02B)); // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
        assert!(!is_grease(0x1301)); // TLS_AES_128_GCM_SHA256
        assert!(!is_grease(0x00FF)); // TLS_EMPTY_RENEGOTIATION_INFO_SCSV
        assert!(!is_grease(0x0A1A)); // right nibbles, mismatched bytes
        assert!(!is_grease(0x000A)); // supported_groups extension code
    }

    #[test]
    fn test_table_is_distinct() {
        let mut sorted = GREASE_VALUES.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 16);
    }
}
