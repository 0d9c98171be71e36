use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use ja3print_core::fingerprint::ja3::JA3_HASH_LEN;

/// Maps JA3 hashes to upstream addresses, with a default for everything else.
#[derive(Debug, Clone)]
pub struct RouteTable {
    default: SocketAddr,
    by_hash: HashMap<String, SocketAddr>,
}

impl RouteTable {
    /// Build the table from `HASH=ADDR` entries.
    ///
    /// Hashes must be 32 hex characters and are stored lowercase, matching
    /// the `ja3_hash` value.
    pub fn parse(default: SocketAddr, entries: &[String]) -> Result<Self> {
        let mut by_hash = HashMap::new();

        for entry in entries {
            let (hash, addr) = entry
                .split_once('=')
                .with_context(|| format!("Invalid route '{}'. Expected HASH=ADDR.", entry))?;

            let hash = hash.trim();
            if hash.len() != JA3_HASH_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!(
                    "Invalid route '{}': '{}' is not a 32-character JA3 hash.",
                    entry,
                    hash
                );
            }

            let addr: SocketAddr = addr
                .trim()
                .parse()
                .with_context(|| format!("Invalid route '{}': bad upstream address", entry))?;

            if by_hash.insert(hash.to_ascii_lowercase(), addr).is_some() {
                bail!("Duplicate route for JA3 hash {}", hash);
            }
        }

        Ok(Self { default, by_hash })
    }

    /// Upstream for a connection; unknown or missing hashes go to the default.
    pub fn select(&self, ja3_hash: Option<&str>) -> SocketAddr {
        ja3_hash
            .and_then(|h| self.by_hash.get(h))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_upstream(&self) -> SocketAddr {
        self.default
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "e7d705a3286e19ea42f587b344ee6865";

    fn default_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn selects_routed_upstream() {
        let routes =
            RouteTable::parse(default_addr(), &[format!("{}=10.0.0.2:443", HASH)]).unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes.select(Some(HASH)), "10.0.0.2:443".parse().unwrap());
    }

    #[test]
    fn falls_back_to_default() {
        let routes =
            RouteTable::parse(default_addr(), &[format!("{}=10.0.0.2:443", HASH)]).unwrap();

        assert!(!routes.is_empty());
        assert_eq!(routes.select(None), default_addr());
        assert_eq!(
            routes.select(Some("00000000000000000000000000000000")),
            default_addr()
        );
        assert_eq!(routes.default_upstream(), default_addr());
    }

    #[test]
    fn no_entries_routes_everything_to_default() {
        let routes = RouteTable::parse(default_addr(), &[]).unwrap();

        assert!(routes.is_empty());
        assert_eq!(routes.len(), 0);
        assert_eq!(routes.select(Some(HASH)), default_addr());
    }

    #[test]
    fn uppercase_hash_is_normalized() {
        let entry = format!("{}=10.0.0.2:443", HASH.to_ascii_uppercase());
        let routes = RouteTable::parse(default_addr(), &[entry]).unwrap();
        assert_eq!(routes.select(Some(HASH)), "10.0.0.2:443".parse().unwrap());
    }

    #[test]
    fn rejects_bad_entries() {
        for entry in [
            "no-separator".to_string(),
            "abc=10.0.0.2:443".to_string(),
            format!("{}=not-an-addr", HASH),
            format!("{}=10.0.0.2", HASH),
        ] {
            assert!(
                RouteTable::parse(default_addr(), &[entry.clone()]).is_err(),
                "expected '{}' to be rejected",
                entry
            );
        }
    }

    #[test]
    fn rejects_duplicate_hash() {
        let entries = vec![
            format!("{}=10.0.0.2:443", HASH),
            format!("{}=10.0.0.3:443", HASH),
        ];
        assert!(RouteTable::parse(default_addr(), &entries).is_err());
    }
}
