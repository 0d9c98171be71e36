use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use ja3print_core::preread::PrereadBuffer;
use ja3print_core::variables::{Variable, VariableRegistry, JA3, JA3_HASH};

use crate::output::{self, ConnectionReport, OutputFormat};
use crate::routes::RouteTable;

/// Settings shared by every connection, fixed at startup.
pub struct ProxyConfig {
    pub ja3: Variable,
    pub ja3_hash: Variable,
    pub routes: RouteTable,
    pub preread_timeout: Duration,
    pub max_preread: usize,
    pub format: OutputFormat,
    pub verbose: bool,
}

/// Look up a variable once, at configuration load.
pub fn resolve_variable(registry: &VariableRegistry, name: &str) -> Result<Variable> {
    registry
        .get(name)
        .copied()
        .with_context(|| format!("unknown variable \"{}\"", name))
}

impl ProxyConfig {
    pub fn new(
        registry: &VariableRegistry,
        routes: RouteTable,
        preread_timeout: Duration,
        max_preread: usize,
        format: OutputFormat,
        verbose: bool,
    ) -> Result<Self> {
        Ok(Self {
            ja3: resolve_variable(registry, JA3)?,
            ja3_hash: resolve_variable(registry, JA3_HASH)?,
            routes,
            preread_timeout,
            max_preread,
            format,
            verbose,
        })
    }
}

/// Read from the client until the buffer reaches a final state, the client
/// stops sending, or the timeout expires. Running out of time or data is not
/// an error; the buffer simply stays incomplete.
pub async fn preread<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut PrereadBuffer,
    timeout: Duration,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];

    let read_loop = async {
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                debug!("client closed during preread ({} bytes buffered)", buf.len());
                return Ok(());
            }
            if buf.push(&chunk[..n]).is_final() {
                return Ok(());
            }
        }
    };

    let outcome = tokio::time::timeout(timeout, read_loop).await;
    match outcome {
        Ok(res) => res,
        Err(_) => {
            debug!("preread timed out after {:?} ({} bytes buffered)", timeout, buf.len());
            Ok(())
        }
    }
}

/// Evaluate both fingerprint values and pick the upstream.
///
/// A failed evaluation leaves the connection alone: it is reported and sent
/// to the default upstream.
pub fn evaluate(peer: SocketAddr, buf: &PrereadBuffer, config: &ProxyConfig) -> ConnectionReport {
    let mut report = ConnectionReport {
        peer,
        upstream: config.routes.default_upstream(),
        preread: buf.status(),
        preread_bytes: buf.len(),
        ja3: None,
        ja3_hash: None,
        error: None,
    };

    match config.ja3_hash.evaluate(buf) {
        Ok(eval) => report.ja3_hash = eval.value().map(str::to_owned),
        Err(e) => report.error = Some(e.to_string()),
    }
    if report.error.is_none() {
        match config.ja3.evaluate(buf) {
            Ok(eval) => report.ja3 = eval.value().map(str::to_owned),
            Err(e) => report.error = Some(e.to_string()),
        }
    }

    report.upstream = config.routes.select(report.ja3_hash.as_deref());
    report
}

/// Preread, fingerprint, route and then proxy one client connection.
pub async fn handle(mut client: TcpStream, peer: SocketAddr, config: &ProxyConfig) -> Result<()> {
    let mut buf = PrereadBuffer::with_max_len(config.max_preread);
    preread(&mut client, &mut buf, config.preread_timeout)
        .await
        .context("preread failed")?;

    let report = evaluate(peer, &buf, config);
    output::print_report(&report, config.format, config.verbose);

    let mut upstream = TcpStream::connect(report.upstream)
        .await
        .with_context(|| format!("failed to connect to upstream {}", report.upstream))?;
    upstream
        .write_all(buf.as_bytes())
        .await
        .context("failed to replay preread bytes")?;

    let (up, down) = tokio::io::copy_bidirectional(&mut client, &mut upstream)
        .await
        .context("proxying failed")?;
    debug!(
        "[{}] closed: {} bytes to upstream, {} bytes to client",
        peer,
        buf.len() as u64 + up,
        down
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ja3print_core::fingerprint::ja3::ja3_hash;
    use ja3print_core::preread::PrereadStatus;
    use tokio::net::TcpListener;

    const EXAMPLE_JA3: &str = "771,4865-49199,0-10,29,";

    /// ClientHello record: version 0x0303, ciphers [0x1301, GREASE, 0xC02F],
    /// extensions server_name and supported_groups [x25519].
    fn example_record() -> Vec<u8> {
        let mut body = vec![0x03, 0x03];
        body.extend_from_slice(&[0u8; 32]);
        body.push(0x00);
        body.extend_from_slice(&[0x00, 0x06, 0x13, 0x01, 0x0A, 0x0A, 0xC0, 0x2F]);
        body.extend_from_slice(&[0x01, 0x00]);
        let ext = [
            0x00, 0x00, 0x00, 0x00, // server_name, empty
            0x00, 0x0A, 0x00, 0x04, 0x00, 0x02, 0x00, 0x1D, // supported_groups
        ];
        body.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext);

        let len = body.len();
        let mut msg = vec![0x01, (len >> 16) as u8, (len >> 8) as u8, len as u8];
        msg.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01];
        record.extend_from_slice(&(msg.len() as u16).to_be_bytes());
        record.extend_from_slice(&msg);
        record
    }

    fn config(routes: RouteTable) -> ProxyConfig {
        ProxyConfig::new(
            &VariableRegistry::with_ja3(),
            routes,
            Duration::from_millis(500),
            4096,
            OutputFormat::Json,
            false,
        )
        .unwrap()
    }

    fn default_routes() -> RouteTable {
        RouteTable::parse("127.0.0.1:9".parse().unwrap(), &[]).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn preread_collects_split_hello() {
        let raw = example_record();
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = {
            let raw = raw.clone();
            tokio::spawn(async move {
                client.write_all(&raw[..20]).await.unwrap();
                client.write_all(&raw[20..]).await.unwrap();
                client
            })
        };

        let mut buf = PrereadBuffer::new();
        preread(&mut server, &mut buf, Duration::from_secs(5))
            .await
            .unwrap();
        let _client = writer.await.unwrap();

        assert_eq!(buf.status(), PrereadStatus::Complete);
        assert_eq!(buf.as_bytes(), raw.as_slice());
    }

    #[tokio::test]
    async fn preread_stops_on_timeout() {
        let (_client, mut server) = tokio::io::duplex(64);
        let mut buf = PrereadBuffer::new();

        preread(&mut server, &mut buf, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(buf.status(), PrereadStatus::NeedMore);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn preread_stops_on_eof() {
        let raw = example_record();
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&raw[..10]).await.unwrap();
        drop(client);

        let mut buf = PrereadBuffer::new();
        preread(&mut server, &mut buf, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(buf.status(), PrereadStatus::NeedMore);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn evaluate_resolves_and_routes() {
        let hash = ja3_hash(EXAMPLE_JA3);
        let routes = RouteTable::parse(
            "127.0.0.1:9".parse().unwrap(),
            &[format!("{}=10.0.0.2:443", hash)],
        )
        .unwrap();
        let config = config(routes);

        let mut buf = PrereadBuffer::new();
        buf.push(&example_record());
        let report = evaluate(peer(), &buf, &config);

        assert_eq!(report.ja3.as_deref(), Some(EXAMPLE_JA3));
        assert_eq!(report.ja3_hash.as_deref(), Some(hash.as_str()));
        assert_eq!(report.upstream, "10.0.0.2:443".parse().unwrap());
        assert_eq!(report.outcome(), "resolved");
    }

    #[test]
    fn evaluate_incomplete_is_unavailable() {
        let config = config(default_routes());
        let mut buf = PrereadBuffer::new();
        buf.push(&example_record()[..12]);

        let report = evaluate(peer(), &buf, &config);
        assert_eq!(report.outcome(), "unavailable");
        assert_eq!(report.upstream, "127.0.0.1:9".parse().unwrap());
    }

    #[test]
    fn evaluate_malformed_falls_back_to_default() {
        let config = config(default_routes());
        let mut raw = example_record();
        raw[5] = 0x02; // ServerHello handshake type
        let mut buf = PrereadBuffer::new();
        buf.push(&raw);

        let report = evaluate(peer(), &buf, &config);
        assert_eq!(report.outcome(), "failed");
        assert!(report.ja3_hash.is_none());
        assert_eq!(report.upstream, "127.0.0.1:9".parse().unwrap());
    }

    #[tokio::test]
    async fn handle_replays_hello_to_routed_upstream() {
        let raw = example_record();

        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        let routes = RouteTable::parse(
            "127.0.0.1:9".parse().unwrap(),
            &[format!("{}={}", ja3_hash(EXAMPLE_JA3), upstream_addr)],
        )
        .unwrap();
        let config = config(routes);

        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        let proxy_task = tokio::spawn(async move {
            let (stream, peer) = proxy.accept().await.unwrap();
            handle(stream, peer, &config).await
        });

        let expected = raw.clone();
        let upstream_task = tokio::spawn(async move {
            let (mut stream, _) = upstream.accept().await.unwrap();
            let mut received = vec![0u8; expected.len()];
            stream.read_exact(&mut received).await.unwrap();
            stream.write_all(b"hello back").await.unwrap();
            received
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&raw).await.unwrap();
        let mut reply = vec![0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(reply, b"hello back");
        assert_eq!(upstream_task.await.unwrap(), raw);
        proxy_task.await.unwrap().unwrap();
    }
}
