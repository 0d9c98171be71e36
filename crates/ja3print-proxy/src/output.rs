use std::net::SocketAddr;

use serde::Serialize;
use tracing::warn;

use ja3print_core::preread::PrereadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid output format '{}'. Expected 'text' or 'json'.", s),
        }
    }
}

/// What the proxy learned about one connection before forwarding it.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub peer: SocketAddr,
    pub upstream: SocketAddr,
    pub preread: PrereadStatus,
    pub preread_bytes: usize,
    pub ja3: Option<String>,
    pub ja3_hash: Option<String>,
    /// Set when fingerprint evaluation failed.
    pub error: Option<String>,
}

impl ConnectionReport {
    pub fn outcome(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else if self.ja3_hash.is_some() {
            "resolved"
        } else {
            "unavailable"
        }
    }
}

fn preread_label(status: PrereadStatus) -> &'static str {
    match status {
        PrereadStatus::NeedMore => "incomplete",
        PrereadStatus::Complete => "complete",
        PrereadStatus::NotTls => "not_tls",
        PrereadStatus::TooLarge => "too_large",
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    peer: String,
    upstream: String,
    preread: &'static str,
    preread_bytes: usize,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ja3_hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ja3: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub fn print_report(report: &ConnectionReport, format: OutputFormat, verbose: bool) {
    match format {
        OutputFormat::Text => println!("{}", render_text(report, verbose)),
        OutputFormat::Json => match render_json(report, verbose) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("[{}] failed to serialize report: {}", report.peer, e),
        },
    }
}

fn render_text(report: &ConnectionReport, verbose: bool) -> String {
    let mut lines = vec![
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_string(),
        format!("  Client:     {}", report.peer),
        format!(
            "  Preread:    {} ({} bytes)",
            preread_label(report.preread),
            report.preread_bytes
        ),
        "  ──────────────────────────────────────────────────".to_string(),
    ];
    match (&report.ja3_hash, &report.error) {
        (_, Some(err)) => lines.push(format!("  JA3:        (failed: {})", err)),
        (Some(hash), None) => lines.push(format!("  JA3:        {}", hash)),
        (None, None) => lines.push("  JA3:        (unavailable)".to_string()),
    }
    if verbose {
        if let Some(raw) = &report.ja3 {
            lines.push(format!("  JA3 raw:    {}", raw));
        }
    }
    lines.push(format!("  Upstream:   {}", report.upstream));
    lines.push("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_string());
    lines.join("\n")
}

fn render_json(report: &ConnectionReport, verbose: bool) -> serde_json::Result<String> {
    let record = JsonRecord {
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        peer: report.peer.to_string(),
        upstream: report.upstream.to_string(),
        preread: preread_label(report.preread),
        preread_bytes: report.preread_bytes,
        outcome: report.outcome(),
        ja3_hash: report.ja3_hash.as_deref(),
        ja3: if verbose { report.ja3.as_deref() } else { None },
        error: report.error.as_deref(),
    };
    serde_json::to_string(&record)
}
