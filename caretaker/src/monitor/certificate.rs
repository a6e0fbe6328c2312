//! Reading certificate end dates
//!
//! Subjects are either `host[:port]` (read over TLS) or `file:<path>` for a
//! PEM on disk. Both go through `openssl` and produce a `notAfter=` line,
//! which is parsed with chrono alone; there is no per-platform date fallback.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::constants::defaults::HTTPS_PORT;
use crate::errors::{EngineError, EngineResult};
use crate::exec::CommandExecutor;

#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn not_after(&self, subject: &str) -> EngineResult<DateTime<Utc>>;
}

pub struct OpensslCertificateSource {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl OpensslCertificateSource {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    fn enddate_command(subject: &str) -> String {
        if let Some(path) = subject.strip_prefix("file:") {
            return format!("openssl x509 -noout -enddate -in '{}'", path);
        }

        let (host, port) = match subject.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => (host, port.to_string()),
            _ => (subject, HTTPS_PORT.to_string()),
        };

        format!(
            "echo | openssl s_client -servername '{host}' -connect '{host}:{port}' 2>/dev/null | openssl x509 -noout -enddate",
            host = host,
            port = port
        )
    }
}

#[async_trait]
impl CertificateSource for OpensslCertificateSource {
    async fn not_after(&self, subject: &str) -> EngineResult<DateTime<Utc>> {
        let command = Self::enddate_command(subject);
        let output = self.executor.run(&command, self.timeout).await?;
        let text = output.stdout_lossy();
        debug!("Certificate read for {} returned: {}", subject, text.trim());
        parse_openssl_enddate(&text)
    }
}

/// Parses `notAfter=Jan  5 12:00:00 2027 GMT` as printed by `openssl x509 -enddate`
pub fn parse_openssl_enddate(output: &str) -> EngineResult<DateTime<Utc>> {
    let line = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("notAfter="))
        .ok_or_else(|| EngineError::Other(format!("no notAfter line in: {}", output.trim())))?;

    let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_zone = normalized
        .strip_suffix(" GMT")
        .or_else(|| normalized.strip_suffix(" UTC"))
        .unwrap_or(&normalized);

    NaiveDateTime::parse_from_str(without_zone, "%b %d %H:%M:%S %Y")
        .map(|naive| naive.and_utc())
        .map_err(|e| EngineError::Other(format!("unparseable certificate date '{}': {}", line, e)))
}
