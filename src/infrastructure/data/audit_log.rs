// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HEADER: &str = "Timestamp,Block,Type,Price,Tick,Details";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Entry,
    Rebalance,
    StopLoss,
    Error,
    Info,
    StrategyMetrics,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditKind::Entry => "ENTRY",
            AuditKind::Rebalance => "REBALANCE",
            AuditKind::StopLoss => "STOP_LOSS",
            AuditKind::Error => "ERROR",
            AuditKind::Info => "INFO",
            AuditKind::StrategyMetrics => "STRATEGY_METRICS",
        };
        f.write_str(s)
    }
}

/// Append-only CSV audit of every decision of consequence, flushed per
/// line. Lost lines are acceptable only on a hard crash mid-write.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Initialization(format!("create {}: {e}", parent.display())))?;
        }
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Initialization(format!("open {}: {e}", path.display())))?;
        if fresh {
            writeln!(file, "{HEADER}")
                .map_err(|e| AppError::Initialization(format!("write header: {e}")))?;
            file.flush().ok();
        }
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, block: u64, kind: AuditKind, price: f64, tick: i32, details: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let line = format!(
            "{timestamp},{block},{kind},{price:.4},{tick},{}",
            sanitize(details)
        );
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
            tracing::warn!(target: "strategy", error = %e, "Audit line dropped");
        }
    }
}

/// CSV field hygiene: commas become semicolons, double quotes single.
fn sanitize(details: &str) -> String {
    details.replace(',', ";").replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> AuditLog {
        let dir = std::env::temp_dir().join(format!("ranger-audit-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        AuditLog::open(dir.join("strategy_audit.csv")).unwrap()
    }

    #[test]
    fn sanitize_replaces_commas_and_quotes() {
        assert_eq!(sanitize(r#"exit "ok", mint"#), "exit 'ok'; mint");
    }

    #[test]
    fn header_written_once_and_lines_append() {
        let log = temp_log("header");
        log.record(100, AuditKind::Entry, 2500.0, -197_000, "minted 42");
        log.record(101, AuditKind::Info, 2500.5, -196_990, "hold, in range");

        let body = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains(",ENTRY,"));
        assert!(lines[2].contains(",INFO,"));
    }

    #[test]
    fn reopen_does_not_duplicate_header() {
        let dir = std::env::temp_dir().join(format!("ranger-audit-reopen-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("strategy_audit.csv");
        {
            let log = AuditLog::open(&path).unwrap();
            log.record(1, AuditKind::Error, 0.0, 0, "boom");
        }
        let log = AuditLog::open(&path).unwrap();
        log.record(2, AuditKind::StopLoss, 0.0, 0, "stopped");
        let body = fs::read_to_string(log.path()).unwrap();
        assert_eq!(body.matches(HEADER).count(), 1);
        assert_eq!(body.lines().count(), 3);
    }
}
