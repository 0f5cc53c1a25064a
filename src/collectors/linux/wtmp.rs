//! Last clean shutdown from the `wtmp` login accounting file.
//!
//! `shutdown`/`reboot` write a `RUN_LVL` record with user `shutdown` into
//! wtmp; the newest such record is the last orderly shutdown.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::collectors::ShutdownSource;
use crate::error::{MetricError, Result};

/// `struct utmp` as laid out by glibc on 64-bit Linux.
pub const RECORD_SIZE: usize = 384;
pub const RUN_LVL: i16 = 1;

const TYPE_OFFSET: usize = 0;
const LINE_OFFSET: usize = 8;
const LINE_LEN: usize = 32;
const USER_OFFSET: usize = 44;
const USER_LEN: usize = 32;
const TV_SEC_OFFSET: usize = 340;
const TV_USEC_OFFSET: usize = 344;

#[derive(Debug, Clone, PartialEq)]
pub struct UtmpRecord {
    pub ut_type: i16,
    pub line: String,
    pub user: String,
    pub seconds: i64,
    pub microseconds: i64,
}

impl UtmpRecord {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < RECORD_SIZE {
            return None;
        }
        Some(Self {
            ut_type: i16::from_ne_bytes([raw[TYPE_OFFSET], raw[TYPE_OFFSET + 1]]),
            line: c_string(&raw[LINE_OFFSET..LINE_OFFSET + LINE_LEN]),
            user: c_string(&raw[USER_OFFSET..USER_OFFSET + USER_LEN]),
            seconds: read_i32(raw, TV_SEC_OFFSET) as i64,
            microseconds: read_i32(raw, TV_USEC_OFFSET) as i64,
        })
    }

    pub fn is_shutdown(&self) -> bool {
        self.ut_type == RUN_LVL && self.user == "shutdown"
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, (self.microseconds.clamp(0, 999_999) * 1000) as u32)
    }
}

fn read_i32(raw: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[offset..offset + 4]);
    i32::from_ne_bytes(bytes)
}

fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Newest shutdown record in a wtmp image. Trailing partial records are
/// ignored.
pub fn last_shutdown(data: &[u8]) -> Option<DateTime<Utc>> {
    data.chunks_exact(RECORD_SIZE)
        .rev()
        .filter_map(UtmpRecord::parse)
        .find(UtmpRecord::is_shutdown)
        .and_then(|record| record.timestamp())
}

pub struct WtmpShutdownSource {
    path: PathBuf,
}

impl WtmpShutdownSource {
    pub fn new() -> Self {
        Self::with_path("/var/log/wtmp")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ShutdownSource for WtmpShutdownSource {
    fn last_shutdown(&self) -> Result<DateTime<Utc>> {
        let data = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                MetricError::unavailable("last shutdown", format!("{}: {}", self.path.display(), e))
            }
            _ => MetricError::transient("last shutdown"),
        })?;
        debug!(path = %self.path.display(), records = data.len() / RECORD_SIZE, "scanning wtmp");

        last_shutdown(&data)
            .ok_or_else(|| MetricError::unavailable("last shutdown", "no shutdown has been recorded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(ut_type: i16, line: &str, user: &str, seconds: i32) -> Vec<u8> {
        let mut raw = vec![0u8; RECORD_SIZE];
        raw[TYPE_OFFSET..TYPE_OFFSET + 2].copy_from_slice(&ut_type.to_ne_bytes());
        raw[LINE_OFFSET..LINE_OFFSET + line.len()].copy_from_slice(line.as_bytes());
        raw[USER_OFFSET..USER_OFFSET + user.len()].copy_from_slice(user.as_bytes());
        raw[TV_SEC_OFFSET..TV_SEC_OFFSET + 4].copy_from_slice(&seconds.to_ne_bytes());
        raw
    }

    const BOOT_TIME: i16 = 2;
    const USER_PROCESS: i16 = 7;

    #[test]
    fn test_parse_record() {
        let parsed = UtmpRecord::parse(&record(RUN_LVL, "~~", "shutdown", 1_700_000_000)).unwrap();

        assert_eq!(parsed.ut_type, RUN_LVL);
        assert_eq!(parsed.line, "~~");
        assert_eq!(parsed.user, "shutdown");
        assert!(parsed.is_shutdown());
        assert_eq!(
            parsed.timestamp(),
            Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
        );
    }

    #[test]
    fn test_last_shutdown_picks_newest_record() {
        let mut data = Vec::new();
        data.extend(record(BOOT_TIME, "~", "reboot", 1_600_000_000));
        data.extend(record(RUN_LVL, "~~", "shutdown", 1_600_001_000));
        data.extend(record(USER_PROCESS, "pts/0", "alice", 1_600_002_000));
        data.extend(record(RUN_LVL, "~~", "shutdown", 1_600_003_000));
        data.extend(record(BOOT_TIME, "~", "reboot", 1_600_004_000));
        // Partial record from an interrupted write.
        data.extend([0u8; 100]);

        assert_eq!(
            last_shutdown(&data),
            Some(Utc.timestamp_opt(1_600_003_000, 0).unwrap())
        );
    }

    #[test]
    fn test_last_shutdown_without_record() {
        let mut data = Vec::new();
        data.extend(record(BOOT_TIME, "~", "reboot", 1_600_000_000));
        data.extend(record(USER_PROCESS, "tty1", "shutdown", 1_600_001_000));

        assert_eq!(last_shutdown(&data), None);
    }

    #[test]
    fn test_source_reports_unavailable() {
        let missing = WtmpShutdownSource::with_path("/nonexistent/wtmp");
        assert!(matches!(
            missing.last_shutdown(),
            Err(MetricError::MetricUnavailable { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wtmp");
        fs::write(&path, record(BOOT_TIME, "~", "reboot", 1_600_000_000)).unwrap();
        assert!(matches!(
            WtmpShutdownSource::with_path(&path).last_shutdown(),
            Err(MetricError::MetricUnavailable { .. })
        ));
    }

    #[test]
    fn test_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wtmp");
        fs::write(&path, record(RUN_LVL, "~~", "shutdown", 1_650_000_000)).unwrap();

        assert_eq!(
            WtmpShutdownSource::with_path(&path).last_shutdown(),
            Ok(Utc.timestamp_opt(1_650_000_000, 0).unwrap())
        );
    }
}
