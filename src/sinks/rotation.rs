//! Rotation triggers, the active file handle and historical file naming
//!
//! A rotated file is renamed to `{file_name}.{marker}` where the marker is
//! a local timestamp with millisecond precision followed by a per-sink
//! sequence number, e.g. `app.log.20240131235959123-000042`. Markers sort
//! lexicographically in rotation order.

use crate::core::config::{parse_duration, parse_size};
use crate::core::error::{LoggerError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MARKER_STAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const MARKER_STAMP_LEN: usize = 17;
const MARKER_SEQ_LEN: usize = 6;

/// When the active file of a sink is closed and replaced
///
/// # Examples
///
/// ```
/// use rust_log_manager::RotationTrigger;
/// use std::time::Duration;
///
/// assert_eq!("10 MB".parse::<RotationTrigger>().unwrap(), RotationTrigger::Size(10_000_000));
/// assert_eq!("1 week".parse::<RotationTrigger>().unwrap(), RotationTrigger::Age(Duration::from_secs(604_800)));
/// assert_eq!("02:00".parse::<RotationTrigger>().unwrap(), RotationTrigger::Daily { hour: 2 });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    /// Rotate before a write would push the file past this many bytes
    Size(u64),

    /// Rotate once the file has been open this long
    Age(Duration),

    /// Rotate at the first local `hour:00` after the file was opened
    Daily { hour: u8 },
}

impl RotationTrigger {
    /// Reject triggers that would rotate on every write or never make sense
    pub fn validate(&self) -> Result<()> {
        match self {
            RotationTrigger::Size(0) => Err(LoggerError::config(
                "rotation",
                "size threshold must be greater than zero",
            )),
            RotationTrigger::Age(age) if age.is_zero() => Err(LoggerError::config(
                "rotation",
                "age threshold must be greater than zero",
            )),
            RotationTrigger::Daily { hour } if *hour > 23 => Err(LoggerError::config(
                "rotation",
                format!("hour must be between 0 and 23, got {}", hour),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for RotationTrigger {
    fn default() -> Self {
        RotationTrigger::Size(10 * 1000 * 1000)
    }
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationTrigger::Size(bytes) => write!(f, "{} bytes", bytes),
            RotationTrigger::Age(age) => write!(f, "{:?}", age),
            RotationTrigger::Daily { hour } => write!(f, "daily at {:02}:00", hour),
        }
    }
}

fn parse_daily(s: &str) -> Option<Result<RotationTrigger>> {
    let lower = s.to_lowercase();
    if matches!(lower.as_str(), "daily" | "midnight") {
        return Some(Ok(RotationTrigger::Daily { hour: 0 }));
    }

    let (hour, minute) = lower.split_once(':')?;
    let hour: u8 = hour.trim().parse().ok()?;
    let minute: u8 = minute.trim().parse().ok()?;
    if minute != 0 {
        return Some(Err(LoggerError::config(
            "rotation",
            format!("daily rotation must be on the hour, got '{}'", s),
        )));
    }
    Some(Ok(RotationTrigger::Daily { hour }))
}

impl FromStr for RotationTrigger {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let trigger = if let Some(daily) = parse_daily(s) {
            daily?
        } else if let Some(bytes) = parse_size(s) {
            RotationTrigger::Size(bytes)
        } else if let Some(age) = parse_duration(s) {
            RotationTrigger::Age(age)
        } else {
            return Err(LoggerError::config(
                "rotation",
                format!("cannot parse rotation '{}'", s),
            ));
        };
        trigger.validate()?;
        Ok(trigger)
    }
}

impl<'de> serde::Deserialize<'de> for RotationTrigger {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Position of a historical file in rotation order
///
/// Markers order by sequence first. The stamp only breaks ties, so a wall
/// clock stepping backwards does not reorder rotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RotationMarker {
    stamp: String,
    sequence: u64,
}

impl Ord for RotationMarker {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.stamp.cmp(&other.stamp))
    }
}

impl PartialOrd for RotationMarker {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl RotationMarker {
    pub fn new(at: DateTime<Local>, sequence: u64) -> Self {
        Self {
            stamp: at.format(MARKER_STAMP_FORMAT).to_string(),
            sequence,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Local time the file was rotated, if the stamp is a valid time
    pub fn rotated_at(&self) -> Option<DateTime<Local>> {
        let seconds = NaiveDateTime::parse_from_str(&self.stamp[..14], "%Y%m%d%H%M%S").ok()?;
        let millis: i64 = self.stamp[14..].parse().ok()?;
        let naive = seconds + ChronoDuration::milliseconds(millis);
        Local.from_local_datetime(&naive).earliest()
    }

    /// Parse `{stamp}-{seq}`
    pub fn parse(s: &str) -> Option<Self> {
        let (stamp, sequence) = s.split_once('-')?;
        if stamp.len() != MARKER_STAMP_LEN
            || sequence.len() < MARKER_SEQ_LEN
            || !stamp.bytes().all(|b| b.is_ascii_digit())
            || !sequence.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self {
            stamp: stamp.to_string(),
            sequence: sequence.parse().ok()?,
        })
    }
}

impl fmt::Display for RotationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:0width$}", self.stamp, self.sequence, width = MARKER_SEQ_LEN)
    }
}

/// Historical path for `active` at `marker`: `{active}.{marker}`
pub fn historical_path(active: &Path, marker: &RotationMarker) -> PathBuf {
    let file_name = active
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    active.with_file_name(format!("{}.{}", file_name, marker))
}

/// The open file of a file sink
///
/// Owned exclusively by one sink and replaced as a whole on rotation.
#[derive(Debug)]
pub struct ActiveFileHandle {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    opened_at: DateTime<Local>,
}

impl ActiveFileHandle {
    /// Open `path` for appending
    ///
    /// Existing content counts towards `bytes_written`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LoggerError::file_sink(path.display().to_string(), format!("Failed to open: {}", e))
            })?;

        let bytes_written = file
            .metadata()
            .map_err(|e| {
                LoggerError::file_sink(
                    path.display().to_string(),
                    format!("Cannot access file metadata: {}", e),
                )
            })?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            bytes_written,
            opened_at: Local::now(),
        })
    }

    /// Write one rendered record and flush it to the OS
    pub fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush())
            .map_err(|e| {
                LoggerError::file_sink(
                    self.path.display().to_string(),
                    format!("Failed to write log record: {}", e),
                )
            })?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| {
            LoggerError::file_sink(self.path.display().to_string(), format!("Failed to flush: {}", e))
        })
    }

    /// Flush and sync to disk, consuming the handle
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.writer.get_ref().sync_all().map_err(|e| {
            LoggerError::file_sink(self.path.display().to_string(), format!("Failed to sync: {}", e))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn opened_at(&self) -> DateTime<Local> {
        self.opened_at
    }

    /// Forget the size so far; used when a rename failed and writing continues
    pub(crate) fn reset_counter(&mut self) {
        self.bytes_written = 0;
        self.opened_at = Local::now();
    }
}

/// Decides when the active file is rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    trigger: RotationTrigger,
}

impl RotationPolicy {
    pub fn new(trigger: RotationTrigger) -> Result<Self> {
        trigger.validate()?;
        Ok(Self { trigger })
    }

    pub fn trigger(&self) -> RotationTrigger {
        self.trigger
    }

    /// Whether the active file must rotate before `incoming_len` more bytes
    /// are written at `now`
    pub fn should_rotate(&self, handle: &ActiveFileHandle, incoming_len: u64, now: DateTime<Local>) -> bool {
        self.check(handle.bytes_written(), handle.opened_at(), incoming_len, now)
    }

    fn check(&self, bytes_written: u64, opened_at: DateTime<Local>, incoming_len: u64, now: DateTime<Local>) -> bool {
        match self.trigger {
            RotationTrigger::Size(max) => {
                bytes_written > 0 && bytes_written.saturating_add(incoming_len) > max
            }
            RotationTrigger::Age(age) => (now - opened_at)
                .to_std()
                .map(|elapsed| elapsed >= age)
                .unwrap_or(false),
            RotationTrigger::Daily { hour } => now >= next_daily_boundary(opened_at, hour),
        }
    }
}

/// First local `hour:00` strictly after `opened_at`
pub fn next_daily_boundary(opened_at: DateTime<Local>, hour: u8) -> DateTime<Local> {
    let mut day = opened_at.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = day
            .and_hms_opt(u32::from(hour), 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        {
            if candidate > opened_at {
                return candidate;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    opened_at + ChronoDuration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use tempfile::tempdir;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).earliest().unwrap()
    }

    #[test]
    fn test_parse_triggers() {
        assert_eq!("500KB".parse::<RotationTrigger>().unwrap(), RotationTrigger::Size(500_000));
        assert_eq!("4096".parse::<RotationTrigger>().unwrap(), RotationTrigger::Size(4096));
        assert_eq!(
            "12 hours".parse::<RotationTrigger>().unwrap(),
            RotationTrigger::Age(Duration::from_secs(43_200))
        );
        assert_eq!("daily".parse::<RotationTrigger>().unwrap(), RotationTrigger::Daily { hour: 0 });
        assert_eq!("23:00".parse::<RotationTrigger>().unwrap(), RotationTrigger::Daily { hour: 23 });
    }

    #[test]
    fn test_invalid_triggers_are_config_errors() {
        for bad in ["0 MB", "0 days", "24:00", "12:30", "whenever"] {
            let err = bad.parse::<RotationTrigger>().unwrap_err();
            assert!(err.is_config(), "{} should be a config error", bad);
        }
        assert!(RotationPolicy::new(RotationTrigger::Size(0)).is_err());
    }

    #[test]
    fn test_size_rule() {
        let policy = RotationPolicy::new(RotationTrigger::Size(100)).unwrap();
        let opened = Local::now();

        // An empty file always accepts, even an oversized record
        assert!(!policy.check(0, opened, 500, opened));
        assert!(!policy.check(60, opened, 40, opened));
        assert!(policy.check(60, opened, 41, opened));
        assert!(policy.check(100, opened, 1, opened));
    }

    #[test]
    fn test_age_rule() {
        let policy = RotationPolicy::new(RotationTrigger::Age(Duration::from_secs(3600))).unwrap();
        let opened = local(2024, 3, 1, 10, 0);

        assert!(!policy.check(10, opened, 1, local(2024, 3, 1, 10, 59)));
        assert!(policy.check(10, opened, 1, local(2024, 3, 1, 11, 0)));
    }

    #[test]
    fn test_daily_boundary() {
        let opened = local(2024, 3, 1, 10, 30);

        let boundary = next_daily_boundary(opened, 2);
        assert_eq!(boundary.date_naive(), local(2024, 3, 2, 0, 0).date_naive());
        assert_eq!(boundary.hour(), 2);

        let boundary = next_daily_boundary(opened, 23);
        assert_eq!(boundary.date_naive(), opened.date_naive());

        let policy = RotationPolicy::new(RotationTrigger::Daily { hour: 23 }).unwrap();
        assert!(!policy.check(1, opened, 1, local(2024, 3, 1, 22, 59)));
        assert!(policy.check(1, opened, 1, local(2024, 3, 1, 23, 0)));
    }

    #[test]
    fn test_marker_format_and_parse() {
        let at = local(2024, 1, 31, 23, 59);
        let marker = RotationMarker::new(at, 42);
        let text = marker.to_string();
        assert_eq!(text, "20240131235900000-000042");

        let parsed = RotationMarker::parse(&text).unwrap();
        assert_eq!(parsed, marker);
        assert_eq!(parsed.rotated_at(), Some(at));

        assert!(RotationMarker::parse("2024-000001").is_none());
        assert!(RotationMarker::parse("20240131235900000-00x042").is_none());
    }

    #[test]
    fn test_markers_sort_in_rotation_order() {
        let at = local(2024, 1, 31, 23, 59);
        let mut markers = vec![
            RotationMarker::new(at, 3),
            RotationMarker::new(at - ChronoDuration::seconds(1), 7),
            RotationMarker::new(at, 2),
        ];
        markers.sort();
        let sequences: Vec<u64> = markers.iter().map(RotationMarker::sequence).collect();
        assert_eq!(sequences, vec![2, 3, 7]);
    }

    #[test]
    fn test_historical_path() {
        let marker = RotationMarker::parse("20240101000000000-000001").unwrap();
        let path = historical_path(Path::new("/var/log/app.log"), &marker);
        assert_eq!(path, PathBuf::from("/var/log/app.log.20240101000000000-000001"));
    }

    #[test]
    fn test_handle_counts_existing_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut handle = ActiveFileHandle::open(&path).unwrap();
        assert_eq!(handle.bytes_written(), 10);

        handle.write_record(b"abc\n").unwrap();
        assert_eq!(handle.bytes_written(), 14);
        handle.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0123456789abc\n");
    }
}
