//! # Rotating File Sink
//!
//! File sink with size- and time-based rotation. On rotation the current
//! file is flushed, renamed to an indexed or period-stamped backup, a fresh
//! file is opened with truncate, and backups beyond `max_files` are pruned
//! oldest-first.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, Timelike};

use super::{Sink, SinkInfo};
use crate::error::{LogError, Result};

/// When a rotating sink rolls its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate when the current file reaches `max_bytes`.
    Size(u64),
    /// Rotate at the start of each local day.
    Daily,
    /// Rotate at the start of each local hour.
    Hourly,
    /// Rotate on whichever of size or local-day boundary fires first.
    SizeAndTime(u64),
}

impl RotationPolicy {
    fn size_limit(self) -> Option<u64> {
        match self {
            RotationPolicy::Size(limit) | RotationPolicy::SizeAndTime(limit) => Some(limit),
            _ => None,
        }
    }

    fn has_time_component(self) -> bool {
        matches!(
            self,
            RotationPolicy::Daily | RotationPolicy::Hourly | RotationPolicy::SizeAndTime(_)
        )
    }
}

/// Default number of writes between time-trigger evaluations.
const DEFAULT_CHECK_INTERVAL: u64 = 100;

pub struct RotatingFileSink {
    base_path: PathBuf,
    policy: RotationPolicy,
    max_files: usize,
    check_interval: u64,
    writer: BufWriter<File>,
    bytes_written: u64,
    write_count: u64,
    /// Period label covering the data currently in the open file.
    current_period: String,
    last_rotation: Option<SystemTime>,
    rotations: u64,
    errored: bool,
}

impl RotatingFileSink {
    pub fn new(path: impl AsRef<Path>, policy: RotationPolicy) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if let Some(parent) = base_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LogError::FileOpen {
                    path: base_path.display().to_string(),
                    source: e,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&base_path)
            .map_err(|e| LogError::FileOpen {
                path: base_path.display().to_string(),
                source: e,
            })?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(RotatingFileSink {
            base_path,
            policy,
            max_files: 5,
            check_interval: DEFAULT_CHECK_INTERVAL,
            writer: BufWriter::new(file),
            bytes_written,
            write_count: 0,
            current_period: period_label(policy, Local::now()),
            last_rotation: None,
            rotations: 0,
            errored: false,
        })
    }

    /// Number of rotated backups retained. Older backups are deleted.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    /// Writes between time-boundary evaluations. Size triggers are checked
    /// on every write from the in-memory byte counter.
    pub fn with_check_interval(mut self, check_interval: u64) -> Self {
        self.check_interval = check_interval.max(1);
        self
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn last_rotation(&self) -> Option<SystemTime> {
        self.last_rotation
    }

    fn extension(&self) -> (String, String) {
        let file_name = self
            .base_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("log");
        match file_name.rfind('.') {
            Some(pos) if pos > 0 => (file_name[..pos].to_string(), file_name[pos + 1..].to_string()),
            _ => (file_name.to_string(), String::new()),
        }
    }

    fn backup_path(&self, label: &str) -> PathBuf {
        let (stem, ext) = self.extension();
        let name = if ext.is_empty() {
            format!("{}.{}", stem, label)
        } else {
            format!("{}.{}.{}", stem, label, ext)
        };
        self.base_path.with_file_name(name)
    }

    /// Next free size-rotation index: one past the highest existing backup.
    fn next_index(&self) -> u64 {
        let (stem, ext) = self.extension();
        let dir = self
            .base_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut highest = 0u64;
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(index) = parse_backup_index(name, &stem, &ext) {
                        highest = highest.max(index);
                    }
                }
            }
        }
        highest + 1
    }

    fn should_rotate(&mut self) -> Option<String> {
        if let Some(limit) = self.policy.size_limit() {
            if self.bytes_written >= limit {
                return Some(format!("{:05}", self.next_index()));
            }
        }
        if self.policy.has_time_component() && self.write_count % self.check_interval == 0 {
            let now_period = period_label(self.policy, Local::now());
            if now_period != self.current_period {
                return Some(std::mem::replace(&mut self.current_period, now_period));
            }
        }
        None
    }

    fn rotate(&mut self, label: &str) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| LogError::FileRotation(format!("flush before rotate: {}", e)))?;

        let backup = self.backup_path(label);
        std::fs::rename(&self.base_path, &backup).map_err(|e| {
            LogError::FileRotation(format!(
                "rename {} -> {}: {}",
                self.base_path.display(),
                backup.display(),
                e
            ))
        })?;

        let fresh = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.base_path)
            .map_err(|e| LogError::FileRotation(format!("reopen after rotate: {}", e)))?;
        self.writer = BufWriter::new(fresh);
        self.bytes_written = 0;
        self.last_rotation = Some(SystemTime::now());
        self.rotations += 1;

        self.prune_backups();
        Ok(())
    }

    /// Delete backups beyond `max_files`, newest kept. Ordering is by
    /// modification time descending, ties broken by name descending.
    fn prune_backups(&self) {
        let (stem, ext) = self.extension();
        let dir = match self.base_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut backups: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.base_path || !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|s| s.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if !is_backup_name(&name, &stem, &ext) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            backups.push((modified, name, path));
        }

        if backups.len() <= self.max_files {
            return;
        }
        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        for (_, _, path) in backups.into_iter().skip(self.max_files) {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Sink for RotatingFileSink {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_count += 1;
        if let Some(label) = self.should_rotate() {
            self.rotate(&label)?;
        }
        match self.writer.write_all(bytes) {
            Ok(()) => {
                self.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.errored = true;
                Err(LogError::FileWrite(e))
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer.flush() {
            Ok(()) => {
                self.errored = false;
                Ok(())
            }
            Err(e) => {
                self.errored = true;
                Err(LogError::FileWrite(e))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.errored
    }

    fn name(&self) -> String {
        "rotating_file".to_string()
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "rotating_file",
            healthy: self.is_healthy(),
            detail: format!(
                "path={} policy={:?} rotations={} bytes={}",
                self.base_path.display(),
                self.policy,
                self.rotations,
                self.bytes_written
            ),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.flush()
    }
}

fn period_label(policy: RotationPolicy, now: DateTime<Local>) -> String {
    match policy {
        RotationPolicy::Hourly => now.format("%Y%m%d_%H").to_string(),
        RotationPolicy::Daily | RotationPolicy::SizeAndTime(_) => now.format("%Y%m%d").to_string(),
        RotationPolicy::Size(_) => String::new(),
    }
}

/// Seconds until the next local day or hour boundary. Exposed for schedulers
/// that want to pre-arm a rotation check.
pub fn seconds_to_boundary(policy: RotationPolicy, now: DateTime<Local>) -> Option<u64> {
    match policy {
        RotationPolicy::Hourly => {
            let elapsed = u64::from(now.minute()) * 60 + u64::from(now.second());
            Some(3600 - elapsed)
        }
        RotationPolicy::Daily | RotationPolicy::SizeAndTime(_) => {
            let elapsed = u64::from(now.hour()) * 3600
                + u64::from(now.minute()) * 60
                + u64::from(now.second());
            Some(86_400 - elapsed)
        }
        RotationPolicy::Size(_) => None,
    }
}

fn is_backup_name(name: &str, stem: &str, ext: &str) -> bool {
    let prefix = format!("{}.", stem);
    if !name.starts_with(&prefix) {
        return false;
    }
    let middle = if ext.is_empty() {
        &name[prefix.len()..]
    } else {
        let suffix = format!(".{}", ext);
        match name.strip_suffix(&suffix) {
            Some(rest) => &rest[prefix.len().min(rest.len())..],
            None => return false,
        }
    };
    !middle.is_empty()
        && middle
            .chars()
            .all(|c| c.is_ascii_digit() || c == '_')
}

fn parse_backup_index(name: &str, stem: &str, ext: &str) -> Option<u64> {
    let prefix = format!("{}.", stem);
    let rest = name.strip_prefix(&prefix)?;
    let middle = if ext.is_empty() {
        rest
    } else {
        rest.strip_suffix(&format!(".{}", ext))?
    };
    middle.parse::<u64>().ok()
}
