//! # flowhub-adapter-jsonl-log
//!
//! Durable command log: one JSON object per line, `OUTGOING` and
//! `INCOMING` records interleaved in arrival order.
//!
//! ## Rotation
//! When a write leaves the active file larger than `max_bytes`, the file is
//! renamed to `<name>.old` (replacing any previous `.old`) and a fresh file
//! is opened. Only one generation is kept.
//!
//! ## Dependency rule
//! Depends on `flowhub-app` (port traits) and `flowhub-domain` only.

mod error;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use error::JsonlLogError;

use flowhub_app::ports::RecordLog;
use flowhub_domain::error::FlowHubError;
use flowhub_domain::record::LogRecord;

/// Rotation threshold used when none is configured (5 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Command-log location and rotation threshold.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub max_bytes: u64,
}

impl Config {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Open (or create) the active file, appending to existing content.
    ///
    /// # Errors
    ///
    /// Returns [`JsonlLogError::Io`] if the file or its directory cannot be created.
    pub fn open(&self) -> Result<JsonlRecordLog, JsonlLogError> {
        let (file, size) = open_active(&self.path)?;
        tracing::debug!(path = %self.path.display(), size, "command log opened");
        Ok(JsonlRecordLog {
            path: self.path.clone(),
            max_bytes: self.max_bytes.max(1),
            file: Some(file),
            size,
            rotations: 0,
        })
    }
}

/// Append-only JSON-lines sink for [`LogRecord`]s.
#[derive(Debug)]
pub struct JsonlRecordLog {
    path: PathBuf,
    max_bytes: u64,
    /// `None` after a failed rotation; reopened on the next write.
    file: Option<File>,
    size: u64,
    rotations: u64,
}

impl JsonlRecordLog {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rotated-out generation.
    #[must_use]
    pub fn old_path(&self) -> PathBuf {
        old_path(&self.path)
    }

    /// Bytes in the active file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Rotations performed since this log was opened.
    #[must_use]
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Encode and append one record, rotating afterwards if the file grew
    /// past the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`JsonlLogError`] on encoding, I/O or rotation failure.
    pub fn write(&mut self, record: &LogRecord) -> Result<(), JsonlLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                let (file, size) = open_active(&self.path)?;
                self.size = size;
                self.file.insert(file)
            }
        };
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|source| JsonlLogError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.size += line.len() as u64;

        if self.size > self.max_bytes {
            self.rotate()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JsonlLogError> {
        self.file = None;
        let old = self.old_path();
        let rotate_err = |source| JsonlLogError::Rotate {
            path: self.path.clone(),
            source,
        };
        match fs::remove_file(&old) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(rotate_err(err)),
        }
        fs::rename(&self.path, &old).map_err(rotate_err)?;

        let (file, size) = open_active(&self.path)?;
        self.file = Some(file);
        self.size = size;
        self.rotations += 1;
        tracing::info!(
            path = %self.path.display(),
            rotated_to = %old.display(),
            "command log rotated"
        );
        Ok(())
    }
}

impl RecordLog for JsonlRecordLog {
    fn append(&mut self, record: &LogRecord) -> Result<(), FlowHubError> {
        self.write(record).map_err(FlowHubError::from)
    }
}

fn old_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".old");
    path.with_file_name(name)
}

fn open_active(path: &Path) -> Result<(File, u64), JsonlLogError> {
    let io_err = |source| JsonlLogError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    Ok((file, size))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flowhub_domain::action::DeviceAction;
    use flowhub_domain::id::{EntityId, NodeId};
    use flowhub_domain::record::{CommandRecord, OUTGOING_SOURCE};

    use super::*;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("flowhub-log-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn join(&self, name: &str) -> PathBuf {
            self.0.join(name)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn record(reason: &str) -> LogRecord {
        LogRecord::Outgoing(CommandRecord {
            timestamp: "2024-05-01T12:00:00Z".parse().unwrap(),
            entity_id: EntityId::new("light.kitchen").unwrap(),
            action: DeviceAction::TurnOn,
            source: OUTGOING_SOURCE.to_string(),
            node_id: NodeId::from("ctl"),
            node_type: "light_control".to_string(),
            reason: reason.to_string(),
            payload: serde_json::json!({"turnOn": true}),
            inputs: BTreeMap::new(),
        })
    }

    fn line_len(record: &LogRecord) -> u64 {
        serde_json::to_vec(record).unwrap().len() as u64 + 1
    }

    #[test]
    fn should_append_one_json_object_per_line() {
        let dir = TempDir::new();
        let mut log = Config::new(dir.join("command_log.jsonl")).open().unwrap();
        log.write(&record("first")).unwrap();
        log.write(&record("second")).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LogRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.entity_id().as_str(), "light.kitchen");
        let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(json["type"], "OUTGOING");
        assert_eq!(json["reason"], "first");
    }

    #[test]
    fn should_rotate_exactly_once_when_threshold_is_crossed() {
        let dir = TempDir::new();
        let sample = record("x");
        let mut config = Config::new(dir.join("log.jsonl"));
        config.max_bytes = line_len(&sample) * 3;
        let mut log = config.open().unwrap();

        for _ in 0..3 {
            log.write(&sample).unwrap();
        }
        assert_eq!(log.rotations(), 0);
        assert!(!log.old_path().exists());

        log.write(&sample).unwrap();
        assert_eq!(log.rotations(), 1);
        assert_eq!(log.size(), 0);
        assert_eq!(fs::read_to_string(log.old_path()).unwrap().lines().count(), 4);
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn should_replace_previous_old_file_on_second_rotation() {
        let dir = TempDir::new();
        let first = record("generation one");
        let second = record("generation two");
        assert_eq!(line_len(&first), line_len(&second));
        let mut config = Config::new(dir.join("log.jsonl"));
        config.max_bytes = line_len(&first);
        let mut log = config.open().unwrap();

        log.write(&first).unwrap();
        log.write(&first).unwrap();
        assert_eq!(log.rotations(), 1);

        log.write(&second).unwrap();
        log.write(&second).unwrap();
        assert_eq!(log.rotations(), 2);

        let old = fs::read_to_string(log.old_path()).unwrap();
        assert_eq!(old.lines().count(), 2);
        assert!(old.contains("generation two"));
        assert!(!old.contains("generation one"));
        assert!(!dir.join("log.jsonl.old.old").exists());
    }

    #[test]
    fn should_resume_size_of_existing_file() {
        let dir = TempDir::new();
        let path = dir.join("log.jsonl");
        fs::write(&path, "{}\n").unwrap();
        let log = Config::new(&path).open().unwrap();
        assert_eq!(log.size(), 3);
    }

    #[test]
    fn should_name_old_file_after_active_file() {
        assert_eq!(
            old_path(Path::new("/var/lib/flowhub/command_log.jsonl")),
            PathBuf::from("/var/lib/flowhub/command_log.jsonl.old")
        );
    }

    #[test]
    fn should_convert_open_failure_into_storage_error() {
        let dir = TempDir::new();
        let err = Config::new(dir.0.clone()).open().unwrap_err();
        assert!(matches!(err, JsonlLogError::Io { .. }));
        assert!(matches!(FlowHubError::from(err), FlowHubError::Storage(_)));
    }
}
