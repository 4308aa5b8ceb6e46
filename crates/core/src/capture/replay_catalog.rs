use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use thiserror::Error;

use crate::shared::constants::RECORDING_EXTENSION;

const NAME_SEPARATOR: &str = "_01_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to list recordings in {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read ledger {path}: {source}")]
    ReadLedger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to update ledger {path}: {source}")]
    WriteLedger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid UTC offset: {0} hours")]
    InvalidOffset(i32),
}

/// A recorded clip waiting to be replayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recording {
    /// File name; also the key recorded in the processed ledger.
    pub key: String,
    pub path: PathBuf,
    pub camera_name: String,
    /// Wall-clock time of the first frame, ms since the Unix epoch.
    pub start_time_ms: i64,
}

/// Splits `<Camera>_01_<YYYYMMDDhhmmss>.mp4` into a camera name and start time.
///
/// `Main_Entrance___Entry_Camera` becomes `Main Entrance - Entry Camera`.
/// The timestamp is local time at `utc_offset`.
pub fn parse_recording_name(file_name: &str, utc_offset: FixedOffset) -> Option<(String, i64)> {
    let (raw_camera, rest) = file_name.split_once(NAME_SEPARATOR)?;
    if raw_camera.is_empty() {
        return None;
    }
    let stamp = rest.split('.').next()?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    let start = utc_offset.from_local_datetime(&naive).single()?;

    let camera_name = raw_camera.replace("___", " - ").replace('_', " ");
    Some((camera_name, start.timestamp_millis()))
}

pub fn utc_offset_hours(hours: i32) -> Result<FixedOffset, CatalogError> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or(CatalogError::InvalidOffset(hours))
}

/// Text file of recording keys that have already been replayed, one per line.
pub struct ProcessedLedger {
    path: PathBuf,
    keys: HashSet<String>,
}

impl ProcessedLedger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let keys = match fs::read_to_string(path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => {
                return Err(CatalogError::ReadLedger {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            keys,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Appends `key` to the file, then records it as processed.
    pub fn mark(&mut self, key: &str) -> Result<(), CatalogError> {
        if self.keys.contains(key) {
            return Ok(());
        }
        let write_err = |source| CatalogError::WriteLedger {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{key}").map_err(write_err)?;
        file.sync_data().map_err(write_err)?;
        self.keys.insert(key.to_string());
        Ok(())
    }
}

/// Lists recordings that still need replaying.
pub struct ReplayCatalog {
    utc_offset: FixedOffset,
    allowed_cameras: Option<HashSet<String>>,
}

impl ReplayCatalog {
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self {
            utc_offset,
            allowed_cameras: None,
        }
    }

    /// Only recordings from these camera names are listed.
    pub fn with_allowed_cameras<I, S>(mut self, cameras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_cameras = Some(cameras.into_iter().map(Into::into).collect());
        self
    }

    /// Returns unprocessed recordings in `dir`, sorted by file name.
    pub fn scan(
        &self,
        dir: &Path,
        ledger: &ProcessedLedger,
    ) -> Result<Vec<Recording>, CatalogError> {
        let entries = fs::read_dir(dir).map_err(|source| CatalogError::ListDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut recordings = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_recording = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORDING_EXTENSION));
            if !is_recording || !path.is_file() {
                continue;
            }
            let Some(key) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if ledger.contains(&key) {
                log::debug!("Skipping already processed {key}");
                continue;
            }
            let Some((camera_name, start_time_ms)) = parse_recording_name(&key, self.utc_offset)
            else {
                log::warn!("Skipping recording with unrecognized name: {key}");
                continue;
            };
            if let Some(allowed) = &self.allowed_cameras {
                if !allowed.contains(&camera_name) {
                    log::debug!("Skipping {key}: camera {camera_name} not selected");
                    continue;
                }
            }
            recordings.push(Recording {
                key,
                path,
                camera_name,
                start_time_ms,
            });
        }
        recordings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(recordings)
    }
}
