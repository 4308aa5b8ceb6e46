use std::time::Duration;

/// Keep every Nth decoded frame; adjacent frames are near-identical.
pub const DEFAULT_FRAME_INTERVAL: usize = 3;

/// Soft cap on concurrently running capture threads.
pub const DEFAULT_MAX_STREAMS: usize = 10;

/// Capacity of every inter-stage channel.
pub const DEFAULT_QUEUE_SIZE: usize = 32;

/// Pause between auto-restarts of a live stream.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(1000);

/// Camera name → door id used by the unlock endpoint.
pub const DEFAULT_DOOR_IDS: &[(&str, u32)] = &[("Main", 7), ("Back", 6), ("Side", 8), ("Test", 0)];

/// Recordings are named `<Camera_Name>_01_<YYYYMMDDhhmmss>.mp4`, in local time.
pub const RECORDING_EXTENSION: &str = "mp4";
pub const DEFAULT_RECORDING_UTC_OFFSET_HOURS: i32 = -5;

pub const PROCESSED_LEDGER_FILENAME: &str = "processed_recordings.txt";
pub const DATA_DIR_NAME: &str = "facegate";
