use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::capture::domain::source_descriptor::SourceDescriptor;
use crate::capture::domain::video_source::{VideoSource, VideoSourceFactory};
use crate::pipeline::stage_message::StageMessage;
use crate::shared::constants::{DEFAULT_FRAME_INTERVAL, DEFAULT_MAX_STREAMS, DEFAULT_RESTART_DELAY};
use crate::shared::frame_record::{FrameMeta, FrameRecord};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {camera} ({source_desc}): {reason}")]
    Open {
        camera: String,
        source_desc: String,
        reason: String,
    },
    #[error("decode failed for {camera}: {reason}")]
    Decode { camera: String, reason: String },
    #[error("failed to spawn capture thread for {camera}: {source}")]
    Spawn {
        camera: String,
        #[source]
        source: std::io::Error,
    },
    #[error("capture thread for {0} panicked")]
    Panicked(String),
}

#[derive(Clone, Debug)]
pub struct FrameSourceConfig {
    /// Keep every Nth decoded frame.
    pub frame_interval: usize,
    /// Soft cap on concurrently running capture threads.
    pub max_streams: usize,
    /// Pause between auto-restarts of a live stream.
    pub restart_delay: Duration,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            max_streams: DEFAULT_MAX_STREAMS,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Where a capture loop runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// One dedicated thread per camera.
    Threaded,
    /// On the caller's thread; returns when the stream ends.
    Inline,
}

/// Counters for one finished capture loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub camera: String,
    pub frames_decoded: usize,
    pub frames_emitted: usize,
    pub restarts: usize,
}

/// How one capture attempt ended.
enum CaptureEnd {
    EndOfStream,
    Disconnected,
}

/// Starts per-camera capture loops that feed sampled frames downstream.
///
/// Every loop blocks on the bounded output channel when the pipeline is
/// busy. Live sources restart after end-of-stream until [`cancel`] is
/// called; file sources run once.
///
/// [`cancel`]: FrameSource::cancel
pub struct FrameSource {
    config: FrameSourceConfig,
    factory: Arc<dyn VideoSourceFactory>,
    output: Sender<StageMessage<FrameRecord>>,
    cancelled: Arc<AtomicBool>,
    running: VecDeque<(String, JoinHandle<Result<StreamReport, SourceError>>)>,
    finished: Vec<Result<StreamReport, SourceError>>,
}

impl FrameSource {
    pub fn new(
        config: FrameSourceConfig,
        factory: Arc<dyn VideoSourceFactory>,
        output: Sender<StageMessage<FrameRecord>>,
    ) -> Self {
        Self {
            config,
            factory,
            output,
            cancelled: Arc::new(AtomicBool::new(false)),
            running: VecDeque::new(),
            finished: Vec::new(),
        }
    }

    /// Shared flag that stops live auto-restart once set.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn running_streams(&self) -> usize {
        self.running.len()
    }

    /// Starts capturing `descriptor` as `camera`.
    ///
    /// With `start_time_ms` set, frames are stamped `start + position`;
    /// otherwise with the wall clock. In [`StreamMode::Threaded`] the call
    /// blocks while `max_streams` loops are running, until the oldest exits.
    pub fn open_stream(
        &mut self,
        camera: &str,
        descriptor: SourceDescriptor,
        start_time_ms: Option<i64>,
        delete_on_finish: bool,
        mode: StreamMode,
    ) -> Result<(), SourceError> {
        let capture = CaptureLoop {
            camera: camera.to_string(),
            descriptor,
            start_time_ms,
            delete_on_finish,
            frame_interval: self.config.frame_interval.max(1),
            restart_delay: self.config.restart_delay,
            factory: self.factory.clone(),
            output: self.output.clone(),
            cancelled: self.cancelled.clone(),
        };

        match mode {
            StreamMode::Inline => {
                let report = capture.run()?;
                self.finished.push(Ok(report));
                Ok(())
            }
            StreamMode::Threaded => {
                self.reap_finished();
                while self.running.len() >= self.config.max_streams.max(1) {
                    if let Some((oldest, handle)) = self.running.pop_front() {
                        log::info!("Stream limit reached, waiting for {oldest} to finish");
                        self.finished.push(join_capture(&oldest, handle));
                    }
                }

                let handle = std::thread::Builder::new()
                    .name(format!("capture-{camera}"))
                    .spawn(move || capture.run())
                    .map_err(|source| SourceError::Spawn {
                        camera: camera.to_string(),
                        source,
                    })?;
                self.running.push_back((camera.to_string(), handle));
                Ok(())
            }
        }
    }

    /// Blocks until every started loop has finished.
    ///
    /// Returns the reports of all loops, or the first failure.
    pub fn join(&mut self) -> Result<Vec<StreamReport>, SourceError> {
        while let Some((camera, handle)) = self.running.pop_front() {
            self.finished.push(join_capture(&camera, handle));
        }
        std::mem::take(&mut self.finished).into_iter().collect()
    }

    fn reap_finished(&mut self) {
        let mut still_running = VecDeque::with_capacity(self.running.len());
        while let Some((camera, handle)) = self.running.pop_front() {
            if handle.is_finished() {
                self.finished.push(join_capture(&camera, handle));
            } else {
                still_running.push_back((camera, handle));
            }
        }
        self.running = still_running;
    }
}

fn join_capture(
    camera: &str,
    handle: JoinHandle<Result<StreamReport, SourceError>>,
) -> Result<StreamReport, SourceError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(SourceError::Panicked(camera.to_string())))
}

struct CaptureLoop {
    camera: String,
    descriptor: SourceDescriptor,
    start_time_ms: Option<i64>,
    delete_on_finish: bool,
    frame_interval: usize,
    restart_delay: Duration,
    factory: Arc<dyn VideoSourceFactory>,
    output: Sender<StageMessage<FrameRecord>>,
    cancelled: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(self) -> Result<StreamReport, SourceError> {
        let mut report = StreamReport {
            camera: self.camera.clone(),
            ..StreamReport::default()
        };
        let is_live = self.descriptor.is_live();

        loop {
            let mut source = self.factory.create();
            let outcome = self.capture_once(source.as_mut(), &mut report);
            source.close();

            match outcome {
                Ok(CaptureEnd::EndOfStream) => {
                    log::info!("{}: end of stream ({})", self.camera, self.descriptor);
                    if self.delete_on_finish {
                        self.delete_backing_file();
                    }
                }
                Ok(CaptureEnd::Disconnected) => {
                    log::debug!("{}: pipeline closed, stopping capture", self.camera);
                    return Ok(report);
                }
                Err(e) if is_live => log::warn!("{e}"),
                Err(e) => {
                    log::error!("{e}");
                    return Err(e);
                }
            }

            if !is_live || self.cancelled.load(Ordering::Relaxed) {
                return Ok(report);
            }
            std::thread::sleep(self.restart_delay);
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(report);
            }
            report.restarts += 1;
            log::info!("{}: restarting live stream", self.camera);
        }
    }

    fn capture_once(
        &self,
        source: &mut dyn VideoSource,
        report: &mut StreamReport,
    ) -> Result<CaptureEnd, SourceError> {
        let info = source
            .open(&self.descriptor)
            .map_err(|e| SourceError::Open {
                camera: self.camera.clone(),
                source_desc: self.descriptor.to_string(),
                reason: e.to_string(),
            })?;
        log::info!(
            "{}: opened {} ({}x{} @ {:.1} fps, {})",
            self.camera,
            self.descriptor,
            info.width,
            info.height,
            info.fps,
            info.codec
        );

        let is_live = self.descriptor.is_live();
        for (index, decoded) in source.frames().enumerate() {
            let decoded = decoded.map_err(|e| SourceError::Decode {
                camera: self.camera.clone(),
                reason: e.to_string(),
            })?;
            report.frames_decoded += 1;
            if index % self.frame_interval != 0 {
                continue;
            }

            let timestamp_ms = match self.start_time_ms {
                Some(start) => start + decoded.position_ms,
                None => chrono::Utc::now().timestamp_millis(),
            };
            let meta = FrameMeta::new(self.camera.clone(), timestamp_ms, is_live);
            let record = FrameRecord::new(meta, decoded.frame);
            if self.output.send(StageMessage::Item(record)).is_err() {
                return Ok(CaptureEnd::Disconnected);
            }
            report.frames_emitted += 1;
        }
        Ok(CaptureEnd::EndOfStream)
    }

    fn delete_backing_file(&self) {
        let Some(path) = self.descriptor.file_path() else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => log::info!("{}: deleted {}", self.camera, path.display()),
            Err(e) => log::warn!("{}: could not delete {}: {e}", self.camera, path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::video_source::{DecodedFrame, SourceInfo};
    use crate::shared::frame::Frame;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    /// Yields `count` 4x4 frames spaced 40 ms apart.
    struct StubSource {
        count: usize,
        fail_open: bool,
    }

    impl VideoSource for StubSource {
        fn open(
            &mut self,
            _descriptor: &SourceDescriptor,
        ) -> Result<SourceInfo, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("no such stream".into());
            }
            Ok(SourceInfo {
                width: 4,
                height: 4,
                fps: 25.0,
                codec: "stub".into(),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<DecodedFrame, Box<dyn std::error::Error>>> + '_>
        {
            Box::new((0..self.count).map(|i| {
                Ok(DecodedFrame {
                    frame: Frame::new(vec![i as u8; 4 * 4 * 3], 4, 4, 3),
                    position_ms: i as i64 * 40,
                })
            }))
        }

        fn close(&mut self) {}
    }

    fn stub_factory(count: usize) -> Arc<dyn VideoSourceFactory> {
        Arc::new(move || -> Box<dyn VideoSource> {
            Box::new(StubSource {
                count,
                fail_open: false,
            })
        })
    }

    fn config(frame_interval: usize, max_streams: usize) -> FrameSourceConfig {
        FrameSourceConfig {
            frame_interval,
            max_streams,
            restart_delay: Duration::ZERO,
        }
    }

    fn drain(rx: &crossbeam_channel::Receiver<StageMessage<FrameRecord>>) -> Vec<FrameRecord> {
        rx.try_iter()
            .filter_map(|m| match m {
                StageMessage::Item(r) => Some(r),
                StageMessage::Terminate => None,
            })
            .collect()
    }

    #[test]
    fn test_replay_samples_every_kth_frame_with_offset_timestamps() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = FrameSource::new(config(3, 4), stub_factory(7), tx);

        source
            .open_stream(
                "Main",
                SourceDescriptor::File(PathBuf::from("recording.mp4")),
                Some(1_000_000),
                false,
                StreamMode::Inline,
            )
            .unwrap();

        let records = drain(&rx);
        let stamps: Vec<i64> = records.iter().map(|r| r.meta.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000_000, 1_000_120, 1_000_240]);
        assert!(records.iter().all(|r| r.meta.camera == "Main" && !r.meta.is_live));

        let reports = source.join().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].frames_decoded, 7);
        assert_eq!(reports[0].frames_emitted, 3);
        assert_eq!(reports[0].restarts, 0);
    }

    #[test]
    fn test_live_frames_use_wall_clock() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = FrameSource::new(config(1, 4), stub_factory(2), tx);
        source.cancel();

        let before = chrono::Utc::now().timestamp_millis();
        source
            .open_stream(
                "Back",
                SourceDescriptor::parse("rtsp://camera/stream"),
                None,
                false,
                StreamMode::Inline,
            )
            .unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        let records = drain(&rx);
        assert_eq!(records.len(), 2);
        for r in &records {
            assert!(r.meta.is_live);
            assert!(r.meta.timestamp_ms >= before && r.meta.timestamp_ms <= after);
        }
    }

    #[test]
    fn test_live_source_restarts_until_cancelled() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let opens = Arc::new(AtomicUsize::new(0));
        let mut source = FrameSource::new(config(1, 4), stub_factory(0), tx);

        let cancel = source.cancellation();
        let counter = opens.clone();
        source.factory = Arc::new(move || -> Box<dyn VideoSource> {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                cancel.store(true, Ordering::Relaxed);
            }
            Box::new(StubSource {
                count: 2,
                fail_open: false,
            })
        });

        source
            .open_stream(
                "Side",
                SourceDescriptor::parse("rtsp://camera/stream"),
                None,
                false,
                StreamMode::Inline,
            )
            .unwrap();

        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(drain(&rx).len(), 6);
        let reports = source.join().unwrap();
        assert_eq!(reports[0].restarts, 2);
    }

    #[test]
    fn test_file_source_deleted_after_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main_01_20201123084117.mp4");
        std::fs::write(&path, b"stub").unwrap();

        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut source = FrameSource::new(config(3, 4), stub_factory(3), tx);
        source
            .open_stream(
                "Main",
                SourceDescriptor::File(path.clone()),
                Some(0),
                true,
                StreamMode::Inline,
            )
            .unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_file_source_kept_without_delete_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main_01_20201123084117.mp4");
        std::fs::write(&path, b"stub").unwrap();

        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut source = FrameSource::new(config(3, 4), stub_factory(3), tx);
        source
            .open_stream(
                "Main",
                SourceDescriptor::File(path.clone()),
                Some(0),
                false,
                StreamMode::Inline,
            )
            .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_file_open_failure_is_reported() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let factory: Arc<dyn VideoSourceFactory> = Arc::new(|| -> Box<dyn VideoSource> {
            Box::new(StubSource {
                count: 0,
                fail_open: true,
            })
        });
        let mut source = FrameSource::new(config(3, 4), factory, tx);

        let result = source.open_stream(
            "Main",
            SourceDescriptor::File(PathBuf::from("missing.mp4")),
            Some(0),
            false,
            StreamMode::Inline,
        );
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }

    #[test]
    fn test_disconnected_output_stops_live_stream() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut source = FrameSource::new(config(1, 4), stub_factory(5), tx);

        source
            .open_stream(
                "Main",
                SourceDescriptor::parse("rtsp://camera/stream"),
                None,
                false,
                StreamMode::Inline,
            )
            .unwrap();

        let reports = source.join().unwrap();
        assert_eq!(reports[0].frames_emitted, 0);
        assert_eq!(reports[0].restarts, 0);
    }

    #[test]
    fn test_threaded_streams_respect_cap_and_join() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = FrameSource::new(config(1, 1), stub_factory(4), tx);

        for camera in ["Main", "Back", "Side"] {
            source
                .open_stream(
                    camera,
                    SourceDescriptor::File(PathBuf::from(format!("{camera}.mp4"))),
                    Some(0),
                    false,
                    StreamMode::Threaded,
                )
                .unwrap();
            assert!(source.running_streams() <= 1);
        }

        let reports = source.join().unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(source.running_streams(), 0);
        assert_eq!(drain(&rx).len(), 12);
    }
}
