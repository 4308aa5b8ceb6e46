use std::collections::BTreeMap;

use crate::shared::face::FaceDetection;
use crate::shared::features;
use crate::shared::frame_record::FrameBatch;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerSettings {
    /// A track closes once the camera clock is this far past its last face.
    pub timeout_ms: i64,
    /// Closed tracks shorter than this are discarded as noise.
    pub valid_track_length: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            valid_track_length: 1,
        }
    }
}

/// One continuous appearance. Only the newest detection is kept whole.
struct Track {
    latest: FaceDetection,
    features: Vec<Vec<f32>>,
    len: usize,
}

impl Track {
    fn start(mut face: FaceDetection) -> Self {
        Self {
            features: face.features.take().into_iter().collect(),
            latest: face,
            len: 1,
        }
    }

    fn append(&mut self, mut face: FaceDetection) {
        if let Some(f) = face.features.take() {
            self.features.push(f);
        }
        self.latest = face;
        self.len += 1;
    }

    fn last_seen_ms(&self) -> i64 {
        self.latest.timestamp_ms()
    }

    /// The newest detection carrying the mean of all member vectors.
    fn into_summary(self) -> FaceDetection {
        let mut face = self.latest;
        face.features = features::mean(self.features.iter().map(Vec::as_slice));
        face
    }
}

/// Collapses per-frame detections into one face per appearance.
///
/// Each detection joins the open track whose newest box overlaps it most;
/// assignment is greedy per detection and two detections in the same frame
/// may join the same track.
pub struct TrackAggregator {
    settings: TrackerSettings,
    cameras: BTreeMap<String, Vec<Track>>,
    discarded: usize,
}

impl TrackAggregator {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            cameras: BTreeMap::new(),
            discarded: 0,
        }
    }

    /// Adds a frame's detections and returns the tracks it closed.
    ///
    /// The batch timestamp is the camera's clock for the timeout sweep, so
    /// empty batches still close stale tracks.
    pub fn ingest(&mut self, batch: FrameBatch) -> Vec<FaceDetection> {
        let FrameBatch { meta, faces } = batch;
        let tracks = self.cameras.entry(meta.camera).or_default();

        for face in faces {
            let mut best: Option<usize> = None;
            let mut best_iou = 0.0;
            for (i, track) in tracks.iter().enumerate() {
                let iou = face.bbox.iou(&track.latest.bbox);
                if iou > best_iou {
                    best = Some(i);
                    best_iou = iou;
                }
            }
            match best {
                Some(i) => tracks[i].append(face),
                None => tracks.push(Track::start(face)),
            }
        }

        let now = meta.timestamp_ms;
        let timeout = self.settings.timeout_ms;
        let (stale, open): (Vec<Track>, Vec<Track>) = std::mem::take(tracks)
            .into_iter()
            .partition(|t| now - t.last_seen_ms() > timeout);
        *tracks = open;

        self.close_all(stale)
    }

    /// Closes every open track on every camera.
    pub fn flush(&mut self) -> Vec<FaceDetection> {
        let stale: Vec<Track> = std::mem::take(&mut self.cameras)
            .into_values()
            .flatten()
            .collect();
        self.close_all(stale)
    }

    pub fn open_tracks(&self, camera: &str) -> usize {
        self.cameras.get(camera).map_or(0, Vec::len)
    }

    /// Closed tracks dropped for being too short.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    fn close_all(&mut self, tracks: Vec<Track>) -> Vec<FaceDetection> {
        let mut closed = Vec::new();
        for track in tracks {
            if track.len >= self.settings.valid_track_length {
                log::debug!(
                    "{}: closed track of {} detections",
                    track.latest.camera(),
                    track.len
                );
                closed.push(track.into_summary());
            } else {
                self.discarded += 1;
            }
        }
        closed
    }
}
