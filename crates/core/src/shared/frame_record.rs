use crate::shared::face::FaceDetection;
use crate::shared::frame::Frame;

/// Provenance of a sampled frame, copied onto every face cut from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameMeta {
    pub camera: String,
    /// Capture time in milliseconds; monotonic within one camera's sequence.
    pub timestamp_ms: i64,
    /// `true` for network streams, `false` for replayed recordings.
    pub is_live: bool,
}

impl FrameMeta {
    pub fn new(camera: impl Into<String>, timestamp_ms: i64, is_live: bool) -> Self {
        Self {
            camera: camera.into(),
            timestamp_ms,
            is_live,
        }
    }
}

/// One sampled frame on its way from capture to the face localizer.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub meta: FrameMeta,
    pub frame: Frame,
}

impl FrameRecord {
    pub fn new(meta: FrameMeta, frame: Frame) -> Self {
        Self { meta, frame }
    }
}

/// All faces localized in one frame. The source image is gone by now.
///
/// Empty batches still travel downstream so the tracker sees the camera's
/// clock advance.
#[derive(Clone, Debug)]
pub struct FrameBatch {
    pub meta: FrameMeta,
    pub faces: Vec<FaceDetection>,
}

impl FrameBatch {
    pub fn new(meta: FrameMeta, faces: Vec<FaceDetection>) -> Self {
        Self { meta, faces }
    }
}
