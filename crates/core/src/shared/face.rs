use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::frame_record::FrameMeta;

/// Identity attached by the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub key: String,
    /// `true` when the resolver minted this key for the face.
    pub is_new: bool,
}

/// One face found in one frame.
///
/// Created by the localizer, enriched with `features` by the embedding
/// stage and with `identity` by the resolver.
#[derive(Clone, Debug)]
pub struct FaceDetection {
    pub id: String,
    pub bbox: BoundingBox,
    pub crop: Frame,
    pub meta: FrameMeta,
    pub features: Option<Vec<f32>>,
    pub identity: Option<Identity>,
}

impl FaceDetection {
    /// Packages a box and its crop under a fresh unique detection id.
    pub fn new(bbox: BoundingBox, crop: Frame, meta: FrameMeta) -> Self {
        debug_assert!(bbox.width > 0 && bbox.height > 0, "face box must have area");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bbox,
            crop,
            meta,
            features: None,
            identity: None,
        }
    }

    pub fn camera(&self) -> &str {
        &self.meta.camera
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.meta.timestamp_ms
    }

    pub fn is_new_identity(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.is_new)
    }
}
