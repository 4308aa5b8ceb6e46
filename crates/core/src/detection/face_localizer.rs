use std::path::PathBuf;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::frontal_face_refiner::FrontalFaceRefiner;
use crate::shared::bbox::BoundingBox;
use crate::shared::face::FaceDetection;
use crate::shared::frame_record::{FrameBatch, FrameRecord};
use crate::shared::image_io::write_png;

/// Default minimum detector score.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct LocalizerSettings {
    /// Boxes must score strictly above this.
    pub confidence: f32,
    /// Frames are scaled by this factor before detection.
    pub detection_scale: f64,
    /// Padding fraction when no refiner is configured.
    pub padding: f64,
    /// Padding fraction when a refiner needs extra margin.
    pub refined_padding: f64,
}

impl Default for LocalizerSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            detection_scale: 0.5,
            padding: 0.25,
            refined_padding: 1.0,
        }
    }
}

/// Turns a sampled frame into padded face crops.
///
/// The frame is consumed; only the crops travel further.
pub struct FaceLocalizer {
    detector: Box<dyn FaceDetector>,
    refiner: Option<Box<dyn FrontalFaceRefiner>>,
    settings: LocalizerSettings,
    preview_dir: Option<PathBuf>,
}

impl FaceLocalizer {
    pub fn new(detector: Box<dyn FaceDetector>, settings: LocalizerSettings) -> Self {
        Self {
            detector,
            refiner: None,
            settings,
            preview_dir: None,
        }
    }

    /// Requires a frontal face inside every padded crop.
    pub fn with_refiner(mut self, refiner: Box<dyn FrontalFaceRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Writes every produced crop as a PNG into `dir`.
    pub fn with_preview_dir(mut self, dir: PathBuf) -> Self {
        self.preview_dir = Some(dir);
        self
    }

    pub fn localize(
        &mut self,
        record: FrameRecord,
    ) -> Result<FrameBatch, Box<dyn std::error::Error>> {
        let FrameRecord { meta, frame } = record;
        let (fw, fh) = (frame.width(), frame.height());

        let scaled;
        let detector_input = if (self.settings.detection_scale - 1.0).abs() < f64::EPSILON {
            &frame
        } else {
            scaled = frame.scaled(self.settings.detection_scale)?;
            &scaled
        };
        let candidates = self.detector.detect(detector_input)?;

        let padding = if self.refiner.is_some() {
            self.settings.refined_padding
        } else {
            self.settings.padding
        };

        let mut faces = Vec::new();
        for candidate in candidates
            .iter()
            .filter(|c| c.score > self.settings.confidence)
        {
            // Normalized coordinates map straight onto the full-size frame.
            let bbox = candidate.bbox.to_pixels(fw, fh);
            if bbox.area() == 0 {
                continue;
            }
            let Some(region) = bbox.padded(padding).clipped(fw, fh) else {
                continue;
            };
            let crop = frame.crop(&region);

            let (bbox, crop) = match self.refiner.as_mut() {
                Some(refiner) => match refiner.refine(&crop)? {
                    Some(refined) => (
                        BoundingBox::new(
                            region.x + refined.bbox.x,
                            region.y + refined.bbox.y,
                            refined.bbox.width,
                            refined.bbox.height,
                        ),
                        refined.chip,
                    ),
                    None => {
                        log::debug!("{}: no frontal face in candidate, dropped", meta.camera);
                        continue;
                    }
                },
                None => (region, crop),
            };
            if bbox.area() == 0 || crop.is_empty() {
                continue;
            }

            let face = FaceDetection::new(bbox, crop, meta.clone());
            self.write_preview(&face);
            faces.push(face);
        }

        Ok(FrameBatch::new(meta, faces))
    }

    fn write_preview(&self, face: &FaceDetection) {
        let Some(dir) = &self.preview_dir else {
            return;
        };
        let path = dir.join(format!(
            "{}_{}_{}.png",
            face.camera().replace(' ', "_"),
            face.timestamp_ms(),
            face.id
        ));
        if let Err(e) = write_png(&path, &face.crop) {
            log::warn!("Failed to write preview {}: {e}", path.display());
        }
    }
}
