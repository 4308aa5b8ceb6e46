use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::frontal_face_refiner::{FrontalFaceRefiner, RefinedFace};
use crate::shared::frame::Frame;

/// Side of the square face chip handed to the embedding stage.
pub const CHIP_SIZE: u32 = 150;

/// Confirms a frontal face by running a detector again on the padded crop.
///
/// The best box above `confidence` wins and is cut out as a square chip.
/// No landmark alignment is performed.
pub struct SecondPassRefiner {
    detector: Box<dyn FaceDetector>,
    confidence: f32,
    chip_size: u32,
}

impl SecondPassRefiner {
    pub fn new(detector: Box<dyn FaceDetector>, confidence: f32) -> Self {
        Self {
            detector,
            confidence,
            chip_size: CHIP_SIZE,
        }
    }
}

impl FrontalFaceRefiner for SecondPassRefiner {
    fn refine(&mut self, crop: &Frame) -> Result<Option<RefinedFace>, Box<dyn std::error::Error>> {
        let best = self
            .detector
            .detect(crop)?
            .into_iter()
            .filter(|c| c.score > self.confidence)
            .max_by(|a, b| a.score.total_cmp(&b.score));
        let Some(best) = best else {
            return Ok(None);
        };

        let Some(bbox) = best
            .bbox
            .to_pixels(crop.width(), crop.height())
            .clipped(crop.width(), crop.height())
        else {
            return Ok(None);
        };

        let chip = crop.crop(&bbox).resized(self.chip_size, self.chip_size)?;
        Ok(Some(RefinedFace { bbox, chip }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::{NormalizedBox, ScoredBox};
    use crate::shared::bbox::BoundingBox;

    struct FixedDetector(Vec<ScoredBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    fn crop() -> Frame {
        Frame::new(vec![80; 200 * 100 * 3], 200, 100, 3)
    }

    #[test]
    fn test_best_box_becomes_chip() {
        let mut refiner = SecondPassRefiner::new(
            Box::new(FixedDetector(vec![
                ScoredBox {
                    bbox: NormalizedBox::new(0.0, 0.0, 0.5, 0.25),
                    score: 0.6,
                },
                ScoredBox {
                    bbox: NormalizedBox::new(0.25, 0.25, 0.75, 0.5),
                    score: 0.95,
                },
            ])),
            0.5,
        );
        let refined = refiner.refine(&crop()).unwrap().unwrap();
        assert_eq!(refined.bbox, BoundingBox::new(50, 25, 50, 50));
        assert_eq!(refined.chip.width(), CHIP_SIZE);
        assert_eq!(refined.chip.height(), CHIP_SIZE);
    }

    #[test]
    fn test_no_confident_face_rejects() {
        let mut refiner = SecondPassRefiner::new(
            Box::new(FixedDetector(vec![ScoredBox {
                bbox: NormalizedBox::new(0.0, 0.0, 0.5, 0.5),
                score: 0.3,
            }])),
            0.5,
        );
        assert!(refiner.refine(&crop()).unwrap().is_none());
    }

    #[test]
    fn test_degenerate_box_rejects() {
        let mut refiner = SecondPassRefiner::new(
            Box::new(FixedDetector(vec![ScoredBox {
                bbox: NormalizedBox::new(0.5, 0.5, 0.5, 0.5),
                score: 0.9,
            }])),
            0.5,
        );
        assert!(refiner.refine(&crop()).unwrap().is_none());
    }
}
