//! SSD-style face detector using ONNX Runtime via `ort`.
//!
//! Expects a TensorFlow object-detection export: a `uint8` NHWC image input
//! and `detection_boxes` / `detection_scores` outputs.

use std::path::Path;

use crate::detection::domain::face_detector::{FaceDetector, NormalizedBox, ScoredBox};
use crate::shared::frame::Frame;
use crate::shared::onnx_session::open_session;

const BOXES_OUTPUT: &str = "detection_boxes";
const SCORES_OUTPUT: &str = "detection_scores";

/// Detector threads per session.
const INTRA_THREADS: usize = 2;

pub struct OnnxSsdDetector {
    session: ort::session::Session,
}

impl OnnxSsdDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path, INTRA_THREADS)?;
        Ok(Self { session })
    }
}

impl FaceDetector for OnnxSsdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(frame)?;
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        let boxes = outputs
            .get(BOXES_OUTPUT)
            .ok_or("SSD model has no detection_boxes output")?
            .try_extract_array::<f32>()?;
        let scores = outputs
            .get(SCORES_OUTPUT)
            .ok_or("SSD model has no detection_scores output")?
            .try_extract_array::<f32>()?;

        let box_data = boxes.as_slice().ok_or("Cannot get box slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;
        Ok(parse_detections(box_data, score_data))
    }
}

/// Packs an RGB frame into a `[1, H, W, 3]` uint8 tensor.
fn preprocess(frame: &Frame) -> Result<ndarray::Array4<u8>, Box<dyn std::error::Error>> {
    if frame.channels() != 3 {
        return Err(format!(
            "SSD detector needs RGB input, got {} channels",
            frame.channels()
        )
        .into());
    }
    let shape = (1, frame.height() as usize, frame.width() as usize, 3);
    Ok(ndarray::Array4::from_shape_vec(shape, frame.data().to_vec())?)
}

/// Pairs `[ymin, xmin, ymax, xmax]` rows with their scores.
fn parse_detections(boxes: &[f32], scores: &[f32]) -> Vec<ScoredBox> {
    boxes
        .chunks_exact(4)
        .zip(scores)
        .map(|(b, &score)| ScoredBox {
            bbox: NormalizedBox::new(
                b[0].clamp(0.0, 1.0),
                b[1].clamp(0.0, 1.0),
                b[2].clamp(0.0, 1.0),
                b[3].clamp(0.0, 1.0),
            ),
            score,
        })
        .collect()
}
