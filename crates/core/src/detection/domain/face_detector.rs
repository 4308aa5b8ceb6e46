use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

/// Face box in coordinates relative to the detector's input, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl NormalizedBox {
    pub fn new(ymin: f32, xmin: f32, ymax: f32, xmax: f32) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    /// Scales to a `width` x `height` image, truncating to whole pixels.
    pub fn to_pixels(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        BoundingBox::from_corners(
            self.xmin as f64 * w,
            self.ymin as f64 * h,
            self.xmax as f64 * w,
            self.ymax as f64 * h,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredBox {
    pub bbox: NormalizedBox,
    pub score: f32,
}

/// Domain interface for face detection.
///
/// Returns every candidate box; confidence filtering is up to the caller.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>>;
}
