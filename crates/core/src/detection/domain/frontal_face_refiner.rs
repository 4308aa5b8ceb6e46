use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

/// A frontal face found inside a padded crop.
#[derive(Clone, Debug)]
pub struct RefinedFace {
    /// Face box relative to the crop it was found in.
    pub bbox: BoundingBox,
    /// Normalized face chip that replaces the padded crop.
    pub chip: Frame,
}

/// Second-stage check that a detection really is a frontal face.
///
/// `Ok(None)` means no frontal face was found and the detection should be
/// discarded.
pub trait FrontalFaceRefiner: Send {
    fn refine(&mut self, crop: &Frame) -> Result<Option<RefinedFace>, Box<dyn std::error::Error>>;
}
