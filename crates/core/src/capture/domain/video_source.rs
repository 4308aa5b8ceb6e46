use crate::capture::domain::source_descriptor::SourceDescriptor;
use crate::shared::frame::Frame;

/// Stream properties reported when a source opens.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

/// A decoded frame and its position within the stream.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub frame: Frame,
    /// Presentation time since stream start, in milliseconds.
    pub position_ms: i64,
}

/// Decodes frames from a live stream or a recording.
///
/// Implementations own the codec/container details; the capture loop only
/// sees [`DecodedFrame`]s in decode order.
pub trait VideoSource: Send {
    fn open(
        &mut self,
        descriptor: &SourceDescriptor,
    ) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<DecodedFrame, Box<dyn std::error::Error>>> + '_>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}

/// Creates a fresh [`VideoSource`] for every capture attempt.
///
/// Each capture thread and each auto-restart gets its own decoder.
pub trait VideoSourceFactory: Send + Sync {
    fn create(&self) -> Box<dyn VideoSource>;
}

impl<F> VideoSourceFactory for F
where
    F: Fn() -> Box<dyn VideoSource> + Send + Sync,
{
    fn create(&self) -> Box<dyn VideoSource> {
        self()
    }
}
