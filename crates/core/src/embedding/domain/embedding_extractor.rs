use crate::shared::frame::Frame;

/// Maps a face crop to a fixed-length feature vector.
///
/// Vectors from the same extractor are comparable by Euclidean distance.
pub trait EmbeddingExtractor: Send {
    fn embed(&mut self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
