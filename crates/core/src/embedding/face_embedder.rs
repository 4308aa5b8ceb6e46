use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::shared::frame_record::FrameBatch;

/// Attaches a feature vector to every face in a batch.
pub struct FaceEmbedder {
    extractor: Box<dyn EmbeddingExtractor>,
}

impl FaceEmbedder {
    pub fn new(extractor: Box<dyn EmbeddingExtractor>) -> Self {
        Self { extractor }
    }

    /// Returns the number of faces embedded.
    pub fn embed_batch(
        &mut self,
        batch: &mut FrameBatch,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        for face in &mut batch.faces {
            face.features = Some(self.extractor.embed(&face.crop)?);
        }
        Ok(batch.faces.len())
    }
}
