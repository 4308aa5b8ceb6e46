//! ArcFace-style embedding extractor using ONNX Runtime.

use std::path::Path;

use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::shared::features::l2_normalize;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::open_session;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxEmbeddingExtractor {
    session: ort::session::Session,
}

impl OnnxEmbeddingExtractor {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = open_session(model_path, intra_threads)?;
        Ok(Self { session })
    }
}

impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn embed(&mut self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        if crop.is_empty() || crop.channels() != 3 {
            return Err(format!(
                "cannot embed a {}x{}x{} crop",
                crop.width(),
                crop.height(),
                crop.channels()
            )
            .into());
        }

        let tensor = preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}
