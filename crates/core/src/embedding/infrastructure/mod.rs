pub mod onnx_embedding_extractor;
