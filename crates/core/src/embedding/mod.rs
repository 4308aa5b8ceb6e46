pub mod domain;
pub mod face_embedder;
pub mod infrastructure;
