pub mod source_descriptor;
pub mod video_source;
