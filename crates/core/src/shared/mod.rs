pub mod bbox;
pub mod constants;
pub mod face;
pub mod features;
pub mod frame;
pub mod frame_record;
pub mod image_io;
pub mod onnx_session;
