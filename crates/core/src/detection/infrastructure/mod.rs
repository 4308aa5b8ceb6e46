pub mod onnx_ssd_detector;
pub mod second_pass_refiner;
