pub mod face_detector;
pub mod frontal_face_refiner;
