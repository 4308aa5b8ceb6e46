pub mod domain;
pub mod face_localizer;
pub mod infrastructure;
