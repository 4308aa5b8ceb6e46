pub mod domain;
pub mod frame_source;
pub mod infrastructure;
pub mod replay_catalog;
