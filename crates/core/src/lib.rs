pub mod capture;
pub mod detection;
pub mod embedding;
pub mod identity;
pub mod motion;
pub mod pipeline;
pub mod shared;
pub mod sinks;
pub mod tracking;
