pub mod infrastructure;
pub mod pipeline_config;
pub mod stage_message;
pub mod stage_stats;
pub mod stage_worker;
