pub mod domain;
pub mod door_dispatcher;
pub mod infrastructure;
pub mod persistence_dispatcher;
