pub mod http_door_unlocker;
pub mod json_file_store;
pub mod logging_door_unlocker;
