pub mod door_unlocker;
pub mod identity_store;
