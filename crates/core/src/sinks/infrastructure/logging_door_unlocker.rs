use crate::sinks::domain::door_unlocker::{DoorError, DoorUnlocker};

/// Stand-in used when no unlock endpoint is configured.
pub struct LoggingDoorUnlocker;

impl DoorUnlocker for LoggingDoorUnlocker {
    fn unlock(&mut self, door_id: u32, identity_key: &str) -> Result<(), DoorError> {
        log::info!("Would unlock door {door_id} for {identity_key} (no unlock URL configured)");
        Ok(())
    }
}
