use std::collections::HashMap;

use crate::identity::identity_resolver::DoorRequest;
use crate::shared::constants::DEFAULT_DOOR_IDS;
use crate::sinks::domain::door_unlocker::DoorUnlocker;

/// The built-in camera name → door id table.
pub fn default_doors() -> HashMap<String, u32> {
    DEFAULT_DOOR_IDS
        .iter()
        .map(|&(camera, id)| (camera.to_string(), id))
        .collect()
}

/// Turns door requests into unlock calls for the door a camera watches.
pub struct DoorDispatcher {
    doors: HashMap<String, u32>,
    unlocker: Box<dyn DoorUnlocker>,
}

impl DoorDispatcher {
    pub fn new(doors: HashMap<String, u32>, unlocker: Box<dyn DoorUnlocker>) -> Self {
        Self { doors, unlocker }
    }

    pub fn door_for(&self, camera: &str) -> Option<u32> {
        self.doors.get(camera).copied()
    }

    /// Returns `true` when an unlock call succeeded.
    ///
    /// Cameras without a door and failed calls are logged, never raised.
    pub fn dispatch(&mut self, request: &DoorRequest) -> bool {
        let Some(door_id) = self.door_for(&request.camera) else {
            log::debug!("No door mapped for camera {}", request.camera);
            return false;
        };
        match self.unlocker.unlock(door_id, &request.identity_key) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Door {door_id} unlock for {} failed: {e}", request.identity_key);
                false
            }
        }
    }
}
