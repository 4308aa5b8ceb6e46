use std::time::Duration;

use crate::sinks::domain::door_unlocker::{DoorError, DoorUnlocker};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Unlocks doors with an HTTP GET against a URL template.
///
/// The template may contain `{door_id}` and `{identity}` placeholders.
pub struct HttpDoorUnlocker {
    client: reqwest::blocking::Client,
    url_template: String,
}

impl HttpDoorUnlocker {
    pub fn new(url_template: impl Into<String>) -> Result<Self, DoorError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DoorError::Client)?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }
}

impl DoorUnlocker for HttpDoorUnlocker {
    fn unlock(&mut self, door_id: u32, identity_key: &str) -> Result<(), DoorError> {
        let url = format_unlock_url(&self.url_template, door_id, identity_key);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| DoorError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DoorError::Status {
                url,
                status: status.as_u16(),
            });
        }
        log::info!("Unlocked door {door_id} for {identity_key}");
        Ok(())
    }
}

pub fn format_unlock_url(template: &str, door_id: u32, identity_key: &str) -> String {
    template
        .replace("{door_id}", &door_id.to_string())
        .replace("{identity}", identity_key)
}
