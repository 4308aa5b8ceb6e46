use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoorError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("unlock request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unlock request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Opens a physical door on behalf of a recognized identity.
pub trait DoorUnlocker: Send {
    fn unlock(&mut self, door_id: u32, identity_key: &str) -> Result<(), DoorError>;
}
