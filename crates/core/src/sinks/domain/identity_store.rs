use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::identity_resolver::{EntityLink, IdentityEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid blob key {0:?}")]
    InvalidBlobKey(String),
    #[error("face {id} cannot be stored: {reason}")]
    Incomplete { id: String, reason: String },
}

/// A person first seen by the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    /// External entity this person is linked to, or -1 while unlinked.
    pub entity_id: i64,
    pub first_seen: i64,
    pub face_vector: Vec<f32>,
}

impl PersonRecord {
    /// Reference entry for preloading the identity resolver.
    pub fn into_identity_entry(self) -> IdentityEntry {
        IdentityEntry {
            key: self.id,
            link: EntityLink::from_entity_id(self.entity_id),
            reference: self.face_vector,
        }
    }
}

/// One sighting of a known person.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    /// Camera name.
    pub location: String,
    pub timestamp: i64,
    pub blob_key: String,
    pub face_vector: Vec<f32>,
    pub person_id: String,
}

/// Durable home for people, sightings, and face images.
pub trait IdentityStore: Send {
    fn save_person(&mut self, person: &PersonRecord) -> Result<(), StoreError>;

    fn save_face(&mut self, face: &FaceRecord) -> Result<(), StoreError>;

    /// Stores raw bytes under a relative `/`-separated key.
    fn put_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn load_people(&self) -> Result<Vec<PersonRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_record_becomes_identity_entry() {
        let person = PersonRecord {
            id: "p-1".into(),
            entity_id: 12,
            first_seen: 5,
            face_vector: vec![0.1, 0.2],
        };
        let entry = person.into_identity_entry();
        assert_eq!(entry.key, "p-1");
        assert_eq!(entry.link, EntityLink::Linked(12));
        assert_eq!(entry.reference, vec![0.1, 0.2]);
    }

    #[test]
    fn test_unlinked_person_is_pending() {
        let person = PersonRecord {
            id: "p-2".into(),
            entity_id: -1,
            first_seen: 0,
            face_vector: vec![],
        };
        assert_eq!(person.into_identity_entry().link, EntityLink::Pending);
    }

    #[test]
    fn test_face_record_json_field_names() {
        let face = FaceRecord {
            id: "f".into(),
            location: "Main".into(),
            timestamp: 7,
            blob_key: "faces/f.png".into(),
            face_vector: vec![1.0],
            person_id: "p".into(),
        };
        let json = serde_json::to_value(&face).unwrap();
        assert_eq!(json["location"], "Main");
        assert_eq!(json["blob_key"], "faces/f.png");
        assert_eq!(json["person_id"], "p");
    }
}
