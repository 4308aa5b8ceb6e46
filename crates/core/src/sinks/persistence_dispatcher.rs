use crate::identity::identity_resolver::PENDING_ENTITY_ID;
use crate::shared::face::FaceDetection;
use crate::shared::image_io::encode_png;
use crate::sinks::domain::identity_store::{FaceRecord, IdentityStore, PersonRecord, StoreError};

/// What a persisted face turned into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persisted {
    Person,
    Face,
}

/// Writes resolved faces to an [`IdentityStore`].
///
/// A freshly minted identity becomes a person record; a recognized face
/// becomes a sighting with its crop uploaded as a PNG blob.
pub struct PersistenceDispatcher {
    store: Box<dyn IdentityStore>,
}

impl PersistenceDispatcher {
    pub fn new(store: Box<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub fn persist(&mut self, face: &FaceDetection) -> Result<Persisted, StoreError> {
        let incomplete = |reason: &str| StoreError::Incomplete {
            id: face.id.clone(),
            reason: reason.to_string(),
        };
        let identity = face.identity.as_ref().ok_or_else(|| incomplete("no identity"))?;
        let features = face.features.as_ref().ok_or_else(|| incomplete("no feature vector"))?;

        if identity.is_new {
            self.store.save_person(&PersonRecord {
                id: identity.key.clone(),
                entity_id: PENDING_ENTITY_ID,
                first_seen: face.timestamp_ms(),
                face_vector: features.clone(),
            })?;
            return Ok(Persisted::Person);
        }

        let png = encode_png(&face.crop)
            .map_err(|e| incomplete(&format!("PNG encoding failed: {e}")))?;
        let blob_key = face_blob_key(&face.id);
        self.store.put_blob(&blob_key, &png)?;
        self.store.save_face(&FaceRecord {
            id: face.id.clone(),
            location: face.camera().to_string(),
            timestamp: face.timestamp_ms(),
            blob_key,
            face_vector: features.clone(),
            person_id: identity.key.clone(),
        })?;
        Ok(Persisted::Face)
    }
}

pub fn face_blob_key(detection_id: &str) -> String {
    format!("faces/{detection_id}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bbox::BoundingBox;
    use crate::shared::face::Identity;
    use crate::shared::frame::Frame;
    use crate::shared::frame_record::FrameMeta;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        people: Vec<PersonRecord>,
        faces: Vec<FaceRecord>,
        blobs: Vec<(String, Vec<u8>)>,
    }

    #[derive(Clone, Default)]
    struct RecordingStore {
        recorded: Arc<Mutex<Recorded>>,
        fail_blobs: bool,
    }

    impl IdentityStore for RecordingStore {
        fn save_person(&mut self, person: &PersonRecord) -> Result<(), StoreError> {
            self.recorded.lock().unwrap().people.push(person.clone());
            Ok(())
        }

        fn save_face(&mut self, face: &FaceRecord) -> Result<(), StoreError> {
            self.recorded.lock().unwrap().faces.push(face.clone());
            Ok(())
        }

        fn put_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
            if self.fail_blobs {
                return Err(StoreError::InvalidBlobKey(key.to_string()));
            }
            self.recorded
                .lock()
                .unwrap()
                .blobs
                .push((key.to_string(), bytes.to_vec()));
            Ok(())
        }

        fn load_people(&self) -> Result<Vec<PersonRecord>, StoreError> {
            Ok(self.recorded.lock().unwrap().people.clone())
        }
    }

    fn resolved(key: &str, is_new: bool) -> FaceDetection {
        let mut face = FaceDetection::new(
            BoundingBox::new(0, 0, 2, 2),
            Frame::new(vec![200; 12], 2, 2, 3),
            FrameMeta::new("Main", 42_000, false),
        );
        face.features = Some(vec![0.5, 0.5]);
        face.identity = Some(Identity {
            key: key.into(),
            is_new,
        });
        face
    }

    #[test]
    fn test_new_identity_saves_pending_person() {
        let store = RecordingStore::default();
        let recorded = store.recorded.clone();
        let mut dispatcher = PersistenceDispatcher::new(Box::new(store));

        assert_eq!(dispatcher.persist(&resolved("p-1", true)).unwrap(), Persisted::Person);

        let recorded = recorded.lock().unwrap();
        assert_eq!(
            recorded.people,
            vec![PersonRecord {
                id: "p-1".into(),
                entity_id: -1,
                first_seen: 42_000,
                face_vector: vec![0.5, 0.5],
            }]
        );
        assert!(recorded.faces.is_empty());
        assert!(recorded.blobs.is_empty());
    }

    #[test]
    fn test_recognized_face_uploads_png_then_saves_sighting() {
        let store = RecordingStore::default();
        let recorded = store.recorded.clone();
        let mut dispatcher = PersistenceDispatcher::new(Box::new(store));
        let face = resolved("p-1", false);

        assert_eq!(dispatcher.persist(&face).unwrap(), Persisted::Face);

        let recorded = recorded.lock().unwrap();
        assert!(recorded.people.is_empty());
        let (key, bytes) = &recorded.blobs[0];
        assert_eq!(key, &format!("faces/{}.png", face.id));
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let sighting = &recorded.faces[0];
        assert_eq!(sighting.id, face.id);
        assert_eq!(sighting.location, "Main");
        assert_eq!(sighting.timestamp, 42_000);
        assert_eq!(&sighting.blob_key, key);
        assert_eq!(sighting.person_id, "p-1");
    }

    #[test]
    fn test_blob_failure_skips_sighting() {
        let store = RecordingStore {
            fail_blobs: true,
            ..Default::default()
        };
        let recorded = store.recorded.clone();
        let mut dispatcher = PersistenceDispatcher::new(Box::new(store));

        assert!(dispatcher.persist(&resolved("p-1", false)).is_err());
        assert!(recorded.lock().unwrap().faces.is_empty());
    }

    #[test]
    fn test_unresolved_face_is_incomplete() {
        let mut face = resolved("p-1", false);
        face.identity = None;
        let mut dispatcher = PersistenceDispatcher::new(Box::new(RecordingStore::default()));
        assert!(matches!(
            dispatcher.persist(&face),
            Err(StoreError::Incomplete { .. })
        ));
    }
}
