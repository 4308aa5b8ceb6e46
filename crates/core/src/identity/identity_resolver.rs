use thiserror::Error;

use crate::identity::identity_key::IdentityKeyGenerator;
use crate::shared::face::{FaceDetection, Identity};
use crate::shared::features::euclidean_distance;

/// Faces closer than this to a known reference share its identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Entity id stored for identities not yet linked to a person record.
pub const PENDING_ENTITY_ID: i64 = -1;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("face {0} has no feature vector")]
    MissingFeatures(String),
    #[error("face {id} has a {actual}-dimensional feature vector, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
}

/// Whether an identity has been linked to an external entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityLink {
    Pending,
    Linked(i64),
}

impl EntityLink {
    pub fn from_entity_id(entity_id: i64) -> Self {
        if entity_id == PENDING_ENTITY_ID {
            EntityLink::Pending
        } else {
            EntityLink::Linked(entity_id)
        }
    }

    pub fn entity_id(&self) -> i64 {
        match self {
            EntityLink::Pending => PENDING_ENTITY_ID,
            EntityLink::Linked(id) => *id,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, EntityLink::Linked(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdentityEntry {
    pub key: String,
    pub link: EntityLink,
    pub reference: Vec<f32>,
}

/// Ask the door worker to open the door watched by `camera`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoorRequest {
    pub identity_key: String,
    pub camera: String,
}

#[derive(Debug)]
pub struct Resolution {
    pub face: FaceDetection,
    pub door_request: Option<DoorRequest>,
}

/// Assigns identities by nearest reference vector.
///
/// The cache only grows. Match decisions depend on every earlier insert, so
/// a single resolver must see faces in arrival order. Every cached reference
/// has the same length, fixed by the first entry.
pub struct IdentityResolver {
    entries: Vec<IdentityEntry>,
    threshold: f32,
    keys: Box<dyn IdentityKeyGenerator>,
    dimension: Option<usize>,
    rejected_seeds: usize,
}

impl IdentityResolver {
    pub fn new(threshold: f32, keys: Box<dyn IdentityKeyGenerator>) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
            keys,
            dimension: None,
            rejected_seeds: 0,
        }
    }

    /// Preloads known identities. A repeated key replaces the earlier entry.
    ///
    /// Entries with an empty reference, or one whose length differs from the
    /// cache's, are skipped and counted in [`Self::rejected_seeds`].
    pub fn seed<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = IdentityEntry>,
    {
        for entry in entries {
            let len = entry.reference.len();
            if len == 0 || self.dimension.is_some_and(|d| d != len) {
                log::warn!(
                    "Skipping known identity {}: {len}-dimensional reference, expected {}",
                    entry.key,
                    self.dimension.map_or("non-empty".to_string(), |d| d.to_string())
                );
                self.rejected_seeds += 1;
                continue;
            }
            self.dimension.get_or_insert(len);
            match self.entries.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => *existing = entry,
                None => self.entries.push(entry),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, key: &str) -> Option<&IdentityEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Seed entries skipped for having an unusable reference.
    pub fn rejected_seeds(&self) -> usize {
        self.rejected_seeds
    }

    pub fn resolve(&mut self, mut face: FaceDetection) -> Result<Resolution, ResolveError> {
        let features = face
            .features
            .as_ref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ResolveError::MissingFeatures(face.id.clone()))?;
        if let Some(expected) = self.dimension.filter(|&d| d != features.len()) {
            return Err(ResolveError::DimensionMismatch {
                id: face.id.clone(),
                expected,
                actual: features.len(),
            });
        }

        let mut closest: Option<(usize, f32)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let Some(distance) = euclidean_distance(features, &entry.reference) else {
                continue;
            };
            if distance < self.threshold && closest.map_or(true, |(_, best)| distance < best) {
                closest = Some((i, distance));
            }
        }

        let mut door_request = None;
        match closest {
            Some((i, distance)) => {
                let entry = &self.entries[i];
                log::debug!("Face {} matched {} at {distance:.3}", face.id, entry.key);
                if !face.meta.is_live && entry.link.is_linked() {
                    door_request = Some(DoorRequest {
                        identity_key: entry.key.clone(),
                        camera: face.meta.camera.clone(),
                    });
                }
                face.identity = Some(Identity {
                    key: entry.key.clone(),
                    is_new: false,
                });
            }
            None => {
                let key = self.keys.next_key();
                log::info!("New identity {key} from face {}", face.id);
                self.dimension.get_or_insert(features.len());
                self.entries.push(IdentityEntry {
                    key: key.clone(),
                    link: EntityLink::Pending,
                    reference: features.clone(),
                });
                face.identity = Some(Identity { key, is_new: true });
            }
        }

        Ok(Resolution { face, door_request })
    }
}
