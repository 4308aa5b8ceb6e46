use std::collections::HashMap;
use std::path::PathBuf;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::frontal_face_refiner::FrontalFaceRefiner;
use crate::detection::face_localizer::LocalizerSettings;
use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::identity::identity_key::{IdentityKeyGenerator, UuidKeyGenerator};
use crate::identity::identity_resolver::{IdentityEntry, DEFAULT_MATCH_THRESHOLD};
use crate::motion::motion_gate::MotionSettings;
use crate::shared::constants::DEFAULT_QUEUE_SIZE;
use crate::sinks::domain::door_unlocker::DoorUnlocker;
use crate::sinks::domain::identity_store::IdentityStore;
use crate::sinks::door_dispatcher::default_doors;
use crate::tracking::track_aggregator::TrackerSettings;

/// Tunables for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Capacity of every inter-stage channel.
    pub queue_size: usize,
    pub motion: MotionSettings,
    pub localizer: LocalizerSettings,
    pub tracker: TrackerSettings,
    pub match_threshold: f32,
    /// Camera name → door id.
    pub doors: HashMap<String, u32>,
    /// When set, every localized crop is also written here as a PNG.
    pub preview_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            motion: MotionSettings::default(),
            localizer: LocalizerSettings::default(),
            tracker: TrackerSettings::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            doors: default_doors(),
            preview_dir: None,
        }
    }
}

/// External collaborators, each moved into the one stage that uses it.
pub struct PipelineComponents {
    pub detector: Box<dyn FaceDetector>,
    pub refiner: Option<Box<dyn FrontalFaceRefiner>>,
    pub extractor: Box<dyn EmbeddingExtractor>,
    pub key_generator: Box<dyn IdentityKeyGenerator>,
    pub unlocker: Box<dyn DoorUnlocker>,
    /// Persistence is disabled when `None`.
    pub store: Option<Box<dyn IdentityStore>>,
    pub known_identities: Vec<IdentityEntry>,
}

impl PipelineComponents {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        extractor: Box<dyn EmbeddingExtractor>,
        unlocker: Box<dyn DoorUnlocker>,
    ) -> Self {
        Self {
            detector,
            refiner: None,
            extractor,
            key_generator: Box::new(UuidKeyGenerator),
            unlocker,
            store: None,
            known_identities: Vec::new(),
        }
    }

    pub fn with_refiner(mut self, refiner: Box<dyn FrontalFaceRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_key_generator(mut self, key_generator: Box<dyn IdentityKeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn with_store(mut self, store: Box<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_known_identities(mut self, known: Vec<IdentityEntry>) -> Self {
        self.known_identities = known;
        self
    }
}
