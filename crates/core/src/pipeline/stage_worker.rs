use thiserror::Error;

use crate::detection::face_localizer::FaceLocalizer;
use crate::embedding::face_embedder::FaceEmbedder;
use crate::identity::identity_resolver::{DoorRequest, IdentityResolver, Resolution};
use crate::motion::motion_gate::MotionGate;
use crate::pipeline::stage_stats::StageStats;
use crate::shared::face::FaceDetection;
use crate::shared::frame_record::{FrameBatch, FrameRecord};
use crate::sinks::door_dispatcher::DoorDispatcher;
use crate::sinks::persistence_dispatcher::{PersistenceDispatcher, Persisted};
use crate::tracking::track_aggregator::TrackAggregator;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage failed: {reason}")]
    Failed { stage: &'static str, reason: String },
    #[error("failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// Per-item logic of one pipeline stage.
///
/// A worker owns all of its state and is driven by exactly one thread.
pub trait StageWorker: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    const NAME: &'static str;

    fn process(
        &mut self,
        item: Self::Input,
        out: &mut Vec<Self::Output>,
        stats: &mut StageStats,
    ) -> Result<(), StageError>;

    /// Called once after the last input. Anything pushed is still delivered.
    fn finish(&mut self, _out: &mut Vec<Self::Output>) {}
}

fn failed<W: StageWorker>(reason: Box<dyn std::error::Error>) -> StageError {
    StageError::Failed {
        stage: W::NAME,
        reason: reason.to_string(),
    }
}

impl StageWorker for MotionGate {
    type Input = FrameRecord;
    type Output = FrameRecord;

    const NAME: &'static str = "motion-gate";

    fn process(
        &mut self,
        record: FrameRecord,
        out: &mut Vec<FrameRecord>,
        stats: &mut StageStats,
    ) -> Result<(), StageError> {
        if self.admit(&record) {
            out.push(record);
        } else {
            stats.dropped += 1;
        }
        Ok(())
    }
}

impl StageWorker for FaceLocalizer {
    type Input = FrameRecord;
    type Output = FrameBatch;

    const NAME: &'static str = "face-localizer";

    fn process(
        &mut self,
        record: FrameRecord,
        out: &mut Vec<FrameBatch>,
        _stats: &mut StageStats,
    ) -> Result<(), StageError> {
        out.push(self.localize(record).map_err(failed::<Self>)?);
        Ok(())
    }
}

impl StageWorker for FaceEmbedder {
    type Input = FrameBatch;
    type Output = FrameBatch;

    const NAME: &'static str = "embedding";

    fn process(
        &mut self,
        mut batch: FrameBatch,
        out: &mut Vec<FrameBatch>,
        _stats: &mut StageStats,
    ) -> Result<(), StageError> {
        self.embed_batch(&mut batch).map_err(failed::<Self>)?;
        out.push(batch);
        Ok(())
    }
}

impl StageWorker for TrackAggregator {
    type Input = FrameBatch;
    type Output = FaceDetection;

    const NAME: &'static str = "track-aggregator";

    fn process(
        &mut self,
        batch: FrameBatch,
        out: &mut Vec<FaceDetection>,
        stats: &mut StageStats,
    ) -> Result<(), StageError> {
        out.extend(self.ingest(batch));
        stats.dropped = self.discarded();
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<FaceDetection>) {
        out.extend(self.flush());
    }
}

impl StageWorker for IdentityResolver {
    type Input = FaceDetection;
    type Output = Resolution;

    const NAME: &'static str = "identity-resolver";

    fn process(
        &mut self,
        face: FaceDetection,
        out: &mut Vec<Resolution>,
        stats: &mut StageStats,
    ) -> Result<(), StageError> {
        match self.resolve(face) {
            Ok(resolution) => out.push(resolution),
            Err(e) => {
                log::warn!("{e}, dropped");
                stats.dropped += 1;
            }
        }
        Ok(())
    }
}

impl StageWorker for DoorDispatcher {
    type Input = DoorRequest;
    type Output = ();

    const NAME: &'static str = "door-dispatcher";

    fn process(
        &mut self,
        request: DoorRequest,
        out: &mut Vec<()>,
        stats: &mut StageStats,
    ) -> Result<(), StageError> {
        if self.dispatch(&request) {
            out.push(());
        } else {
            stats.dropped += 1;
        }
        Ok(())
    }
}

impl StageWorker for PersistenceDispatcher {
    type Input = FaceDetection;
    type Output = Persisted;

    const NAME: &'static str = "persistence";

    fn process(
        &mut self,
        face: FaceDetection,
        out: &mut Vec<Persisted>,
        stats: &mut StageStats,
    ) -> Result<(), StageError> {
        match self.persist(&face) {
            Ok(persisted) => out.push(persisted),
            Err(e) => {
                log::error!("Failed to persist face {}: {e}", face.id);
                stats.dropped += 1;
            }
        }
        Ok(())
    }
}
