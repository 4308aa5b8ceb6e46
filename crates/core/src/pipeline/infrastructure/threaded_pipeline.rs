use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::detection::face_localizer::FaceLocalizer;
use crate::embedding::face_embedder::FaceEmbedder;
use crate::identity::identity_resolver::{DoorRequest, IdentityResolver, Resolution};
use crate::motion::motion_gate::MotionGate;
use crate::pipeline::pipeline_config::{PipelineComponents, PipelineConfig};
use crate::pipeline::stage_message::StageMessage;
use crate::pipeline::stage_stats::{PipelineReport, StageStats};
use crate::pipeline::stage_worker::{StageError, StageWorker};
use crate::shared::face::FaceDetection;
use crate::shared::frame_record::FrameRecord;
use crate::sinks::door_dispatcher::DoorDispatcher;
use crate::sinks::persistence_dispatcher::PersistenceDispatcher;
use crate::tracking::track_aggregator::TrackAggregator;

type StageHandle = (&'static str, JoinHandle<Result<StageStats, StageError>>);

/// Where a stage hands its output.
trait Outlet<T>: Send + 'static {
    /// Returns `false` once nobody downstream is listening.
    fn deliver(&self, item: T) -> bool;
    fn terminate(&self);
}

impl<T: Send + 'static> Outlet<T> for Sender<StageMessage<T>> {
    fn deliver(&self, item: T) -> bool {
        self.send(StageMessage::Item(item)).is_ok()
    }

    fn terminate(&self) {
        let _ = self.send(StageMessage::Terminate);
    }
}

/// Terminal stages have nowhere to send.
struct Discard;

impl<T> Outlet<T> for Discard {
    fn deliver(&self, _item: T) -> bool {
        true
    }

    fn terminate(&self) {}
}

/// Fans resolutions out to the door queue and the optional persistence queue.
struct ResolutionRouter {
    doors: Sender<StageMessage<DoorRequest>>,
    persistence: Option<Sender<StageMessage<FaceDetection>>>,
}

impl Outlet<Resolution> for ResolutionRouter {
    fn deliver(&self, resolution: Resolution) -> bool {
        let Resolution { face, door_request } = resolution;
        let mut alive = true;
        if let Some(request) = door_request {
            alive &= self.doors.deliver(request);
        }
        if let Some(persistence) = &self.persistence {
            alive &= persistence.deliver(face);
        }
        alive
    }

    fn terminate(&self) {
        self.doors.terminate();
        if let Some(persistence) = &self.persistence {
            persistence.terminate();
        }
    }
}

/// A started pipeline: one thread per stage, connected by bounded channels.
///
/// Layout: `input → motion-gate → face-localizer → embedding →
/// track-aggregator → identity-resolver → {door-dispatcher, persistence}`
pub struct RunningPipeline {
    input: Sender<StageMessage<FrameRecord>>,
    handles: Vec<StageHandle>,
}

impl RunningPipeline {
    /// Producer end of the first channel, for frame sources.
    pub fn input(&self) -> Sender<StageMessage<FrameRecord>> {
        self.input.clone()
    }

    /// Sends the termination token, waits for every stage to drain, and
    /// returns their stats in pipeline order.
    ///
    /// When a stage failed, the first failure in pipeline order is returned.
    pub fn join(self) -> Result<PipelineReport, StageError> {
        let RunningPipeline { input, handles } = self;
        if input.send(StageMessage::Terminate).is_err() {
            log::debug!("Pipeline input already closed");
        }
        drop(input);

        let mut report = PipelineReport::default();
        let mut first_error = None;
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(stats)) => report.stages.push(stats),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(StageError::Panicked(name));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Builds every stage from `components` and starts its thread.
pub fn start(
    config: PipelineConfig,
    components: PipelineComponents,
) -> Result<RunningPipeline, StageError> {
    let cap = config.queue_size.max(1);
    let PipelineComponents {
        detector,
        refiner,
        extractor,
        key_generator,
        unlocker,
        store,
        known_identities,
    } = components;

    let mut localizer = FaceLocalizer::new(detector, config.localizer.clone());
    if let Some(refiner) = refiner {
        localizer = localizer.with_refiner(refiner);
    }
    if let Some(dir) = config.preview_dir.clone() {
        localizer = localizer.with_preview_dir(dir);
    }

    let mut resolver = IdentityResolver::new(config.match_threshold, key_generator);
    resolver.seed(known_identities);
    log::info!(
        "Identity cache preloaded with {} entries ({} skipped)",
        resolver.len(),
        resolver.rejected_seeds()
    );

    let (input_tx, input_rx) = crossbeam_channel::bounded(cap);
    let (gated_tx, gated_rx) = crossbeam_channel::bounded(cap);
    let (localized_tx, localized_rx) = crossbeam_channel::bounded(cap);
    let (embedded_tx, embedded_rx) = crossbeam_channel::bounded(cap);
    let (closed_tx, closed_rx) = crossbeam_channel::bounded(cap);
    let (door_tx, door_rx) = crossbeam_channel::bounded(cap);

    let mut handles = vec![
        spawn_stage(MotionGate::new(config.motion.clone()), input_rx, gated_tx)?,
        spawn_stage(localizer, gated_rx, localized_tx)?,
        spawn_stage(FaceEmbedder::new(extractor), localized_rx, embedded_tx)?,
        spawn_stage(TrackAggregator::new(config.tracker.clone()), embedded_rx, closed_tx)?,
    ];

    let (persistence_tx, persistence_worker) = match store {
        Some(store) => {
            let (tx, rx) = crossbeam_channel::bounded(cap);
            (Some(tx), Some((PersistenceDispatcher::new(store), rx)))
        }
        None => {
            log::info!("Persistence disabled");
            (None, None)
        }
    };

    let router = ResolutionRouter {
        doors: door_tx,
        persistence: persistence_tx,
    };
    handles.push(spawn_stage(resolver, closed_rx, router)?);
    handles.push(spawn_stage(
        DoorDispatcher::new(config.doors.clone(), unlocker),
        door_rx,
        Discard,
    )?);
    if let Some((worker, rx)) = persistence_worker {
        handles.push(spawn_stage(worker, rx, Discard)?);
    }

    log::info!("Pipeline started with {} stages", handles.len());
    Ok(RunningPipeline {
        input: input_tx,
        handles,
    })
}

fn spawn_stage<W, O>(
    worker: W,
    input: Receiver<StageMessage<W::Input>>,
    outlet: O,
) -> Result<StageHandle, StageError>
where
    W: StageWorker,
    O: Outlet<W::Output>,
{
    std::thread::Builder::new()
        .name(W::NAME.to_string())
        .spawn(move || run_stage(worker, input, outlet))
        .map(|handle| (W::NAME, handle))
        .map_err(|source| StageError::Spawn {
            stage: W::NAME,
            source,
        })
}

/// Drives one worker until the termination token arrives or its input
/// disconnects, then forwards exactly one token downstream.
fn run_stage<W, O>(
    mut worker: W,
    input: Receiver<StageMessage<W::Input>>,
    outlet: O,
) -> Result<StageStats, StageError>
where
    W: StageWorker,
    O: Outlet<W::Output>,
{
    let mut stats = StageStats::new(W::NAME);
    let mut out = Vec::new();

    let outcome = loop {
        let item = match input.recv() {
            Ok(StageMessage::Item(item)) => item,
            Ok(StageMessage::Terminate) => break Ok(true),
            Err(_) => {
                log::debug!("{}: input disconnected", W::NAME);
                break Ok(true);
            }
        };

        stats.received += 1;
        let start = Instant::now();
        if let Err(e) = worker.process(item, &mut out, &mut stats) {
            break Err(e);
        }
        stats.time_since(start);

        if !deliver(&outlet, &mut out, &mut stats) {
            log::warn!("{}: downstream closed, stopping", W::NAME);
            break Ok(false);
        }
    };

    let result = match outcome {
        Ok(drained) => {
            if drained {
                worker.finish(&mut out);
                deliver(&outlet, &mut out, &mut stats);
            }
            Ok(stats)
        }
        Err(e) => {
            log::error!("{e}");
            Err(e)
        }
    };
    outlet.terminate();
    log::debug!("{} stopped", W::NAME);
    result
}

fn deliver<T, O: Outlet<T>>(outlet: &O, out: &mut Vec<T>, stats: &mut StageStats) -> bool {
    for item in out.drain(..) {
        if !outlet.deliver(item) {
            return false;
        }
        stats.emitted += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::{FaceDetector, NormalizedBox, ScoredBox};
    use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
    use crate::identity::identity_key::SequentialKeyGenerator;
    use crate::shared::frame::Frame;
    use crate::shared::frame_record::FrameMeta;
    use crate::sinks::domain::door_unlocker::{DoorError, DoorUnlocker};

    /// Doubles each input; emits a trailing 0 when finished.
    struct Doubler {
        fail_on: Option<u32>,
    }

    impl StageWorker for Doubler {
        type Input = u32;
        type Output = u32;

        const NAME: &'static str = "doubler";

        fn process(
            &mut self,
            item: u32,
            out: &mut Vec<u32>,
            _stats: &mut StageStats,
        ) -> Result<(), StageError> {
            if self.fail_on == Some(item) {
                return Err(StageError::Failed {
                    stage: Self::NAME,
                    reason: format!("refused {item}"),
                });
            }
            out.push(item * 2);
            Ok(())
        }

        fn finish(&mut self, out: &mut Vec<u32>) {
            out.push(0);
        }
    }

    fn drain(rx: &Receiver<StageMessage<u32>>) -> (Vec<u32>, usize) {
        let mut items = Vec::new();
        let mut terminations = 0;
        for message in rx.iter() {
            match message {
                StageMessage::Item(v) => items.push(v),
                StageMessage::Terminate => terminations += 1,
            }
        }
        (items, terminations)
    }

    #[test]
    fn test_chained_stages_forward_one_termination_each() {
        let (in_tx, in_rx) = crossbeam_channel::bounded(4);
        let (mid_tx, mid_rx) = crossbeam_channel::bounded(4);
        let (out_tx, out_rx) = crossbeam_channel::bounded(16);
        let first = spawn_stage(Doubler { fail_on: None }, in_rx, mid_tx).unwrap();
        let second = spawn_stage(Doubler { fail_on: None }, mid_rx, out_tx).unwrap();

        for v in [1, 2, 3] {
            in_tx.send(StageMessage::Item(v)).unwrap();
        }
        in_tx.send(StageMessage::Terminate).unwrap();

        let first_stats = first.1.join().unwrap().unwrap();
        let second_stats = second.1.join().unwrap().unwrap();
        let (items, terminations) = drain(&out_rx);

        assert_eq!(items, vec![4, 8, 12, 0, 0]);
        assert_eq!(terminations, 1);
        assert_eq!(first_stats.received, 3);
        assert_eq!(first_stats.emitted, 4);
        assert_eq!(second_stats.received, 4);
    }

    #[test]
    fn test_disconnected_input_acts_as_termination() {
        let (in_tx, in_rx) = crossbeam_channel::bounded(4);
        let (out_tx, out_rx) = crossbeam_channel::bounded(4);
        let handle = spawn_stage(Doubler { fail_on: None }, in_rx, out_tx).unwrap();

        in_tx.send(StageMessage::Item(5)).unwrap();
        drop(in_tx);

        assert!(handle.1.join().unwrap().is_ok());
        assert_eq!(drain(&out_rx), (vec![10, 0], 1));
    }

    #[test]
    fn test_failing_stage_still_terminates_downstream() {
        let (in_tx, in_rx) = crossbeam_channel::bounded(4);
        let (out_tx, out_rx) = crossbeam_channel::bounded(4);
        let handle = spawn_stage(Doubler { fail_on: Some(2) }, in_rx, out_tx).unwrap();

        in_tx.send(StageMessage::Item(1)).unwrap();
        in_tx.send(StageMessage::Item(2)).unwrap();

        let err = handle.1.join().unwrap().unwrap_err();
        assert!(matches!(err, StageError::Failed { stage: "doubler", .. }));
        assert_eq!(drain(&out_rx), (vec![2], 1));
    }

    struct NoFaces;

    impl FaceDetector for NoFaces {
        fn detect(&mut self, _: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
            Ok(Vec::new())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
            Err("model crashed".into())
        }
    }

    struct OneFace;

    impl FaceDetector for OneFace {
        fn detect(&mut self, _: &Frame) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
            Ok(vec![ScoredBox {
                bbox: NormalizedBox::new(0.25, 0.25, 0.5, 0.5),
                score: 0.9,
            }])
        }
    }

    struct ZeroExtractor;

    impl EmbeddingExtractor for ZeroExtractor {
        fn embed(&mut self, _: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            Ok(vec![0.0; 4])
        }
    }

    struct NoDoors;

    impl DoorUnlocker for NoDoors {
        fn unlock(&mut self, _: u32, _: &str) -> Result<(), DoorError> {
            Ok(())
        }
    }

    fn components(detector: Box<dyn FaceDetector>) -> PipelineComponents {
        PipelineComponents::new(detector, Box::new(ZeroExtractor), Box::new(NoDoors))
            .with_key_generator(Box::new(SequentialKeyGenerator::new("p")))
    }

    fn frame_record(t: i64) -> FrameRecord {
        FrameRecord::new(
            FrameMeta::new("Main", t, true),
            Frame::new(vec![90; 40 * 40 * 3], 40, 40, 3),
        )
    }

    #[test]
    fn test_idle_pipeline_joins_with_all_stages() {
        let pipeline = start(PipelineConfig::default(), components(Box::new(NoFaces))).unwrap();
        let report = pipeline.join().unwrap();
        let names: Vec<_> = report.stages.iter().map(|s| s.stage()).collect();
        assert_eq!(
            names,
            vec![
                "motion-gate",
                "face-localizer",
                "embedding",
                "track-aggregator",
                "identity-resolver",
                "door-dispatcher",
            ]
        );
    }

    #[test]
    fn test_seed_frame_reaches_resolver() {
        let pipeline = start(PipelineConfig::default(), components(Box::new(OneFace))).unwrap();
        pipeline
            .input()
            .send(StageMessage::Item(frame_record(0)))
            .unwrap();
        let report = pipeline.join().unwrap();

        assert_eq!(report.stage("motion-gate").unwrap().emitted, 1);
        assert_eq!(report.stage("face-localizer").unwrap().emitted, 1);
        assert_eq!(report.stage("track-aggregator").unwrap().emitted, 1);
        assert_eq!(report.stage("identity-resolver").unwrap().emitted, 1);
        assert_eq!(report.stage("door-dispatcher").unwrap().received, 0);
    }

    #[test]
    fn test_model_failure_is_reported_on_join() {
        let pipeline =
            start(PipelineConfig::default(), components(Box::new(FailingDetector))).unwrap();
        pipeline
            .input()
            .send(StageMessage::Item(frame_record(0)))
            .unwrap();
        let err = pipeline.join().unwrap_err();
        assert!(matches!(err, StageError::Failed { stage: "face-localizer", .. }));
    }
}
