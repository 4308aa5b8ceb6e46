use std::time::Instant;

/// Per-stage counters and timings, owned by the stage's thread.
///
/// Each stage fills its own instance; the pipeline collects them on join
/// and logs one summary, so no counter is ever shared between threads.
#[derive(Clone, Debug)]
pub struct StageStats {
    stage: &'static str,
    pub received: usize,
    pub emitted: usize,
    pub dropped: usize,
    durations_ms: Vec<f64>,
}

impl StageStats {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            received: 0,
            emitted: 0,
            dropped: 0,
            durations_ms: Vec::new(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Record how long one item took in this stage.
    pub fn timing(&mut self, duration_ms: f64) {
        self.durations_ms.push(duration_ms);
    }

    pub fn time_since(&mut self, start: Instant) {
        self.timing(start.elapsed().as_secs_f64() * 1000.0);
    }

    pub fn average_ms(&self) -> f64 {
        if self.durations_ms.is_empty() {
            0.0
        } else {
            self.durations_ms.iter().sum::<f64>() / self.durations_ms.len() as f64
        }
    }

    pub fn total_ms(&self) -> f64 {
        self.durations_ms.iter().sum()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "  {:18}: in {:6}  out {:6}  dropped {:6}  avg {:6.1}ms  total {:7.0}ms",
            self.stage,
            self.received,
            self.emitted,
            self.dropped,
            self.average_ms(),
            self.total_ms()
        )
    }
}

/// Stats of every stage, in pipeline order.
#[derive(Clone, Debug, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageStats>,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage() == name)
    }

    /// Returns the formatted summary string, or `None` if no stage reported.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        let mut lines = vec![format!("Pipeline summary ({} stages):", self.stages.len())];
        lines.extend(self.stages.iter().map(StageStats::summary_line));
        Some(lines.join("\n"))
    }

    pub fn log_summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
