use chrono::{DateTime, Duration, Utc};
use faultline_core::{
    Anomaly, Config, DurationSample, FailurePrediction, IngestSummary, SessionState, Trace,
};

use uuid::Uuid;

use crate::fixtures::base_time;

/// A single session driven by a manual clock
pub struct TestPipeline {
    session: SessionState,
    clock: DateTime<Utc>,
}

impl TestPipeline {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            session: SessionState::with_config("test", &config),
            clock: base_time(),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
    }

    pub fn ingest(&mut self, trace: &Trace) -> IngestSummary {
        self.session.ingest_trace_at(trace, self.clock)
    }

    pub fn detect(&mut self, samples: &[DurationSample]) -> Vec<Anomaly> {
        self.session.detect_anomalies_at(samples, self.clock)
    }

    pub fn resolve(&mut self, prediction_id: Uuid, occurred: bool) -> bool {
        self.session.resolve_prediction_at(prediction_id, occurred, self.clock)
    }

    pub fn predictions_named(&self, pattern_name: &str) -> Vec<&FailurePrediction> {
        self.session
            .predictions()
            .iter()
            .filter(|prediction| prediction.pattern_name == pattern_name)
            .collect()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }
}
