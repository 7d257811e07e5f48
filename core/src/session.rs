use crate::anomaly::{Anomaly, AnomalyCascade, AnomalyDetector};
use crate::config::Config;
use crate::graph::{CausalGraph, GraphSnapshot, GraphStats, IngestSummary};
use crate::prediction::{FailurePrediction, PredictionMatcher, PredictionStats};
use crate::span::{DurationSample, ErrorRecord, Span, Trace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Everything the report layer needs about one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub graph: GraphSnapshot,
    pub stats: GraphStats,
    pub anomalies: Vec<Anomaly>,
    pub cascades: Vec<AnomalyCascade>,
    pub predictions: Vec<FailurePrediction>,
    pub prediction_stats: PredictionStats,
}

/// Mutable analysis state of a single session.
///
/// Owns the persistent causal graph, the span and error history the
/// predictors read, and the cumulative anomaly, cascade and prediction
/// lists. All mutation goes through `&mut self`.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: String,
    created_at: DateTime<Utc>,
    detector: AnomalyDetector,
    matcher: PredictionMatcher,
    predictions_enabled: bool,
    graph: CausalGraph,
    spans: Vec<Span>,
    errors: Vec<ErrorRecord>,
    anomalies: Vec<Anomaly>,
    cascades: Vec<AnomalyCascade>,
    predictions: Vec<FailurePrediction>,
}

impl SessionState {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, &Config::default())
    }

    pub fn with_config(id: impl Into<String>, config: &Config) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            detector: AnomalyDetector::new(config.analysis.clone()),
            matcher: PredictionMatcher::new(config.prediction.clone()),
            predictions_enabled: config.prediction.enabled,
            graph: CausalGraph::new(),
            spans: Vec::new(),
            errors: Vec::new(),
            anomalies: Vec::new(),
            cascades: Vec::new(),
            predictions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ingest_trace(&mut self, trace: &Trace) -> IngestSummary {
        self.ingest_trace_at(trace, Utc::now())
    }

    /// Merge a trace into the session.
    ///
    /// Spans not seen before join the history and error spans are recorded
    /// as raw errors stamped with `now`. The failure patterns are then
    /// re-evaluated when enabled.
    pub fn ingest_trace_at(&mut self, trace: &Trace, now: DateTime<Utc>) -> IngestSummary {
        let mut batch_ids: HashSet<&str> = HashSet::new();
        let mut fresh: Vec<Span> = Vec::new();
        for span in &trace.spans {
            if !self.graph.contains_span(&span.id) && batch_ids.insert(span.id.as_str()) {
                fresh.push(span.clone());
            }
        }

        let summary = self.graph.ingest_trace(trace);

        self.errors.extend(
            fresh
                .iter()
                .filter(|span| span.is_error())
                .map(|span| ErrorRecord::from_span(span, now)),
        );
        self.spans.extend(fresh);

        if self.predictions_enabled {
            self.run_predictions_at(now);
        }

        summary
    }

    pub fn record_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
    }

    pub fn detect_anomalies(&mut self, samples: &[DurationSample]) -> Vec<Anomaly> {
        self.detect_anomalies_at(samples, Utc::now())
    }

    /// Run spike and burst detection, append the results, then regroup
    /// cascades. Returns the anomalies produced by this call.
    pub fn detect_anomalies_at(
        &mut self,
        samples: &[DurationSample],
        now: DateTime<Utc>,
    ) -> Vec<Anomaly> {
        let first_new = self.anomalies.len();

        let spikes = self.detector.detect_latency_spikes(samples, &self.graph, now);
        self.anomalies.extend(spikes);
        if let Some(burst) = self.detector.detect_error_burst(&self.errors, now) {
            self.anomalies.push(burst);
        }

        let produced = self.anomalies.len() - first_new;
        if produced > 0 {
            tracing::info!(session = %self.id, count = produced, "Detected anomalies");
        }

        let cascades = self.detector.group_cascades(&mut self.anomalies, now);
        for cascade in &cascades {
            tracing::info!(
                session = %self.id,
                cascade_id = %cascade.id,
                members = cascade.anomaly_ids.len(),
                severity = ?cascade.severity,
                "Grouped anomaly cascade"
            );
        }
        self.cascades.extend(cascades);

        self.anomalies[first_new..].to_vec()
    }

    pub fn run_predictions(&mut self) -> Vec<FailurePrediction> {
        self.run_predictions_at(Utc::now())
    }

    /// Evaluate the failure patterns against the current history and keep
    /// any new predictions. Returns the predictions produced by this call.
    pub fn run_predictions_at(&mut self, now: DateTime<Utc>) -> Vec<FailurePrediction> {
        let fresh = self
            .matcher
            .evaluate(&self.spans, &self.errors, &self.predictions, now);

        for prediction in &fresh {
            tracing::info!(
                session = %self.id,
                pattern = %prediction.pattern_name,
                score = prediction.match_score,
                confidence = prediction.confidence,
                "Predicted failure"
            );
        }

        self.predictions.extend(fresh.iter().cloned());
        fresh
    }

    pub fn resolve_prediction(&mut self, prediction_id: Uuid, occurred: bool) -> bool {
        self.resolve_prediction_at(prediction_id, occurred, Utc::now())
    }

    /// Flip a prediction to resolved at `now`. Unknown or already resolved
    /// ids return false.
    pub fn resolve_prediction_at(
        &mut self,
        prediction_id: Uuid,
        occurred: bool,
        now: DateTime<Utc>,
    ) -> bool {
        self.predictions
            .iter_mut()
            .find(|prediction| prediction.id == prediction_id)
            .is_some_and(|prediction| prediction.resolve(occurred, now))
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn cascades(&self) -> &[AnomalyCascade] {
        &self.cascades
    }

    pub fn predictions(&self) -> &[FailurePrediction] {
        &self.predictions
    }

    pub fn active_predictions(&self) -> impl Iterator<Item = &FailurePrediction> {
        self.predictions.iter().filter(|prediction| prediction.is_active())
    }

    pub fn prediction_stats(&self) -> PredictionStats {
        PredictionStats::from_predictions(&self.predictions)
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            session_id: self.id.clone(),
            generated_at: Utc::now(),
            graph: self.graph.snapshot(),
            stats: self.graph.stats(),
            anomalies: self.anomalies.clone(),
            cascades: self.cascades.clone(),
            predictions: self.predictions.clone(),
            prediction_stats: self.prediction_stats(),
        }
    }
}
