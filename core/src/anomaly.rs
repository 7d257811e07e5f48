use crate::config::AnalysisConfig;
use crate::graph::CausalGraph;
use crate::span::{DurationSample, ErrorRecord};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LatencySpike,
    ErrorBurst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Medium,   // just past the threshold
    High,     // > 3 std dev, or > 10 errors
    Critical, // > 4 std dev, or > 20 errors
}

/// Detected statistical outlier or error burst
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub kind: AnomalyKind,
    pub severity: AnomalySeverity,
    /// Offending duration (ms) or error count
    pub value: f64,
    pub expected_range: (f64, f64),
    pub z_score: Option<f64>,
    pub source_id: Option<String>,
    pub source_name: String,
    pub description: String,
    pub domains: Vec<String>,
    pub agents: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub cascade_id: Option<Uuid>,
    pub cascade_position: Option<usize>,
}

impl Anomaly {
    pub fn is_grouped(&self) -> bool {
        self.cascade_id.is_some()
    }
}

/// Time-clustered run of anomalies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyCascade {
    pub id: Uuid,
    pub root_anomaly_id: Uuid,
    /// Members ordered by timestamp
    pub anomaly_ids: Vec<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub domains: Vec<String>,
    pub agents: Vec<String>,
    pub severity: AnomalySeverity,
}

impl AnomalyCascade {
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Mean and sample standard deviation of one batch of durations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl BatchStats {
    pub fn from_durations(durations: &[f64]) -> Self {
        let count = durations.len();
        if count == 0 {
            return Self {
                count,
                mean: 0.0,
                std_dev: 0.0,
            };
        }

        let mean = durations.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        };

        Self {
            count,
            mean,
            std_dev,
        }
    }

    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev > 0.0 {
            (value - self.mean).abs() / self.std_dev
        } else {
            0.0
        }
    }

    /// mean ± 2σ
    pub fn expected_range(&self) -> (f64, f64) {
        (self.mean - 2.0 * self.std_dev, self.mean + 2.0 * self.std_dev)
    }
}

/// Z-score anomaly detection plus temporal cascade grouping
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnalysisConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Flag samples whose z-score exceeds the configured threshold.
    ///
    /// A batch with zero spread (including a single sample) is too uniform to
    /// judge and yields nothing. Agent and domain are filled in from the graph
    /// when a sample id matches an ingested span.
    pub fn detect_latency_spikes(
        &self,
        samples: &[DurationSample],
        graph: &CausalGraph,
        now: DateTime<Utc>,
    ) -> Vec<Anomaly> {
        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        let stats = BatchStats::from_durations(&durations);

        if stats.std_dev <= 0.0 || !stats.std_dev.is_finite() {
            return Vec::new();
        }

        let threshold = self.config.anomaly_threshold_std_dev;
        let mut anomalies = Vec::new();

        for sample in samples {
            let z = stats.z_score(sample.duration_ms);
            if z <= threshold {
                continue;
            }

            let severity = if z > 4.0 {
                AnomalySeverity::Critical
            } else if z > 3.0 {
                AnomalySeverity::High
            } else {
                AnomalySeverity::Medium
            };

            let (domains, agents) = match graph.node_by_span(&sample.id) {
                Some(node) => (non_empty(&node.domain), non_empty(&node.agent_id)),
                None => (Vec::new(), Vec::new()),
            };

            anomalies.push(Anomaly {
                id: Uuid::new_v4(),
                kind: AnomalyKind::LatencySpike,
                severity,
                value: sample.duration_ms,
                expected_range: stats.expected_range(),
                z_score: Some(z),
                source_id: Some(sample.id.clone()),
                source_name: sample.name.clone(),
                description: format!(
                    "{} took {:.2}ms (expected {:.2}ms ± {:.2}ms, {:.1}σ from mean)",
                    sample.name, sample.duration_ms, stats.mean, stats.std_dev, z
                ),
                domains,
                agents,
                timestamp: now,
                cascade_id: None,
                cascade_position: None,
            });
        }

        anomalies
    }

    /// One `error_burst` anomaly when the recent error count passes the limit
    pub fn detect_error_burst(
        &self,
        errors: &[ErrorRecord],
        now: DateTime<Utc>,
    ) -> Option<Anomaly> {
        let window_start = window_floor(now, self.config.error_burst_window_ms);
        let recent: Vec<&ErrorRecord> = errors
            .iter()
            .filter(|error| error.timestamp >= window_start && error.timestamp <= now)
            .collect();

        let count = recent.len();
        if count <= self.config.error_burst_min_errors {
            return None;
        }

        let severity = if count > 20 {
            AnomalySeverity::Critical
        } else if count > 10 {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        };

        let window_secs = self.config.error_burst_window_ms as f64 / 1000.0;

        Some(Anomaly {
            id: Uuid::new_v4(),
            kind: AnomalyKind::ErrorBurst,
            severity,
            value: count as f64,
            expected_range: (0.0, self.config.error_burst_min_errors as f64),
            z_score: None,
            source_id: None,
            source_name: "errors".to_string(),
            description: format!("{} errors in the last {:.0}s", count, window_secs),
            domains: recent
                .iter()
                .map(|error| error.domain.clone())
                .filter(|domain| !domain.is_empty())
                .unique()
                .collect(),
            agents: recent
                .iter()
                .map(|error| error.agent_id.clone())
                .filter(|agent| !agent.is_empty())
                .unique()
                .collect(),
            timestamp: now,
            cascade_id: None,
            cascade_position: None,
        })
    }

    /// Partition recent, ungrouped anomalies into cascades and stamp members.
    ///
    /// Candidates are sorted by time; a gap larger than
    /// `cascade_window_ms / cascade_gap_divisor` starts a new run, and only
    /// runs of at least `cascade_min_size` become cascades.
    pub fn group_cascades(
        &self,
        anomalies: &mut [Anomaly],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyCascade> {
        let window_start = window_floor(now, self.config.cascade_window_ms);
        let gap_ms = self.config.cascade_gap_ms();

        let candidates: Vec<usize> = anomalies
            .iter()
            .enumerate()
            .filter(|(_, anomaly)| !anomaly.is_grouped() && anomaly.timestamp >= window_start)
            .map(|(idx, _)| idx)
            .sorted_by_key(|&idx| anomalies[idx].timestamp)
            .collect();

        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();

        for idx in candidates {
            if let Some(&last) = current.last() {
                let gap = (anomalies[idx].timestamp - anomalies[last].timestamp).num_milliseconds();
                if gap > gap_ms {
                    runs.push(std::mem::take(&mut current));
                }
            }
            current.push(idx);
        }
        if !current.is_empty() {
            runs.push(current);
        }

        runs.into_iter()
            .filter(|run| run.len() >= self.config.cascade_min_size)
            .map(|run| Self::build_cascade(anomalies, &run))
            .collect()
    }

    fn build_cascade(anomalies: &mut [Anomaly], run: &[usize]) -> AnomalyCascade {
        let cascade_id = Uuid::new_v4();
        let first = &anomalies[run[0]];
        let last = &anomalies[run[run.len() - 1]];

        let cascade = AnomalyCascade {
            id: cascade_id,
            root_anomaly_id: first.id,
            anomaly_ids: run.iter().map(|&idx| anomalies[idx].id).collect(),
            start: first.timestamp,
            end: last.timestamp,
            domains: run
                .iter()
                .flat_map(|&idx| anomalies[idx].domains.iter().cloned())
                .unique()
                .collect(),
            agents: run
                .iter()
                .flat_map(|&idx| anomalies[idx].agents.iter().cloned())
                .unique()
                .collect(),
            severity: run
                .iter()
                .map(|&idx| anomalies[idx].severity)
                .max()
                .unwrap_or(AnomalySeverity::Medium),
        };

        for (position, &idx) in run.iter().enumerate() {
            anomalies[idx].cascade_id = Some(cascade_id);
            anomalies[idx].cascade_position = Some(position);
        }

        cascade
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

/// Start of a window ending at `now`, clamped to the earliest representable time
fn window_floor(now: DateTime<Utc>, window_ms: u64) -> DateTime<Utc> {
    i64::try_from(window_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn non_empty(value: &str) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else {
        vec![value.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn spiky_batch(spike_ms: f64) -> Vec<DurationSample> {
        let mut samples: Vec<DurationSample> = (0..20)
            .map(|i| DurationSample::new(format!("s{i}"), "llm_call", 100.0))
            .collect();
        samples.push(DurationSample::new("spike", "llm_call", spike_ms));
        samples
    }

    fn anomaly_at(timestamp: DateTime<Utc>, severity: AnomalySeverity) -> Anomaly {
        Anomaly {
            id: Uuid::new_v4(),
            kind: AnomalyKind::LatencySpike,
            severity,
            value: 0.0,
            expected_range: (0.0, 0.0),
            z_score: None,
            source_id: None,
            source_name: "test".into(),
            description: String::new(),
            domains: vec!["search".into()],
            agents: vec!["agent-a".into()],
            timestamp,
            cascade_id: None,
            cascade_position: None,
        }
    }

    #[test]
    fn batch_stats_use_sample_std_dev() {
        let stats = BatchStats::from_durations(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean, 5.0);
        assert!((stats.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);

        assert_eq!(BatchStats::from_durations(&[42.0]).std_dev, 0.0);
        assert_eq!(BatchStats::from_durations(&[]).std_dev, 0.0);
    }

    #[test]
    fn single_spike_is_critical() {
        let detector = AnomalyDetector::default();
        let batch = spiky_batch(100_000.0);
        let anomalies = detector.detect_latency_spikes(&batch, &CausalGraph::new(), base_time());

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::LatencySpike);
        assert_eq!(anomaly.severity, AnomalySeverity::Critical);
        assert_eq!(anomaly.source_id.as_deref(), Some("spike"));
        assert!(anomaly.expected_range.0 < anomaly.expected_range.1);
        assert!(anomaly.cascade_id.is_none());
    }

    #[test]
    fn near_uniform_batch_yields_nothing() {
        let detector = AnomalyDetector::default();
        let samples: Vec<DurationSample> = (0..30)
            .map(|i| DurationSample::new(format!("s{i}"), "tool", 100.0 + (i % 6) as f64))
            .collect();

        assert!(detector
            .detect_latency_spikes(&samples, &CausalGraph::new(), base_time())
            .is_empty());
    }

    #[test]
    fn zero_spread_batch_yields_nothing() {
        let detector = AnomalyDetector::default();
        let samples = vec![
            DurationSample::new("a", "tool", 50.0),
            DurationSample::new("b", "tool", 50.0),
        ];
        assert!(detector
            .detect_latency_spikes(&samples, &CausalGraph::new(), base_time())
            .is_empty());
        assert!(detector
            .detect_latency_spikes(&samples[..1], &CausalGraph::new(), base_time())
            .is_empty());
    }

    #[test]
    fn spike_inherits_agent_and_domain_from_graph() {
        use crate::span::{Span, SpanStatus};

        let mut graph = CausalGraph::new();
        graph.ingest_spans(&[Span::new("spike", None, "llm_call", 0, 100_000, SpanStatus::Ok)
            .with_agent("researcher")
            .with_domain("search")]);

        let anomalies = AnomalyDetector::default().detect_latency_spikes(
            &spiky_batch(100_000.0),
            &graph,
            base_time(),
        );

        assert_eq!(anomalies[0].agents, vec!["researcher".to_string()]);
        assert_eq!(anomalies[0].domains, vec!["search".to_string()]);
    }

    #[test]
    fn error_burst_needs_more_than_five_recent_errors() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let mut errors: Vec<ErrorRecord> = (0..5)
            .map(|i| ErrorRecord::new("boom", now - Duration::seconds(i)))
            .collect();
        // stale errors fall outside the 60s window
        errors.extend((0..10).map(|_| ErrorRecord::new("old", now - Duration::seconds(120))));

        assert!(detector.detect_error_burst(&errors, now).is_none());

        errors.push(ErrorRecord::new("boom", now));
        let burst = detector.detect_error_burst(&errors, now).unwrap();
        assert_eq!(burst.kind, AnomalyKind::ErrorBurst);
        assert_eq!(burst.severity, AnomalySeverity::Medium);
        assert_eq!(burst.value, 6.0);
    }

    #[test]
    fn error_burst_severity_scales_with_count() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let errors = |n: usize| -> Vec<ErrorRecord> {
            (0..n).map(|_| ErrorRecord::new("boom", now)).collect()
        };

        let severity = |n: usize| detector.detect_error_burst(&errors(n), now).unwrap().severity;

        assert_eq!(severity(10), AnomalySeverity::Medium);
        assert_eq!(severity(11), AnomalySeverity::High);
        assert_eq!(severity(20), AnomalySeverity::High);
        assert_eq!(severity(21), AnomalySeverity::Critical);
    }

    #[test]
    fn z_score_equal_to_threshold_is_not_a_spike() {
        let samples = spiky_batch(1_000.0);
        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        let spike_z = BatchStats::from_durations(&durations).z_score(1_000.0);

        let at_threshold = AnomalyDetector::new(AnalysisConfig {
            anomaly_threshold_std_dev: spike_z,
            ..AnalysisConfig::default()
        });
        assert!(at_threshold
            .detect_latency_spikes(&samples, &CausalGraph::new(), base_time())
            .is_empty());

        let just_below = AnomalyDetector::new(AnalysisConfig {
            anomaly_threshold_std_dev: spike_z - 1e-9,
            ..AnalysisConfig::default()
        });
        assert_eq!(
            just_below
                .detect_latency_spikes(&samples, &CausalGraph::new(), base_time())
                .len(),
            1
        );
    }

    #[test]
    fn huge_windows_reach_back_to_the_start_of_time() {
        let detector = AnomalyDetector::new(AnalysisConfig {
            cascade_window_ms: u64::MAX,
            error_burst_window_ms: 10_u64.pow(16),
            ..AnalysisConfig::default()
        });
        let now = base_time();

        let errors: Vec<ErrorRecord> = (0..6)
            .map(|_| ErrorRecord::new("boom", now - Duration::days(3_650)))
            .collect();
        assert!(detector.detect_error_burst(&errors, now).is_some());

        let mut anomalies = vec![
            anomaly_at(now - Duration::days(3_650), AnomalySeverity::Medium),
            anomaly_at(now - Duration::days(3_650), AnomalySeverity::Medium),
            anomaly_at(now - Duration::days(3_650), AnomalySeverity::Medium),
        ];
        assert_eq!(detector.group_cascades(&mut anomalies, now).len(), 1);
    }

    #[test]
    fn gap_equal_to_window_fraction_keeps_one_run() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let gap = Duration::milliseconds(detector.config().cascade_gap_ms());
        assert_eq!(gap, Duration::seconds(10));

        let mut anomalies = vec![
            anomaly_at(now - gap - gap, AnomalySeverity::Medium),
            anomaly_at(now - gap, AnomalySeverity::Medium),
            anomaly_at(now, AnomalySeverity::Medium),
        ];

        let cascades = detector.group_cascades(&mut anomalies, now);
        assert_eq!(cascades.len(), 1);
        assert_eq!(cascades[0].anomaly_ids.len(), 3);

        // one millisecond more splits every neighbour apart
        let wider = gap + Duration::milliseconds(1);
        let mut anomalies = vec![
            anomaly_at(now - wider - wider, AnomalySeverity::Medium),
            anomaly_at(now - wider, AnomalySeverity::Medium),
            anomaly_at(now, AnomalySeverity::Medium),
        ];
        assert!(detector.group_cascades(&mut anomalies, now).is_empty());
    }

    #[test]
    fn anomaly_exactly_at_window_edge_is_included() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let window = Duration::milliseconds(detector.config().cascade_window_ms as i64);

        let mut anomalies = vec![
            anomaly_at(now - window, AnomalySeverity::High),
            anomaly_at(now - window + Duration::seconds(5), AnomalySeverity::Medium),
            anomaly_at(now - window + Duration::seconds(10), AnomalySeverity::Medium),
        ];

        let cascades = detector.group_cascades(&mut anomalies, now);
        assert_eq!(cascades.len(), 1);
        assert_eq!(cascades[0].root_anomaly_id, anomalies[0].id);
        assert_eq!(cascades[0].severity, AnomalySeverity::High);

        // a millisecond older and it drops out, leaving too few members
        let mut anomalies = vec![
            anomaly_at(now - window - Duration::milliseconds(1), AnomalySeverity::High),
            anomaly_at(now - window + Duration::seconds(5), AnomalySeverity::Medium),
            anomaly_at(now - window + Duration::seconds(10), AnomalySeverity::Medium),
        ];
        assert!(detector.group_cascades(&mut anomalies, now).is_empty());
        assert!(!anomalies[0].is_grouped());
    }

    #[test]
    fn close_anomalies_form_one_cascade() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let mut anomalies = vec![
            anomaly_at(now - Duration::seconds(3), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(1), AnomalySeverity::Critical),
            anomaly_at(now - Duration::seconds(2), AnomalySeverity::High),
        ];

        let cascades = detector.group_cascades(&mut anomalies, now);
        assert_eq!(cascades.len(), 1);

        let cascade = &cascades[0];
        assert_eq!(cascade.root_anomaly_id, anomalies[0].id);
        assert_eq!(
            cascade.anomaly_ids,
            vec![anomalies[0].id, anomalies[2].id, anomalies[1].id]
        );
        assert_eq!(cascade.severity, AnomalySeverity::Critical);
        assert_eq!(cascade.duration_ms(), 2_000);
        assert_eq!(cascade.domains, vec!["search".to_string()]);
        assert_eq!(anomalies[2].cascade_position, Some(1));
        assert!(anomalies.iter().all(|a| a.cascade_id == Some(cascade.id)));
    }

    #[test]
    fn large_gap_splits_runs_and_short_runs_are_dropped() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        // gap limit is 10s with the default 30s window
        let mut anomalies = vec![
            anomaly_at(now - Duration::seconds(29), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(28), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(5), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(4), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(3), AnomalySeverity::High),
        ];

        let cascades = detector.group_cascades(&mut anomalies, now);
        assert_eq!(cascades.len(), 1);
        assert_eq!(cascades[0].anomaly_ids.len(), 3);
        assert!(anomalies[0].cascade_id.is_none());
        assert!(anomalies[1].cascade_id.is_none());
    }

    #[test]
    fn grouped_and_stale_anomalies_are_skipped() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let mut anomalies = vec![
            anomaly_at(now - Duration::seconds(40), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(2), AnomalySeverity::Medium),
            anomaly_at(now - Duration::seconds(1), AnomalySeverity::Medium),
        ];
        anomalies[1].cascade_id = Some(Uuid::new_v4());
        anomalies[1].cascade_position = Some(0);

        assert!(detector.group_cascades(&mut anomalies, now).is_empty());
        assert!(anomalies[0].cascade_id.is_none());
        assert!(anomalies[2].cascade_id.is_none());
    }

    #[test]
    fn fewer_than_three_yield_no_cascade() {
        let detector = AnomalyDetector::default();
        let now = base_time();
        let mut anomalies = vec![
            anomaly_at(now, AnomalySeverity::Critical),
            anomaly_at(now, AnomalySeverity::Critical),
        ];
        assert!(detector.group_cascades(&mut anomalies, now).is_empty());
    }
}
