use crate::config::PredictionConfig;
use crate::span::{ErrorRecord, Span, SpanStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Kind of failure a pattern anticipates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    LatencyCascade,
    ErrorStorm,
    RetryLoop,
    AgentOverload,
    AgentCascade,
    TimeoutChain,
}

/// A single condition checked against the current span aggregates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "indicator")]
pub enum Indicator {
    /// Last `samples` span durations are strictly increasing
    IncreasingLatency { samples: usize },
    /// Recent mean duration / configured latency threshold
    MeanLatencyRatio { min_ratio: f64 },
    /// Slowest recent span / configured timeout
    TimeoutProximity { min_ratio: f64 },
    ErrorRate { min_rate: f64 },
    RecentErrorRate { min_rate: f64 },
    /// Most recent spans are all errors
    TrailingErrorStreak { min_len: usize },
    /// More error spans in the second half of the history than the first
    ErrorAcceleration,
    /// One span name repeated within the recent window
    RepeatedSpanName { min_repeats: usize },
    WarningRate { min_rate: f64 },
    /// One agent owns this share of the recent spans
    AgentConcentration { min_share: f64 },
    /// The dominant agent's mean duration versus the overall mean
    DominantAgentSlowdown { min_ratio: f64 },
    /// Errors attributed to at least this many distinct agents
    ErrorAgentSpread { min_agents: usize },
    CriticalSpanPresent,
    /// Recent spans that came within `min_ratio` of the timeout
    SpansNearTimeout { min_spans: usize, min_ratio: f64 },
}

impl Indicator {
    pub fn evaluate(&self, agg: &SpanAggregates) -> bool {
        match *self {
            Indicator::IncreasingLatency { samples } => {
                let recent = &agg.recent_durations;
                samples >= 2
                    && recent.len() >= samples
                    && recent[recent.len() - samples..]
                        .windows(2)
                        .all(|pair| pair[1] > pair[0])
            }
            Indicator::MeanLatencyRatio { min_ratio } => {
                agg.latency_threshold_ms > 0.0
                    && agg.recent_mean_ms / agg.latency_threshold_ms >= min_ratio
            }
            Indicator::TimeoutProximity { min_ratio } => {
                agg.timeout_ms > 0.0 && agg.recent_max_ms / agg.timeout_ms >= min_ratio
            }
            Indicator::ErrorRate { min_rate } => agg.total_spans > 0 && agg.error_rate >= min_rate,
            Indicator::RecentErrorRate { min_rate } => {
                !agg.recent_durations.is_empty() && agg.recent_error_rate >= min_rate
            }
            Indicator::TrailingErrorStreak { min_len } => {
                min_len > 0 && agg.trailing_error_streak >= min_len
            }
            Indicator::ErrorAcceleration => {
                agg.errors_second_half > agg.errors_first_half && agg.errors_second_half > 0
            }
            Indicator::RepeatedSpanName { min_repeats } => {
                min_repeats > 0 && agg.max_name_repeats >= min_repeats
            }
            Indicator::WarningRate { min_rate } => {
                agg.total_spans > 0 && agg.warning_rate >= min_rate
            }
            Indicator::AgentConcentration { min_share } => agg
                .dominant_agent
                .as_ref()
                .is_some_and(|dominant| dominant.share >= min_share),
            Indicator::DominantAgentSlowdown { min_ratio } => {
                agg.recent_mean_ms > 0.0
                    && agg.dominant_agent.as_ref().is_some_and(|dominant| {
                        dominant.mean_duration_ms / agg.recent_mean_ms >= min_ratio
                    })
            }
            Indicator::ErrorAgentSpread { min_agents } => {
                min_agents > 0 && agg.error_agents >= min_agents
            }
            Indicator::CriticalSpanPresent => agg.critical_spans > 0,
            Indicator::SpansNearTimeout {
                min_spans,
                min_ratio,
            } => {
                agg.timeout_ms > 0.0
                    && min_spans > 0
                    && agg
                        .recent_durations
                        .iter()
                        .filter(|&&duration| duration / agg.timeout_ms >= min_ratio)
                        .count()
                        >= min_spans
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WeightedIndicator {
    pub indicator: Indicator,
    pub weight: f64,
}

/// Statically defined failure signature
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FailurePattern {
    pub name: &'static str,
    pub failure_type: FailureType,
    pub description: &'static str,
    pub indicators: &'static [WeightedIndicator],
    pub avg_confidence: f64,
    pub avg_time_to_failure_ms: u64,
}

impl FailurePattern {
    pub fn total_weight(&self) -> f64 {
        self.indicators.iter().map(|wi| wi.weight).sum()
    }

    /// Matched weight over total weight, in [0, 1]
    pub fn match_score(&self, agg: &SpanAggregates) -> f64 {
        let total = self.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let matched: f64 = self
            .indicators
            .iter()
            .filter(|wi| wi.indicator.evaluate(agg))
            .map(|wi| wi.weight)
            .sum();
        matched / total
    }
}

pub static FAILURE_PATTERNS: [FailurePattern; 6] = [
    FailurePattern {
        name: "Latency Cascade",
        failure_type: FailureType::LatencyCascade,
        description: "Span latency is climbing toward the timeout",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::IncreasingLatency { samples: 3 },
                weight: 0.4,
            },
            WeightedIndicator {
                indicator: Indicator::MeanLatencyRatio { min_ratio: 0.8 },
                weight: 0.35,
            },
            WeightedIndicator {
                indicator: Indicator::TimeoutProximity { min_ratio: 0.9 },
                weight: 0.25,
            },
        ],
        avg_confidence: 0.78,
        avg_time_to_failure_ms: 45_000,
    },
    FailurePattern {
        name: "Error Storm",
        failure_type: FailureType::ErrorStorm,
        description: "Error rate is high and still accelerating",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::ErrorRate { min_rate: 0.3 },
                weight: 0.5,
            },
            WeightedIndicator {
                indicator: Indicator::TrailingErrorStreak { min_len: 3 },
                weight: 0.3,
            },
            WeightedIndicator {
                indicator: Indicator::ErrorAcceleration,
                weight: 0.2,
            },
        ],
        avg_confidence: 0.82,
        avg_time_to_failure_ms: 20_000,
    },
    FailurePattern {
        name: "Retry Loop",
        failure_type: FailureType::RetryLoop,
        description: "The same operation keeps being retried without success",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::RepeatedSpanName { min_repeats: 4 },
                weight: 0.5,
            },
            WeightedIndicator {
                indicator: Indicator::WarningRate { min_rate: 0.25 },
                weight: 0.3,
            },
            WeightedIndicator {
                indicator: Indicator::RecentErrorRate { min_rate: 0.2 },
                weight: 0.2,
            },
        ],
        avg_confidence: 0.70,
        avg_time_to_failure_ms: 60_000,
    },
    FailurePattern {
        name: "Agent Overload",
        failure_type: FailureType::AgentOverload,
        description: "A single agent carries most of the work and is slowing down",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::AgentConcentration { min_share: 0.6 },
                weight: 0.5,
            },
            WeightedIndicator {
                indicator: Indicator::DominantAgentSlowdown { min_ratio: 1.5 },
                weight: 0.5,
            },
        ],
        avg_confidence: 0.65,
        avg_time_to_failure_ms: 90_000,
    },
    FailurePattern {
        name: "Cascading Agent Failure",
        failure_type: FailureType::AgentCascade,
        description: "Errors are spreading across agents",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::ErrorAgentSpread { min_agents: 2 },
                weight: 0.4,
            },
            WeightedIndicator {
                indicator: Indicator::ErrorRate { min_rate: 0.15 },
                weight: 0.3,
            },
            WeightedIndicator {
                indicator: Indicator::CriticalSpanPresent,
                weight: 0.3,
            },
        ],
        avg_confidence: 0.75,
        avg_time_to_failure_ms: 30_000,
    },
    FailurePattern {
        name: "Timeout Chain",
        failure_type: FailureType::TimeoutChain,
        description: "Several recent spans finished just under the timeout",
        indicators: &[
            WeightedIndicator {
                indicator: Indicator::SpansNearTimeout {
                    min_spans: 2,
                    min_ratio: 0.9,
                },
                weight: 0.6,
            },
            WeightedIndicator {
                indicator: Indicator::WarningRate { min_rate: 0.25 },
                weight: 0.4,
            },
        ],
        avg_confidence: 0.72,
        avg_time_to_failure_ms: 15_000,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantAgent {
    pub agent_id: String,
    pub share: f64,
    pub mean_duration_ms: f64,
}

/// Everything the indicators look at, computed once per evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanAggregates {
    pub total_spans: usize,
    pub error_spans: usize,
    pub critical_spans: usize,
    pub error_rate: f64,
    pub warning_rate: f64,
    pub recent_durations: Vec<f64>,
    pub recent_span_ids: Vec<String>,
    pub recent_mean_ms: f64,
    pub recent_max_ms: f64,
    pub recent_error_rate: f64,
    pub trailing_error_streak: usize,
    pub errors_first_half: usize,
    pub errors_second_half: usize,
    pub max_name_repeats: usize,
    pub dominant_agent: Option<DominantAgent>,
    pub error_agents: usize,
    pub latency_threshold_ms: f64,
    pub timeout_ms: f64,
}

impl SpanAggregates {
    /// Aggregate the span history (in ingestion order) and raw errors
    pub fn compute(spans: &[Span], errors: &[ErrorRecord], config: &PredictionConfig) -> Self {
        let total_spans = spans.len();
        let error_spans = spans.iter().filter(|span| span.is_error()).count();
        let critical_spans = spans
            .iter()
            .filter(|span| span.status == SpanStatus::Critical)
            .count();
        let warning_spans = spans
            .iter()
            .filter(|span| span.status == SpanStatus::Warning)
            .count();

        let ratio = |count: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        let recent = &spans[total_spans.saturating_sub(config.recent_window)..];
        let recent_durations: Vec<f64> = recent.iter().map(|s| s.duration_ms as f64).collect();
        let recent_mean_ms = if recent_durations.is_empty() {
            0.0
        } else {
            recent_durations.iter().sum::<f64>() / recent_durations.len() as f64
        };
        let recent_max_ms = recent_durations.iter().copied().fold(0.0, f64::max);
        let recent_errors = recent.iter().filter(|span| span.is_error()).count();

        let trailing_error_streak = spans.iter().rev().take_while(|span| span.is_error()).count();

        let midpoint = total_spans / 2;
        let errors_first_half = spans[..midpoint].iter().filter(|s| s.is_error()).count();
        let errors_second_half = spans[midpoint..].iter().filter(|s| s.is_error()).count();

        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for span in recent {
            *name_counts.entry(span.name.as_str()).or_default() += 1;
        }
        let max_name_repeats = name_counts.values().copied().max().unwrap_or(0);

        let error_agents = errors
            .iter()
            .map(|error| error.agent_id.as_str())
            .chain(
                spans
                    .iter()
                    .filter(|span| span.is_error())
                    .map(|span| span.agent_id.as_str()),
            )
            .filter(|agent| !agent.is_empty())
            .collect::<HashSet<_>>()
            .len();

        Self {
            total_spans,
            error_spans,
            critical_spans,
            error_rate: ratio(error_spans, total_spans),
            warning_rate: ratio(warning_spans, total_spans),
            recent_span_ids: recent.iter().map(|span| span.id.clone()).collect(),
            recent_durations,
            recent_mean_ms,
            recent_max_ms,
            recent_error_rate: ratio(recent_errors, recent.len()),
            trailing_error_streak,
            errors_first_half,
            errors_second_half,
            max_name_repeats,
            dominant_agent: dominant_agent(recent),
            error_agents,
            latency_threshold_ms: config.latency_threshold_ms as f64,
            timeout_ms: config.timeout_ms as f64,
        }
    }
}

/// Agent with the most spans in the window; first seen wins ties
fn dominant_agent(recent: &[Span]) -> Option<DominantAgent> {
    let mut order: Vec<&str> = Vec::new();
    let mut per_agent: HashMap<&str, (usize, f64)> = HashMap::new();

    for span in recent.iter().filter(|span| !span.agent_id.is_empty()) {
        let entry = per_agent.entry(span.agent_id.as_str()).or_insert_with(|| {
            order.push(span.agent_id.as_str());
            (0, 0.0)
        });
        entry.0 += 1;
        entry.1 += span.duration_ms as f64;
    }

    let mut best: Option<(&str, usize, f64)> = None;
    for agent in order {
        let (count, total_ms) = per_agent[agent];
        if best.map_or(true, |(_, best_count, _)| count > best_count) {
            best = Some((agent, count, total_ms));
        }
    }

    best.map(|(agent, count, total_ms)| DominantAgent {
        agent_id: agent.to_string(),
        share: count as f64 / recent.len() as f64,
        mean_duration_ms: total_ms / count as f64,
    })
}

/// One instantiation of a firing pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub id: Uuid,
    pub pattern_name: String,
    pub failure_type: FailureType,
    pub confidence: f64,
    pub estimated_time_to_failure_ms: u64,
    pub match_score: f64,
    pub evidence_span_ids: Vec<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Whether the predicted failure actually happened, once resolved
    pub occurred: Option<bool>,
}

impl FailurePrediction {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Mark as resolved. Returns false if it was already resolved.
    pub fn resolve(&mut self, occurred: bool, now: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(now);
        self.occurred = Some(occurred);
        true
    }
}

/// Accuracy bookkeeping over a set of predictions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub occurred: usize,
    /// Share of resolved predictions whose failure actually occurred
    pub accuracy: f64,
}

impl PredictionStats {
    pub fn from_predictions<'a>(
        predictions: impl IntoIterator<Item = &'a FailurePrediction>,
    ) -> Self {
        let mut stats = Self::default();
        for prediction in predictions {
            stats.total += 1;
            if prediction.resolved {
                stats.resolved += 1;
                if prediction.occurred == Some(true) {
                    stats.occurred += 1;
                }
            } else {
                stats.active += 1;
            }
        }
        stats.with_accuracy()
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            active: self.active + other.active,
            resolved: self.resolved + other.resolved,
            occurred: self.occurred + other.occurred,
            accuracy: 0.0,
        }
        .with_accuracy()
    }

    fn with_accuracy(mut self) -> Self {
        self.accuracy = if self.resolved == 0 {
            0.0
        } else {
            self.occurred as f64 / self.resolved as f64
        };
        self
    }
}

/// Evaluates the static pattern table against a session's history
#[derive(Debug, Clone)]
pub struct PredictionMatcher {
    config: PredictionConfig,
    patterns: &'static [FailurePattern],
}

impl PredictionMatcher {
    pub fn new(config: PredictionConfig) -> Self {
        Self {
            config,
            patterns: &FAILURE_PATTERNS,
        }
    }

    pub fn patterns(&self) -> &'static [FailurePattern] {
        self.patterns
    }

    /// Predictions for every firing pattern that has no open prediction yet
    pub fn evaluate(
        &self,
        spans: &[Span],
        errors: &[ErrorRecord],
        existing: &[FailurePrediction],
        now: DateTime<Utc>,
    ) -> Vec<FailurePrediction> {
        let aggregates = SpanAggregates::compute(spans, errors, &self.config);

        let open: HashSet<&str> = existing
            .iter()
            .filter(|prediction| prediction.is_active())
            .map(|prediction| prediction.pattern_name.as_str())
            .collect();

        self.patterns
            .iter()
            .filter(|pattern| !open.contains(pattern.name))
            .filter_map(|pattern| {
                let score = pattern.match_score(&aggregates);
                (score > self.config.match_threshold).then(|| FailurePrediction {
                    id: Uuid::new_v4(),
                    pattern_name: pattern.name.to_string(),
                    failure_type: pattern.failure_type,
                    confidence: pattern.avg_confidence,
                    estimated_time_to_failure_ms: pattern.avg_time_to_failure_ms,
                    match_score: score,
                    evidence_span_ids: aggregates.recent_span_ids.clone(),
                    description: pattern.description.to_string(),
                    created_at: now,
                    resolved: false,
                    resolved_at: None,
                    occurred: None,
                })
            })
            .collect()
    }
}

impl Default for PredictionMatcher {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}
