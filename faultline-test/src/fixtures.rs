use chrono::{DateTime, TimeZone, Utc};
use faultline_core::{DurationSample, Span, SpanStatus, Trace};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TraceFixture {
    pub trace: Trace,
    pub expected_edges: usize,
    pub expected_root_causes: Vec<String>,
    /// Span ids along the expected critical path
    pub expected_critical_path: Vec<String>,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn base_ms() -> i64 {
    base_time().timestamp_millis()
}

fn child(id: &str, parent: &str, offset_ms: i64, duration_ms: u64, status: SpanStatus) -> Span {
    Span::new(
        id,
        Some(parent.to_string()),
        id,
        base_ms() + offset_ms,
        duration_ms,
        status,
    )
}

/// Three chained errors below an ok request, plus an ok leaf hanging off
/// the first error
pub fn error_chain_fixture() -> TraceFixture {
    let trace_id = Uuid::parse_str("aaaaaaaa-aaaa-4aaa-aaaa-aaaaaaaaaaaa").unwrap();

    let spans = vec![
        Span::new("request", None, "handle_request", base_ms(), 900, SpanStatus::Ok)
            .with_agent("gateway")
            .with_domain("api"),
        child("plan", "request", 10, 200, SpanStatus::Error)
            .with_agent("planner")
            .with_domain("planning")
            .with_attribute("error.message", serde_json::json!("plan rejected")),
        child("execute", "plan", 220, 300, SpanStatus::Error)
            .with_agent("coder")
            .with_domain("execution"),
        child("verify", "execute", 530, 100, SpanStatus::Critical)
            .with_agent("tester")
            .with_domain("verification"),
        child("log", "plan", 215, 5, SpanStatus::Ok).with_agent("planner"),
    ];

    TraceFixture {
        trace: Trace { trace_id, spans },
        expected_edges: 4,
        expected_root_causes: vec!["plan".into()],
        expected_critical_path: vec!["plan".into(), "execute".into(), "verify".into()],
    }
}

/// A healthy trace with no error spans at all
pub fn healthy_fixture() -> TraceFixture {
    let spans = vec![
        Span::new("root", None, "session", base_ms(), 500, SpanStatus::Ok).with_agent("planner"),
        child("search", "root", 10, 120, SpanStatus::Ok).with_agent("researcher"),
        child("summarize", "root", 140, 200, SpanStatus::Warning).with_agent("writer"),
    ];

    TraceFixture {
        trace: Trace::new(spans),
        expected_edges: 2,
        expected_root_causes: Vec::new(),
        expected_critical_path: Vec::new(),
    }
}

/// Spans whose latency keeps climbing toward the configured latency threshold
pub fn rising_latency_trace(prefix: &str, durations: &[u64]) -> Trace {
    let mut offset = 0;
    let spans = durations
        .iter()
        .enumerate()
        .map(|(i, &duration)| {
            let span = Span::new(
                format!("{prefix}-{i}"),
                None,
                "llm_call",
                base_ms() + offset,
                duration,
                SpanStatus::Ok,
            )
            .with_agent("writer");
            offset += duration as i64;
            span
        })
        .collect();
    Trace::new(spans)
}

/// Twenty 100ms samples plus one 100s outlier
pub fn spike_batch(batch: usize) -> Vec<DurationSample> {
    let mut samples: Vec<DurationSample> = (0..20)
        .map(|i| DurationSample::new(format!("batch{batch}-{i}"), "tool_call", 100.0))
        .collect();
    samples.push(DurationSample::new(
        format!("batch{batch}-spike"),
        "tool_call",
        100_000.0,
    ));
    samples
}

/// Durations that never stray more than 5ms from 100ms
pub fn steady_batch(len: usize) -> Vec<DurationSample> {
    (0..len)
        .map(|i| DurationSample::new(format!("steady-{i}"), "tool_call", 100.0 + (i % 6) as f64))
        .collect()
}
