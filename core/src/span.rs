use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of a single span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Ok,
    Warning,
    Error,
    Critical,
}

impl SpanStatus {
    /// Error and critical spans are the ones failure analysis cares about
    pub fn is_error(self) -> bool {
        matches!(self, SpanStatus::Error | SpanStatus::Critical)
    }
}

/// Represents a single timed unit of agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: u64,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Span {
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<String>,
        name: impl Into<String>,
        start_ms: i64,
        duration_ms: u64,
        status: SpanStatus,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            name: name.into(),
            category: String::new(),
            start_ms,
            end_ms: start_ms + duration_ms as i64,
            duration_ms,
            status,
            agent_id: String::new(),
            domain: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Message used when this span is recorded as a raw error
    pub fn error_message(&self) -> String {
        self.attributes
            .get("error.message")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }
}

/// An ordered batch of spans handed over by the ingestion layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default = "Uuid::new_v4")]
    pub trace_id: Uuid,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn new(spans: Vec<Span>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            spans,
        }
    }
}

/// A raw error held by the session's trace store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub span_id: Option<String>,
    pub agent_id: String,
    pub domain: String,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            message: message.into(),
            span_id: None,
            agent_id: String::new(),
            domain: String::new(),
        }
    }

    /// Record an error span, stamped with the time it was classified
    pub fn from_span(span: &Span, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            message: span.error_message(),
            span_id: Some(span.id.clone()),
            agent_id: span.agent_id.clone(),
            domain: span.domain.clone(),
        }
    }
}

/// Ad hoc duration sample fed to the anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationSample {
    pub id: String,
    pub name: String,
    pub duration_ms: f64,
}

impl DurationSample {
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration_ms,
        }
    }
}

impl From<&Span> for DurationSample {
    fn from(span: &Span) -> Self {
        Self::new(span.id.clone(), span.name.clone(), span.duration_ms as f64)
    }
}
