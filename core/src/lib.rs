pub mod anomaly;
pub mod config;
pub mod error;
pub mod graph;
pub mod prediction;
pub mod session;
pub mod span;
pub mod store;

pub use anomaly::{Anomaly, AnomalyCascade, AnomalyDetector, AnomalyKind, AnomalySeverity};
pub use config::Config;
pub use error::{FaultlineError, Result};
pub use graph::{CausalGraph, CausalNode, GraphSnapshot, GraphStats, IngestSummary};
pub use prediction::{FailurePrediction, FailureType, PredictionMatcher, PredictionStats};
pub use session::{AnalysisReport, SessionState};
pub use span::{DurationSample, ErrorRecord, Span, SpanStatus, Trace};
pub use store::SessionStore;
