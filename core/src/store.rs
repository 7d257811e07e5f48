use crate::anomaly::Anomaly;
use crate::config::Config;
use crate::error::{FaultlineError, Result};
use crate::graph::IngestSummary;
use crate::prediction::PredictionStats;
use crate::session::{AnalysisReport, SessionState};
use crate::span::{DurationSample, ErrorRecord, Trace};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Arena of independent sessions keyed by session id.
///
/// Each session is mutated only while its map entry is held, so callers of
/// the same session are serialized while distinct sessions proceed in
/// parallel.
pub struct SessionStore {
    config: Config,
    sessions: DashMap<String, SessionState>,
    /// Prediction outcomes of sessions that have been removed
    retired: Mutex<PredictionStats>,
}

impl SessionStore {
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| FaultlineError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            sessions: DashMap::new(),
            retired: Mutex::new(PredictionStats::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn create_session(&self, session_id: &str) -> Result<()> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(FaultlineError::SessionExists(session_id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(SessionState::with_config(session_id, &self.config));
                tracing::debug!(session = session_id, "Created session");
                Ok(())
            }
        }
    }

    /// Create the session on first use
    pub fn ensure_session(&self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::with_config(session_id, &self.config));
    }

    pub fn remove_session(&self, session_id: &str) -> Result<SessionState> {
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| FaultlineError::SessionNotFound(session_id.to_string()))?;

        let mut retired = self
            .retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *retired = retired.merge(session.prediction_stats());

        Ok(session)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run `f` against a session while holding its entry
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Result<R> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| FaultlineError::SessionNotFound(session_id.to_string()))?;
        Ok(f(session.value_mut()))
    }

    pub fn ingest_trace(&self, session_id: &str, trace: &Trace) -> Result<IngestSummary> {
        self.with_session(session_id, |session| session.ingest_trace(trace))
    }

    pub fn detect_anomalies(
        &self,
        session_id: &str,
        samples: &[DurationSample],
    ) -> Result<Vec<Anomaly>> {
        self.with_session(session_id, |session| session.detect_anomalies(samples))
    }

    pub fn record_error(&self, session_id: &str, error: ErrorRecord) -> Result<()> {
        self.with_session(session_id, |session| session.record_error(error))
    }

    pub fn resolve_prediction(
        &self,
        session_id: &str,
        prediction_id: Uuid,
        occurred: bool,
    ) -> Result<bool> {
        self.with_session(session_id, |session| {
            session.resolve_prediction(prediction_id, occurred)
        })
    }

    pub fn report(&self, session_id: &str) -> Result<AnalysisReport> {
        self.with_session(session_id, |session| session.report())
    }

    /// Prediction accuracy across live and removed sessions
    pub fn global_prediction_stats(&self) -> PredictionStats {
        let retired = *self
            .retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.sessions
            .iter()
            .map(|entry| entry.value().prediction_stats())
            .fold(retired, PredictionStats::merge)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            config: Config::default(),
            sessions: DashMap::new(),
            retired: Mutex::new(PredictionStats::default()),
        }
    }
}
