use crate::frame::{Frame, FrameSource};
use crate::gate::InferenceGate;
use crate::history::{HistoryError, HistoryRecord, HistoryRecorder, HistoryStore, ScanType, UserContext};
use crate::model::{ModelError, ModelLoader, ModelSession, ModelStatus};
use crate::ranking::{PredictionList, Publisher};
use crate::scan::{ScanLoop, ScanState};
use crate::telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub scan_interval: Duration,
    pub history_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(33),
            history_limit: 50,
        }
    }
}

/// Owns the model, the single-flight gate, the published predictions, the
/// scan loop and the history recorder, and is the only surface the rest of
/// the application talks to.
pub struct ClassificationEngine {
    session: Arc<ModelSession>,
    publisher: Arc<Publisher>,
    gate: Arc<InferenceGate>,
    scan: ScanLoop,
    history: HistoryRecorder,
}

impl ClassificationEngine {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        store: Arc<dyn HistoryStore>,
        metrics: Arc<Metrics>,
        options: EngineOptions,
    ) -> Self {
        let session = Arc::new(ModelSession::new(loader));
        let publisher = Arc::new(Publisher::new());
        let gate = Arc::new(InferenceGate::new(
            session.clone(),
            publisher.clone(),
            metrics,
        ));
        let scan = ScanLoop::new(gate.clone(), options.scan_interval);
        let history = HistoryRecorder::new(store, options.history_limit);

        Self {
            session,
            publisher,
            gate,
            scan,
            history,
        }
    }

    /// Loads the model on its own task, so a caller that goes away mid-load
    /// cannot leave the session stuck in `Loading`. Resolves once the model is
    /// ready or has failed, also when joining a load that was already running.
    pub async fn load_model(&self) -> Result<(), ModelError> {
        let session = self.session.clone();
        tokio::spawn(async move { session.load().await })
            .await
            .map_err(|e| ModelError::Load(format!("model load task failed: {}", e)))?
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.session.status()
    }

    pub fn subscribe_model_status(&self) -> watch::Receiver<ModelStatus> {
        self.session.subscribe()
    }

    /// Classifies a single upload or capture. `Ok(None)` means another call
    /// was in flight and this frame was dropped.
    pub async fn classify_once(&self, frame: &Frame) -> Result<Option<PredictionList>, ModelError> {
        self.gate.submit(frame).await
    }

    pub fn start_continuous_scan(&self, source: Arc<dyn FrameSource>) {
        self.scan.start(source);
    }

    pub fn stop_continuous_scan(&self) {
        self.scan.stop();
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan.state()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.state() == ScanState::Running
    }

    pub fn current_predictions(&self) -> PredictionList {
        self.publisher.current()
    }

    pub fn subscribe_predictions(&self) -> watch::Receiver<PredictionList> {
        self.publisher.subscribe()
    }

    pub fn clear_predictions(&self) {
        self.publisher.clear();
    }

    pub fn is_processing(&self) -> bool {
        self.gate.is_processing()
    }

    pub fn subscribe_processing(&self) -> watch::Receiver<bool> {
        self.gate.subscribe_processing()
    }

    pub fn set_user(&self, user: Option<UserContext>) {
        self.history.set_user(user);
    }

    pub fn user(&self) -> Option<UserContext> {
        self.history.user()
    }

    /// Saves the currently published predictions to the user's history.
    pub async fn save_current_result(
        &self,
        scan_type: ScanType,
        image_ref: Option<String>,
    ) -> Result<HistoryRecord, HistoryError> {
        let predictions = self.publisher.current();
        self.history.save(&predictions, scan_type, image_ref).await
    }

    pub async fn list_history(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.history.list(limit).await
    }

    pub fn cached_history(&self) -> Vec<HistoryRecord> {
        self.history.cached()
    }

    pub async fn delete_history_entry(&self, id: Uuid) -> bool {
        self.history.delete(id).await
    }
}
