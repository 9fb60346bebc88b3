use super::{Model, ModelError, ModelLoader, RawScore};
use crate::frame::Frame;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed { reason: String },
}

enum SessionState {
    Unloaded,
    Loading,
    Ready(Arc<dyn Model>),
    Failed(String),
}

impl SessionState {
    fn status(&self) -> ModelStatus {
        match self {
            SessionState::Unloaded => ModelStatus::Unloaded,
            SessionState::Loading => ModelStatus::Loading,
            SessionState::Ready(_) => ModelStatus::Ready,
            SessionState::Failed(reason) => ModelStatus::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// Owns the single model instance and its loading state machine.
///
/// `Unloaded -> Loading -> Ready | Failed`, and `Failed -> Loading` when the
/// caller retries. Nothing retries on its own.
pub struct ModelSession {
    loader: Arc<dyn ModelLoader>,
    state: RwLock<SessionState>,
    status_tx: watch::Sender<ModelStatus>,
}

impl ModelSession {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        let (status_tx, _) = watch::channel(ModelStatus::Unloaded);
        Self {
            loader,
            state: RwLock::new(SessionState::Unloaded),
            status_tx,
        }
    }

    /// Loads the model. Once ready this is a no-op; while another load is
    /// running it waits for that load and returns its outcome.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), ModelError> {
        let in_flight = {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Ready(_)) {
                return Ok(());
            }
            if matches!(*state, SessionState::Loading) {
                Some(self.status_tx.subscribe())
            } else {
                *state = SessionState::Loading;
                self.status_tx.send_replace(ModelStatus::Loading);
                None
            }
        };

        if let Some(status_rx) = in_flight {
            tracing::debug!("Model load already running, waiting for it");
            return wait_for_load(status_rx).await;
        }
        tracing::info!("Loading model");

        let (next, result) = match self.loader.load().await {
            Ok(model) => {
                tracing::info!("Model ready");
                (SessionState::Ready(model), Ok(()))
            }
            Err(err) => {
                let reason = match err {
                    ModelError::Load(reason) => reason,
                    other => other.to_string(),
                };
                tracing::error!("Failed to load model: {}", reason);
                (
                    SessionState::Failed(reason.clone()),
                    Err(ModelError::Load(reason)),
                )
            }
        };

        // status is sent under the state lock; waiters subscribe under it too
        let mut state = self.state.write();
        self.status_tx.send_replace(next.status());
        *state = next;

        result
    }

    pub async fn predict(&self, frame: &Frame) -> Result<Vec<RawScore>, ModelError> {
        let model = match &*self.state.read() {
            SessionState::Ready(model) => model.clone(),
            _ => return Err(ModelError::NotReady),
        };

        model.predict(frame).await.map_err(|err| match err {
            ModelError::Inference(reason) => ModelError::Inference(reason),
            other => ModelError::Inference(other.to_string()),
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), SessionState::Ready(_))
    }

    pub fn status(&self) -> ModelStatus {
        self.state.read().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelStatus> {
        self.status_tx.subscribe()
    }
}

async fn wait_for_load(mut status_rx: watch::Receiver<ModelStatus>) -> Result<(), ModelError> {
    let status = status_rx
        .wait_for(|status| *status != ModelStatus::Loading)
        .await
        .map_err(|e| ModelError::Load(format!("model session closed: {}", e)))?
        .clone();

    match status {
        ModelStatus::Failed { reason } => Err(ModelError::Load(reason)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockModel {}

    #[async_trait]
    impl Model for MockModel {
        async fn predict(&self, _frame: &Frame) -> Result<Vec<RawScore>, ModelError> {
            Ok(vec![RawScore::new("cat", 0.9), RawScore::new("dog", 0.1)])
        }
    }

    struct FailingModel {}

    #[async_trait]
    impl Model for FailingModel {
        async fn predict(&self, _frame: &Frame) -> Result<Vec<RawScore>, ModelError> {
            Err(ModelError::Inference("tensor shape mismatch".to_string()))
        }
    }

    /// Fails the first `failures` loads, then succeeds.
    struct MockLoader {
        failures: usize,
        calls: AtomicUsize,
    }

    impl MockLoader {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelLoader for MockLoader {
        async fn load(&self) -> Result<Arc<dyn Model>, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ModelError::Load("connection refused".to_string()));
            }
            Ok(Arc::new(MockModel {}))
        }
    }

    /// Holds every load until the test releases it.
    struct GatedLoader {
        release: tokio::sync::Semaphore,
        fail: bool,
        calls: AtomicUsize,
    }

    impl GatedLoader {
        fn new(fail: bool) -> Self {
            Self {
                release: tokio::sync::Semaphore::new(0),
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelLoader for GatedLoader {
        async fn load(&self) -> Result<Arc<dyn Model>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.release.acquire().await.unwrap();
            if self.fail {
                return Err(ModelError::Load("artifact truncated".to_string()));
            }
            Ok(Arc::new(MockModel {}))
        }
    }

    struct FailingModelLoader {}

    #[async_trait]
    impl ModelLoader for FailingModelLoader {
        async fn load(&self) -> Result<Arc<dyn Model>, ModelError> {
            Ok(Arc::new(FailingModel {}))
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(RgbImage::new(2, 2))
    }

    #[tokio::test]
    async fn test_predict_before_load_is_not_ready() {
        let session = ModelSession::new(Arc::new(MockLoader::new(0)));

        assert_eq!(session.status(), ModelStatus::Unloaded);
        assert_eq!(session.predict(&frame()).await, Err(ModelError::NotReady));
    }

    #[tokio::test]
    async fn test_load_then_predict() {
        let session = ModelSession::new(Arc::new(MockLoader::new(0)));

        session.load().await.unwrap();
        assert!(session.is_ready());

        let scores = session.predict(&frame()).await.unwrap();
        assert_eq!(scores.len(), 2);
    }

    #[tokio::test]
    async fn test_load_is_idempotent_once_ready() {
        let loader = Arc::new(MockLoader::new(0));
        let session = ModelSession::new(loader.clone());

        session.load().await.unwrap();
        session.load().await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_then_manual_retry() {
        let loader = Arc::new(MockLoader::new(1));
        let session = ModelSession::new(loader.clone());
        let status_rx = session.subscribe();

        let err = session.load().await.unwrap_err();
        assert_eq!(err, ModelError::Load("connection refused".to_string()));
        assert_eq!(
            *status_rx.borrow(),
            ModelStatus::Failed {
                reason: "connection refused".to_string()
            }
        );
        assert_eq!(session.predict(&frame()).await, Err(ModelError::NotReady));

        session.load().await.unwrap();
        assert_eq!(*status_rx.borrow(), ModelStatus::Ready);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scoring_failure_is_inference_error() {
        let session = ModelSession::new(Arc::new(FailingModelLoader {}));
        session.load().await.unwrap();

        assert!(matches!(
            session.predict(&frame()).await,
            Err(ModelError::Inference(_))
        ));
        assert!(session.is_ready());
    }

    async fn concurrent_loads(fail: bool) -> (Arc<GatedLoader>, Arc<ModelSession>, [Result<(), ModelError>; 2]) {
        let loader = Arc::new(GatedLoader::new(fail));
        let session = Arc::new(ModelSession::new(loader.clone()));
        let mut status_rx = session.subscribe();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        status_rx
            .wait_for(|status| *status == ModelStatus::Loading)
            .await
            .unwrap();

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        tokio::task::yield_now().await;
        assert!(!second.is_finished());

        loader.release.add_permits(1);
        let results = [first.await.unwrap(), second.await.unwrap()];
        (loader, session, results)
    }

    #[tokio::test]
    async fn test_load_during_load_waits_for_ready() {
        let (loader, session, results) = concurrent_loads(false).await;

        assert_eq!(results, [Ok(()), Ok(())]);
        assert!(session.is_ready());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(session.predict(&frame()).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_during_load_shares_failure() {
        let (loader, session, results) = concurrent_loads(true).await;

        let expected = Err(ModelError::Load("artifact truncated".to_string()));
        assert_eq!(results, [expected.clone(), expected]);
        assert!(matches!(session.status(), ModelStatus::Failed { .. }));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
