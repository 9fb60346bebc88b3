use crate::frame::Frame;
use crate::model::{ModelError, ModelSession};
use crate::ranking::{rank, PredictionList, Publisher};
use crate::telemetry::Metrics;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;
use tokio::sync::watch;

/// What happens to a submission that arrives while a call is in flight.
///
/// Only `DropLatest` is implemented: the new frame is discarded, nothing is
/// queued and the in-flight call runs to completion. Camera frames arrive
/// faster than the model scores them, so freshness wins over completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    #[default]
    DropLatest,
}

/// Lets at most one prediction call run at any time.
pub struct InferenceGate {
    session: Arc<ModelSession>,
    publisher: Arc<Publisher>,
    metrics: Arc<Metrics>,
    policy: BusyPolicy,
    in_flight: AtomicBool,
    processing_tx: watch::Sender<bool>,
}

/// Held for the duration of one call; releases the gate on every exit path.
struct FlightGuard<'a> {
    gate: &'a InferenceGate,
}

impl<'a> FlightGuard<'a> {
    fn try_acquire(gate: &'a InferenceGate) -> Option<Self> {
        gate.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        gate.processing_tx.send_replace(true);
        Some(Self { gate })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.gate.processing_tx.send_replace(false);
        self.gate.in_flight.store(false, Ordering::Release);
    }
}

impl InferenceGate {
    pub fn new(session: Arc<ModelSession>, publisher: Arc<Publisher>, metrics: Arc<Metrics>) -> Self {
        let (processing_tx, _) = watch::channel(false);
        Self {
            session,
            publisher,
            metrics,
            policy: BusyPolicy::default(),
            in_flight: AtomicBool::new(false),
            processing_tx,
        }
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    /// Scores `frame` and publishes the ranked result.
    ///
    /// Returns `Ok(None)` without touching the model when another call is
    /// already in flight. A failed call leaves the published predictions as
    /// they were.
    pub async fn submit(&self, frame: &Frame) -> Result<Option<PredictionList>, ModelError> {
        if !self.session.is_ready() {
            return Err(ModelError::NotReady);
        }

        let _guard = match FlightGuard::try_acquire(self) {
            Some(guard) => guard,
            None => match self.policy {
                BusyPolicy::DropLatest => {
                    self.metrics.record_dropped_frame();
                    tracing::trace!("Inference in flight, dropping frame");
                    return Ok(None);
                }
            },
        };

        let started = Instant::now();
        let result = self.session.predict(frame).await;
        self.metrics
            .record_inference(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(raw) => {
                let predictions = rank(raw);
                self.publisher.publish(predictions.clone());
                self.metrics.record_published_predictions();
                Ok(Some(predictions))
            }
            Err(err) => {
                self.metrics.record_inference_failure();
                tracing::warn!("Classification error: {}", err);
                Err(err)
            }
        }
    }

    pub fn is_processing(&self) -> bool {
        *self.processing_tx.borrow()
    }

    pub fn subscribe_processing(&self) -> watch::Receiver<bool> {
        self.processing_tx.subscribe()
    }
}
