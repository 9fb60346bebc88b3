use crate::frame::FrameSource;
use crate::gate::InferenceGate;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    time::sleep,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
}

struct ActiveScan {
    id: u64,
    shutdown_tx: broadcast::Sender<()>,
}

/// Repeatedly feeds frames from a source through the inference gate.
///
/// Stopping only prevents the next iteration; an inference already in flight
/// is allowed to finish.
pub struct ScanLoop {
    gate: Arc<InferenceGate>,
    interval: Duration,
    active: Arc<Mutex<Option<ActiveScan>>>,
    next_id: AtomicU64,
}

impl ScanLoop {
    pub fn new(gate: Arc<InferenceGate>, interval: Duration) -> Self {
        Self {
            gate,
            interval,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Starts scanning `source`, replacing any scan already running.
    pub fn start(&self, source: Arc<dyn FrameSource>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let previous = self
            .active
            .lock()
            .replace(ActiveScan { id, shutdown_tx });
        if let Some(previous) = previous {
            let _ = previous.shutdown_tx.send(());
            tracing::info!("Replacing running scan {}", previous.id);
        }

        tracing::info!("Starting continuous scan {}", id);
        tokio::spawn(run_scan(
            id,
            self.gate.clone(),
            source,
            self.interval,
            shutdown_rx,
            self.active.clone(),
        ));
    }

    /// Stops the running scan. Safe to call in any state, any number of times.
    pub fn stop(&self) {
        if let Some(scan) = self.active.lock().take() {
            let _ = scan.shutdown_tx.send(());
            tracing::info!("Stopping continuous scan {}", scan.id);
        }
    }

    pub fn state(&self) -> ScanState {
        if self.active.lock().is_some() {
            ScanState::Running
        } else {
            ScanState::Idle
        }
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_scan(
    id: u64,
    gate: Arc<InferenceGate>,
    source: Arc<dyn FrameSource>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    active: Arc<Mutex<Option<ActiveScan>>>,
) {
    loop {
        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        if !source.is_live() {
            tracing::info!("Frame source for scan {} is gone", id);
            break;
        }

        if source.is_ready() {
            if let Some(frame) = source.current_frame() {
                match gate.submit(&frame).await {
                    Ok(Some(predictions)) => {
                        tracing::debug!(
                            "Scan {} published {} predictions",
                            id,
                            predictions.len()
                        );
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!("Scan {} skipped a frame: {}", id, err);
                    }
                }
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    let mut active = active.lock();
    if active.as_ref().is_some_and(|scan| scan.id == id) {
        *active = None;
    }
    tracing::info!("Continuous scan {} stopped", id);
}
