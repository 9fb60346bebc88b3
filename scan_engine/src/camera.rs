use crate::frame::{live_feed, FeedPublisher, Frame, FrameError, LiveFeed, StillFrame};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera is not active")]
    NotActive,
    #[error("No frame decoded yet")]
    NoFrame,
    #[error("Failed to decode frame: {0}")]
    DecodeFrameFailed(#[from] FrameError),
}

/// Live camera whose frames are pushed in by the capture side (a browser
/// posting encoded frames, a device driver, ...).
#[derive(Debug, Default)]
pub struct Camera {
    publisher: Mutex<Option<FeedPublisher>>,
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the camera, or returns the feed of the already active one.
    pub fn open(&self) -> LiveFeed {
        let mut publisher = self.publisher.lock();
        if let Some(active) = publisher.as_ref() {
            return active.subscribe();
        }

        let (tx, feed) = live_feed();
        *publisher = Some(tx);
        tracing::info!("Camera started");
        feed
    }

    pub fn is_active(&self) -> bool {
        self.publisher.lock().is_some()
    }

    pub fn feed(&self) -> Option<LiveFeed> {
        self.publisher.lock().as_ref().map(FeedPublisher::subscribe)
    }

    pub fn push_frame(&self, frame: Frame) -> Result<(), CameraError> {
        let publisher = self.publisher.lock();
        let publisher = publisher.as_ref().ok_or(CameraError::NotActive)?;
        publisher.publish(frame);
        Ok(())
    }

    pub fn push_encoded(&self, image_data: &[u8]) -> Result<(), CameraError> {
        if !self.is_active() {
            return Err(CameraError::NotActive);
        }
        let frame = Frame::decode(image_data)?;
        self.push_frame(frame)
    }

    /// Snapshot of the latest frame, usable as a one-off still.
    pub fn capture(&self) -> Result<StillFrame, CameraError> {
        let publisher = self.publisher.lock();
        let publisher = publisher.as_ref().ok_or(CameraError::NotActive)?;
        publisher
            .latest()
            .map(StillFrame::new)
            .ok_or(CameraError::NoFrame)
    }

    /// Stops the camera. Every feed handed out becomes invalid. Returns false
    /// when the camera was not active.
    pub fn stop(&self) -> bool {
        let stopped = self.publisher.lock().take().is_some();
        if stopped {
            tracing::info!("Camera stopped");
        }
        stopped
    }
}
