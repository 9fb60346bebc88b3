use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Empty image payload")]
    Empty,
    #[error("Error decoding image: {0}")]
    Decode(String),
}

/// One still visual sample ready to be scored.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    /// Decodes an uploaded or captured image (JPEG, PNG, ...) into a frame.
    pub fn decode(image_data: &[u8]) -> Result<Self, FrameError> {
        if image_data.is_empty() {
            return Err(FrameError::Empty);
        }

        let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
            .with_guessed_format()
            .map_err(|e| FrameError::Decode(e.to_string()))?;

        let decoded = image_reader
            .decode()
            .map_err(|e| FrameError::Decode(e.to_string()))?;

        Ok(Self::from_rgb(decoded.to_rgb8()))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Anything the engine can pull classifiable frames from.
///
/// `is_ready` is checked before every pull; `is_live` turning false means the
/// source is gone for good and any scan bound to it should end.
pub trait FrameSource: Send + Sync + 'static {
    fn is_ready(&self) -> bool;

    fn current_frame(&self) -> Option<Frame>;

    fn is_live(&self) -> bool {
        true
    }
}

/// A decoded upload or a snapshot captured from the camera.
#[derive(Debug, Clone)]
pub struct StillFrame {
    frame: Frame,
}

impl StillFrame {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn decode(image_data: &[u8]) -> Result<Self, FrameError> {
        Frame::decode(image_data).map(Self::new)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl FrameSource for StillFrame {
    fn is_ready(&self) -> bool {
        true
    }

    fn current_frame(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}

/// Creates a connected publisher/feed pair for a live video source.
pub fn live_feed() -> (FeedPublisher, LiveFeed) {
    let (tx, rx) = watch::channel(None);
    (FeedPublisher { tx }, LiveFeed { rx })
}

/// Producing side of a live feed, owned by the camera.
///
/// Dropping it invalidates every [`LiveFeed`] attached to it.
#[derive(Debug)]
pub struct FeedPublisher {
    tx: watch::Sender<Option<Frame>>,
}

impl FeedPublisher {
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }

    pub fn latest(&self) -> Option<Frame> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> LiveFeed {
        LiveFeed {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consuming side of a live video source. Ready once the camera has decoded
/// at least one frame.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameSource for LiveFeed {
    fn is_ready(&self) -> bool {
        self.is_live() && self.rx.borrow().is_some()
    }

    fn current_frame(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    fn is_live(&self) -> bool {
        self.rx.has_changed().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb([255, 0, 0]));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[test]
    fn test_decode_upload() {
        let frame = Frame::decode(&encoded_png(100, 50)).unwrap();

        assert_eq!(frame.width(), 100);
        assert_eq!(frame.height(), 50);
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Frame::decode(&[]), Err(FrameError::Empty)));
        assert!(matches!(
            Frame::decode(&[0, 1, 2, 3]),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn test_still_frame_is_always_ready() {
        let still = StillFrame::decode(&encoded_png(8, 8)).unwrap();

        assert!(still.is_ready());
        assert!(still.is_live());
        assert!(still.current_frame().is_some());
    }

    #[test]
    fn test_live_feed_lifecycle() {
        let (publisher, feed) = live_feed();

        assert!(feed.is_live());
        assert!(!feed.is_ready());
        assert!(feed.current_frame().is_none());

        publisher.publish(Frame::from_rgb(RgbImage::new(4, 4)));
        assert!(feed.is_ready());
        assert_eq!(feed.current_frame().unwrap().width(), 4);

        drop(publisher);
        assert!(!feed.is_live());
        assert!(!feed.is_ready());
    }
}
