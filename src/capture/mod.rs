//! Capture resource: microphone blocks and optional camera stills
//!
//! The session acquires exactly one capture handle in `Connecting` and
//! releases it in `Ending`. Mute/camera toggles never touch the handle;
//! acquiring the physical device is expensive and happens once per session.

pub mod system;

use crossbeam_channel::Receiver as ErrorReceiver;
use std::any::Any;
use tokio::sync::mpsc;

use crate::error::CaptureError;

pub use system::SystemCapture;

/// One fixed-duration block of interleaved f32 microphone samples
pub type AudioBlock = Vec<f32>;

/// An uncompressed still frame from the local camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixel data, `width * height * 3` bytes
    pub pixels: Vec<u8>,
}

/// On-demand still-frame source.
///
/// `None` means the device is unavailable or produced nothing this tick;
/// that is a skipped frame, not an error.
pub trait CameraSource: Send {
    fn capture_frame(&mut self) -> Option<RawFrame>;
}

/// Provider of capture resources
pub trait MediaCapture {
    /// Acquire the microphone (and camera if `wants_video`).
    ///
    /// Fails with [`CaptureError`] when no device is available or access is
    /// denied; the session reports that synchronously and never retries.
    fn acquire(&self, wants_video: bool) -> Result<CaptureHandle, CaptureError>;
}

/// Owner of the underlying device resource.
///
/// Dropping the guard (or calling [`CaptureGuard::release`]) stops the
/// device streams. Release is unconditional and idempotent.
pub struct CaptureGuard {
    inner: Option<Box<dyn Any + Send>>,
}

impl CaptureGuard {
    /// Wrap a device resource whose `Drop` stops the streams
    pub fn new(resource: Box<dyn Any + Send>) -> Self {
        Self {
            inner: Some(resource),
        }
    }

    /// Release the device resource. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("capture resource released");
        }
    }

    /// Whether the resource is still held
    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// An acquired capture resource.
///
/// Audio arrives as fixed-duration blocks on a bounded queue filled by the
/// device callback; the camera, when present, is polled on demand by the
/// video sampler. Stream errors raised inside the device callback surface
/// through `errors`.
pub struct CaptureHandle {
    /// Queue of captured audio blocks, in capture order
    pub blocks: mpsc::Receiver<AudioBlock>,
    /// Still-frame source, present only when video was requested and a
    /// camera is available
    pub camera: Option<Box<dyn CameraSource>>,
    /// Owner of the device streams
    pub guard: CaptureGuard,
    /// Asynchronous stream errors from the device callback
    pub errors: Option<ErrorReceiver<CaptureError>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingResource(Arc<AtomicUsize>);

    impl Drop for CountingResource {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_release_is_idempotent() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut guard = CaptureGuard::new(Box::new(CountingResource(drops.clone())));

        assert!(guard.is_held());
        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_releases_on_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let _guard = CaptureGuard::new(Box::new(CountingResource(drops.clone())));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
