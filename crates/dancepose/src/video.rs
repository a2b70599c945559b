//! Frame sources: the live camera and the seekable reference video.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

/// A decoded video frame or still image.
pub type Frame = image::RgbaImage;

/// Callback invoked by a [`FrameSource`] for every captured frame.
pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// A live frame source, typically the user's camera.
///
/// Frames are delivered at a cadence chosen by the device, possibly from a different thread.
pub trait FrameSource {
    /// Opens the device and starts delivering frames to `on_frame`.
    ///
    /// Fails if the device is unavailable or access was denied. No frames may be delivered after
    /// an error is returned.
    fn start(&mut self, on_frame: FrameCallback) -> anyhow::Result<()>;

    /// Stops frame delivery and releases the device. Stopping a stopped source does nothing.
    fn stop(&mut self);
}

/// A seekable reference video that target poses are marked from.
pub trait ReferenceVideo {
    /// Returns whether the video is currently playing (not paused and not ended).
    fn is_playing(&self) -> bool;

    /// Returns the current playback position.
    fn position(&self) -> Duration;

    /// Copies the frame at the current playback position.
    ///
    /// Returns `None` if the video has not loaded far enough to have a frame at this position.
    fn current_frame(&self) -> Option<Frame>;
}

/// Single-slot handoff of the most recent camera frame.
///
/// A new frame replaces one that has not been picked up yet, so the consumer always sees the
/// latest frame and never a backlog.
#[derive(Default)]
pub(crate) struct FrameMailbox {
    slot: Mutex<Option<Frame>>,
    overwritten: AtomicU64,
}

impl FrameMailbox {
    pub(crate) fn put(&self, frame: Frame) {
        if self.slot.lock().unwrap().replace(frame).is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn take(&self) -> Option<Frame> {
        self.slot.lock().unwrap().take()
    }

    /// Number of frames replaced before they were picked up.
    pub(crate) fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{frame, frame_tag};

    #[test]
    fn mailbox_keeps_latest() {
        let mailbox = FrameMailbox::default();
        assert!(mailbox.take().is_none());

        mailbox.put(frame(1));
        mailbox.put(frame(2));
        mailbox.put(frame(3));
        assert_eq!(mailbox.overwritten(), 2);
        assert_eq!(mailbox.take().map(|f| frame_tag(&f)), Some(3));
        assert!(mailbox.take().is_none());
    }
}
