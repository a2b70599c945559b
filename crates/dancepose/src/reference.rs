//! Pose detection on the playing reference video, for side-by-side display.
//!
//! The sampled poses are only shown, never scored.

use std::{
    task::Poll,
    time::{Duration, Instant},
};

use crate::detect::{DetectorFactory, DetectorOptions, StreamingDetector};
use crate::error::Result;
use crate::landmark::LandmarkSet;
use crate::ui::{Color, Ui};
use crate::video::ReferenceVideo;

/// Periodically runs the reference video's current frame through a dedicated streaming detector.
pub struct ReferenceSampler {
    detector: StreamingDetector,
    next_sample: Option<Instant>,
    /// Samples submitted whose result has not been received yet.
    outstanding: usize,
    /// Number of upcoming results that belong to a playback position from before a pause.
    stale: usize,
    latest: Option<LandmarkSet>,
}

impl ReferenceSampler {
    /// Time between two samples while the video is playing.
    pub const INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(factory: &dyn DetectorFactory, options: &DetectorOptions) -> Result<Self> {
        Ok(Self {
            detector: StreamingDetector::new("reference", factory, options)?,
            next_sample: None,
            outstanding: 0,
            stale: 0,
            latest: None,
        })
    }

    /// Samples `video` if it is playing and a sample is due, and shows every pose detected since
    /// the last call.
    ///
    /// Sampling stops as soon as the video is paused or ended. Samples missed in between are not
    /// made up for, and results of samples still in flight when playback stopped are discarded,
    /// even if they arrive after playback resumed.
    pub fn pump(&mut self, video: &dyn ReferenceVideo, now: Instant, ui: &mut dyn Ui) {
        if !video.is_playing() {
            if self.next_sample.take().is_some() {
                log::trace!("reference video stopped playing");
            }
            while self.next_result().is_ready() {}
            self.stale = self.outstanding;
            return;
        }

        while let Poll::Ready(result) = self.next_result() {
            if self.stale > 0 {
                self.stale -= 1;
                log::trace!("discarding reference pose sampled before pause");
                continue;
            }
            if let Some(pose) = result {
                ui.show_pose(&pose, Color::REFERENCE, Some("Reference"));
                self.latest = Some(pose);
            }
        }

        if self.next_sample.map_or(true, |next| now >= next) {
            self.next_sample = Some(now + Self::INTERVAL);
            if let Some(frame) = video.current_frame() {
                if self.detector.offer(frame) {
                    self.outstanding += 1;
                }
            }
        }
    }

    fn next_result(&mut self) -> Poll<Option<LandmarkSet>> {
        let result = self.detector.try_recv();
        if result.is_ready() {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        result
    }

    /// Returns the most recently detected reference pose.
    pub fn latest(&self) -> Option<&LandmarkSet> {
        self.latest.as_ref()
    }
}
