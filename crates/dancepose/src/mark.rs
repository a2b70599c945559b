//! Pose marking: turning a reference video frame or a batch of photos into target poses.
//!
//! Every image is snapshotted and handed to its own [`OneShot`] detection. Photos of a batch are
//! processed strictly one after another, so at most one marking detector instance exists at any
//! time.
//!
//! A capture whose detection yields no pose is stored as a failed target (without landmarks) in
//! both modes. No substitute pose is ever made up.

use std::{collections::VecDeque, sync::Arc, task::Poll, time::Duration};

use crate::detect::{DetectorFactory, DetectorOptions, OneShot};
use crate::error::{Error, Result};
use crate::landmark::LandmarkSet;
use crate::target::{TargetId, TargetPose, PHOTO_BATCH_SIZE};
use crate::video::{Frame, ReferenceVideo};

/// State of the marking workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkState {
    /// Nothing has been marked yet.
    Idle,
    /// Detection is running. `completed` of `total` images are done.
    Detecting { completed: usize, total: usize },
    /// The last marking produced at least one detected pose.
    Marked,
    /// The last marking produced no detected pose at all.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Detected,
    Failed,
}

/// Per-slot outcome of a marking run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkReport {
    slots: Vec<(TargetId, SlotStatus)>,
}

impl MarkReport {
    pub fn slots(&self) -> &[(TargetId, SlotStatus)] {
        &self.slots
    }

    pub fn detected(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.with_status(SlotStatus::Detected)
    }

    pub fn failed(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.with_status(SlotStatus::Failed)
    }

    fn with_status(&self, status: SlotStatus) -> impl Iterator<Item = TargetId> + '_ {
        self.slots
            .iter()
            .filter(move |(_, s)| *s == status)
            .map(|(id, _)| *id)
    }

    /// Returns whether at least one slot has a detected pose.
    pub fn is_success(&self) -> bool {
        self.detected().next().is_some()
    }
}

/// The result of a completed marking run.
#[derive(Debug)]
pub struct Marked {
    pub targets: Vec<TargetPose>,
    pub report: MarkReport,
}

struct Capture {
    id: TargetId,
    timestamp: Option<Duration>,
    image: Arc<Frame>,
}

impl Capture {
    fn into_target(self, landmarks: Option<LandmarkSet>) -> TargetPose {
        let target = TargetPose::new(self.id, landmarks).with_source_image(self.image);
        match self.timestamp {
            Some(ts) => target.with_timestamp(ts),
            None => target,
        }
    }
}

struct Job {
    queue: VecDeque<Capture>,
    current: Option<(Capture, OneShot)>,
    finished: Vec<TargetPose>,
    total: usize,
}

impl Job {
    /// Starts detection on the next queued capture.
    ///
    /// Captures whose detector cannot be created are recorded as failed. Returns `false` once the
    /// queue is exhausted.
    fn launch_next(&mut self, detectors: &dyn DetectorFactory, options: &DetectorOptions) -> bool {
        while let Some(capture) = self.queue.pop_front() {
            match OneShot::spawn(detectors, options, (*capture.image).clone()) {
                Ok(shot) => {
                    self.current = Some((capture, shot));
                    return true;
                }
                Err(e) => {
                    log::error!("{}: {e}", capture.id);
                    self.finished.push(capture.into_target(None));
                }
            }
        }
        false
    }

    fn into_marked(self) -> Marked {
        let slots = self
            .finished
            .iter()
            .map(|t| {
                let status = if t.is_detected() {
                    SlotStatus::Detected
                } else {
                    SlotStatus::Failed
                };
                (t.id(), status)
            })
            .collect();
        Marked {
            targets: self.finished,
            report: MarkReport { slots },
        }
    }
}

/// Drives pose marking for one session.
pub struct Marker {
    detectors: Arc<dyn DetectorFactory>,
    options: DetectorOptions,
    state: MarkState,
    job: Option<Job>,
}

impl Marker {
    pub fn new(detectors: Arc<dyn DetectorFactory>, options: DetectorOptions) -> Self {
        Self {
            detectors,
            options,
            state: MarkState::Idle,
            job: None,
        }
    }

    #[inline]
    pub fn state(&self) -> MarkState {
        self.state
    }

    #[inline]
    pub fn is_detecting(&self) -> bool {
        matches!(self.state, MarkState::Detecting { .. })
    }

    /// Captures the reference video's current frame and starts detecting the pose on it.
    ///
    /// The result becomes target 1, stamped with the video position.
    pub fn mark_frame(&mut self, video: &dyn ReferenceVideo) -> Result<()> {
        self.check_idle()?;
        let image = video.current_frame().ok_or(Error::SourceNotReady)?;
        self.begin(vec![Capture {
            id: TargetId::new(1),
            timestamp: Some(video.position()),
            image: Arc::new(image),
        }])
    }

    /// Starts detecting poses on a batch of exactly [`PHOTO_BATCH_SIZE`] photos.
    ///
    /// Photo `i` (0-based) becomes target `i + 1`.
    pub fn mark_photos(&mut self, photos: Vec<Frame>) -> Result<()> {
        self.check_idle()?;
        if photos.len() != PHOTO_BATCH_SIZE {
            return Err(Error::InputCardinality {
                expected: PHOTO_BATCH_SIZE,
                actual: photos.len(),
            });
        }
        let captures = photos
            .into_iter()
            .zip(1..)
            .map(|(image, slot)| Capture {
                id: TargetId::new(slot),
                timestamp: None,
                image: Arc::new(image),
            })
            .collect();
        self.begin(captures)
    }

    fn check_idle(&self) -> Result<()> {
        if self.is_detecting() {
            return Err(Error::invalid("mark a pose", "detecting"));
        }
        Ok(())
    }

    fn begin(&mut self, captures: Vec<Capture>) -> Result<()> {
        let mut queue = VecDeque::from(captures);
        let total = queue.len();
        let Some(first) = queue.pop_front() else {
            return Ok(());
        };

        // The first detector is created eagerly so that a broken detector is reported to the
        // caller instead of silently failing every slot.
        let shot = OneShot::spawn(&*self.detectors, &self.options, (*first.image).clone())?;
        self.job = Some(Job {
            queue,
            current: Some((first, shot)),
            finished: Vec::with_capacity(total),
            total,
        });
        self.state = MarkState::Detecting {
            completed: 0,
            total,
        };
        log::debug!("marking {total} image(s)");
        Ok(())
    }

    /// Advances marking without blocking.
    ///
    /// Returns the completed run once the last image has been processed, and `None` while
    /// detection is still running or when nothing is being marked.
    pub fn poll(&mut self) -> Option<Marked> {
        self.step(false)
    }

    /// Blocks until the current marking run completes.
    ///
    /// Returns `None` if nothing is being marked.
    pub fn wait(&mut self) -> Option<Marked> {
        self.step(true)
    }

    fn step(&mut self, block: bool) -> Option<Marked> {
        let job = self.job.as_mut()?;
        while let Some((capture, mut shot)) = job.current.take() {
            let result = if block {
                shot.wait()
            } else {
                match shot.poll() {
                    Poll::Ready(result) => result,
                    Poll::Pending => {
                        job.current = Some((capture, shot));
                        return None;
                    }
                }
            };

            if result.is_none() {
                log::debug!("{}: no pose detected", capture.id);
            }
            job.finished.push(capture.into_target(result));
            self.state = MarkState::Detecting {
                completed: job.finished.len(),
                total: job.total,
            };
            job.launch_next(&*self.detectors, &self.options);
        }

        let marked = self.job.take()?.into_marked();
        self.state = if marked.report.is_success() {
            MarkState::Marked
        } else {
            MarkState::Failed
        };
        log::info!(
            "marking done: {} detected, {} failed",
            marked.report.detected().count(),
            marked.report.failed().count()
        );
        Some(marked)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test::{frame, photos, uniform_pose, FakeDetectors, FakeVideo};

    fn marker(detectors: &FakeDetectors) -> Marker {
        Marker::new(Arc::new(detectors.clone()), DetectorOptions::photo())
    }

    #[test]
    fn marks_video_frame() {
        let detectors = FakeDetectors::new().with_pose(7, uniform_pose(0.4, 0.4, 0.9));
        let mut marker = marker(&detectors);
        let video = FakeVideo::paused_at(Duration::from_secs(3), frame(7));

        marker.mark_frame(&video).unwrap();
        let marked = marker.poll().unwrap();
        assert_eq!(marker.state(), MarkState::Marked);

        let target = &marked.targets[0];
        assert_eq!(target.id(), TargetId::new(1));
        assert_eq!(target.label(), "Pose 1");
        assert_eq!(target.timestamp(), Some(Duration::from_secs(3)));
        assert_eq!(target.landmarks(), Some(&uniform_pose(0.4, 0.4, 0.9)));
        assert!(target.source_image().is_some());
        assert!(marked.report.is_success());
    }

    #[test]
    fn undetected_video_frame_fails_without_placeholder() {
        let detectors = FakeDetectors::new();
        let mut marker = marker(&detectors);
        marker
            .mark_frame(&FakeVideo::paused_at(Duration::ZERO, frame(1)))
            .unwrap();
        let marked = marker.poll().unwrap();
        assert_eq!(marker.state(), MarkState::Failed);
        assert!(marked.targets[0].landmarks().is_none());
        assert_eq!(marked.report.failed().collect::<Vec<_>>(), [TargetId::new(1)]);
    }

    #[test]
    fn video_not_ready() {
        let detectors = FakeDetectors::new();
        let mut marker = marker(&detectors);
        let video = FakeVideo::default();
        assert!(matches!(
            marker.mark_frame(&video),
            Err(Error::SourceNotReady)
        ));
        assert_eq!(marker.state(), MarkState::Idle);
        assert_eq!(detectors.created(), 0);
    }

    #[test]
    fn second_mark_while_detecting_is_rejected() {
        let detectors = FakeDetectors::manual().with_pose(1, uniform_pose(0.5, 0.5, 1.0));
        let mut marker = marker(&detectors);
        let video = FakeVideo::paused_at(Duration::ZERO, frame(1));

        marker.mark_frame(&video).unwrap();
        assert!(marker.poll().is_none());
        assert!(matches!(
            marker.mark_frame(&video),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(detectors.created(), 1);

        detectors.resolve_next();
        assert!(marker.poll().is_some());
        marker.mark_frame(&video).unwrap();
    }

    #[test]
    fn wrong_photo_count_is_rejected_up_front() {
        let detectors = FakeDetectors::new();
        let mut marker = marker(&detectors);
        let err = marker.mark_photos(photos(&[1, 2, 3, 4])).unwrap_err();
        assert!(matches!(
            err,
            Error::InputCardinality {
                expected: 5,
                actual: 4
            }
        ));
        assert_eq!(marker.state(), MarkState::Idle);
        assert_eq!(detectors.created(), 0);
        assert!(marker.mark_photos(photos(&[1, 2, 3, 4, 5, 6])).is_err());
    }

    #[test]
    fn photos_are_processed_one_at_a_time() {
        let detectors = FakeDetectors::manual()
            .with_pose(1, uniform_pose(0.1, 0.1, 1.0))
            .with_pose(2, uniform_pose(0.2, 0.2, 1.0))
            .with_pose(4, uniform_pose(0.4, 0.4, 1.0));
        let mut marker = marker(&detectors);
        marker.mark_photos(photos(&[1, 2, 3, 4, 5])).unwrap();

        for done in 0..5 {
            assert_eq!(detectors.created(), done + 1);
            assert_eq!(detectors.pending(), 1);
            assert_eq!(
                marker.state(),
                MarkState::Detecting {
                    completed: done,
                    total: 5
                }
            );
            assert!(marker.poll().is_none());
            detectors.resolve_next();
            if done < 4 {
                assert!(marker.poll().is_none());
            }
        }

        let marked = marker.poll().unwrap();
        assert_eq!(marker.state(), MarkState::Marked);
        let detected = marked.report.detected().map(|id| id.slot()).collect::<Vec<_>>();
        let failed = marked.report.failed().map(|id| id.slot()).collect::<Vec<_>>();
        assert_eq!(detected, [1, 2, 4]);
        assert_eq!(failed, [3, 5]);
        assert_eq!(marked.targets.len(), 5);
    }

    #[test]
    fn all_photos_failing() {
        let detectors = FakeDetectors::new();
        let mut marker = marker(&detectors);
        marker.mark_photos(photos(&[1, 2, 3, 4, 5])).unwrap();
        let marked = marker.wait().unwrap();
        assert_eq!(marker.state(), MarkState::Failed);
        assert!(!marked.report.is_success());
        assert_eq!(marked.report.failed().count(), 5);
    }

    #[test]
    fn broken_detector_is_reported() {
        let detectors = FakeDetectors::new();
        detectors.set_failing(true);
        let mut marker = marker(&detectors);
        assert!(matches!(
            marker.mark_photos(photos(&[1, 2, 3, 4, 5])),
            Err(Error::DetectorInit(_))
        ));
        assert_eq!(marker.state(), MarkState::Idle);
        assert!(marker.poll().is_none());
    }

    #[test]
    fn idle_marker_has_nothing_to_report() {
        let detectors = FakeDetectors::new();
        let mut marker = marker(&detectors);
        assert!(marker.poll().is_none());
        assert!(marker.wait().is_none());
    }
}
