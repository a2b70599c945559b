//! The practice session: marking target poses, then comparing the live camera feed against them.
//!
//! A [`Session`] is owned by the caller and driven from a single thread. User actions are method
//! calls ([`Session::mark_frame`], [`Session::start`], [`Session::advance`], ...), and everything
//! asynchronous (camera frames, detector results, marking progress) is picked up by
//! [`Session::pump`], which never blocks and should be called regularly, eg. once per rendered
//! frame.
//!
//! Camera frames are handed over through a single-slot mailbox, so a slow detector never builds up
//! a backlog. Detection results that arrive after the session was stopped are discarded along with
//! the streaming detector that produced them.

use std::{sync::Arc, task::Poll};

use crate::detect::{DetectorFactory, DetectorOptions, StreamingDetector};
use crate::error::{Error, Result};
use crate::landmark::LandmarkSet;
use crate::mark::{MarkReport, MarkState, Marked, Marker};
use crate::score::{similarity, Score};
use crate::target::{Mode, TargetId, TargetPose, TargetSet};
use crate::timer::FpsCounter;
use crate::ui::{Color, Feedback, SessionEvent, Ui};
use crate::video::{Frame, FrameMailbox, FrameSource, ReferenceVideo};

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    mode: Mode,
    marking: DetectorOptions,
    streaming: DetectorOptions,
    mirrored: bool,
}

impl SessionOptions {
    /// A single target marked on a reference video frame.
    pub fn video() -> Self {
        Self {
            mode: Mode::Video,
            marking: DetectorOptions::live(),
            streaming: DetectorOptions::live(),
            mirrored: false,
        }
    }

    /// Up to five targets detected on photos.
    pub fn photo() -> Self {
        Self {
            mode: Mode::Photo,
            marking: DetectorOptions::photo(),
            streaming: DetectorOptions::photo(),
            mirrored: false,
        }
    }

    /// Applies environment overrides to both detector configurations.
    ///
    /// See [`DetectorOptions::with_env_overrides`].
    pub fn with_env_overrides(self) -> Self {
        Self {
            marking: self.marking.with_env_overrides(),
            streaming: self.streaming.with_env_overrides(),
            ..self
        }
    }

    /// Sets the detector options used for marking target poses.
    pub fn marking_detector(self, marking: DetectorOptions) -> Self {
        Self { marking, ..self }
    }

    /// Sets the detector options used for the live camera.
    pub fn streaming_detector(self, streaming: DetectorOptions) -> Self {
        Self { streaming, ..self }
    }

    /// Shows the user's pose mirrored horizontally. Scoring is not affected.
    pub fn mirrored(self, mirrored: bool) -> Self {
        Self { mirrored, ..self }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn get_marking_detector(&self) -> &DetectorOptions {
        &self.marking
    }

    pub fn get_streaming_detector(&self) -> &DetectorOptions {
        &self.streaming
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }
}

/// Live practice state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeState {
    /// The camera is off.
    Stopped,
    /// The camera is on and the user's pose is scored against the target at `index` in practice
    /// order.
    Active { index: usize },
    /// Every selected target has been practiced and the camera has been released.
    Finished,
}

impl PracticeState {
    fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Active { .. } => "practicing",
            Self::Finished => "finished",
        }
    }
}

/// Outcome of a completed practice run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeSummary {
    /// Number of targets that were practiced.
    pub practiced: usize,
    /// Best score reached on each practiced target, in practice order. `None` if the target was
    /// never scored.
    pub best: Vec<(TargetId, Option<Score>)>,
}

struct Live {
    mailbox: Arc<FrameMailbox>,
    detector: StreamingDetector,
}

/// A practice session.
pub struct Session {
    options: SessionOptions,
    camera: Box<dyn FrameSource>,
    detectors: Arc<dyn DetectorFactory>,
    ui: Box<dyn Ui>,
    targets: TargetSet,
    marker: Marker,
    state: PracticeState,
    live: Option<Live>,
    latest_user_pose: Option<LandmarkSet>,
    latest_score: Option<Score>,
    best: Vec<Option<Score>>,
    fps: FpsCounter,
}

impl Session {
    /// Creates a stopped session with no targets.
    ///
    /// `detectors` creates every detector instance the session needs, both for marking and for the
    /// live camera.
    pub fn new(
        options: SessionOptions,
        camera: Box<dyn FrameSource>,
        detectors: Arc<dyn DetectorFactory>,
    ) -> Self {
        Self {
            options,
            camera,
            marker: Marker::new(detectors.clone(), options.marking),
            detectors,
            ui: Box::new(()),
            targets: TargetSet::new(options.mode),
            state: PracticeState::Stopped,
            live: None,
            latest_user_pose: None,
            latest_score: None,
            best: Vec::new(),
            fps: FpsCounter::new("practice"),
        }
    }

    /// Routes poses, feedback and events to `ui`.
    pub fn with_ui(mut self, ui: impl Ui + 'static) -> Self {
        self.ui = Box::new(ui);
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Toggles the mirrored display of the user's pose. Takes effect with the next detection.
    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.options.mirrored = mirrored;
    }

    #[inline]
    pub fn state(&self) -> PracticeState {
        self.state
    }

    #[inline]
    pub fn mark_state(&self) -> MarkState {
        self.marker.state()
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Returns the target currently practiced against, if practice is active.
    pub fn current_target(&self) -> Option<&TargetPose> {
        match self.state {
            PracticeState::Active { index } => self.targets.practice_order().nth(index),
            _ => None,
        }
    }

    /// Returns the latest displayed score. `None` while stopped or before the first scored frame.
    pub fn latest_score(&self) -> Option<Score> {
        self.latest_score
    }

    /// Returns the latest pose detected on the camera feed, unmirrored.
    pub fn latest_user_pose(&self) -> Option<&LandmarkSet> {
        self.latest_user_pose.as_ref()
    }

    pub fn is_camera_active(&self) -> bool {
        self.live.is_some()
    }

    fn check_mode(&self, operation: &'static str, required: Mode) -> Result<()> {
        let mode = self.targets.mode();
        if mode != required {
            return Err(Error::invalid(operation, mode.name()));
        }
        Ok(())
    }

    fn check_not_active(&self, operation: &'static str) -> Result<()> {
        if let PracticeState::Active { .. } = self.state {
            return Err(Error::invalid(operation, self.state.name()));
        }
        Ok(())
    }

    /// Marks the reference video's current frame as the target pose (video mode).
    ///
    /// Detection runs in the background; the new target replaces the old one once
    /// [`Session::pump`] or [`Session::wait_for_marking`] picks up the result.
    pub fn mark_frame(&mut self, video: &dyn ReferenceVideo) -> Result<()> {
        self.check_mode("mark a video frame", Mode::Video)?;
        self.marker.mark_frame(video)?;
        self.poll_marking();
        Ok(())
    }

    /// Detects target poses on a batch of photos (photo mode).
    ///
    /// Not allowed during practice, since it replaces the targets being practiced.
    pub fn mark_photos(&mut self, photos: Vec<Frame>) -> Result<()> {
        self.check_mode("mark photos", Mode::Photo)?;
        self.check_not_active("mark photos")?;
        self.marker.mark_photos(photos)?;
        self.poll_marking();
        Ok(())
    }

    /// Blocks until the running marking job completes and applies its result.
    ///
    /// Returns `None` if no marking job is running.
    pub fn wait_for_marking(&mut self) -> Option<MarkReport> {
        let marked = self.marker.wait()?;
        Some(self.apply_marked(marked))
    }

    fn poll_marking(&mut self) -> Option<MarkReport> {
        let marked = self.marker.poll()?;
        Some(self.apply_marked(marked))
    }

    fn apply_marked(&mut self, marked: Marked) -> MarkReport {
        let Marked { targets, report } = marked;
        self.targets.replace_all(targets);
        for target in self.targets.candidates() {
            if let Some(landmarks) = target.landmarks() {
                self.ui
                    .show_pose(landmarks, Color::MARKED, Some(target.label()));
            }
        }
        self.ui.session_event(&SessionEvent::Marked(report.clone()));

        // Video mode can re-mark while practicing. Practice continues against the new target, or
        // stops if its pose was not detected.
        if let PracticeState::Active { .. } = self.state {
            if self.targets.practice_len() == 0 {
                log::debug!("re-marked target has no pose, stopping practice");
                self.halt();
                return report;
            }
            self.state = PracticeState::Active { index: 0 };
            self.best = vec![None; self.targets.practice_len()];
            self.latest_score = None;
            self.ui.show_feedback(Feedback::NONE);
            self.show_current_target();
        }
        report
    }

    /// Selects a target for practice (photo mode, not during practice).
    pub fn select(&mut self, id: TargetId) -> Result<()> {
        self.check_not_active("change the selection")?;
        self.targets.set_selected(id, true)
    }

    pub fn deselect(&mut self, id: TargetId) -> Result<()> {
        self.check_not_active("change the selection")?;
        self.targets.set_selected(id, false)
    }

    /// Selects every target with a detected pose (photo mode, not during practice).
    pub fn select_all(&mut self) -> Result<()> {
        self.check_not_active("change the selection")?;
        self.targets.select_all()
    }

    pub fn deselect_all(&mut self) -> Result<()> {
        self.check_not_active("change the selection")?;
        self.targets.deselect_all()
    }

    /// Starts the camera and begins practice at the first target.
    ///
    /// Fails with [`Error::NoPracticeTargets`] if nothing can be practiced, and with
    /// [`Error::DeviceAccess`] if the camera cannot be opened. On failure the session stays
    /// stopped and holds no camera or detector.
    ///
    /// A finished session can be started again without re-marking.
    pub fn start(&mut self) -> Result<()> {
        self.check_not_active("start practice")?;
        if self.targets.mode() == Mode::Photo && self.marker.is_detecting() {
            return Err(Error::invalid("start practice", "detecting"));
        }
        let total = self.targets.practice_len();
        if total == 0 {
            return Err(Error::NoPracticeTargets);
        }

        let mailbox = Arc::new(FrameMailbox::default());
        let sink = mailbox.clone();
        self.camera
            .start(Box::new(move |frame| sink.put(frame)))
            .map_err(Error::DeviceAccess)?;
        let detector =
            match StreamingDetector::new("camera", &*self.detectors, &self.options.streaming) {
                Ok(detector) => detector,
                Err(e) => {
                    self.camera.stop();
                    return Err(e);
                }
            };

        self.live = Some(Live { mailbox, detector });
        self.state = PracticeState::Active { index: 0 };
        self.best = vec![None; total];
        self.latest_user_pose = None;
        self.latest_score = None;
        log::debug!("practice started with {total} target(s)");

        self.ui.session_event(&SessionEvent::Started { total });
        self.show_current_target();
        Ok(())
    }

    /// Stops practice and releases the camera and live detector.
    ///
    /// Does nothing if the session is already stopped. A finished session is reset to stopped.
    pub fn stop(&mut self) {
        match self.state {
            PracticeState::Stopped => {}
            PracticeState::Finished => self.state = PracticeState::Stopped,
            PracticeState::Active { .. } => {
                self.halt();
                log::debug!("practice stopped");
            }
        }
    }

    fn halt(&mut self) {
        self.release();
        self.state = PracticeState::Stopped;
        self.ui.show_feedback(Feedback::NONE);
        self.ui.session_event(&SessionEvent::Stopped);
    }

    fn release(&mut self) {
        self.camera.stop();
        if let Some(live) = self.live.take() {
            log::debug!(
                "camera: {} frame(s) superseded before detection",
                live.mailbox.overwritten()
            );
        }
        self.latest_user_pose = None;
        self.latest_score = None;
    }

    /// Moves to the next target (photo mode). Advancing past the last target finishes practice.
    pub fn advance(&mut self) -> Result<()> {
        let index = self.active_photo_index("advance")?;
        if index + 1 < self.best.len() {
            self.go_to(index + 1);
        } else {
            self.finish();
        }
        Ok(())
    }

    /// Moves to the previous target (photo mode). Does nothing at the first target.
    pub fn retreat(&mut self) -> Result<()> {
        let index = self.active_photo_index("go back")?;
        if index > 0 {
            self.go_to(index - 1);
        }
        Ok(())
    }

    fn active_photo_index(&self, operation: &'static str) -> Result<usize> {
        self.check_mode(operation, Mode::Photo)?;
        match self.state {
            PracticeState::Active { index } => Ok(index),
            state => Err(Error::invalid(operation, state.name())),
        }
    }

    fn go_to(&mut self, index: usize) {
        self.state = PracticeState::Active { index };
        self.latest_score = None;
        self.ui.show_feedback(Feedback::NONE);
        self.ui.session_event(&SessionEvent::Advanced(index));
        self.show_current_target();
    }

    fn finish(&mut self) {
        self.release();
        self.state = PracticeState::Finished;
        let summary = self.summary();
        log::debug!("practice finished: {summary:?}");
        self.ui.show_feedback(Feedback::NONE);
        self.ui.session_event(&SessionEvent::Finished(summary));
    }

    /// Best scores of the current or most recent practice run.
    pub fn summary(&self) -> PracticeSummary {
        PracticeSummary {
            practiced: self.best.len(),
            best: self
                .targets
                .practice_order()
                .map(|t| t.id())
                .zip(self.best.iter().copied())
                .collect(),
        }
    }

    fn show_current_target(&mut self) {
        let PracticeState::Active { index } = self.state else {
            return;
        };
        if let Some(target) = self.targets.practice_order().nth(index) {
            if let Some(landmarks) = target.landmarks() {
                self.ui
                    .show_pose(landmarks, Color::TARGET, Some(target.label()));
            }
        }
    }

    /// Processes everything that happened since the last call: finished marking jobs, new camera
    /// frames, and live detection results. Never blocks.
    pub fn pump(&mut self) {
        self.poll_marking();

        if let Some(live) = &mut self.live {
            if let Some(frame) = live.mailbox.take() {
                live.detector.offer(frame);
            }
        }
        loop {
            let Some(live) = &mut self.live else { break };
            match live.detector.try_recv() {
                Poll::Ready(result) => self.apply_detection(result),
                Poll::Pending => break,
            }
        }
    }

    fn apply_detection(&mut self, result: Option<LandmarkSet>) {
        let PracticeState::Active { index } = self.state else {
            log::trace!("ignoring detection while {}", self.state.name());
            return;
        };
        let Some(pose) = result else {
            return;
        };

        if self.options.mirrored {
            self.ui.show_pose(&pose.flip_horizontal(), Color::USER, None);
        } else {
            self.ui.show_pose(&pose, Color::USER, None);
        }

        let target = self
            .targets
            .practice_order()
            .nth(index)
            .and_then(|t| t.landmarks());
        if let Some(target) = target {
            let score = Score::from_similarity(similarity(&pose, target));
            self.latest_score = Some(score);
            if let Some(best) = self.best.get_mut(index) {
                if best.map_or(true, |best| score > best) {
                    *best = Some(score);
                }
            }
            self.ui.show_feedback(Feedback::new(score));
        }
        self.latest_user_pose = Some(pose);

        if let Some(live) = &self.live {
            self.fps.tick_with(live.detector.timers());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.live.is_some() {
            self.release();
        }
    }
}
