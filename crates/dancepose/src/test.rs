//! Shared test fixtures: sample landmark sets, tagged frames, and scripted stand-ins for the
//! detector, camera, reference video and UI.
//!
//! Frames are 1x1 images whose red channel is a tag. The scripted detector looks up the pose to
//! report by that tag.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    ops::Range,
    rc::Rc,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::bail;

use crate::detect::{Detector, DetectorFactory, DetectorOptions, ResultCallback};
use crate::landmark::{Landmark, LandmarkSet};
use crate::ui::{Color, Feedback, SessionEvent, Ui};
use crate::video::{Frame, FrameCallback, FrameSource, ReferenceVideo};

pub fn pose(positions: &[[f32; 3]], visibility: f32) -> LandmarkSet {
    positions
        .iter()
        .map(|&pos| Landmark::new(pos).with_visibility(visibility))
        .collect()
}

/// A full set with every landmark at the same position.
pub fn uniform_pose(x: f32, y: f32, visibility: f32) -> LandmarkSet {
    pose(&[[x, y, 0.0]; LandmarkSet::NUM_LANDMARKS], visibility)
}

/// A full set at random positions, with visibilities drawn from `visibility`.
pub fn random_pose(visibility: Range<f32>) -> LandmarkSet {
    let span = visibility.end - visibility.start;
    (0..LandmarkSet::NUM_LANDMARKS)
        .map(|_| {
            Landmark::new([fastrand::f32(), fastrand::f32(), fastrand::f32() - 0.5])
                .with_visibility(visibility.start + fastrand::f32() * span)
        })
        .collect()
}

pub fn frame(tag: u8) -> Frame {
    Frame::from_pixel(1, 1, image::Rgba([tag, 0, 0, 255]))
}

pub fn frame_tag(frame: &Frame) -> u8 {
    frame.as_raw()[0]
}

pub fn photos(tags: &[u8]) -> Vec<Frame> {
    tags.iter().map(|&tag| frame(tag)).collect()
}

type CallbackSlot = Arc<Mutex<Option<ResultCallback>>>;

struct Delivery {
    callback: CallbackSlot,
    result: Option<LandmarkSet>,
}

impl Delivery {
    fn deliver(&self) {
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(self.result.clone());
        }
    }
}

#[derive(Default)]
struct DetectorState {
    manual: bool,
    failing: bool,
    poses: HashMap<u8, LandmarkSet>,
    created: usize,
    submitted: usize,
    last_options: Option<DetectorOptions>,
    pending: VecDeque<Delivery>,
}

/// Scripted [`DetectorFactory`].
///
/// Every instance it creates reports the pose registered for the submitted frame's tag, or `None`
/// for unknown tags. By default the result is delivered from within `submit`. In manual mode, it
/// is queued until [`FakeDetectors::resolve_next`] is called, which behaves like a detector
/// delivering from another thread at some later point.
#[derive(Clone, Default)]
pub struct FakeDetectors {
    state: Arc<Mutex<DetectorState>>,
}

impl FakeDetectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manual() -> Self {
        let this = Self::new();
        this.set_manual(true);
        this
    }

    pub fn with_pose(self, tag: u8, pose: LandmarkSet) -> Self {
        self.add_pose(tag, pose);
        self
    }

    pub fn add_pose(&self, tag: u8, pose: LandmarkSet) {
        self.state.lock().unwrap().poses.insert(tag, pose);
    }

    pub fn set_manual(&self, manual: bool) {
        self.state.lock().unwrap().manual = manual;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn submitted(&self) -> usize {
        self.state.lock().unwrap().submitted
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn last_options(&self) -> Option<DetectorOptions> {
        self.state.lock().unwrap().last_options
    }

    /// Delivers the oldest queued result. Returns `false` if nothing was queued.
    pub fn resolve_next(&self) -> bool {
        let delivery = self.state.lock().unwrap().pending.pop_front();
        match delivery {
            Some(delivery) => {
                delivery.deliver();
                true
            }
            None => false,
        }
    }

    /// Delivers the oldest queued result twice, like a misbehaving detector would.
    pub fn redeliver_next(&self) {
        let delivery = self.state.lock().unwrap().pending.pop_front();
        if let Some(delivery) = delivery {
            delivery.deliver();
            delivery.deliver();
        }
    }
}

impl DetectorFactory for FakeDetectors {
    fn create(&self) -> anyhow::Result<Box<dyn Detector>> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            bail!("model failed to load");
        }
        state.created += 1;
        Ok(Box::new(FakeDetector {
            state: self.state.clone(),
            callback: Arc::default(),
        }))
    }
}

struct FakeDetector {
    state: Arc<Mutex<DetectorState>>,
    callback: CallbackSlot,
}

impl Detector for FakeDetector {
    fn configure(&mut self, options: &DetectorOptions) {
        self.state.lock().unwrap().last_options = Some(*options);
    }

    fn on_result(&mut self, callback: ResultCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn submit(&mut self, frame: Frame) {
        let delivery = {
            let mut state = self.state.lock().unwrap();
            state.submitted += 1;
            let delivery = Delivery {
                callback: self.callback.clone(),
                result: state.poses.get(&frame_tag(&frame)).cloned(),
            };
            if state.manual {
                state.pending.push_back(delivery);
                return;
            }
            delivery
        };
        delivery.deliver();
    }
}

#[derive(Default)]
struct CameraState {
    denied: bool,
    on_frame: Option<FrameCallback>,
    starts: usize,
    stops: usize,
}

/// Scripted camera. Frames are pushed by the test.
#[derive(Clone, Default)]
pub struct FakeCamera {
    state: Arc<Mutex<CameraState>>,
}

impl FakeCamera {
    /// Makes subsequent starts fail like a denied permission prompt.
    pub fn deny(&self, denied: bool) {
        self.state.lock().unwrap().denied = denied;
    }

    /// Delivers a frame if the camera is running.
    pub fn push(&self, frame: Frame) {
        if let Some(on_frame) = self.state.lock().unwrap().on_frame.as_mut() {
            on_frame(frame);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().on_frame.is_some()
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

impl FrameSource for FakeCamera {
    fn start(&mut self, on_frame: FrameCallback) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.denied {
            bail!("permission denied");
        }
        state.starts += 1;
        state.on_frame = Some(on_frame);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.on_frame.take().is_some() {
            state.stops += 1;
        }
    }
}

#[derive(Default)]
pub struct FakeVideo {
    pub playing: bool,
    pub position: Duration,
    pub frame: Option<Frame>,
}

impl FakeVideo {
    pub fn paused_at(position: Duration, frame: Frame) -> Self {
        Self {
            playing: false,
            position,
            frame: Some(frame),
        }
    }
}

impl ReferenceVideo for FakeVideo {
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn current_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }
}

#[derive(Default)]
struct Recorded {
    poses: Vec<(LandmarkSet, Color, Option<String>)>,
    feedback: Vec<Feedback>,
    events: Vec<SessionEvent>,
}

/// A [`Ui`] that records everything it is shown.
#[derive(Clone, Default)]
pub struct RecordingUi {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingUi {
    pub fn poses(&self) -> Vec<(Color, Option<String>)> {
        self.inner
            .borrow()
            .poses
            .iter()
            .map(|(_, color, title)| (*color, title.clone()))
            .collect()
    }

    pub fn last_pose(&self, color: Color) -> Option<LandmarkSet> {
        self.inner
            .borrow()
            .poses
            .iter()
            .rev()
            .find(|(_, c, _)| *c == color)
            .map(|(pose, _, _)| pose.clone())
    }

    pub fn feedback(&self) -> Vec<Feedback> {
        self.inner.borrow().feedback.clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.inner.borrow().events.clone()
    }
}

impl Ui for RecordingUi {
    fn show_pose(&mut self, pose: &LandmarkSet, color: Color, title: Option<&str>) {
        self.inner
            .borrow_mut()
            .poses
            .push((pose.clone(), color, title.map(String::from)));
    }

    fn show_feedback(&mut self, feedback: Feedback) {
        self.inner.borrow_mut().feedback.push(feedback);
    }

    fn session_event(&mut self, event: &SessionEvent) {
        self.inner.borrow_mut().events.push(event.clone());
    }
}
