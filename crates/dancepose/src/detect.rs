//! Pose detector adapters.
//!
//! The pose detector is an external component with callback semantics: it is configured once,
//! a result callback is registered, and every submitted frame eventually produces exactly one
//! callback invocation carrying either a [`LandmarkSet`] or `None` (no pose found). There is no
//! "detect and return" call.
//!
//! This module builds the two usage patterns the engine needs on top of that:
//!
//! * [`OneShot`] creates a throwaway detector instance for a single still image and turns its
//!   first callback into a [`PromiseHandle`]. Marking poses from a video frame or photo uses this.
//! * [`StreamingDetector`] keeps one instance alive for a continuous source. At most one frame is
//!   in flight at a time; frames offered while the detector is busy are dropped, not queued.

use std::{
    env, fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::Poll,
    time::Instant,
};

use anyhow::bail;
use crossbeam::channel::{self, Receiver};

use crate::error::{Error, Result};
use crate::landmark::LandmarkSet;
use crate::promise::{promise, PromiseHandle};
use crate::timer::Timer;
use crate::video::Frame;

/// Callback receiving the detector's result for one submitted frame.
pub type ResultCallback = Box<dyn FnMut(Option<LandmarkSet>) + Send>;

/// A stateful pose detector instance.
pub trait Detector: Send {
    /// Applies configuration. Called once, before any frame is submitted.
    fn configure(&mut self, options: &DetectorOptions);

    /// Registers the callback that receives results. Replaces any previously registered callback.
    fn on_result(&mut self, callback: ResultCallback);

    /// Submits a frame for processing.
    ///
    /// The result is delivered through the registered callback, either before this method returns
    /// or later from another thread.
    fn submit(&mut self, frame: Frame);
}

/// Constructs [`Detector`] instances.
///
/// Construction may be expensive (it typically loads the model), so streaming users keep their
/// instance for the lifetime of a session.
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn Detector>>;
}

impl<F> DetectorFactory for F
where
    F: Fn() -> anyhow::Result<Box<dyn Detector>> + Send + Sync,
{
    fn create(&self) -> anyhow::Result<Box<dyn Detector>> {
        self()
    }
}

fn instantiate(
    factory: &dyn DetectorFactory,
    options: &DetectorOptions,
    callback: ResultCallback,
) -> Result<Box<dyn Detector>> {
    let mut detector = factory.create().map_err(Error::DetectorInit)?;
    detector.configure(options);
    detector.on_result(callback);
    Ok(detector)
}

/// Size and accuracy of the pose landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelComplexity {
    Lite = 0,
    Full = 1,
    Heavy = 2,
}

impl FromStr for ModelComplexity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s.trim() {
            "0" | "lite" => Self::Lite,
            "1" | "full" => Self::Full,
            "2" | "heavy" => Self::Heavy,
            other => bail!("invalid model complexity `{other}` (expected 0, 1 or 2)"),
        })
    }
}

impl fmt::Display for ModelComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Pose detector configuration.
///
/// The default is [`DetectorOptions::live`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    model_complexity: ModelComplexity,
    smooth_landmarks: bool,
    enable_segmentation: bool,
    smooth_segmentation: bool,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    #[inline]
    fn default() -> Self {
        Self::live()
    }
}

impl DetectorOptions {
    /// Environment variable that overrides the model complexity in
    /// [`DetectorOptions::with_env_overrides`].
    pub const COMPLEXITY_VAR: &'static str = "DANCEPOSE_MODEL_COMPLEXITY";

    /// Options for live camera tracking and video frames: the full model with smoothing and
    /// confidence thresholds of 0.5.
    pub fn live() -> Self {
        Self {
            model_complexity: ModelComplexity::Full,
            smooth_landmarks: true,
            enable_segmentation: false,
            smooth_segmentation: false,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }

    /// Options for photographs: the heavy model with confidence thresholds lowered to 0.3, since
    /// photos are often taken from less favorable angles.
    pub fn photo() -> Self {
        Self {
            model_complexity: ModelComplexity::Heavy,
            min_detection_confidence: 0.3,
            min_tracking_confidence: 0.3,
            ..Self::live()
        }
    }

    /// Applies overrides from the environment.
    ///
    /// If [`DetectorOptions::COMPLEXITY_VAR`] is set to a valid [`ModelComplexity`], it replaces
    /// the configured one. Invalid values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_complexity_override(env::var(Self::COMPLEXITY_VAR).ok().as_deref())
    }

    fn with_complexity_override(self, value: Option<&str>) -> Self {
        match value.map(str::parse::<ModelComplexity>) {
            Some(Ok(model_complexity)) => Self {
                model_complexity,
                ..self
            },
            Some(Err(e)) => {
                log::warn!("ignoring {}: {e}", Self::COMPLEXITY_VAR);
                self
            }
            None => self,
        }
    }

    #[inline]
    pub fn model_complexity(self, model_complexity: ModelComplexity) -> Self {
        Self {
            model_complexity,
            ..self
        }
    }

    /// Enables or disables temporal smoothing of landmarks across frames.
    #[inline]
    pub fn smooth_landmarks(self, smooth_landmarks: bool) -> Self {
        Self {
            smooth_landmarks,
            ..self
        }
    }

    #[inline]
    pub fn enable_segmentation(self, enable_segmentation: bool) -> Self {
        Self {
            enable_segmentation,
            ..self
        }
    }

    #[inline]
    pub fn smooth_segmentation(self, smooth_segmentation: bool) -> Self {
        Self {
            smooth_segmentation,
            ..self
        }
    }

    /// Sets the minimum confidence for a person detection to be considered successful.
    ///
    /// # Panics
    ///
    /// This method panics if `confidence` is not in range 0.0 to 1.0.
    #[inline]
    pub fn min_detection_confidence(self, confidence: f32) -> Self {
        assert!((0.0..=1.0).contains(&confidence));
        Self {
            min_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum confidence for landmarks to be tracked into the next frame instead of
    /// re-running person detection.
    ///
    /// # Panics
    ///
    /// This method panics if `confidence` is not in range 0.0 to 1.0.
    #[inline]
    pub fn min_tracking_confidence(self, confidence: f32) -> Self {
        assert!((0.0..=1.0).contains(&confidence));
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    pub fn get_model_complexity(&self) -> ModelComplexity {
        self.model_complexity
    }

    pub fn get_smooth_landmarks(&self) -> bool {
        self.smooth_landmarks
    }

    pub fn get_enable_segmentation(&self) -> bool {
        self.enable_segmentation
    }

    pub fn get_smooth_segmentation(&self) -> bool {
        self.smooth_segmentation
    }

    pub fn get_min_detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }

    pub fn get_min_tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }
}

/// A single detection on a still image, backed by its own short-lived detector instance.
///
/// The instance is kept alive until its first result arrives and is dropped right after. Any
/// further callback invocations are ignored.
pub struct OneShot {
    detector: Option<Box<dyn Detector>>,
    handle: PromiseHandle<Option<LandmarkSet>>,
    t_detect: Timer,
    started: Instant,
}

impl OneShot {
    /// Creates a detector instance and submits `frame` to it.
    pub fn spawn(
        factory: &dyn DetectorFactory,
        options: &DetectorOptions,
        frame: Frame,
    ) -> Result<Self> {
        let (promise, handle) = promise();
        let mut promise = Some(promise);
        let mut detector = instantiate(
            factory,
            options,
            Box::new(move |result| match promise.take() {
                Some(promise) => promise.fulfill(result),
                None => log::warn!("one-shot detector produced more than one result, ignoring"),
            }),
        )?;
        let started = Instant::now();
        detector.submit(frame);

        Ok(Self {
            detector: Some(detector),
            handle,
            t_detect: Timer::new("one-shot"),
            started,
        })
    }

    /// Checks for the result without blocking.
    ///
    /// Once this has returned [`Poll::Ready`], the detector instance is gone and the result has
    /// been handed out; later calls return `Poll::Ready(None)`.
    pub fn poll(&mut self) -> Poll<Option<LandmarkSet>> {
        if self.detector.is_none() {
            return Poll::Ready(None);
        }
        match self.handle.try_take() {
            Ok(Some(result)) => Poll::Ready(self.finish(result)),
            Ok(None) => Poll::Pending,
            Err(_) => {
                log::warn!("pose detector was dropped without delivering a result");
                Poll::Ready(self.finish(None))
            }
        }
    }

    /// Blocks until the detector has delivered its result.
    pub fn wait(self) -> Option<LandmarkSet> {
        let Self {
            detector,
            handle,
            t_detect,
            started,
        } = self;
        if detector.is_none() {
            return None;
        }
        let result = handle.block().unwrap_or_else(|_| {
            log::warn!("pose detector was dropped without delivering a result");
            None
        });
        drop(detector);
        log_result(&t_detect, started, result)
    }

    fn finish(&mut self, result: Option<LandmarkSet>) -> Option<LandmarkSet> {
        self.detector = None;
        log_result(&self.t_detect, self.started, result)
    }
}

fn log_result(
    t_detect: &Timer,
    started: Instant,
    result: Option<LandmarkSet>,
) -> Option<LandmarkSet> {
    t_detect.record(started.elapsed());
    log::debug!(
        "{} -> {}",
        t_detect,
        if result.is_some() { "pose" } else { "no pose" }
    );
    result
}

/// Runs pose detection on a single image, blocking until the result is available.
pub fn detect_once(
    factory: &dyn DetectorFactory,
    options: &DetectorOptions,
    frame: Frame,
) -> Result<Option<LandmarkSet>> {
    Ok(OneShot::spawn(factory, options, frame)?.wait())
}

/// A long-lived detector bound to a continuous frame source.
///
/// Results are consumed in submission order with [`StreamingDetector::try_recv`]. Dropping the
/// adapter drops the detector instance and the result channel, so results that arrive afterwards
/// go nowhere.
pub struct StreamingDetector {
    name: &'static str,
    detector: Box<dyn Detector>,
    in_flight: Arc<AtomicBool>,
    results: Receiver<Option<LandmarkSet>>,
    submitted_at: Option<Instant>,
    dropped: u64,
    t_latency: Timer,
}

impl StreamingDetector {
    pub fn new(
        name: &'static str,
        factory: &dyn DetectorFactory,
        options: &DetectorOptions,
    ) -> Result<Self> {
        let (sender, results) = channel::unbounded();
        let in_flight = Arc::new(AtomicBool::new(false));
        let busy = in_flight.clone();
        let detector = instantiate(
            factory,
            options,
            Box::new(move |result| {
                if sender.send(result).is_err() {
                    log::trace!("{name}: result arrived after shutdown, discarding");
                }
                // Cleared only after the result is queued, so a new submission can never
                // overtake it.
                busy.store(false, Ordering::Release);
            }),
        )?;
        log::debug!("{name}: streaming detector ready ({options:?})");

        Ok(Self {
            name,
            detector,
            in_flight,
            results,
            submitted_at: None,
            dropped: 0,
            t_latency: Timer::new(name),
        })
    }

    /// Submits `frame` unless a detection is still in flight.
    ///
    /// Returns whether the frame was submitted. Frames offered while busy are dropped.
    pub fn offer(&mut self, frame: Frame) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.dropped += 1;
            log::trace!("{}: detector busy, dropping frame", self.name);
            return false;
        }
        self.submitted_at = Some(Instant::now());
        self.detector.submit(frame);
        true
    }

    /// Returns the next detection result, if one has arrived.
    pub fn try_recv(&mut self) -> Poll<Option<LandmarkSet>> {
        match self.results.try_recv() {
            Ok(result) => {
                if let Some(submitted_at) = self.submitted_at.take() {
                    self.t_latency.record(submitted_at.elapsed());
                }
                Poll::Ready(result)
            }
            Err(_) => Poll::Pending,
        }
    }

    /// Returns whether a submitted frame has not produced a result yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of frames dropped because the detector was busy.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Submit-to-consume latency timer.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_latency].into_iter()
    }
}

impl Drop for StreamingDetector {
    fn drop(&mut self) {
        log::debug!(
            "{}: shutting down ({} frames dropped while busy)",
            self.name,
            self.dropped
        );
    }
}
