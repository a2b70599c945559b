//! Target poses and the set of targets a session practices against.
//!
//! Video mode and photo mode share one model: an ordered list of slots, each holding one
//! [`TargetPose`]. Video mode has a single slot that is implicitly selected once its pose is
//! detected; photo mode has up to [`PHOTO_BATCH_SIZE`] slots that the user selects explicitly.

use std::{fmt, sync::Arc, time::Duration};

use crate::error::{Error, Result};
use crate::landmark::LandmarkSet;
use crate::video::Frame;

/// Number of photos that make up a photo-mode batch.
pub const PHOTO_BATCH_SIZE: usize = 5;

/// Where target poses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A single target marked on a frame of a reference video.
    Video,
    /// Up to [`PHOTO_BATCH_SIZE`] targets detected on uploaded photos.
    Photo,
}

impl Mode {
    /// Maximum number of targets this mode holds.
    pub fn capacity(self) -> usize {
        match self {
            Self::Video => 1,
            Self::Photo => PHOTO_BATCH_SIZE,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Video => "in video mode",
            Self::Photo => "in photo mode",
        }
    }
}

/// Identifies a target slot. Slots are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(u8);

impl TargetId {
    /// # Panics
    ///
    /// Panics if `slot` is 0.
    pub fn new(slot: u8) -> Self {
        assert_ne!(slot, 0, "target slots are numbered from 1");
        Self(slot)
    }

    #[inline]
    pub fn slot(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pose{}", self.0)
    }
}

/// A captured posture to practice against.
///
/// Targets are immutable once stored. If detection failed on the captured image, `landmarks` is
/// `None` and the target can neither be selected nor practiced.
#[derive(Debug, Clone)]
pub struct TargetPose {
    id: TargetId,
    label: String,
    landmarks: Option<LandmarkSet>,
    timestamp: Option<Duration>,
    source_image: Option<Arc<Frame>>,
}

impl TargetPose {
    pub fn new(id: TargetId, landmarks: Option<LandmarkSet>) -> Self {
        Self {
            id,
            label: format!("Pose {}", id.slot()),
            landmarks,
            timestamp: None,
            source_image: None,
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self
        }
    }

    /// Attaches the reference video position the pose was captured at.
    pub fn with_timestamp(self, timestamp: Duration) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    /// Attaches the image the pose was detected on.
    pub fn with_source_image(self, image: Arc<Frame>) -> Self {
        Self {
            source_image: Some(image),
            ..self
        }
    }

    #[inline]
    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        self.landmarks.as_ref()
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn source_image(&self) -> Option<&Arc<Frame>> {
        self.source_image.as_ref()
    }

    /// Returns whether a pose was detected for this target.
    #[inline]
    pub fn is_detected(&self) -> bool {
        self.landmarks.is_some()
    }
}

/// The ordered target slots of a session, together with the photo-mode selection.
#[derive(Debug)]
pub struct TargetSet {
    mode: Mode,
    targets: Vec<TargetPose>,
    selected: Vec<bool>,
}

impl TargetSet {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            targets: Vec::new(),
            selected: Vec::new(),
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn targets(&self) -> &[TargetPose] {
        &self.targets
    }

    pub fn get(&self, id: TargetId) -> Option<&TargetPose> {
        self.position(id).map(|i| &self.targets[i])
    }

    fn position(&self, id: TargetId) -> Option<usize> {
        self.targets.iter().position(|t| t.id == id)
    }

    /// Replaces all targets at once and clears the selection.
    ///
    /// # Panics
    ///
    /// Panics if more targets are passed than the mode's capacity.
    pub(crate) fn replace_all(&mut self, targets: Vec<TargetPose>) {
        assert!(
            targets.len() <= self.mode.capacity(),
            "{} targets exceed capacity {}",
            targets.len(),
            self.mode.capacity()
        );
        self.selected = vec![false; targets.len()];
        self.targets = targets;
    }

    /// Returns the targets that have a detected pose and can therefore be selected.
    pub fn candidates(&self) -> impl Iterator<Item = &TargetPose> + '_ {
        self.targets.iter().filter(|t| t.is_detected())
    }

    pub fn is_selected(&self, id: TargetId) -> bool {
        self.position(id).map_or(false, |i| self.selected[i])
    }

    /// Selects or deselects a target (photo mode only).
    ///
    /// Selecting a target without a detected pose fails with [`Error::TargetUnavailable`].
    /// Deselecting always succeeds for existing targets.
    pub(crate) fn set_selected(&mut self, id: TargetId, selected: bool) -> Result<()> {
        self.check_selectable()?;
        let i = self.position(id).ok_or(Error::TargetUnavailable(id))?;
        if selected && !self.targets[i].is_detected() {
            return Err(Error::TargetUnavailable(id));
        }
        self.selected[i] = selected;
        Ok(())
    }

    /// Selects every target with a detected pose (photo mode only).
    pub(crate) fn select_all(&mut self) -> Result<()> {
        self.check_selectable()?;
        for (selected, target) in self.selected.iter_mut().zip(&self.targets) {
            *selected = target.is_detected();
        }
        Ok(())
    }

    pub(crate) fn deselect_all(&mut self) -> Result<()> {
        self.check_selectable()?;
        self.selected.fill(false);
        Ok(())
    }

    fn check_selectable(&self) -> Result<()> {
        match self.mode {
            Mode::Photo => Ok(()),
            Mode::Video => Err(Error::invalid("change the selection", self.mode.name())),
        }
    }

    /// Returns the targets to practice, in order.
    ///
    /// In video mode, this is the single target if its pose was detected. In photo mode, these
    /// are the selected targets in slot order.
    pub fn practice_order(&self) -> impl Iterator<Item = &TargetPose> + '_ {
        let mode = self.mode;
        self.targets
            .iter()
            .zip(&self.selected)
            .filter(move |(target, selected)| match mode {
                Mode::Video => target.is_detected(),
                Mode::Photo => **selected,
            })
            .map(|(target, _)| target)
    }

    pub fn practice_len(&self) -> usize {
        self.practice_order().count()
    }
}
