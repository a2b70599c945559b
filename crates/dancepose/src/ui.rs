//! Interface to the rendering and feedback layer.
//!
//! The engine never draws anything itself. It reports poses to visualize, score feedback, and
//! session state changes through the [`Ui`] trait, and the embedding application decides how to
//! present them.

use std::fmt;

use crate::landmark::LandmarkSet;
use crate::mark::MarkReport;
use crate::score::{Band, Score};
use crate::session::PracticeSummary;

/// An 8-bit RGBA color in sRGB space.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Color([u8; 4]);

impl Color {
    /// Live camera pose.
    pub const USER: Self = Self::from_rgb8(0x00, 0xff, 0x00);
    /// Target pose shown during practice.
    pub const TARGET: Self = Self::from_rgb8(0x00, 0x66, 0xff);
    /// Freshly marked target pose.
    pub const MARKED: Self = Self::from_rgb8(0x48, 0xbb, 0x78);
    /// Pose sampled from the playing reference video.
    pub const REFERENCE: Self = Self::from_rgb8(0x00, 0x66, 0xff);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    /// Returns the color's components for rendering.
    #[inline]
    pub fn rgba(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.rgba();
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

/// Score feedback for the current target. Both fields are `None` when there is no score to
/// show, eg. after the camera was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub score: Option<Score>,
    pub band: Option<Band>,
}

impl Feedback {
    pub const NONE: Self = Self {
        score: None,
        band: None,
    };

    pub fn new(score: Score) -> Self {
        Self {
            score: Some(score),
            band: Some(score.band()),
        }
    }
}

/// Session state change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Pose marking finished. The report lists which slots have a detected pose.
    Marked(MarkReport),
    /// Live practice started against `total` targets, beginning with the first one.
    Started { total: usize },
    /// Live practice was stopped by the user.
    Stopped,
    /// The current practice target changed to the given index.
    Advanced(usize),
    /// The last target was completed and the camera has been released.
    Finished(PracticeSummary),
}

/// Receiver of everything the engine wants to show to the user.
///
/// All methods default to doing nothing, so implementors only need to override what they render.
pub trait Ui {
    /// Called whenever a new pose should be visualized.
    fn show_pose(&mut self, _pose: &LandmarkSet, _color: Color, _title: Option<&str>) {}

    /// Called whenever the displayed score changes.
    fn show_feedback(&mut self, _feedback: Feedback) {}

    fn session_event(&mut self, _event: &SessionEvent) {}
}

/// A [`Ui`] that ignores everything.
impl Ui for () {}
