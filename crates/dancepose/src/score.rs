//! Pose similarity scoring.

use std::fmt;

use itertools::Itertools;
use nalgebra::Vector3;

use crate::landmark::Landmark;

/// Computes how closely two landmark sets match, in range 0.0 to 1.0.
///
/// Only index pairs where *both* landmarks are visible are compared. Each compared pair
/// contributes `max(0, 1 - d)`, where `d` is the Euclidean distance between the two points in
/// normalized `(x, y, z)` space, and the result is the mean over all compared pairs.
///
/// Returns 0.0 when either set is empty, when the sets have different lengths, or when no index
/// pair is visible in both sets. The function is symmetric in its arguments.
pub fn similarity(a: &[Landmark], b: &[Landmark]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (total, count) = a
        .iter()
        .zip_eq(b)
        .filter(|(p, q)| p.is_visible() && q.is_visible())
        .map(|(p, q)| {
            let distance = (Vector3::from(p.position()) - Vector3::from(q.position())).norm();
            (1.0 - distance).max(0.0)
        })
        .fold((0.0, 0usize), |(total, count), sim| (total + sim, count + 1));

    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

/// A similarity converted to an integer score in range 0 to 100 for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    /// Tolerance added before rounding, so that similarities like 0.595 that are not exactly
    /// representable as floats still round up at the `.5` boundary.
    const ROUNDING_SLACK: f64 = 1e-6;

    /// Scales `similarity` by 100 and rounds half up.
    ///
    /// Out-of-range and NaN inputs are clamped to 0 and 100.
    pub fn from_similarity(similarity: f32) -> Self {
        let scaled = (f64::from(similarity) * 100.0 + 0.5 + Self::ROUNDING_SLACK).floor();
        if scaled.is_nan() {
            return Self(0);
        }
        Self(scaled.clamp(0.0, 100.0) as u8)
    }

    /// # Panics
    ///
    /// Panics if `value` is greater than 100.
    pub fn new(value: u8) -> Self {
        assert!(value <= 100, "score {value} out of range");
        Self(value)
    }

    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn band(self) -> Band {
        Band::of(self)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Qualitative rating of a [`Score`].
///
/// The thresholds are inclusive lower bounds: 80 is [`Band::Excellent`], 79 is [`Band::Good`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// Score below 40.
    NeedsPractice,
    /// Score 40 to 59.
    KeepTrying,
    /// Score 60 to 79.
    Good,
    /// Score 80 and above.
    Excellent,
}

impl Band {
    pub const EXCELLENT: u8 = 80;
    pub const GOOD: u8 = 60;
    pub const KEEP_TRYING: u8 = 40;

    pub fn of(score: Score) -> Self {
        match score.value() {
            s if s >= Self::EXCELLENT => Self::Excellent,
            s if s >= Self::GOOD => Self::Good,
            s if s >= Self::KEEP_TRYING => Self::KeepTrying,
            _ => Self::NeedsPractice,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::KeepTrying => "keep trying",
            Self::NeedsPractice => "needs practice",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
