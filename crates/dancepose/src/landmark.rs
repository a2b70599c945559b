//! Body landmark data model.
//!
//! A [`LandmarkSet`] is what the pose detector yields for one image: [`LandmarkSet::NUM_LANDMARKS`]
//! keypoints in the detector-defined order described by [`LandmarkIdx`]. Coordinates are
//! normalized to the input image: X and Y are in range 0.0 to 1.0 with Y pointing *down*, Z is a
//! relative depth value on roughly the same scale as X.

use std::ops::Deref;

use itertools::Itertools;

/// Landmarks with a visibility at or below this value are treated as absent.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

type Position = [f32; 3];

/// A body keypoint in normalized image coordinates.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: f32,
}

impl Landmark {
    /// Creates a fully visible landmark at `position`.
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: 1.0,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self { visibility, ..self }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Returns the detector's confidence that this landmark is visible in the image.
    #[inline]
    pub fn visibility(&self) -> f32 {
        self.visibility
    }

    /// Returns whether this landmark takes part in comparison and drawing.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visibility > VISIBILITY_THRESHOLD
    }
}

/// An ordered collection of body landmarks describing one detected posture.
///
/// Index positions are semantically fixed (see [`LandmarkIdx`]). Sets produced by the pose
/// detector always contain [`LandmarkSet::NUM_LANDMARKS`] entries, but nothing prevents
/// constructing sets of other lengths; comparing sets of unequal length yields a score of 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    landmarks: Box<[Landmark]>,
}

impl LandmarkSet {
    /// Number of landmarks in a set produced by the body pose detector.
    pub const NUM_LANDMARKS: usize = 33;

    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            landmarks: landmarks.into_boxed_slice(),
        }
    }

    pub fn get(&self, idx: LandmarkIdx) -> Option<Landmark> {
        self.landmarks.get(idx as usize).copied()
    }

    /// Returns an iterator over the landmarks that are considered visible.
    pub fn visible(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.landmarks.iter().copied().filter(Landmark::is_visible)
    }

    /// Returns the skeleton segments whose endpoints are both visible.
    ///
    /// Segments referring to indices past the end of the set are skipped.
    pub fn visible_segments(&self) -> impl Iterator<Item = (Landmark, Landmark)> + '_ {
        CONNECTIONS.iter().filter_map(|&(a, b)| {
            let a = self.get(a)?;
            let b = self.get(b)?;
            (a.is_visible() && b.is_visible()).then_some((a, b))
        })
    }

    /// Computes the 2D bounding box of all visible landmarks.
    ///
    /// Returns `None` if no landmark is visible. Renderers use this to scale a pose to fill a
    /// preview area.
    pub fn visible_bounds(&self) -> Option<Bounds> {
        let (min_x, max_x) = self.visible().map(|lm| lm.x()).minmax().into_option()?;
        let (min_y, max_y) = self.visible().map(|lm| lm.y()).minmax().into_option()?;
        Some(Bounds {
            min: [min_x, min_y],
            max: [max_x, max_y],
        })
    }

    /// Mirrors all landmarks along the vertical center line of the image.
    ///
    /// Only the X coordinate is changed. Left/right indices are kept as-is, so the result matches
    /// what a mirrored camera preview shows.
    pub fn flip_horizontal_in_place(&mut self) {
        for lm in self.landmarks.iter_mut() {
            lm.pos[0] = 1.0 - lm.pos[0];
        }
    }

    pub fn flip_horizontal(&self) -> Self {
        let mut flipped = self.clone();
        flipped.flip_horizontal_in_place();
        flipped
    }
}

impl Deref for LandmarkSet {
    type Target = [Landmark];

    fn deref(&self) -> &[Landmark] {
        &self.landmarks
    }
}

impl FromIterator<Landmark> for LandmarkSet {
    fn from_iter<T: IntoIterator<Item = Landmark>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Axis-aligned 2D bounding box in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f32 {
        self.max[1] - self.min[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// The skeleton drawn for a body pose: arms, torso and legs (indices 11 to 32).
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (LeftAnkle, LeftHeel),
        (LeftHeel, LeftFootIndex),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (RightAnkle, RightHeel),
        (RightHeel, RightFootIndex),
    ]
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{pose, uniform_pose};

    #[test]
    fn visibility_threshold_is_exclusive() {
        assert!(!Landmark::new([0.0; 3]).with_visibility(0.5).is_visible());
        assert!(Landmark::new([0.0; 3]).with_visibility(0.51).is_visible());
    }

    #[test]
    fn segments_skip_hidden_endpoints() {
        let mut landmarks = uniform_pose(0.5, 0.5, 0.9).to_vec();
        let all = LandmarkSet::new(landmarks.clone()).visible_segments().count();
        assert_eq!(all, CONNECTIONS.len());

        landmarks[LandmarkIdx::LeftElbow as usize] =
            landmarks[LandmarkIdx::LeftElbow as usize].with_visibility(0.2);
        let set = LandmarkSet::new(landmarks);
        // shoulder-elbow and elbow-wrist disappear
        assert_eq!(set.visible_segments().count(), CONNECTIONS.len() - 2);
    }

    #[test]
    fn segments_on_short_set() {
        let set = LandmarkSet::new(vec![Landmark::new([0.5, 0.5, 0.0]); 12]);
        assert_eq!(set.visible_segments().count(), 0);
    }

    #[test]
    fn bounds_ignore_hidden_landmarks() {
        let set = LandmarkSet::new(vec![
            Landmark::new([0.2, 0.3, 0.0]),
            Landmark::new([0.6, 0.9, 0.0]),
            Landmark::new([0.0, 0.0, 0.0]).with_visibility(0.1),
        ]);
        let bounds = set.visible_bounds().unwrap();
        assert_eq!(bounds.min, [0.2, 0.3]);
        assert_eq!(bounds.max, [0.6, 0.9]);
        approx::assert_relative_eq!(bounds.width(), 0.4, epsilon = 1e-6);

        let hidden = LandmarkSet::new(vec![Landmark::new([0.0; 3]).with_visibility(0.0)]);
        assert_eq!(hidden.visible_bounds(), None);
    }

    #[test]
    fn flip_mirrors_x_only() {
        let set = pose(&[[0.25, 0.5, -0.1]], 0.9);
        let flipped = set.flip_horizontal();
        assert_eq!(flipped[0].position(), [0.75, 0.5, -0.1]);
        assert_eq!(flipped[0].visibility(), 0.9);
        assert_eq!(flipped.flip_horizontal(), set);
    }
}
