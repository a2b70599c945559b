//! Pose capture, comparison and practice sessions.
//!
//! A user marks one or more target postures, either on a frame of a reference video or on a batch
//! of photos, and then practices them in front of a camera. Every pose detected on the live feed
//! is compared with the current target and turned into a score from 0 to 100.
//!
//! The pose detector, the camera, the reference video and everything visual are provided by the
//! embedding application through the traits in [`detect`], [`video`] and [`ui`]. The entry point
//! is [`session::Session`].
//!
//! # Coordinates
//!
//! Landmark coordinates are normalized to the image they were detected on: X points to the right,
//! Y points *down*, both in range 0.0 to 1.0. Z is a relative depth value. Scores compare
//! positions in this normalized space, so they do not depend on image resolution.
//!
//! # Environment Variables
//!
//! * `DANCEPOSE_MODEL_COMPLEXITY`: Overrides the pose model complexity in
//!   [`DetectorOptions::with_env_overrides`] and [`SessionOptions::with_env_overrides`]. Allowed
//!   values are `0` or `lite`, `1` or `full`, and `2` or `heavy`.
//!
//! [`DetectorOptions::with_env_overrides`]: detect::DetectorOptions::with_env_overrides
//! [`SessionOptions::with_env_overrides`]: session::SessionOptions::with_env_overrides

use log::LevelFilter;

pub mod detect;
pub mod error;
pub mod landmark;
pub mod mark;
pub mod promise;
pub mod reference;
pub mod score;
pub mod session;
pub mod target;
pub mod timer;
pub mod ui;
pub mod video;

#[cfg(test)]
mod test;

pub use error::{Error, Result};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` is honored on top of that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
