//! Core types and utilities for fieldtrack.
//!
//! This crate is intentionally small and purely geometric. It owns the
//! lightweight image buffers every other crate passes around, the per-frame
//! preprocessing step (scale, grayscale, HSV) and the projective math used to
//! rectify pixel observations onto the physical plane. It does *not* depend on
//! any camera, fiducial detector or image codec.

mod homography;
mod image;
mod logger;
mod preprocess;

pub use homography::{
    estimate_homography, estimate_homography_ransac, has_collinear_triple, homography_from_4pt,
    Homography, RansacEstimate, RansacParams,
};
pub use image::{
    GrayImage, GrayImageView, Hsv, HsvImage, HsvImageView, ImageError, RgbImage, RgbImageView,
};
pub use preprocess::{
    preprocess_frame, resize_area, rgb_to_gray, rgb_to_hsv, PreparedFrame, PreprocessParams,
};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, LogFormat};

pub use logger::{init_with_level, level_from_env, LOG_ENV};
