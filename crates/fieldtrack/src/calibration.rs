//! Session calibration: corner tags to a cached pixel-to-plane homography.

use fieldtrack_core::{
    estimate_homography_ransac, has_collinear_triple, Homography, RansacParams,
};
use fieldtrack_tags::CalibrationCorners;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Physical extent of the tracked plane, in user units (cm in the default
/// setup). Corner targets are `(0,0)`, `(W,0)`, `(W,H)`, `(0,H)` for
/// bottom-left, bottom-right, top-right and top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneRect {
    pub width: f64,
    pub height: f64,
}

impl Default for PlaneRect {
    fn default() -> Self {
        Self {
            width: 140.0,
            height: 140.0,
        }
    }
}

impl PlaneRect {
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Targets in calibration-role order.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let (w, h) = (self.width as f32, self.height as f32);
        [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ]
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("insufficient calibration: {found} of 4 corner tags seen")]
    InsufficientCalibration { found: usize },
    #[error("homography estimate is degenerate")]
    HomographyDegenerate,
}

/// Accumulates corner tags over the session and computes the homography
/// once, on the first complete set.
///
/// The camera is assumed fixed: after a successful estimate further corner
/// observations are ignored until [`HomographyResolver::request_recalibration`].
#[derive(Clone, Debug)]
pub struct HomographyResolver {
    plane: PlaneRect,
    ransac: RansacParams,
    corners: CalibrationCorners,
    cached: Option<Homography>,
    recalibrating: bool,
}

impl HomographyResolver {
    pub fn new(plane: PlaneRect, ransac: RansacParams) -> Self {
        Self {
            plane,
            ransac,
            corners: CalibrationCorners::default(),
            cached: None,
            recalibrating: false,
        }
    }

    pub fn plane(&self) -> &PlaneRect {
        &self.plane
    }

    /// Last good homography, if any.
    pub fn cached(&self) -> Option<Homography> {
        self.cached
    }

    pub fn is_calibrated(&self) -> bool {
        self.cached.is_some()
    }

    /// Distinct corner roles collected since the last (re)calibration start.
    pub fn corners_seen(&self) -> usize {
        self.corners.count()
    }

    /// Collect corners afresh and replace the homography on the next complete
    /// set. The current homography stays in use meanwhile.
    pub fn request_recalibration(&mut self) {
        log::info!("recalibration requested");
        self.corners.clear();
        self.recalibrating = true;
    }

    /// Feed this frame's corner tags.
    ///
    /// Returns the homography to use for this frame. A degenerate estimate is
    /// reported as an error even when an older homography is still cached;
    /// callers fall back to [`HomographyResolver::cached`] in that case. The
    /// corner set is cleared after a degenerate estimate so that fresh
    /// observations can replace the bad ones.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn observe(&mut self, frame: &CalibrationCorners) -> Result<Homography, CalibrationError> {
        if let (Some(h), false) = (self.cached, self.recalibrating) {
            return Ok(h);
        }

        let before = self.corners.count();
        self.corners.merge_from(frame);
        let found = self.corners.count();
        if found > before {
            log::info!("calibration corners: {found}/4");
        }

        let Some(pixels) = self.corners.complete() else {
            return self
                .cached
                .ok_or(CalibrationError::InsufficientCalibration { found });
        };

        match self.estimate(&pixels) {
            Some(h) => {
                log::info!("homography resolved: {:?}", h.to_array());
                self.cached = Some(h);
                self.recalibrating = false;
                Ok(h)
            }
            None => {
                log::warn!("degenerate calibration corners {pixels:?}; collecting again");
                self.corners.clear();
                Err(CalibrationError::HomographyDegenerate)
            }
        }
    }

    fn estimate(&self, pixels: &[Point2<f32>; 4]) -> Option<Homography> {
        if has_collinear_triple(pixels, self.ransac.collinear_tol) {
            return None;
        }
        let est = estimate_homography_ransac(pixels, &self.plane.corners(), &self.ransac)?;
        est.homography
            .is_well_conditioned()
            .then_some(est.homography)
    }
}
