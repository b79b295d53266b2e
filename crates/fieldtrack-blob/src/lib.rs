//! Colored-object localization.
//!
//! Pipeline per frame:
//! - threshold the HSV frame with an inclusion (and optional exclusion) range,
//! - erode then dilate the mask to drop speckle,
//! - trace the outer boundary of each 8-connected region; regions sitting
//!   inside another region's hole are skipped,
//! - score each blob (area, perimeter, enclosing circle, circularity),
//! - keep the largest blob that passes the radius / circularity gates.
//!
//! Among equally large survivors the first one in raster extraction order
//! wins. That order depends on where each region's first border pixel lands,
//! so the pick between ties is not stable under small image shifts.

mod contour;
mod locate;
mod mask;
mod types;

pub use contour::{extract_blobs, min_enclosing_circle, RawBlob};
pub use locate::BlobLocator;
pub use mask::{build_mask, count_set, dilate, erode, BinaryMask};
pub use types::{BlobCandidate, BlobParams, ColorName, HsvRange};
