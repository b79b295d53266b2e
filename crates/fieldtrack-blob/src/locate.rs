use fieldtrack_core::HsvImageView;
use log::debug;

use crate::contour::{extract_blobs, min_enclosing_circle, RawBlob};
use crate::mask::{build_mask, count_set, dilate, erode};
use crate::types::{BlobCandidate, BlobParams, ColorName};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds the best colored blob in an HSV frame.
#[derive(Clone, Debug, Default)]
pub struct BlobLocator {
    params: BlobParams,
}

impl BlobLocator {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BlobParams {
        &self.params
    }

    /// Every blob that passes the area, radius and circularity gates, in
    /// extraction order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, hsv), fields(width = hsv.width, height = hsv.height))
    )]
    pub fn candidates(&self, hsv: &HsvImageView<'_>) -> Vec<BlobCandidate> {
        if hsv.is_empty() {
            return Vec::new();
        }
        let p = &self.params;

        let raw = build_mask(hsv, &p.include, p.exclude.as_ref());
        let opened = dilate(
            &erode(&raw, p.kernel_size, p.morph_iterations),
            p.kernel_size,
            p.morph_iterations,
        );

        let blobs = extract_blobs(&opened);
        let total = blobs.len();
        let out: Vec<BlobCandidate> = blobs
            .iter()
            .filter_map(|b| self.score(b, hsv))
            .collect();
        debug!(
            "blob mask: {} px on, {} blobs, {} passed",
            count_set(&opened),
            total,
            out.len()
        );
        out
    }

    /// Largest surviving blob; the first one wins among equal areas.
    pub fn locate(&self, hsv: &HsvImageView<'_>) -> Option<BlobCandidate> {
        let mut best: Option<BlobCandidate> = None;
        for cand in self.candidates(hsv) {
            if best.is_none_or(|b| cand.area > b.area) {
                best = Some(cand);
            }
        }
        best
    }

    fn score(&self, blob: &RawBlob, hsv: &HsvImageView<'_>) -> Option<BlobCandidate> {
        let p = &self.params;
        let area = blob.contour_area();
        if area < p.min_area {
            return None;
        }
        let perimeter = blob.perimeter();
        if perimeter <= 0.0 {
            return None;
        }
        let circularity = 4.0 * std::f32::consts::PI * area / (perimeter * perimeter);
        let (circle_center, radius) = min_enclosing_circle(&blob.contour);
        if radius < p.min_radius || radius > p.max_radius {
            return None;
        }
        if circularity < p.min_circularity {
            return None;
        }

        let cx = (blob.centroid.x.round() as usize).min(hsv.width - 1);
        let cy = (blob.centroid.y.round() as usize).min(hsv.height - 1);
        Some(BlobCandidate {
            centroid: blob.centroid,
            area,
            perimeter,
            circle_center,
            radius,
            circularity,
            color: ColorName::from_hue(hsv.pixel(cx, cy).h),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HsvRange;
    use approx::assert_abs_diff_eq;
    use fieldtrack_core::HsvImage;

    const ORANGE: [u8; 3] = [15, 220, 230];
    const BLUE: [u8; 3] = [110, 220, 230];
    const FELT: [u8; 3] = [60, 40, 90];

    fn canvas(w: usize, h: usize) -> HsvImage {
        HsvImage {
            width: w,
            height: h,
            data: FELT.repeat(w * h),
        }
    }

    fn paint(img: &mut HsvImage, x: usize, y: usize, hsv: [u8; 3]) {
        let i = (y * img.width + x) * 3;
        img.data[i..i + 3].copy_from_slice(&hsv);
    }

    fn disc(img: &mut HsvImage, cx: f32, cy: f32, r: f32, hsv: [u8; 3]) {
        for y in 0..img.height {
            for x in 0..img.width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy <= r * r {
                    paint(img, x, y, hsv);
                }
            }
        }
    }

    fn rect(img: &mut HsvImage, x0: usize, y0: usize, w: usize, h: usize, hsv: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                paint(img, x, y, hsv);
            }
        }
    }

    #[test]
    fn finds_orange_disc_centroid() {
        let mut img = canvas(120, 100);
        disc(&mut img, 60.0, 40.0, 15.0, ORANGE);

        let best = BlobLocator::default().locate(&img.view()).expect("blob");
        assert_abs_diff_eq!(best.centroid.x, 60.0, epsilon = 0.5);
        assert_abs_diff_eq!(best.centroid.y, 40.0, epsilon = 0.5);
        assert_abs_diff_eq!(best.radius, 15.0, epsilon = 1.5);
        assert!(best.circularity > 0.75, "circularity {}", best.circularity);
        assert_eq!(best.color, ColorName::Orange);
    }

    #[test]
    fn thin_bar_fails_circularity() {
        let mut img = canvas(120, 100);
        rect(&mut img, 30, 40, 60, 6, ORANGE);
        assert!(BlobLocator::default().locate(&img.view()).is_none());
    }

    #[test]
    fn largest_of_several_discs_wins() {
        let mut img = canvas(200, 100);
        disc(&mut img, 40.0, 50.0, 10.0, ORANGE);
        disc(&mut img, 140.0, 50.0, 20.0, ORANGE);

        let loc = BlobLocator::default();
        assert_eq!(loc.candidates(&img.view()).len(), 2);
        let best = loc.locate(&img.view()).expect("blob");
        assert_abs_diff_eq!(best.centroid.x, 140.0, epsilon = 0.5);
    }

    #[test]
    fn radius_bounds_reject_small_and_large() {
        let mut img = canvas(300, 200);
        disc(&mut img, 60.0, 60.0, 3.0, ORANGE);
        disc(&mut img, 180.0, 100.0, 70.0, ORANGE);
        let loc = BlobLocator::new(BlobParams {
            kernel_size: 1,
            min_area: 0.0,
            ..BlobParams::default()
        });
        assert!(loc.locate(&img.view()).is_none());
    }

    #[test]
    fn exclusion_range_hides_matching_pixels() {
        let mut img = canvas(120, 100);
        disc(&mut img, 60.0, 50.0, 15.0, BLUE);
        let params = BlobParams {
            include: HsvRange::new([0, 100, 100], [179, 255, 255]),
            exclude: Some(HsvRange::BLUE),
            ..BlobParams::default()
        };
        assert!(BlobLocator::new(params).locate(&img.view()).is_none());

        let params = BlobParams {
            exclude: None,
            ..params
        };
        assert!(BlobLocator::new(params).locate(&img.view()).is_some());
    }

    #[test]
    fn disc_inside_rejected_ring_is_not_a_candidate() {
        let mut img = canvas(200, 200);
        disc(&mut img, 100.0, 100.0, 60.0, ORANGE);
        disc(&mut img, 100.0, 100.0, 40.0, FELT);
        disc(&mut img, 100.0, 100.0, 10.0, ORANGE);

        let loc = BlobLocator::default();
        assert!(loc.candidates(&img.view()).is_empty());
        assert!(loc.locate(&img.view()).is_none());
    }

    #[test]
    fn empty_frame_yields_nothing() {
        let img = canvas(0, 0);
        assert!(BlobLocator::default().locate(&img.view()).is_none());
    }
}
