use fieldtrack_core::HsvImageView;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::types::HsvRange;

/// Binary mask: `255` for selected pixels, `0` elsewhere.
pub type BinaryMask = GrayImage;

const ON: Luma<u8> = Luma([255]);

/// Pixels inside `include` and, when given, outside `exclude`.
pub fn build_mask(
    hsv: &HsvImageView<'_>,
    include: &HsvRange,
    exclude: Option<&HsvRange>,
) -> BinaryMask {
    let mut mask = GrayImage::new(hsv.width as u32, hsv.height as u32);
    for y in 0..hsv.height {
        for x in 0..hsv.width {
            let p = hsv.pixel(x, y);
            if include.contains(p) && !exclude.is_some_and(|ex| ex.contains(p)) {
                mask.put_pixel(x as u32, y as u32, ON);
            }
        }
    }
    mask
}

/// Number of selected pixels.
pub fn count_set(mask: &BinaryMask) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Chebyshev radius of a `kernel_size` square element.
fn kernel_radius(kernel_size: usize) -> u8 {
    (kernel_size / 2).min(u8::MAX as usize) as u8
}

/// Binary erosion with a `kernel_size` square, repeated `iterations` times.
pub fn erode(mask: &BinaryMask, kernel_size: usize, iterations: usize) -> BinaryMask {
    let k = kernel_radius(kernel_size);
    let mut cur = mask.clone();
    if k == 0 {
        return cur;
    }
    for _ in 0..iterations {
        cur = imageproc::morphology::erode(&cur, Norm::LInf, k);
    }
    cur
}

/// Binary dilation with a `kernel_size` square, repeated `iterations` times.
pub fn dilate(mask: &BinaryMask, kernel_size: usize, iterations: usize) -> BinaryMask {
    let k = kernel_radius(kernel_size);
    let mut cur = mask.clone();
    if k == 0 {
        return cur;
    }
    for _ in 0..iterations {
        cur = imageproc::morphology::dilate(&cur, Norm::LInf, k);
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_square(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> BinaryMask {
        let mut m = GrayImage::new(w, h);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                m.put_pixel(x, y, ON);
            }
        }
        m
    }

    fn is_set(m: &BinaryMask, x: u32, y: u32) -> bool {
        m.get_pixel(x, y)[0] != 0
    }

    #[test]
    fn opening_removes_speckle_and_keeps_large_regions() {
        let mut m = mask_with_square(40, 40, 10, 10, 12);
        m.put_pixel(2, 30, ON);
        m.put_pixel(3, 30, ON);

        let opened = dilate(&erode(&m, 5, 1), 5, 1);
        assert!(!is_set(&opened, 2, 30));
        assert!(!is_set(&opened, 3, 30));
        assert_eq!(count_set(&opened), 144);
    }

    #[test]
    fn erosion_shrinks_by_kernel_radius() {
        let m = mask_with_square(30, 30, 5, 5, 10);
        let e = erode(&m, 3, 2);
        assert_eq!(count_set(&e), 36);
        assert!(is_set(&e, 7, 7));
        assert!(!is_set(&e, 6, 6));
    }

    #[test]
    fn unit_kernel_is_identity() {
        let m = mask_with_square(8, 8, 2, 2, 3);
        assert_eq!(erode(&m, 1, 4), m);
        assert_eq!(dilate(&m, 1, 4), m);
    }

    #[test]
    fn exclusion_range_is_subtracted() {
        let data = [
            15u8, 200, 200, // orange
            110, 200, 200, // blue
        ];
        let hsv = HsvImageView {
            width: 2,
            height: 1,
            data: &data,
        };
        let any_saturated = HsvRange::new([0, 80, 60], [179, 255, 255]);
        let m = build_mask(&hsv, &any_saturated, Some(&HsvRange::BLUE));
        assert!(is_set(&m, 0, 0));
        assert!(!is_set(&m, 1, 0));
    }
}
