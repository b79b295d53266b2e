//! Outer boundaries of mask regions and their shape measures.

use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::arc_length;
use imageproc::point::Point;
use nalgebra::Point2;

use crate::mask::BinaryMask;

/// One outermost foreground region, described by its boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBlob {
    /// Closed outer boundary through pixel centers.
    pub contour: Vec<Point<i32>>,
    /// Centroid from the boundary polygon's moments; the mean boundary point
    /// when the polygon has no area.
    pub centroid: Point2<f32>,
}

impl RawBlob {
    fn from_contour(contour: Vec<Point<i32>>) -> Self {
        let centroid = polygon_centroid(&contour).unwrap_or_else(|| mean_point(&contour));
        Self { contour, centroid }
    }

    /// Shoelace area of the boundary polygon.
    pub fn contour_area(&self) -> f32 {
        (signed_area2(&self.contour).abs() as f32) * 0.5
    }

    /// Length of the closed boundary polyline.
    pub fn perimeter(&self) -> f32 {
        if self.contour.len() < 2 {
            return 0.0;
        }
        arc_length(&self.contour, true) as f32
    }
}

/// Twice the signed polygon area.
fn signed_area2(pts: &[Point<i32>]) -> i64 {
    let n = pts.len();
    if n < 3 {
        return 0;
    }
    (0..n)
        .map(|i| {
            let (a, b) = (pts[i], pts[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum()
}

/// First-order polygon moments over zeroth order.
fn polygon_centroid(pts: &[Point<i32>]) -> Option<Point2<f32>> {
    let a2 = signed_area2(pts);
    if a2 == 0 {
        return None;
    }
    let n = pts.len();
    let (mut cx, mut cy) = (0i64, 0i64);
    for i in 0..n {
        let (a, b) = (pts[i], pts[(i + 1) % n]);
        let cross = a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        cx += (a.x + b.x) as i64 * cross;
        cy += (a.y + b.y) as i64 * cross;
    }
    let d = 3.0 * a2 as f64;
    Some(Point2::new((cx as f64 / d) as f32, (cy as f64 / d) as f32))
}

fn mean_point(pts: &[Point<i32>]) -> Point2<f32> {
    if pts.is_empty() {
        return Point2::origin();
    }
    let n = pts.len() as f64;
    let (sx, sy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    Point2::new((sx / n) as f32, (sy / n) as f32)
}

/// Outermost 8-connected regions, in the order their borders are met by a
/// raster scan.
///
/// Regions lying inside another region's hole are not reported.
pub fn extract_blobs(mask: &BinaryMask) -> Vec<RawBlob> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| RawBlob::from_contour(c.points))
        .collect()
}

fn circle_from_2(a: Point2<f64>, b: Point2<f64>) -> (Point2<f64>, f64) {
    let c = Point2::new(0.5 * (a.x + b.x), 0.5 * (a.y + b.y));
    (c, 0.5 * (a - b).norm())
}

fn circle_from_3(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> Option<(Point2<f64>, f64)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-12 {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Point2::new(ux, uy);
    Some((center, (a - center).norm()))
}

#[inline]
fn inside(c: &(Point2<f64>, f64), p: Point2<f64>) -> bool {
    (p - c.0).norm() <= c.1 + 1e-7
}

/// Smallest circle enclosing `pts` (incremental Welzl).
pub fn min_enclosing_circle(pts: &[Point<i32>]) -> (Point2<f32>, f32) {
    let p: Vec<Point2<f64>> = pts
        .iter()
        .map(|q| Point2::new(q.x as f64, q.y as f64))
        .collect();
    let Some(&first) = p.first() else {
        return (Point2::origin(), 0.0);
    };

    let mut c = (first, 0.0);
    for i in 1..p.len() {
        if inside(&c, p[i]) {
            continue;
        }
        c = (p[i], 0.0);
        for j in 0..i {
            if inside(&c, p[j]) {
                continue;
            }
            c = circle_from_2(p[i], p[j]);
            for k in 0..j {
                if inside(&c, p[k]) {
                    continue;
                }
                // collinear triples are already covered by the two-point circle
                if let Some(c3) = circle_from_3(p[i], p[j], p[k]) {
                    c = c3;
                }
            }
        }
    }
    (Point2::new(c.0.x as f32, c.0.y as f32), c.1 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::{GrayImage, Luma};

    fn mask_from_rows(rows: &[&str]) -> BinaryMask {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut m = GrayImage::new(w, h);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    m.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
        m
    }

    #[test]
    fn square_contour_area_and_perimeter() {
        let m = mask_from_rows(&[
            "......", //
            ".####.", //
            ".####.", //
            ".####.", //
            ".####.", //
            "......",
        ]);
        let blobs = extract_blobs(&m);
        assert_eq!(blobs.len(), 1);
        let b = &blobs[0];
        assert_eq!(b.contour.len(), 12);
        assert_abs_diff_eq!(b.contour_area(), 9.0);
        assert_abs_diff_eq!(b.perimeter(), 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(b.centroid.x, 2.5, epsilon = 1e-5);
        assert_abs_diff_eq!(b.centroid.y, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn components_come_out_in_raster_order() {
        let m = mask_from_rows(&[
            "...##", //
            "...##", //
            "#....", //
            "##...",
        ]);
        let blobs = extract_blobs(&m);
        assert_eq!(blobs.len(), 2);
        assert!(blobs[0].centroid.x > 3.0);
        assert!(blobs[1].centroid.x < 1.0);
    }

    #[test]
    fn diagonal_pixels_are_one_component() {
        let m = mask_from_rows(&[
            "#..", //
            ".#.", //
            "..#",
        ]);
        let blobs = extract_blobs(&m);
        assert_eq!(blobs.len(), 1);
        assert_abs_diff_eq!(blobs[0].contour_area(), 0.0);
        assert_abs_diff_eq!(blobs[0].centroid.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn islands_inside_holes_are_not_reported() {
        let m = mask_from_rows(&[
            "#######", //
            "#.....#", //
            "#.....#", //
            "#..#..#", //
            "#.....#", //
            "#.....#", //
            "#######",
        ]);
        let blobs = extract_blobs(&m);
        assert_eq!(blobs.len(), 1);
        assert_abs_diff_eq!(blobs[0].contour_area(), 36.0);
    }

    #[test]
    fn enclosing_circle_of_square_corners() {
        let pts = [
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 4),
            Point::new(0, 4),
            Point::new(2, 1),
        ];
        let (c, r) = min_enclosing_circle(&pts);
        assert_abs_diff_eq!(c.x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(c.y, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r, 8.0_f32.sqrt(), epsilon = 1e-5);
    }
}
