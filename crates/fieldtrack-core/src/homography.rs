use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Below this `|w|` a projected point is treated as lying at infinity.
const W_EPS: f64 = 1e-12;
/// Below this `|det(H)|` a transform is treated as singular.
const DET_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// Double precision projection; `None` when the point maps to infinity.
    #[inline]
    pub fn apply_f64(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < W_EPS {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    /// Project a batch of points with the same matrix, preserving order.
    pub fn apply_many(&self, pts: &[Point2<f64>]) -> Vec<Option<Point2<f64>>> {
        pts.iter().map(|&p| self.apply_f64(p)).collect()
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// True when every entry is finite and the matrix is invertible.
    pub fn is_well_conditioned(&self) -> bool {
        self.h.iter().all(|v| v.is_finite()) && self.h.determinant().abs() > DET_EPS
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Estimate H such that `dst ~ H * src`.
///
/// Exactly four correspondences use the closed-form solver; more use a
/// normalized DLT least-squares fit.
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src.try_into().ok()?;
        let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // Build A (2N x 9)
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Solve Ah = 0 -> h is right singular vector with smallest singular value
    let svd = a.svd(true, true);
    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// True when any three of `pts` are (nearly) collinear.
///
/// `tol` bounds the sine of the angle spanned at the first point of a triple.
pub fn has_collinear_triple(pts: &[Point2<f32>], tol: f64) -> bool {
    let n = pts.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let (a, b, c) = (pts[i], pts[j], pts[k]);
                let abx = (b.x - a.x) as f64;
                let aby = (b.y - a.y) as f64;
                let acx = (c.x - a.x) as f64;
                let acy = (c.y - a.y) as f64;
                let cross = (abx * acy - aby * acx).abs();
                let scale = (abx.hypot(aby) * acx.hypot(acy)).max(f64::MIN_POSITIVE);
                if cross / scale <= tol {
                    return true;
                }
            }
        }
    }
    false
}

/// RANSAC settings for [`estimate_homography_ransac`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Max reprojection error (destination units) for a correspondence to count as inlier.
    pub reproj_threshold: f64,
    /// Random 4-subsets drawn when the point set is too large to enumerate.
    pub max_iterations: usize,
    /// Seed of the deterministic sampler.
    pub seed: u64,
    /// Collinearity tolerance applied to each minimal sample.
    pub collinear_tol: f64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reproj_threshold: 3.0,
            max_iterations: 500,
            seed: 0x5eed_f1e1_d7ac_0001,
            collinear_tol: 1e-4,
        }
    }
}

/// Outcome of a robust estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct RansacEstimate {
    pub homography: Homography,
    /// Indices of the correspondences consistent with `homography`.
    pub inliers: Vec<usize>,
}

/// Sets above this size are sampled instead of exhaustively enumerated.
const ENUMERATE_MAX_POINTS: usize = 8;

struct Lcg(u64);

impl Lcg {
    fn next_index(&mut self, n: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) % n as u64) as usize
    }

    fn sample4(&mut self, n: usize) -> [usize; 4] {
        let mut out = [usize::MAX; 4];
        let mut filled = 0;
        while filled < 4 {
            let idx = self.next_index(n);
            if !out[..filled].contains(&idx) {
                out[filled] = idx;
                filled += 1;
            }
        }
        out
    }
}

fn all_subsets4(n: usize) -> Vec<[usize; 4]> {
    let mut out = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    out.push([a, b, c, d]);
                }
            }
        }
    }
    out
}

fn reproj_error(h: &Homography, src: Point2<f32>, dst: Point2<f32>) -> Option<f64> {
    let p = h.apply_f64(Point2::new(src.x as f64, src.y as f64))?;
    Some((p.x - dst.x as f64).hypot(p.y - dst.y as f64))
}

/// Outlier-tolerant estimate of H such that `dst ~ H * src`.
///
/// Minimal 4-point hypotheses are scored by inlier count (ties broken by the
/// summed inlier error) and the winner is refit on its inlier set. With exactly
/// four correspondences this reduces to the closed-form solution.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, dst, params), fields(n = src.len()))
)]
pub fn estimate_homography_ransac(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    params: &RansacParams,
) -> Option<RansacEstimate> {
    let n = src.len();
    if n != dst.len() || n < 4 {
        return None;
    }

    let samples = if n <= ENUMERATE_MAX_POINTS {
        all_subsets4(n)
    } else {
        let mut rng = Lcg(params.seed);
        (0..params.max_iterations.max(1))
            .map(|_| rng.sample4(n))
            .collect()
    };

    let mut best: Option<(Homography, Vec<usize>, f64)> = None;
    for sample in samples {
        let s = sample.map(|i| src[i]);
        let d = sample.map(|i| dst[i]);
        if has_collinear_triple(&s, params.collinear_tol)
            || has_collinear_triple(&d, params.collinear_tol)
        {
            continue;
        }
        let Some(h) = homography_from_4pt(&s, &d) else {
            continue;
        };
        if !h.is_well_conditioned() {
            continue;
        }

        let mut inliers = Vec::new();
        let mut err_sum = 0.0;
        for k in 0..n {
            if let Some(e) = reproj_error(&h, src[k], dst[k]) {
                if e <= params.reproj_threshold {
                    inliers.push(k);
                    err_sum += e;
                }
            }
        }

        let better = match &best {
            None => true,
            Some((_, best_inliers, best_err)) => {
                inliers.len() > best_inliers.len()
                    || (inliers.len() == best_inliers.len() && err_sum < *best_err)
            }
        };
        if better {
            best = Some((h, inliers, err_sum));
        }
    }

    let (h, inliers, _) = best?;
    if inliers.len() < 4 {
        return None;
    }

    let homography = if inliers.len() > 4 {
        let s: Vec<_> = inliers.iter().map(|&i| src[i]).collect();
        let d: Vec<_> = inliers.iter().map(|&i| dst[i]).collect();
        estimate_homography(&s, &d)
            .filter(Homography::is_well_conditioned)
            .unwrap_or(h)
    } else {
        h
    };

    Some(RansacEstimate {
        homography,
        inliers,
    })
}
