//! Homography (3x3 projective transform) between two quadrilaterals
//!
//! Two ways of obtaining one:
//! - `Homography::solve` maps 4 corners exactly onto 4 corners (the live deformation path)
//! - `Homography::estimate` fits N >= 4 correspondences in the least-squares sense
//!   and falls back to the exact solve when given exactly 4
//!
//! Both reject quads where three points are collinear or two coincide.

use nalgebra::{DMatrix, Matrix3, SMatrix, SVector, Vector3};

use crate::error::DegenerateQuadError;
use crate::geometry::Point;

/// Relative tolerance for the collinearity test (twice the triangle area
/// compared to the squared diagonal of the quad's bounding box)
const COLLINEAR_EPS: f64 = 1e-6;

/// Perspective transformation matrix, row-major, normalised so that `h33 == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: [f64; 9],
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Homography {
    pub const IDENTITY: Homography = Homography {
        matrix: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    /// Pure translation by `(dx, dy)`
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            matrix: [1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0],
        }
    }

    /// Exact transform mapping `src[i]` onto `dst[i]` for the four corners
    ///
    /// Corner order must match in both arrays (TL, TR, BR, BL).
    pub fn solve<S>(src: &[Point<S>; 4], dst: &[Point<S>; 4]) -> Result<Self, DegenerateQuadError> {
        check_quad(src)?;
        check_quad(dst)?;

        // Unknowns h11..h32 with h33 = 1. For each correspondence (x,y) -> (u,v):
        //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
        //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
        let (src_n, t_src) = normalize_points(src);
        let (dst_n, t_dst) = normalize_points(dst);

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for k in 0..4 {
            let (x, y) = src_n[k];
            let (u, v) = dst_n[k];

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

        let h = a.lu().solve(&b).ok_or(DegenerateQuadError)?;
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

        let t_dst_inv = t_dst.try_inverse().ok_or(DegenerateQuadError)?;
        Self::from_matrix3(t_dst_inv * hn * t_src)
    }

    /// Best-fit transform for N >= 4 correspondences (normalised DLT)
    pub fn estimate<S>(src: &[Point<S>], dst: &[Point<S>]) -> Result<Self, DegenerateQuadError> {
        if src.len() != dst.len() || src.len() < 4 {
            return Err(DegenerateQuadError);
        }

        if let (Ok(s), Ok(d)) = (
            <&[Point<S>; 4]>::try_from(src),
            <&[Point<S>; 4]>::try_from(dst),
        ) {
            return Self::solve(s, d);
        }

        let (src_n, t_src) = normalize_points(src);
        let (dst_n, t_dst) = normalize_points(dst);

        let n = src.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for k in 0..n {
            let (x, y) = src_n[k];
            let (u, v) = dst_n[k];

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

        // h is the right singular vector of the smallest singular value
        let svd = a.svd(false, true);
        let v_t = svd.v_t.ok_or(DegenerateQuadError)?;
        let (smallest, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, &s)| if s < best.1 { (i, s) } else { best });
        let h = v_t.row(smallest);

        // A rank drop beyond the one-dimensional null space means the points do not
        // pin down a unique transform
        let rank = svd.singular_values.iter().filter(|s| **s > 1e-9).count();
        if rank < 8 {
            return Err(DegenerateQuadError);
        }

        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
        let t_dst_inv = t_dst.try_inverse().ok_or(DegenerateQuadError)?;
        Self::from_matrix3(t_dst_inv * hn * t_src)
    }

    fn from_matrix3(m: Matrix3<f64>) -> Result<Self, DegenerateQuadError> {
        let s = m[(2, 2)];
        if !s.is_finite() || s.abs() < 1e-12 {
            return Err(DegenerateQuadError);
        }
        let m = m / s;
        if m.iter().any(|v| !v.is_finite()) || m.determinant().abs() < 1e-12 {
            return Err(DegenerateQuadError);
        }

        Ok(Self {
            matrix: [
                m[(0, 0)],
                m[(0, 1)],
                m[(0, 2)],
                m[(1, 0)],
                m[(1, 1)],
                m[(1, 2)],
                m[(2, 0)],
                m[(2, 1)],
                m[(2, 2)],
            ],
        })
    }

    fn to_matrix3(self) -> Matrix3<f64> {
        Matrix3::from_row_slice(&self.matrix)
    }

    /// Row-major coefficients
    pub fn matrix(&self) -> &[f64; 9] {
        &self.matrix
    }

    pub fn inverse(&self) -> Option<Self> {
        self.to_matrix3()
            .try_inverse()
            .and_then(|inv| Self::from_matrix3(inv).ok())
    }

    /// Map a point, `None` when it lands on the line at infinity
    #[inline]
    pub fn try_apply<S>(&self, p: Point<S>) -> Option<Point<S>> {
        let h = &self.matrix;
        let w = h[6] * p.x + h[7] * p.y + h[8];
        if w.abs() < 1e-10 {
            return None;
        }
        Some(Point::new(
            (h[0] * p.x + h[1] * p.y + h[2]) / w,
            (h[3] * p.x + h[4] * p.y + h[5]) / w,
        ))
    }

    /// Map a point; points on the line at infinity are returned unchanged
    #[inline]
    pub fn apply<S>(&self, p: Point<S>) -> Point<S> {
        self.try_apply(p).unwrap_or(p)
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        self.matrix
            .iter()
            .zip(Self::IDENTITY.matrix.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// Reject quads with coincident points or three collinear points
pub fn check_quad<S>(points: &[Point<S>; 4]) -> Result<(), DegenerateQuadError> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(DegenerateQuadError);
    }

    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let diag_sq = (x1 - x0).powi(2) + (y1 - y0).powi(2);
    if diag_sq <= f64::EPSILON {
        return Err(DegenerateQuadError);
    }

    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    for (i, j, k) in TRIPLES {
        let (a, b, c) = (points[i], points[j], points[k]);
        let area2 = ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs();
        if area2 <= COLLINEAR_EPS * diag_sq {
            return Err(DegenerateQuadError);
        }
    }
    Ok(())
}

/// Hartley normalisation: centroid to the origin, mean distance sqrt(2)
fn normalize_points<S>(pts: &[Point<S>]) -> (Vec<(f64, f64)>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            (v[0], v[1])
        })
        .collect();
    (out, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ImageSpace;
    use imageproc::geometric_transformations::Projection;

    type P = Point<ImageSpace>;

    fn square(size: f64) -> [P; 4] {
        [
            P::new(0.0, 0.0),
            P::new(size, 0.0),
            P::new(size, size),
            P::new(0.0, size),
        ]
    }

    fn close(a: P, b: P, tol: f64) -> bool {
        a.distance(&b) <= tol
    }

    #[test]
    fn test_identity_transform() {
        let src = square(100.0);
        let h = Homography::solve(&src, &src).unwrap();
        assert!(h.is_identity(1e-9));
        assert!(close(h.apply(P::new(50.0, 50.0)), P::new(50.0, 50.0), 1e-9));
    }

    #[test]
    fn test_corners_map_exactly() {
        let src = square(99.0);
        let dst = [
            P::new(0.0, 0.0),
            P::new(150.0, -20.0),
            P::new(99.0, 99.0),
            P::new(0.0, 99.0),
        ];
        let h = Homography::solve(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            assert!(close(h.apply(*s), *d, 1e-6), "{:?} -> {:?}", s, h.apply(*s));
        }

        let inv = h.inverse().unwrap();
        assert!(close(inv.apply(P::new(150.0, -20.0)), P::new(99.0, 0.0), 1e-6));
    }

    #[test]
    fn test_matches_imageproc_projection() {
        let src = square(64.0);
        let dst = [
            P::new(5.0, 3.0),
            P::new(70.0, -4.0),
            P::new(60.0, 66.0),
            P::new(-2.0, 58.0),
        ];
        let h = Homography::solve(&src, &dst).unwrap();

        let as_f32 = |q: &[P; 4]| q.map(|p| (p.x as f32, p.y as f32));
        let projection = Projection::from_control_points(as_f32(&src), as_f32(&dst)).unwrap();

        for p in [P::new(10.0, 10.0), P::new(32.0, 50.0), P::new(63.0, 1.0)] {
            let (ex, ey) = projection * (p.x as f32, p.y as f32);
            let ours = h.apply(p);
            assert!((ours.x - ex as f64).abs() < 1e-2);
            assert!((ours.y - ey as f64).abs() < 1e-2);
        }
    }

    #[test]
    fn test_collinear_destination_rejected() {
        let src = square(10.0);
        let dst = [
            P::new(0.0, 0.0),
            P::new(5.0, 5.0),
            P::new(10.0, 10.0),
            P::new(0.0, 10.0),
        ];
        assert_eq!(Homography::solve(&src, &dst), Err(DegenerateQuadError));
    }

    #[test]
    fn test_coincident_points_rejected() {
        let src = square(10.0);
        let dst = [
            P::new(3.0, 3.0),
            P::new(3.0, 3.0),
            P::new(10.0, 10.0),
            P::new(0.0, 10.0),
        ];
        assert!(Homography::solve(&src, &dst).is_err());
        assert!(Homography::solve(&dst, &src).is_err());
        assert!(check_quad(&[P::new(1.0, 1.0); 4]).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut dst = square(10.0);
        dst[2] = P::new(f64::NAN, 4.0);
        assert!(Homography::solve(&square(10.0), &dst).is_err());
    }

    #[test]
    fn test_estimate_four_points_is_exact() {
        let src = square(20.0);
        let dst = [
            P::new(1.0, 2.0),
            P::new(22.0, 0.0),
            P::new(25.0, 24.0),
            P::new(-3.0, 19.0),
        ];
        let exact = Homography::solve(&src, &dst).unwrap();
        let fitted = Homography::estimate(&src, &dst).unwrap();
        assert_eq!(exact, fitted);
    }

    #[test]
    fn test_estimate_many_points() {
        let truth = Homography::solve(
            &square(10.0),
            &[
                P::new(0.0, 0.0),
                P::new(12.0, 1.0),
                P::new(11.0, 13.0),
                P::new(-1.0, 10.0),
            ],
        )
        .unwrap();

        let src: Vec<P> = (0..3)
            .flat_map(|i| (0..3).map(move |j| P::new(i as f64 * 5.0, j as f64 * 5.0)))
            .collect();
        let dst: Vec<P> = src.iter().map(|p| truth.apply(*p)).collect();

        let fitted = Homography::estimate(&src, &dst).unwrap();
        for p in &src {
            assert!(close(fitted.apply(*p), truth.apply(*p), 1e-6));
        }
    }

    #[test]
    fn test_estimate_rejects_too_few_points() {
        let pts = [P::new(0.0, 0.0), P::new(1.0, 0.0), P::new(0.0, 1.0)];
        assert!(Homography::estimate(&pts, &pts).is_err());
    }
}
