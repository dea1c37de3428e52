//! Compact structure-of-arrays coordinates and the batched pair kernels
//! used by every histogram builder.
//!
//! The inner loop walks one source point against batches of 8, then 4,
//! then single target points. The batch layout keeps the distance
//! evaluations independent so the compiler can vectorize them; the scalar
//! tail produces bit-identical counts.

use crate::body::{Body, PointFF};
use crate::histogram::{Distribution1D, Distribution2D, Distribution3D, WeightedBins};
use std::ops::Range;

/// Structure-of-arrays buffer of scattering points.
#[derive(Clone, Debug, Default)]
pub struct CompactCoordinates {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    w: Vec<f64>,
    t: Vec<u8>,
}

impl CompactCoordinates {
    /// An empty buffer with room for `capacity` points.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            w: Vec::with_capacity(capacity),
            t: Vec::with_capacity(capacity),
        }
    }

    /// Build from a point slice.
    #[must_use]
    pub fn from_points(points: &[PointFF]) -> Self {
        let mut data = Self::with_capacity(points.len());
        for point in points {
            data.push(point);
        }
        data
    }

    /// Build from the atomic points of `bodies`, in body order.
    #[must_use]
    pub fn from_bodies(bodies: &[Body]) -> Self {
        let mut data = Self::with_capacity(bodies.iter().map(|body| body.atoms().len()).sum());
        for body in bodies {
            for point in body.atoms() {
                data.push(point);
            }
        }
        data
    }

    /// Build from the hydration points of `bodies`, in body order.
    #[must_use]
    pub fn waters_from_bodies(bodies: &[Body]) -> Self {
        let mut data = Self::with_capacity(bodies.iter().map(|body| body.waters().len()).sum());
        for body in bodies {
            for point in body.waters() {
                data.push(point);
            }
        }
        data
    }

    /// Append a point.
    pub fn push(&mut self, point: &PointFF) {
        self.x.push(point.pos.x);
        self.y.push(point.pos.y);
        self.z.push(point.pos.z);
        self.w.push(point.weight);
        self.t.push(point.kind.as_index() as u8);
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the buffer holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Scattering weight of point `index`.
    #[must_use]
    pub fn weight(&self, index: usize) -> f64 {
        self.w[index]
    }

    /// Form-factor table index of point `index`.
    #[must_use]
    pub fn type_index(&self, index: usize) -> usize {
        usize::from(self.t[index])
    }

    /// Componentwise bounding box of the points, or `None` when empty.
    #[must_use]
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        if self.is_empty() {
            return None;
        }
        let fold = |values: &[f64]| {
            values.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &value| (lo.min(value), hi.max(value)),
            )
        };
        let (x_lo, x_hi) = fold(&self.x);
        let (y_lo, y_hi) = fold(&self.y);
        let (z_lo, z_hi) = fold(&self.z);
        Some(([x_lo, y_lo, z_lo], [x_hi, y_hi, z_hi]))
    }

    /// Euclidean distance between point `i` of `self` and point `j` of
    /// `other`.
    #[must_use]
    pub fn distance(&self, i: usize, other: &Self, j: usize) -> f64 {
        let dx = other.x[j] - self.x[i];
        let dy = other.y[j] - self.y[i];
        let dz = other.z[j] - self.z[i];
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }
}

/// Sink for pair contributions, resolved by the types of both points.
pub trait PairTarget {
    /// Deposit `value` for a pair of types (`ti`, `tj`) at distance bin
    /// `bin`.
    fn deposit(&mut self, ti: usize, tj: usize, bin: usize, value: f64);
}

impl PairTarget for Distribution3D {
    fn deposit(&mut self, ti: usize, tj: usize, bin: usize, value: f64) {
        self.add(ti, tj, bin, value);
    }
}

/// A 2-D sink keyed by the source-point type; the target-point type is
/// implied by the buffer (waters or dummies).
impl PairTarget for Distribution2D {
    fn deposit(&mut self, ti: usize, _tj: usize, bin: usize, value: f64) {
        self.add(ti, bin, value);
    }
}

/// A 1-D sink for same-buffer terms where both types are implied.
impl PairTarget for Distribution1D {
    fn deposit(&mut self, _ti: usize, _tj: usize, bin: usize, value: f64) {
        self.add(bin, value);
    }
}

#[inline]
fn evaluate_batch<T: PairTarget, const WEIGHTED: bool, const N: usize>(
    target: &mut T,
    bins: &mut WeightedBins,
    inv_width: f64,
    scale: f64,
    a: &CompactCoordinates,
    i: usize,
    b: &CompactCoordinates,
    j: usize,
) {
    let (xi, yi, zi) = (a.x[i], a.y[i], a.z[i]);
    let (wi, ti) = (a.w[i], usize::from(a.t[i]));

    let mut distance = [0.0_f64; N];
    for lane in 0..N {
        let dx = b.x[j + lane] - xi;
        let dy = b.y[j + lane] - yi;
        let dz = b.z[j + lane] - zi;
        distance[lane] = dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt();
    }

    for lane in 0..N {
        let d = distance[lane];
        let bin = if WEIGHTED {
            (d * inv_width).round() as usize
        } else {
            (d * inv_width) as usize
        };
        let value = scale * wi * b.w[j + lane];
        target.deposit(ti, usize::from(b.t[j + lane]), bin, value);
        if WEIGHTED {
            bins.add(bin, value, d);
        }
    }
}

#[inline]
fn evaluate_row<T: PairTarget, const WEIGHTED: bool>(
    target: &mut T,
    bins: &mut WeightedBins,
    inv_width: f64,
    scale: f64,
    a: &CompactCoordinates,
    i: usize,
    b: &CompactCoordinates,
    j_start: usize,
) {
    let len = b.len();
    let mut j = j_start;
    while j + 8 <= len {
        evaluate_batch::<T, WEIGHTED, 8>(target, bins, inv_width, scale, a, i, b, j);
        j += 8;
    }
    while j + 4 <= len {
        evaluate_batch::<T, WEIGHTED, 4>(target, bins, inv_width, scale, a, i, b, j);
        j += 4;
    }
    while j < len {
        evaluate_batch::<T, WEIGHTED, 1>(target, bins, inv_width, scale, a, i, b, j);
        j += 1;
    }
}

/// Accumulate all unordered pairs within `data` whose lower index lies in
/// `rows`, depositing `scale·2·wᵢ·wⱼ` per pair so both orderings are
/// counted. Self pairs are not included; see [`self_terms`].
pub fn pairs_within<T: PairTarget, const WEIGHTED: bool>(
    target: &mut T,
    bins: &mut WeightedBins,
    inv_width: f64,
    scale: f64,
    data: &CompactCoordinates,
    rows: Range<usize>,
) {
    for i in rows {
        evaluate_row::<T, WEIGHTED>(target, bins, inv_width, 2.0 * scale, data, i, data, i + 1);
    }
}

/// Accumulate all pairs between `a` (rows restricted to `rows`) and `b`,
/// depositing `scale·wᵢ·wⱼ` once per unordered pair.
pub fn pairs_between<T: PairTarget, const WEIGHTED: bool>(
    target: &mut T,
    bins: &mut WeightedBins,
    inv_width: f64,
    scale: f64,
    a: &CompactCoordinates,
    rows: Range<usize>,
    b: &CompactCoordinates,
) {
    for i in rows {
        evaluate_row::<T, WEIGHTED>(target, bins, inv_width, scale, a, i, b, 0);
    }
}

/// Deposit the self contribution `scale·wᵢ²` of every point at distance
/// bin 0.
pub fn self_terms<T: PairTarget, const WEIGHTED: bool>(
    target: &mut T,
    bins: &mut WeightedBins,
    scale: f64,
    data: &CompactCoordinates,
) {
    for i in 0..data.len() {
        let value = scale * data.w[i] * data.w[i];
        let t = usize::from(data.t[i]);
        target.deposit(t, t, 0, value);
        if WEIGHTED {
            bins.add(0, value, 0.0);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::form_factor::FormFactorType;

    fn cube() -> CompactCoordinates {
        let mut points = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    points.push(PointFF::new(x, y, z, 1.0, FormFactorType::C));
                }
            }
        }
        CompactCoordinates::from_points(&points)
    }

    #[test]
    fn distances() {
        let data = cube();
        assert_eq!(data.len(), 8);
        assert!((data.distance(0, &data, 1) - 2.0).abs() < 1e-12);
        assert!((data.distance(0, &data, 7) - 12.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn cube_histogram_counts() {
        // 8 unit points at the cube corners: 24 pairs at 2, 24 at √8,
        // 8 at √12, each counted in both orderings. With quarter-Å bins
        // the three distances land in distinct bins 8, 11 and 14.
        let data = cube();
        let mut histogram = Distribution1D::new(16);
        let mut bins = WeightedBins::new(16);
        self_terms::<_, true>(&mut histogram, &mut bins, 1.0, &data);
        pairs_within::<_, true>(&mut histogram, &mut bins, 4.0, 1.0, &data, 0..data.len());

        assert!((histogram.get(0) - 8.0).abs() < 1e-12);
        assert!((histogram.get(8) - 24.0).abs() < 1e-12);
        assert!((histogram.get(11) - 24.0).abs() < 1e-12);
        assert!((histogram.get(14) - 8.0).abs() < 1e-12);
        assert!((histogram.sum() - 64.0).abs() < 1e-12);

        // the weighted means reproduce the exact distances
        let means = bins.means(&[0.0; 16]);
        assert!((means[11] - 8.0_f64.sqrt()).abs() < 1e-12);
        assert!((means[14] - 12.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn batched_rows_match_scalar_evaluation() {
        // 11 points exercises the 8-, 4- and 1-lane tails
        let points: Vec<PointFF> = (0..11)
            .map(|i| {
                PointFF::new(
                    f64::from(i) * 0.7,
                    f64::from(i % 3),
                    -f64::from(i % 5),
                    1.0 + f64::from(i) * 0.1,
                    FormFactorType::C,
                )
            })
            .collect();
        let data = CompactCoordinates::from_points(&points);

        let mut batched = Distribution1D::new(32);
        let mut bins = WeightedBins::new(32);
        pairs_within::<_, false>(&mut batched, &mut bins, 1.0, 1.0, &data, 0..data.len());

        let mut scalar = Distribution1D::new(32);
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                let d = data.distance(i, &data, j);
                scalar.add(d as usize, 2.0 * data.weight(i) * data.weight(j));
            }
        }

        for bin in 0..32 {
            assert!((batched.get(bin) - scalar.get(bin)).abs() < 1e-12);
        }
    }

    #[test]
    fn cross_pairs_count_each_pair_once() {
        let a = CompactCoordinates::from_points(&[PointFF::new(
            0.0,
            0.0,
            0.0,
            2.0,
            FormFactorType::C,
        )]);
        let b = CompactCoordinates::from_points(&[
            PointFF::new(1.0, 0.0, 0.0, 1.0, FormFactorType::OH),
            PointFF::new(0.0, 2.0, 0.0, 1.0, FormFactorType::OH),
        ]);
        let mut target = Distribution2D::new(16, 8);
        let mut bins = WeightedBins::new(8);
        pairs_between::<_, true>(&mut target, &mut bins, 1.0, 1.0, &a, 0..1, &b);

        let c = FormFactorType::C.as_index();
        assert!((target.get(c, 1) - 2.0).abs() < 1e-12);
        assert!((target.get(c, 2) - 2.0).abs() < 1e-12);
    }
}
