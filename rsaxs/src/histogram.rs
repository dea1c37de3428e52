//! Partial distance-histogram storage.
//!
//! Distance counts are accumulated into dense arrays: one axis for the
//! distance bin, plus zero, one or two leading axes for the scattering
//! types of the pair. Thread-local copies are merged at the end of a
//! build.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};

/// Minimum number of distance bins retained when truncating trailing
/// zeros.
pub const MIN_BINS: usize = 10;

/// A plain distance histogram: counts by distance bin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution1D {
    data: Array1<f64>,
}

impl Distribution1D {
    /// An empty histogram with `bins` distance bins.
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self {
            data: Array1::zeros(bins),
        }
    }

    /// Construct from raw counts.
    #[must_use]
    pub fn from_counts(counts: Vec<f64>) -> Self {
        Self {
            data: Array1::from_vec(counts),
        }
    }

    /// Number of distance bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.data.len()
    }

    /// Add `value` to bin `bin`.
    pub fn add(&mut self, bin: usize, value: f64) {
        self.data[bin] += value;
    }

    /// The count in bin `bin`.
    #[must_use]
    pub fn get(&self, bin: usize) -> f64 {
        self.data[bin]
    }

    /// View of all counts.
    #[must_use]
    pub fn counts(&self) -> ArrayView1<'_, f64> {
        self.data.view()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// Accumulate `other` into this histogram.
    ///
    /// # Panics
    ///
    /// Panics if the bin counts differ.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.bins(), other.bins());
        self.data += &other.data;
    }

    /// Index of one past the last nonzero bin, with a floor of
    /// [`MIN_BINS`]. Trailing zero bins carry no information and are
    /// dropped after a build.
    #[must_use]
    pub fn significant_bins(&self) -> usize {
        let last = self
            .data
            .iter()
            .rposition(|&count| count != 0.0)
            .map_or(0, |index| index + 1);
        last.max(MIN_BINS).min(self.bins())
    }

    /// A copy truncated to the first `bins` bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` exceeds the current bin count.
    #[must_use]
    pub fn truncated(&self, bins: usize) -> Self {
        assert!(bins <= self.bins());
        Self {
            data: self.data.slice(ndarray::s![..bins]).to_owned(),
        }
    }
}

/// A type-resolved distance histogram: counts by (type, distance bin).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution2D {
    data: Array2<f64>,
}

impl Distribution2D {
    /// An empty histogram with `types` type slots and `bins` distance bins.
    #[must_use]
    pub fn new(types: usize, bins: usize) -> Self {
        Self {
            data: Array2::zeros((types, bins)),
        }
    }

    /// Number of distance bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.data.ncols()
    }

    /// Number of type slots.
    #[must_use]
    pub fn types(&self) -> usize {
        self.data.nrows()
    }

    /// Add `value` to the (type, bin) slot.
    pub fn add(&mut self, t: usize, bin: usize, value: f64) {
        self.data[[t, bin]] += value;
    }

    /// The count in the (type, bin) slot.
    #[must_use]
    pub fn get(&self, t: usize, bin: usize) -> f64 {
        self.data[[t, bin]]
    }

    /// View of all counts.
    #[must_use]
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// The distance row for type `t`.
    #[must_use]
    pub fn row(&self, t: usize) -> ArrayView1<'_, f64> {
        self.data.row(t)
    }

    /// Accumulate `other` into this histogram.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.data.dim(), other.data.dim());
        self.data += &other.data;
    }

    /// Sum over the type axis, yielding a plain distance histogram.
    #[must_use]
    pub fn sum_over_types(&self) -> Distribution1D {
        Distribution1D {
            data: self.data.sum_axis(ndarray::Axis(0)),
        }
    }

    /// A copy truncated to the first `bins` distance bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` exceeds the current bin count.
    #[must_use]
    pub fn truncated(&self, bins: usize) -> Self {
        assert!(bins <= self.bins());
        Self {
            data: self.data.slice(ndarray::s![.., ..bins]).to_owned(),
        }
    }
}

/// A pair-type-resolved distance histogram: counts by (type, type,
/// distance bin).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution3D {
    data: Array3<f64>,
}

impl Distribution3D {
    /// An empty histogram with `types`² type-pair slots and `bins`
    /// distance bins.
    #[must_use]
    pub fn new(types: usize, bins: usize) -> Self {
        Self {
            data: Array3::zeros((types, types, bins)),
        }
    }

    /// Number of distance bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.data.dim().2
    }

    /// Number of type slots per axis.
    #[must_use]
    pub fn types(&self) -> usize {
        self.data.dim().0
    }

    /// Add `value` to the (t1, t2, bin) slot.
    pub fn add(&mut self, t1: usize, t2: usize, bin: usize, value: f64) {
        self.data[[t1, t2, bin]] += value;
    }

    /// The count in the (t1, t2, bin) slot.
    #[must_use]
    pub fn get(&self, t1: usize, t2: usize, bin: usize) -> f64 {
        self.data[[t1, t2, bin]]
    }

    /// View of all counts.
    #[must_use]
    pub fn counts(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    /// The distance row for the type pair (t1, t2).
    #[must_use]
    pub fn row(&self, t1: usize, t2: usize) -> ArrayView1<'_, f64> {
        self.data.slice(ndarray::s![t1, t2, ..])
    }

    /// Accumulate `other` into this histogram.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.data.dim(), other.data.dim());
        self.data += &other.data;
    }

    /// Sum over both type axes, yielding a plain distance histogram.
    #[must_use]
    pub fn sum_over_types(&self) -> Distribution1D {
        Distribution1D {
            data: self
                .data
                .sum_axis(ndarray::Axis(0))
                .sum_axis(ndarray::Axis(0)),
        }
    }

    /// A copy truncated to the first `bins` distance bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` exceeds the current bin count.
    #[must_use]
    pub fn truncated(&self, bins: usize) -> Self {
        assert!(bins <= self.bins());
        Self {
            data: self.data.slice(ndarray::s![.., .., ..bins]).to_owned(),
        }
    }
}

/// Per-bin accumulation of weighted distances, shared by all partials of a
/// weighted build. Dividing by the accumulated weight yields the mean
/// distance of each bin's contributions, which replaces the nominal bin
/// value in the sinc table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightedBins {
    weight: Array1<f64>,
    weighted_distance: Array1<f64>,
}

impl WeightedBins {
    /// An empty tracker with `bins` distance bins.
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self {
            weight: Array1::zeros(bins),
            weighted_distance: Array1::zeros(bins),
        }
    }

    /// Number of distance bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.weight.len()
    }

    /// Record a contribution of weight `weight` at distance `distance` in
    /// bin `bin`.
    pub fn add(&mut self, bin: usize, weight: f64, distance: f64) {
        self.weight[bin] += weight;
        self.weighted_distance[bin] += weight * distance;
    }

    /// Accumulate `other` into this tracker.
    ///
    /// # Panics
    ///
    /// Panics if the bin counts differ.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.bins(), other.bins());
        self.weight += &other.weight;
        self.weighted_distance += &other.weighted_distance;
    }

    /// The mean contribution distance per bin. Bins without contributions
    /// fall back to the corresponding entry of `fallback`.
    ///
    /// # Panics
    ///
    /// Panics if `fallback` is shorter than the tracker.
    #[must_use]
    pub fn means(&self, fallback: &[f64]) -> Vec<f64> {
        assert!(fallback.len() >= self.bins());
        self.weight
            .iter()
            .zip(&self.weighted_distance)
            .zip(fallback)
            .map(|((&weight, &sum), &nominal)| {
                if weight > 0.0 {
                    sum / weight
                } else {
                    nominal
                }
            })
            .collect()
    }

    /// A copy truncated to the first `bins` bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` exceeds the current bin count.
    #[must_use]
    pub fn truncated(&self, bins: usize) -> Self {
        assert!(bins <= self.bins());
        Self {
            weight: self.weight.slice(ndarray::s![..bins]).to_owned(),
            weighted_distance: self.weighted_distance.slice(ndarray::s![..bins]).to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn accumulate_and_merge() {
        let mut a = Distribution1D::new(16);
        let mut b = Distribution1D::new(16);
        a.add(0, 1.0);
        a.add(3, 2.0);
        b.add(3, 0.5);
        a.merge(&b);
        assert_approx_eq!(f64, a.get(3), 2.5);
        assert_approx_eq!(f64, a.sum(), 3.5);
    }

    #[test]
    fn significant_bins_truncates_trailing_zeros() {
        let mut p = Distribution1D::new(100);
        p.add(24, 1.0);
        assert_eq!(p.significant_bins(), 25);
        assert_eq!(p.truncated(25).bins(), 25);

        // floor of MIN_BINS bins
        let mut p = Distribution1D::new(100);
        p.add(2, 1.0);
        assert_eq!(p.significant_bins(), MIN_BINS);

        // never exceeds the allocated bins
        let mut p = Distribution1D::new(4);
        p.add(3, 1.0);
        assert_eq!(p.significant_bins(), 4);
    }

    #[test]
    fn pair_resolved_rows_and_sums() {
        let mut p = Distribution3D::new(3, 8);
        p.add(0, 1, 4, 2.0);
        p.add(1, 0, 4, 2.0);
        p.add(2, 2, 0, 1.0);
        assert_approx_eq!(f64, p.row(0, 1)[4], 2.0);
        let total = p.sum_over_types();
        assert_approx_eq!(f64, total.get(4), 4.0);
        assert_approx_eq!(f64, total.get(0), 1.0);
        assert_approx_eq!(f64, total.sum(), 5.0);
    }

    #[test]
    fn weighted_bin_means() {
        let mut bins = WeightedBins::new(4);
        bins.add(1, 1.0, 0.9);
        bins.add(1, 3.0, 1.1);
        let fallback = [0.0, 1.0, 2.0, 3.0];
        let means = bins.means(&fallback);
        assert_approx_eq!(f64, means[1], (0.9 + 3.0 * 1.1) / 4.0);
        // untouched bins fall back to their nominal value
        assert_approx_eq!(f64, means[2], 2.0);
    }

    #[test]
    fn weighted_bins_merge() {
        let mut a = WeightedBins::new(4);
        let mut b = WeightedBins::new(4);
        a.add(2, 1.0, 2.0);
        b.add(2, 1.0, 2.2);
        a.merge(&b);
        assert_approx_eq!(f64, a.means(&[0.0; 4])[2], 2.1);
    }
}
