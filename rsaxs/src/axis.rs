//! Equally-spaced axes for distances and scattering vectors.

use serde::{Deserialize, Serialize};

/// An equally-spaced axis spanning `[min, max)` with `bins` bins.
///
/// Both process-wide axes are of this kind: the distance axis (bin width
/// `w_d`, spanning at least the molecule diameter) and the q-axis the
/// intensity profiles are evaluated on.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Axis {
    min: f64,
    max: f64,
    bins: usize,
}

impl Axis {
    /// Constructor for `Axis`.
    ///
    /// # Panics
    ///
    /// Panics if `max < min` or `bins` is zero.
    #[must_use]
    pub fn new(min: f64, max: f64, bins: usize) -> Self {
        assert!(min <= max);
        assert!(bins > 0);
        Self { min, max, bins }
    }

    /// Construct an axis from a bin width, spanning `[0, width * bins)`.
    #[must_use]
    pub fn from_width(width: f64, bins: usize) -> Self {
        Self::new(0.0, width * bins as f64, bins)
    }

    /// Returns the number of bins.
    #[must_use]
    pub const fn bins(&self) -> usize {
        self.bins
    }

    /// Returns the lower limit.
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Returns the upper limit.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Returns the width of a single bin.
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    /// Returns the bin index for `value`, or `None` if the value over- or
    /// underflows the axis.
    #[must_use]
    pub fn index(&self, value: f64) -> Option<usize> {
        if value < self.min || value >= self.max {
            None
        } else {
            Some(((value - self.min) / self.width()) as usize)
        }
    }

    /// Returns the index of the bin whose center is nearest to `value`, or
    /// `None` when the rounded index falls outside the axis. This is the
    /// binning used together with weighted bins.
    #[must_use]
    pub fn index_nearest(&self, value: f64) -> Option<usize> {
        if value < self.min {
            return None;
        }
        let index = ((value - self.min) / self.width()).round() as usize;
        (index < self.bins).then_some(index)
    }

    /// Returns the center of bin `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn center(&self, index: usize) -> f64 {
        assert!(index < self.bins);
        self.width().mul_add(index as f64 + 0.5, self.min)
    }

    /// Returns the centers of all bins.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        (0..self.bins).map(|index| self.center(index)).collect()
    }

    /// Returns the left edges of all bins. The left edge of bin `b` is the
    /// distance value `b * width`, which is also the value a floor-binned
    /// contribution maps back to.
    #[must_use]
    pub fn edges(&self) -> Vec<f64> {
        (0..self.bins)
            .map(|index| self.width().mul_add(index as f64, self.min))
            .collect()
    }

    /// Returns a new axis restricted to `[min, max]`, keeping the bin width.
    /// Bins partially covered by the range are included.
    #[must_use]
    pub fn sub_axis(&self, min: f64, max: f64) -> Self {
        let width = self.width();
        let first = ((min.max(self.min) - self.min) / width).floor() as usize;
        let last = (((max.min(self.max) - self.min) / width).ceil() as usize).max(first + 1);
        Self::new(
            width.mul_add(first as f64, self.min),
            width.mul_add(last.min(self.bins) as f64, self.min),
            last.min(self.bins) - first,
        )
    }

    /// Returns a copy of this axis truncated to its first `bins` bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` is zero or exceeds the current bin count.
    #[must_use]
    pub fn truncated(&self, bins: usize) -> Self {
        assert!(bins > 0 && bins <= self.bins);
        Self::new(self.min, self.width().mul_add(bins as f64, self.min), bins)
    }
}

/// Generate `bins` logarithmically spaced values covering `[min, max]`.
/// Used for log-sampled q-axes; the endpoints are always included.
///
/// # Panics
///
/// Panics if `min` is not positive or `bins < 2`.
#[must_use]
pub fn log_spaced(min: f64, max: f64, bins: usize) -> Vec<f64> {
    assert!(min > 0.0);
    assert!(bins >= 2);
    let (log_min, log_max) = (min.ln(), max.ln());
    (0..bins)
        .map(|i| {
            ((log_max - log_min).mul_add(i as f64 / (bins - 1) as f64, log_min)).exp()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn index_lookup() {
        let axis = Axis::new(0.0, 10.0, 10);
        assert_eq!(axis.index(0.0), Some(0));
        assert_eq!(axis.index(0.999), Some(0));
        assert_eq!(axis.index(9.999), Some(9));
        assert_eq!(axis.index(10.0), None);
        assert_eq!(axis.index(-0.1), None);
    }

    #[test]
    fn index_nearest_rounds_to_bin_center() {
        let axis = Axis::new(0.0, 10.0, 10);
        assert_eq!(axis.index_nearest(0.49), Some(0));
        assert_eq!(axis.index_nearest(0.51), Some(1));
        assert_eq!(axis.index_nearest(9.49), Some(9));
        assert_eq!(axis.index_nearest(9.51), None);
    }

    #[test]
    fn centers_and_width() {
        let axis = Axis::from_width(0.5, 4);
        assert_approx_eq!(f64, axis.width(), 0.5);
        assert_eq!(axis.centers(), vec![0.25, 0.75, 1.25, 1.75]);
    }

    #[test]
    fn sub_axis_keeps_width() {
        let axis = Axis::new(0.0, 10.0, 100);
        let sub = axis.sub_axis(0.25, 0.55);
        assert_approx_eq!(f64, sub.width(), axis.width());
        assert_approx_eq!(f64, sub.min(), 0.2);
        assert_approx_eq!(f64, sub.max(), 0.6);
        assert_eq!(sub.bins(), 4);
    }

    #[test]
    fn log_spacing_includes_endpoints() {
        let values = log_spaced(1e-4, 0.5, 100);
        assert_eq!(values.len(), 100);
        assert_approx_eq!(f64, values[0], 1e-4, epsilon = 1e-12);
        assert_approx_eq!(f64, values[99], 0.5, epsilon = 1e-12);
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
