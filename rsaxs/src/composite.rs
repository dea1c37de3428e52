//! The composite distance histogram and its Debye transform.
//!
//! Bundles the form-factor-partitioned partials produced by a histogram
//! manager, carries the free modulating parameters, and converts the
//! partials into intensity profiles through the precomputed sinc and
//! form-factor-product tables.

use crate::axis::Axis;
use crate::dataset::ScatteringProfile;
use crate::form_factor::{FormFactorProducts, FormFactorType, COUNT_WITHOUT_EXV, WATER};
use crate::histogram::{Distribution1D, Distribution2D, Distribution3D, WeightedBins};
use crate::sinc::{CachedSincTable, SincTable};
use ndarray::{Array1, Array2, Array3};

/// Excluded-volume partials: atom–dummy, dummy–dummy and water–dummy
/// histograms, plus the displaced volume of one dummy.
#[derive(Clone, Debug)]
pub struct ExvPartials {
    /// Atom–dummy cross counts by atom type.
    pub ax: Distribution2D,
    /// Dummy–dummy counts.
    pub xx: Distribution1D,
    /// Water–dummy cross counts.
    pub wx: Distribution1D,
    /// Displaced volume represented by one dummy, in Å³.
    pub volume: f64,
}

impl ExvPartials {
    /// Empty partials with `bins` distance bins and per-dummy volume
    /// `volume`.
    #[must_use]
    pub fn new(bins: usize, volume: f64) -> Self {
        Self {
            ax: Distribution2D::new(COUNT_WITHOUT_EXV, bins),
            xx: Distribution1D::new(bins),
            wx: Distribution1D::new(bins),
            volume,
        }
    }

    /// Accumulate `other` into this set.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn merge(&mut self, other: &Self) {
        self.ax.merge(&other.ax);
        self.xx.merge(&other.xx);
        self.wx.merge(&other.wx);
    }
}

/// The raw output of a histogram build, before assembly into a composite
/// histogram. Thread-local instances are merged at the reduction barrier.
#[derive(Clone, Debug)]
pub struct HistogramParts {
    /// Atom–atom counts by type pair.
    pub aa: Distribution3D,
    /// Atom–water counts by atom type.
    pub aw: Distribution2D,
    /// Water–water counts.
    pub ww: Distribution1D,
    /// Per-bin mean-distance tracking, present for weighted builds.
    pub weighted: Option<WeightedBins>,
    /// Excluded-volume partials, present when dummies entered the build.
    pub exv: Option<ExvPartials>,
}

impl HistogramParts {
    /// Empty parts with `bins` distance bins.
    #[must_use]
    pub fn new(bins: usize, weighted: bool) -> Self {
        Self {
            aa: Distribution3D::new(COUNT_WITHOUT_EXV, bins),
            aw: Distribution2D::new(COUNT_WITHOUT_EXV, bins),
            ww: Distribution1D::new(bins),
            weighted: weighted.then(|| WeightedBins::new(bins)),
            exv: None,
        }
    }

    /// Empty parts that also track excluded-volume partials.
    #[must_use]
    pub fn with_exv(bins: usize, weighted: bool, volume: f64) -> Self {
        let mut parts = Self::new(bins, weighted);
        parts.exv = Some(ExvPartials::new(bins, volume));
        parts
    }

    /// Accumulate `other` into this set.
    ///
    /// # Panics
    ///
    /// Panics if the shapes or the weighted/exv layout differ.
    pub fn merge(&mut self, other: &Self) {
        self.aa.merge(&other.aa);
        self.aw.merge(&other.aw);
        self.ww.merge(&other.ww);
        match (&mut self.weighted, &other.weighted) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, None) => {}
            _ => panic!("cannot merge weighted with unweighted parts"),
        }
        match (&mut self.exv, &other.exv) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, None) => {}
            _ => panic!("cannot merge exv-tracking with plain parts"),
        }
    }

    /// The summed distance histogram over every partial. Used to size the
    /// final axis.
    #[must_use]
    pub fn total(&self) -> Distribution1D {
        let mut total = self.aa.sum_over_types();
        total.merge(&self.aw.sum_over_types());
        total.merge(&self.ww);
        if let Some(exv) = &self.exv {
            total.merge(&exv.ax.sum_over_types());
            total.merge(&exv.xx);
            total.merge(&exv.wx);
        }
        total
    }
}

// per-partial sinc-weighted sums: S[..., q] = Σ_d P[..., d] · sinc(q·d)
struct SincSums {
    aa: Array3<f64>,
    aw: Array2<f64>,
    ww: Array1<f64>,
    ax: Option<Array2<f64>>,
    xx: Option<Array1<f64>>,
    wx: Option<Array1<f64>>,
}

fn sinc_sum_1d(partial: &Distribution1D, sinc: &SincTable) -> Array1<f64> {
    Array1::from_iter((0..sinc.q_bins()).map(|qbin| partial.counts().dot(&sinc.row(qbin))))
}

fn sinc_sum_2d(partial: &Distribution2D, sinc: &SincTable) -> Array2<f64> {
    let mut sums = Array2::zeros((partial.types(), sinc.q_bins()));
    for t in 0..partial.types() {
        for qbin in 0..sinc.q_bins() {
            sums[[t, qbin]] = partial.row(t).dot(&sinc.row(qbin));
        }
    }
    sums
}

fn sinc_sum_3d(partial: &Distribution3D, sinc: &SincTable) -> Array3<f64> {
    let mut sums = Array3::zeros((partial.types(), partial.types(), sinc.q_bins()));
    for t1 in 0..partial.types() {
        for t2 in 0..partial.types() {
            let row = partial.row(t1, t2);
            for qbin in 0..sinc.q_bins() {
                sums[[t1, t2, qbin]] = row.dot(&sinc.row(qbin));
            }
        }
    }
    sums
}

/// A composite distance histogram: the partials of one structure plus the
/// free parameters of the intensity model.
///
/// Partials are fixed at construction; only the free parameters change
/// afterwards. The expensive distance sums are therefore cached per
/// (type-pair, q) at construction, and parameter changes cost O(N_q)
/// per evaluation instead of a rescan.
pub struct CompositeDistanceHistogram {
    d_axis: Axis,
    bin_values: Vec<f64>,
    q: Vec<f64>,
    p_aa: Distribution3D,
    p_aw: Distribution2D,
    p_ww: Distribution1D,
    exv: Option<ExvPartials>,
    products: FormFactorProducts,
    sums: SincSums,
    cw: f64,
    cx: f64,
    crho: f64,
    sigma_a: f64,
    sigma_x: f64,
}

impl CompositeDistanceHistogram {
    /// Assemble a composite histogram from build output.
    ///
    /// Trailing all-zero distance bins are dropped (down to a small
    /// floor), the representative distance of each kept bin is fixed
    /// (weighted mean for weighted builds, nominal bin value otherwise),
    /// and the sinc and form-factor-product tables are precomputed on
    /// `q`.
    ///
    /// # Panics
    ///
    /// Panics if `d_axis` does not span the partials.
    #[must_use]
    pub fn new(parts: HistogramParts, d_axis: &Axis, q: Vec<f64>) -> Self {
        assert_eq!(d_axis.bins(), parts.aa.bins());
        let bins = parts.total().significant_bins();
        let d_axis = d_axis.truncated(bins);

        let p_aa = parts.aa.truncated(bins);
        let p_aw = parts.aw.truncated(bins);
        let p_ww = parts.ww.truncated(bins);
        let exv = parts.exv.map(|exv| ExvPartials {
            ax: exv.ax.truncated(bins),
            xx: exv.xx.truncated(bins),
            wx: exv.wx.truncated(bins),
            volume: exv.volume,
        });

        // weighted builds bin round-to-nearest, so the nominal value of
        // bin b is its left edge b·w; floor-binned builds center it
        let bin_values = parts.weighted.as_ref().map_or_else(
            || d_axis.centers(),
            |weighted| weighted.truncated(bins).means(&d_axis.edges()),
        );

        let cached = CachedSincTable::new(&q, &bin_values);
        let sinc = cached.table();
        let products =
            FormFactorProducts::new(&q, exv.as_ref().map_or(1.0, |exv| exv.volume));
        let sums = SincSums {
            aa: sinc_sum_3d(&p_aa, sinc),
            aw: sinc_sum_2d(&p_aw, sinc),
            ww: sinc_sum_1d(&p_ww, sinc),
            ax: exv.as_ref().map(|exv| sinc_sum_2d(&exv.ax, sinc)),
            xx: exv.as_ref().map(|exv| sinc_sum_1d(&exv.xx, sinc)),
            wx: exv.as_ref().map(|exv| sinc_sum_1d(&exv.wx, sinc)),
        };

        Self {
            d_axis,
            bin_values,
            q,
            p_aa,
            p_aw,
            p_ww,
            exv,
            products,
            sums,
            cw: 1.0,
            cx: 1.0,
            crho: 1.0,
            sigma_a: 0.0,
            sigma_x: 0.0,
        }
    }

    /// The (truncated) distance axis.
    #[must_use]
    pub const fn d_axis(&self) -> &Axis {
        &self.d_axis
    }

    /// The representative distance of each bin.
    #[must_use]
    pub fn bin_values(&self) -> &[f64] {
        &self.bin_values
    }

    /// The q sampling of the intensity profiles.
    #[must_use]
    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// Whether excluded-volume partials are present.
    #[must_use]
    pub const fn has_exv(&self) -> bool {
        self.exv.is_some()
    }

    /// Atom–atom counts summed over type pairs.
    #[must_use]
    pub fn aa_counts(&self) -> Distribution1D {
        self.p_aa.sum_over_types()
    }

    /// Atom–water counts summed over types.
    #[must_use]
    pub fn aw_counts(&self) -> Distribution1D {
        self.p_aw.sum_over_types()
    }

    /// Water–water counts.
    #[must_use]
    pub const fn ww_counts(&self) -> &Distribution1D {
        &self.p_ww
    }

    /// The atomic total with the current water scaling applied:
    /// p_aa + 2·c_w·p_aw + c_w²·p_ww per bin.
    #[must_use]
    pub fn total_counts(&self) -> Vec<f64> {
        let aa = self.aa_counts();
        let aw = self.aw_counts();
        (0..self.d_axis.bins())
            .map(|bin| {
                (self.cw * self.cw).mul_add(
                    self.p_ww.get(bin),
                    (2.0 * self.cw).mul_add(aw.get(bin), aa.get(bin)),
                )
            })
            .collect()
    }

    /// Scale the hydration-shell contribution by `k`.
    pub fn apply_water_scaling_factor(&mut self, k: f64) {
        self.cw = k;
    }

    /// Restore the hydration scaling to 1.
    pub fn reset_water_scaling_factor(&mut self) {
        self.cw = 1.0;
    }

    /// Scale the excluded-volume contribution by `k`.
    pub fn apply_excluded_volume_scaling_factor(&mut self, k: f64) {
        self.cx = k;
    }

    /// Scale the solvent electron density entering the dummy form factors
    /// by `k`.
    pub fn apply_solvent_density_scaling_factor(&mut self, k: f64) {
        self.crho = k;
    }

    /// Dampen atomic contributions with a Debye–Waller factor of width
    /// `sigma` (Å).
    pub fn apply_atomic_debye_waller_factor(&mut self, sigma: f64) {
        self.sigma_a = sigma;
    }

    /// Dampen excluded-volume contributions with a Debye–Waller factor of
    /// width `sigma` (Å).
    pub fn apply_exv_debye_waller_factor(&mut self, sigma: f64) {
        self.sigma_x = sigma;
    }

    // amplitude-level damping factors; squared on like-like terms
    fn damping(&self, q: f64) -> (f64, f64) {
        let ga = (-q * q * self.sigma_a * self.sigma_a / 4.0).exp();
        let gx = (-q * q * self.sigma_x * self.sigma_x / 4.0).exp();
        (ga, gx)
    }

    fn profile<F: FnMut(usize, f64, f64) -> f64>(&self, mut term: F) -> ScatteringProfile {
        let intensity = self
            .q
            .iter()
            .enumerate()
            .map(|(qbin, &q)| {
                let (ga, gx) = self.damping(q);
                term(qbin, ga, gx)
            })
            .collect();
        ScatteringProfile::new(self.q.clone(), intensity)
    }

    fn aa_term(&self, qbin: usize, ga: f64) -> f64 {
        let mut sum = 0.0;
        for t1 in FormFactorType::iter_atomic() {
            for t2 in FormFactorType::iter_atomic() {
                sum += self.sums.aa[[t1.as_index(), t2.as_index(), qbin]]
                    * self.products.aa(t1, t2, qbin);
            }
        }
        sum * ga * ga
    }

    fn aw_term(&self, qbin: usize, ga: f64) -> f64 {
        let mut sum = 0.0;
        for t in FormFactorType::iter_atomic() {
            sum += self.sums.aw[[t.as_index(), qbin]] * self.products.aa(t, WATER, qbin);
        }
        2.0 * self.cw * sum * ga
    }

    fn ww_term(&self, qbin: usize) -> f64 {
        self.cw * self.cw * self.sums.ww[qbin] * self.products.aa(WATER, WATER, qbin)
    }

    fn ax_term(&self, qbin: usize, ga: f64, gx: f64) -> f64 {
        let Some(ax) = &self.sums.ax else {
            return 0.0;
        };
        let mut sum = 0.0;
        for t in FormFactorType::iter_atomic() {
            sum += ax[[t.as_index(), qbin]] * self.products.ax(t, qbin);
        }
        -2.0 * self.cx * self.crho * sum * ga * gx
    }

    fn xx_term(&self, qbin: usize, gx: f64) -> f64 {
        self.sums.xx.as_ref().map_or(0.0, |xx| {
            (self.cx * self.crho).powi(2) * xx[qbin] * self.products.xx(qbin) * gx * gx
        })
    }

    fn wx_term(&self, qbin: usize, gx: f64) -> f64 {
        self.sums.wx.as_ref().map_or(0.0, |wx| {
            -2.0 * self.cw * self.cx * self.crho
                * wx[qbin]
                * self.products.ax(WATER, qbin)
                * gx
        })
    }

    /// The full Debye transform I(q) with the current free parameters.
    #[must_use]
    pub fn debye_transform(&self) -> ScatteringProfile {
        self.profile(|qbin, ga, gx| {
            self.aa_term(qbin, ga)
                + self.aw_term(qbin, ga)
                + self.ww_term(qbin)
                + self.ax_term(qbin, ga, gx)
                + self.xx_term(qbin, gx)
                + self.wx_term(qbin, gx)
        })
    }

    /// The atom–atom contribution alone.
    #[must_use]
    pub fn profile_aa(&self) -> ScatteringProfile {
        self.profile(|qbin, ga, _| self.aa_term(qbin, ga))
    }

    /// The atom–water contribution alone.
    #[must_use]
    pub fn profile_aw(&self) -> ScatteringProfile {
        self.profile(|qbin, ga, _| self.aw_term(qbin, ga))
    }

    /// The water–water contribution alone.
    #[must_use]
    pub fn profile_ww(&self) -> ScatteringProfile {
        self.profile(|qbin, _, _| self.ww_term(qbin))
    }

    /// The atom–dummy contribution alone. Zero without exv partials.
    #[must_use]
    pub fn profile_ax(&self) -> ScatteringProfile {
        self.profile(|qbin, ga, gx| self.ax_term(qbin, ga, gx))
    }

    /// The dummy–dummy contribution alone. Zero without exv partials.
    #[must_use]
    pub fn profile_xx(&self) -> ScatteringProfile {
        self.profile(|qbin, _, gx| self.xx_term(qbin, gx))
    }

    /// The water–dummy contribution alone. Zero without exv partials.
    #[must_use]
    pub fn profile_wx(&self) -> ScatteringProfile {
        self.profile(|qbin, _, gx| self.wx_term(qbin, gx))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::form_factor::form_factor;
    use float_cmp::assert_approx_eq;

    fn q_samples() -> Vec<f64> {
        (1..=20).map(|i| f64::from(i) * 0.025).collect()
    }

    fn single_carbon_parts(bins: usize) -> HistogramParts {
        let mut parts = HistogramParts::new(bins, true);
        let c = FormFactorType::C.as_index();
        parts.aa.add(c, c, 0, 1.0);
        parts.weighted.as_mut().unwrap().add(0, 1.0, 0.0);
        parts
    }

    #[test]
    fn single_atom_intensity_is_the_squared_form_factor() {
        let parts = single_carbon_parts(64);
        let axis = Axis::from_width(1.0, 64);
        let composite = CompositeDistanceHistogram::new(parts, &axis, q_samples());
        let profile = composite.debye_transform();
        for (&q, &intensity) in q_samples().iter().zip(profile.intensity()) {
            let f = form_factor(FormFactorType::C).evaluate(q);
            assert_approx_eq!(f64, intensity, f * f, epsilon = 1e-9);
        }
    }

    #[test]
    fn trailing_zeros_are_truncated() {
        let parts = single_carbon_parts(1000);
        let axis = Axis::from_width(1.0, 1000);
        let composite = CompositeDistanceHistogram::new(parts, &axis, q_samples());
        assert_eq!(composite.d_axis().bins(), crate::histogram::MIN_BINS);
        assert_eq!(composite.bin_values().len(), crate::histogram::MIN_BINS);
    }

    #[test]
    fn per_term_profiles_sum_to_the_total() {
        let bins = 32;
        let mut parts = HistogramParts::with_exv(bins, true, 16.44);
        let c = FormFactorType::C.as_index();
        let o = FormFactorType::O.as_index();
        parts.aa.add(c, c, 0, 2.0);
        parts.aa.add(c, o, 5, 4.0);
        parts.aa.add(o, c, 5, 4.0);
        parts.aw.add(c, 3, 2.0);
        parts.ww.add(0, 1.0);
        let weighted = parts.weighted.as_mut().unwrap();
        weighted.add(0, 3.0, 0.0);
        weighted.add(5, 8.0, 5.2);
        weighted.add(3, 2.0, 2.9);
        let exv = parts.exv.as_mut().unwrap();
        exv.ax.add(c, 2, 3.0);
        exv.xx.add(0, 2.0);
        exv.wx.add(4, 1.0);

        let axis = Axis::from_width(1.0, bins);
        let mut composite = CompositeDistanceHistogram::new(parts, &axis, q_samples());
        composite.apply_water_scaling_factor(1.7);
        composite.apply_excluded_volume_scaling_factor(1.1);
        composite.apply_atomic_debye_waller_factor(0.8);
        composite.apply_exv_debye_waller_factor(0.4);

        let total = composite.debye_transform();
        let mut summed = composite.profile_aa();
        summed.add(&composite.profile_aw());
        summed.add(&composite.profile_ww());
        summed.add(&composite.profile_ax());
        summed.add(&composite.profile_xx());
        summed.add(&composite.profile_wx());
        for (&total, &summed) in total.intensity().iter().zip(summed.intensity()) {
            assert_approx_eq!(f64, total, summed, epsilon = 1e-6 * total.abs().max(1.0));
        }
    }

    #[test]
    fn water_scaling_scales_counts_quadratically() {
        let bins = 16;
        let mut parts = HistogramParts::new(bins, false);
        let c = FormFactorType::C.as_index();
        parts.aa.add(c, c, 0, 1.0);
        parts.aw.add(c, 2, 3.0);
        parts.ww.add(1, 2.0);
        let axis = Axis::from_width(1.0, bins);
        let mut composite = CompositeDistanceHistogram::new(parts, &axis, q_samples());

        let aa = composite.aa_counts();
        let aw = composite.aw_counts();
        let ww = composite.ww_counts().clone();
        composite.apply_water_scaling_factor(2.0);
        let total = composite.total_counts();
        for bin in 0..composite.d_axis().bins() {
            assert_approx_eq!(
                f64,
                total[bin],
                4.0_f64.mul_add(ww.get(bin), aa.get(bin) + 4.0 * aw.get(bin)),
                epsilon = 1e-12
            );
        }

        composite.reset_water_scaling_factor();
        let total = composite.total_counts();
        for bin in 0..composite.d_axis().bins() {
            assert_approx_eq!(
                f64,
                total[bin],
                ww.get(bin) + 2.0_f64.mul_add(aw.get(bin), aa.get(bin)),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn exv_subtraction_at_coincident_points() {
        // one carbon and one dummy at the same position: I(q) must equal
        // (f_C(q) − ρ_w·V·e^{−V^{2/3}q²/4π})² with c_x = 1
        let bins = 16;
        let volume = 16.44;
        let mut parts = HistogramParts::with_exv(bins, true, volume);
        let c = FormFactorType::C.as_index();
        parts.aa.add(c, c, 0, 1.0);
        let exv = parts.exv.as_mut().unwrap();
        exv.ax.add(c, 0, 1.0);
        exv.xx.add(0, 1.0);
        let weighted = parts.weighted.as_mut().unwrap();
        weighted.add(0, 3.0, 0.0);

        let axis = Axis::from_width(1.0, bins);
        let composite = CompositeDistanceHistogram::new(parts, &axis, q_samples());
        let profile = composite.debye_transform();
        let exv_ff = crate::form_factor::ExvFormFactor::new(volume);
        for (&q, &intensity) in q_samples().iter().zip(profile.intensity()) {
            let difference = form_factor(FormFactorType::C).evaluate(q) - exv_ff.evaluate(q);
            assert_approx_eq!(f64, intensity, difference * difference, epsilon = 1e-9);
        }
    }
}
