//! Flat run configuration.

use crate::axis::{log_spaced, Axis};
use crate::constants::{self, DisplacedVolumeSet};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Choice of displaced-volume table for excluded-volume dummies.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ExvTableChoice {
    /// Traube additive volumes.
    #[default]
    Traube,
    /// Voronoi-cell volumes with implicit hydrogens.
    VoronoiImplicitH,
    /// Minimum-fluctuation volumes with implicit hydrogens.
    MinimumFluctuation,
    /// Spheres from the group van-der-Waals radii.
    Vdw,
    /// Whatever table was installed with
    /// [`constants::set_displaced_volumes`].
    Custom,
}

impl ExvTableChoice {
    /// Resolve the choice to a concrete volume set.
    #[must_use]
    pub fn resolve(self) -> DisplacedVolumeSet {
        match self {
            Self::Traube => constants::TRAUBE,
            Self::VoronoiImplicitH => constants::VORONOI_IMPLICIT_H,
            Self::MinimumFluctuation => constants::MINIMUM_FLUCTUATION_IMPLICIT_H,
            Self::Vdw => constants::vdw_volume_set(),
            Self::Custom => constants::displaced_volumes(),
        }
    }
}

/// Choice of histogram-manager strategy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum HistogramManagerChoice {
    /// Full rebuild on every calculation, one thread.
    SingleThreaded,
    /// Full rebuild on every calculation, work split over the pool.
    #[default]
    MultiThreaded,
    /// Incremental rebuild of changed partials, one thread.
    PartialSingleThreaded,
    /// Incremental rebuild of changed partials, work split over the pool.
    PartialMultiThreaded,
    /// Full rebuild with grid-derived excluded-volume dummies.
    GridMultiThreaded,
    /// Like [`Self::GridMultiThreaded`], with the dummy set split into
    /// interior and surface for a separate surface scale factor.
    GridSurfaceMultiThreaded,
    /// Full rebuild with bodies replicated under their symmetry
    /// descriptors.
    Symmetry,
}

/// All recognized configuration keys, with their defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Lower q cutoff in Å⁻¹.
    pub q_min: f64,
    /// Upper q cutoff in Å⁻¹.
    pub q_max: f64,
    /// Number of q samples between `q_min` and `q_max`.
    pub q_bins: usize,
    /// Sample the q-axis logarithmically instead of linearly.
    pub log_spaced_q: bool,
    /// Distance-axis bin width in Å.
    pub bin_width: f64,
    /// Number of distance bins. The spanned range `bin_width * bin_count`
    /// must cover the molecule diameter.
    pub bin_count: usize,
    /// Worker threads for multi-threaded builds. Zero means the hardware
    /// thread count.
    pub threads: usize,
    /// Promote heavy atoms to implicit-hydrogen group types.
    pub implicit_hydrogens: bool,
    /// Translate the molecule so its center of mass sits at the origin.
    pub center_molecule: bool,
    /// Fit the excluded-volume scale factor c_x in addition to c_w.
    pub fit_excluded_volume: bool,
    /// Displaced-volume table for excluded-volume dummies.
    pub exv_set: ExvTableChoice,
    /// Voxel edge length of the excluded-volume grid, in Å.
    pub grid_width: f64,
    /// Fixed radius for marking atomic volume cells, in Å. Zero uses the
    /// per-type van-der-Waals radii.
    pub exv_radius: f64,
    /// Minimum excluded-volume radius, in Å. Cells between an atom's
    /// van-der-Waals radius and this radius are marked as displaced
    /// volume. Zero disables the extra shell.
    pub min_exv_radius: f64,
    /// Thickness of the detected surface layer, in Å.
    pub surface_thickness: f64,
    /// Relabel fully enclosed empty cavities as vacuum and count them as
    /// displaced volume.
    pub vacuum_detection: bool,
    /// Track per-bin mean distances and bin round-to-nearest instead of
    /// flooring.
    pub weighted_bins: bool,
    /// Histogram-manager strategy.
    pub histogram_manager: HistogramManagerChoice,
    /// Map unknown element symbols to the generic type instead of
    /// failing.
    pub allow_unknown_atoms: bool,
    /// Evaluation cap for fit minimizers.
    pub max_iterations: usize,
    /// Relative χ² change below which a fit counts as converged.
    pub fit_tolerance: f64,
    /// Bounds for the hydration scale factor c_w.
    pub cw_limits: (f64, f64),
    /// Bounds for the excluded-volume scale factor c_x.
    pub cx_limits: (f64, f64),
    /// Bounds for the Debye–Waller σ parameters, in Å.
    pub sigma_limits: (f64, f64),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            q_min: 1e-4,
            q_max: 0.5,
            q_bins: 400,
            log_spaced_q: false,
            bin_width: 1.0,
            bin_count: 8000,
            threads: 0,
            implicit_hydrogens: true,
            center_molecule: true,
            fit_excluded_volume: false,
            exv_set: ExvTableChoice::default(),
            grid_width: 1.0,
            exv_radius: 0.0,
            min_exv_radius: 0.0,
            surface_thickness: 1.0,
            vacuum_detection: false,
            weighted_bins: true,
            histogram_manager: HistogramManagerChoice::default(),
            allow_unknown_atoms: false,
            max_iterations: 100,
            fit_tolerance: 1e-4,
            cw_limits: (0.0, 10.0),
            cx_limits: (0.8, 1.25),
            sigma_limits: (0.0, 5.0),
        }
    }
}

impl Settings {
    /// The distance axis implied by `bin_width` and `bin_count`.
    #[must_use]
    pub fn d_axis(&self) -> Axis {
        Axis::from_width(self.bin_width, self.bin_count)
    }

    /// The q sample values implied by the q keys.
    #[must_use]
    pub fn q_values(&self) -> Vec<f64> {
        if self.log_spaced_q {
            log_spaced(self.q_min, self.q_max, self.q_bins)
        } else {
            let axis = Axis::new(self.q_min, self.q_max, self.q_bins);
            axis.centers()
        }
    }

    /// Check the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for out-of-range values or contradictory
    /// flag combinations.
    pub fn validate(&self) -> Result<()> {
        if self.q_min >= self.q_max {
            return Err(Error::Config(format!(
                "q_min ({}) must be below q_max ({})",
                self.q_min, self.q_max
            )));
        }
        if self.q_min <= 0.0 {
            return Err(Error::Config("q_min must be positive".into()));
        }
        if self.q_max > 1.0 {
            return Err(Error::Config(
                "q_max beyond 1 Å⁻¹ exceeds the supported resolution".into(),
            ));
        }
        if self.bin_width <= 0.0 || self.bin_count == 0 {
            return Err(Error::Config(
                "the distance axis must have positive width and at least one bin".into(),
            ));
        }
        if self.q_bins < 2 {
            return Err(Error::Config("at least two q samples are required".into()));
        }
        if self.grid_width <= 0.0 {
            return Err(Error::Config("grid_width must be positive".into()));
        }
        if self.min_exv_radius < 0.0 || self.exv_radius < 0.0 || self.surface_thickness < 0.0 {
            return Err(Error::Config("radii must be non-negative".into()));
        }
        if self.cw_limits.0 < 0.0 || self.cw_limits.0 >= self.cw_limits.1 {
            return Err(Error::Config(
                "c_w limits must satisfy 0 <= min < max".into(),
            ));
        }
        if self.cx_limits.0 <= 0.0 || self.cx_limits.0 >= self.cx_limits.1 {
            return Err(Error::Config("c_x limits must satisfy 0 < min < max".into()));
        }
        if self.fit_excluded_volume
            && matches!(
                self.histogram_manager,
                HistogramManagerChoice::PartialSingleThreaded
                    | HistogramManagerChoice::PartialMultiThreaded
            )
        {
            return Err(Error::Config(
                "excluded-volume fitting requires a full or grid manager; \
                 the incremental managers track atomic partials only"
                    .into(),
            ));
        }
        Ok(())
    }
}
