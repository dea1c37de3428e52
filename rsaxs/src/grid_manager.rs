//! Full builders with grid-derived excluded-volume dummies.
//!
//! Instead of one dummy per atom, the displaced solvent is encoded by the
//! voxel grid: every volume cell contributes a dummy at its center. The
//! surface variant additionally classifies cells with the radial probe,
//! keeping the interior/surface split available on the dummy set.

use crate::body::Molecule;
use crate::compact::CompactCoordinates;
use crate::composite::CompositeDistanceHistogram;
use crate::config::Settings;
use crate::error::Result;
use crate::exv::{dummy_volume, exv_atoms};
use crate::grid::ensure_grid;
use crate::manager::{check_axis_capacity, required_bins, HistogramManager};
use crate::mt_manager::build_parallel;
use crate::pool;

/// Builds every partial from scratch with excluded-volume dummies taken
/// from the molecule's grid.
pub struct GridManager {
    settings: Settings,
    classify_surface: bool,
}

impl GridManager {
    /// A manager with the given configuration. With `classify_surface`,
    /// volume cells are split into interior and surface before the build.
    #[must_use]
    pub const fn new(settings: Settings, classify_surface: bool) -> Self {
        Self {
            settings,
            classify_surface,
        }
    }
}

impl HistogramManager for GridManager {
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram> {
        self.settings.validate()?;
        pool::initialize(self.settings.threads);

        ensure_grid(molecule, &self.settings)?;
        let atoms = CompactCoordinates::from_bodies(molecule.bodies());
        let waters = CompactCoordinates::waters_from_bodies(molecule.bodies());

        let (dummies, volume) = {
            let grid = molecule.grid_mut().unwrap();
            let set = exv_atoms(grid, &self.settings, self.classify_surface);
            let mut dummies = CompactCoordinates::with_capacity(set.len());
            for dummy in set.iter() {
                dummies.push(dummy);
            }
            (dummies, dummy_volume(grid))
        };

        let bins = required_bins(&[&atoms, &waters, &dummies], self.settings.bin_width);
        check_axis_capacity(&self.settings, bins)?;
        let d_axis = crate::axis::Axis::from_width(self.settings.bin_width, bins);
        let inv_width = 1.0 / self.settings.bin_width;

        let parts = if self.settings.weighted_bins {
            build_parallel::<true>(&atoms, &waters, Some((&dummies, volume)), bins, inv_width)
        } else {
            build_parallel::<false>(&atoms, &waters, Some((&dummies, volume)), bins, inv_width)
        };

        Ok(CompositeDistanceHistogram::new(
            parts,
            &d_axis,
            self.settings.q_values(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::{Body, PointFF};
    use crate::form_factor::FormFactorType;
    use float_cmp::assert_approx_eq;

    fn small_molecule() -> Molecule {
        Molecule::new(vec![Body::new(vec![
            PointFF::new(0.0, 0.0, 0.0, 1.0, FormFactorType::C),
            PointFF::new(3.0, 0.0, 0.0, 1.0, FormFactorType::N),
            PointFF::new(0.0, 3.0, 0.0, 1.0, FormFactorType::O),
        ])])
    }

    #[test]
    fn grid_build_produces_exv_partials() {
        let mut molecule = small_molecule();
        let mut manager = GridManager::new(Settings::default(), false);
        let histogram = manager.calculate_all(&mut molecule).unwrap();
        assert!(histogram.has_exv());

        // the grid volume subtracts from the forward intensity
        let with_exv = histogram.debye_transform().intensity()[0];
        let aa_only = histogram.profile_aa().intensity()[0];
        assert!(with_exv < aa_only);
    }

    #[test]
    fn surface_variant_matches_bulk_totals() {
        // classification redistributes cells between the two lists but
        // never changes the combined dummy set
        let mut molecule = small_molecule();
        let bulk = GridManager::new(Settings::default(), false)
            .calculate_all(&mut molecule)
            .unwrap();
        let mut molecule = small_molecule();
        let classified = GridManager::new(Settings::default(), true)
            .calculate_all(&mut molecule)
            .unwrap();

        assert_eq!(bulk.d_axis().bins(), classified.d_axis().bins());
        let bulk_profile = bulk.debye_transform();
        let classified_profile = classified.debye_transform();
        for (&a, &b) in bulk_profile
            .intensity()
            .iter()
            .zip(classified_profile.intensity())
        {
            assert_approx_eq!(f64, a, b, epsilon = 1e-9 * a.abs().max(1.0));
        }
    }

    #[test]
    fn cached_grid_is_reused_between_calls() {
        let mut molecule = small_molecule();
        let mut manager = GridManager::new(Settings::default(), false);
        manager.calculate_all(&mut molecule).unwrap();
        assert!(molecule.grid().is_some());
        let volume = molecule.grid().unwrap().volume_cells();
        manager.calculate_all(&mut molecule).unwrap();
        assert_eq!(molecule.grid().unwrap().volume_cells(), volume);
    }
}
