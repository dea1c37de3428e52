//! The histogram-manager interface and its closed variant set.
//!
//! Every strategy shares one contract: given a molecule, produce the
//! composite distance histogram of its current conformation. The variants
//! differ in how much work they redo per call and where the
//! excluded-volume dummies come from.

use crate::body::Molecule;
use crate::compact::CompactCoordinates;
use crate::composite::CompositeDistanceHistogram;
use crate::config::{HistogramManagerChoice, Settings};
use crate::constants::DisplacedVolumeSet;
use crate::error::{Error, Result};
use crate::form_factor::FormFactorType;
use crate::grid_manager::GridManager;
use crate::histogram::MIN_BINS;
use crate::mt_manager::MtManager;
use crate::partial_manager::PartialManager;
use crate::simple_manager::SimpleManager;
use crate::state::{BoundSignaller, StateManager};
use crate::symmetry_manager::SymmetryManager;
use enum_dispatch::enum_dispatch;
use std::sync::Arc;

/// Strategy interface for turning a molecule into a composite histogram.
#[enum_dispatch]
pub trait HistogramManager {
    /// Build (or update) all partials and assemble the composite
    /// histogram.
    ///
    /// Returns only after all thread-local partials are merged.
    ///
    /// # Errors
    ///
    /// Propagates configuration, geometry and input errors from the
    /// build.
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram>;

    /// The change-tracking state, for incremental variants.
    fn state_manager(&self) -> Option<&StateManager> {
        None
    }

    /// A signaller bound to body slot `slot`, for incremental variants.
    fn probe(&self, slot: usize) -> Option<Arc<BoundSignaller>> {
        self.state_manager().map(|state| state.probe(slot))
    }

    /// Mark the hydration shell as changed, for incremental variants.
    fn signal_modified_hydration_layer(&self) {
        if let Some(state) = self.state_manager() {
            state.signal_modified_hydration();
        }
    }
}

/// The closed set of manager strategies.
#[enum_dispatch(HistogramManager)]
pub enum HistogramManagerEnum {
    /// Full single-threaded rebuild.
    SimpleManager,
    /// Full multi-threaded rebuild.
    MtManager,
    /// Incremental rebuild driven by change signals.
    PartialManager,
    /// Full rebuild with symmetry replication.
    SymmetryManager,
    /// Full rebuild with grid-derived excluded-volume dummies.
    GridManager,
}

/// Construct the manager selected by `settings.histogram_manager`.
/// Incremental variants bind their change signallers into `molecule`.
#[must_use]
pub fn manager_for(settings: &Settings, molecule: &mut Molecule) -> HistogramManagerEnum {
    match settings.histogram_manager {
        HistogramManagerChoice::SingleThreaded => SimpleManager::new(settings.clone()).into(),
        HistogramManagerChoice::MultiThreaded => MtManager::new(settings.clone()).into(),
        HistogramManagerChoice::PartialSingleThreaded => {
            PartialManager::new(settings.clone(), false, molecule).into()
        }
        HistogramManagerChoice::PartialMultiThreaded => {
            PartialManager::new(settings.clone(), true, molecule).into()
        }
        HistogramManagerChoice::GridMultiThreaded => {
            GridManager::new(settings.clone(), false).into()
        }
        HistogramManagerChoice::GridSurfaceMultiThreaded => {
            GridManager::new(settings.clone(), true).into()
        }
        HistogramManagerChoice::Symmetry => SymmetryManager::new(settings.clone()).into(),
    }
}

/// The number of distance bins needed to hold every pair distance between
/// points of `buffers`, with a small slack.
pub(crate) fn required_bins(buffers: &[&CompactCoordinates], bin_width: f64) -> usize {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for buffer in buffers {
        if let Some((lo, hi)) = buffer.bounds() {
            for axis in 0..3 {
                min[axis] = min[axis].min(lo[axis]);
                max[axis] = max[axis].max(hi[axis]);
            }
        }
    }
    if min[0] > max[0] {
        return MIN_BINS;
    }
    let diameter = (0..3)
        .map(|axis| (max[axis] - min[axis]).powi(2))
        .sum::<f64>()
        .sqrt();
    ((diameter / bin_width).ceil() as usize + 2).max(MIN_BINS)
}

/// Check that the configured distance axis can hold `bins` bins.
pub(crate) fn check_axis_capacity(settings: &Settings, bins: usize) -> Result<()> {
    if bins > settings.bin_count {
        return Err(Error::Geometry(format!(
            "the molecule spans {bins} distance bins of {} Å but the axis is limited to {}; \
             raise bin_count or bin_width",
            settings.bin_width, settings.bin_count
        )));
    }
    Ok(())
}

/// One excluded-volume dummy per atom, at the atom position with unit
/// weight. The matching per-dummy volume is the average displaced volume
/// of the atoms under `table`.
pub(crate) fn simple_exv_points(
    molecule: &Molecule,
    table: &DisplacedVolumeSet,
) -> (CompactCoordinates, f64) {
    let mut dummies = CompactCoordinates::with_capacity(molecule.atom_count());
    let mut volume_sum = 0.0;
    let mut count = 0_usize;
    for body in molecule.bodies() {
        for point in body.atoms() {
            let mut dummy = *point;
            dummy.weight = 1.0;
            dummy.kind = FormFactorType::Exv;
            dummies.push(&dummy);
            volume_sum += table.get(point.kind);
            count += 1;
        }
    }
    let volume = if count == 0 {
        1.0
    } else {
        volume_sum / count as f64
    };
    (dummies, volume)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::{Body, PointFF};
    use crate::constants::TRAUBE;

    #[test]
    fn required_bins_covers_the_diameter() {
        let data = CompactCoordinates::from_points(&[
            PointFF::new(0.0, 0.0, 0.0, 1.0, FormFactorType::C),
            PointFF::new(30.0, 0.0, 0.0, 1.0, FormFactorType::C),
        ]);
        let bins = required_bins(&[&data], 1.0);
        assert!(bins >= 30 && bins <= 35);
        assert_eq!(required_bins(&[], 1.0), MIN_BINS);
    }

    #[test]
    fn axis_capacity_is_enforced() {
        let settings = Settings {
            bin_count: 20,
            ..Settings::default()
        };
        assert!(check_axis_capacity(&settings, 20).is_ok());
        assert!(check_axis_capacity(&settings, 21).is_err());
    }

    #[test]
    fn simple_exv_mirrors_atom_positions() {
        let molecule = Molecule::new(vec![Body::new(vec![
            PointFF::new(1.0, 2.0, 3.0, 6.0, FormFactorType::C),
            PointFF::new(0.0, 0.0, 0.0, 8.0, FormFactorType::O),
        ])]);
        let (dummies, volume) = simple_exv_points(&molecule, &TRAUBE);
        assert_eq!(dummies.len(), 2);
        assert!((dummies.weight(0) - 1.0).abs() < 1e-12);
        assert_eq!(dummies.type_index(0), FormFactorType::Exv.as_index());
        assert!((volume - (TRAUBE.c + TRAUBE.o) / 2.0).abs() < 1e-12);
    }
}
