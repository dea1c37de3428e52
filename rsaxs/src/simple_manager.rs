//! The full single-threaded histogram builder.

use crate::body::Molecule;
use crate::compact::{self, CompactCoordinates};
use crate::composite::{CompositeDistanceHistogram, HistogramParts};
use crate::config::Settings;
use crate::constants;
use crate::error::Result;
use crate::histogram::WeightedBins;
use crate::manager::{
    check_axis_capacity, required_bins, simple_exv_points, HistogramManager,
};

/// Builds every partial from scratch on each call, on the calling thread.
pub struct SimpleManager {
    settings: Settings,
}

impl SimpleManager {
    /// A manager with the given configuration.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

/// Build all partials from the three point buffers in one serial pass.
pub(crate) fn build_serial<const WEIGHTED: bool>(
    atoms: &CompactCoordinates,
    waters: &CompactCoordinates,
    dummies: Option<(&CompactCoordinates, f64)>,
    bins: usize,
    inv_width: f64,
) -> HistogramParts {
    let mut parts = match dummies {
        Some((_, volume)) => HistogramParts::with_exv(bins, WEIGHTED, volume),
        None => HistogramParts::new(bins, WEIGHTED),
    };
    let mut tracker = WeightedBins::new(bins);

    compact::self_terms::<_, WEIGHTED>(&mut parts.aa, &mut tracker, 1.0, atoms);
    compact::pairs_within::<_, WEIGHTED>(
        &mut parts.aa,
        &mut tracker,
        inv_width,
        1.0,
        atoms,
        0..atoms.len(),
    );

    compact::pairs_between::<_, WEIGHTED>(
        &mut parts.aw,
        &mut tracker,
        inv_width,
        1.0,
        atoms,
        0..atoms.len(),
        waters,
    );

    compact::self_terms::<_, WEIGHTED>(&mut parts.ww, &mut tracker, 1.0, waters);
    compact::pairs_within::<_, WEIGHTED>(
        &mut parts.ww,
        &mut tracker,
        inv_width,
        1.0,
        waters,
        0..waters.len(),
    );

    if let Some((dummies, _)) = dummies {
        let exv = parts.exv.as_mut().unwrap();
        compact::pairs_between::<_, WEIGHTED>(
            &mut exv.ax,
            &mut tracker,
            inv_width,
            1.0,
            atoms,
            0..atoms.len(),
            dummies,
        );
        compact::self_terms::<_, WEIGHTED>(&mut exv.xx, &mut tracker, 1.0, dummies);
        compact::pairs_within::<_, WEIGHTED>(
            &mut exv.xx,
            &mut tracker,
            inv_width,
            1.0,
            dummies,
            0..dummies.len(),
        );
        compact::pairs_between::<_, WEIGHTED>(
            &mut exv.wx,
            &mut tracker,
            inv_width,
            1.0,
            waters,
            0..waters.len(),
            dummies,
        );
    }

    if let Some(weighted) = &mut parts.weighted {
        *weighted = tracker;
    }
    parts
}

impl HistogramManager for SimpleManager {
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram> {
        self.settings.validate()?;
        // the displaced-volume table stays fixed for the whole build
        let volume_table = constants::displaced_volume_guard();

        let atoms = CompactCoordinates::from_bodies(molecule.bodies());
        let waters = CompactCoordinates::waters_from_bodies(molecule.bodies());
        let exv = self.settings.fit_excluded_volume.then(|| {
            let table = match self.settings.exv_set {
                crate::config::ExvTableChoice::Custom => *volume_table,
                choice => choice.resolve(),
            };
            simple_exv_points(molecule, &table)
        });

        let mut buffers = vec![&atoms, &waters];
        if let Some((dummies, _)) = &exv {
            buffers.push(dummies);
        }
        let bins = required_bins(&buffers, self.settings.bin_width);
        check_axis_capacity(&self.settings, bins)?;
        let d_axis = crate::axis::Axis::from_width(self.settings.bin_width, bins);
        let inv_width = 1.0 / self.settings.bin_width;

        let dummies = exv.as_ref().map(|(dummies, volume)| (dummies, *volume));
        let parts = if self.settings.weighted_bins {
            build_serial::<true>(&atoms, &waters, dummies, bins, inv_width)
        } else {
            build_serial::<false>(&atoms, &waters, dummies, bins, inv_width)
        };

        Ok(CompositeDistanceHistogram::new(
            parts,
            &d_axis,
            self.settings.q_values(),
        ))
    }
}
