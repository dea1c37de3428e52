//! The full multi-threaded histogram builder.
//!
//! The outer point index of every term is split into row chunks; each
//! chunk accumulates into a thread-local partial set, and the locals are
//! summed once all chunks are done. Counts are identical to the serial
//! build up to floating-point associativity.

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
use crate::pool;
use rayon::prelude::*;
use std::ops::Range;

// rows per scheduled chunk
const JOB_SIZE: usize = 64;

/// Builds every partial from scratch on each call, splitting the work
/// over the shared pool.
pub struct MtManager {
    settings: Settings,
}

impl MtManager {
    /// A manager with the given configuration.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[derive(Clone)]
enum Job {
    AaRows(Range<usize>),
    AwRows(Range<usize>),
    WwRows(Range<usize>),
    AxRows(Range<usize>),
    XxRows(Range<usize>),
    WxRows(Range<usize>),
}

fn chunked(rows: usize, make: impl Fn(Range<usize>) -> Job, jobs: &mut Vec<Job>) {
    let mut start = 0;
    while start < rows {
        let end = (start + JOB_SIZE).min(rows);
        jobs.push(make(start..end));
        start = end;
    }
}

struct Buffers<'a> {
    atoms: &'a CompactCoordinates,
    waters: &'a CompactCoordinates,
    dummies: Option<&'a CompactCoordinates>,
    inv_width: f64,
}

fn run_job<const WEIGHTED: bool>(
    job: Job,
    buffers: &Buffers<'_>,
    parts: &mut HistogramParts,
    tracker: &mut WeightedBins,
) {
    let inv_width = buffers.inv_width;
    match job {
        Job::AaRows(rows) => {
            if rows.start == 0 {
                compact::self_terms::<_, WEIGHTED>(&mut parts.aa, tracker, 1.0, buffers.atoms);
            }
            compact::pairs_within::<_, WEIGHTED>(
                &mut parts.aa,
                tracker,
                inv_width,
                1.0,
                buffers.atoms,
                rows,
            );
        }
        Job::AwRows(rows) => {
            compact::pairs_between::<_, WEIGHTED>(
                &mut parts.aw,
                tracker,
                inv_width,
                1.0,
                buffers.atoms,
                rows,
                buffers.waters,
            );
        }
        Job::WwRows(rows) => {
            if rows.start == 0 {
                compact::self_terms::<_, WEIGHTED>(&mut parts.ww, tracker, 1.0, buffers.waters);
            }
            compact::pairs_within::<_, WEIGHTED>(
                &mut parts.ww,
                tracker,
                inv_width,
                1.0,
                buffers.waters,
                rows,
            );
        }
        Job::AxRows(rows) => {
            let exv = parts.exv.as_mut().unwrap();
            compact::pairs_between::<_, WEIGHTED>(
                &mut exv.ax,
                tracker,
                inv_width,
                1.0,
                buffers.atoms,
                rows,
                buffers.dummies.unwrap(),
            );
        }
        Job::XxRows(rows) => {
            let exv = parts.exv.as_mut().unwrap();
            let dummies = buffers.dummies.unwrap();
            if rows.start == 0 {
                compact::self_terms::<_, WEIGHTED>(&mut exv.xx, tracker, 1.0, dummies);
            }
            compact::pairs_within::<_, WEIGHTED>(
                &mut exv.xx,
                tracker,
                inv_width,
                1.0,
                dummies,
                rows,
            );
        }
        Job::WxRows(rows) => {
            let exv = parts.exv.as_mut().unwrap();
            compact::pairs_between::<_, WEIGHTED>(
                &mut exv.wx,
                tracker,
                inv_width,
                1.0,
                buffers.waters,
                rows,
                buffers.dummies.unwrap(),
            );
        }
    }
}

/// Build all partials from the three point buffers on the shared pool.
pub(crate) fn build_parallel<const WEIGHTED: bool>(
    atoms: &CompactCoordinates,
    waters: &CompactCoordinates,
    dummies: Option<(&CompactCoordinates, f64)>,
    bins: usize,
    inv_width: f64,
) -> HistogramParts {
    let buffers = Buffers {
        atoms,
        waters,
        dummies: dummies.map(|(dummies, _)| dummies),
        inv_width,
    };
    let volume = dummies.map(|(_, volume)| volume);

    let mut jobs = Vec::new();
    chunked(atoms.len(), Job::AaRows, &mut jobs);
    chunked(atoms.len(), Job::AwRows, &mut jobs);
    chunked(waters.len(), Job::WwRows, &mut jobs);
    if let Some(dummies) = buffers.dummies {
        chunked(atoms.len(), Job::AxRows, &mut jobs);
        chunked(dummies.len(), Job::XxRows, &mut jobs);
        chunked(waters.len(), Job::WxRows, &mut jobs);
    }

    // thread-local accumulation, weighted tracking kept separate so the
    // final parts carry exactly one tracker
    let make_local = || {
        let parts = match volume {
            Some(volume) => HistogramParts::with_exv(bins, false, volume),
            None => HistogramParts::new(bins, false),
        };
        (parts, WeightedBins::new(bins))
    };

    let (mut parts, tracker) = pool::pool().install(|| {
        jobs.into_par_iter()
            .fold(make_local, |(mut parts, mut tracker), job| {
                run_job::<WEIGHTED>(job, &buffers, &mut parts, &mut tracker);
                (parts, tracker)
            })
            .reduce(make_local, |(mut parts, mut tracker), (other, other_tracker)| {
                parts.merge(&other);
                tracker.merge(&other_tracker);
                (parts, tracker)
            })
    });

    if WEIGHTED {
        parts.weighted = Some(tracker);
    }
    parts
}

impl HistogramManager for MtManager {
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram> {
        self.settings.validate()?;
        pool::initialize(self.settings.threads);
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
            build_parallel::<true>(&atoms, &waters, dummies, bins, inv_width)
        } else {
            build_parallel::<false>(&atoms, &waters, dummies, bins, inv_width)
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
    use crate::simple_manager::SimpleManager;
    use float_cmp::assert_approx_eq;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn random_molecule(atoms: usize, waters: usize, seed: u64) -> Molecule {
        let mut rng = Pcg64::seed_from_u64(seed);
        let pos = |rng: &mut Pcg64| {
            (
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-15.0..15.0),
                rng.gen_range(-15.0..15.0),
            )
        };
        let kinds = [
            FormFactorType::C,
            FormFactorType::N,
            FormFactorType::O,
            FormFactorType::CH2,
        ];
        let atom_points: Vec<PointFF> = (0..atoms)
            .map(|i| {
                let (x, y, z) = pos(&mut rng);
                PointFF::new(x, y, z, 1.0 + 0.1 * (i % 3) as f64, kinds[i % kinds.len()])
            })
            .collect();
        let water_points: Vec<PointFF> = (0..waters)
            .map(|_| {
                let (x, y, z) = pos(&mut rng);
                PointFF::new(x, y, z, 1.0, crate::form_factor::WATER)
            })
            .collect();
        Molecule::new(vec![Body::with_waters(atom_points, water_points)])
    }

    #[test]
    fn matches_the_serial_build() {
        let settings = Settings {
            fit_excluded_volume: true,
            ..Settings::default()
        };
        let mut molecule = random_molecule(200, 40, 7);
        let serial = SimpleManager::new(settings.clone())
            .calculate_all(&mut molecule)
            .unwrap();
        let parallel = MtManager::new(settings)
            .calculate_all(&mut molecule)
            .unwrap();

        assert_eq!(serial.d_axis(), parallel.d_axis());
        for bin in 0..serial.d_axis().bins() {
            assert_approx_eq!(
                f64,
                serial.aa_counts().get(bin),
                parallel.aa_counts().get(bin),
                epsilon = 1e-9
            );
            assert_approx_eq!(
                f64,
                serial.aw_counts().get(bin),
                parallel.aw_counts().get(bin),
                epsilon = 1e-9
            );
            assert_approx_eq!(
                f64,
                serial.ww_counts().get(bin),
                parallel.ww_counts().get(bin),
                epsilon = 1e-9
            );
        }
        // bin means agree to the weighted-bin tolerance
        for (serial, parallel) in serial.bin_values().iter().zip(parallel.bin_values()) {
            assert_approx_eq!(f64, *serial, *parallel, epsilon = 1e-6 * serial.max(1.0));
        }
    }
}
