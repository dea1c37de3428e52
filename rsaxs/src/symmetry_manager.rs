//! The symmetry-aware histogram builder.
//!
//! Bodies carrying a symmetry descriptor are replicated under it, and the
//! histogram of the full assembly is assembled from a reduced set of
//! buffer pairs: separations between two images of the same body depend
//! only on the repetition offset, so one representative pair per offset is
//! computed and scaled by its multiplicity. Closed orbits fold offsets k
//! and m−k together.

use crate::body::{Body, Molecule, PointFF};
use crate::compact::{self, CompactCoordinates};
use crate::composite::{CompositeDistanceHistogram, HistogramParts};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::histogram::WeightedBins;
use crate::manager::{check_axis_capacity, required_bins, HistogramManager};
use crate::pool;
use rayon::prelude::*;

/// Builds the histogram of the symmetry-expanded assembly without ever
/// materializing redundant image pairs.
pub struct SymmetryManager {
    settings: Settings,
}

impl SymmetryManager {
    /// A manager with the given configuration.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

struct BodyImages {
    // index 0 is the untransformed body
    images: Vec<CompactCoordinates>,
    closed: bool,
}

fn image_points(body: &Body, repetition: usize) -> Vec<PointFF> {
    body.atoms()
        .iter()
        .map(|point| {
            let mut moved = *point;
            moved.pos = body.symmetry()[0].apply(&point.pos, repetition);
            moved
        })
        .collect()
}

fn expand(body: &Body) -> Result<BodyImages> {
    if body.symmetry().len() > 1 {
        return Err(Error::Config(
            "bodies with more than one symmetry descriptor are not supported".into(),
        ));
    }
    if body.symmetry().is_empty() {
        return Ok(BodyImages {
            images: vec![CompactCoordinates::from_points(body.atoms())],
            closed: false,
        });
    }
    if !body.waters().is_empty() {
        return Err(Error::Config(
            "symmetric bodies cannot carry their own hydration shell; \
             attach the waters to an asymmetric body"
                .into(),
        ));
    }

    let symmetry = &body.symmetry()[0];
    // the offset-pattern reduction below needs the translation to commute
    // with the rotation, i.e. a screw axis
    if symmetry.translation.cross(&symmetry.axis).norm() > 1e-9 {
        return Err(Error::Config(
            "symmetry translations must lie along the rotation axis".into(),
        ));
    }
    let closed = symmetry.is_closed();
    let distinct = symmetry.repetitions - usize::from(closed);
    let mut images = Vec::with_capacity(distinct + 1);
    images.push(CompactCoordinates::from_points(body.atoms()));
    for repetition in 1..=distinct {
        images.push(CompactCoordinates::from_points(&image_points(
            body, repetition,
        )));
    }
    Ok(BodyImages { images, closed })
}

// one unit of symmetry work: a pair of image buffers with an aggregate
// pair multiplicity, or a self/water term
enum SymJob<'a> {
    SelfAa {
        data: &'a CompactCoordinates,
        multiplicity: f64,
    },
    CrossAa {
        a: &'a CompactCoordinates,
        b: &'a CompactCoordinates,
        multiplicity: f64,
    },
    Aw {
        atoms: &'a CompactCoordinates,
    },
    Ww,
}

impl HistogramManager for SymmetryManager {
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram> {
        self.settings.validate()?;
        pool::initialize(self.settings.threads);

        let expanded: Vec<BodyImages> = molecule
            .bodies()
            .iter()
            .map(expand)
            .collect::<Result<_>>()?;
        let waters = CompactCoordinates::waters_from_bodies(molecule.bodies());

        let mut jobs: Vec<SymJob<'_>> = Vec::new();
        for (index, body) in expanded.iter().enumerate() {
            let m = body.images.len();

            // every image contributes the body's internal distances once
            jobs.push(SymJob::SelfAa {
                data: &body.images[0],
                multiplicity: m as f64,
            });

            // image-image separations within the body depend only on the
            // repetition offset k
            if body.closed {
                // cyclic orbit: offsets k and m−k produce congruent
                // separation sets, so fold them together
                for k in 1..=(m - 1) / 2 {
                    jobs.push(SymJob::CrossAa {
                        a: &body.images[0],
                        b: &body.images[k],
                        multiplicity: m as f64,
                    });
                }
                if m % 2 == 0 {
                    jobs.push(SymJob::CrossAa {
                        a: &body.images[0],
                        b: &body.images[m / 2],
                        multiplicity: (m / 2) as f64,
                    });
                }
            } else {
                for k in 1..m {
                    jobs.push(SymJob::CrossAa {
                        a: &body.images[0],
                        b: &body.images[k],
                        multiplicity: (m - k) as f64,
                    });
                }
            }

            // cross terms against every image of every later body
            for other in &expanded[index + 1..] {
                for a in &body.images {
                    for b in &other.images {
                        jobs.push(SymJob::CrossAa {
                            a,
                            b,
                            multiplicity: 1.0,
                        });
                    }
                }
            }

            // the hydration shell sees every image once
            if !waters.is_empty() {
                for image in &body.images {
                    jobs.push(SymJob::Aw { atoms: image });
                }
            }
        }
        if !waters.is_empty() {
            jobs.push(SymJob::Ww);
        }

        let all_buffers: Vec<&CompactCoordinates> = expanded
            .iter()
            .flat_map(|body| body.images.iter())
            .chain(std::iter::once(&waters))
            .collect();
        let bins = required_bins(&all_buffers, self.settings.bin_width);
        check_axis_capacity(&self.settings, bins)?;
        let d_axis = crate::axis::Axis::from_width(self.settings.bin_width, bins);
        let inv_width = 1.0 / self.settings.bin_width;

        let weighted = self.settings.weighted_bins;
        let run = |job: &SymJob<'_>, parts: &mut HistogramParts, tracker: &mut WeightedBins| {
            if weighted {
                run_job::<true>(job, parts, tracker, &waters, inv_width);
            } else {
                run_job::<false>(job, parts, tracker, &waters, inv_width);
            }
        };

        let make_local = || (HistogramParts::new(bins, false), WeightedBins::new(bins));
        let (mut parts, tracker) = pool::pool().install(|| {
            jobs.par_iter()
                .fold(make_local, |(mut parts, mut tracker), job| {
                    run(job, &mut parts, &mut tracker);
                    (parts, tracker)
                })
                .reduce(
                    make_local,
                    |(mut parts, mut tracker), (other, other_tracker)| {
                        parts.merge(&other);
                        tracker.merge(&other_tracker);
                        (parts, tracker)
                    },
                )
        });
        if weighted {
            parts.weighted = Some(tracker);
        }

        Ok(CompositeDistanceHistogram::new(
            parts,
            &d_axis,
            self.settings.q_values(),
        ))
    }
}

fn run_job<const WEIGHTED: bool>(
    job: &SymJob<'_>,
    parts: &mut HistogramParts,
    tracker: &mut WeightedBins,
    waters: &CompactCoordinates,
    inv_width: f64,
) {
    match *job {
        SymJob::SelfAa { data, multiplicity } => {
            compact::self_terms::<_, WEIGHTED>(&mut parts.aa, tracker, multiplicity, data);
            compact::pairs_within::<_, WEIGHTED>(
                &mut parts.aa,
                tracker,
                inv_width,
                multiplicity,
                data,
                0..data.len(),
            );
        }
        SymJob::CrossAa { a, b, multiplicity } => {
            // both orderings of every inter-image pair
            compact::pairs_between::<_, WEIGHTED>(
                &mut parts.aa,
                tracker,
                inv_width,
                2.0 * multiplicity,
                a,
                0..a.len(),
                b,
            );
        }
        SymJob::Aw { atoms } => {
            compact::pairs_between::<_, WEIGHTED>(
                &mut parts.aw,
                tracker,
                inv_width,
                1.0,
                atoms,
                0..atoms.len(),
                waters,
            );
        }
        SymJob::Ww => {
            compact::self_terms::<_, WEIGHTED>(&mut parts.ww, tracker, 1.0, waters);
            compact::pairs_within::<_, WEIGHTED>(
                &mut parts.ww,
                tracker,
                inv_width,
                1.0,
                waters,
                0..waters.len(),
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::Symmetry;
    use crate::form_factor::FormFactorType;
    use crate::simple_manager::SimpleManager;
    use float_cmp::assert_approx_eq;
    use nalgebra::Vector3;

    fn seed_atoms() -> Vec<PointFF> {
        vec![
            PointFF::new(3.0, 0.0, 0.0, 1.0, FormFactorType::C),
            PointFF::new(3.5, 1.0, 0.5, 1.0, FormFactorType::N),
            PointFF::new(2.5, -0.5, 1.0, 1.0, FormFactorType::O),
        ]
    }

    fn replicated_molecule(symmetry: &Symmetry) -> Molecule {
        // the same assembly with every image materialized
        let mut bodies = vec![Body::new(seed_atoms())];
        let distinct = symmetry.repetitions - usize::from(symmetry.is_closed());
        for repetition in 1..=distinct {
            let points: Vec<PointFF> = seed_atoms()
                .iter()
                .map(|point| {
                    let mut moved = *point;
                    moved.pos = symmetry.apply(&point.pos, repetition);
                    moved
                })
                .collect();
            bodies.push(Body::new(points));
        }
        Molecule::new(bodies)
    }

    fn assert_matches_explicit(symmetry: Symmetry) {
        let settings = Settings::default();
        let mut explicit = replicated_molecule(&symmetry);
        let expected = SimpleManager::new(settings.clone())
            .calculate_all(&mut explicit)
            .unwrap();

        let mut body = Body::new(seed_atoms());
        body.add_symmetry(symmetry);
        let mut molecule = Molecule::new(vec![body]);
        let actual = SymmetryManager::new(settings)
            .calculate_all(&mut molecule)
            .unwrap();

        assert_eq!(expected.d_axis().bins(), actual.d_axis().bins());
        for bin in 0..expected.d_axis().bins() {
            assert_approx_eq!(
                f64,
                actual.aa_counts().get(bin),
                expected.aa_counts().get(bin),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn open_screw_axis_matches_explicit_replication() {
        assert_matches_explicit(Symmetry {
            axis: Vector3::z_axis(),
            angle: 0.4,
            translation: Vector3::new(0.0, 0.0, 6.0),
            repetitions: 3,
        });
    }

    #[test]
    fn closed_threefold_matches_explicit_replication() {
        assert_matches_explicit(Symmetry {
            axis: Vector3::z_axis(),
            angle: std::f64::consts::TAU / 3.0,
            translation: Vector3::zeros(),
            repetitions: 3,
        });
    }

    #[test]
    fn closed_fourfold_matches_explicit_replication() {
        assert_matches_explicit(Symmetry {
            axis: Vector3::z_axis(),
            angle: std::f64::consts::TAU / 4.0,
            translation: Vector3::zeros(),
            repetitions: 4,
        });
    }

    #[test]
    fn symmetric_body_with_waters_is_rejected() {
        let mut body = Body::with_waters(
            seed_atoms(),
            vec![PointFF::new(0.0, 0.0, 5.0, 1.0, crate::form_factor::WATER)],
        );
        body.add_symmetry(Symmetry {
            axis: Vector3::z_axis(),
            angle: 1.0,
            translation: Vector3::zeros(),
            repetitions: 2,
        });
        let mut molecule = Molecule::new(vec![body]);
        let result = SymmetryManager::new(Settings::default()).calculate_all(&mut molecule);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
