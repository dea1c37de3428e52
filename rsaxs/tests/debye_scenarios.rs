#![allow(missing_docs)]

use float_cmp::assert_approx_eq;
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rsaxs::body::{Body, Molecule, PointFF};
use rsaxs::config::Settings;
use rsaxs::dataset::ScatteringCurve;
use rsaxs::fitter::HydrationFitter;
use rsaxs::form_factor::{form_factor, ExvFormFactor, FormFactorType, WATER};
use rsaxs::manager::HistogramManager;
use rsaxs::mt_manager::MtManager;
use rsaxs::partial_manager::PartialManager;
use rsaxs::simple_manager::SimpleManager;
use rsaxs::sinc::sinc;
use std::io::Cursor;

fn cube_points() -> Vec<PointFF> {
    let mut points = Vec::new();
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                points.push(PointFF::new(x, y, z, 1.0, FormFactorType::C));
            }
        }
    }
    points
}

fn random_molecule(atoms: usize, waters: usize, bodies: usize, seed: u64) -> Molecule {
    let mut rng = Pcg64::seed_from_u64(seed);
    let kinds = [
        FormFactorType::C,
        FormFactorType::CH,
        FormFactorType::N,
        FormFactorType::NH,
        FormFactorType::O,
        FormFactorType::S,
    ];
    let mut built = Vec::new();
    for body in 0..bodies {
        let atom_points: Vec<PointFF> = (0..atoms)
            .map(|i| {
                PointFF::new(
                    rng.gen_range(-12.0..12.0),
                    rng.gen_range(-12.0..12.0),
                    rng.gen_range(-12.0..12.0),
                    1.0,
                    kinds[(i + body) % kinds.len()],
                )
            })
            .collect();
        let water_points: Vec<PointFF> = (0..waters)
            .map(|_| {
                PointFF::new(
                    rng.gen_range(-14.0..14.0),
                    rng.gen_range(-14.0..14.0),
                    rng.gen_range(-14.0..14.0),
                    1.0,
                    WATER,
                )
            })
            .collect();
        built.push(Body::with_waters(atom_points, water_points));
    }
    Molecule::new(built)
}

// direct O(N²) Debye sum over the exact pair distances
fn brute_force_intensity(points: &[PointFF], q: f64) -> f64 {
    let mut intensity = 0.0;
    for a in points {
        for b in points {
            let distance = (a.pos - b.pos).norm();
            let amplitude = a.weight
                * b.weight
                * form_factor(a.kind).evaluate(q)
                * form_factor(b.kind).evaluate(q);
            intensity += amplitude * sinc(q * distance);
        }
    }
    intensity
}

#[test]
fn cube_self_histogram() {
    let settings = Settings {
        bin_width: 0.25,
        ..Settings::default()
    };
    let mut molecule = Molecule::new(vec![Body::new(cube_points())]);
    let histogram = SimpleManager::new(settings)
        .calculate_all(&mut molecule)
        .unwrap();

    // 8 self pairs, then 24/24/8 pairs at 2, √8 and √12
    let counts = histogram.aa_counts();
    assert_approx_eq!(f64, counts.get(0), 8.0);
    assert_approx_eq!(f64, counts.get(8), 24.0);
    assert_approx_eq!(f64, counts.get(11), 24.0);
    assert_approx_eq!(f64, counts.get(14), 8.0);
    for bin in 0..counts.bins() {
        if ![0, 8, 11, 14].contains(&bin) {
            assert_approx_eq!(f64, counts.get(bin), 0.0);
        }
    }

    // the transform reproduces the exact Debye sum, including the
    // forward limit I(q→0) = 64·F_CC(0)
    let profile = histogram.debye_transform();
    for (&q, &intensity) in profile.q().iter().zip(profile.intensity()) {
        let exact = brute_force_intensity(&cube_points(), q);
        assert_approx_eq!(f64, intensity, exact, epsilon = 1e-6 * exact.abs());
    }
    let f0 = form_factor(FormFactorType::C).evaluate(profile.q()[0]);
    assert_approx_eq!(
        f64,
        profile.intensity()[0],
        64.0 * f0 * f0,
        epsilon = 1e-6 * profile.intensity()[0]
    );
}

#[test]
fn water_scaling_scales_the_cross_terms() {
    let waters = vec![
        PointFF::new(0.0, 0.0, 3.0, 1.0, WATER),
        PointFF::new(0.0, 0.0, -3.0, 1.0, WATER),
    ];
    let mut molecule = Molecule::new(vec![Body::with_waters(cube_points(), waters)]);
    let mut histogram = MtManager::new(Settings::default())
        .calculate_all(&mut molecule)
        .unwrap();

    let aw_before = histogram.profile_aw();
    let ww_before = histogram.profile_ww();
    histogram.apply_water_scaling_factor(2.0);
    let aw_after = histogram.profile_aw();
    let ww_after = histogram.profile_ww();

    for i in 0..aw_before.intensity().len() {
        assert_approx_eq!(
            f64,
            aw_after.intensity()[i],
            2.0 * aw_before.intensity()[i],
            epsilon = 1e-9 * aw_before.intensity()[i].abs().max(1.0)
        );
        assert_approx_eq!(
            f64,
            ww_after.intensity()[i],
            4.0 * ww_before.intensity()[i],
            epsilon = 1e-9 * ww_before.intensity()[i].abs().max(1.0)
        );
    }
}

#[test]
fn exv_subtraction_for_a_single_atom() {
    // one carbon with its own-position dummy: I(q) = (f_C − f_x)²
    let settings = Settings {
        fit_excluded_volume: true,
        ..Settings::default()
    };
    let mut molecule = Molecule::new(vec![Body::new(vec![PointFF::new(
        0.0,
        0.0,
        0.0,
        1.0,
        FormFactorType::C,
    )])]);
    let histogram = SimpleManager::new(settings)
        .calculate_all(&mut molecule)
        .unwrap();
    assert!(histogram.has_exv());

    let exv_ff = ExvFormFactor::new(rsaxs::constants::TRAUBE.c);
    let profile = histogram.debye_transform();
    for (&q, &intensity) in profile.q().iter().zip(profile.intensity()) {
        let difference = form_factor(FormFactorType::C).evaluate(q) - exv_ff.evaluate(q);
        assert_approx_eq!(f64, intensity, difference * difference, epsilon = 1e-9);
    }
}

#[test]
fn all_manager_variants_agree() {
    let settings = Settings::default();
    let mut molecule = random_molecule(60, 15, 2, 11);

    let reference = SimpleManager::new(settings.clone())
        .calculate_all(&mut molecule)
        .unwrap();
    let mt = MtManager::new(settings.clone())
        .calculate_all(&mut molecule)
        .unwrap();
    let mut partial_st = PartialManager::new(settings.clone(), false, &mut molecule);
    let partial_st = partial_st.calculate_all(&mut molecule).unwrap();
    let mut partial_mt = PartialManager::new(settings, true, &mut molecule);
    let partial_mt = partial_mt.calculate_all(&mut molecule).unwrap();

    for other in [&mt, &partial_st, &partial_mt] {
        assert_eq!(reference.d_axis().bins(), other.d_axis().bins());
        for bin in 0..reference.d_axis().bins() {
            assert_approx_eq!(
                f64,
                reference.aa_counts().get(bin),
                other.aa_counts().get(bin),
                epsilon = 1e-9
            );
            assert_approx_eq!(
                f64,
                reference.aw_counts().get(bin),
                other.aw_counts().get(bin),
                epsilon = 1e-9
            );
            assert_approx_eq!(
                f64,
                reference.ww_counts().get(bin),
                other.ww_counts().get(bin),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn partial_manager_tracks_a_moved_body() {
    let settings = Settings::default();
    let mut molecule = random_molecule(40, 10, 2, 23);
    let mut partial = PartialManager::new(settings.clone(), false, &mut molecule);
    partial.calculate_all(&mut molecule).unwrap();

    molecule.body_mut(0).translate(Vector3::new(1.0, 0.0, 0.0));
    let incremental = partial.calculate_all(&mut molecule).unwrap();
    let full = SimpleManager::new(settings)
        .calculate_all(&mut molecule)
        .unwrap();

    assert_eq!(incremental.d_axis().bins(), full.d_axis().bins());
    for bin in 0..full.d_axis().bins() {
        assert_approx_eq!(
            f64,
            incremental.aa_counts().get(bin),
            full.aa_counts().get(bin),
            epsilon = 1e-9
        );
        assert_approx_eq!(
            f64,
            incremental.aw_counts().get(bin),
            full.aw_counts().get(bin),
            epsilon = 1e-9
        );
    }
}

#[test]
fn fit_recovers_the_water_scaling_factor() {
    let settings = Settings {
        max_iterations: 300,
        fit_tolerance: 1e-10,
        ..Settings::default()
    };
    let mut molecule = random_molecule(50, 20, 1, 31);
    let mut histogram = MtManager::new(settings.clone())
        .calculate_all(&mut molecule)
        .unwrap();

    // synthesize an experimental curve at c_w = 1.5 with tiny errors
    histogram.apply_water_scaling_factor(1.5);
    let profile = histogram.debye_transform();
    histogram.reset_water_scaling_factor();
    let sigma: Vec<f64> = profile
        .intensity()
        .iter()
        .map(|intensity| intensity.abs().max(1e-6) * 1e-4)
        .collect();
    let curve =
        ScatteringCurve::new(profile.q().to_vec(), profile.intensity().to_vec(), sigma).unwrap();

    let mut fitter = HydrationFitter::new(curve, histogram, settings);
    let result = fitter.fit().unwrap();
    let cw = result.parameter("c_w").unwrap();
    assert!((cw - 1.5).abs() / 1.5 < 0.01, "recovered c_w = {cw}");
    assert!(result.parameter("a").unwrap() > 0.0);
    assert!(result.dof > 0);
}

#[test]
fn nm_curves_are_converted_to_inverse_angstrom() {
    let mut text = String::from("# q [nm^-1] I sigma\n");
    for i in 1..=10 {
        let q = 0.1 * f64::from(i);
        text.push_str(&format!("{q:.3} {:.3} 0.1\n", 10.0 - f64::from(i) * 0.5));
    }
    let curve = ScatteringCurve::from_reader(Cursor::new(text), 1e-4, 0.5).unwrap();
    assert_eq!(curve.len(), 10);
    assert_approx_eq!(f64, curve.q()[0], 0.01, epsilon = 1e-12);
    assert_approx_eq!(f64, curve.q()[9], 0.1, epsilon = 1e-12);
}

#[test]
fn configured_manager_choices_dispatch_and_agree() {
    use rsaxs::config::HistogramManagerChoice;
    use rsaxs::manager::manager_for;

    let reference = {
        let mut molecule = random_molecule(25, 5, 2, 41);
        SimpleManager::new(Settings::default())
            .calculate_all(&mut molecule)
            .unwrap()
    };

    for choice in [
        HistogramManagerChoice::SingleThreaded,
        HistogramManagerChoice::MultiThreaded,
        HistogramManagerChoice::PartialSingleThreaded,
        HistogramManagerChoice::PartialMultiThreaded,
    ] {
        let settings = Settings {
            histogram_manager: choice,
            ..Settings::default()
        };
        let mut molecule = random_molecule(25, 5, 2, 41);
        let mut manager = manager_for(&settings, &mut molecule);
        let histogram = manager.calculate_all(&mut molecule).unwrap();
        assert_eq!(reference.d_axis().bins(), histogram.d_axis().bins());
        for bin in 0..reference.d_axis().bins() {
            assert_approx_eq!(
                f64,
                reference.aa_counts().get(bin),
                histogram.aa_counts().get(bin),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn profiles_decompose_into_their_terms() {
    let mut molecule = random_molecule(30, 10, 1, 5);
    let settings = Settings {
        fit_excluded_volume: true,
        ..Settings::default()
    };
    let mut histogram = MtManager::new(settings)
        .calculate_all(&mut molecule)
        .unwrap();
    histogram.apply_water_scaling_factor(1.3);
    histogram.apply_excluded_volume_scaling_factor(0.9);

    let total = histogram.debye_transform();
    let mut summed = histogram.profile_aa();
    summed.add(&histogram.profile_aw());
    summed.add(&histogram.profile_ww());
    summed.add(&histogram.profile_ax());
    summed.add(&histogram.profile_xx());
    summed.add(&histogram.profile_wx());

    for (&total, &summed) in total.intensity().iter().zip(summed.intensity()) {
        assert_approx_eq!(f64, total, summed, epsilon = 1e-6 * total.abs().max(1e-12));
    }
}
