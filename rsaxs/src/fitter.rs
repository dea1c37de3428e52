//! Fitting computed profiles to experimental curves.
//!
//! Every χ² evaluation applies a candidate parameter set to the composite
//! histogram, Debye-transforms it, interpolates the model onto the
//! experimental q sampling, and solves the inner linear problem for the
//! scale and offset analytically. The outer minimizer only ever sees the
//! profiled χ².

use crate::body::Molecule;
use crate::composite::CompositeDistanceHistogram;
use crate::config::Settings;
use crate::dataset::ScatteringCurve;
use crate::error::{Error, Result};
use crate::manager::HistogramManager;
use crate::minimizer::{golden_section, Evaluation, NelderMead};
use itertools::izip;
use nalgebra::DMatrix;
use std::io::Write;

/// A fitted parameter with its one-σ uncertainty, when available.
#[derive(Clone, Debug, PartialEq)]
pub struct FittedParameter {
    /// Parameter name as written in reports.
    pub name: &'static str,
    /// Best-fit value.
    pub value: f64,
    /// One-σ uncertainty from the curvature at the optimum.
    pub error: Option<f64>,
}

/// Outcome of a fit.
#[derive(Clone, Debug)]
pub struct FitResult {
    /// All fitted parameters, free and linear.
    pub parameters: Vec<FittedParameter>,
    /// Final χ².
    pub chi2: f64,
    /// Degrees of freedom: data points minus fitted parameters.
    pub dof: usize,
    /// Whether the minimizer met its tolerance before the evaluation cap.
    pub converged: bool,
    /// Whether parameter uncertainties could be derived. False when the
    /// curvature at the optimum is singular.
    pub covariance_available: bool,
    /// The trace of evaluated points.
    pub evaluations: Vec<Evaluation>,
}

impl FitResult {
    /// Look up a fitted parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .map(|parameter| parameter.value)
    }

    /// χ² per degree of freedom.
    #[must_use]
    pub fn reduced_chi2(&self) -> f64 {
        self.chi2 / self.dof as f64
    }

    /// Write the line-oriented fit report: a header, one line per
    /// parameter, the reduced χ², and one line per experimental point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] on I/O failure.
    pub fn write_report<W: Write>(
        &self,
        writer: &mut W,
        curve: &ScatteringCurve,
        model: &[f64],
    ) -> Result<()> {
        (|| -> std::io::Result<()> {
            writeln!(writer, "# rsaxs fit: {} points, {} dof", curve.len(), self.dof)?;
            for parameter in &self.parameters {
                match parameter.error {
                    Some(error) => {
                        writeln!(writer, "{} {:.6e} ±{:.6e}", parameter.name, parameter.value, error)?;
                    }
                    None => writeln!(writer, "{} {:.6e} ±n/a", parameter.name, parameter.value)?,
                }
            }
            writeln!(writer, "chi2/dof {:.6e}", self.reduced_chi2())?;
            for (&q, &intensity, &sigma, &model) in
                izip!(curve.q(), curve.intensity(), curve.sigma(), model)
            {
                writeln!(writer, "{q:.8e} {intensity:.8e} {sigma:.8e} {model:.8e}")?;
            }
            Ok(())
        })()
        .map_err(|err| Error::Other(err.into()))
    }
}

/// Solve `argmin_{a,b} Σᵢ ((Iᵢ − a·mᵢ − b)/σᵢ)²` analytically.
/// Returns (a, b, χ², determinant of the normal matrix).
fn linear_least_squares(model: &[f64], curve: &ScatteringCurve) -> (f64, f64, f64, f64) {
    let mut s = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&m, &intensity, &sigma) in izip!(model, curve.intensity(), curve.sigma()) {
        let weight = 1.0 / (sigma * sigma);
        s += weight;
        sx += weight * m;
        sy += weight * intensity;
        sxx += weight * m * m;
        sxy += weight * m * intensity;
    }
    let delta = s.mul_add(sxx, -(sx * sx));
    if delta.abs() < f64::EPSILON * s * sxx {
        // degenerate model (constant); absorb everything into the offset
        return (0.0, sy / s, chi2_of(0.0, sy / s, model, curve), delta);
    }
    let a = s.mul_add(sxy, -(sx * sy)) / delta;
    let b = sxx.mul_add(sy, -(sx * sxy)) / delta;
    (a, b, chi2_of(a, b, model, curve), delta)
}

fn chi2_of(a: f64, b: f64, model: &[f64], curve: &ScatteringCurve) -> f64 {
    izip!(model, curve.intensity(), curve.sigma())
        .map(|(&m, &intensity, &sigma)| {
            let residual = (intensity - a.mul_add(m, b)) / sigma;
            residual * residual
        })
        .sum()
}

fn check_chi2(chi2: f64) -> Result<f64> {
    if !chi2.is_finite() || chi2 < 0.0 {
        return Err(Error::Numeric(format!("χ² evaluated to {chi2}")));
    }
    Ok(chi2)
}

fn build_histogram(
    manager: &mut dyn HistogramManager,
    molecule: &mut Molecule,
) -> Result<CompositeDistanceHistogram> {
    manager.calculate_all(molecule)
}

/// Fits the hydration scale factor c_w plus the linear scale and offset.
pub struct HydrationFitter {
    curve: ScatteringCurve,
    histogram: CompositeDistanceHistogram,
    settings: Settings,
}

impl HydrationFitter {
    /// A fitter over a pre-built composite histogram.
    #[must_use]
    pub const fn new(
        curve: ScatteringCurve,
        histogram: CompositeDistanceHistogram,
        settings: Settings,
    ) -> Self {
        Self {
            curve,
            histogram,
            settings,
        }
    }

    /// A fitter that builds its histogram through `manager` first.
    ///
    /// # Errors
    ///
    /// Propagates build errors.
    pub fn from_manager(
        curve: ScatteringCurve,
        manager: &mut dyn HistogramManager,
        molecule: &mut Molecule,
        settings: Settings,
    ) -> Result<Self> {
        let histogram = build_histogram(manager, molecule)?;
        Ok(Self::new(curve, histogram, settings))
    }

    /// The model intensities at the experimental q values for the current
    /// parameters.
    #[must_use]
    pub fn model(&self) -> Vec<f64> {
        self.histogram.debye_transform().spliced(self.curve.q())
    }

    fn chi2_for(&mut self, cw: f64) -> Result<f64> {
        self.histogram.apply_water_scaling_factor(cw);
        let model = self.model();
        let (.., chi2, _) = linear_least_squares(&model, &self.curve);
        check_chi2(chi2)
    }

    /// Evaluate χ² for one candidate c_w without a full fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Numeric`] on a non-finite χ².
    pub fn chi2(&mut self, cw: f64) -> Result<f64> {
        self.chi2_for(cw)
    }

    /// Run the fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the curve has fewer points
    /// than parameters, and propagates numeric failures.
    pub fn fit(&mut self) -> Result<FitResult> {
        const FREE_PARAMETERS: usize = 3; // c_w, a, b
        if self.curve.len() <= FREE_PARAMETERS {
            return Err(Error::InvalidInput(
                "not enough experimental points to fit c_w, a and b".into(),
            ));
        }

        let (lo, hi) = self.settings.cw_limits;
        let tolerance = self.settings.fit_tolerance;
        let max_evaluations = self.settings.max_iterations;
        let histogram = &mut self.histogram;
        let curve = &self.curve;
        let minimum = golden_section(
            |cw| {
                histogram.apply_water_scaling_factor(cw);
                let model = histogram.debye_transform().spliced(curve.q());
                let (.., chi2, _) = linear_least_squares(&model, curve);
                check_chi2(chi2)
            },
            lo,
            hi,
            tolerance,
            max_evaluations,
        )?;
        if !minimum.converged {
            log::warn!(
                "hydration fit stopped at the evaluation cap ({max_evaluations}); \
                 reporting the best point found"
            );
        }

        let cw = minimum.x[0];
        self.histogram.apply_water_scaling_factor(cw);
        let model = self.model();
        let (a, b, chi2, delta) = linear_least_squares(&model, &self.curve);

        // curvature of the χ² profile at the optimum
        let step = (hi - lo) * 1e-3;
        let lower = self.chi2_for((cw - step).max(lo))?;
        let upper = self.chi2_for((cw + step).min(hi))?;
        self.histogram.apply_water_scaling_factor(cw);
        let curvature = (lower + upper - 2.0 * chi2) / (step * step);
        let covariance_available = curvature > 0.0 && curvature.is_finite() && delta != 0.0;
        let cw_error = covariance_available.then(|| (2.0 / curvature).sqrt());

        Ok(FitResult {
            parameters: vec![
                FittedParameter {
                    name: "c_w",
                    value: cw,
                    error: cw_error,
                },
                FittedParameter {
                    name: "a",
                    value: a,
                    error: None,
                },
                FittedParameter {
                    name: "b",
                    value: b,
                    error: None,
                },
            ],
            chi2,
            dof: self.curve.len() - FREE_PARAMETERS,
            converged: minimum.converged,
            covariance_available,
            evaluations: minimum.evaluations,
        })
    }

    /// The experimental curve.
    #[must_use]
    pub const fn curve(&self) -> &ScatteringCurve {
        &self.curve
    }

    /// The fitted histogram.
    #[must_use]
    pub const fn histogram(&self) -> &CompositeDistanceHistogram {
        &self.histogram
    }
}

/// Fits c_w and c_x, optionally the two Debye–Waller widths, plus the
/// linear scale and offset.
pub struct ExvFitter {
    curve: ScatteringCurve,
    histogram: CompositeDistanceHistogram,
    settings: Settings,
    fit_debye_waller: bool,
}

impl ExvFitter {
    /// A fitter over a pre-built composite histogram carrying
    /// excluded-volume partials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the histogram has no
    /// excluded-volume partials.
    pub fn new(
        curve: ScatteringCurve,
        histogram: CompositeDistanceHistogram,
        settings: Settings,
        fit_debye_waller: bool,
    ) -> Result<Self> {
        if !histogram.has_exv() {
            return Err(Error::Config(
                "excluded-volume fitting needs a histogram with exv partials; \
                 enable fit_excluded_volume or use a grid manager"
                    .into(),
            ));
        }
        Ok(Self {
            curve,
            histogram,
            settings,
            fit_debye_waller,
        })
    }

    /// A fitter that builds its histogram through `manager` first.
    ///
    /// # Errors
    ///
    /// Propagates build errors.
    pub fn from_manager(
        curve: ScatteringCurve,
        manager: &mut dyn HistogramManager,
        molecule: &mut Molecule,
        settings: Settings,
        fit_debye_waller: bool,
    ) -> Result<Self> {
        let histogram = build_histogram(manager, molecule)?;
        Self::new(curve, histogram, settings, fit_debye_waller)
    }

    fn apply(&mut self, parameters: &[f64]) {
        self.histogram.apply_water_scaling_factor(parameters[0]);
        self.histogram.apply_excluded_volume_scaling_factor(parameters[1]);
        if self.fit_debye_waller {
            self.histogram.apply_atomic_debye_waller_factor(parameters[2]);
            self.histogram.apply_exv_debye_waller_factor(parameters[3]);
        }
    }

    fn chi2_for(&mut self, parameters: &[f64]) -> Result<f64> {
        self.apply(parameters);
        let model = self.histogram.debye_transform().spliced(self.curve.q());
        let (.., chi2, _) = linear_least_squares(&model, &self.curve);
        check_chi2(chi2)
    }

    /// Run the fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the curve has fewer points
    /// than parameters, and propagates numeric failures.
    pub fn fit(&mut self) -> Result<FitResult> {
        let dims = if self.fit_debye_waller { 4 } else { 2 };
        let linear = 2; // a, b
        if self.curve.len() <= dims + linear {
            return Err(Error::InvalidInput(
                "not enough experimental points for the requested parameters".into(),
            ));
        }

        let mut bounds = vec![self.settings.cw_limits, self.settings.cx_limits];
        let mut start = vec![1.0_f64, 1.0];
        if self.fit_debye_waller {
            bounds.push(self.settings.sigma_limits);
            bounds.push(self.settings.sigma_limits);
            start.push(self.settings.sigma_limits.0);
            start.push(self.settings.sigma_limits.0);
        }
        for (value, &(lo, hi)) in start.iter_mut().zip(&bounds) {
            *value = value.clamp(lo, hi);
        }

        let minimizer = NelderMead::new(
            bounds.clone(),
            self.settings.fit_tolerance,
            self.settings.max_iterations,
        );
        let minimum = {
            let fitter = &mut *self;
            minimizer.minimize(|parameters| fitter.chi2_for(parameters), &start)?
        };
        if !minimum.converged {
            log::warn!(
                "excluded-volume fit stopped at the evaluation cap ({}); \
                 reporting the best point found",
                self.settings.max_iterations
            );
        }

        self.apply(&minimum.x);
        let model = self.histogram.debye_transform().spliced(self.curve.q());
        let (a, b, chi2, _) = linear_least_squares(&model, &self.curve);

        let (errors, covariance_available) = self.parameter_errors(&minimum.x, chi2, &bounds)?;
        self.apply(&minimum.x);

        let names: [&'static str; 4] = ["c_w", "c_x", "sigma_a", "sigma_x"];
        let mut parameters: Vec<FittedParameter> = minimum
            .x
            .iter()
            .enumerate()
            .map(|(index, &value)| FittedParameter {
                name: names[index],
                value,
                error: errors.as_ref().map(|errors| errors[index]),
            })
            .collect();
        parameters.push(FittedParameter {
            name: "a",
            value: a,
            error: None,
        });
        parameters.push(FittedParameter {
            name: "b",
            value: b,
            error: None,
        });

        Ok(FitResult {
            parameters,
            chi2,
            dof: self.curve.len() - dims - linear,
            converged: minimum.converged,
            covariance_available,
            evaluations: minimum.evaluations,
        })
    }

    // finite-difference Hessian at the optimum; a rank-deficient Hessian
    // leaves the covariance unavailable
    fn parameter_errors(
        &mut self,
        optimum: &[f64],
        chi2: f64,
        bounds: &[(f64, f64)],
    ) -> Result<(Option<Vec<f64>>, bool)> {
        let dims = optimum.len();
        let steps: Vec<f64> = bounds.iter().map(|&(lo, hi)| (hi - lo) * 1e-3).collect();

        let mut hessian = DMatrix::zeros(dims, dims);
        for i in 0..dims {
            for j in i..dims {
                let mut shifted = |si: f64, sj: f64| -> Result<f64> {
                    let mut x = optimum.to_vec();
                    x[i] += si;
                    x[j] += sj;
                    for (value, &(lo, hi)) in x.iter_mut().zip(bounds) {
                        *value = value.clamp(lo, hi);
                    }
                    self.chi2_for(&x)
                };
                let value = if i == j {
                    (shifted(steps[i], 0.0)? + shifted(-steps[i], 0.0)? - 2.0 * chi2)
                        / (steps[i] * steps[i])
                } else {
                    (shifted(steps[i], steps[j])? - shifted(steps[i], -steps[j])?
                        - shifted(-steps[i], steps[j])?
                        + shifted(-steps[i], -steps[j])?)
                        / (4.0 * steps[i] * steps[j])
                };
                hessian[(i, j)] = value;
                hessian[(j, i)] = value;
            }
        }

        match (hessian.clone() / 2.0).cholesky() {
            Some(cholesky) => {
                let covariance = cholesky.inverse();
                let errors = (0..dims).map(|i| covariance[(i, i)].sqrt()).collect();
                Ok((Some(errors), true))
            }
            None => Ok((None, false)),
        }
    }

    /// The fitted histogram.
    #[must_use]
    pub const fn histogram(&self) -> &CompositeDistanceHistogram {
        &self.histogram
    }

    /// The model intensities at the experimental q values for the current
    /// parameters.
    #[must_use]
    pub fn model(&self) -> Vec<f64> {
        self.histogram.debye_transform().spliced(self.curve.q())
    }

    /// The experimental curve.
    #[must_use]
    pub const fn curve(&self) -> &ScatteringCurve {
        &self.curve
    }
}
