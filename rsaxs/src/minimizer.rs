//! Derivative-free minimizers for the fit drivers.
//!
//! A golden-section scan covers the single-parameter fits; a
//! bounds-projected Nelder–Mead simplex covers the multi-parameter ones.
//! Both stop when the relative improvement stays below the tolerance for
//! three consecutive iterations, or when the evaluation budget runs out.

use crate::error::Result;
use arrayvec::ArrayVec;

/// At most this many parameters can be minimized at once.
pub const MAX_DIMENSIONS: usize = 4;

const GOLDEN_RATIO: f64 = 0.618_033_988_749_894_8;
const CONVERGED_ITERATIONS: usize = 3;

/// A single recorded objective evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Parameter values.
    pub x: Vec<f64>,
    /// Objective value.
    pub fval: f64,
}

/// Outcome of a minimization.
#[derive(Clone, Debug)]
pub struct MinimizeResult {
    /// Best parameters found.
    pub x: Vec<f64>,
    /// Objective at the best parameters.
    pub fval: f64,
    /// Whether the tolerance criterion was met before the budget ran out.
    pub converged: bool,
    /// Every evaluated point, in evaluation order.
    pub evaluations: Vec<Evaluation>,
}

/// Minimize a one-dimensional objective on `[lo, hi]` by golden-section
/// search.
///
/// # Errors
///
/// Propagates the first error returned by `objective`.
///
/// # Panics
///
/// Panics if `lo >= hi`.
pub fn golden_section<F>(
    mut objective: F,
    lo: f64,
    hi: f64,
    tolerance: f64,
    max_evaluations: usize,
) -> Result<MinimizeResult>
where
    F: FnMut(f64) -> Result<f64>,
{
    assert!(lo < hi);
    let mut evaluations = Vec::new();
    let mut evaluate = |x: f64, evaluations: &mut Vec<Evaluation>| -> Result<f64> {
        let fval = objective(x)?;
        evaluations.push(Evaluation { x: vec![x], fval });
        Ok(fval)
    };

    let mut a = lo;
    let mut b = hi;
    let mut x1 = GOLDEN_RATIO.mul_add(-(b - a), b);
    let mut x2 = GOLDEN_RATIO.mul_add(b - a, a);
    let mut f1 = evaluate(x1, &mut evaluations)?;
    let mut f2 = evaluate(x2, &mut evaluations)?;

    let mut best = if f1 < f2 { f1 } else { f2 };
    let mut stable = 0_usize;
    let mut converged = false;
    while evaluations.len() < max_evaluations {
        if f1 < f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = GOLDEN_RATIO.mul_add(-(b - a), b);
            f1 = evaluate(x1, &mut evaluations)?;
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = GOLDEN_RATIO.mul_add(b - a, a);
            f2 = evaluate(x2, &mut evaluations)?;
        }

        let current = f1.min(f2);
        if relative_change(best, current) < tolerance {
            stable += 1;
            if stable >= CONVERGED_ITERATIONS {
                converged = true;
                break;
            }
        } else {
            stable = 0;
        }
        best = best.min(current);
    }

    let (x, fval) = if f1 < f2 { (x1, f1) } else { (x2, f2) };
    Ok(MinimizeResult {
        x: vec![x],
        fval,
        converged,
        evaluations,
    })
}

fn relative_change(previous: f64, current: f64) -> f64 {
    (previous - current).abs() / previous.abs().max(1e-300)
}

#[derive(Clone)]
struct Vertex {
    x: Vec<f64>,
    fval: f64,
}

/// Bounds-projected Nelder–Mead simplex minimizer.
pub struct NelderMead {
    bounds: Vec<(f64, f64)>,
    tolerance: f64,
    max_evaluations: usize,
}

impl NelderMead {
    /// A minimizer over the box `bounds`.
    ///
    /// # Panics
    ///
    /// Panics if no bounds are given, more than [`MAX_DIMENSIONS`], or any
    /// bound is inverted.
    #[must_use]
    pub fn new(bounds: Vec<(f64, f64)>, tolerance: f64, max_evaluations: usize) -> Self {
        assert!(!bounds.is_empty() && bounds.len() <= MAX_DIMENSIONS);
        assert!(bounds.iter().all(|&(lo, hi)| lo < hi));
        Self {
            bounds,
            tolerance,
            max_evaluations,
        }
    }

    fn project(&self, x: &mut [f64]) {
        for (value, &(lo, hi)) in x.iter_mut().zip(&self.bounds) {
            *value = value.clamp(lo, hi);
        }
    }

    /// Minimize `objective` starting from `start`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `objective`.
    ///
    /// # Panics
    ///
    /// Panics if `start` does not match the bound dimensionality.
    pub fn minimize<F>(&self, mut objective: F, start: &[f64]) -> Result<MinimizeResult>
    where
        F: FnMut(&[f64]) -> Result<f64>,
    {
        assert_eq!(start.len(), self.bounds.len());
        let dims = self.bounds.len();
        let mut evaluations = Vec::new();
        let mut evaluate = |x: Vec<f64>, evaluations: &mut Vec<Evaluation>| -> Result<Vertex> {
            let fval = objective(&x)?;
            evaluations.push(Evaluation {
                x: x.clone(),
                fval,
            });
            Ok(Vertex { x, fval })
        };

        // initial simplex: the start plus one step of 10% of each bound
        // range, projected back into the box
        let mut simplex: ArrayVec<Vertex, { MAX_DIMENSIONS + 1 }> = ArrayVec::new();
        let mut start = start.to_vec();
        self.project(&mut start);
        simplex.push(evaluate(start.clone(), &mut evaluations)?);
        for dim in 0..dims {
            let (lo, hi) = self.bounds[dim];
            let mut vertex = start.clone();
            vertex[dim] += 0.1 * (hi - lo);
            if vertex[dim] > hi {
                vertex[dim] = hi.mul_add(2.0, -vertex[dim]);
            }
            self.project(&mut vertex);
            simplex.push(evaluate(vertex, &mut evaluations)?);
        }

        let mut stable = 0_usize;
        let mut converged = false;
        while evaluations.len() < self.max_evaluations {
            simplex.sort_by(|a, b| a.fval.partial_cmp(&b.fval).unwrap());
            let previous_best = simplex[0].fval;

            // centroid of all but the worst vertex
            let mut centroid = vec![0.0; dims];
            for vertex in simplex.iter().take(dims) {
                for (sum, &value) in centroid.iter_mut().zip(&vertex.x) {
                    *sum += value / dims as f64;
                }
            }
            let worst = simplex[dims].clone();

            let moved = |factor: f64| -> Vec<f64> {
                let mut x: Vec<f64> = centroid
                    .iter()
                    .zip(&worst.x)
                    .map(|(&center, &worst)| factor.mul_add(center - worst, center))
                    .collect();
                self.project(&mut x);
                x
            };

            let reflected = evaluate(moved(1.0), &mut evaluations)?;
            if reflected.fval < simplex[0].fval {
                let expanded = evaluate(moved(2.0), &mut evaluations)?;
                simplex[dims] = if expanded.fval < reflected.fval {
                    expanded
                } else {
                    reflected
                };
            } else if reflected.fval < simplex[dims - 1].fval {
                simplex[dims] = reflected;
            } else {
                let contracted = evaluate(moved(-0.5), &mut evaluations)?;
                if contracted.fval < worst.fval {
                    simplex[dims] = contracted;
                } else {
                    // shrink towards the best vertex
                    let best = simplex[0].x.clone();
                    for index in 1..=dims {
                        let mut x: Vec<f64> = simplex[index]
                            .x
                            .iter()
                            .zip(&best)
                            .map(|(&vertex, &best)| 0.5f64.mul_add(vertex - best, best))
                            .collect();
                        self.project(&mut x);
                        simplex[index] = evaluate(x, &mut evaluations)?;
                    }
                }
            }

            let current_best = simplex
                .iter()
                .map(|vertex| vertex.fval)
                .fold(f64::INFINITY, f64::min);
            if relative_change(previous_best, current_best) < self.tolerance {
                stable += 1;
                if stable >= CONVERGED_ITERATIONS {
                    converged = true;
                    break;
                }
            } else {
                stable = 0;
            }
        }

        simplex.sort_by(|a, b| a.fval.partial_cmp(&b.fval).unwrap());
        Ok(MinimizeResult {
            x: simplex[0].x.clone(),
            fval: simplex[0].fval,
            converged,
            evaluations,
        })
    }
}
