//! Dense Levenberg-Marquardt solver.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const INITIAL_LAMBDA: f64 = 1e-3;
const MIN_LAMBDA: f64 = 1e-12;
const MAX_LAMBDA: f64 = 1e16;
const DIAG_FLOOR: f64 = 1e-12;
const FD_STEP: f64 = 1e-6;

/// Non-linear least squares problem with dense parameter/residual vectors.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of [`NllsProblem::residuals`]; forward differences by default.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let r0 = self.residuals(x);
        let mut j = DMatrix::zeros(r0.len(), x.len());
        let mut xp = x.clone();
        for c in 0..x.len() {
            let h = fd_step(x[c]);
            xp[c] = x[c] + h;
            let r = self.residuals(&xp);
            j.set_column(c, &((r - &r0) / h));
            xp[c] = x[c];
        }
        j
    }
}

/// Forward-difference step scaled to the parameter magnitude.
#[inline]
pub fn fd_step(value: f64) -> f64 {
    FD_STEP * value.abs().max(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Maximum number of accepted or rejected Jacobian evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Tolerance on the largest gradient component.
    pub gtol: f64,
    /// Relative tolerance on the parameter update.
    pub xtol: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    /// `0.5 * |r|^2` at the returned parameters.
    pub final_cost: f64,
    pub converged: bool,
}

fn solve_damped(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    a.clone()
        .cholesky()
        .map(|c| c.solve(b))
        .or_else(|| a.clone().lu().solve(b))
        .filter(|d| d.iter().all(|v| v.is_finite()))
}

/// Minimise `0.5 * |r(x)|^2` starting from `x0`.
pub fn solve<P: NllsProblem + ?Sized>(
    problem: &P,
    x0: DVector<f64>,
    opts: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let mut x = x0;
    let mut r = problem.residuals(&x);
    let mut cost = 0.5 * r.norm_squared();
    let mut lambda = INITIAL_LAMBDA;
    let mut iterations = 0;
    let mut converged = false;

    if !cost.is_finite() {
        return (
            x,
            SolveReport {
                iterations,
                final_cost: cost,
                converged,
            },
        );
    }

    'outer: while iterations < opts.max_iters {
        iterations += 1;
        let j = problem.jacobian(&x);
        let g = j.tr_mul(&r);
        if g.amax() <= opts.gtol {
            converged = true;
            break;
        }
        let jtj = j.tr_mul(&j);
        let neg_g = -&g;

        loop {
            let mut a = jtj.clone();
            for i in 0..a.nrows() {
                a[(i, i)] += lambda * jtj[(i, i)].max(DIAG_FLOOR);
            }

            if let Some(delta) = solve_damped(&a, &neg_g) {
                let x_new = &x + &delta;
                let r_new = problem.residuals(&x_new);
                let cost_new = 0.5 * r_new.norm_squared();
                if cost_new.is_finite() && cost_new < cost {
                    let small_step = delta.norm() <= opts.xtol * (x.norm() + opts.xtol);
                    let small_reduction = cost - cost_new <= opts.ftol * cost;
                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda * 0.1).max(MIN_LAMBDA);
                    if small_step || small_reduction {
                        converged = true;
                        break 'outer;
                    }
                    break;
                }
            }

            lambda *= 10.0;
            if lambda > MAX_LAMBDA {
                // No damped step decreases the cost any more.
                converged = true;
                break 'outer;
            }
        }
    }

    (
        x,
        SolveReport {
            iterations,
            final_cost: cost,
            converged,
        },
    )
}
