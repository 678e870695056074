use super::{bound_pairs, inequality_rows, BlackBoxProblem, Callbacks, ExternalOptimizer};
use crate::errors::Result;
use crate::options::OptimizerParams;
use crate::types::{ExitStatus, OptimOutcome};
use log::{debug, info};
use ndarray::{arr1, Array1};
use slsqp::{minimize, StopTols};

/// Gradient-based SLSQP optimizer
///
/// Uses the objective and constraint gradients of the problem, `n_iterations`
/// is the maximum number of evaluations.
#[derive(Clone, Debug)]
pub struct SlsqpOptimizer {
    ftol_rel: f64,
    ftol_abs: f64,
    equality_tol: f64,
}

impl Default for SlsqpOptimizer {
    fn default() -> Self {
        SlsqpOptimizer {
            ftol_rel: 1e-8,
            ftol_abs: 0.,
            equality_tol: 1e-6,
        }
    }
}

impl SlsqpOptimizer {
    /// Sets the relative tolerance on the objective
    pub fn ftol_rel(mut self, ftol_rel: f64) -> Self {
        self.ftol_rel = ftol_rel;
        self
    }

    /// Sets the absolute tolerance on the objective
    pub fn ftol_abs(mut self, ftol_abs: f64) -> Self {
        self.ftol_abs = ftol_abs;
        self
    }

    /// Sets the tolerance used to turn equalities into pairs of inequalities
    pub fn equality_tol(mut self, equality_tol: f64) -> Self {
        self.equality_tol = equality_tol;
        self
    }
}

impl ExternalOptimizer for SlsqpOptimizer {
    fn name(&self) -> &str {
        "Slsqp"
    }

    fn optimize(
        &self,
        problem: &mut dyn BlackBoxProblem,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        params: &OptimizerParams,
    ) -> Result<OptimOutcome> {
        let xinit = problem.x_init().to_vec();
        let bounds = bound_pairs(lower, upper);
        let ineqs = inequality_rows(problem.constraint_rows(), self.equality_tol);
        debug!(
            "SLSQP: {} variables, {} inequalities",
            xinit.len(),
            ineqs.len()
        );

        let callbacks = Callbacks::new(problem);
        let res = {
            let cb = &callbacks;
            // slsqp constraints are satisfied when negative
            let cstrs: Vec<_> = ineqs
                .iter()
                .map(|row| {
                    move |x: &[f64], grad: Option<&mut [f64]>, _u: &mut ()| {
                        let value = -row.value(&cb.evaluate(x).constraints);
                        if let Some(grad) = grad {
                            let g = cb.constraint_gradient(x, row.source);
                            grad.iter_mut()
                                .zip(g.iter())
                                .for_each(|(dst, v)| *dst = -row.sign * v);
                        }
                        value
                    }
                })
                .collect();
            let obj = |x: &[f64], grad: Option<&mut [f64]>, _u: &mut ()| {
                let value = cb.evaluate(x).objective;
                if let Some(grad) = grad {
                    let g = cb.objective_gradient(x);
                    grad.copy_from_slice(&g.to_vec());
                }
                value
            };
            minimize(
                obj,
                &xinit,
                &bounds,
                &cstrs,
                (),
                params.n_iterations,
                Some(StopTols {
                    ftol_rel: self.ftol_rel,
                    ftol_abs: self.ftol_abs,
                    ..StopTols::default()
                }),
            )
        };
        let outcome = match res {
            Ok((status, x_opt, y_opt)) => {
                info!("SLSQP ended with {:?}", status);
                OptimOutcome {
                    min_value: y_opt,
                    x_best: arr1(&x_opt),
                    status: ExitStatus::Success,
                }
            }
            Err((status, x_opt, y_opt)) => OptimOutcome {
                min_value: y_opt,
                x_best: arr1(&x_opt),
                status: ExitStatus::Failure {
                    reason: format!("SLSQP {status:?}"),
                },
            },
        };
        callbacks.finish(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::tests::Quadratic;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_slsqp_constrained() {
        let mut problem = Quadratic::new();
        let params = OptimizerParams {
            n_iterations: 100,
            ..OptimizerParams::default()
        };
        let res = SlsqpOptimizer::default()
            .optimize(&mut problem, &array![-5., -5.], &array![5., 5.], &params)
            .unwrap();
        assert!(res.status.is_success());
        assert_abs_diff_eq!(res.x_best, array![1., 2.], epsilon = 1e-3);
        assert_abs_diff_eq!(res.min_value, 1., epsilon = 1e-3);
    }
}
