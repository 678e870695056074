use super::{bound_pairs, inequality_rows, BlackBoxProblem, Callbacks, ExternalOptimizer};
use crate::errors::Result;
use crate::options::OptimizerParams;
use crate::types::{ExitStatus, OptimOutcome};
use cobyla::{minimize, RhoBeg, StopTols};
use log::{debug, info};
use ndarray::{arr1, Array1};

/// Derivative-free COBYLA optimizer
///
/// `n_iterations` is used as the budget of problem evaluations, other
/// surrogate related parameters are ignored.
#[derive(Clone, Debug)]
pub struct CobylaOptimizer {
    rhobeg: f64,
    ftol_rel: f64,
    ftol_abs: f64,
    equality_tol: f64,
}

impl Default for CobylaOptimizer {
    fn default() -> Self {
        CobylaOptimizer {
            rhobeg: 0.5,
            ftol_rel: 1e-8,
            ftol_abs: 0.,
            equality_tol: 1e-6,
        }
    }
}

impl CobylaOptimizer {
    /// Sets the initial trust region radius
    pub fn rhobeg(mut self, rhobeg: f64) -> Self {
        self.rhobeg = rhobeg;
        self
    }

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

impl ExternalOptimizer for CobylaOptimizer {
    fn name(&self) -> &str {
        "Cobyla"
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
            "COBYLA: {} variables, {} inequalities, {} evaluations",
            xinit.len(),
            ineqs.len(),
            params.n_iterations
        );

        let callbacks = Callbacks::new(problem);
        let res = {
            let cb = &callbacks;
            let cstrs: Vec<_> = ineqs
                .iter()
                .map(|row| {
                    move |x: &[f64], _u: &mut ()| row.value(&cb.evaluate(x).constraints)
                })
                .collect();
            minimize(
                |x: &[f64], _u: &mut ()| cb.evaluate(x).objective,
                &xinit,
                &bounds,
                &cstrs,
                (),
                params.n_iterations,
                RhoBeg::All(self.rhobeg),
                Some(StopTols {
                    ftol_rel: self.ftol_rel,
                    ftol_abs: self.ftol_abs,
                    ..StopTols::default()
                }),
            )
        };
        let outcome = match res {
            Ok((status, x_opt, y_opt)) => {
                info!("COBYLA ended with {:?}", status);
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
                    reason: format!("COBYLA {status:?}"),
                },
            },
        };
        callbacks.finish(outcome)
    }
}
