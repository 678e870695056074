//! Per-run evaluation context.
//!
//! A [`RunContext`] is created by the driver when a run starts and dropped when
//! it returns. It owns the variable and constraint layouts of the run, the
//! iteration counter and the caches of the last evaluated point, so that
//! constraint and gradient queries never depend on the order in which an
//! optimizer issues them.
use crate::errors::{DriverError, Result};
use crate::layout::{ConstraintLayout, VariableLayout};
use crate::model::Model;
use crate::optimizers::{BlackBoxProblem, ConstraintRow, Evaluation};
use crate::recorder::RecorderList;
use crate::types::RunMetadata;
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1};

/// Model outputs at one point
#[derive(Clone, Debug)]
struct PointCache<T> {
    x: Array1<f64>,
    value: T,
}

impl<T> PointCache<T> {
    fn at(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Option<&T> {
        (self.x == *x).then_some(&self.value)
    }
}

#[derive(Clone, Debug)]
struct Outputs {
    objective: f64,
    constraints: Array1<f64>,
}

/// Evaluation context of one driver run
pub struct RunContext<'a> {
    model: &'a mut dyn Model,
    recorders: &'a mut RecorderList,
    variables: VariableLayout,
    constraints: ConstraintLayout,
    rows: Vec<ConstraintRow>,
    objective: String,
    metadata: RunMetadata,
    x_init: Array1<f64>,
    last: Option<PointCache<Outputs>>,
    jacobian: Option<PointCache<Array2<f64>>>,
}

impl<'a> RunContext<'a> {
    /// Context over the current `model` state
    ///
    /// Fails when the model does not have exactly one objective.
    pub fn new(
        name: &str,
        model: &'a mut dyn Model,
        recorders: &'a mut RecorderList,
    ) -> Result<Self> {
        let objectives = model.objectives();
        let objective = match objectives.len() {
            0 => return Err(DriverError::NoObjective),
            1 => objectives[0].0.clone(),
            n => return Err(DriverError::MultipleObjectives(n)),
        };
        let variables = VariableLayout::new(model.desvar_metadata());
        let constraints = ConstraintLayout::new(model.constraint_metadata())?;
        let rows = constraints
            .elements()
            .into_iter()
            .map(|(name, index)| {
                let equality = constraints.is_equality(&name)?;
                Ok(ConstraintRow {
                    name,
                    index,
                    equality,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let x_init = variables.flatten(&*model)?;
        Ok(RunContext {
            model,
            recorders,
            variables,
            constraints,
            rows,
            objective,
            metadata: RunMetadata::new(name),
            x_init,
            last: None,
            jacobian: None,
        })
    }

    /// Variables layout of the run
    pub fn variables(&self) -> &VariableLayout {
        &self.variables
    }

    /// Current iteration metadata
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Number of model evaluations triggered through [`RunContext::objective`]
    pub fn n_evaluations(&self) -> usize {
        self.metadata.iteration
    }

    /// Runs the model once at its current design variables without counting
    /// an iteration
    ///
    /// Nothing is cached: the optimizer evaluation of the starting point still
    /// goes through [`RunContext::objective`] and is recorded.
    pub fn initial_evaluation(&mut self) -> Result<()> {
        self.model.solve_nonlinear(&self.metadata)
    }

    fn read_outputs(&self) -> Result<Outputs> {
        let objective = self
            .model
            .objectives()
            .into_iter()
            .find(|(name, _)| *name == self.objective)
            .map(|(_, value)| value)
            .ok_or(DriverError::NoObjective)?;
        let constraints = self.constraints.capture(&*self.model)?;
        Ok(Outputs {
            objective,
            constraints,
        })
    }

    /// Evaluates the model at `x` and returns the objective value
    ///
    /// Design variables are set from `x`, the model is solved, the constraint
    /// values are cached for the point and recorders are notified.
    pub fn objective(&mut self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<f64> {
        self.variables.apply(x, self.model)?;
        self.metadata.update(self.metadata.iteration + 1);
        self.model.solve_nonlinear(&self.metadata)?;
        let outputs = self.read_outputs()?;
        self.recorders.record_iteration(&*self.model, &self.metadata)?;
        trace!("{} f={}", self.metadata.coord(), outputs.objective);
        let objective = outputs.objective;
        self.last = Some(PointCache {
            x: x.to_owned(),
            value: outputs,
        });
        Ok(objective)
    }

    fn ensure_evaluated(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<&Outputs> {
        let cached = self.last.as_ref().is_some_and(|c| c.at(x).is_some());
        if !cached {
            self.objective(x)?;
        }
        self.last
            .as_ref()
            .map(|c| &c.value)
            .ok_or(DriverError::NotEvaluated)
    }

    /// Value of the `idx`th element of constraint `name` at the last evaluated
    /// point, satisfied when non-negative
    pub fn constraint_value(&self, name: &str, idx: usize) -> Result<f64> {
        let last = self.last.as_ref().ok_or(DriverError::NotEvaluated)?;
        self.constraints.value(name, idx, &last.value.constraints)
    }

    fn ensure_jacobian(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<&Array2<f64>> {
        let cached = self.jacobian.as_ref().is_some_and(|c| c.at(x).is_some());
        if !cached {
            self.ensure_evaluated(x)?;
            let params = self.variables.names();
            let outputs: Vec<String> = std::iter::once(self.objective.clone())
                .chain(self.constraints.names())
                .collect();
            let jac = self.model.calc_gradient(&params, &outputs)?;
            let expected = (1 + self.constraints.n_rows(), self.variables.size());
            if jac.dim() != expected {
                return Err(DriverError::DimensionMismatch {
                    expected: expected.0 * expected.1,
                    got: jac.len(),
                });
            }
            debug!("Jacobian computed at {}", self.metadata.coord());
            self.jacobian = Some(PointCache {
                x: x.to_owned(),
                value: jac,
            });
        }
        self.jacobian
            .as_ref()
            .map(|c| &c.value)
            .ok_or(DriverError::NotEvaluated)
    }

    /// Gradient of the objective at `x`
    ///
    /// The jacobian of objective and constraints is computed once per point and
    /// serves the following [`RunContext::constraint_gradient`] calls.
    pub fn objective_gradient(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<Array1<f64>> {
        Ok(self.ensure_jacobian(x)?.index_axis(Axis(0), 0).to_owned())
    }

    /// Gradient at `x` of the value returned by [`RunContext::constraint_value`]
    pub fn constraint_gradient(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        name: &str,
        idx: usize,
    ) -> Result<Array1<f64>> {
        self.ensure_jacobian(x)?;
        let jac = self.jacobian.as_ref().ok_or(DriverError::NotEvaluated)?;
        self.constraints.gradient(name, idx, &jac.value)
    }

    /// Objective and constraint values at `x`, evaluating the model unless `x`
    /// is the last evaluated point
    pub fn evaluate(&mut self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Evaluation> {
        self.variables.check_dim(x.len())?;
        self.ensure_evaluated(x)?;
        let objective = self
            .last
            .as_ref()
            .map(|c| c.value.objective)
            .ok_or(DriverError::NotEvaluated)?;
        let constraints = self
            .rows
            .iter()
            .map(|row| self.constraint_value(&row.name, row.index))
            .collect::<Result<Array1<f64>>>()?;
        Ok(Evaluation {
            objective,
            constraints,
        })
    }
}

impl<'a> BlackBoxProblem for RunContext<'a> {
    fn dim(&self) -> usize {
        self.variables.size()
    }

    fn x_init(&self) -> Array1<f64> {
        self.x_init.clone()
    }

    fn constraint_rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    fn evaluate(&mut self, x: &ArrayView1<f64>) -> Result<Evaluation> {
        RunContext::evaluate(self, x)
    }

    fn objective_gradient(&mut self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        RunContext::objective_gradient(self, x)
    }

    fn constraint_gradient(&mut self, x: &ArrayView1<f64>, row: usize) -> Result<Array1<f64>> {
        let (name, index) = self
            .rows
            .get(row)
            .map(|r| (r.name.clone(), r.index))
            .ok_or_else(|| DriverError::ConstraintIndex {
                name: "*".to_string(),
                index: row,
                size: self.rows.len(),
            })?;
        RunContext::constraint_gradient(self, x, &name, index)
    }
}
