//! A [`Model`] made of explicit functions of the design variables.
//!
//! Outputs are computed by closures taking the current design variable values,
//! derivatives are approximated with central finite differences.
//!
//! ```
//! use egobox_driver::{DesignVariable, ExplicitModel, Model, RunMetadata};
//! use ndarray::array;
//!
//! let mut model = ExplicitModel::new();
//! model
//!     .add_desvar(DesignVariable::new("x", 1).lower(-50.).upper(50.), array![3.])
//!     .unwrap()
//!     .add_desvar(DesignVariable::new("y", 1).lower(-50.).upper(50.), array![-4.])
//!     .unwrap()
//!     .add_objective("f_xy", |inputs| {
//!         let (x, y) = (inputs.scalar("x"), inputs.scalar("y"));
//!         (x - 3.).powi(2) + x * y + (y + 4.).powi(2) - 3.
//!     })
//!     .unwrap();
//! model.solve_nonlinear(&RunMetadata::new("doc")).unwrap();
//! assert_eq!(model.objectives()[0].1, -15.);
//! ```
use crate::errors::{DriverError, Result};
use crate::model::Model;
use crate::types::{Constraint, DesignVariable, RunMetadata};
use anyhow::anyhow;
use finitediff::FiniteDiff;
use log::trace;
use ndarray::{Array1, Array2, ArrayView1};
use std::ops::Index;

type ScalarFn = Box<dyn Fn(&Inputs) -> f64>;
type VectorFn = Box<dyn Fn(&Inputs) -> Array1<f64>>;

/// Named design variable values handed to output functions
pub struct Inputs<'a> {
    vars: &'a [DesignVariable],
    values: &'a [Array1<f64>],
}

impl<'a> Inputs<'a> {
    /// Value of the variable `name` if any
    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.vars
            .iter()
            .position(|v| v.name == name)
            .map(|i| &self.values[i])
    }

    /// First element of the variable `name`
    ///
    /// # Panics
    ///
    /// When `name` is not a design variable
    pub fn scalar(&self, name: &str) -> f64 {
        self[name][0]
    }
}

impl<'a> Index<&str> for Inputs<'a> {
    type Output = Array1<f64>;

    fn index(&self, name: &str) -> &Self::Output {
        self.get(name)
            .unwrap_or_else(|| panic!("unknown design variable '{name}'"))
    }
}

struct Objective {
    name: String,
    func: ScalarFn,
    value: f64,
}

struct ConstraintOutput {
    meta: Constraint,
    func: VectorFn,
    value: Array1<f64>,
}

/// A model whose outputs are explicit functions of its design variables
#[derive(Default)]
pub struct ExplicitModel {
    desvars: Vec<DesignVariable>,
    values: Vec<Array1<f64>>,
    objective: Option<Objective>,
    constraints_meta: Vec<Constraint>,
    constraints: Vec<ConstraintOutput>,
    n_solves: usize,
}

impl ExplicitModel {
    /// An empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a design variable with its initial value
    pub fn add_desvar(&mut self, var: DesignVariable, init: Array1<f64>) -> Result<&mut Self> {
        if var.size == 0 {
            return Err(DriverError::InvalidOption(format!(
                "design variable '{}' has a null size",
                var.name
            )));
        }
        if self.desvars.iter().any(|v| v.name == var.name) {
            return Err(DriverError::InvalidOption(format!(
                "design variable '{}' already registered",
                var.name
            )));
        }
        if init.len() != var.size {
            return Err(DriverError::DimensionMismatch {
                expected: var.size,
                got: init.len(),
            });
        }
        for bound in [&var.lower, &var.upper].into_iter().flatten() {
            bound.check_size(&var.name, var.size)?;
        }
        self.desvars.push(var);
        self.values.push(init);
        Ok(self)
    }

    /// Registers the objective, a second registration is rejected
    pub fn add_objective<F>(&mut self, name: impl Into<String>, func: F) -> Result<&mut Self>
    where
        F: Fn(&Inputs) -> f64 + 'static,
    {
        if self.objective.is_some() {
            return Err(DriverError::MultipleObjectives(2));
        }
        self.objective = Some(Objective {
            name: name.into(),
            func: Box::new(func),
            value: f64::NAN,
        });
        Ok(self)
    }

    /// Registers a constraint computed by `func`
    pub fn add_constraint<F>(&mut self, meta: Constraint, func: F) -> Result<&mut Self>
    where
        F: Fn(&Inputs) -> Array1<f64> + 'static,
    {
        meta.check()?;
        if self.constraints_meta.iter().any(|c| c.name == meta.name) {
            return Err(DriverError::InvalidOption(format!(
                "constraint '{}' already registered",
                meta.name
            )));
        }
        self.constraints.push(ConstraintOutput {
            meta: meta.clone(),
            func: Box::new(func),
            value: Array1::from_elem(meta.size, f64::NAN),
        });
        self.constraints_meta.push(meta);
        Ok(self)
    }

    /// Number of `solve_nonlinear` calls so far
    pub fn n_solves(&self) -> usize {
        self.n_solves
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.desvars
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| DriverError::UnknownVariable(name.to_string()))
    }

    fn eval_constraint(
        &self,
        output: &ConstraintOutput,
        values: &[Array1<f64>],
    ) -> Result<Array1<f64>> {
        let inputs = Inputs {
            vars: &self.desvars,
            values,
        };
        let value = (output.func)(&inputs);
        if value.len() != output.meta.size {
            return Err(anyhow!(
                "constraint '{}' computed {} values, expected {}",
                output.meta.name,
                value.len(),
                output.meta.size
            )
            .into());
        }
        Ok(value)
    }

    /// Builds a scalar function of the flat `params` vector computing the
    /// `k`th element of the output `name`
    fn output_element<'a>(
        &'a self,
        params: &'a [(usize, usize)],
        name: &'a str,
        k: usize,
    ) -> Result<impl Fn(&Vec<f64>) -> f64 + 'a> {
        let objective = self.objective.as_ref().filter(|o| o.name == name);
        let constraint = self.constraints.iter().find(|c| c.meta.name == name);
        if objective.is_none() && constraint.is_none() {
            return Err(DriverError::Model(anyhow!("unknown output '{name}'")));
        }
        Ok(move |x: &Vec<f64>| {
            let mut values = self.values.clone();
            for &(index, offset) in params {
                let size = self.desvars[index].size;
                values[index] = Array1::from(x[offset..offset + size].to_vec());
            }
            let inputs = Inputs {
                vars: &self.desvars,
                values: &values,
            };
            match (objective, constraint) {
                (Some(obj), _) => (obj.func)(&inputs),
                (None, Some(cstr)) => (cstr.func)(&inputs)[k],
                (None, None) => f64::NAN,
            }
        })
    }

    fn output_size(&self, name: &str) -> Result<usize> {
        if self.objective.as_ref().is_some_and(|o| o.name == name) {
            Ok(1)
        } else {
            self.constraints_meta
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.size)
                .ok_or_else(|| DriverError::Model(anyhow!("unknown output '{name}'")))
        }
    }
}

impl Model for ExplicitModel {
    fn desvar_metadata(&self) -> &[DesignVariable] {
        &self.desvars
    }

    fn desvar(&self, name: &str) -> Result<Array1<f64>> {
        Ok(self.values[self.index_of(name)?].clone())
    }

    fn set_desvar(&mut self, name: &str, value: &ArrayView1<f64>) -> Result<()> {
        let index = self.index_of(name)?;
        if value.len() != self.desvars[index].size {
            return Err(DriverError::DimensionMismatch {
                expected: self.desvars[index].size,
                got: value.len(),
            });
        }
        self.values[index].assign(value);
        Ok(())
    }

    fn objectives(&self) -> Vec<(String, f64)> {
        self.objective
            .iter()
            .map(|o| (o.name.clone(), o.value))
            .collect()
    }

    fn constraint_metadata(&self) -> &[Constraint] {
        &self.constraints_meta
    }

    fn constraint(&self, name: &str) -> Result<Array1<f64>> {
        self.constraints
            .iter()
            .find(|c| c.meta.name == name)
            .map(|c| c.value.clone())
            .ok_or_else(|| DriverError::UnknownConstraint(name.to_string()))
    }

    fn solve_nonlinear(&mut self, metadata: &RunMetadata) -> Result<()> {
        let inputs = Inputs {
            vars: &self.desvars,
            values: &self.values,
        };
        let objective = self.objective.as_ref().map(|o| (o.func)(&inputs));
        let constraints = self
            .constraints
            .iter()
            .map(|c| self.eval_constraint(c, &self.values))
            .collect::<Result<Vec<_>>>()?;

        if let (Some(obj), Some(value)) = (self.objective.as_mut(), objective) {
            obj.value = value;
        }
        for (output, value) in self.constraints.iter_mut().zip(constraints) {
            output.value = value;
        }
        self.n_solves += 1;
        trace!("Solve {} at {:?}", metadata.coord(), self.values);
        Ok(())
    }

    fn calc_gradient(&mut self, params: &[String], outputs: &[String]) -> Result<Array2<f64>> {
        let mut slots = Vec::with_capacity(params.len());
        let mut x: Vec<f64> = Vec::new();
        for name in params {
            let index = self.index_of(name)?;
            slots.push((index, x.len()));
            x.extend(self.values[index].iter());
        }

        let mut rows = Vec::new();
        for name in outputs {
            for k in 0..self.output_size(name)? {
                let f = self.output_element(&slots, name, k)?;
                rows.push(x.central_diff(&f));
            }
        }
        let n_rows = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((n_rows, x.len()), flat).map_err(|e| DriverError::Model(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn paraboloid() -> ExplicitModel {
        let mut model = ExplicitModel::new();
        model
            .add_desvar(
                DesignVariable::new("x", 1).lower(-50.).upper(50.),
                array![13.],
            )
            .unwrap()
            .add_desvar(
                DesignVariable::new("y", 1).lower(-50.).upper(50.),
                array![-14.],
            )
            .unwrap()
            .add_objective("f_xy", |inputs| {
                let (x, y) = (inputs.scalar("x"), inputs.scalar("y"));
                (x - 3.).powi(2) + x * y + (y + 4.).powi(2) - 3.
            })
            .unwrap()
            .add_constraint(Constraint::upper("c", 1, 10.), |inputs| {
                array![inputs.scalar("x") - inputs.scalar("y")]
            })
            .unwrap();
        model
    }

    #[test]
    fn test_solve_nonlinear() {
        let mut model = paraboloid();
        assert!(model.objectives()[0].1.is_nan());
        model.solve_nonlinear(&RunMetadata::new("test")).unwrap();
        // (13-3)^2 + 13*(-14) + (-10)^2 - 3
        assert_eq!(model.objectives()[0].1, 15.);
        assert_eq!(model.constraint("c").unwrap(), array![27.]);
        assert_eq!(model.n_solves(), 1);
    }

    #[test]
    fn test_second_objective_rejected() {
        let mut model = paraboloid();
        let res = model.add_objective("g", |_| 0.);
        assert!(matches!(res, Err(DriverError::MultipleObjectives(2))));
        assert_eq!(model.objectives().len(), 1);
    }

    #[test]
    fn test_registration_checks() {
        let mut model = paraboloid();
        assert!(model
            .add_desvar(DesignVariable::new("x", 1), array![0.])
            .is_err());
        assert!(matches!(
            model.add_desvar(DesignVariable::new("z", 2), array![0.]),
            Err(DriverError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
        assert!(model
            .add_desvar(
                DesignVariable::new("w", 2).lower(vec![0., 1., 2.]),
                array![0., 0.]
            )
            .is_err());
    }

    #[test]
    fn test_set_desvar() {
        let mut model = paraboloid();
        model.set_desvar("x", &array![1.].view()).unwrap();
        assert_eq!(model.desvar("x").unwrap(), array![1.]);
        assert!(matches!(
            model.set_desvar("u", &array![1.].view()),
            Err(DriverError::UnknownVariable(_))
        ));
        assert!(model.set_desvar("x", &array![1., 2.].view()).is_err());
    }

    #[test]
    fn test_calc_gradient() {
        let mut model = paraboloid();
        model.solve_nonlinear(&RunMetadata::new("test")).unwrap();
        let params = vec!["x".to_string(), "y".to_string()];
        let outputs = vec!["f_xy".to_string(), "c".to_string()];
        let jac = model.calc_gradient(&params, &outputs).unwrap();
        assert_eq!(jac.dim(), (2, 2));
        // df/dx = 2x - 6 + y, df/dy = 2y + 8 + x
        assert_abs_diff_eq!(jac[[0, 0]], 2. * 13. - 6. - 14., epsilon = 1e-5);
        assert_abs_diff_eq!(jac[[0, 1]], 2. * -14. + 8. + 13., epsilon = 1e-5);
        assert_abs_diff_eq!(jac.row(1), array![1., -1.], epsilon = 1e-6);
        // design variables are left untouched
        assert_eq!(model.desvar("x").unwrap(), array![13.]);
    }

    #[test]
    fn test_calc_gradient_unknown_output() {
        let mut model = paraboloid();
        let res = model.calc_gradient(&["x".to_string()], &["nope".to_string()]);
        assert!(matches!(res, Err(DriverError::Model(_))));
    }
}
