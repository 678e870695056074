//! Mapping between named model entities and flat vectors.
//!
//! [`VariableLayout`] fixes once per run the position of every design variable
//! element in the flat vector handed to optimizers, [`ConstraintLayout`] fixes the
//! position of every constraint element in the cached constraint values and in
//! the rows of the cached jacobian (row 0 being the objective).
use crate::errors::{DriverError, Result};
use crate::model::Model;
use crate::types::{Constraint, DesignVariable};
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1};
use std::collections::HashMap;

#[derive(Clone, Debug)]
struct Slot {
    var: DesignVariable,
    offset: usize,
}

/// Position of design variables in the flat vector
#[derive(Clone, Debug)]
pub struct VariableLayout {
    slots: Vec<Slot>,
    size: usize,
}

impl VariableLayout {
    /// Layout following the order of given design variables
    pub fn new(vars: &[DesignVariable]) -> Self {
        let mut offset = 0;
        let slots = vars
            .iter()
            .map(|var| {
                let slot = Slot {
                    var: var.clone(),
                    offset,
                };
                offset += var.size;
                slot
            })
            .collect();
        VariableLayout {
            slots,
            size: offset,
        }
    }

    /// Total number of flat elements
    pub fn size(&self) -> usize {
        self.size
    }

    /// Design variable names in layout order
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.var.name.clone()).collect()
    }

    /// Concatenates current design variable values of the `model`
    pub fn flatten(&self, model: &dyn Model) -> Result<Array1<f64>> {
        let mut x = Array1::zeros(self.size);
        for slot in &self.slots {
            let value = model.desvar(&slot.var.name)?;
            if value.len() != slot.var.size {
                return Err(DriverError::DimensionMismatch {
                    expected: slot.var.size,
                    got: value.len(),
                });
            }
            x.slice_mut(s![slot.offset..slot.offset + slot.var.size])
                .assign(&value);
        }
        Ok(x)
    }

    /// Returns flat `(lower, upper)` bounds
    ///
    /// Scalar bounds are broadcast over the variable elements. Every variable
    /// has to be bounded on both sides.
    pub fn bounds(&self) -> Result<(Array1<f64>, Array1<f64>)> {
        let mut lower = Array1::zeros(self.size);
        let mut upper = Array1::zeros(self.size);
        for slot in &self.slots {
            let var = &slot.var;
            let lo = var
                .lower
                .as_ref()
                .ok_or_else(|| DriverError::MissingBounds(var.name.clone(), "lower"))?;
            let up = var
                .upper
                .as_ref()
                .ok_or_else(|| DriverError::MissingBounds(var.name.clone(), "upper"))?;
            lo.check_size(&var.name, var.size)?;
            up.check_size(&var.name, var.size)?;
            for j in 0..var.size {
                lower[slot.offset + j] = lo.at(j);
                upper[slot.offset + j] = up.at(j);
            }
        }
        Ok((lower, upper))
    }

    /// Bounds as a (nx, 2) matrix of `[lower, upper]` rows
    pub fn xlimits(&self) -> Result<Array2<f64>> {
        let (lower, upper) = self.bounds()?;
        let mut xlimits = Array2::zeros((self.size, 2));
        xlimits.column_mut(0).assign(&lower);
        xlimits.column_mut(1).assign(&upper);
        Ok(xlimits)
    }

    /// Splits the flat vector `x` in per-variable chunks, in layout order
    pub fn unflatten<'a>(
        &'a self,
        x: &'a ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<Vec<(&'a str, ArrayView1<'a, f64>)>> {
        self.check_dim(x.len())?;
        Ok(self
            .slots
            .iter()
            .map(|slot| {
                (
                    slot.var.name.as_str(),
                    x.slice(s![slot.offset..slot.offset + slot.var.size]),
                )
            })
            .collect())
    }

    /// Writes the flat vector `x` back into the `model` design variables
    pub fn apply(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        model: &mut dyn Model,
    ) -> Result<()> {
        for (name, value) in self.unflatten(x)? {
            model.set_desvar(name, &value)?;
        }
        Ok(())
    }

    /// Checks a flat vector length
    pub fn check_dim(&self, len: usize) -> Result<()> {
        if len != self.size {
            return Err(DriverError::DimensionMismatch {
                expected: self.size,
                got: len,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct ConstraintSlot {
    cstr: Constraint,
    row_offset: usize,
}

/// Position of constraints elements in cached values and jacobian rows
#[derive(Clone, Debug)]
pub struct ConstraintLayout {
    slots: Vec<ConstraintSlot>,
    index: HashMap<String, usize>,
    n_rows: usize,
}

impl ConstraintLayout {
    /// Layout following the order of given constraints
    pub fn new(cstrs: &[Constraint]) -> Result<Self> {
        let mut slots = Vec::with_capacity(cstrs.len());
        let mut index = HashMap::new();
        let mut row_offset = 0;
        for (i, cstr) in cstrs.iter().enumerate() {
            cstr.check()?;
            index.insert(cstr.name.clone(), i);
            slots.push(ConstraintSlot {
                cstr: cstr.clone(),
                row_offset,
            });
            row_offset += cstr.size;
        }
        Ok(ConstraintLayout {
            slots,
            index,
            n_rows: row_offset,
        })
    }

    /// Total number of constraint elements
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Constraint names in layout order
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.cstr.name.clone()).collect()
    }

    /// Constraints in layout order
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.slots.iter().map(|s| &s.cstr)
    }

    /// `(name, element index)` of every constraint element in layout order
    pub fn elements(&self) -> Vec<(String, usize)> {
        self.slots
            .iter()
            .flat_map(|s| (0..s.cstr.size).map(move |i| (s.cstr.name.clone(), i)))
            .collect()
    }

    fn slot(&self, name: &str, idx: usize) -> Result<&ConstraintSlot> {
        let slot = self
            .index
            .get(name)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| DriverError::UnknownConstraint(name.to_string()))?;
        if idx >= slot.cstr.size {
            return Err(DriverError::ConstraintIndex {
                name: name.to_string(),
                index: idx,
                size: slot.cstr.size,
            });
        }
        Ok(slot)
    }

    /// Reads constraint values from the `model` as a flat vector in layout order
    pub fn capture(&self, model: &dyn Model) -> Result<Array1<f64>> {
        let mut values = Array1::zeros(self.n_rows);
        for slot in &self.slots {
            let value = model.constraint(&slot.cstr.name)?;
            if value.len() != slot.cstr.size {
                return Err(DriverError::DimensionMismatch {
                    expected: slot.cstr.size,
                    got: value.len(),
                });
            }
            values
                .slice_mut(s![slot.row_offset..slot.row_offset + slot.cstr.size])
                .assign(&value);
        }
        Ok(values)
    }

    /// Constraint value, satisfied when non-negative, computed from flat
    /// raw `values` as returned by [`ConstraintLayout::capture`]
    ///
    /// * equality: `target - value`
    /// * lower only: `value - lower`
    /// * upper only or double sided: `upper - value`
    pub fn value(&self, name: &str, idx: usize, values: &Array1<f64>) -> Result<f64> {
        let slot = self.slot(name, idx)?;
        let (reference, sign) = slot.cstr.kind.linearization(idx);
        Ok(sign * (values[slot.row_offset + idx] - reference))
    }

    /// Row of the jacobian `[objective, constraints...]` holding the
    /// derivatives of the `idx`th element of constraint `name`
    pub fn jacobian_row(&self, name: &str, idx: usize) -> Result<usize> {
        let slot = self.slot(name, idx)?;
        Ok(slot.row_offset + idx + 1)
    }

    /// Gradient of the constraint value returned by [`ConstraintLayout::value`]
    /// taken from the jacobian of `[objective, constraints...]`
    pub fn gradient(&self, name: &str, idx: usize, jac: &Array2<f64>) -> Result<Array1<f64>> {
        let row = self.jacobian_row(name, idx)?;
        let (_, sign) = self.slot(name, idx)?.cstr.kind.linearization(idx);
        Ok(jac.index_axis(Axis(0), row).mapv(|v| sign * v))
    }

    /// Whether the named constraint is an equality
    pub fn is_equality(&self, name: &str) -> Result<bool> {
        Ok(self.slot(name, 0)?.cstr.kind.is_equality())
    }
}
