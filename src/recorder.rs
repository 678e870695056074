//! Iteration recording.
//!
//! A [`Recorder`] is called once per model evaluation done by a driver, after
//! objective and constraints have been gathered. Recorders are collected in a
//! [`RecorderList`] owned by the driver.
use crate::errors::Result;
use crate::model::Model;
use crate::types::RunMetadata;
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

/// Receives the model state after each evaluation
pub trait Recorder {
    /// Records the current state of `model` at the iteration described by `metadata`
    fn record_iteration(&mut self, model: &dyn Model, metadata: &RunMetadata) -> Result<()>;
}

/// Snapshot of the model state at one iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration coordinate, e.g. `Egor|3`
    pub coord: String,
    /// Iteration number
    pub iteration: usize,
    /// Design variable values
    pub desvars: BTreeMap<String, Array1<f64>>,
    /// Objective values
    pub objectives: BTreeMap<String, f64>,
    /// Raw constraint values
    pub constraints: BTreeMap<String, Array1<f64>>,
}

impl IterationRecord {
    /// Captures the current state of the `model`
    pub fn capture(model: &dyn Model, metadata: &RunMetadata) -> Result<Self> {
        let desvars = model
            .desvar_metadata()
            .iter()
            .map(|v| Ok((v.name.clone(), model.desvar(&v.name)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let constraints = model
            .constraint_metadata()
            .iter()
            .map(|c| Ok((c.name.clone(), model.constraint(&c.name)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(IterationRecord {
            coord: metadata.coord(),
            iteration: metadata.iteration,
            desvars,
            objectives: model.objectives().into_iter().collect(),
            constraints,
        })
    }
}

/// The recorders attached to a driver, called in insertion order
#[derive(Default)]
pub struct RecorderList {
    recorders: Vec<Box<dyn Recorder>>,
}

impl RecorderList {
    /// An empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a recorder
    pub fn push<R: Recorder + 'static>(&mut self, recorder: R) {
        self.recorders.push(Box::new(recorder));
    }

    /// Number of recorders
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    /// Whether no recorder is attached
    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    /// Forwards the iteration to every recorder, stops at the first failure
    pub fn record_iteration(&mut self, model: &dyn Model, metadata: &RunMetadata) -> Result<()> {
        self.recorders
            .iter_mut()
            .try_for_each(|r| r.record_iteration(model, metadata))
    }
}

/// Keeps records in memory
///
/// Clones share the same storage so that a handle kept by the caller sees the
/// records pushed by the copy attached to the driver.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    records: Rc<RefCell<Vec<IterationRecord>>>,
}

impl MemoryRecorder {
    /// An empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records collected so far
    pub fn records(&self) -> Vec<IterationRecord> {
        self.records.borrow().clone()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl Recorder for MemoryRecorder {
    fn record_iteration(&mut self, model: &dyn Model, metadata: &RunMetadata) -> Result<()> {
        let record = IterationRecord::capture(model, metadata)?;
        self.records.borrow_mut().push(record);
        Ok(())
    }
}

/// Writes one json line per iteration
pub struct JsonRecorder<W: Write> {
    out: W,
}

impl<W: Write> JsonRecorder<W> {
    /// Records into the given writer
    pub fn new(out: W) -> Self {
        JsonRecorder { out }
    }

    /// Gives back the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonRecorder<std::io::BufWriter<std::fs::File>> {
    /// Records into a file created at `path`
    pub fn create<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(JsonRecorder::new(std::io::BufWriter::new(file)))
    }
}

impl<W: Write> Recorder for JsonRecorder<W> {
    fn record_iteration(&mut self, model: &dyn Model, metadata: &RunMetadata) -> Result<()> {
        let record = IterationRecord::capture(model, metadata)?;
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Logs each iteration at debug level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record_iteration(&mut self, model: &dyn Model, metadata: &RunMetadata) -> Result<()> {
        debug!("{} objectives={:?}", metadata.coord(), model.objectives());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explicit_model::ExplicitModel;
    use crate::types::{Constraint, DesignVariable};
    use ndarray::array;

    fn model() -> ExplicitModel {
        let mut model = ExplicitModel::new();
        model
            .add_desvar(
                DesignVariable::new("x", 2).lower(-1.).upper(1.),
                array![0.5, -0.5],
            )
            .unwrap()
            .add_objective("f", |inputs| inputs["x"].mapv(|v| v * v).sum())
            .unwrap()
            .add_constraint(Constraint::lower("c", 1, 0.), |inputs| {
                array![inputs["x"][0]]
            })
            .unwrap();
        model
    }

    #[test]
    fn test_memory_recorder_shared_handle() {
        let mut model = model();
        let handle = MemoryRecorder::new();
        let mut recorders = RecorderList::new();
        recorders.push(handle.clone());
        recorders.push(LogRecorder);
        assert_eq!(recorders.len(), 2);

        let mut meta = RunMetadata::new("Test");
        for i in 1..=3 {
            meta.update(i);
            model.solve_nonlinear(&meta).unwrap();
            recorders.record_iteration(&model, &meta).unwrap();
        }
        let records = handle.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].coord, "Test|3");
        assert_eq!(records[0].objectives["f"], 0.5);
        assert_eq!(records[0].desvars["x"], array![0.5, -0.5]);
        assert_eq!(records[0].constraints["c"], array![0.5]);
    }

    #[test]
    fn test_json_recorder() {
        let mut model = model();
        let meta = RunMetadata::new("Json");
        model.solve_nonlinear(&meta).unwrap();
        let mut recorder = JsonRecorder::new(Vec::new());
        recorder.record_iteration(&model, &meta).unwrap();
        recorder.record_iteration(&model, &meta).unwrap();

        let out = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: IterationRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.coord, "Json|0");
        assert_eq!(record.objectives["f"], 0.5);
    }
}
