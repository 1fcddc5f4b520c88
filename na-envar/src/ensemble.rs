//! Runs the simulator once per ensemble member on the rayon pool.
//!
//! Members are independent. A failing member is recorded in the returned
//! `EnsembleRun` and the others carry on; nothing is retried.

use nd::{Array, ArrayView, Axis, Ix1, Ix2};
use rayon::prelude::*;

use na_core::{self, Model, ModelStats};

use crate::error::{Error, Result};

/// Receives a notification as each member finishes. Called from worker
/// threads, in completion order.
pub trait Progress: Sync {
  fn member_finished(&self, index: usize, ok: bool);
  fn finish(&self) { }
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;
impl Progress for Silent {
  fn member_finished(&self, _index: usize, _ok: bool) { }
}

#[derive(Debug, Clone)]
pub struct EnsembleRun {
  /// Predicted observations, or the failure, per member in member order.
  pub outputs: Vec<na_core::Result<Array<f64, Ix1>>>,
}

impl EnsembleRun {
  pub fn len(&self) -> usize { self.outputs.len() }
  pub fn is_empty(&self) -> bool { self.outputs.is_empty() }

  /// Indices and errors of the members that failed.
  pub fn failures(&self) -> Vec<(usize, &na_core::Error)> {
    self.outputs
      .iter()
      .enumerate()
      .filter_map(|(i, out)| out.as_ref().err().map(|e| (i, e)))
      .collect()
  }

  /// Stack the member predictions into an `m x p` matrix. Fails naming the
  /// first failed member, if any.
  pub fn into_predictions(self) -> Result<Array<f64, Ix2>> {
    let m = self.outputs.len();
    let mut rows = Vec::with_capacity(m);
    for (i, out) in self.outputs.into_iter().enumerate() {
      match out {
        Ok(row) => rows.push(row),
        Err(e) => {
          return Err(Error::precondition(format!("ensemble_predictions[{}]", i),
                                         format!("member run failed: {}", e)));
        },
      }
    }

    let p = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut out = Array::zeros((m, p));
    for (i, (row, mut dest)) in rows.iter().zip(out.axis_iter_mut(Axis(0))).enumerate() {
      if row.len() != p {
        return Err(Error::precondition(format!("ensemble_predictions[{}]", i),
                                       format!("{} predicted observations, expected {}",
                                               row.len(), p)));
      }
      dest.assign(row);
    }
    Ok(out)
  }
}

/// Run `model` on every row of `members` concurrently.
pub fn run_ensemble<M, P>(model: &mut ModelStats<M>,
                          members: ArrayView<f64, Ix2>,
                          progress: &P) -> EnsembleRun
  where M: Model<f64>,
        P: Progress + ?Sized,
{
  let m = members.nrows();
  let runner = &model.model;
  let outputs: Vec<_> = members
    .axis_iter(Axis(0))
    .into_par_iter()
    .enumerate()
    .map(|(i, member)| {
      let out = runner.predict(member);
      if let Err(ref e) = out {
        warn!(member = i, error = %e, "ensemble member failed");
      }
      progress.member_finished(i, out.is_ok());
      out
    })
    .collect();
  progress.finish();

  model.calls += m as u64;
  let run = EnsembleRun { outputs, };
  debug!(members = m, failed = run.failures().len(), "ensemble run finished");
  run
}
