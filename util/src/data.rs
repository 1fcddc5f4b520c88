//! Summaries of ensembles of model output.

use nd::{Array, ArrayView, Axis, Ix1, Ix2};
use serde::Serialize;

/// Member mean and a one standard deviation envelope, per output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spread {
  pub mean: Array<f64, Ix1>,
  /// `mean + std`, floored at zero.
  pub upper: Array<f64, Ix1>,
  /// `mean - std`, floored at zero.
  pub lower: Array<f64, Ix1>,
}

/// `ensemble` has one member per row. The standard deviation is the
/// population one (divides by `m`). Returns `None` for an empty ensemble.
pub fn spread(ensemble: ArrayView<f64, Ix2>) -> Option<Spread> {
  let mean = ensemble.mean_axis(Axis(0))?;
  let std = ensemble.std_axis(Axis(0), 0.0);
  let upper = (&mean + &std).mapv(|v| v.max(0.0));
  let lower = (&mean - &std).mapv(|v| v.max(0.0));
  Some(Spread { mean, upper, lower, })
}
