//! Posterior reconstruction from the minimizing weights.

use nd::{Array, ArrayView, Axis, Ix1, Ix2};
use serde::Serialize;

use crate::cost::EnsembleCost;
use crate::error::Result;
use crate::linalg::symmetric_power;
use crate::minimize::ConvergenceInfo;
use crate::transform::EnsembleTransform;
use crate::utils::anomaly_scale;

/// `A = (I + HXb_mat R^-1 HXb_mat^T)^(-1/2)`, `m x m`.
pub fn analysis_transform(cost: &EnsembleCost) -> Result<Array<f64, Ix2>> {
  symmetric_power(cost.hessian(), -0.5, "analysis transform")
}

/// Member `i` is `xa + sqrt(m - 1) * (A Xb_mat)[i]`.
pub fn analysis_ensemble(transform: &EnsembleTransform,
                         a: ArrayView<f64, Ix2>,
                         xa: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix2>> {
  let m = transform.ensemble_size();
  ::na_core::Error::check_dim("analysis transform", m, a.nrows())?;
  ::na_core::Error::check_dim("analysis transform", m, a.ncols())?;
  ::na_core::Error::check_dim("analysis mean", transform.parameter_dim(), xa.len())?;

  let mut members = a.dot(&transform.anomalies());
  members *= anomaly_scale(m)?;
  for mut row in members.axis_iter_mut(Axis(0)) {
    row += &xa;
  }
  Ok(members)
}

/// The result of one `Session::analyse`.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
  /// Posterior mean.
  pub xa: Array<f64, Ix1>,
  /// Minimizing weights.
  pub wa: Array<f64, Ix1>,
  /// Posterior ensemble, one member per row.
  pub ensemble: Array<f64, Ix2>,
  /// `A`
  pub transform: Array<f64, Ix2>,
  pub convergence: ConvergenceInfo,
}

impl Analysis {
  /// Sample covariance of the posterior ensemble about `xa`.
  pub fn covariance(&self) -> Array<f64, Ix2> {
    let m = self.ensemble.nrows();
    let mut dx = self.ensemble.clone();
    for mut row in dx.axis_iter_mut(Axis(0)) {
      row -= &self.xa;
    }
    dx.t().dot(&dx) / ((m - 1) as f64)
  }
}
