//! Change of variables between parameter space and ensemble-weight space:
//! `x = xb + Xb_mat^T w`, with `Xb_mat` the scaled prior anomalies.
//!
//! `to_weights` applies the pseudo-inverse of `Xb_mat^T`. It's the exact
//! inverse of `to_parameters` only when `Xb_mat^T` has full column rank `m`
//! (so at most as many members as parameters). With more members than
//! parameters, or a rank-deficient ensemble, `to_weights` returns the
//! minimum-norm weights and the round trip through weight space is lossy.

use nd::{Array, ArrayView, Axis, Ix1, Ix2};

use na_core;

use crate::error::{Error, Result};
use crate::linalg::pseudo_inverse;
use crate::utils::anomaly_scale;

/// Rows of `members` minus `centre`, scaled by `1 / sqrt(m - 1)`.
pub fn anomaly_matrix(members: ArrayView<f64, Ix2>,
                      centre: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix2>> {
  let s = anomaly_scale(members.nrows())?;
  na_core::Error::check_dim("anomaly centre", members.ncols(), centre.len())?;
  let mut out = members.to_owned();
  for mut row in out.axis_iter_mut(Axis(0)) {
    row -= &centre;
    row /= s;
  }

  Ok(out)
}

#[derive(Debug, Clone)]
pub struct EnsembleTransform {
  xb: Array<f64, Ix1>,
  /// Xb_mat, m x n
  anomalies: Array<f64, Ix2>,
  /// pinv(Xb_mat^T), m x n
  anomalies_pinv: Array<f64, Ix2>,
  rank: usize,
  condition: f64,
}

impl EnsembleTransform {
  pub fn new(xb: ArrayView<f64, Ix1>,
             ensemble: ArrayView<f64, Ix2>) -> Result<EnsembleTransform> {
    let (m, n) = ensemble.dim();
    if m < 2 {
      return Err(Error::config("ensemble_size",
                               format!("need at least two members, got {}", m)));
    }
    if n != xb.len() {
      return Err(Error::config("prior_ensemble",
                               format!("members have {} parameters, background has {}",
                                       n, xb.len())));
    }

    let anomalies = anomaly_matrix(ensemble, xb)?;
    let pinv = pseudo_inverse(anomalies.t())?;
    let condition = pinv.condition_number();
    if pinv.rank == 0 {
      return Err(Error::Numerical {
        matrix: "ensemble anomaly matrix",
        reason: "every prior member equals the background".into(),
        condition,
      });
    }
    if pinv.rank < m.min(n) {
      warn!(rank = pinv.rank, members = m, parameters = n, condition,
            "prior ensemble anomalies are rank deficient");
    } else {
      debug!(rank = pinv.rank, condition, "ensemble transform built");
    }

    Ok(EnsembleTransform {
      xb: xb.to_owned(),
      anomalies,
      anomalies_pinv: pinv.inverse,
      rank: pinv.rank,
      condition,
    })
  }

  pub fn to_weights(&self, x: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    na_core::Error::check_dim("parameter vector", self.parameter_dim(), x.len())?;
    let dx = &x - &self.xb;
    Ok(self.anomalies_pinv.dot(&dx))
  }
  pub fn to_parameters(&self, w: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    na_core::Error::check_dim("weight vector", self.ensemble_size(), w.len())?;
    Ok(&self.xb + &self.anomalies.t().dot(&w))
  }

  pub fn background(&self) -> ArrayView<'_, f64, Ix1> { self.xb.view() }
  pub fn anomalies(&self) -> ArrayView<'_, f64, Ix2> { self.anomalies.view() }
  pub fn ensemble_size(&self) -> usize { self.anomalies.nrows() }
  pub fn parameter_dim(&self) -> usize { self.anomalies.ncols() }
  /// Numerical rank of the anomaly basis.
  pub fn rank(&self) -> usize { self.rank }
  pub fn condition_number(&self) -> f64 { self.condition }
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2};
  use crate::sampler::{Bounds, sample_seeded};
  use crate::utils::PartialEqWithinTol;

  #[test]
  fn anomalies_are_scaled() {
    let members = arr2(&[
      [1.0, 2.0,],
      [3.0, 2.0,],
      [2.0, 5.0,],
    ]);
    let a = anomaly_matrix(members.view(), arr1(&[2.0, 3.0]).view()).unwrap();
    let s = 2.0f64.sqrt();
    let expected = arr2(&[
      [-1.0 / s, -1.0 / s,],
      [1.0 / s, -1.0 / s,],
      [0.0, 2.0 / s,],
    ]);
    assert!(a.partial_eq_within_tol(&expected, 1e-15));
  }

  #[test]
  fn anomalies_need_two_members() {
    let centre = arr1(&[1.0]);
    let none = Array::<f64, _>::zeros((0, 1));
    assert!(anomaly_matrix(none.view(), centre.view()).is_err());
    match anomaly_matrix(arr2(&[[2.0]]).view(), centre.view()) {
      Err(Error::Configuration { field, .. }) => assert_eq!(field, "ensemble_size"),
      other => panic!("unexpected {:?}", other),
    }
    assert!(anomaly_matrix(arr2(&[[2.0], [0.0]]).view(), arr1(&[1.0, 2.0]).view()).is_err());
  }

  #[test]
  fn background_maps_to_zero_weights() {
    let xb = arr1(&[1.0, 0.5]);
    let members = arr2(&[
      [1.1, 0.4,],
      [0.9, 0.55,],
      [1.05, 0.5,],
      [0.97, 0.61,],
    ]);
    let t = EnsembleTransform::new(xb.view(), members.view()).unwrap();
    let w = t.to_weights(xb.view()).unwrap();
    assert_eq!(w, Array::<f64, _>::zeros(4));
    assert_eq!(t.to_parameters(w.view()).unwrap(), xb);
  }

  #[test]
  fn square_full_rank_round_trip() {
    let xb = arr1(&[2.0, 30.0, 0.4]);
    let b = Array::from_diag(&arr1(&[0.04, 9.0, 0.0016]));
    let bounds = Bounds::new(vec![(0.0, 10.0), (0.0, 100.0), (0.0, 1.0)])
      .unwrap();
    let members = sample_seeded(xb.view(), b.view(), &bounds, 3, 11)
      .unwrap();
    let t = EnsembleTransform::new(xb.view(), members.view()).unwrap();
    assert_eq!(t.rank(), 3);

    let x = arr1(&[2.3, 28.0, 0.41]);
    let back = t.to_parameters(t.to_weights(x.view()).unwrap().view())
      .unwrap();
    assert!(back.partial_eq_within_tol(&x, 1e-9));

    // and the other way around
    let w = arr1(&[0.3, -1.2, 0.7]);
    let w2 = t.to_weights(t.to_parameters(w.view()).unwrap().view())
      .unwrap();
    assert!(w2.partial_eq_within_tol(&w, 1e-9));
  }

  #[test]
  fn more_members_than_parameters_is_min_norm() {
    let xb = arr1(&[1.0]);
    let members = arr2(&[[1.1,], [0.9,], [1.2,]]);
    let t = EnsembleTransform::new(xb.view(), members.view()).unwrap();
    let x = arr1(&[1.3]);
    let w = t.to_weights(x.view()).unwrap();
    // reachable: single parameter is in the span
    assert!(t.to_parameters(w.view()).unwrap().partial_eq_within_tol(&x, 1e-12));
    // but an arbitrary w doesn't survive the round trip
    let w0 = arr1(&[1.0, 0.0, 0.0]);
    let w1 = t.to_weights(t.to_parameters(w0.view()).unwrap().view()).unwrap();
    assert!(w1.partial_neq_within_tol(&w0, 1e-6));
    // minimum norm: w1 is parallel to the anomaly column
    let col = t.anomalies().column(0).to_owned();
    let k = w1[0] / col[0];
    assert!(w1.partial_eq_within_tol(&(&col * k), 1e-12));
  }

  #[test]
  fn degenerate_ensemble() {
    let xb = arr1(&[1.0, 2.0]);
    let members = arr2(&[[1.0, 2.0,], [1.0, 2.0,]]);
    match EnsembleTransform::new(xb.view(), members.view()) {
      Err(Error::Numerical { matrix, .. }) => assert_eq!(matrix, "ensemble anomaly matrix"),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn rejects_wrong_lengths() {
    let xb = arr1(&[1.0, 2.0]);
    let members = arr2(&[[1.1, 2.0,], [0.9, 2.1,]]);
    let t = EnsembleTransform::new(xb.view(), members.view()).unwrap();
    assert!(t.to_weights(arr1(&[1.0]).view()).is_err());
    assert!(t.to_parameters(arr1(&[1.0, 2.0, 3.0]).view()).is_err());
    assert!(EnsembleTransform::new(arr1(&[1.0]).view(), members.view()).is_err());
    assert!(EnsembleTransform::new(xb.view(), arr2(&[[1.0, 2.0]]).view()).is_err());
  }
}
