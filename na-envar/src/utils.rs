
use nd::{ArrayBase, Data, Dimension};

use crate::error::{Error, Result};

/// `sqrt(m - 1)`, the scale used for every anomaly matrix. Needs `m >= 2`.
pub fn anomaly_scale(ensemble_count: usize) -> Result<f64> {
  if ensemble_count < 2 {
    return Err(Error::config("ensemble_size",
                             format!("need at least two members, got {}",
                                     ensemble_count)));
  }
  Ok(((ensemble_count - 1) as f64).sqrt())
}

pub trait PartialEqWithinTol<Rhs, Tol> {
  const STD_TOL: Tol;
  fn partial_eq_within_tol(&self, rhs: &Rhs, tol: Tol) -> bool;

  fn partial_neq_within_tol(&self, rhs: &Rhs, tol: Tol) -> bool {
    !self.partial_eq_within_tol(rhs, tol)
  }

  fn partial_eq_within_std_tol(&self, rhs: &Rhs) -> bool {
    self.partial_eq_within_tol(rhs, Self::STD_TOL)
  }
  fn partial_neq_within_std_tol(&self, rhs: &Rhs) -> bool {
    !self.partial_eq_within_std_tol(rhs)
  }
}

impl PartialEqWithinTol<f64, f64> for f64 {
  const STD_TOL: Self = ::std::f64::EPSILON;
  fn partial_eq_within_tol(&self, rhs: &f64, tol: f64) -> bool {
    (self - rhs).abs() <= tol
  }
}
impl<S1, S2, D> PartialEqWithinTol<ArrayBase<S2, D>, f64> for ArrayBase<S1, D>
  where S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
{
  const STD_TOL: f64 = ::std::f64::EPSILON;
  fn partial_eq_within_tol(&self, rhs: &ArrayBase<S2, D>, tol: f64) -> bool {
    self.shape() == rhs.shape() &&
      self.iter()
      .zip(rhs.iter())
      .all(|(l, r)| {
        l.partial_eq_within_tol(r, tol)
      })
  }
}
