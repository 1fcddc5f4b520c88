//! The 4DEnVar objective in ensemble-weight space:
//!
//! ```text
//! d(w)  = HXb_mat^T w + Hxb - yo
//! J(w)  = 0.5 d^T R^-1 d + 0.5 w^T w
//! dJ(w) = HXb_mat R^-1 d(w) + w
//! ```
//!
//! The Hessian `I + HXb_mat R^-1 HXb_mat^T` doesn't depend on `w` and is
//! built once.

use argmin::core as am;
use nd::{Array, ArrayView, Ix1, Ix2};

use na_core;

use crate::error::{Error, Result};
use crate::observations::Observations;
use crate::transform::anomaly_matrix;

#[derive(Debug, Clone)]
pub struct EnsembleCost {
  /// HXb_mat, m x p
  anomalies: Array<f64, Ix2>,
  /// Hxb - yo
  innovation: Array<f64, Ix1>,
  /// diag(R^-1)
  rinv: Array<f64, Ix1>,
  hessian: Array<f64, Ix2>,
}

/// Direction of the perturbation used by `EnsembleCost::gradient_test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDirection {
  /// Along the weights being tested.
  Weights,
  /// Along the gradient at the weights being tested.
  Gradient,
  /// Along `(1, .., 1)`.
  Ones,
}

impl EnsembleCost {
  /// `predicted_anomalies` is `HXb_mat` (already centred on `Hxb` and
  /// scaled).
  pub fn new(predicted_anomalies: Array<f64, Ix2>,
             background_predictions: ArrayView<f64, Ix1>,
             observations: &Observations) -> Result<EnsembleCost> {
    let p = observations.len();
    if background_predictions.len() != p {
      return Err(Error::precondition("background_predictions",
                                     format!("{} predicted observations for {} observations",
                                             background_predictions.len(), p)));
    }
    if predicted_anomalies.ncols() != p {
      return Err(Error::precondition("ensemble_predictions",
                                     format!("{} predicted observations per member for {} observations",
                                             predicted_anomalies.ncols(), p)));
    }

    let innovation = &background_predictions - &observations.values();
    let rinv = observations.inverse_variances().to_owned();

    let m = predicted_anomalies.nrows();
    let weighted = &predicted_anomalies * &rinv;
    let mut hessian = weighted.dot(&predicted_anomalies.t());
    for i in 0..m {
      hessian[[i, i]] += 1.0;
    }
    debug!(members = m, observations = p, "cost function built");

    Ok(EnsembleCost {
      anomalies: predicted_anomalies,
      innovation,
      rinv,
      hessian,
    })
  }

  /// Same as `new`, from the raw per-member predictions (one row per
  /// member).
  pub fn from_predictions(ensemble_predictions: ArrayView<f64, Ix2>,
                          background_predictions: ArrayView<f64, Ix1>,
                          observations: &Observations) -> Result<EnsembleCost> {
    if ensemble_predictions.ncols() != background_predictions.len() {
      return Err(Error::precondition("ensemble_predictions",
                                     format!("members predict {} observations, background predicts {}",
                                             ensemble_predictions.ncols(),
                                             background_predictions.len())));
    }
    let anomalies = anomaly_matrix(ensemble_predictions, background_predictions)?;
    EnsembleCost::new(anomalies, background_predictions, observations)
  }

  pub fn ensemble_size(&self) -> usize { self.anomalies.nrows() }
  pub fn observation_dim(&self) -> usize { self.anomalies.ncols() }
  pub fn predicted_anomalies(&self) -> ArrayView<'_, f64, Ix2> { self.anomalies.view() }
  pub fn inverse_variances(&self) -> ArrayView<'_, f64, Ix1> { self.rinv.view() }

  fn check_weights(&self, w: ArrayView<f64, Ix1>) -> Result<()> {
    na_core::Error::check_dim("weight vector", self.ensemble_size(), w.len())?;
    Ok(())
  }

  /// `d(w)`, the predicted-minus-observed misfit.
  pub fn misfit(&self, w: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    self.check_weights(w)?;
    Ok(self.anomalies.t().dot(&w) + &self.innovation)
  }
  /// `Jo(w) = d^T R^-1 d`
  pub fn observation_cost(&self, w: ArrayView<f64, Ix1>) -> Result<f64> {
    let d = self.misfit(w)?;
    Ok(weighted_square(d.view(), self.rinv.view()))
  }
  /// `Jb(w) = w^T w`
  pub fn background_cost(&self, w: ArrayView<f64, Ix1>) -> Result<f64> {
    self.check_weights(w)?;
    Ok(w.dot(&w))
  }
  pub fn cost(&self, w: ArrayView<f64, Ix1>) -> Result<f64> {
    let d = self.misfit(w)?;
    Ok(0.5 * weighted_square(d.view(), self.rinv.view()) + 0.5 * w.dot(&w))
  }
  pub fn gradient(&self, w: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    let mut d = self.misfit(w)?;
    d *= &self.rinv;
    Ok(self.anomalies.dot(&d) + &w)
  }
  pub fn hessian(&self) -> ArrayView<'_, f64, Ix2> { self.hessian.view() }

  /// `(J(w + eta h) - J(w)) / (eta h . dJ(w))` for a unit vector `h`. Tends
  /// to one as `eta` goes to zero when the gradient is consistent with the
  /// cost.
  pub fn gradient_test(&self, w: ArrayView<f64, Ix1>,
                       direction: TestDirection, eta: f64) -> Result<f64> {
    let grad = self.gradient(w)?;
    let h = match direction {
      TestDirection::Weights => w.to_owned(),
      TestDirection::Gradient => grad.clone(),
      TestDirection::Ones => Array::ones(w.len()),
    };
    let norm = h.dot(&h).sqrt();
    if norm == 0.0 {
      return Err(Error::precondition("gradient_test",
                                     format!("{:?} direction is the zero vector", direction)));
    }
    let h = h / norm;

    let j0 = self.cost(w)?;
    let shifted = &w + &(&h * eta);
    let j1 = self.cost(shifted.view())?;
    Ok((j1 - j0) / (eta * h.dot(&grad)))
  }
}

fn weighted_square(d: ArrayView<f64, Ix1>, weights: ArrayView<f64, Ix1>) -> f64 {
  d.iter()
    .zip(weights.iter())
    .map(|(&d, &r)| d * d * r)
    .sum()
}

impl am::CostFunction for EnsembleCost {
  type Param = Array<f64, Ix1>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> ::std::result::Result<f64, am::Error> {
    Ok(EnsembleCost::cost(self, w.view())?)
  }
}
impl am::Gradient for EnsembleCost {
  type Param = Array<f64, Ix1>;
  type Gradient = Array<f64, Ix1>;

  fn gradient(&self, w: &Self::Param) -> ::std::result::Result<Self::Gradient, am::Error> {
    Ok(EnsembleCost::gradient(self, w.view())?)
  }
}
impl am::Hessian for EnsembleCost {
  type Param = Array<f64, Ix1>;
  type Hessian = Array<f64, Ix2>;

  fn hessian(&self, w: &Self::Param) -> ::std::result::Result<Self::Hessian, am::Error> {
    self.check_weights(w.view())?;
    Ok(self.hessian.clone())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2};
  use rand::SeedableRng;
  use rand_chacha::ChaCha8Rng;
  use nd_rand::RandomExt;
  use nd_rand::rand_distr::StandardNormal;

  use crate::utils::PartialEqWithinTol;

  fn random_cost(m: usize, p: usize, seed: u64) -> EnsembleCost {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let anomalies: Array<f64, Ix2> = Array::random_using((m, p), StandardNormal, &mut rng);
    let hxb: Array<f64, Ix1> = Array::random_using(p, StandardNormal, &mut rng);
    let yo: Array<f64, Ix1> = Array::random_using(p, StandardNormal, &mut rng);
    let errors = Array::from_elem(p, 0.5);
    let obs = Observations::new(yo, errors.view()).unwrap();
    EnsembleCost::new(anomalies, hxb.view(), &obs).unwrap()
  }

  #[test]
  fn hand_computed() {
    // m = 2, p = 2
    let anomalies = arr2(&[[1.0, 0.0],
                           [0.0, 2.0]]);
    let obs = Observations::new(arr1(&[1.0, 1.0]), arr1(&[1.0, 0.5]).view())
      .unwrap();
    let cost = EnsembleCost::new(anomalies, arr1(&[0.0, 0.0]).view(), &obs)
      .unwrap();

    let w = arr1(&[1.0, 1.0]);
    // d = [1 - 1, 2 - 1] = [0, 1]; Jo = 0 + 1 * 4
    assert_eq!(cost.misfit(w.view()).unwrap(), arr1(&[0.0, 1.0]));
    assert_eq!(cost.observation_cost(w.view()).unwrap(), 4.0);
    assert_eq!(cost.background_cost(w.view()).unwrap(), 2.0);
    assert_eq!(cost.cost(w.view()).unwrap(), 3.0);
    // HXb R^-1 d + w = [0, 2 * 4 * 1] + [1, 1]
    assert_eq!(cost.gradient(w.view()).unwrap(), arr1(&[1.0, 9.0]));
    assert_eq!(cost.hessian(), arr2(&[[2.0, 0.0],
                                      [0.0, 17.0]]));
  }

  #[test]
  fn zero_weights_cost_is_background_misfit() {
    let cost = random_cost(5, 3, 7);
    let w = Array::<f64, _>::zeros(5);
    assert_eq!(cost.background_cost(w.view()).unwrap(), 0.0);
    let d = cost.misfit(w.view()).unwrap();
    assert_eq!(d, cost.innovation);
  }

  #[test]
  fn gradient_test_tends_to_one() {
    let cost = random_cost(6, 10, 3);
    let w = arr1(&[0.3, -0.2, 0.1, 0.5, -1.0, 0.7]);
    for &dir in [TestDirection::Weights, TestDirection::Gradient, TestDirection::Ones].iter() {
      let coarse = (cost.gradient_test(w.view(), dir, 1e-1).unwrap() - 1.0).abs();
      let fine = (cost.gradient_test(w.view(), dir, 1e-7).unwrap() - 1.0).abs();
      assert!(fine < 1e-3, "{:?}: {}", dir, fine);
      assert!(fine <= coarse, "{:?}: {} > {}", dir, fine, coarse);
    }
  }

  #[test]
  fn gradient_test_rejects_zero_direction() {
    let cost = random_cost(3, 2, 1);
    let w = Array::<f64, _>::zeros(3);
    assert!(cost.gradient_test(w.view(), TestDirection::Weights, 1e-3).is_err());
  }

  #[test]
  fn hessian_is_symmetric() {
    let cost = random_cost(4, 8, 11);
    let h = cost.hessian();
    assert!(h.partial_eq_within_tol(&h.t(), 1e-12));
  }

  #[test]
  fn rejects_mismatched_lengths() {
    let obs = Observations::new(arr1(&[1.0, 1.0]), arr1(&[1.0, 1.0]).view())
      .unwrap();
    let r = EnsembleCost::new(Array::zeros((3, 2)), arr1(&[0.0]).view(), &obs);
    match r {
      Err(Error::Precondition { field, .. }) => assert_eq!(field, "background_predictions"),
      other => panic!("unexpected {:?}", other),
    }
    let r = EnsembleCost::new(Array::zeros((3, 3)), arr1(&[0.0, 0.0]).view(), &obs);
    match r {
      Err(Error::Precondition { field, .. }) => assert_eq!(field, "ensemble_predictions"),
      other => panic!("unexpected {:?}", other),
    }

    let cost = random_cost(3, 2, 1);
    assert!(cost.cost(arr1(&[1.0]).view()).is_err());
  }

  #[test]
  fn from_predictions_needs_two_members() {
    let obs = Observations::new(arr1(&[1.0]), arr1(&[0.5]).view()).unwrap();
    let none = Array::<f64, _>::zeros((0, 1));
    let r = EnsembleCost::from_predictions(none.view(), arr1(&[1.0]).view(), &obs);
    match r {
      Err(Error::Configuration { field, .. }) => assert_eq!(field, "ensemble_size"),
      other => panic!("unexpected {:?}", other),
    }
    let one = arr2(&[[2.0]]);
    let r = EnsembleCost::from_predictions(one.view(), arr1(&[1.0]).view(), &obs);
    match r {
      Err(Error::Configuration { field, .. }) => assert_eq!(field, "ensemble_size"),
      other => panic!("unexpected {:?}", other),
    }

    let two = arr2(&[[2.0], [0.0]]);
    let cost = EnsembleCost::from_predictions(two.view(), arr1(&[1.0]).view(), &obs)
      .unwrap();
    assert!(cost.hessian().iter().all(|h| h.is_finite()));
  }
}
