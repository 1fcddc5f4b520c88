//! Newton-CG over the ensemble weights.
//!
//! `argmin` is driven one Newton step at a time so that the gradient-norm
//! test runs before every step, including the first one: a line search
//! started at a stationary point has no descent direction to work with.

use argmin::core as am;
use argmin::core::State;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::newton::NewtonCG;
use nd::{Array, ArrayView, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use crate::cost::EnsembleCost;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerOptions {
  pub max_iterations: u64,
  /// Converged once `|dJ(w)| <= gradient_tolerance`.
  pub gradient_tolerance: f64,
}
impl Default for MinimizerOptions {
  fn default() -> MinimizerOptions {
    MinimizerOptions {
      max_iterations: 20000,
      gradient_tolerance: 1e-6,
    }
  }
}
impl MinimizerOptions {
  pub fn validate(&self) -> Result<()> {
    if self.max_iterations == 0 {
      return Err(Error::config("minimizer.max_iterations", "must be positive"));
    }
    if !(self.gradient_tolerance.is_finite() && self.gradient_tolerance > 0.0) {
      return Err(Error::config("minimizer.gradient_tolerance",
                               format!("{} isn't a positive tolerance",
                                       self.gradient_tolerance)));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
  /// Newton steps taken.
  pub iterations: u64,
  pub cost: f64,
  pub gradient_norm: f64,
  pub converged: bool,
  pub hit_iteration_limit: bool,
  pub cost_evaluations: u64,
  pub gradient_evaluations: u64,
}

/// Forwards to the borrowed cost function so each step's executor doesn't
/// need its own copy.
struct Step<'a>(&'a EnsembleCost);

impl<'a> am::CostFunction for Step<'a> {
  type Param = Array<f64, Ix1>;
  type Output = f64;
  fn cost(&self, w: &Self::Param) -> ::std::result::Result<f64, am::Error> {
    am::CostFunction::cost(self.0, w)
  }
}
impl<'a> am::Gradient for Step<'a> {
  type Param = Array<f64, Ix1>;
  type Gradient = Array<f64, Ix1>;
  fn gradient(&self, w: &Self::Param) -> ::std::result::Result<Self::Gradient, am::Error> {
    am::Gradient::gradient(self.0, w)
  }
}
impl<'a> am::Hessian for Step<'a> {
  type Param = Array<f64, Ix1>;
  type Hessian = Array<f64, Ix2>;
  fn hessian(&self, w: &Self::Param) -> ::std::result::Result<Self::Hessian, am::Error> {
    am::Hessian::hessian(self.0, w)
  }
}

fn count(counts: &::std::collections::HashMap<String, u64>, key: &str) -> u64 {
  counts.get(key).cloned().unwrap_or(0)
}

/// Minimize `cost` starting from `initial`.
///
/// Hitting `options.max_iterations` isn't an error; it's reported in the
/// returned `ConvergenceInfo`.
pub fn minimize(cost: &EnsembleCost,
                initial: ArrayView<f64, Ix1>,
                options: &MinimizerOptions)
  -> Result<(Array<f64, Ix1>, ConvergenceInfo)>
{
  options.validate()?;

  let mut w = initial.to_owned();
  let mut j = cost.cost(w.view())?;
  let mut grad_norm = l2_norm(cost.gradient(w.view())?.view());
  let mut cost_evaluations = 1;
  let mut gradient_evaluations = 1;
  let mut iterations = 0;

  while grad_norm > options.gradient_tolerance && iterations < options.max_iterations {
    let linesearch: MoreThuenteLineSearch<Array<f64, Ix1>, Array<f64, Ix1>, f64> =
      MoreThuenteLineSearch::new();
    let solver: NewtonCG<_, f64> = NewtonCG::new(linesearch);
    let start = w.clone();
    let result = am::Executor::new(Step(cost), solver)
      .configure(|state| state.param(start).max_iters(1))
      .run()?;

    let counts = result.state().get_func_counts();
    cost_evaluations += count(counts, "cost_count");
    gradient_evaluations += count(counts, "gradient_count");
    let mut state = result.state().clone();
    let next = state.take_best_param()
      .ok_or_else(|| Error::Minimizer {
        reason: "Newton step produced no parameters".into(),
      })?;
    iterations += 1;

    let next_j = cost.cost(next.view())?;
    let next_grad = l2_norm(cost.gradient(next.view())?.view());
    cost_evaluations += 1;
    gradient_evaluations += 1;
    debug!(iteration = iterations, cost = next_j, gradient_norm = next_grad,
           "Newton step");

    // no progress left at working precision
    let stalled = !(next_j < j) && !(next_grad < grad_norm);
    w = next;
    j = next_j;
    grad_norm = next_grad;
    if stalled { break; }
  }

  let converged = grad_norm <= options.gradient_tolerance;
  let hit_iteration_limit = !converged && iterations >= options.max_iterations;
  if hit_iteration_limit {
    warn!(iterations, cost = j, gradient_norm = grad_norm,
          "minimizer reached its iteration limit without converging");
  } else if !converged {
    warn!(iterations, cost = j, gradient_norm = grad_norm,
          "minimizer stalled above the gradient tolerance");
  } else {
    debug!(iterations, cost = j, gradient_norm = grad_norm, "minimizer converged");
  }

  let info = ConvergenceInfo {
    iterations,
    cost: j,
    gradient_norm: grad_norm,
    converged,
    hit_iteration_limit,
    cost_evaluations,
    gradient_evaluations,
  };
  Ok((w, info))
}

fn l2_norm(v: ArrayView<f64, Ix1>) -> f64 {
  v.dot(&v).sqrt()
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2};
  use nalgebra::DVector;

  use crate::linalg::to_dmatrix;
  use crate::observations::Observations;
  use crate::utils::PartialEqWithinTol;

  fn setup() -> EnsembleCost {
    let anomalies = arr2(&[[1.0, 0.5, -0.2],
                           [0.0, 2.0, 0.3],
                           [-1.0, 0.1, 0.7],
                           [0.4, -0.3, 1.1]]);
    let obs = Observations::new(arr1(&[1.0, -0.5, 2.0]),
                                arr1(&[0.5, 0.4, 1.0]).view())
      .unwrap();
    EnsembleCost::new(anomalies, arr1(&[0.1, 0.2, 0.3]).view(), &obs).unwrap()
  }

  #[test]
  fn matches_closed_form() {
    let cost = setup();
    let w0 = Array::<f64, _>::zeros(4);
    let (w, info) = minimize(&cost, w0.view(), &Default::default()).unwrap();
    assert!(info.converged);
    assert!(!info.hit_iteration_limit);
    assert!(info.gradient_norm <= 1e-6);

    // H w = -dJ(0)
    let h = to_dmatrix(cost.hessian());
    let g0 = cost.gradient(w0.view()).unwrap();
    let rhs = DVector::from_iterator(4, g0.iter().map(|g| -g));
    let expected = h.lu().solve(&rhs).unwrap();
    let expected = Array::from(expected.iter().cloned().collect::<Vec<_>>());
    assert!(w.partial_eq_within_tol(&expected, 1e-6), "{} vs {}", w, expected);
  }

  #[test]
  fn stationary_start_takes_no_steps() {
    let anomalies = Array::zeros((3, 2));
    let obs = Observations::new(arr1(&[1.0, 2.0]), arr1(&[1.0, 1.0]).view())
      .unwrap();
    let cost = EnsembleCost::new(anomalies, arr1(&[1.0, 2.0]).view(), &obs).unwrap();
    let (w, info) = minimize(&cost, Array::<f64, _>::zeros(3).view(), &Default::default())
      .unwrap();
    assert_eq!(w, Array::<f64, _>::zeros(3));
    assert_eq!(info.iterations, 0);
    assert_eq!(info.cost, 0.0);
    assert!(info.converged);
  }

  #[test]
  fn iteration_cap_is_reported() {
    let cost = setup();
    let options = MinimizerOptions {
      max_iterations: 1,
      gradient_tolerance: 1e-300,
    };
    let (_, info) = minimize(&cost, Array::<f64, _>::zeros(4).view(), &options).unwrap();
    assert_eq!(info.iterations, 1);
    assert!(!info.converged);
    assert!(info.hit_iteration_limit);
    assert!(info.cost_evaluations >= 2);
  }

  #[test]
  fn rejects_bad_options() {
    let cost = setup();
    let bad = MinimizerOptions { max_iterations: 0, .. Default::default() };
    assert!(minimize(&cost, Array::<f64, _>::zeros(4).view(), &bad).is_err());
    let bad = MinimizerOptions { gradient_tolerance: -1.0, .. Default::default() };
    assert!(minimize(&cost, Array::<f64, _>::zeros(4).view(), &bad).is_err());
  }

}
