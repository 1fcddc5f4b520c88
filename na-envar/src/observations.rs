//! Observation vector `yo` and its diagonal error covariance `R`.
//!
//! Observations arrive from the extractor in named groups (one per observed
//! quantity), positionally aligned with the simulator's predicted
//! observations. How each group's errors are derived is a policy: the
//! extractor's own errors can be used as they are, or errors can be set to a
//! fixed fraction of the group's mean.

use std::ops::Range;

use nd::{Array, ArrayView, Ix1, Ix2};

use crate::error::{Error, Result};
use crate::linalg::condition_number;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationGroup {
  pub name: String,
  pub values: Array<f64, Ix1>,
  /// Per-observation standard deviation, if the extractor reports one.
  pub errors: Option<Array<f64, Ix1>>,
}
impl ObservationGroup {
  pub fn new<N>(name: N, values: Array<f64, Ix1>) -> ObservationGroup
    where N: Into<String>,
  {
    ObservationGroup {
      name: name.into(),
      values,
      errors: None,
    }
  }
  pub fn with_errors(mut self, errors: Array<f64, Ix1>) -> ObservationGroup {
    self.errors = Some(errors);
    self
  }
}

/// The observation extractor collaborator.
pub trait ObservationSource {
  fn extract(&self) -> Result<Vec<ObservationGroup>>;
}

pub trait ObservationErrorPolicy {
  /// Standard deviations for every observation in `group`.
  fn errors(&self, group: &ObservationGroup) -> Result<Array<f64, Ix1>>;
}

/// Use the errors the extractor reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reported;
impl ObservationErrorPolicy for Reported {
  fn errors(&self, group: &ObservationGroup) -> Result<Array<f64, Ix1>> {
    group.errors
      .clone()
      .ok_or_else(|| {
        Error::config(format!("observations.{}", group.name),
                      "no errors were reported for this group")
      })
  }
}

/// Every observation in a group gets `fraction` times the mean of the
/// group's positive values as its error.
#[derive(Debug, Clone, Copy)]
pub struct PercentOfMean {
  pub fraction: f64,
}
impl ObservationErrorPolicy for PercentOfMean {
  fn errors(&self, group: &ObservationGroup) -> Result<Array<f64, Ix1>> {
    if !(self.fraction.is_finite() && self.fraction > 0.0) {
      return Err(Error::config("observation_error_fraction",
                               format!("{} isn't a positive fraction", self.fraction)));
    }
    let mean = positive_mean(group.values.view(), &group.name)?;
    Ok(Array::from_elem(group.values.len(), mean * self.fraction))
  }
}

/// Mean over the strictly positive entries of `values`.
pub fn positive_mean(values: ArrayView<f64, Ix1>, name: &str) -> Result<f64> {
  let (sum, count) = values
    .iter()
    .filter(|&&v| v > 0.0)
    .fold((0.0, 0usize), |(sum, count), &v| (sum + v, count + 1));
  if count == 0 {
    Err(Error::config(format!("observations.{}", name),
                      "group has no positive values to derive an error from"))
  } else {
    Ok(sum / count as f64)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
  values: Array<f64, Ix1>,
  /// diag(R)
  variances: Array<f64, Ix1>,
  /// diag(R^-1)
  inverse_variances: Array<f64, Ix1>,
  groups: Vec<(String, Range<usize>)>,
}

impl Observations {
  /// `errors` are standard deviations; `R = diag(errors^2)`.
  pub fn new(values: Array<f64, Ix1>,
             errors: ArrayView<f64, Ix1>) -> Result<Observations> {
    if values.is_empty() {
      return Err(Error::config("observations", "no observations"));
    }
    if values.len() != errors.len() {
      return Err(Error::config("observation_errors",
                               format!("{} errors for {} observations",
                                       errors.len(), values.len())));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
      return Err(Error::config(format!("observations[{}]", i),
                               format!("{} isn't finite", values[i])));
    }

    let variances = errors.mapv(|e| e * e);
    if let Some(i) = variances.iter().position(|&v| !(v.is_finite() && v > 0.0)) {
      return Err(Error::Numerical {
        matrix: "observation covariance R",
        reason: format!("diagonal entry {} is {}; R must be positive definite",
                        i, variances[i]),
        condition: condition_number(variances.iter()),
      });
    }
    let inverse_variances = variances.mapv(|v| 1.0 / v);
    let len = values.len();

    Ok(Observations {
      values,
      variances,
      inverse_variances,
      groups: vec![("observations".into(), 0..len)],
    })
  }

  /// Concatenate `groups` in order, deriving errors with `policy`.
  pub fn from_groups<P>(groups: &[ObservationGroup],
                        policy: &P) -> Result<Observations>
    where P: ObservationErrorPolicy + ?Sized,
  {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut ranges = Vec::with_capacity(groups.len());
    for group in groups.iter() {
      let e = policy.errors(group)?;
      if e.len() != group.values.len() {
        return Err(Error::config(format!("observations.{}", group.name),
                                 format!("{} errors for {} observations",
                                         e.len(), group.values.len())));
      }
      let start = values.len();
      values.extend(group.values.iter().cloned());
      errors.extend(e.iter().cloned());
      ranges.push((group.name.clone(), start..values.len()));
    }

    let errors = Array::from(errors);
    let mut obs = Observations::new(Array::from(values), errors.view())?;
    obs.groups = ranges;
    Ok(obs)
  }

  pub fn len(&self) -> usize { self.values.len() }
  pub fn is_empty(&self) -> bool { self.values.is_empty() }
  pub fn values(&self) -> ArrayView<'_, f64, Ix1> { self.values.view() }
  pub fn variances(&self) -> ArrayView<'_, f64, Ix1> { self.variances.view() }
  /// The diagonal of `R^-1`.
  pub fn inverse_variances(&self) -> ArrayView<'_, f64, Ix1> { self.inverse_variances.view() }
  pub fn covariance(&self) -> Array<f64, Ix2> {
    Array::from_diag(&self.variances)
  }
  pub fn inverse_covariance(&self) -> Array<f64, Ix2> {
    Array::from_diag(&self.inverse_variances)
  }
  /// Name and index range of each group within `values()`.
  pub fn groups(&self) -> &[(String, Range<usize>)] { &self.groups[..] }
  pub fn group(&self, name: &str) -> Option<ArrayView<'_, f64, Ix1>> {
    self.groups
      .iter()
      .find(|&&(ref n, _)| n == name)
      .map(|&(_, ref r)| self.values.slice(s![r.clone()]))
  }
}
