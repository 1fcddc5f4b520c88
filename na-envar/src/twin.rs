//! Twin experiments: the "truth" is a known parameter vector, the prior is
//! a perturbation of it and the observations are the truth run's outputs
//! plus noise.

use nd::{Array, ArrayView, Ix1};
use nd_rand::RandomExt;
use nd_rand::rand_distr::Normal;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::observations::{positive_mean, ObservationGroup, ObservationSource};
use crate::sampler::{sample, Bounds};

/// One draw from `Normal(x_truth, diag((error_fraction * x_truth)^2))`
/// that lies within `bounds`.
pub fn perturb_true_state<R>(x_truth: ArrayView<f64, Ix1>,
                             error_fraction: f64,
                             bounds: &Bounds,
                             rand: &mut R) -> Result<Array<f64, Ix1>>
  where R: Rng + ?Sized,
{
  if !(error_fraction.is_finite() && error_fraction > 0.0) {
    return Err(Error::config("truth_error",
                             format!("{} isn't a positive fraction", error_fraction)));
  }
  if !bounds.contains(x_truth) {
    return Err(Error::config("truth", "the true state lies outside the bounds"));
  }
  let variances = x_truth.mapv(|x| (error_fraction * x).powi(2));
  let covariance = Array::from_diag(&variances);
  let drawn = sample(x_truth, covariance.view(), bounds, 1, rand)?;
  Ok(drawn.row(0).to_owned())
}

/// Observations made from a truth run. Every group gets Gaussian noise with
/// standard deviation `noise_fraction` times the mean of the group's
/// positive true values. Each group's noise stream starts from `seed`.
#[derive(Debug, Clone)]
pub struct TwinObservations {
  pub truth: Vec<ObservationGroup>,
  pub noise_fraction: f64,
  pub seed: u64,
}

impl ObservationSource for TwinObservations {
  fn extract(&self) -> Result<Vec<ObservationGroup>> {
    if !(self.noise_fraction.is_finite() && self.noise_fraction >= 0.0) {
      return Err(Error::config("noise_fraction",
                               format!("{} isn't a non-negative fraction",
                                       self.noise_fraction)));
    }

    self.truth
      .iter()
      .map(|group| {
        let sd = positive_mean(group.values.view(), &group.name)? * self.noise_fraction;
        let normal = Normal::new(0.0, sd)
          .map_err(|e| Error::config(format!("observations.{}", group.name),
                                     format!("bad noise distribution: {}", e)))?;
        let mut rand = ChaCha8Rng::seed_from_u64(self.seed);
        let noise: Array<f64, Ix1> = Array::random_using(group.values.len(), normal,
                                                         &mut rand);
        debug!(group = %group.name, sd, "perturbed twin observations");
        Ok(ObservationGroup {
          name: group.name.clone(),
          values: &group.values + &noise,
          errors: None,
        })
      })
      .collect()
  }
}
