//! The assimilation session: owns the prior, the observations and the
//! predictions, and turns them into an `Analysis`.
//!
//! A session moves through
//! `Constructed -> PriorBuilt -> ObservationsLoaded -> PredictionsLoaded -> Analysed`.
//! The stage is derived from what's loaded rather than stored, so replacing
//! an input can never leave a stale cache behind.

use nd::{Array, ArrayView, Ix1, Ix2};

use na_core::{Model, ModelStats};

use crate::analysis::{analysis_ensemble, analysis_transform, Analysis};
use crate::config::Config;
use crate::cost::EnsembleCost;
use crate::ensemble::{run_ensemble, EnsembleRun, Progress};
use crate::error::{Error, Result};
use crate::linalg::condition_number;
use crate::minimize::minimize;
use crate::observations::{ObservationErrorPolicy, ObservationSource, Observations};
use crate::sampler::{sample_seeded, Bounds};
use crate::transform::EnsembleTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  Constructed,
  PriorBuilt,
  ObservationsLoaded,
  PredictionsLoaded,
  Analysed,
}

#[derive(Debug, Clone)]
pub struct Prior {
  pub xb: Array<f64, Ix1>,
  /// `diag((xb * prior_error)^2)`
  pub b: Array<f64, Ix2>,
  pub bounds: Bounds,
  /// One member per row.
  pub ensemble: Array<f64, Ix2>,
}

/// Validate `config` and draw the prior ensemble from it.
pub fn build_prior(config: &Config) -> Result<Prior> {
  config.validate()?;
  let xb = config.background();
  let bounds = config.bounds()?;
  let b = background_covariance(xb.view(), config.prior_error)?;
  let ensemble = sample_seeded(xb.view(), b.view(), &bounds,
                               config.ensemble_size, config.seed)?;
  Ok(Prior { xb, b, bounds, ensemble, })
}

fn background_covariance(xb: ArrayView<f64, Ix1>,
                         prior_error: f64) -> Result<Array<f64, Ix2>> {
  let variances = xb.mapv(|x| (x * prior_error).powi(2));
  if let Some(i) = variances.iter().position(|&v| !(v > 0.0)) {
    return Err(Error::Numerical {
      matrix: "background covariance B",
      reason: format!("diagonal entry {} is {}; B must be positive definite",
                      i, variances[i]),
      condition: condition_number(variances.iter()),
    });
  }
  Ok(Array::from_diag(&variances))
}

#[derive(Debug, Clone)]
pub struct Session {
  config: Config,
  prior: Prior,
  transform: EnsembleTransform,
  observations: Option<Observations>,
  background_predictions: Option<Array<f64, Ix1>>,
  ensemble_predictions: Option<Array<f64, Ix2>>,
  /// Built once observations and both predictions are in place.
  cost: Option<EnsembleCost>,
  analysed: bool,
}

impl Session {
  pub fn new(config: Config) -> Result<Session> {
    let prior = build_prior(&config)?;
    let transform = EnsembleTransform::new(prior.xb.view(), prior.ensemble.view())?;
    info!(parameters = config.parameter_dim(), members = config.ensemble_size,
          seed = config.seed, "prior built");

    Ok(Session {
      config,
      prior,
      transform,
      observations: None,
      background_predictions: None,
      ensemble_predictions: None,
      cost: None,
      analysed: false,
    })
  }

  pub fn stage(&self) -> Stage {
    if self.analysed {
      Stage::Analysed
    } else if self.cost.is_some() {
      Stage::PredictionsLoaded
    } else if self.observations.is_some() {
      Stage::ObservationsLoaded
    } else {
      Stage::PriorBuilt
    }
  }

  pub fn config(&self) -> &Config { &self.config }
  pub fn prior(&self) -> &Prior { &self.prior }
  pub fn background(&self) -> ArrayView<'_, f64, Ix1> { self.prior.xb.view() }
  pub fn prior_ensemble(&self) -> ArrayView<'_, f64, Ix2> { self.prior.ensemble.view() }
  pub fn bounds(&self) -> &Bounds { &self.prior.bounds }
  pub fn transform(&self) -> &EnsembleTransform { &self.transform }
  pub fn ensemble_size(&self) -> usize { self.prior.ensemble.nrows() }
  pub fn parameter_dim(&self) -> usize { self.prior.xb.len() }
  pub fn observations(&self) -> Option<&Observations> { self.observations.as_ref() }
  pub fn background_predictions(&self) -> Option<ArrayView<'_, f64, Ix1>> {
    self.background_predictions.as_ref().map(|v| v.view())
  }
  pub fn ensemble_predictions(&self) -> Option<ArrayView<'_, f64, Ix2>> {
    self.ensemble_predictions.as_ref().map(|v| v.view())
  }
  pub fn cost(&self) -> Option<&EnsembleCost> { self.cost.as_ref() }

  pub fn to_weights(&self, x: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    self.transform.to_weights(x)
  }
  pub fn to_parameters(&self, w: ArrayView<f64, Ix1>) -> Result<Array<f64, Ix1>> {
    self.transform.to_parameters(w)
  }

  fn rebuild_cost(&mut self) -> Result<()> {
    self.analysed = false;
    self.cost = None;
    if let (Some(obs), Some(hxb), Some(hx)) = (self.observations.as_ref(),
                                               self.background_predictions.as_ref(),
                                               self.ensemble_predictions.as_ref()) {
      self.cost = Some(EnsembleCost::from_predictions(hx.view(), hxb.view(), obs)?);
      info!(observations = obs.len(), "predictions loaded");
    }
    Ok(())
  }

  /// `found` must agree with every other loaded observation-space input.
  fn check_observation_dim(&self, field: &str, found: usize) -> Result<()> {
    let loaded = [
      ("observations", self.observations.as_ref().map(|o| o.len())),
      ("background_predictions", self.background_predictions.as_ref().map(|v| v.len())),
      ("ensemble_predictions", self.ensemble_predictions.as_ref().map(|v| v.ncols())),
    ];
    for &(other, len) in loaded.iter() {
      match len {
        Some(expected) if other != field && expected != found => {
          return Err(Error::precondition(field,
                                         format!("{} observations, but `{}` has {}",
                                                 found, other, expected)));
        },
        _ => { },
      }
    }
    Ok(())
  }

  pub fn set_observations(&mut self, observations: Observations) -> Result<()> {
    self.check_observation_dim("observations", observations.len())?;
    info!(observations = observations.len(), groups = observations.groups().len(),
          "observations loaded");
    self.observations = Some(observations);
    self.rebuild_cost()
  }
  pub fn load_observations<S, P>(&mut self, source: &S, policy: &P) -> Result<()>
    where S: ObservationSource + ?Sized,
          P: ObservationErrorPolicy + ?Sized,
  {
    let groups = source.extract()?;
    let observations = Observations::from_groups(&groups[..], policy)?;
    self.set_observations(observations)
  }

  pub fn set_background_predictions(&mut self, hxb: Array<f64, Ix1>) -> Result<()> {
    self.check_observation_dim("background_predictions", hxb.len())?;
    if let Some(j) = hxb.iter().position(|v| !v.is_finite()) {
      return Err(Error::precondition("background_predictions",
                                     format!("observation {} is {}", j, hxb[j])));
    }
    self.background_predictions = Some(hxb);
    self.rebuild_cost()
  }

  /// `hx` has one row of predicted observations per prior member, in
  /// member order.
  pub fn set_ensemble_predictions(&mut self, hx: Array<f64, Ix2>) -> Result<()> {
    let m = self.ensemble_size();
    if hx.nrows() != m {
      return Err(Error::precondition("ensemble_predictions",
                                     format!("{} rows for {} ensemble members",
                                             hx.nrows(), m)));
    }
    self.check_observation_dim("ensemble_predictions", hx.ncols())?;
    for (i, row) in hx.outer_iter().enumerate() {
      if let Some(j) = row.iter().position(|v| !v.is_finite()) {
        return Err(Error::precondition(format!("ensemble_predictions[{}]", i),
                                       format!("observation {} is {}", j, row[j])));
      }
    }
    self.ensemble_predictions = Some(hx);
    self.rebuild_cost()
  }
  /// Fails if any member of `run` failed.
  pub fn set_ensemble_run(&mut self, run: EnsembleRun) -> Result<()> {
    let hx = run.into_predictions()?;
    self.set_ensemble_predictions(hx)
  }

  /// Run the model at the background and load the result.
  pub fn run_background<M>(&mut self, model: &mut ModelStats<M>) -> Result<Array<f64, Ix1>>
    where M: Model<f64>,
  {
    let hxb = model.predict(self.prior.xb.view())?;
    self.set_background_predictions(hxb.clone())?;
    Ok(hxb)
  }

  /// Run the model on every prior member. The predictions are loaded only
  /// if every member succeeded; otherwise the failures are left in the
  /// returned run for the caller to deal with.
  pub fn run_prior_ensemble<M, P>(&mut self, model: &mut ModelStats<M>,
                                  progress: &P) -> Result<EnsembleRun>
    where M: Model<f64>,
          P: Progress + ?Sized,
  {
    let run = run_ensemble(model, self.prior.ensemble.view(), progress);
    let failed = run.failures().len();
    if failed == 0 {
      self.set_ensemble_run(run.clone())?;
    } else {
      warn!(failed, members = run.len(), "prior ensemble predictions not loaded");
    }
    Ok(run)
  }

  pub fn analyse(&mut self) -> Result<Analysis> {
    if self.observations.is_none() {
      return Err(Error::precondition("observations", "no observations loaded"));
    }
    if self.background_predictions.is_none() {
      return Err(Error::precondition("background_predictions",
                                     "no background predictions loaded"));
    }
    if self.ensemble_predictions.is_none() {
      return Err(Error::precondition("ensemble_predictions",
                                     "no ensemble predictions loaded"));
    }
    let cost = self.cost.as_ref()
      .ok_or_else(|| Error::precondition("ensemble_predictions",
                                         "predictions aren't consistent with the observations"))?;

    let w0 = self.transform.to_weights(self.prior.xb.view())?;
    let (wa, convergence) = minimize(cost, w0.view(), &self.config.minimizer)?;
    let xa = self.transform.to_parameters(wa.view())?;
    let a = analysis_transform(cost)?;
    let ensemble = analysis_ensemble(&self.transform, a.view(), xa.view())?;

    info!(iterations = convergence.iterations, cost = convergence.cost,
          converged = convergence.converged, "analysis complete");
    self.analysed = true;

    Ok(Analysis {
      xa,
      wa,
      ensemble,
      transform: a,
      convergence,
    })
  }

  /// Redraw the prior ensemble from `seed`. Observations and the background
  /// predictions are kept since `xb` doesn't change; the ensemble
  /// predictions belonged to the old members and are dropped.
  pub fn regenerate_prior(&mut self, seed: u64) -> Result<()> {
    let ensemble = sample_seeded(self.prior.xb.view(), self.prior.b.view(),
                                 &self.prior.bounds, self.config.ensemble_size, seed)?;
    let transform = EnsembleTransform::new(self.prior.xb.view(), ensemble.view())?;

    self.prior.ensemble = ensemble;
    self.transform = transform;
    self.config.seed = seed;
    self.ensemble_predictions = None;
    self.cost = None;
    self.analysed = false;
    info!(seed, "prior regenerated");
    Ok(())
  }
}
