extern crate clap;
#[macro_use]
extern crate ndarray as nd;
extern crate na_core;
extern crate na_envar;
extern crate rand;
extern crate rand_chacha;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate tracing;
extern crate tracing_subscriber;
extern crate util;

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use nd::{Array, Axis, Ix1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use na_core::ModelStats;
use na_envar::ensemble::run_ensemble;
use na_envar::observations::PercentOfMean;
use na_envar::{Config, ConvergenceInfo, Session};
use util::data::{spread, Spread};
use util::progress::EnsembleProgress;
use util::TwinTruth;

mod crop;

use crate::crop::CropModel;

/// Twin experiment: parameters of a toy crop model are recovered from noisy
/// observations of a "true" run.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
  /// Experiment configuration (JSON). Uses the built-in experiment if
  /// omitted.
  #[arg(long)]
  config: Option<PathBuf>,
  /// Overrides the configured seed.
  #[arg(long)]
  seed: Option<u64>,
  /// Also run the model over the posterior ensemble and summarize its
  /// spread.
  #[arg(long)]
  run_posterior: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentConfig {
  assimilation: Config,
  /// True parameter values, in the assimilation's parameter order.
  truth: Vec<f64>,
  /// Prior background is the truth perturbed by this fraction.
  truth_error: f64,
  /// Observations are the truth run plus noise of this fraction of each
  /// group's mean.
  observation_noise: f64,
  /// Assumed observation error, as a fraction of each group's mean.
  observation_error: f64,
}

const DEFAULT_EXPERIMENT: &'static str = r#"{
  "assimilation": {
    "parameters": [
      { "name": "growth_rate", "background": 0.08, "bounds": [0.02, 0.2] },
      { "name": "lai_max", "background": 5.0, "bounds": [2.0, 8.0] },
      { "name": "lue", "background": 2.5, "bounds": [1.0, 4.0] },
      { "name": "height_per_lai", "background": 0.3, "bounds": [0.1, 0.6] }
    ],
    "prior_error": 0.1,
    "ensemble_size": 50,
    "seed": 0
  },
  "truth": [0.09, 5.5, 2.2, 0.35],
  "truth_error": 0.05,
  "observation_noise": 0.01,
  "observation_error": 0.02
}"#;

#[derive(Debug, Serialize)]
struct GroupSpread {
  name: String,
  spread: Spread,
}

#[derive(Debug, Serialize)]
struct Summary {
  parameters: Vec<String>,
  truth: Array<f64, Ix1>,
  background: Array<f64, Ix1>,
  analysis: Array<f64, Ix1>,
  prior_std: Array<f64, Ix1>,
  posterior_std: Array<f64, Ix1>,
  convergence: ConvergenceInfo,
  model_calls: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  posterior_spread: Option<Vec<GroupSpread>>,
}

fn load_experiment(args: &Args) -> Result<ExperimentConfig, Box<dyn Error>> {
  let mut experiment: ExperimentConfig = match args.config {
    Some(ref path) => {
      let file = ::std::fs::File::open(path)?;
      serde_json::from_reader(::std::io::BufReader::new(file))?
    },
    None => serde_json::from_str(DEFAULT_EXPERIMENT)?,
  };
  if let Some(seed) = args.seed {
    experiment.assimilation.seed = seed;
  }
  experiment.assimilation.validate()?;
  if experiment.truth.len() != experiment.assimilation.parameter_dim() {
    return Err(Box::new(na_envar::Error::config("truth",
                                                format!("{} values for {} parameters",
                                                        experiment.truth.len(),
                                                        experiment.assimilation.parameter_dim()))));
  }
  Ok(experiment)
}

pub fn main() -> Result<(), Box<dyn Error>> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(::std::io::stderr)
    .init();

  let args = Args::parse();
  let experiment = load_experiment(&args)?;
  let seed = experiment.assimilation.seed;

  let crop = CropModel::default();
  let layout = crop.layout();
  let mut model = ModelStats::from(crop);

  let truth = TwinTruth::from_model(&mut model, Array::from(experiment.truth.clone()),
                                    &layout[..])?;
  let mut rand = ChaCha8Rng::seed_from_u64(seed);
  let config = truth.perturbed_config(&experiment.assimilation,
                                      experiment.truth_error, &mut rand)?;
  info!(background = %config.background(), "prior background drawn from truth");

  let mut session = Session::new(config)?;
  session.load_observations(&truth.observation_source(experiment.observation_noise, seed),
                            &PercentOfMean { fraction: experiment.observation_error })?;
  session.run_background(&mut model)?;

  let m = session.ensemble_size();
  let progress = EnsembleProgress::new(m, "prior ensemble".into());
  let run = session.run_prior_ensemble(&mut model, &progress)?;
  let failed = run.failures().len();
  if failed > 0 {
    let reason = format!("{} of {} prior members failed", failed, m);
    return Err(Box::new(na_envar::Error::precondition("ensemble_predictions", reason)));
  }

  let analysis = session.analyse()?;
  let prior_std = session.prior().b.diag().mapv(f64::sqrt);
  let posterior_std = analysis.covariance().diag().mapv(f64::sqrt);

  let posterior_spread = if args.run_posterior {
    let progress = EnsembleProgress::new(m, "posterior ensemble".into());
    let run = run_ensemble(&mut model, analysis.ensemble.view(), &progress);
    let failed = run.failures().len();
    if failed > 0 {
      warn!(failed, "posterior members failed; spread is over the rest");
    }
    let outputs: Vec<_> = run.outputs
      .into_iter()
      .filter_map(|out| out.ok())
      .collect();
    let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
    let predictions = if views.is_empty() {
      None
    } else {
      Some(nd::stack(Axis(0), &views[..])?)
    };

    let mut start = 0;
    let mut groups = Vec::with_capacity(layout.len());
    for &(name, len) in layout.iter() {
      if let Some(ref p) = predictions {
        if let Some(spread) = spread(p.slice(s![.., start..start + len])) {
          groups.push(GroupSpread { name: name.to_string(), spread, });
        }
      }
      start += len;
    }
    Some(groups)
  } else {
    None
  };

  let summary = Summary {
    parameters: session.config().names().iter().map(|s| s.to_string()).collect(),
    truth: truth.x_truth.clone(),
    background: session.background().to_owned(),
    analysis: analysis.xa.clone(),
    prior_std,
    posterior_std,
    convergence: analysis.convergence.clone(),
    model_calls: model.calls,
    posterior_spread,
  };
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}
