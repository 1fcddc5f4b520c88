extern crate ndarray as nd;
extern crate na_core;
extern crate na_envar;
extern crate pbr;
extern crate rand;
extern crate serde;

use nd::{Array, Ix1};
use rand::Rng;

use na_core::{Model, ModelStats};
use na_envar::config::Config;
use na_envar::observations::ObservationGroup;
use na_envar::twin::{perturb_true_state, TwinObservations};
use na_envar::Result;

pub mod data;
pub mod progress;

/// The "truth" side of a twin experiment: a known parameter vector and the
/// model's outputs at it, split into named observation groups.
#[derive(Clone, Debug)]
pub struct TwinTruth {
  pub x_truth: Array<f64, Ix1>,
  pub groups: Vec<ObservationGroup>,
}
impl TwinTruth {
  /// Run `model` at `x_truth` and split its output into groups of the given
  /// names and lengths, in order.
  pub fn from_model<M>(model: &mut ModelStats<M>, x_truth: Array<f64, Ix1>,
                       layout: &[(&str, usize)]) -> Result<TwinTruth>
    where M: Model<f64>,
  {
    let out = model.predict(x_truth.view())?;
    let total = layout.iter().map(|&(_, len)| len).sum();
    na_core::Error::check_dim("observation layout", out.len(), total)?;

    let mut start = 0;
    let groups = layout
      .iter()
      .map(|&(name, len)| {
        let values = out.slice(nd::s![start..start + len]).to_owned();
        start += len;
        ObservationGroup::new(name, values)
      })
      .collect();
    Ok(TwinTruth { x_truth, groups, })
  }

  /// Noisy observations of the truth.
  pub fn observation_source(&self, noise_fraction: f64, seed: u64) -> TwinObservations {
    TwinObservations {
      truth: self.groups.clone(),
      noise_fraction,
      seed,
    }
  }

  /// `base` with every background replaced by a bounds-respecting
  /// perturbation of the truth.
  pub fn perturbed_config<R>(&self, base: &Config, error_fraction: f64,
                             rand: &mut R) -> Result<Config>
    where R: Rng + ?Sized,
  {
    let bounds = base.bounds()?;
    let xb = perturb_true_state(self.x_truth.view(), error_fraction, &bounds, rand)?;
    let mut config = base.clone();
    for (p, &b) in config.parameters.iter_mut().zip(xb.iter()) {
      p.background = b;
    }
    config.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, arr2};
  use rand::SeedableRng;
  use rand_chacha::ChaCha8Rng;

  use na_envar::config::Parameter;
  use na_envar::MinimizerOptions;

  #[test]
  fn groups_follow_layout() {
    let h = arr2(&[[1.0, 0.0],
                   [0.0, 1.0],
                   [1.0, 1.0]]);
    let mut model = ModelStats::from(h);
    let truth = TwinTruth::from_model(&mut model, arr1(&[1.0, 2.0]),
                                      &[("a", 2), ("b", 1)]).unwrap();
    assert_eq!(truth.groups.len(), 2);
    assert_eq!(truth.groups[0].values, arr1(&[1.0, 2.0]));
    assert_eq!(truth.groups[1].name, "b");
    assert_eq!(truth.groups[1].values, arr1(&[3.0]));
    assert_eq!(model.calls, 1);

    let mut model = ModelStats::from(arr2(&[[1.0, 0.0]]));
    assert!(TwinTruth::from_model(&mut model, arr1(&[1.0, 2.0]), &[("a", 2)]).is_err());
  }

  #[test]
  fn perturbed_config_stays_in_bounds() {
    let base = Config {
      parameters: vec![
        Parameter { name: "a".into(), background: 1.0, bounds: (0.8, 1.2) },
        Parameter { name: "b".into(), background: 5.0, bounds: (4.0, 6.0) },
      ],
      prior_error: 0.1,
      ensemble_size: 4,
      seed: 0,
      minimizer: MinimizerOptions::default(),
    };
    let truth = TwinTruth { x_truth: arr1(&[1.1, 4.5]), groups: vec![] };
    let mut rand = ChaCha8Rng::seed_from_u64(1);
    let config = truth.perturbed_config(&base, 0.05, &mut rand).unwrap();
    assert_eq!(config.names(), base.names());
    assert!(config.bounds().unwrap().contains(config.background().view()));
    assert!(config.background() != base.background());
  }
}
