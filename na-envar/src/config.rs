//! Session configuration: the parameter list with backgrounds and bounds,
//! prior error, ensemble size, seed and minimizer options.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use nd::{Array, Ix1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::minimize::MinimizerOptions;
use crate::sampler::Bounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
  pub name: String,
  pub background: f64,
  /// Inclusive `(lower, upper)`.
  pub bounds: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// Order fixes the layout of every parameter vector.
  pub parameters: Vec<Parameter>,
  /// Prior standard deviation as a fraction of each background value.
  pub prior_error: f64,
  pub ensemble_size: usize,
  #[serde(default)]
  pub seed: u64,
  #[serde(default)]
  pub minimizer: MinimizerOptions,
}

impl Config {
  pub fn from_json(s: &str) -> Result<Config> {
    let config: Config = ::serde_json::from_str(s)?;
    config.validate()?;
    Ok(config)
  }
  pub fn from_reader<R>(r: R) -> Result<Config>
    where R: Read,
  {
    let config: Config = ::serde_json::from_reader(r)?;
    config.validate()?;
    Ok(config)
  }
  pub fn from_path<P>(path: P) -> Result<Config>
    where P: AsRef<Path>,
  {
    let path = path.as_ref();
    let file = ::std::fs::File::open(path)
      .map_err(|e| Error::config("config", format!("can't open {}: {}",
                                                   path.display(), e)))?;
    Config::from_reader(::std::io::BufReader::new(file))
  }

  pub fn validate(&self) -> Result<()> {
    if self.parameters.is_empty() {
      return Err(Error::config("parameters", "no parameters"));
    }
    let mut names = HashSet::new();
    for (i, p) in self.parameters.iter().enumerate() {
      if !names.insert(&p.name[..]) {
        return Err(Error::config(format!("parameters[{}].name", i),
                                 format!("`{}` appears more than once", p.name)));
      }
      if !p.background.is_finite() {
        return Err(Error::config(format!("parameters.{}.background", p.name),
                                 format!("{} isn't finite", p.background)));
      }
      let (lower, upper) = p.bounds;
      if !(lower.is_finite() && upper.is_finite()) || lower > upper {
        return Err(Error::config(format!("parameters.{}.bounds", p.name),
                                 format!("({}, {}) isn't a finite interval",
                                         lower, upper)));
      }
      if p.background < lower || p.background > upper {
        return Err(Error::config(format!("parameters.{}.background", p.name),
                                 format!("{} lies outside ({}, {})",
                                         p.background, lower, upper)));
      }
    }
    if !(self.prior_error.is_finite() && self.prior_error > 0.0) {
      return Err(Error::config("prior_error",
                               format!("{} isn't a positive fraction", self.prior_error)));
    }
    if self.ensemble_size <= 1 {
      return Err(Error::config("ensemble_size",
                               format!("need at least two members, got {}",
                                       self.ensemble_size)));
    }
    self.minimizer.validate()
  }

  pub fn parameter_dim(&self) -> usize { self.parameters.len() }
  pub fn names(&self) -> Vec<&str> {
    self.parameters.iter().map(|p| &p.name[..]).collect()
  }
  pub fn background(&self) -> Array<f64, Ix1> {
    self.parameters.iter().map(|p| p.background).collect()
  }
  pub fn bounds(&self) -> Result<Bounds> {
    Bounds::new(self.parameters.iter().map(|p| p.bounds).collect())
  }
}
