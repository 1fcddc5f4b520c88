//! A small crop-growth simulator standing in for the land surface model.
//!
//! Leaf area grows logistically from emergence; GPP is light-use efficiency
//! times the absorbed fraction of a seasonal PAR cycle; canopy height
//! follows leaf area. Outputs are sampled on fixed observation days.

use std::f64::consts::PI;

use nd::{ArrayView, ArrayViewMut, Ix1};

use na_core::{self, Model};

/// Parameter order of the simulator's input vector.
pub const PARAMETERS: [&'static str; 4] = ["growth_rate", "lai_max", "lue", "height_per_lai"];

const INITIAL_LAI: f64 = 0.1;
const EXTINCTION: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct CropModel {
  pub gpp_days: Vec<usize>,
  pub lai_days: Vec<usize>,
  pub canht_days: Vec<usize>,
}

impl Default for CropModel {
  fn default() -> CropModel {
    CropModel {
      gpp_days: (20..120).step_by(3).collect(),
      lai_days: vec![30, 50, 70, 90],
      canht_days: vec![30, 60, 90, 110],
    }
  }
}

impl CropModel {
  /// Observation groups in output order.
  pub fn layout(&self) -> Vec<(&'static str, usize)> {
    vec![
      ("gpp", self.gpp_days.len()),
      ("lai", self.lai_days.len()),
      ("canht", self.canht_days.len()),
    ]
  }

  fn lai(growth_rate: f64, lai_max: f64, day: usize) -> f64 {
    let a = (lai_max - INITIAL_LAI) / INITIAL_LAI;
    lai_max / (1.0 + a * (-growth_rate * day as f64).exp())
  }
  /// MJ m-2 d-1
  fn par(day: usize) -> f64 {
    8.0 + 4.0 * (2.0 * PI * day as f64 / 365.0).sin()
  }
}

impl Model<f64> for CropModel {
  fn parameter_dim(&self) -> usize { PARAMETERS.len() }
  fn observation_dim(&self) -> usize {
    self.gpp_days.len() + self.lai_days.len() + self.canht_days.len()
  }
  fn run_model(&self, x: ArrayView<f64, Ix1>,
               mut out: ArrayViewMut<f64, Ix1>) -> na_core::Result<()> {
    na_core::Error::check_dim("crop parameters", self.parameter_dim(), x.len())?;
    na_core::Error::check_dim("crop output", self.observation_dim(), out.len())?;
    if let Some(i) = x.iter().position(|&v| !(v > 0.0)) {
      return Err(na_core::Error::ModelFailed {
        reason: format!("{} must be positive, got {}", PARAMETERS[i], x[i]),
      });
    }
    let (growth_rate, lai_max, lue, height_per_lai) = (x[0], x[1], x[2], x[3]);
    if lai_max <= INITIAL_LAI {
      return Err(na_core::Error::ModelFailed {
        reason: format!("lai_max {} is below emergence leaf area", lai_max),
      });
    }

    let days = self.gpp_days.iter()
      .chain(self.lai_days.iter())
      .chain(self.canht_days.iter());
    let gpp = self.gpp_days.len();
    let lai = gpp + self.lai_days.len();
    for (i, (&day, dest)) in days.zip(out.iter_mut()).enumerate() {
      let l = CropModel::lai(growth_rate, lai_max, day);
      *dest = if i < gpp {
        lue * CropModel::par(day) * (1.0 - (-EXTINCTION * l).exp())
      } else if i < lai {
        l
      } else {
        height_per_lai * l
      };
    }
    Ok(())
  }
}
