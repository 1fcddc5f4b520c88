//! Ensemble-based four-dimensional variational assimilation (4DEnVar) for
//! parameter estimation.
//!
//! The analysis is sought in the space spanned by a prior ensemble:
//! parameters are written as `x = xb + Xb_mat^T w` and the cost function is
//! minimized over the weights `w`, using only the simulator's predictions
//! for the background and each prior member. No tangent linear or adjoint
//! model is needed.

extern crate argmin;
extern crate argmin_math;
extern crate nalgebra;
#[macro_use]
extern crate ndarray as nd;
extern crate ndarray_rand as nd_rand;
extern crate na_core;
extern crate rand;
extern crate rand_chacha;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate thiserror;
#[macro_use]
extern crate tracing;

pub use crate::analysis::Analysis;
pub use crate::config::{Config, Parameter};
pub use crate::error::{Error, Result};
pub use crate::minimize::{ConvergenceInfo, MinimizerOptions};
pub use crate::observations::{ObservationGroup, Observations};
pub use crate::session::{Session, Stage};

pub mod analysis;
pub mod config;
pub mod cost;
pub mod ensemble;
pub mod error;
pub mod linalg;
pub mod minimize;
pub mod observations;
pub mod sampler;
pub mod session;
pub mod transform;
pub mod twin;
pub mod utils;
