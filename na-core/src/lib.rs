
extern crate ndarray as nd;
extern crate num_traits;
extern crate thiserror;

use nd::prelude::*;
use nd::linalg::general_mat_vec_mul;
use nd::{Data, LinalgScalar};

use num_traits::{One, Zero};

pub use crate::error::{Result, Error};

pub mod error;

/// A single simulator run: maps a parameter vector onto the vector of
/// predicted observations. Runs must not share mutable state; ensembles are
/// evaluated concurrently.
pub trait Model<E>: Send + Sync {
  fn parameter_dim(&self) -> usize;
  fn observation_dim(&self) -> usize;
  fn run_model(&self, x: ArrayView<E, Ix1>,
               out: ArrayViewMut<E, Ix1>) -> Result<()>;

  fn predict(&self, x: ArrayView<E, Ix1>) -> Result<Array<E, Ix1>>
    where E: Clone + Zero,
  {
    Error::check_dim("model input", self.parameter_dim(), x.len())?;
    let mut out = Array::zeros(self.observation_dim());
    self.run_model(x, out.view_mut())?;
    Ok(out)
  }
}
#[derive(Debug)]
pub struct ModelStats<M> {
  pub model: M,
  pub calls: u64,
}
impl<M> From<M> for ModelStats<M> {
  fn from(v: M) -> ModelStats<M> {
    ModelStats {
      model: v,
      calls: 0,
    }
  }
}
impl<M> ModelStats<M> {
  pub fn predict<E>(&mut self, x: ArrayView<E, Ix1>) -> Result<Array<E, Ix1>>
    where M: Model<E>,
          E: Clone + Zero,
  {
    self.calls += 1;
    self.model.predict(x)
  }
}

/// Wraps a closure as a model. Handy for toy simulators and twin
/// experiments where the "simulator" lives in-process.
pub struct FnModel<F> {
  pub parameter_dim: usize,
  pub observation_dim: usize,
  pub f: F,
}
impl<F> FnModel<F> {
  pub fn new<E>(parameter_dim: usize, observation_dim: usize, f: F) -> FnModel<F>
    where F: for<'r, 's> Fn(ArrayView<'r, E, Ix1>, ArrayViewMut<'s, E, Ix1>) -> Result<()>,
  {
    FnModel {
      parameter_dim,
      observation_dim,
      f,
    }
  }
}
impl<E, F> Model<E> for FnModel<F>
  where F: for<'r, 's> Fn(ArrayView<'r, E, Ix1>, ArrayViewMut<'s, E, Ix1>) -> Result<()>,
        F: Send + Sync,
{
  fn parameter_dim(&self) -> usize { self.parameter_dim }
  fn observation_dim(&self) -> usize { self.observation_dim }
  fn run_model(&self, x: ArrayView<E, Ix1>,
               out: ArrayViewMut<E, Ix1>) -> Result<()> {
    Error::check_dim("model input", self.parameter_dim, x.len())?;
    Error::check_dim("model output", self.observation_dim, out.len())?;
    (self.f)(x, out)
  }
}

/// A matrix is a linear observation operator: `out = H x`.
impl<D, E> Model<E> for ArrayBase<D, Ix2>
  where D: Data<Elem = E> + Send + Sync,
        E: LinalgScalar + Send + Sync,
{
  fn parameter_dim(&self) -> usize { self.ncols() }
  fn observation_dim(&self) -> usize { self.nrows() }
  fn run_model(&self, x: ArrayView<E, Ix1>,
               mut out: ArrayViewMut<E, Ix1>) -> Result<()> {
    Error::check_dim("model input", self.ncols(), x.len())?;
    Error::check_dim("model output", self.nrows(), out.len())?;
    general_mat_vec_mul(One::one(),
                        self, &x, Zero::zero(),
                        &mut out);

    Ok(())
  }
}
