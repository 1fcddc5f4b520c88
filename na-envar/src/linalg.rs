//! Dense decompositions used by the engine. Storage stays in `ndarray`;
//! the factorizations themselves are delegated to `nalgebra`.

use nd::{Array, ArrayView, Ix1, Ix2};
use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::{Error, Result};

/// Singular values below `PINV_RCOND * sigma_max` are treated as zero.
pub const PINV_RCOND: f64 = 1e-15;
/// Relative tolerance on eigenvalues of symmetric positive (semi-)definite
/// matrices.
pub const EIGEN_TOL: f64 = 1e-10;

pub fn to_dmatrix(a: ArrayView<f64, Ix2>) -> DMatrix<f64> {
  let (r, c) = a.dim();
  DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}
pub fn from_dmatrix(m: &DMatrix<f64>) -> Array<f64, Ix2> {
  Array::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Ratio of the largest to the smallest magnitude. Infinite if the smallest
/// is zero.
pub fn condition_number<'a, I>(values: I) -> f64
  where I: IntoIterator<Item = &'a f64>,
{
  let (min, max) = values
    .into_iter()
    .fold((::std::f64::INFINITY, 0.0f64), |(min, max), &v| {
      (min.min(v.abs()), max.max(v.abs()))
    });
  if min == 0.0 {
    ::std::f64::INFINITY
  } else if max == 0.0 {
    // empty
    1.0
  } else {
    max / min
  }
}

#[derive(Debug, Clone)]
pub struct PseudoInverse {
  pub inverse: Array<f64, Ix2>,
  pub singular_values: Array<f64, Ix1>,
  /// Number of singular values kept.
  pub rank: usize,
}
impl PseudoInverse {
  pub fn condition_number(&self) -> f64 {
    condition_number(self.singular_values.iter())
  }
}

/// Moore-Penrose pseudo-inverse through the SVD.
pub fn pseudo_inverse(a: ArrayView<f64, Ix2>) -> Result<PseudoInverse> {
  let svd = to_dmatrix(a).svd(true, true);
  let singular_values: Array<f64, Ix1> = svd.singular_values
    .iter()
    .cloned()
    .collect();
  let sigma_max = singular_values
    .iter()
    .fold(0.0f64, |acc, &s| acc.max(s));
  let cutoff = PINV_RCOND * sigma_max;
  let rank = singular_values
    .iter()
    .filter(|&&s| s > cutoff)
    .count();

  let inverse = svd.pseudo_inverse(cutoff)
    .map_err(|e| Error::Numerical {
      matrix: "pseudo-inverse",
      reason: e.to_string(),
      condition: condition_number(singular_values.iter()),
    })?;

  Ok(PseudoInverse {
    inverse: from_dmatrix(&inverse),
    singular_values,
    rank,
  })
}

/// `a^power` for a symmetric positive semi-definite `a`, through its
/// eigendecomposition `V diag(l^power) V^T`. `a` is symmetrized first.
///
/// An eigenvalue below `-EIGEN_TOL * max|l|` means `a` isn't positive
/// semi-definite and is reported, as is a (numerically) zero eigenvalue when
/// `power` is negative. Smaller negative eigenvalues are rounding noise and
/// are clamped to zero.
pub fn symmetric_power(a: ArrayView<f64, Ix2>, power: f64,
                       matrix: &'static str) -> Result<Array<f64, Ix2>> {
  let (r, c) = a.dim();
  if r != c {
    return Err(Error::Numerical {
      matrix,
      reason: format!("matrix is {}x{}, expected square", r, c),
      condition: ::std::f64::NAN,
    });
  }

  let sym = (&a + &a.t()) * 0.5;
  let eig = SymmetricEigen::new(to_dmatrix(sym.view()));
  let values: Vec<f64> = eig.eigenvalues.iter().cloned().collect();
  let condition = condition_number(values.iter());
  let max_abs = values
    .iter()
    .fold(0.0f64, |acc, &l| acc.max(l.abs()));
  let tol = EIGEN_TOL * max_abs;

  let mut scaled = Vec::with_capacity(values.len());
  for &lambda in values.iter() {
    if lambda < -tol {
      return Err(Error::Numerical {
        matrix,
        reason: format!("eigenvalue {:e} is negative; the matrix is not positive semi-definite",
                        lambda),
        condition,
      });
    }
    let lambda = lambda.max(0.0);
    if power < 0.0 && lambda <= tol {
      return Err(Error::Numerical {
        matrix,
        reason: format!("eigenvalue {:e} is zero to working precision; can't raise to power {}",
                        lambda, power),
        condition,
      });
    }
    scaled.push(if lambda == 0.0 { 0.0 } else { lambda.powf(power) });
  }

  let v = from_dmatrix(&eig.eigenvectors);
  let mut vd = v.clone();
  for (mut column, &s) in vd.columns_mut().into_iter().zip(scaled.iter()) {
    column *= s;
  }

  Ok(vd.dot(&v.t()))
}
