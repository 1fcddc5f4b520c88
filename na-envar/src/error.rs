
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  /// Inconsistent or missing configuration. Fatal.
  #[error("configuration error in `{field}`: {reason}")]
  Configuration {
    field: String,
    reason: String,
  },
  /// An operation was invoked before its inputs were in place, or the
  /// inputs it was handed don't line up with the session. Fatal.
  #[error("precondition failed for `{field}`: {reason}")]
  Precondition {
    field: String,
    reason: String,
  },
  #[error("numerical failure in {matrix}: {reason} (condition number {condition:e})")]
  Numerical {
    matrix: &'static str,
    reason: String,
    condition: f64,
  },
  #[error(transparent)]
  Model(#[from] ::na_core::Error),
  #[error("minimizer failed: {reason}")]
  Minimizer {
    reason: String,
  },
}

impl Error {
  pub fn config<F, R>(field: F, reason: R) -> Error
    where F: Into<String>,
          R: Into<String>,
  {
    Error::Configuration {
      field: field.into(),
      reason: reason.into(),
    }
  }
  pub fn precondition<F, R>(field: F, reason: R) -> Error
    where F: Into<String>,
          R: Into<String>,
  {
    Error::Precondition {
      field: field.into(),
      reason: reason.into(),
    }
  }
}

impl From<::argmin::core::Error> for Error {
  fn from(v: ::argmin::core::Error) -> Error {
    Error::Minimizer {
      reason: format!("{:#}", v),
    }
  }
}

impl From<::serde_json::Error> for Error {
  fn from(v: ::serde_json::Error) -> Error {
    Error::config("config", v.to_string())
  }
}
