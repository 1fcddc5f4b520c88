
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  #[error("{what} has length {found}, expected {expected}")]
  Dimension {
    what: &'static str,
    expected: usize,
    found: usize,
  },
  /// The external simulator didn't produce output for this input.
  #[error("model run failed: {reason}")]
  ModelFailed {
    reason: String,
  },
}

impl Error {
  pub fn check_dim(what: &'static str, expected: usize,
                   found: usize) -> Result<()> {
    if expected != found {
      Err(Error::Dimension { what, expected, found, })
    } else {
      Ok(())
    }
  }
}
