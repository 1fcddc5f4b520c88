
use std::borrow::Cow;
use std::io::{self, Stderr};
use std::sync::Mutex;
use std::time::Duration;

use pbr::ProgressBar;

use na_envar::ensemble::Progress;

/// A progress bar on stderr over the members of an ensemble run.
pub struct EnsembleProgress {
  name: Cow<'static, str>,
  progress: Mutex<ProgressBar<Stderr>>,
  failed: Mutex<Vec<usize>>,
}
impl EnsembleProgress {
  pub fn new(members: usize, name: Cow<'static, str>) -> EnsembleProgress {
    let mut p = ProgressBar::on(io::stderr(), members as u64);
    p.show_speed = true;
    p.show_percent = true;
    p.show_counter = true;
    p.show_time_left = true;

    let fps = Duration::new(1, 0) / 60;
    p.set_max_refresh_rate(Some(fps));

    let msg = format!("{}: ", name);
    p.message(&msg[..]);
    EnsembleProgress {
      name,
      progress: Mutex::new(p),
      failed: Mutex::new(Vec::new()),
    }
  }

  /// Members reported as failed so far, in completion order.
  pub fn failed(&self) -> Vec<usize> {
    match self.failed.lock() {
      Ok(f) => f.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}

impl Progress for EnsembleProgress {
  fn member_finished(&self, index: usize, ok: bool) {
    if !ok {
      if let Ok(mut f) = self.failed.lock() {
        f.push(index);
      }
    }
    if let Ok(mut p) = self.progress.lock() {
      p.inc();
    }
  }
  fn finish(&self) {
    let failed = self.failed().len();
    let msg = if failed == 0 {
      format!("{} done!\n", self.name)
    } else {
      format!("{} done, {} failed!\n", self.name, failed)
    };
    if let Ok(mut p) = self.progress.lock() {
      p.finish_println(&msg);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn records_failures() {
    let p = EnsembleProgress::new(3, "test".into());
    p.member_finished(0, true);
    p.member_finished(2, false);
    p.member_finished(1, true);
    p.finish();
    assert_eq!(p.failed(), vec![2]);
  }
}
