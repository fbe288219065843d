// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-oriented progress reporting on stderr.
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Build-wide progress counters.
#[derive(Debug, Default)]
pub struct Progress {
  enabled: bool,
  total: AtomicUsize,
  done: AtomicUsize,
}

impl Progress {
  pub fn new(enabled: bool) -> Arc<Self> {
    Arc::new(Progress {
      enabled,
      ..Progress::default()
    })
  }

  /// Registers a target with `total_ops` units of work.
  pub fn add_bar(self: &Arc<Self>, name: String, total_ops: usize) -> Arc<ProgressBar> {
    self.total.fetch_add(total_ops, Ordering::Relaxed);
    Arc::new(ProgressBar {
      name,
      total: total_ops,
      done: AtomicUsize::new(0),
      parent: self.clone(),
    })
  }

  /// Completed and registered units of work.
  pub fn counts(&self) -> (usize, usize) {
    (
      self.done.load(Ordering::Relaxed),
      self.total.load(Ordering::Relaxed),
    )
  }
}

/// Progress of one target.
#[derive(Debug)]
pub struct ProgressBar {
  name: String,
  total: usize,
  done: AtomicUsize,
  parent: Arc<Progress>,
}

impl ProgressBar {
  /// Marks one unit of work as done.
  pub fn increment(&self) {
    let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
    if done > self.total {
      return;
    }
    self.parent.done.fetch_add(1, Ordering::Relaxed);
  }

  /// Units still outstanding for this target.
  pub fn remaining(&self) -> usize {
    self
      .total
      .saturating_sub(self.done.load(Ordering::Relaxed))
  }

  /// Completes the bar, accounting for any skipped units, and prints one line.
  pub fn finish(&self) {
    let remaining = self.remaining();
    if remaining > 0 {
      self.done.fetch_add(remaining, Ordering::Relaxed);
      self.parent.done.fetch_add(remaining, Ordering::Relaxed);
    }
    if self.parent.enabled && self.total > 0 {
      let (done, total) = self.parent.counts();
      eprintln!("[{done}/{total}] {}", self.name);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finish_accounts_for_skipped_work() {
    let progress = Progress::new(false);
    let bar = progress.add_bar("//:a".to_string(), 3);
    let other = progress.add_bar("//:b".to_string(), 2);

    bar.increment();
    assert_eq!(progress.counts(), (1, 5));
    assert_eq!(bar.remaining(), 2);

    bar.finish();
    assert_eq!(progress.counts(), (3, 5));

    other.increment();
    other.increment();
    other.increment();
    assert_eq!(progress.counts(), (5, 5));
  }
}
