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

//! Runs built test binaries, caching single-run results next to each binary.
use crate::config::TestOutput;
use crate::context::Context;
use crate::error::ExecError;
use crate::error::GraphError;
use crate::error::LatheError;
use crate::error::TestError;
use crate::fsutil;
use crate::label::Label;
use crate::pool::CommandLine;
use crate::pool::PoolSettings;
use crate::pool::WorkQueue;
use crate::pool::WorkerPool;
use owo_colors::OwoColorize;
use owo_colors::Stream;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const RESULT_EXTENSION: &str = "result";

/// Outcome of one invocation of a test binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
  pub test_binary: PathBuf,
  pub label: String,
  pub passed: bool,
  pub output: String,
  pub duration: Duration,
  /// Set when the result was read back from disk; always written as false.
  #[serde(default)]
  pub cached: bool,
}

impl TestResult {
  pub fn save(&self, path: &Path) -> Result<(), TestError> {
    let record = TestResult {
      cached: false,
      ..self.clone()
    };
    let json = serde_json::to_string_pretty(&record).map_err(|err| TestError::WriteResult {
      path: path.to_path_buf(),
      source: err.into(),
    })?;
    fs::write(path, json).map_err(|source| TestError::WriteResult {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Reads the result at `path` unless it is older than `binary`.
  ///
  /// Missing, stale or unreadable results are all cache misses.
  pub fn load_cached(path: &Path, binary: &Path) -> Option<TestResult> {
    let saved = fsutil::modified(path)?;
    if fsutil::is_newer(binary, saved) {
      tracing::debug!("{} is older than its test binary", path.display());
      return None;
    }
    let parsed = fs::read_to_string(path)
      .map_err(|err| err.to_string())
      .and_then(|text| serde_json::from_str::<TestResult>(&text).map_err(|err| err.to_string()));
    match parsed {
      Ok(result) => Some(TestResult {
        cached: true,
        ..result
      }),
      Err(err) => {
        tracing::warn!("Ignoring unreadable test result {}: {err}", path.display());
        None
      }
    }
  }
}

/// Counts over every test target of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TestSummary {
  pub passed: usize,
  pub failed: usize,
}

struct TestJob {
  label: Label,
  binary: PathBuf,
  result_path: PathBuf,
}

/// Runs every test in `labels` `test_runs` times and prints one line per test.
///
/// Fails with [`TestError::TestsFailed`] when any test failed.
pub async fn run_tests(ctx: &Arc<Context>, labels: &[Label]) -> Result<TestSummary, LatheError> {
  let jobs = labels
    .iter()
    .map(|label| test_job(ctx, label))
    .collect::<Result<Vec<_>, _>>()?;

  let config = &ctx.config;
  let pool = WorkerPool::start(
    config.test_threads,
    PoolSettings {
      dry_run: config.dry_run,
      show_commands: config.show_commands,
    },
  );
  let queue = pool.queue();
  let semaphore = Arc::new(Semaphore::new(config.test_threads));
  let use_cache = !config.force_run_tests && config.test_runs == 1;

  let mut tasks = JoinSet::new();
  for job in &jobs {
    if use_cache {
      if let Some(result) = TestResult::load_cached(&job.result_path, &job.binary) {
        tasks.spawn(async move { Ok(result) });
        continue;
      }
    }
    for _ in 0..config.test_runs {
      let queue = queue.clone();
      let semaphore = semaphore.clone();
      let label = job.label.to_string();
      let binary = job.binary.clone();
      // Only single runs are cached; concurrent runs would race on one result file.
      let result_path =
        (!config.dry_run && config.test_runs == 1).then(|| job.result_path.clone());
      tasks.spawn(async move {
        run_once(&queue, &semaphore, label, binary, result_path.as_deref()).await
      });
    }
  }

  let mut results: BTreeMap<String, Vec<TestResult>> = BTreeMap::new();
  while let Some(joined) = tasks.join_next().await {
    let result = joined.map_err(|err| ExecError::TaskAborted {
      label: "test".to_string(),
      message: err.to_string(),
    })??;
    results.entry(result.label.clone()).or_default().push(result);
  }
  drop(queue);
  pool.shutdown().await;

  let mut summary = TestSummary::default();
  for job in &jobs {
    let Some(runs) = results.get(&job.label.to_string()) else {
      continue;
    };
    let passed = runs.iter().all(|run| run.passed);
    if passed {
      summary.passed += 1;
    } else {
      summary.failed += 1;
    }
    print_result(&job.label, runs, config.test_output);
  }

  if summary.failed > 0 {
    return Err(
      TestError::TestsFailed {
        failed: summary.failed,
        total: summary.passed + summary.failed,
      }
      .into(),
    );
  }
  Ok(summary)
}

fn test_job(ctx: &Context, label: &Label) -> Result<TestJob, GraphError> {
  let binary = ctx
    .target(label)
    .and_then(|target| target.output_files(ctx).into_iter().next())
    .ok_or_else(|| GraphError::MissingTarget {
      label: label.to_string(),
    })?;
  let result_path = ctx
    .workspace
    .output_path(label.dir())
    .join(format!("{}.{RESULT_EXTENSION}", label.name()));
  Ok(TestJob {
    label: label.clone(),
    binary,
    result_path,
  })
}

async fn run_once(
  queue: &WorkQueue,
  semaphore: &Semaphore,
  label: String,
  binary: PathBuf,
  result_path: Option<&Path>,
) -> Result<TestResult, TestError> {
  let _permit = semaphore
    .acquire()
    .await
    .map_err(|_| ExecError::QueueClosed)?;
  let mut command = CommandLine::new(binary.to_string_lossy());
  if let Some(dir) = binary.parent() {
    command = command.current_dir(dir);
  }
  let output = queue.run_unchecked(command, None).await?;
  let result = TestResult {
    test_binary: binary,
    label,
    passed: output.success,
    output: output.output,
    duration: output.duration,
    cached: false,
  };
  if let Some(path) = result_path {
    result.save(path)?;
  }
  Ok(result)
}

/// `PASSED in 3ms`, `FAILED in 3ms (mean), 1/4 runs failed`, ...
pub fn summary_line(runs: &[TestResult]) -> String {
  let failed = runs.iter().filter(|run| !run.passed).count();
  let total: Duration = runs.iter().map(|run| run.duration).sum();
  let mean = total / runs.len().max(1) as u32;

  let state = if failed > 0 { "FAILED" } else { "PASSED" };
  let mut line = format!("{state} in {mean:?}");
  if runs.iter().any(|run| run.cached) {
    line.push_str(" (cached)");
  }
  if runs.len() > 1 {
    line.push_str(" (mean)");
    if failed > 0 {
      line.push_str(&format!(", {failed}/{} runs failed", runs.len()));
    }
  }
  line
}

fn print_result(label: &Label, runs: &[TestResult], policy: TestOutput) {
  let line = summary_line(runs);
  let failed = runs.iter().any(|run| !run.passed);
  if failed {
    println!(
      "{label} {}",
      line.if_supports_color(Stream::Stdout, |text| text.red().bold().to_string())
    );
  } else {
    println!(
      "{label} {}",
      line.if_supports_color(Stream::Stdout, |text| text.green().bold().to_string())
    );
  }

  // Aggregates over several runs do not repeat each run's output.
  let show = match policy {
    TestOutput::All => true,
    TestOutput::Errors => failed,
    TestOutput::None => false,
  };
  if show && runs.len() == 1 && !runs[0].output.is_empty() {
    println!("{}", runs[0].output.trim_end());
  }
}
