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

//! The `build`, `test`, `run` and `clean` commands.
use crate::builder;
use crate::builder::BuildPlan;
use crate::builder::Goal;
use crate::config::Config;
use crate::config::Options;
use crate::context::Context;
use crate::error::ExecError;
use crate::error::GraphError;
use crate::error::LatheError;
use crate::external;
use crate::label;
use crate::pool::CommandLine;
use crate::pool::PoolSettings;
use crate::pool::WorkerPool;
use crate::tester;
use crate::tester::TestSummary;
use crate::workspace::Workspace;
use owo_colors::OwoColorize;
use owo_colors::Stream;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Resolves the configuration, loads the workspace and fetches external repositories.
pub async fn open_workspace(options: Options, invocation_dir: &Path) -> Result<Arc<Context>, LatheError> {
  let config = Config::resolve(options, invocation_dir)?;
  tracing::debug!(
    "workspace {} (current directory '{}')",
    config.workspace_dir.display(),
    config.current_dir
  );
  let workspace = Workspace::load(&config)?;

  if !workspace.externals().is_empty() {
    let pool = WorkerPool::start(
      config.threads,
      PoolSettings {
        dry_run: config.dry_run,
        show_commands: config.show_commands,
      },
    );
    let queue = pool.queue();
    external::sync_externals(&config, &workspace, &queue).await?;
    drop(queue);
    pool.shutdown().await;
  }

  Ok(Arc::new(Context::new(config, workspace)))
}

/// Builds `targets` and their dependencies.
pub async fn build(ctx: &Arc<Context>, targets: &[String]) -> Result<BuildPlan, LatheError> {
  build_for(ctx, targets, Goal::Build).await
}

/// Builds the test targets among `targets` and runs them.
pub async fn test(ctx: &Arc<Context>, targets: &[String]) -> Result<TestSummary, LatheError> {
  let plan = build_for(ctx, targets, Goal::Test).await?;
  if plan.specified.is_empty() {
    tracing::warn!("No test targets to run");
    return Ok(TestSummary::default());
  }
  tracing::info!("Testing {} target(s)", plan.specified.len());
  tester::run_tests(ctx, &plan.specified).await
}

/// Builds one binary target and runs it with `args`, inheriting stdio.
pub async fn run(ctx: &Arc<Context>, target: &str, args: &[String]) -> Result<(), LatheError> {
  let plan = build_for(ctx, &[target.to_string()], Goal::Run).await?;
  let binary = plan
    .specified
    .first()
    .and_then(|label| ctx.target(label))
    .and_then(|target| target.output_files(ctx).into_iter().next())
    .ok_or_else(|| GraphError::Invalid {
      label: target.to_string(),
      message: "does not name a binary target".to_string(),
    })?;

  let command = CommandLine::new(binary.to_string_lossy()).args(args.iter().cloned());
  eprintln!(
    "{}",
    format!("$ {command}").if_supports_color(Stream::Stderr, |text| text.dimmed().to_string())
  );
  if ctx.config.dry_run {
    tracing::info!("DRY_RUN: {command}");
    return Ok(());
  }

  let cwd = label::dir_path(ctx.workspace.root(), &ctx.config.current_dir);
  let status = Command::new(&binary)
    .args(args)
    .current_dir(cwd)
    .stdin(Stdio::inherit())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .status()
    .await
    .map_err(|source| ExecError::Spawn {
      program: command.program.clone(),
      source,
    })?;
  if !status.success() {
    let summary = match status.code() {
      Some(code) => format!("{} exited with code {code}", command.program),
      None => format!("{} was terminated by a signal", command.program),
    };
    return Err(
      ExecError::CommandFailed {
        summary,
        output: String::new(),
      }
      .into(),
    );
  }
  Ok(())
}

/// Removes the output root and, with `clean_external`, every external checkout.
pub fn clean(config: &Config, workspace: &Workspace, clean_external: bool) -> Result<(), LatheError> {
  remove_tree(config, &config.output_root)?;
  if clean_external {
    for repo in workspace.externals() {
      remove_tree(config, &repo.checkout)?;
    }
  }
  Ok(())
}

fn remove_tree(config: &Config, path: &Path) -> Result<(), LatheError> {
  if config.dry_run {
    tracing::info!("DRY_RUN: remove {}", path.display());
    return Ok(());
  }
  tracing::info!("Removing {}", path.display());
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(
      ExecError::Fs {
        action: "remove",
        path: path.to_path_buf(),
        source,
      }
      .into(),
    ),
  }
}

async fn build_for(ctx: &Arc<Context>, targets: &[String], goal: Goal) -> Result<BuildPlan, LatheError> {
  let plan = builder::plan(ctx, targets, goal)?;
  tracing::info!(
    "Building {} target(s) for {} requested",
    plan.to_build.len(),
    plan.specified.len()
  );
  builder::build_targets(ctx, &plan.to_build).await?;
  Ok(plan)
}
