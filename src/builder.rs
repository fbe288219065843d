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

//! Planning and driving a build.
//!
//! [`plan`] resolves the requested identifiers, checks the graph and collects the
//! transitive closure. [`build_targets`] then starts every target whose dependencies are
//! all processed, one task per target, until everything is built or a target fails.
use crate::context::Context;
use crate::error::ExecError;
use crate::error::GraphError;
use crate::error::LatheError;
use crate::graph;
use crate::label::Label;
use crate::pool::PoolSettings;
use crate::pool::WorkerPool;
use crate::progress::Progress;
use crate::resolve::resolve_targets;
use crate::target::Target;
use crate::target::TargetKind;
use crate::target::all_dependencies;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// What the requested targets are for; decides which kinds are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
  Build,
  Test,
  Run,
}

impl Goal {
  fn accepts(self, kind: TargetKind) -> bool {
    match self {
      Goal::Build => true,
      Goal::Test => kind == TargetKind::CcTest,
      Goal::Run => kind == TargetKind::CcBinary,
    }
  }
}

/// Targets named on the command line and everything that has to be built for them.
#[derive(Debug, Default)]
pub struct BuildPlan {
  /// In command-line order, without repeats.
  pub specified: Vec<Label>,
  pub to_build: BTreeSet<Label>,
}

/// Resolves `identifiers` against the invocation directory and prepares the build.
pub fn plan(ctx: &Context, identifiers: &[String], goal: Goal) -> Result<BuildPlan, LatheError> {
  let mut plan = BuildPlan::default();
  for raw in identifiers {
    tracing::info!("Loading target(s) '{raw}'");
    for spec in resolve_targets(ctx, raw, &ctx.config.current_dir)? {
      if !goal.accepts(spec.kind) {
        tracing::warn!("Ignoring {} target '{}'", spec.kind, spec.label);
        continue;
      }
      if plan.specified.contains(&spec.label) {
        continue;
      }
      plan.specified.push(spec.label);
      if goal == Goal::Run {
        break;
      }
    }
    if goal == Goal::Run && !plan.specified.is_empty() {
      break;
    }
  }

  graph::check_for_cycles(ctx, &plan.specified)?;
  for label in &plan.specified {
    plan.to_build.insert(label.clone());
    plan.to_build.extend(all_dependencies(ctx, label));
  }
  let closure: Vec<Label> = plan.to_build.iter().cloned().collect();
  graph::validate(ctx, &closure)?;
  Ok(plan)
}

/// True when every transitive dependency of `target` is processed.
///
/// A dependency is only processed once its own dependencies are, so asking the direct
/// ones is enough.
pub fn ready_to_process(ctx: &Context, target: &Target) -> bool {
  target.dependencies_processed(ctx)
}

/// Processes every target in `to_build`, dependencies first.
///
/// Commands run on a pool of `threads` workers. The first failing target aborts the
/// build; commands already running are left to finish and their results are dropped.
pub async fn build_targets(ctx: &Arc<Context>, to_build: &BTreeSet<Label>) -> Result<(), LatheError> {
  let mut waiting = to_build
    .iter()
    .map(|label| {
      ctx.target(label).ok_or_else(|| GraphError::MissingTarget {
        label: label.to_string(),
      })
    })
    .collect::<Result<Vec<_>, _>>()?;

  let pool = WorkerPool::start(
    ctx.config.threads,
    PoolSettings {
      dry_run: ctx.config.dry_run,
      show_commands: ctx.config.show_commands,
    },
  );
  let queue = pool.queue();
  let progress = Progress::new(ctx.config.progress_enabled());

  let total = waiting.len();
  let mut built = 0;
  let mut tasks = JoinSet::new();
  while built < total {
    let (ready, blocked): (Vec<_>, Vec<_>) = waiting
      .into_iter()
      .partition(|target| ready_to_process(ctx, target));
    waiting = blocked;

    for target in ready {
      tracing::debug!("Processing {}", target.label());
      let bar = progress.add_bar(target.label().to_string(), target.total_ops(ctx));
      let ctx = ctx.clone();
      let queue = queue.clone();
      let span = tracing::info_span!("target", label = %target.label());
      tasks.spawn(
        async move {
          let result = target.process(&ctx, &bar, &queue).await;
          (target, result)
        }
        .instrument(span),
      );
    }

    let Some(joined) = tasks.join_next().await else {
      return Err(
        ExecError::StalledBuild {
          remaining: waiting.len(),
        }
        .into(),
      );
    };
    match joined {
      Ok((target, Ok(()))) => {
        tracing::debug!("Finished {}", target.label());
        built += 1;
      }
      Ok((target, Err(source))) => {
        tasks.detach_all();
        return Err(
          ExecError::TargetFailed {
            label: target.label().to_string(),
            source: Box::new(source),
          }
          .into(),
        );
      }
      Err(err) => {
        tasks.detach_all();
        return Err(
          ExecError::TaskAborted {
            label: "<unknown>".to_string(),
            message: err.to_string(),
          }
          .into(),
        );
      }
    }
  }

  drop(queue);
  pool.shutdown().await;
  let (done, total_ops) = progress.counts();
  tracing::info!("Built {built} target(s), {done}/{total_ops} operations");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::ROOT_DIR;
  use crate::testutil::workspace;
  use crate::testutil::workspace_with;

  fn names(labels: impl IntoIterator<Item = Label>) -> Vec<String> {
    labels.into_iter().map(|label| label.to_string()).collect()
  }

  #[test]
  fn plan_collects_the_closure() {
    let (_temp, ctx) = workspace(&[
      (
        "BUILD",
        r#"{
          base: { type: "c++/library", srcs: ["x.cc"] },
          app: { type: "c++/binary", srcs: ["x.cc"], deps: [":base"] },
          app_test: { type: "c++/test", srcs: ["x.cc"], deps: [":base"] },
        }"#,
      ),
      ("x.cc", ""),
    ]);

    let build = plan(&ctx, &[":app".to_string(), ":app".to_string()], Goal::Build).unwrap();
    assert_eq!(names(build.specified), vec!["//:app"]);
    assert_eq!(names(build.to_build), vec!["//:app", "//:base"]);

    let test = plan(&ctx, &[":all".to_string()], Goal::Test).unwrap();
    assert_eq!(names(test.specified), vec!["//:app_test"]);

    let run = plan(&ctx, &[":all".to_string()], Goal::Run).unwrap();
    assert_eq!(names(run.specified), vec!["//:app"]);
  }

  #[test]
  fn plan_rejects_cycles() {
    let (_temp, ctx) = workspace(&[(
      "BUILD",
      r#"{
        a: { type: "filegroup", files: [":b"] },
        b: { type: "filegroup", files: [":a"] },
      }"#,
    )]);
    let err = plan(&ctx, &[":a".to_string()], Goal::Build).unwrap_err();
    assert!(matches!(
      err,
      LatheError::Graph(GraphError::DependencyCycle { .. })
    ));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn dry_run_processes_every_target() {
    let (_temp, ctx) = workspace_with(
      &[
        (
          "BUILD",
          r#"{
            base: { type: "c++/library", srcs: ["x.cc"] },
            app: { type: "c++/binary", srcs: ["x.cc"], deps: [":base"] },
          }"#,
        ),
        ("x.cc", ""),
      ],
      |options| options.dry_run = true,
    );
    let ctx = Arc::new(ctx);
    let build = plan(&ctx, &[":app".to_string()], Goal::Build).unwrap();
    build_targets(&ctx, &build.to_build).await.unwrap();

    for label in &build.to_build {
      assert!(ctx.target(label).unwrap().processed(&ctx));
    }
    assert!(!ctx.workspace.output_dir().exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn first_failure_stops_the_build() {
    let (_temp, ctx) = workspace_with(
      &[
        (
          "BUILD",
          r#"{
            base: { type: "c++/library", srcs: ["x.cc"] },
            app: { type: "c++/binary", srcs: ["x.cc"], deps: [":base"] },
          }"#,
        ),
        ("x.cc", ""),
      ],
      |options| options.cc_compiler = Some("false".to_string()),
    );
    let ctx = Arc::new(ctx);
    let build = plan(&ctx, &[":app".to_string()], Goal::Build).unwrap();
    let err = build_targets(&ctx, &build.to_build).await.unwrap_err();

    assert_eq!(err.to_string(), "//:base failed");
    assert!(!ctx.target(&Label::new(ROOT_DIR, "app")).unwrap().processed(&ctx));
  }

  /// Writes `path` with a modification time `offset` seconds in the future.
  fn write_at(path: &std::path::Path, offset: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
    let time = std::time::SystemTime::now() + std::time::Duration::from_secs(60 + offset);
    std::fs::File::options()
      .write(true)
      .open(path)
      .unwrap()
      .set_modified(time)
      .unwrap();
  }

  #[test]
  fn deep_up_to_date_graph_is_ready() {
    // A chain of diamonds: two libraries per level, each depending on both below.
    const DEPTH: usize = 40;
    let mut manifest = String::from("{\n");
    for level in 0..DEPTH {
      let deps = if level == 0 {
        String::new()
      } else {
        format!(r#", deps: [":a{0}", ":b{0}"]"#, level - 1)
      };
      for side in ["a", "b"] {
        manifest.push_str(&format!(
          "  {side}{level}: {{ type: \"c++/library\", srcs: [\"x.cc\"]{deps} }},\n"
        ));
      }
    }
    manifest.push_str(&format!(
      "  app: {{ type: \"c++/binary\", srcs: [\"x.cc\"], deps: [\":a{0}\", \":b{0}\"] }},\n}}\n",
      DEPTH - 1
    ));
    let (_temp, ctx) = workspace(&[("BUILD", manifest.as_str()), ("x.cc", "")]);
    let build = plan(&ctx, &[":app".to_string()], Goal::Build).unwrap();
    assert_eq!(build.to_build.len(), 2 * DEPTH + 1);

    // Artifacts written bottom-up, each newer than everything below it.
    for level in 0..DEPTH {
      for side in ["a", "b"] {
        let target = ctx
          .target(&Label::new(ROOT_DIR, format!("{side}{level}")))
          .unwrap();
        let artifact = target.as_cc().unwrap().artifact(&ctx, &target).unwrap();
        write_at(&artifact, level as u64);
      }
    }
    let app = ctx.target(&Label::new(ROOT_DIR, "app")).unwrap();
    write_at(&app.as_cc().unwrap().artifact(&ctx, &app).unwrap(), DEPTH as u64);

    assert!(ready_to_process(&ctx, &app));
    assert!(app.processed(&ctx));

    // A stale foundation makes everything above it stale.
    let (_temp, ctx) = workspace(&[("BUILD", manifest.as_str()), ("x.cc", "")]);
    plan(&ctx, &[":app".to_string()], Goal::Build).unwrap();
    let app = ctx.target(&Label::new(ROOT_DIR, "app")).unwrap();
    write_at(&app.as_cc().unwrap().artifact(&ctx, &app).unwrap(), DEPTH as u64);
    assert!(!ready_to_process(&ctx, &app));
    assert!(!app.processed(&ctx));
  }
}
