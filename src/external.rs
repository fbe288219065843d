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

//! Fetching external repositories declared in the workspace manifest.
use crate::config::Config;
use crate::error::ExecError;
use crate::fsutil;
use crate::pool::CommandLine;
use crate::pool::WorkQueue;
use crate::workspace::ExternalRepo;
use crate::workspace::Workspace;
use std::io::Write;

/// What [`sync_externals`] did to one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
  Cloned,
  Updated,
  Skipped,
}

/// Clones missing checkouts, and pulls existing ones when `update_external` is set.
///
/// Nothing is fetched in a dry run.
pub async fn sync_externals(
  config: &Config,
  workspace: &Workspace,
  queue: &WorkQueue,
) -> Result<Vec<SyncAction>, ExecError> {
  let mut actions = Vec::with_capacity(workspace.externals().len());
  for repo in workspace.externals() {
    let action = if config.dry_run {
      tracing::info!("DRY_RUN: skipping fetch of '{}'", repo.name);
      SyncAction::Skipped
    } else if repo.checkout.exists() {
      if config.update_external {
        update(repo, queue).await?;
        SyncAction::Updated
      } else {
        SyncAction::Skipped
      }
    } else {
      clone(repo, queue).await?;
      SyncAction::Cloned
    };
    actions.push(action);
  }
  Ok(actions)
}

pub fn clone_command(repo: &ExternalRepo) -> CommandLine {
  CommandLine::new("git")
    .args(["clone", "--recurse-submodules", "-b"])
    .arg(repo.def.branch.as_str())
    .arg(repo.def.url.as_str())
    .path_arg(&repo.checkout)
}

pub fn pull_command(repo: &ExternalRepo) -> CommandLine {
  CommandLine::new("git")
    .args(["pull", "origin"])
    .arg(repo.def.branch.as_str())
    .current_dir(&repo.checkout)
}

async fn clone(repo: &ExternalRepo, queue: &WorkQueue) -> Result<(), ExecError> {
  tracing::info!("Cloning '{}' from {}", repo.name, repo.def.url);
  let wrap = |source: ExecError| ExecError::External {
    name: repo.name.clone(),
    source: Box::new(source),
  };

  if let Some(parent) = repo.checkout.parent() {
    fsutil::create_dir_all(parent).map_err(wrap)?;
  }
  queue.run(clone_command(repo), None).await.map_err(wrap)?;
  if let Some(patch) = &repo.def.patch {
    apply_patch(repo, patch, queue).await.map_err(wrap)?;
  }
  Ok(())
}

async fn update(repo: &ExternalRepo, queue: &WorkQueue) -> Result<(), ExecError> {
  tracing::info!("Updating '{}'", repo.name);
  queue
    .run(pull_command(repo), None)
    .await
    .map(|_| ())
    .map_err(|source| ExecError::External {
      name: repo.name.clone(),
      source: Box::new(source),
    })
}

async fn apply_patch(repo: &ExternalRepo, patch: &str, queue: &WorkQueue) -> Result<(), ExecError> {
  let fs_error = |source| ExecError::Fs {
    action: "write patch for",
    path: repo.checkout.clone(),
    source,
  };
  let mut file = tempfile::Builder::new()
    .suffix(".patch")
    .tempfile()
    .map_err(fs_error)?;
  file.write_all(patch.as_bytes()).map_err(fs_error)?;
  file.flush().map_err(fs_error)?;

  let command = CommandLine::new("git")
    .arg("apply")
    .path_arg(file.path())
    .current_dir(&repo.checkout);
  queue.run(command, None).await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Options;
  use crate::manifest::Manifest;
  use crate::pool::PoolSettings;
  use crate::pool::WorkerPool;
  use tempfile::tempdir;

  fn workspace_for(root: &std::path::Path, dry_run: bool) -> (Config, Workspace) {
    let options = Options {
      workspace_dir: Some(root.to_path_buf()),
      dry_run,
      ..Options::default()
    };
    let config = Config::resolve(options, root).unwrap();
    let manifest = Manifest::parse(
      &root.join("WORKSPACE"),
      r#"{ external: { "third_party/fmt": { url: "https://example.com/fmt.git", branch: "main" } } }"#,
    )
    .unwrap();
    let workspace = Workspace::from_manifest(&config, manifest).unwrap();
    (config, workspace)
  }

  #[test]
  fn git_command_lines() {
    let temp = tempdir().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let (_, workspace) = workspace_for(&root, false);
    let repo = &workspace.externals()[0];

    let checkout = root.join(".external/third_party/fmt");
    assert_eq!(
      clone_command(repo).to_string(),
      format!(
        "git clone --recurse-submodules -b main https://example.com/fmt.git {}",
        checkout.display()
      )
    );
    let pull = pull_command(repo);
    assert_eq!(pull.to_string(), "git pull origin main");
    assert_eq!(pull.cwd, Some(checkout));
  }

  #[tokio::test]
  async fn dry_run_fetches_nothing() {
    let temp = tempdir().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let (config, workspace) = workspace_for(&root, true);

    let pool = WorkerPool::start(1, PoolSettings::default());
    let actions = sync_externals(&config, &workspace, &pool.queue())
      .await
      .unwrap();
    assert_eq!(actions, vec![SyncAction::Skipped]);
    assert!(!root.join(".external").exists());
  }
}
