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

//! Throwaway workspaces for unit tests.
use crate::config::Config;
use crate::config::Options;
use crate::context::Context;
use crate::workspace::Workspace;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tempfile::tempdir;

/// Creates a workspace containing `files` (a `WORKSPACE` file is added when missing).
pub(crate) fn workspace(files: &[(&str, &str)]) -> (TempDir, Context) {
  workspace_with(files, |_| {})
}

/// Like [`workspace`], with a hook to adjust the options.
pub(crate) fn workspace_with(
  files: &[(&str, &str)],
  configure: impl FnOnce(&mut Options),
) -> (TempDir, Context) {
  let temp = tempdir().unwrap();
  let root = temp.path().canonicalize().unwrap();

  if !files.iter().any(|(path, _)| *path == "WORKSPACE") {
    write_file(&root, "WORKSPACE", "{}");
  }
  for (path, content) in files {
    write_file(&root, path, content);
  }

  let mut options = Options {
    workspace_dir: Some(root.clone()),
    ..Options::default()
  };
  configure(&mut options);

  let config = Config::resolve(options, &root).unwrap();
  let workspace = Workspace::load(&config).unwrap();
  (temp, Context::new(config, workspace))
}

pub(crate) fn write_file(root: &Path, path: &str, content: &str) {
  let path = root.join(path);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}
