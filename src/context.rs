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

//! Per-invocation state threaded through resolution and execution.
use crate::config::Config;
use crate::error::ManifestError;
use crate::label::Label;
use crate::manifest::Manifest;
use crate::manifest::ManifestCache;
use crate::spec::Spec;
use crate::target::Target;
use crate::workspace::ManifestFallback;
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;

/// Configuration, workspace, and the manifest, spec and target caches of one build.
#[derive(Debug)]
pub struct Context {
  pub config: Config,
  pub workspace: Workspace,
  manifests: ManifestCache,
  specs: Mutex<HashMap<String, Spec>>,
  targets: RwLock<HashMap<Label, Arc<Target>>>,
  resolving: Mutex<HashSet<Label>>,
}

impl Context {
  pub fn new(config: Config, workspace: Workspace) -> Self {
    let manifests = ManifestCache::new(!config.no_cache);
    Context {
      config,
      workspace,
      manifests,
      specs: Mutex::new(HashMap::new()),
      targets: RwLock::new(HashMap::new()),
      resolving: Mutex::new(HashSet::new()),
    }
  }

  /// Path of the in-tree manifest of `dir`, or of its external fallback.
  pub fn manifest_path(&self, dir: &str) -> PathBuf {
    let path = self.workspace.fs_dir(dir).join(&self.config.build_filename);
    if path.is_file() {
      return path;
    }
    match self.workspace.manifest_fallback(dir) {
      Some(ManifestFallback::File(fallback)) => fallback,
      Some(ManifestFallback::Inline(_)) => self.workspace.manifest_path().to_path_buf(),
      None => path,
    }
  }

  /// Loads the manifest declaring the targets of `dir`.
  pub fn manifest_for_dir(&self, dir: &str) -> Result<Arc<Manifest>, ManifestError> {
    let path = self.workspace.fs_dir(dir).join(&self.config.build_filename);
    if path.is_file() {
      return self.manifests.get_or_load(&path);
    }
    match self.workspace.manifest_fallback(dir) {
      Some(ManifestFallback::File(fallback)) => self.manifests.get_or_load(&fallback),
      Some(ManifestFallback::Inline(manifest)) => Ok(manifest),
      None => Err(ManifestError::NotFound { path }),
    }
  }

  /// True when `dir` can hold targets at all.
  pub fn dir_exists(&self, dir: &str) -> bool {
    self.workspace.fs_dir(dir).is_dir() || self.workspace.manifest_fallback(dir).is_some()
  }

  pub(crate) fn cached_spec(&self, key: &str) -> Option<Spec> {
    if self.config.no_cache {
      return None;
    }
    lock(&self.specs).get(key).cloned()
  }

  pub(crate) fn cache_spec(&self, key: String, spec: Spec) {
    if !self.config.no_cache {
      lock(&self.specs).insert(key, spec);
    }
  }

  /// The bound target of `label`, if it has been resolved.
  pub fn target(&self, label: &Label) -> Option<Arc<Target>> {
    self
      .targets
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .get(label)
      .cloned()
  }

  /// Number of targets resolved so far.
  pub fn target_count(&self) -> usize {
    self
      .targets
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .len()
  }

  /// Claims `label` for binding. False when it is bound or being bound already.
  pub(crate) fn begin_binding(&self, label: &Label) -> bool {
    if self.target(label).is_some() {
      return false;
    }
    lock(&self.resolving).insert(label.clone())
  }

  /// Publishes a freshly bound target.
  pub(crate) fn finish_binding(&self, target: Target) -> Arc<Target> {
    let label = target.label().clone();
    let stored = self
      .targets
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .entry(label.clone())
      .or_insert_with(|| Arc::new(target))
      .clone();
    lock(&self.resolving).remove(&label);
    stored
  }

  pub(crate) fn abandon_binding(&self, label: &Label) {
    lock(&self.resolving).remove(label);
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex
    .lock()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
}
