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

//! Target kinds and the operations every kind supports.
//!
//! Targets are a closed set of kinds, so they are a tagged union ([`TargetBody`]) and the
//! shared operations switch on it. Edges to other targets are labels looked up through
//! the [`Context`].
pub mod cc;
pub mod doc;
pub mod filegroup;
pub mod genrule;
pub mod toolchain;

use crate::binder::BoundFields;
use crate::binder::FieldDef;
use crate::context::Context;
use crate::error::ExecError;
use crate::error::GraphError;
use crate::label::Label;
use crate::pool::WorkQueue;
use crate::progress::ProgressBar;
use crate::spec::FileSpec;
use crate::spec::Spec;
use cc::CcTarget;
use doc::DocTarget;
use filegroup::FileGroup;
use genrule::Genrule;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
  FileGroup,
  CcBinary,
  CcLibrary,
  CcTest,
  Genrule,
  Doxygen,
}

impl TargetKind {
  pub fn as_str(self) -> &'static str {
    match self {
      TargetKind::FileGroup => "filegroup",
      TargetKind::CcBinary => "c++/binary",
      TargetKind::CcLibrary => "c++/library",
      TargetKind::CcTest => "c++/test",
      TargetKind::Genrule => "genrule",
      TargetKind::Doxygen => "doxygen",
    }
  }

  /// Fields accepted in manifest entries of this kind.
  pub fn fields(self) -> &'static [FieldDef] {
    match self {
      TargetKind::FileGroup => filegroup::FIELDS,
      TargetKind::CcBinary | TargetKind::CcLibrary | TargetKind::CcTest => cc::FIELDS,
      TargetKind::Genrule => genrule::FIELDS,
      TargetKind::Doxygen => doc::FIELDS,
    }
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TargetKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "filegroup" => Ok(TargetKind::FileGroup),
      "c++/binary" => Ok(TargetKind::CcBinary),
      "c++/library" => Ok(TargetKind::CcLibrary),
      "c++/test" => Ok(TargetKind::CcTest),
      "genrule" => Ok(TargetKind::Genrule),
      "doxygen" => Ok(TargetKind::Doxygen),
      other => Err(other.to_string()),
    }
  }
}

/// Kind-specific data of a target.
#[derive(Debug)]
pub enum TargetBody {
  FileGroup(FileGroup),
  Cc(CcTarget),
  Genrule(Genrule),
  Doc(DocTarget),
}

impl TargetBody {
  pub fn from_fields(kind: TargetKind, bound: &mut BoundFields) -> Self {
    match kind {
      TargetKind::FileGroup => TargetBody::FileGroup(FileGroup::from_fields(bound)),
      TargetKind::CcBinary | TargetKind::CcLibrary | TargetKind::CcTest => {
        TargetBody::Cc(CcTarget::from_fields(kind, bound))
      }
      TargetKind::Genrule => TargetBody::Genrule(Genrule::from_fields(bound)),
      TargetKind::Doxygen => TargetBody::Doc(DocTarget::from_fields(bound)),
    }
  }

  /// Every spec referenced by the body's fields.
  fn specs(&self) -> Box<dyn Iterator<Item = &Spec> + '_> {
    match self {
      TargetBody::FileGroup(group) => Box::new(group.files.iter()),
      TargetBody::Cc(cc) => Box::new(
        cc.srcs
          .iter()
          .chain(&cc.hdrs)
          .chain(&cc.deps)
          .chain(&cc.data)
          .chain(&cc.libs),
      ),
      TargetBody::Genrule(rule) => Box::new(rule.inputs.iter()),
      TargetBody::Doc(_) => Box::new(std::iter::empty()),
    }
  }
}

/// A bound target.
#[derive(Debug)]
pub struct Target {
  label: Label,
  manifest_path: PathBuf,
  body: TargetBody,
  processed: AtomicBool,
  /// Staleness verdict, computed at most once per invocation.
  up_to_date: OnceLock<bool>,
}

impl Target {
  pub fn new(label: Label, manifest_path: PathBuf, body: TargetBody) -> Self {
    Target {
      label,
      manifest_path,
      body,
      processed: AtomicBool::new(false),
      up_to_date: OnceLock::new(),
    }
  }

  pub fn label(&self) -> &Label {
    &self.label
  }

  pub fn body(&self) -> &TargetBody {
    &self.body
  }

  /// Manifest the target was declared in.
  pub fn manifest_path(&self) -> &Path {
    &self.manifest_path
  }

  pub fn kind(&self) -> TargetKind {
    match &self.body {
      TargetBody::FileGroup(_) => TargetKind::FileGroup,
      TargetBody::Cc(cc) => cc.kind,
      TargetBody::Genrule(_) => TargetKind::Genrule,
      TargetBody::Doc(_) => TargetKind::Doxygen,
    }
  }

  pub fn as_cc(&self) -> Option<&CcTarget> {
    match &self.body {
      TargetBody::Cc(cc) => Some(cc),
      _ => None,
    }
  }

  /// Units of work reported to the progress surface.
  pub fn total_ops(&self, ctx: &Context) -> usize {
    match &self.body {
      TargetBody::FileGroup(_) => 0,
      TargetBody::Cc(cc) => cc.total_ops(ctx),
      TargetBody::Genrule(_) | TargetBody::Doc(_) => 1,
    }
  }

  /// Targets referenced directly by this target's fields.
  pub fn dependencies(&self) -> Vec<Label> {
    self
      .body
      .specs()
      .filter_map(Spec::as_target)
      .map(|spec| spec.label.clone())
      .collect()
  }

  /// Absolute paths of what the target produces; executables list their binary first.
  pub fn output_files(&self, ctx: &Context) -> Vec<PathBuf> {
    match &self.body {
      TargetBody::FileGroup(group) => group
        .all_files(ctx)
        .iter()
        .map(|file| file.fs_path(&ctx.workspace))
        .collect(),
      TargetBody::Cc(cc) => cc.output_files(ctx, self),
      TargetBody::Genrule(rule) => rule
        .output_specs(&self.label)
        .iter()
        .map(|file| file.fs_path(&ctx.workspace))
        .collect(),
      TargetBody::Doc(_) => Vec::new(),
    }
  }

  /// True when the outputs are current; see each kind for the rules.
  ///
  /// The on-disk verdict is computed once and reused. It only asks the direct
  /// dependencies, whose own verdicts cover their closures. The graph must be acyclic.
  pub fn processed(&self, ctx: &Context) -> bool {
    if self.processed.load(Ordering::Acquire) {
      return true;
    }
    *self.up_to_date.get_or_init(|| match &self.body {
      TargetBody::FileGroup(_) => self.dependencies_processed(ctx),
      TargetBody::Cc(cc) => cc.is_up_to_date(ctx, self),
      TargetBody::Genrule(rule) => {
        self.dependencies_processed(ctx) && rule.is_up_to_date(ctx, self)
      }
      TargetBody::Doc(_) => false,
    })
  }

  /// True when every direct dependency is processed.
  pub fn dependencies_processed(&self, ctx: &Context) -> bool {
    self
      .dependencies()
      .iter()
      .all(|label| ctx.target(label).is_some_and(|dep| dep.processed(ctx)))
  }

  /// Records that `process` finished.
  pub(crate) fn mark_processed(&self) {
    self.processed.store(true, Ordering::Release);
  }

  /// Static checks run before anything executes.
  pub fn validate(&self, ctx: &Context) -> Result<(), GraphError> {
    for label in self.dependencies() {
      if ctx.target(&label).is_none() {
        return Err(GraphError::MissingTarget {
          label: label.to_string(),
        });
      }
    }
    let invalid = |message: String| GraphError::Invalid {
      label: self.label.to_string(),
      message,
    };
    match &self.body {
      TargetBody::Genrule(rule) => rule.validate().map_err(invalid),
      TargetBody::Cc(_) | TargetBody::FileGroup(_) | TargetBody::Doc(_) => Ok(()),
    }
  }

  /// Brings the target's outputs up to date, then marks it processed.
  pub async fn process(
    &self,
    ctx: &Context,
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(), ExecError> {
    match &self.body {
      TargetBody::FileGroup(_) => {}
      TargetBody::Cc(cc) => cc.process(ctx, self, bar, queue).await?,
      TargetBody::Genrule(rule) => rule.process(ctx, self, bar, queue).await?,
      TargetBody::Doc(doc) => doc.process(ctx, self, bar, queue).await?,
    }
    bar.finish();
    self.mark_processed();
    Ok(())
  }
}

/// Transitive dependencies of `label`, each once, ordered so that every target comes
/// before the targets it depends on.
///
/// This is the pre-order walk of the dependency tree with only the last occurrence of
/// each label kept, so foundational libraries end up last.
pub fn all_dependencies(ctx: &Context, label: &Label) -> Vec<Label> {
  let mut visited = HashSet::new();
  visited.insert(label.clone());
  let mut post_order = Vec::new();
  collect_dependencies(ctx, label, &mut visited, &mut post_order);
  post_order.reverse();
  post_order
}

fn collect_dependencies(
  ctx: &Context,
  label: &Label,
  visited: &mut HashSet<Label>,
  post_order: &mut Vec<Label>,
) {
  let Some(target) = ctx.target(label) else {
    return;
  };
  // Children in reverse, so the reversed post-order matches the last-occurrence order.
  for dep in target.dependencies().into_iter().rev() {
    if visited.insert(dep.clone()) {
      collect_dependencies(ctx, &dep, visited, post_order);
      post_order.push(dep);
    }
  }
}

/// Flattens specs into files, expanding file groups and generated outputs.
pub fn collect_files(ctx: &Context, specs: &[Spec]) -> Vec<FileSpec> {
  let mut files = Vec::new();
  let mut visiting = HashSet::new();
  collect_files_into(ctx, specs, &mut visiting, &mut files);
  files
}

fn collect_files_into(
  ctx: &Context,
  specs: &[Spec],
  visiting: &mut HashSet<Label>,
  files: &mut Vec<FileSpec>,
) {
  for spec in specs {
    match spec {
      Spec::File(file) => files.push(file.clone()),
      Spec::Dir(_) => {}
      Spec::Target(target_spec) => {
        let Some(target) = ctx.target(&target_spec.label) else {
          continue;
        };
        match target.body() {
          TargetBody::FileGroup(group) => {
            if visiting.insert(target_spec.label.clone()) {
              collect_files_into(ctx, &group.files, visiting, files);
              visiting.remove(&target_spec.label);
            }
          }
          TargetBody::Genrule(rule) => files.extend(rule.output_specs(&target_spec.label)),
          TargetBody::Cc(_) | TargetBody::Doc(_) => {}
        }
      }
    }
  }
}
