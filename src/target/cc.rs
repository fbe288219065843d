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

//! C++ binaries, libraries and tests.
//!
//! Processing runs three phases in order:
//! 1. compile every source whose object is older than the source or than any header of
//!    the transitive header set,
//! 2. link when anything was compiled or the artifact is stale,
//! 3. materialize the transitive `data` files next to the outputs.
use crate::binder::BoundFields;
use crate::binder::FieldDef;
use crate::binder::FieldType;
use crate::context::Context;
use crate::error::ExecError;
use crate::fsutil;
use crate::pool::CompletionHook;
use crate::pool::WorkQueue;
use crate::progress::ProgressBar;
use crate::spec::DirSpec;
use crate::spec::FileSpec;
use crate::spec::Spec;
use crate::target::Target;
use crate::target::TargetKind;
use crate::target::all_dependencies;
use crate::target::collect_files;
use crate::target::filegroup::FILE_KINDS;
use crate::target::toolchain::Toolchain;
use crate::target::toolchain::dedup_first;
use std::collections::HashSet;
use std::hash::Hash;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

pub const LIBRARY_KINDS: &[&str] = &["c++/library"];

pub const LIB_KINDS: &[&str] = &["file", "filegroup"];

/// Directory under a source's output directory holding per-target objects.
pub const OBJECT_DIR: &str = "_objs";

pub const FIELDS: &[FieldDef] = &[
  FieldDef::new("srcs", FieldType::Specs(FILE_KINDS)),
  FieldDef::new("hdrs", FieldType::Specs(FILE_KINDS)),
  FieldDef::new("deps", FieldType::Targets(LIBRARY_KINDS)),
  FieldDef::new("data", FieldType::Specs(FILE_KINDS)),
  FieldDef::new("compile_flags", FieldType::Strings),
  FieldDef::new("link_flags", FieldType::Strings),
  FieldDef::new("includes", FieldType::Dirs).with_aliases(&["include_dirs"]),
  FieldDef::new("libs", FieldType::Specs(LIB_KINDS)),
];

#[derive(Debug)]
pub struct CcTarget {
  pub kind: TargetKind,
  pub srcs: Vec<Spec>,
  pub hdrs: Vec<Spec>,
  pub deps: Vec<Spec>,
  pub data: Vec<Spec>,
  pub compile_flags: Vec<String>,
  pub link_flags: Vec<String>,
  pub includes: Vec<DirSpec>,
  pub libs: Vec<Spec>,
}

impl CcTarget {
  pub fn from_fields(kind: TargetKind, bound: &mut BoundFields) -> Self {
    CcTarget {
      kind,
      srcs: bound.specs("srcs"),
      hdrs: bound.specs("hdrs"),
      deps: bound.specs("deps"),
      data: bound.specs("data"),
      compile_flags: bound.strings("compile_flags"),
      link_flags: bound.strings("link_flags"),
      includes: bound.dirs("includes"),
      libs: bound.specs("libs"),
    }
  }

  pub fn is_library(&self) -> bool {
    self.kind == TargetKind::CcLibrary
  }

  /// One unit per source plus one for the link.
  pub fn total_ops(&self, ctx: &Context) -> usize {
    let sources = collect_files(ctx, &self.srcs).len();
    if self.is_library() && sources == 0 {
      0
    } else {
      sources + 1
    }
  }

  /// The linked artifact; header-only libraries have none.
  pub fn artifact(&self, ctx: &Context, target: &Target) -> Option<PathBuf> {
    let toolchain = Toolchain::from_config(&ctx.config);
    let label = target.label();
    let name = if self.is_library() {
      if collect_files(ctx, &self.srcs).is_empty() {
        return None;
      }
      toolchain.library_name(label.name())
    } else {
      toolchain.executable_name(label.name())
    };
    Some(ctx.workspace.output_path(label.dir()).join(name))
  }

  /// The artifact first, then the materialized data files.
  pub fn output_files(&self, ctx: &Context, target: &Target) -> Vec<PathBuf> {
    let deps = cc_dependencies(ctx, target);
    self
      .artifact(ctx, target)
      .into_iter()
      .chain(
        self
          .data_files(ctx, &deps)
          .iter()
          .map(|file| file.output_path(&ctx.workspace)),
      )
      .collect()
  }

  /// True when the artifact is newer than every input and all dependencies are current.
  pub fn is_up_to_date(&self, ctx: &Context, target: &Target) -> bool {
    let Some(artifact) = self.artifact(ctx, target) else {
      return true;
    };
    let Some(built) = fsutil::modified(&artifact) else {
      return false;
    };

    if fsutil::is_newer(target.manifest_path(), built)
      || fsutil::is_newer(ctx.workspace.manifest_path(), built)
    {
      return false;
    }

    let own_files = [&self.srcs, &self.hdrs, &self.data, &self.libs]
      .into_iter()
      .flat_map(|specs| collect_files(ctx, specs));
    for file in own_files {
      if fsutil::is_newer(&file.fs_path(&ctx.workspace), built) {
        return false;
      }
    }

    let deps = cc_dependencies(ctx, target);
    if self
      .header_set(ctx, &deps)
      .iter()
      .chain(&self.link_inputs(ctx, &deps))
      .any(|path| fsutil::is_newer(path, built))
    {
      return false;
    }

    target.dependencies_processed(ctx)
  }

  pub async fn process(
    &self,
    ctx: &Context,
    target: &Target,
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(), ExecError> {
    let label = target.label();
    let sources = collect_files(ctx, &self.srcs);
    if self.kind == TargetKind::CcBinary && sources.is_empty() && self.deps.is_empty() {
      return Err(ExecError::NoSources {
        label: label.to_string(),
      });
    }

    let toolchain = Toolchain::from_config(&ctx.config);
    let deps = cc_dependencies(ctx, target);
    let (objects, compiled) = self
      .compile(ctx, target, &toolchain, &sources, &deps, bar, queue)
      .await?;
    self
      .link(ctx, target, &toolchain, &objects, compiled, &deps, bar, queue)
      .await?;

    if !ctx.config.dry_run {
      for file in self.data_files(ctx, &deps) {
        fsutil::refresh(
          &file.fs_path(&ctx.workspace),
          &file.output_path(&ctx.workspace),
        )?;
      }
    }
    Ok(())
  }

  /// Compiles stale sources; returns every object path and how many were compiled.
  #[allow(clippy::too_many_arguments)]
  async fn compile(
    &self,
    ctx: &Context,
    target: &Target,
    toolchain: &Toolchain,
    sources: &[FileSpec],
    deps: &[Arc<Target>],
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(Vec<PathBuf>, usize), ExecError> {
    let workspace = &ctx.workspace;
    let newest_header = self
      .header_set(ctx, deps)
      .iter()
      .filter_map(|header| fsutil::modified(header))
      .max();
    let compile_flags = self.compile_flags(deps);
    let include_dirs = self.include_dirs(ctx, deps);

    let mut objects = Vec::with_capacity(sources.len());
    let mut pending = Vec::new();
    for src in sources {
      let src_path = src.fs_path(workspace);
      let obj = object_path(ctx, toolchain, target, src);
      if !ctx.config.dry_run {
        if let Some(parent) = obj.parent() {
          fsutil::create_dir_all(parent)?;
        }
      }
      objects.push(obj.clone());

      if object_is_current(&src_path, &obj, newest_header) {
        bar.increment();
        continue;
      }
      let command = toolchain.compile(&src_path, &obj, &compile_flags, &include_dirs);
      pending.push(queue.submit(command, Some(increment_on_complete(bar))).await?);
    }

    let compiled = pending.len();
    let mut first_error = None;
    for command in pending {
      if let Err(err) = command.wait().await {
        first_error.get_or_insert(err);
      }
    }
    match first_error {
      Some(err) => Err(err),
      None => Ok((objects, compiled)),
    }
  }

  #[allow(clippy::too_many_arguments)]
  async fn link(
    &self,
    ctx: &Context,
    target: &Target,
    toolchain: &Toolchain,
    objects: &[PathBuf],
    compiled: usize,
    deps: &[Arc<Target>],
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(), ExecError> {
    let Some(artifact) = self.artifact(ctx, target) else {
      return Ok(());
    };
    let inputs = if self.is_library() {
      Vec::new()
    } else {
      self.link_inputs(ctx, deps)
    };

    let relink = compiled > 0
      || match fsutil::modified(&artifact) {
        None => true,
        Some(built) => {
          fsutil::is_newer(target.manifest_path(), built)
            || fsutil::is_newer(ctx.workspace.manifest_path(), built)
            || inputs.iter().any(|input| fsutil::is_newer(input, built))
        }
      };
    if !relink {
      bar.increment();
      return Ok(());
    }

    let link_flags = self.link_flags(deps);
    let command = if self.is_library() {
      if !ctx.config.dry_run && toolchain.static_linking {
        // Archivers append to an existing archive.
        fsutil::remove_file_if_exists(&artifact)?;
      }
      toolchain.link_library(&artifact, objects, &link_flags)
    } else {
      toolchain.link_executable(&artifact, objects, &inputs, &link_flags)
    };
    if !ctx.config.dry_run {
      if let Some(parent) = artifact.parent() {
        fsutil::create_dir_all(parent)?;
      }
    }
    queue.run(command, Some(increment_on_complete(bar))).await?;
    Ok(())
  }

  /// Own `hdrs` plus the `hdrs` of every transitive C++ dependency.
  fn header_set(&self, ctx: &Context, deps: &[Arc<Target>]) -> Vec<PathBuf> {
    std::iter::once(self)
      .chain(deps.iter().filter_map(|dep| dep.as_cc()))
      .flat_map(|cc| collect_files(ctx, &cc.hdrs))
      .map(|file| file.fs_path(&ctx.workspace))
      .collect()
  }

  fn compile_flags(&self, deps: &[Arc<Target>]) -> Vec<String> {
    std::iter::once(self)
      .chain(deps.iter().filter_map(|dep| dep.as_cc()))
      .flat_map(|cc| cc.compile_flags.iter().cloned())
      .collect()
  }

  /// Include directories in both their generated and source form, then the roots.
  fn include_dirs(&self, ctx: &Context, deps: &[Arc<Target>]) -> Vec<PathBuf> {
    let workspace = &ctx.workspace;
    let mut dirs: Vec<PathBuf> = std::iter::once(self)
      .chain(deps.iter().filter_map(|dep| dep.as_cc()))
      .flat_map(|cc| cc.includes.iter())
      .flat_map(|dir| [dir.gen_path(workspace), dir.fs_path(workspace)])
      .collect();
    dirs.push(workspace.root().to_path_buf());
    dirs.push(workspace.external_root());
    dirs.push(workspace.gen_dir());
    dirs
  }

  fn link_flags(&self, deps: &[Arc<Target>]) -> Vec<String> {
    if self.is_library() {
      return self.link_flags.clone();
    }
    dedup_first(
      self.link_flags.iter().cloned().chain(
        deps
          .iter()
          .filter_map(|dep| dep.as_cc())
          .flat_map(|cc| cc.link_flags.iter().cloned()),
      ),
    )
  }

  /// Dependency artifacts (last occurrence wins, so foundational libraries come last),
  /// followed by every literal `libs` entry of this target and its dependencies.
  fn link_inputs(&self, ctx: &Context, deps: &[Arc<Target>]) -> Vec<PathBuf> {
    let artifacts = deps
      .iter()
      .filter_map(|dep| dep.as_cc().and_then(|cc| cc.artifact(ctx, dep)))
      .collect();
    let libs = std::iter::once(self)
      .chain(deps.iter().filter_map(|dep| dep.as_cc()))
      .flat_map(|cc| collect_files(ctx, &cc.libs))
      .map(|file| file.fs_path(&ctx.workspace))
      .collect::<Vec<_>>();

    let mut inputs = dedup_last(artifacts);
    inputs.extend(libs);
    inputs
  }

  fn data_files(&self, ctx: &Context, deps: &[Arc<Target>]) -> Vec<FileSpec> {
    let files = std::iter::once(self)
      .chain(deps.iter().filter_map(|dep| dep.as_cc()))
      .flat_map(|cc| collect_files(ctx, &cc.data))
      .collect();
    dedup_last(files)
  }
}

/// Transitive C++ dependencies in link order.
fn cc_dependencies(ctx: &Context, target: &Target) -> Vec<Arc<Target>> {
  all_dependencies(ctx, target.label())
    .iter()
    .filter_map(|label| ctx.target(label))
    .filter(|dep| dep.as_cc().is_some())
    .collect()
}

/// `<output>/<src dir>/_objs/<target name>/<src file>.o`, private to the compiling target.
fn object_path(
  ctx: &Context,
  toolchain: &Toolchain,
  target: &Target,
  src: &FileSpec,
) -> PathBuf {
  ctx
    .workspace
    .output_path(src.dir())
    .join(OBJECT_DIR)
    .join(target.label().name())
    .join(toolchain.object_name(src.file()))
}

fn object_is_current(src: &Path, obj: &Path, newest_header: Option<SystemTime>) -> bool {
  let Some(obj_time) = fsutil::modified(obj) else {
    return false;
  };
  let src_current = fsutil::modified(src).is_some_and(|src_time| src_time <= obj_time);
  let headers_current = newest_header.is_none_or(|header_time| header_time <= obj_time);
  src_current && headers_current
}

fn increment_on_complete(bar: &Arc<ProgressBar>) -> CompletionHook {
  let bar = bar.clone();
  Box::new(move |_, _, _| bar.increment())
}

/// Drops repeated items, keeping the last occurrence.
pub fn dedup_last<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
  let mut seen = HashSet::new();
  let mut kept: Vec<T> = items
    .into_iter()
    .rev()
    .filter(|item| seen.insert(item.clone()))
    .collect();
  kept.reverse();
  kept
}
