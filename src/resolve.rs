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

//! The spec factory: raw identifiers to files, directories and bound targets.
//!
//! Variants are tried in order: `glob:` patterns, then files, then directories, then
//! targets. Identifiers that can only name targets (`a:b`, `a/...`) skip straight to
//! target resolution.
use crate::binder;
use crate::context::Context;
use crate::error::SpecError;
use crate::label;
use crate::label::Label;
use crate::label::Pattern;
use crate::label::ROOT_DIR;
use crate::spec::DirSpec;
use crate::spec::FileSpec;
use crate::spec::Spec;
use crate::spec::TargetSpec;
use std::path::Path;
use walkdir::DirEntry;
use walkdir::WalkDir;

/// Prefix marking a glob pattern identifier.
pub const GLOB_PREFIX: &str = "glob:";

/// Resolves any identifier to one or more specs.
pub fn resolve_specs(ctx: &Context, raw: &str, cwd: &str) -> Result<Vec<Spec>, SpecError> {
  if let Some(pattern) = raw.strip_prefix(GLOB_PREFIX) {
    return expand_glob(ctx, pattern, cwd);
  }

  if !label::is_target_only(raw) {
    if let Some(file) = file_spec(ctx, raw, cwd) {
      return Ok(vec![Spec::File(file)]);
    }
    if let Some(dir) = dir_spec(ctx, raw, cwd) {
      return Ok(vec![Spec::Dir(dir)]);
    }
  }

  Ok(
    resolve_targets(ctx, raw, cwd)?
      .into_iter()
      .map(Spec::Target)
      .collect(),
  )
}

/// Resolves an identifier that must name one or more targets.
pub fn resolve_targets(ctx: &Context, raw: &str, cwd: &str) -> Result<Vec<TargetSpec>, SpecError> {
  match Pattern::parse(raw, cwd)? {
    Pattern::Single(label) => Ok(vec![resolve_label(ctx, &label)?]),
    Pattern::AllInDir(dir) => targets_in_dir(ctx, &dir),
    Pattern::Tree(dir) => targets_in_tree(ctx, &dir),
  }
}

/// Resolves an identifier that must name an existing directory.
pub fn resolve_dir(ctx: &Context, raw: &str, cwd: &str) -> Result<DirSpec, SpecError> {
  dir_spec(ctx, raw, cwd).ok_or_else(|| SpecError::UnparseableSpec {
    raw: raw.to_string(),
  })
}

/// Resolves `label` to its target spec, binding the target on first use.
pub fn resolve_label(ctx: &Context, label: &Label) -> Result<TargetSpec, SpecError> {
  let key = label.to_string();
  if let Some(Spec::Target(spec)) = ctx.cached_spec(&key) {
    return Ok(spec);
  }

  if !ctx.dir_exists(label.dir()) {
    return Err(SpecError::UnparseableSpec { raw: key });
  }
  let manifest = ctx.manifest_for_dir(label.dir())?;
  let entry = manifest
    .entry(label.name())?
    .ok_or_else(|| SpecError::UnknownTarget {
      name: label.name().to_string(),
      manifest: manifest.path().to_path_buf(),
    })?;

  let kind = binder::target_kind(label, entry)?;
  let spec = TargetSpec {
    label: label.clone(),
    kind,
  };
  // Cached before binding so that a reference cycle terminates here.
  ctx.cache_spec(key, Spec::Target(spec.clone()));

  if ctx.begin_binding(label) {
    match binder::bind_target(ctx, &spec, entry, manifest.path()) {
      Ok(target) => {
        ctx.finish_binding(target);
      }
      Err(err) => {
        ctx.abandon_binding(label);
        return Err(err.into());
      }
    }
  }

  Ok(spec)
}

fn file_spec(ctx: &Context, raw: &str, cwd: &str) -> Option<FileSpec> {
  let path = label::normalize(cwd, raw)?;
  if path == ROOT_DIR {
    return None;
  }
  let (dir, file) = label::split_file(&path);
  let spec = FileSpec::new(dir, file);
  let key = spec.to_string();
  if let Some(Spec::File(cached)) = ctx.cached_spec(&key) {
    return Some(cached);
  }

  if !spec.fs_path(&ctx.workspace).is_file() {
    return None;
  }
  ctx.cache_spec(key, Spec::File(spec.clone()));
  Some(spec)
}

fn dir_spec(ctx: &Context, raw: &str, cwd: &str) -> Option<DirSpec> {
  let spec = DirSpec::new(label::normalize(cwd, raw)?);
  let key = spec.to_string();
  if let Some(Spec::Dir(cached)) = ctx.cached_spec(&key) {
    return Some(cached);
  }

  if !spec.fs_path(&ctx.workspace).is_dir() {
    return None;
  }
  ctx.cache_spec(key, Spec::Dir(spec.clone()));
  Some(spec)
}

fn expand_glob(ctx: &Context, pattern: &str, cwd: &str) -> Result<Vec<Spec>, SpecError> {
  let base = ctx.workspace.fs_dir(cwd);
  let full = base.join(pattern);
  let paths = glob::glob(&full.to_string_lossy()).map_err(|err| SpecError::Glob {
    pattern: pattern.to_string(),
    message: err.to_string(),
  })?;

  let mut specs = Vec::new();
  for entry in paths {
    let path = match entry {
      Ok(path) => path,
      Err(err) => {
        tracing::warn!("skipping unreadable glob match: {err}");
        continue;
      }
    };
    if !path.is_file() {
      continue;
    }
    let Some(relative) = path
      .strip_prefix(&base)
      .ok()
      .and_then(label::from_relative_path)
    else {
      tracing::warn!("glob match {} is outside {cwd}", path.display());
      continue;
    };
    if let Some(full_path) = label::normalize(cwd, &relative) {
      let (dir, file) = label::split_file(&full_path);
      specs.push(Spec::File(FileSpec::new(dir, file)));
    }
  }
  Ok(specs)
}

/// Every target declared in the manifest of `dir`, ordered by name.
fn targets_in_dir(ctx: &Context, dir: &str) -> Result<Vec<TargetSpec>, SpecError> {
  if !ctx.dir_exists(dir) {
    return Err(SpecError::UnparseableSpec {
      raw: format!("//{dir}:{}", label::ALL_TARGETS),
    });
  }
  let manifest = ctx.manifest_for_dir(dir)?;
  manifest
    .names()
    .map(|name| resolve_label(ctx, &Label::new(dir, name)))
    .collect()
}

/// Every target of every manifest below `dir`.
fn targets_in_tree(ctx: &Context, dir: &str) -> Result<Vec<TargetSpec>, SpecError> {
  let root = ctx.workspace.fs_dir(dir);
  if !root.is_dir() {
    return Err(SpecError::UnparseableSpec {
      raw: format!("//{}", label::join(dir, label::TREE_SUFFIX)),
    });
  }

  let output_root = ctx.config.output_root.clone();
  let walker = WalkDir::new(&root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry, &output_root));

  let mut specs = Vec::new();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(err) => {
        tracing::warn!("skipping unreadable path while scanning {dir}: {err}");
        continue;
      }
    };
    if !entry.file_type().is_file() || entry.file_name() != ctx.config.build_filename.as_str() {
      continue;
    }
    let Some(manifest_dir) = entry
      .path()
      .parent()
      .and_then(|parent| parent.strip_prefix(&root).ok())
      .and_then(label::from_relative_path)
      .and_then(|relative| label::normalize(dir, &relative))
    else {
      continue;
    };
    specs.extend(targets_in_dir(ctx, &manifest_dir)?);
  }
  Ok(specs)
}

fn is_skipped(entry: &DirEntry, output_root: &Path) -> bool {
  let hidden = entry
    .file_name()
    .to_str()
    .is_some_and(|name| name.starts_with('.'));
  hidden || entry.path() == output_root
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::BindError;
  use crate::testutil::workspace;

  #[test]
  fn files_dirs_and_targets_resolve_in_order() {
    let (_temp, ctx) = workspace(&[
      ("BUILD", r#"{ app: { type: "c++/binary", srcs: ["main.cc"] } }"#),
      ("main.cc", ""),
      ("include/x.h", ""),
    ]);

    let specs = resolve_specs(&ctx, "main.cc", ROOT_DIR).unwrap();
    assert_eq!(specs, vec![Spec::File(FileSpec::new(ROOT_DIR, "main.cc"))]);

    let specs = resolve_specs(&ctx, "include", ROOT_DIR).unwrap();
    assert_eq!(specs, vec![Spec::Dir(DirSpec::new("include"))]);

    let specs = resolve_specs(&ctx, ":app", ROOT_DIR).unwrap();
    assert_eq!(specs[0].to_string(), "//:app");
    assert!(ctx.target(&Label::new(ROOT_DIR, "app")).is_some());
  }

  #[test]
  fn relative_files_resolve_against_cwd() {
    let (_temp, ctx) = workspace(&[("lib/src/a.cc", "")]);
    let specs = resolve_specs(&ctx, "src/a.cc", "lib").unwrap();
    assert_eq!(specs, vec![Spec::File(FileSpec::new("lib/src", "a.cc"))]);
  }

  #[test]
  fn glob_expands_to_sorted_files() {
    let (_temp, ctx) = workspace(&[
      ("lib/b.cc", ""),
      ("lib/a.cc", ""),
      ("lib/a.h", ""),
      ("lib/sub/c.cc", ""),
    ]);
    let specs = resolve_specs(&ctx, "glob:**/*.cc", "lib").unwrap();
    let names: Vec<String> = specs.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["//lib/a.cc", "//lib/b.cc", "//lib/sub/c.cc"]);
  }

  #[test]
  fn all_and_tree_expansion() {
    let (_temp, ctx) = workspace(&[
      ("lib/BUILD", r#"{ lib: { type: "filegroup" }, extra: { type: "filegroup" } }"#),
      ("lib2/BUILD", r#"{ lib2: { type: "filegroup" } }"#),
      (".hidden/BUILD", r#"{ nope: { type: "filegroup" } }"#),
      ("bin/BUILD", r#"{ nope: { type: "filegroup" } }"#),
    ]);

    let all = resolve_targets(&ctx, "//lib:all", ROOT_DIR).unwrap();
    let labels: Vec<String> = all.iter().map(|spec| spec.label.to_string()).collect();
    assert_eq!(labels, vec!["//lib:extra", "//lib:lib"]);

    let tree = resolve_targets(&ctx, "//...", ROOT_DIR).unwrap();
    let labels: Vec<String> = tree.iter().map(|spec| spec.label.to_string()).collect();
    assert_eq!(labels, vec!["//lib:extra", "//lib:lib", "//lib2:lib2"]);
  }

  #[test]
  fn resolution_failures() {
    let (_temp, ctx) = workspace(&[
      ("BUILD", r#"{ a: { type: "filegroup" }, bad: { type: "c++/shared" } }"#),
      ("empty/readme.txt", ""),
    ]);

    assert!(matches!(
      resolve_targets(&ctx, ":missing", ROOT_DIR),
      Err(SpecError::UnknownTarget { .. })
    ));
    assert!(matches!(
      resolve_targets(&ctx, "//empty:x", ROOT_DIR),
      Err(SpecError::Manifest(_))
    ));
    assert!(matches!(
      resolve_specs(&ctx, "nowhere.cc", ROOT_DIR),
      Err(SpecError::UnparseableSpec { .. })
    ));
    match resolve_targets(&ctx, ":bad", ROOT_DIR) {
      Err(SpecError::Bind(err)) => assert!(matches!(*err, BindError::InvalidKind { .. })),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn targets_are_bound_once() {
    let (_temp, ctx) = workspace(&[(
      "BUILD",
      r#"{
        a: { type: "filegroup", files: [":b"] },
        b: { type: "filegroup", files: [":a"] },
      }"#,
    )]);
    resolve_targets(&ctx, ":a", ROOT_DIR).unwrap();
    resolve_targets(&ctx, ":b", ROOT_DIR).unwrap();
    let first = ctx.target(&Label::new(ROOT_DIR, "a")).unwrap();
    resolve_targets(&ctx, ":a", ROOT_DIR).unwrap();
    let second = ctx.target(&Label::new(ROOT_DIR, "a")).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(ctx.target_count(), 2);
  }
}
