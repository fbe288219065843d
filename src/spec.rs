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

//! Resolved identifiers: files, directories and targets.
use crate::label;
use crate::label::Label;
use crate::label::ROOT_DIR;
use crate::target::TargetKind;
use crate::workspace::Workspace;
use std::fmt;
use std::path::PathBuf;

/// Kind string of [`Spec::File`].
pub const FILE_KIND: &str = "file";

/// Kind string of [`Spec::Dir`].
pub const DIR_KIND: &str = "dir";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spec {
  File(FileSpec),
  Dir(DirSpec),
  Target(TargetSpec),
}

impl Spec {
  /// Kind string checked against a field's allowed kinds.
  pub fn kind(&self) -> &'static str {
    match self {
      Spec::File(_) => FILE_KIND,
      Spec::Dir(_) => DIR_KIND,
      Spec::Target(target) => target.kind.as_str(),
    }
  }

  pub fn as_target(&self) -> Option<&TargetSpec> {
    match self {
      Spec::Target(target) => Some(target),
      _ => None,
    }
  }
}

impl fmt::Display for Spec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Spec::File(file) => file.fmt(f),
      Spec::Dir(dir) => dir.fmt(f),
      Spec::Target(target) => target.label.fmt(f),
    }
  }
}

/// A file in the source tree or in the generated-output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileSpec {
  dir: String,
  file: String,
  generated: bool,
}

impl FileSpec {
  pub fn new(dir: impl Into<String>, file: impl Into<String>) -> Self {
    FileSpec {
      dir: dir.into(),
      file: file.into(),
      generated: false,
    }
  }

  /// A file produced under `<output>/gen/<dir>`.
  pub fn generated(dir: impl Into<String>, file: impl Into<String>) -> Self {
    FileSpec {
      generated: true,
      ..FileSpec::new(dir, file)
    }
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn file(&self) -> &str {
    &self.file
  }

  pub fn is_generated(&self) -> bool {
    self.generated
  }

  /// Workspace-relative path, e.g. `lib/a.cc`.
  pub fn path(&self) -> String {
    label::join(&self.dir, &self.file)
  }

  /// Where the file lives on disk.
  pub fn fs_path(&self, workspace: &Workspace) -> PathBuf {
    if self.generated {
      workspace.gen_path(&self.dir).join(&self.file)
    } else {
      workspace.fs_dir(&self.dir).join(&self.file)
    }
  }

  /// Where a copy of the file lands in the output tree.
  pub fn output_path(&self, workspace: &Workspace) -> PathBuf {
    workspace.output_path(&self.dir).join(&self.file)
  }
}

impl fmt::Display for FileSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "//{}", self.path())
  }
}

/// An existing directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirSpec {
  dir: String,
}

impl DirSpec {
  pub fn new(dir: impl Into<String>) -> Self {
    DirSpec { dir: dir.into() }
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn fs_path(&self, workspace: &Workspace) -> PathBuf {
    workspace.fs_dir(&self.dir)
  }

  /// The matching directory of the generated-output tree.
  pub fn gen_path(&self, workspace: &Workspace) -> PathBuf {
    workspace.gen_path(&self.dir)
  }
}

impl fmt::Display for DirSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.dir == ROOT_DIR {
      write!(f, "//")
    } else {
      write!(f, "//{}", self.dir)
    }
  }
}

/// A declared target; the target itself lives in the context's target cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
  pub label: Label,
  pub kind: TargetKind,
}
