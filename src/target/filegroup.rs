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

//! Named groups of files, possibly spanning directories and other groups.
use crate::binder::BoundFields;
use crate::binder::FieldDef;
use crate::binder::FieldType;
use crate::context::Context;
use crate::spec::FileSpec;
use crate::spec::Spec;
use crate::target::collect_files;

/// Kinds a file list may reference.
pub const FILE_KINDS: &[&str] = &["file", "filegroup", "genrule"];

pub const FIELDS: &[FieldDef] = &[FieldDef::new("files", FieldType::Specs(FILE_KINDS))];

/// A named collection of files. Nothing to build.
#[derive(Debug, Default)]
pub struct FileGroup {
  pub files: Vec<Spec>,
}

impl FileGroup {
  pub fn from_fields(bound: &mut BoundFields) -> Self {
    FileGroup {
      files: bound.specs("files"),
    }
  }

  /// Every file reachable through nested groups.
  pub fn all_files(&self, ctx: &Context) -> Vec<FileSpec> {
    collect_files(ctx, &self.files)
  }
}
