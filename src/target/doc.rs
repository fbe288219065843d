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

//! Documentation targets that run a generator such as doxygen over the workspace.
use crate::binder::BoundFields;
use crate::binder::FieldDef;
use crate::binder::FieldType;
use crate::context::Context;
use crate::error::ExecError;
use crate::fsutil;
use crate::pool::CommandLine;
use crate::pool::WorkQueue;
use crate::progress::ProgressBar;
use crate::target::Target;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_GENERATOR: &str = "doxygen";
pub const DEFAULT_DOXYFILE: &str = "Doxyfile";
/// Subdirectory of the output directory handed to the generator.
pub const DOC_DIR: &str = "doc";

pub const FIELDS: &[FieldDef] = &[
  FieldDef::new("doxyfile", FieldType::Str),
  FieldDef::new("generator", FieldType::Str),
];

/// Runs a documentation generator over the workspace. Never up to date.
#[derive(Debug, Default)]
pub struct DocTarget {
  pub doxyfile: Option<String>,
  pub generator: Option<String>,
}

impl DocTarget {
  pub fn from_fields(bound: &mut BoundFields) -> Self {
    DocTarget {
      doxyfile: bound.string("doxyfile"),
      generator: bound.string("generator"),
    }
  }

  /// The configuration file, relative to the target's directory.
  pub fn doxyfile_path(&self, ctx: &Context, target: &Target) -> PathBuf {
    let file = self.doxyfile.as_deref().unwrap_or(DEFAULT_DOXYFILE);
    ctx.workspace.fs_dir(target.label().dir()).join(file)
  }

  pub fn command(&self, ctx: &Context, target: &Target) -> CommandLine {
    let output_dir = ctx.workspace.output_dir().join(DOC_DIR);
    CommandLine::new(self.generator.as_deref().unwrap_or(DEFAULT_GENERATOR))
      .path_arg(&self.doxyfile_path(ctx, target))
      .env("WORKSPACE_DIR", ctx.workspace.root().display().to_string())
      .env("OUTPUT_DIR", output_dir.display().to_string())
      .current_dir(ctx.workspace.root())
  }

  pub async fn process(
    &self,
    ctx: &Context,
    target: &Target,
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(), ExecError> {
    if !ctx.config.dry_run {
      fsutil::create_dir_all(&ctx.workspace.output_dir().join(DOC_DIR))?;
    }
    queue.run(self.command(ctx, target), None).await?;
    bar.increment();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::Label;
  use crate::label::ROOT_DIR;
  use crate::resolve::resolve_targets;
  use crate::target::TargetBody;
  use crate::testutil::workspace;

  #[test]
  fn generator_runs_from_the_workspace_root() {
    let (_temp, ctx) = workspace(&[(
      "docs/BUILD",
      r#"{ api: { type: "doxygen", doxyfile: "api.doxy" } }"#,
    )]);
    resolve_targets(&ctx, "//docs:api", ROOT_DIR).unwrap();
    let target = ctx.target(&Label::new("docs", "api")).unwrap();
    let TargetBody::Doc(doc) = target.body() else {
      panic!("not a doc target");
    };

    let command = doc.command(&ctx, &target);
    let root = ctx.workspace.root();
    assert_eq!(command.program, DEFAULT_GENERATOR);
    assert_eq!(
      command.args,
      vec![root.join("docs/api.doxy").display().to_string()]
    );
    assert_eq!(command.cwd.as_deref(), Some(root));
    assert!(
      command
        .env
        .contains(&("WORKSPACE_DIR".to_string(), root.display().to_string()))
    );
    assert!(!target.processed(&ctx));
  }
}
