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

//! Rules that run a command in a scratch directory and publish the files it declares.
use crate::binder::BoundFields;
use crate::binder::FieldDef;
use crate::binder::FieldType;
use crate::context::Context;
use crate::error::ExecError;
use crate::fsutil;
use crate::label;
use crate::label::Label;
use crate::pool::CommandLine;
use crate::pool::WorkQueue;
use crate::progress::ProgressBar;
use crate::spec::FileSpec;
use crate::spec::Spec;
use crate::target::Target;
use crate::target::collect_files;
use crate::target::filegroup::FILE_KINDS;
use std::path::Path;
use std::sync::Arc;

pub const FIELDS: &[FieldDef] = &[
  FieldDef::new("in", FieldType::Specs(FILE_KINDS)),
  FieldDef::new("out", FieldType::Strings),
  FieldDef::new("cmd", FieldType::Strings),
  FieldDef::new("cmd_out", FieldType::Str),
];

#[derive(Debug, Default)]
pub struct Genrule {
  pub inputs: Vec<Spec>,
  pub outs: Vec<String>,
  pub cmd: Vec<String>,
  pub cmd_out: Option<String>,
}

impl Genrule {
  pub fn from_fields(bound: &mut BoundFields) -> Self {
    Genrule {
      inputs: bound.specs("in"),
      outs: bound.strings("out"),
      cmd: bound.strings("cmd"),
      cmd_out: bound.string("cmd_out"),
    }
  }

  /// Declared outputs, located in the generated-output tree of the rule's directory.
  pub fn output_specs(&self, label: &Label) -> Vec<FileSpec> {
    self
      .outs
      .iter()
      .map(|out| FileSpec::generated(label.dir(), out.as_str()))
      .collect()
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.cmd.is_empty() {
      return Err("genrule has no cmd".to_string());
    }
    for out in &self.outs {
      if out.is_empty() || out.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(format!("invalid output name '{out}'"));
      }
    }
    Ok(())
  }

  /// Every declared output exists and is newer than the inputs and manifests.
  pub fn is_up_to_date(&self, ctx: &Context, target: &Target) -> bool {
    let workspace = &ctx.workspace;
    let built = self
      .output_specs(target.label())
      .iter()
      .map(|out| fsutil::modified(&out.fs_path(workspace)))
      .collect::<Option<Vec<_>>>()
      .and_then(|times| times.into_iter().min());
    let Some(built) = built else {
      return false;
    };

    let manifests = [target.manifest_path(), workspace.manifest_path()];
    let inputs = collect_files(ctx, &self.inputs)
      .into_iter()
      .map(|file| file.fs_path(workspace))
      .collect::<Vec<_>>();
    !manifests
      .into_iter()
      .chain(inputs.iter().map(|path| path.as_path()))
      .any(|path| fsutil::is_newer(path, built))
  }

  pub async fn process(
    &self,
    ctx: &Context,
    target: &Target,
    bar: &Arc<ProgressBar>,
    queue: &WorkQueue,
  ) -> Result<(), ExecError> {
    let Some((program, args)) = self.cmd.split_first() else {
      return Err(ExecError::TaskAborted {
        label: target.label().to_string(),
        message: "genrule has no cmd".to_string(),
      });
    };
    if self.is_up_to_date(ctx, target) {
      bar.increment();
      return Ok(());
    }
    let command = CommandLine::new(program.as_str()).args(args.iter().cloned());

    if ctx.config.dry_run {
      queue.run(command, None).await?;
      bar.increment();
      return Ok(());
    }

    let scratch = tempfile::Builder::new()
      .prefix(&format!("lathe_{}_", target.label().name()))
      .tempdir()
      .map_err(|source| ExecError::Fs {
        action: "create scratch directory in",
        path: std::env::temp_dir(),
        source,
      })?;
    self.stage_inputs(ctx, scratch.path())?;

    let mut command = command.current_dir(scratch.path());
    if let Some(cmd_out) = &self.cmd_out {
      let path = scratch.path().join(cmd_out);
      if let Some(parent) = path.parent() {
        fsutil::create_dir_all(parent)?;
      }
      command = command.redirect_output(path);
    }
    queue.run(command, None).await?;
    bar.increment();

    self.publish_outputs(ctx, target, scratch.path())
  }

  /// Links the inputs into `scratch`, keeping their workspace-relative layout.
  fn stage_inputs(&self, ctx: &Context, scratch: &Path) -> Result<(), ExecError> {
    for file in collect_files(ctx, &self.inputs) {
      let dest = label::dir_path(scratch, file.dir()).join(file.file());
      fsutil::link_or_copy(&file.fs_path(&ctx.workspace), &dest)?;
    }
    Ok(())
  }

  fn publish_outputs(&self, ctx: &Context, target: &Target, scratch: &Path) -> Result<(), ExecError> {
    for out in &self.outs {
      let produced = scratch.join(out);
      if !produced.is_file() {
        return Err(ExecError::MissingGeneratedOutput {
          label: target.label().to_string(),
          file: Path::new(out).to_path_buf(),
        });
      }
    }
    for out in self.output_specs(target.label()) {
      let dest = out.fs_path(&ctx.workspace);
      fsutil::remove_file_if_exists(&dest)?;
      fsutil::link_or_copy(&scratch.join(out.file()), &dest)?;
    }
    Ok(())
  }
}
