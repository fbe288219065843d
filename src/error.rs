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
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error enum for the lathe library.
#[derive(Error, Debug)]
pub enum LatheError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Spec(#[from] SpecError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error(transparent)]
  Test(#[from] TestError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<BindError> for LatheError {
  fn from(err: BindError) -> Self {
    LatheError::Spec(err.into())
  }
}

impl From<ManifestError> for LatheError {
  fn from(err: ManifestError) -> Self {
    LatheError::Spec(err.into())
  }
}

/// Errors raised while canonicalizing a raw identifier (src/label.rs).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
  #[error("empty target identifier")]
  Empty,

  #[error("'{raw}' has no target name")]
  MissingName { raw: String },

  #[error("invalid target name '{name}' in '{raw}'")]
  InvalidName { raw: String, name: String },

  #[error("'{raw}' escapes the workspace root")]
  EscapesWorkspace { raw: String },
}

/// Errors raised while reading manifests (src/manifest.rs).
#[derive(Error, Debug)]
pub enum ManifestError {
  #[error("no manifest found at {path}")]
  NotFound { path: PathBuf },

  #[error("failed to read manifest {path}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("manifest {path}: '{key}' must be an object")]
  NotAnObject { path: PathBuf, key: String },

  #[error("invalid external repository '{name}': {message}")]
  InvalidExternal { name: String, message: String },
}

/// Errors raised by the spec factory (src/resolve.rs).
#[derive(Error, Debug)]
pub enum SpecError {
  #[error(transparent)]
  Label(#[from] LabelError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("target '{name}' is not declared in {manifest}")]
  UnknownTarget { name: String, manifest: PathBuf },

  #[error("'{raw}' does not name a file, directory or target")]
  UnparseableSpec { raw: String },

  #[error("invalid glob pattern '{pattern}': {message}")]
  Glob { pattern: String, message: String },

  #[error(transparent)]
  Bind(Box<BindError>),
}

impl From<BindError> for SpecError {
  fn from(err: BindError) -> Self {
    SpecError::Bind(Box::new(err))
  }
}

/// Errors raised while binding manifest fields onto a target (src/binder.rs).
#[derive(Error, Debug)]
pub enum BindError {
  #[error("{label}: missing 'type'")]
  MissingType { label: String },

  #[error("{label}: invalid target type '{kind}'")]
  InvalidKind { label: String, kind: String },

  #[error("{label}: unknown field '{field}'")]
  UnknownField { label: String, field: String },

  #[error("{label}: field '{field}' expected {expected}, found {found}")]
  TypeMismatch {
    label: String,
    field: String,
    expected: String,
    found: String,
  },

  #[error("{label}: failed to resolve field '{field}'")]
  Resolve {
    label: String,
    field: String,
    #[source]
    source: SpecError,
  },
}

/// Errors raised by graph validation (src/graph.rs).
#[derive(Error, Debug)]
pub enum GraphError {
  #[error("dependency cycle detected: {cycle}")]
  DependencyCycle { cycle: String },

  #[error("{label} is not a known target")]
  MissingTarget { label: String },

  #[error("{label}: {message}")]
  Invalid { label: String, message: String },
}

/// Errors raised while executing targets and commands (src/pool.rs, src/builder.rs, src/target).
#[derive(Error, Debug)]
pub enum ExecError {
  #[error("{summary}\n{output}")]
  CommandFailed { summary: String, output: String },

  #[error("failed to spawn '{program}'")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{label}: binary has no srcs and no deps")]
  NoSources { label: String },

  #[error("{label}: required file {file} was not created")]
  MissingGeneratedOutput { label: String, file: PathBuf },

  #[error("failed to {action} {path}")]
  Fs {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to fetch external repository '{name}'")]
  External {
    name: String,
    #[source]
    source: Box<ExecError>,
  },

  #[error("the command queue has shut down")]
  QueueClosed,

  #[error("{label} failed")]
  TargetFailed {
    label: String,
    #[source]
    source: Box<ExecError>,
  },

  #[error("{label}: task aborted: {message}")]
  TaskAborted { label: String, message: String },

  #[error("build stalled with {remaining} target(s) never ready")]
  StalledBuild { remaining: usize },
}

/// Errors related to configuration resolution (src/config.rs).
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("no {filename} found in {start} or any parent directory")]
  WorkspaceNotFound { filename: String, start: PathBuf },

  #[error("unknown configuration '{name}'")]
  UnknownConfiguration { name: String },

  #[error("failed to load options")]
  Options(#[from] Box<figment::Error>),

  #[error("invalid value for {option}: {message}")]
  InvalidOption {
    option: &'static str,
    message: String,
  },

  #[error("failed to read the current directory")]
  CurrentDir(#[source] std::io::Error),
}

impl From<figment::Error> for ConfigError {
  fn from(err: figment::Error) -> Self {
    ConfigError::Options(Box::new(err))
  }
}

/// Errors related to the test runner (src/tester.rs).
#[derive(Error, Debug)]
pub enum TestError {
  #[error("{failed} of {total} test(s) failed")]
  TestsFailed { failed: usize, total: usize },

  #[error("failed to write test result {path}")]
  WriteResult {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Exec(#[from] ExecError),
}
