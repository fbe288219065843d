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
use crate::cli::OptionArgs;
use crate::error::ConfigError;
use crate::label;
use crate::label::ROOT_DIR;
use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Json;
use figment::providers::Serialized;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// Optional options file read from the invocation directory.
pub const OPTIONS_FILE: &str = "lathe.json";

/// Prefix of environment variables overriding options.
pub const ENV_PREFIX: &str = "LATHE_";

/// How much raw test output to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestOutput {
  All,
  #[default]
  Errors,
  None,
}

// --- Default Values ---
fn default_output_dir() -> PathBuf {
  PathBuf::from("bin")
}

fn default_compiler() -> String {
  if cfg!(target_os = "windows") {
    "cl.exe".to_string()
  } else {
    "clang++".to_string()
  }
}

/// Every recognized option, before workspace resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
  pub dry_run: bool,
  pub output_dir: PathBuf,
  pub workspace_dir: Option<PathBuf>,
  pub workspace_filename: String,
  pub build_filename: String,
  pub external_repo_key: String,
  pub update_external: bool,
  pub threads: Option<usize>,
  pub c: Option<String>,
  pub force_run_tests: bool,
  pub test_runs: u32,
  pub test_output: TestOutput,
  pub test_threads: Option<usize>,
  pub no_cache: bool,
  pub cc_compiler: Option<String>,
  pub cc_archiver: Option<String>,
  pub cc_static_linking: bool,
  pub show_log: bool,
  pub show_commands: bool,
  pub use_simple_progress: bool,
}

impl Default for Options {
  fn default() -> Self {
    Options {
      dry_run: false,
      output_dir: default_output_dir(),
      workspace_dir: None,
      workspace_filename: "WORKSPACE".to_string(),
      build_filename: "BUILD".to_string(),
      external_repo_key: "external".to_string(),
      update_external: false,
      threads: None,
      c: None,
      force_run_tests: false,
      test_runs: 1,
      test_output: TestOutput::Errors,
      test_threads: None,
      no_cache: false,
      cc_compiler: None,
      cc_archiver: None,
      cc_static_linking: true,
      show_log: false,
      show_commands: false,
      use_simple_progress: true,
    }
  }
}

impl Options {
  /// Layers defaults, `lathe.json`, `LATHE_*` variables and command-line flags.
  pub fn load(args: &OptionArgs) -> Result<Options, ConfigError> {
    let options = Figment::from(Serialized::defaults(Options::default()))
      .merge(Json::file(OPTIONS_FILE))
      .merge(Env::prefixed(ENV_PREFIX))
      .merge(Serialized::defaults(args))
      .extract()?;
    Ok(options)
  }
}

/// Fully validated and resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
  pub dry_run: bool,
  /// Absolute workspace root.
  pub workspace_dir: PathBuf,
  /// Workspace-relative directory relative identifiers are resolved against.
  pub current_dir: String,
  /// Absolute output root, without the configuration suffix.
  pub output_root: PathBuf,
  /// Absolute output directory of this build (`<output_root>[/<configuration>]`).
  pub output_dir: PathBuf,
  pub configuration: Option<String>,
  pub workspace_filename: String,
  pub build_filename: String,
  pub external_repo_key: String,
  pub update_external: bool,
  pub threads: usize,
  pub force_run_tests: bool,
  pub test_runs: u32,
  pub test_output: TestOutput,
  pub test_threads: usize,
  pub no_cache: bool,
  pub cc_compiler: String,
  pub cc_archiver: Option<String>,
  pub cc_static_linking: bool,
  pub show_log: bool,
  pub show_commands: bool,
  pub use_simple_progress: bool,
}

impl Config {
  /// Resolves `options` for an invocation from `invocation_dir`.
  pub fn resolve(options: Options, invocation_dir: &Path) -> Result<Config, ConfigError> {
    let invocation_dir = canonical(invocation_dir);
    let workspace_dir = match &options.workspace_dir {
      Some(dir) => canonical(&invocation_dir.join(dir)),
      None => discover_workspace(&invocation_dir, &options.workspace_filename)?,
    };

    let current_dir = pathdiff::diff_paths(&invocation_dir, &workspace_dir)
      .and_then(|relative| label::from_relative_path(&relative))
      .unwrap_or_else(|| {
        tracing::debug!(
          "{} is outside the workspace, resolving identifiers from the root",
          invocation_dir.display()
        );
        ROOT_DIR.to_string()
      });

    if options.test_runs == 0 {
      return Err(ConfigError::InvalidOption {
        option: "test_runs",
        message: "must be at least 1".to_string(),
      });
    }
    if options.threads == Some(0) {
      return Err(ConfigError::InvalidOption {
        option: "threads",
        message: "must be at least 1".to_string(),
      });
    }
    if let Some(name) = &options.c {
      if name.is_empty() || name.contains(['/', '\\']) {
        return Err(ConfigError::UnknownConfiguration { name: name.clone() });
      }
    }

    let cpus = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1);
    let threads = options.threads.unwrap_or(cpus);
    let test_threads = options.test_threads.unwrap_or(threads).max(1);

    let output_root = workspace_dir.join(&options.output_dir);
    let output_dir = match &options.c {
      Some(name) => output_root.join(name),
      None => output_root.clone(),
    };

    Ok(Config {
      dry_run: options.dry_run,
      workspace_dir,
      current_dir,
      output_root,
      output_dir,
      configuration: options.c,
      workspace_filename: options.workspace_filename,
      build_filename: options.build_filename,
      external_repo_key: options.external_repo_key,
      update_external: options.update_external,
      threads,
      force_run_tests: options.force_run_tests,
      test_runs: options.test_runs,
      test_output: options.test_output,
      test_threads,
      no_cache: options.no_cache,
      cc_compiler: options.cc_compiler.unwrap_or_else(default_compiler),
      cc_archiver: options.cc_archiver,
      cc_static_linking: options.cc_static_linking,
      show_log: options.show_log,
      show_commands: options.show_commands,
      use_simple_progress: options.use_simple_progress,
    })
  }

  /// Whether the `[done/total]` progress lines should be printed.
  pub fn progress_enabled(&self) -> bool {
    self.use_simple_progress && !self.show_log
  }

  /// Absolute path of the workspace manifest.
  pub fn workspace_manifest(&self) -> PathBuf {
    self.workspace_dir.join(&self.workspace_filename)
  }
}

/// Walks from `start` towards the filesystem root looking for `filename`.
pub fn discover_workspace(start: &Path, filename: &str) -> Result<PathBuf, ConfigError> {
  start
    .ancestors()
    .find(|dir| dir.join(filename).is_file())
    .map(Path::to_path_buf)
    .ok_or_else(|| ConfigError::WorkspaceNotFound {
      filename: filename.to_string(),
      start: start.to_path_buf(),
    })
}

fn canonical(path: &Path) -> PathBuf {
  path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
