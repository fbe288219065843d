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
use crate::config::TestOutput;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Workspace build orchestrator")]
pub struct Cli {
  #[command(flatten)]
  pub options: OptionArgs,

  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Builds the given targets and everything they depend on.
  Build {
    /// Target identifiers, e.g. `//lib:strings`, `:all` or `//...`.
    #[arg(required = true)]
    targets: Vec<String>,
  },

  /// Builds and runs test targets.
  Test {
    #[arg(required = true)]
    targets: Vec<String>,
  },

  /// Builds a binary target and runs it with the remaining arguments.
  Run {
    target: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
  },

  /// Removes the output directory.
  Clean {
    /// Also remove external repository checkouts.
    #[arg(long)]
    clean_external: bool,
  },
}

/// Command-line overrides. Only flags that were given are serialized, so they layer
/// cleanly over the config file and environment.
#[derive(Debug, Default, Args, Serialize)]
pub struct OptionArgs {
  /// Resolve and validate the graph without touching the filesystem.
  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub dry_run: bool,

  /// Root of the build outputs, relative to the workspace root.
  #[arg(long, global = true, value_name = "DIR")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_dir: Option<PathBuf>,

  /// Workspace root; discovered from the current directory when omitted.
  #[arg(long, global = true, value_name = "DIR")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workspace_dir: Option<PathBuf>,

  #[arg(long, global = true, value_name = "NAME")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workspace_filename: Option<String>,

  #[arg(long, global = true, value_name = "NAME")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub build_filename: Option<String>,

  #[arg(long, global = true, value_name = "KEY")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_repo_key: Option<String>,

  /// Pull existing external repository checkouts.
  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub update_external: bool,

  /// Number of concurrent commands (defaults to the CPU count).
  #[arg(long, short = 'j', global = true)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub threads: Option<usize>,

  /// Configuration name selecting an overlay from the workspace manifest.
  #[arg(long = "config", short = 'c', global = true, value_name = "NAME")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub c: Option<String>,

  /// Ignore cached test results.
  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub force_run_tests: bool,

  #[arg(long, global = true, value_name = "N")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub test_runs: Option<u32>,

  #[arg(long, global = true, value_enum)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub test_output: Option<TestOutput>,

  #[arg(long, global = true, value_name = "N")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub test_threads: Option<usize>,

  /// Disable in-process manifest and spec caches.
  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub no_cache: bool,

  #[arg(long, global = true, value_name = "PROGRAM")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc_compiler: Option<String>,

  #[arg(long, global = true, value_name = "PROGRAM")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc_archiver: Option<String>,

  /// Link libraries as static archives (`true`) or shared objects (`false`).
  #[arg(long, global = true, value_name = "BOOL")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cc_static_linking: Option<bool>,

  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub show_log: bool,

  /// Print every command line before running it.
  #[arg(long, global = true)]
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub show_commands: bool,

  #[arg(long, global = true, value_name = "BOOL")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub use_simple_progress: Option<bool>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn run_collects_trailing_arguments() {
    let cli = Cli::parse_from(["lathe", "run", "//app:server", "--", "--port", "80"]);
    match cli.command {
      Commands::Run { target, args } => {
        assert_eq!(target, "//app:server");
        assert_eq!(args, vec!["--port", "80"]);
      }
      other => panic!("unexpected command: {other:?}"),
    }
  }

  #[test]
  fn global_flags_follow_the_subcommand() {
    let cli = Cli::parse_from(["lathe", "build", ":all", "--dry-run", "-c", "release"]);
    assert!(cli.options.dry_run);
    assert_eq!(cli.options.c.as_deref(), Some("release"));
  }

  #[test]
  fn only_given_flags_are_serialized() {
    let cli = Cli::parse_from(["lathe", "test", ":t", "--test-runs", "3"]);
    let value = serde_json::to_value(&cli.options).unwrap();
    assert_eq!(value, serde_json::json!({ "test_runs": 3 }));
  }
}
