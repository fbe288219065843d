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
use Commands::Build;
use Commands::Clean;
use Commands::Run;
use Commands::Test;
use anyhow::Result;
use clap::Parser;
use lathe::cli::Cli;
use lathe::cli::Commands;
use lathe::commands;
use lathe::config::Config;
use lathe::config::Options;
use lathe::error::ConfigError;
use lathe::logging::setup_tracing;
use lathe::workspace::Workspace;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<()> {
  let Cli { options, command } = Cli::parse();
  let options = Options::load(&options)?;
  let _guard = setup_tracing(options.show_log)?;

  let invocation_dir = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
  let main_span = tracing::info_span!("lathe");

  async move {
    match command {
      Clean { clean_external } => {
        let config = Config::resolve(options, &invocation_dir)?;
        let workspace = Workspace::load(&config)?;
        commands::clean(&config, &workspace, clean_external)?;
      }
      Build { targets } => {
        let ctx = commands::open_workspace(options, &invocation_dir).await?;
        commands::build(&ctx, &targets).await?;
        tracing::info!("Build complete.");
      }
      Test { targets } => {
        let ctx = commands::open_workspace(options, &invocation_dir).await?;
        let summary = commands::test(&ctx, &targets).await?;
        tracing::info!("{} test(s) passed.", summary.passed);
      }
      Run { target, args } => {
        let ctx = commands::open_workspace(options, &invocation_dir).await?;
        commands::run(&ctx, &target, &args).await?;
      }
    }
    Ok::<(), anyhow::Error>(())
  }
  .instrument(main_span)
  .await
}
