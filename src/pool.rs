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

//! The command worker pool.
//!
//! A fixed number of workers pull [`CommandSpec`]s from one bounded queue. Every external
//! process of a build is spawned here; producers block in [`WorkQueue::submit`] while the
//! queue is full.
use crate::error::ExecError;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Called once a command has finished with (captured output, success, elapsed time).
pub type CompletionHook = Box<dyn FnOnce(&str, bool, Duration) + Send + 'static>;

/// Program, arguments, environment and working directory of one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
  pub program: String,
  pub args: Vec<String>,
  pub env: Vec<(String, String)>,
  pub cwd: Option<PathBuf>,
  /// Receives stdout and stderr instead of the captured output.
  pub output_file: Option<PathBuf>,
}

impl CommandLine {
  pub fn new(program: impl Into<String>) -> Self {
    CommandLine {
      program: program.into(),
      ..CommandLine::default()
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn path_arg(self, path: &Path) -> Self {
    self.arg(path.to_string_lossy())
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn redirect_output(mut self, file: impl Into<PathBuf>) -> Self {
    self.output_file = Some(file.into());
    self
  }
}

impl fmt::Display for CommandLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) {
        write!(f, " {arg:?}")?;
      } else {
        write!(f, " {arg}")?;
      }
    }
    if let Some(file) = &self.output_file {
      write!(f, " > {}", file.display())?;
    }
    Ok(())
  }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub success: bool,
  pub code: Option<i32>,
  /// Stdout followed by stderr; empty when the output was redirected to a file.
  pub output: String,
  pub duration: Duration,
}

impl CommandOutput {
  fn dry_run() -> Self {
    CommandOutput {
      success: true,
      code: Some(0),
      output: String::new(),
      duration: Duration::ZERO,
    }
  }
}

/// A unit of work on the queue.
pub struct CommandSpec {
  pub command: CommandLine,
  pub result: oneshot::Sender<Result<CommandOutput, ExecError>>,
  pub on_complete: Option<CompletionHook>,
}

/// Execution switches shared by every worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolSettings {
  pub dry_run: bool,
  pub show_commands: bool,
}

/// Producer handle of the work queue.
#[derive(Clone)]
pub struct WorkQueue {
  sender: mpsc::Sender<CommandSpec>,
  settings: PoolSettings,
}

/// A submitted command whose completion has not been awaited yet.
pub struct PendingCommand {
  command: CommandLine,
  receiver: oneshot::Receiver<Result<CommandOutput, ExecError>>,
  show_commands: bool,
}

impl PendingCommand {
  /// Waits for the command; a non-zero exit is an error.
  pub async fn wait(self) -> Result<CommandOutput, ExecError> {
    let command = self.command.clone();
    let show_commands = self.show_commands;
    let output = self.wait_unchecked().await?;
    if output.success {
      return Ok(output);
    }

    let status = match output.code {
      Some(code) => format!("exited with code {code}"),
      None => "was terminated by a signal".to_string(),
    };
    let summary = if show_commands {
      format!("command `{command}` {status}")
    } else {
      format!("{} {status}", command.program)
    };
    Err(ExecError::CommandFailed {
      summary,
      output: output.output,
    })
  }

  /// Waits for the command and returns its output whatever the exit status.
  pub async fn wait_unchecked(self) -> Result<CommandOutput, ExecError> {
    self.receiver.await.map_err(|_| ExecError::QueueClosed)?
  }
}

impl WorkQueue {
  /// Enqueues a command, blocking while every worker is busy and the queue is full.
  pub async fn submit(
    &self,
    command: CommandLine,
    on_complete: Option<CompletionHook>,
  ) -> Result<PendingCommand, ExecError> {
    let (result, receiver) = oneshot::channel();
    let spec = CommandSpec {
      command: command.clone(),
      result,
      on_complete,
    };
    self
      .sender
      .send(spec)
      .await
      .map_err(|_| ExecError::QueueClosed)?;
    Ok(PendingCommand {
      command,
      receiver,
      show_commands: self.settings.show_commands,
    })
  }

  /// Submits a command and waits for it; a non-zero exit is an error.
  pub async fn run(
    &self,
    command: CommandLine,
    on_complete: Option<CompletionHook>,
  ) -> Result<CommandOutput, ExecError> {
    self.submit(command, on_complete).await?.wait().await
  }

  /// Submits a command and returns its output whatever the exit status.
  pub async fn run_unchecked(
    &self,
    command: CommandLine,
    on_complete: Option<CompletionHook>,
  ) -> Result<CommandOutput, ExecError> {
    self.submit(command, on_complete).await?.wait_unchecked().await
  }

  pub fn dry_run(&self) -> bool {
    self.settings.dry_run
  }
}

/// The running workers.
pub struct WorkerPool {
  queue: WorkQueue,
  workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  /// Starts `threads` workers sharing a queue of the same capacity.
  pub fn start(threads: usize, settings: PoolSettings) -> Self {
    let threads = threads.max(1);
    let (sender, receiver) = mpsc::channel(threads);
    let receiver = Arc::new(Mutex::new(receiver));

    let workers = (0..threads)
      .map(|id| {
        let receiver = receiver.clone();
        tokio::spawn(
          worker_loop(receiver, settings).instrument(tracing::debug_span!("worker", id)),
        )
      })
      .collect();

    WorkerPool {
      queue: WorkQueue { sender, settings },
      workers,
    }
  }

  pub fn queue(&self) -> WorkQueue {
    self.queue.clone()
  }

  /// Closes the queue and waits for the workers to drain it.
  ///
  /// Outstanding [`WorkQueue`] clones keep the queue open, so drop them first.
  pub async fn shutdown(self) {
    drop(self.queue);
    for worker in self.workers {
      if let Err(err) = worker.await {
        tracing::warn!("command worker ended abnormally: {err}");
      }
    }
  }
}

async fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<CommandSpec>>>, settings: PoolSettings) {
  loop {
    let next = receiver.lock().await.recv().await;
    let Some(spec) = next else {
      break;
    };

    let CommandSpec {
      command,
      result,
      on_complete,
    } = spec;
    let outcome = execute(&command, settings).await;

    if let Some(hook) = on_complete {
      match &outcome {
        Ok(output) => hook(&output.output, output.success, output.duration),
        Err(err) => hook(&err.to_string(), false, Duration::ZERO),
      }
    }

    // The submitter may have stopped waiting after a failure elsewhere.
    let _ = result.send(outcome);
  }
}

async fn execute(command: &CommandLine, settings: PoolSettings) -> Result<CommandOutput, ExecError> {
  if settings.dry_run {
    tracing::info!("DRY_RUN: {command}");
    return Ok(CommandOutput::dry_run());
  }

  if settings.show_commands {
    tracing::info!("$ {command}");
  } else {
    tracing::debug!("$ {command}");
  }

  let mut process = Command::new(&command.program);
  process
    .args(&command.args)
    .envs(command.env.iter().map(|(k, v)| (k, v)))
    .stdin(Stdio::null());
  if let Some(cwd) = &command.cwd {
    process.current_dir(cwd);
  }

  let spawn_error = |source| ExecError::Spawn {
    program: command.program.clone(),
    source,
  };
  let start = Instant::now();
  if let Some(path) = &command.output_file {
    let create_error = |source| ExecError::Fs {
      action: "create",
      path: path.clone(),
      source,
    };
    let stdout = std::fs::File::create(path).map_err(create_error)?;
    let stderr = stdout.try_clone().map_err(create_error)?;
    let status = process
      .stdout(Stdio::from(stdout))
      .stderr(Stdio::from(stderr))
      .status()
      .await
      .map_err(spawn_error)?;
    return Ok(CommandOutput {
      success: status.success(),
      code: status.code(),
      output: String::new(),
      duration: start.elapsed(),
    });
  }

  let output = process.output().await.map_err(spawn_error)?;
  let duration = start.elapsed();

  let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
  text.push_str(&String::from_utf8_lossy(&output.stderr));

  Ok(CommandOutput {
    success: output.status.success(),
    code: output.status.code(),
    output: text,
    duration,
  })
}
