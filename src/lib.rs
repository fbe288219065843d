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

//! # Lathe
//!
//! `lathe` is a workspace build orchestrator. Targets are declared in per-directory
//! `BUILD` manifests, resolved into a dependency graph across the workspace, and
//! built incrementally by a bounded pool of command workers.
//!
//! This crate contains the library behind the `lathe` CLI.
//!
//! ## Core Modules
//!
//! * [`label`], [`resolve`]: Parse identifiers such as `//lib:strings`, `:all`, `//...`
//!   or `glob:**/*.h` and turn them into file, directory or target specs.
//! * [`manifest`], [`workspace`]: Load `BUILD` and `WORKSPACE` manifests, overlays and
//!   external repository definitions.
//! * [`binder`]: Merges overlays into a target entry and binds its fields.
//! * [`target`]: The target kinds (`c++/*`, `filegroup`, `genrule`, `doxygen`) and their
//!   staleness checks and processing.
//! * [`graph`], [`builder`]: Cycle detection, validation and the build driver.
//! * [`pool`]: The command worker pool every external process goes through.
//! * [`tester`]: Runs test binaries and caches their results.
//! * [`commands`]: The `build`, `test`, `run` and `clean` commands.
//! * [`cli`], [`config`]: The `clap` interface and layered options.
//! * [`error`], [`logging`]: Error types and the `setup_tracing` utility.

pub mod binder;
pub mod builder;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod fsutil;
pub mod graph;
pub mod label;
pub mod logging;
pub mod manifest;
pub mod pool;
pub mod progress;
pub mod resolve;
pub mod spec;
pub mod target;
pub mod tester;
pub mod workspace;

#[cfg(test)]
mod testutil;
