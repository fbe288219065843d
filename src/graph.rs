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

//! Whole-graph checks run after binding and before anything executes.
use crate::context::Context;
use crate::error::GraphError;
use crate::label::Label;
use std::collections::HashSet;

/// Fails with [`GraphError::DependencyCycle`] if any target reachable from `roots`
/// depends on itself.
pub fn check_for_cycles(ctx: &Context, roots: &[Label]) -> Result<(), GraphError> {
  let mut walker = CycleWalker {
    ctx,
    path: Vec::new(),
    done: HashSet::new(),
  };
  for root in roots {
    walker.visit(root, 0)?;
  }
  Ok(())
}

struct CycleWalker<'a> {
  ctx: &'a Context,
  /// Ancestors of the label being visited; only `path[..depth]` is live.
  path: Vec<Label>,
  /// Labels whose whole subgraph is known to be acyclic.
  done: HashSet<Label>,
}

impl CycleWalker<'_> {
  fn visit(&mut self, label: &Label, depth: usize) -> Result<(), GraphError> {
    if self.done.contains(label) {
      return Ok(());
    }
    if let Some(start) = self.path[..depth].iter().position(|seen| seen == label) {
      let cycle = self.path[start..depth]
        .iter()
        .chain(std::iter::once(label))
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" --> ");
      return Err(GraphError::DependencyCycle { cycle });
    }

    // Siblings overwrite the slot instead of popping it.
    if depth < self.path.len() {
      self.path[depth] = label.clone();
    } else {
      self.path.push(label.clone());
    }

    if let Some(target) = self.ctx.target(label) {
      for dep in target.dependencies() {
        self.visit(&dep, depth + 1)?;
      }
    }
    self.done.insert(label.clone());
    Ok(())
  }
}

/// Runs every target's static checks over the closure of `labels`.
pub fn validate(ctx: &Context, labels: &[Label]) -> Result<(), GraphError> {
  for label in labels {
    let target = ctx.target(label).ok_or_else(|| GraphError::MissingTarget {
      label: label.to_string(),
    })?;
    target.validate(ctx)?;
  }
  Ok(())
}
