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

//! Canonical target labels and the identifier grammar.
//!
//! Directories are workspace-relative, forward-slash separated, and `.` for the root.
use crate::error::LabelError;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

/// Directory string used for the workspace root.
pub const ROOT_DIR: &str = ".";

/// Pseudo-name that expands to every target of a directory.
pub const ALL_TARGETS: &str = "all";

/// Suffix that expands to every target below a directory.
pub const TREE_SUFFIX: &str = "...";

/// A canonical target name: `//<dir>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
  dir: String,
  name: String,
}

impl Label {
  /// Builds a label from an already canonical directory.
  pub fn new(dir: impl Into<String>, name: impl Into<String>) -> Self {
    Label {
      dir: dir.into(),
      name: name.into(),
    }
  }

  /// Parses a single-target identifier relative to `cwd`.
  pub fn parse(raw: &str, cwd: &str) -> Result<Label, LabelError> {
    match Pattern::parse(raw, cwd)? {
      Pattern::Single(label) => Ok(label),
      Pattern::AllInDir(_) | Pattern::Tree(_) => Err(LabelError::InvalidName {
        raw: raw.to_string(),
        name: ALL_TARGETS.to_string(),
      }),
    }
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.dir == ROOT_DIR {
      write!(f, "//:{}", self.name)
    } else {
      write!(f, "//{}:{}", self.dir, self.name)
    }
  }
}

/// What an identifier expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
  /// Exactly one target.
  Single(Label),
  /// `dir:all`: every target declared in the manifest of `dir`.
  AllInDir(String),
  /// `dir/...`: every target in every manifest under `dir`.
  Tree(String),
}

impl Pattern {
  /// Canonicalizes `raw` against the workspace-relative directory `cwd`.
  ///
  /// ```
  /// use lathe::label::Label;
  /// use lathe::label::Pattern;
  ///
  /// let pattern = Pattern::parse(":lib", "src/core").unwrap();
  /// assert_eq!(pattern, Pattern::Single(Label::new("src/core", "lib")));
  /// ```
  pub fn parse(raw: &str, cwd: &str) -> Result<Pattern, LabelError> {
    let raw_trimmed = raw.trim();
    if raw_trimmed.is_empty() {
      return Err(LabelError::Empty);
    }

    let (dir_part, name) = match raw_trimmed.split_once(':') {
      Some((dir_part, name)) => (dir_part, Some(name)),
      None => (raw_trimmed, None),
    };

    if let Some(base) = dir_part.strip_suffix(TREE_SUFFIX) {
      if name.is_some() {
        return Err(LabelError::InvalidName {
          raw: raw.to_string(),
          name: name.unwrap_or_default().to_string(),
        });
      }
      return Ok(Pattern::Tree(resolve_dir(cwd, base, raw)?));
    }

    let dir = resolve_dir(cwd, dir_part, raw)?;
    let name = match name {
      Some(name) => name.to_string(),
      None => {
        let last = dir_part
          .trim_start_matches('/')
          .rsplit('/')
          .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..");
        match last {
          Some(last) => last.to_string(),
          None => {
            return Err(LabelError::MissingName {
              raw: raw.to_string(),
            });
          }
        }
      }
    };

    if name == ALL_TARGETS {
      return Ok(Pattern::AllInDir(dir));
    }
    if !is_valid_name(&name) {
      return Err(LabelError::InvalidName {
        raw: raw.to_string(),
        name,
      });
    }
    Ok(Pattern::Single(Label { dir, name }))
  }
}

/// True when an identifier can only denote targets.
pub fn is_target_only(raw: &str) -> bool {
  raw.contains(':') || raw.trim_end().ends_with(TREE_SUFFIX)
}

fn is_valid_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '@'))
}

fn resolve_dir(cwd: &str, dir_part: &str, raw: &str) -> Result<String, LabelError> {
  normalize(cwd, dir_part).ok_or_else(|| LabelError::EscapesWorkspace {
    raw: raw.to_string(),
  })
}

/// Joins `path` onto `cwd` (or onto the root when `path` starts with `//`) and folds
/// `.` and `..` segments. Returns `None` when the result leaves the workspace.
pub fn normalize(cwd: &str, path: &str) -> Option<String> {
  let mut segments: Vec<&str> = Vec::new();
  let relative = match path.strip_prefix("//") {
    Some(absolute) => absolute,
    None => {
      segments.extend(split_segments(cwd));
      path
    }
  };

  for segment in relative.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop()?;
      }
      other => segments.push(other),
    }
  }

  if segments.is_empty() {
    Some(ROOT_DIR.to_string())
  } else {
    Some(segments.join("/"))
  }
}

fn split_segments(dir: &str) -> impl Iterator<Item = &str> {
  dir
    .split('/')
    .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Joins a canonical directory with a name, keeping the root as `.`.
pub fn join(dir: &str, name: &str) -> String {
  if dir == ROOT_DIR {
    name.to_string()
  } else {
    format!("{dir}/{name}")
  }
}

/// Splits a canonical path into its directory and final segment.
pub fn split_file(path: &str) -> (String, String) {
  match path.rsplit_once('/') {
    Some((dir, file)) => (dir.to_string(), file.to_string()),
    None => (ROOT_DIR.to_string(), path.to_string()),
  }
}

/// Maps a canonical directory onto a filesystem path under `base`.
pub fn dir_path(base: &Path, dir: &str) -> PathBuf {
  let mut path = base.to_path_buf();
  path.extend(split_segments(dir));
  path
}

/// Converts a relative filesystem path into a canonical directory string.
pub fn from_relative_path(path: &Path) -> Option<String> {
  let mut segments = Vec::new();
  for component in path.components() {
    match component {
      std::path::Component::Normal(segment) => segments.push(segment.to_str()?.to_string()),
      std::path::Component::CurDir => {}
      _ => return None,
    }
  }
  if segments.is_empty() {
    Some(ROOT_DIR.to_string())
  } else {
    Some(segments.join("/"))
  }
}

/// True when `dir` equals `ancestor` or lies below it.
pub fn is_within(dir: &str, ancestor: &str) -> bool {
  ancestor == ROOT_DIR
    || dir == ancestor
    || dir
      .strip_prefix(ancestor)
      .is_some_and(|rest| rest.starts_with('/'))
}
