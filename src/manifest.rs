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

//! Loading of per-directory manifests.
//!
//! Manifests are written in JSON5 (comments, unquoted keys and trailing commas are fine)
//! and map target names to objects carrying a `type` key.
use crate::error::ManifestError;
use serde_json::Map;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

/// A single target definition (or any other JSON object).
pub type Entry = Map<String, Value>;

/// A parsed manifest file.
#[derive(Debug, Clone)]
pub struct Manifest {
  path: PathBuf,
  entries: Entry,
}

impl Manifest {
  /// Reads and parses the manifest at `path`.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        return Err(ManifestError::NotFound {
          path: path.to_path_buf(),
        });
      }
      Err(source) => {
        return Err(ManifestError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    Self::parse(path, &content)
  }

  /// Parses manifest text; `path` is only used for diagnostics.
  pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
    if content.trim().is_empty() {
      return Ok(Self::from_entries(path, Entry::new()));
    }

    let value: Value = json5::from_str(content).map_err(|err| ManifestError::Parse {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;

    match value {
      Value::Object(entries) => Ok(Self::from_entries(path, entries)),
      _ => Err(ManifestError::NotAnObject {
        path: path.to_path_buf(),
        key: "<top level>".to_string(),
      }),
    }
  }

  /// Wraps an already parsed object, e.g. an inline external build definition.
  pub fn from_entries(path: &Path, entries: Entry) -> Self {
    Manifest {
      path: path.to_path_buf(),
      entries,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn entries(&self) -> &Entry {
    &self.entries
  }

  /// Names of all declared entries, in file order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  /// Looks up an entry that must be an object.
  pub fn entry(&self, name: &str) -> Result<Option<&Entry>, ManifestError> {
    match self.entries.get(name) {
      None => Ok(None),
      Some(Value::Object(entry)) => Ok(Some(entry)),
      Some(_) => Err(ManifestError::NotAnObject {
        path: self.path.clone(),
        key: name.to_string(),
      }),
    }
  }
}

/// Memoizes parsed manifests by path.
#[derive(Debug)]
pub struct ManifestCache {
  enabled: bool,
  entries: Mutex<HashMap<PathBuf, Arc<Manifest>>>,
}

impl ManifestCache {
  pub fn new(enabled: bool) -> Self {
    ManifestCache {
      enabled,
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Returns the cached manifest for `path`, loading it on first use.
  pub fn get_or_load(&self, path: &Path) -> Result<Arc<Manifest>, ManifestError> {
    if !self.enabled {
      return Manifest::load(path).map(Arc::new);
    }

    if let Some(manifest) = self.lock().get(path) {
      return Ok(manifest.clone());
    }

    // Parse outside the lock; a concurrent loader of the same file keeps the first insert.
    let manifest = Arc::new(Manifest::load(path)?);
    Ok(
      self
        .lock()
        .entry(path.to_path_buf())
        .or_insert(manifest)
        .clone(),
    )
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<Manifest>>> {
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// Returns a short description of a JSON value's shape for diagnostics.
pub fn describe(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "a list",
    Value::Object(_) => "an object",
  }
}
