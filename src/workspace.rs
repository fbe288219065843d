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

//! The workspace root, its manifest, and the mapping from canonical directories to
//! filesystem paths.
use crate::config::Config;
use crate::error::ConfigError;
use crate::error::LatheError;
use crate::error::ManifestError;
use crate::label;
use crate::manifest::Entry;
use crate::manifest::Manifest;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// Directory (under the workspace root) holding external checkouts by default.
pub const EXTERNAL_DIR: &str = ".external";

/// Name of the generated-output tree under the output directory.
pub const GEN_DIR: &str = "gen";

/// Operating-system tag used for overlay keys.
pub fn os_tag() -> &'static str {
  match std::env::consts::OS {
    "macos" => "darwin",
    other => other,
  }
}

/// The OS tags recognized as overlay keys in target entries.
pub const OS_TAGS: [&str; 3] = ["linux", "windows", "darwin"];

fn default_repo_type() -> String {
  "git".to_string()
}

fn default_branch() -> String {
  "master".to_string()
}

/// An external repository as declared in the workspace manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalRepoDef {
  #[serde(rename = "type", default = "default_repo_type")]
  pub kind: String,
  pub url: String,
  #[serde(default = "default_branch")]
  pub branch: String,
  #[serde(default)]
  pub build: Option<BuildSource>,
  #[serde(default)]
  pub dir: Option<String>,
  #[serde(default)]
  pub patch: Option<String>,
}

/// Manifest used for an external checkout that has none of its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildSource {
  /// Workspace-relative path of a manifest file.
  Path(String),
  /// Manifest written inline in the workspace manifest.
  Inline(Entry),
}

/// A resolved external repository.
#[derive(Debug, Clone)]
pub struct ExternalRepo {
  pub name: String,
  /// Canonical directory labels use to refer into the repository.
  pub dir: String,
  /// Absolute checkout directory.
  pub checkout: PathBuf,
  pub def: ExternalRepoDef,
}

/// Where to find a manifest for a directory without an in-tree one.
#[derive(Debug, Clone)]
pub enum ManifestFallback {
  File(PathBuf),
  Inline(Arc<Manifest>),
}

#[derive(Debug)]
pub struct Workspace {
  root: PathBuf,
  manifest_path: PathBuf,
  output_dir: PathBuf,
  externals: Vec<ExternalRepo>,
  default_overlay: Option<Entry>,
  config_overlay: Option<Entry>,
}

impl Workspace {
  /// Reads the workspace manifest selected by `config`.
  pub fn load(config: &Config) -> Result<Self, LatheError> {
    let manifest_path = config.workspace_manifest();
    let manifest = Manifest::load(&manifest_path)?;
    Self::from_manifest(config, manifest)
  }

  pub fn from_manifest(config: &Config, manifest: Manifest) -> Result<Self, LatheError> {
    let root = config.workspace_dir.clone();
    let externals = parse_externals(&root, &manifest, &config.external_repo_key)?;

    let os_overlay = object_at(&manifest, manifest.entries().get(os_tag()), os_tag())?;
    let config_overlay = match &config.configuration {
      None => None,
      Some(name) => {
        let value = os_overlay.as_ref().and_then(|overlay| overlay.get(name));
        match object_at(&manifest, value, name)? {
          Some(overlay) => Some(overlay),
          None => return Err(ConfigError::UnknownConfiguration { name: name.clone() }.into()),
        }
      }
    };

    Ok(Workspace {
      root,
      manifest_path: manifest.path().to_path_buf(),
      output_dir: config.output_dir.clone(),
      externals,
      default_overlay: os_overlay,
      config_overlay,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn manifest_path(&self) -> &Path {
    &self.manifest_path
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  pub fn externals(&self) -> &[ExternalRepo] {
    &self.externals
  }

  /// Root of the generated-output tree.
  pub fn gen_dir(&self) -> PathBuf {
    self.output_dir.join(GEN_DIR)
  }

  /// Root of the external checkouts.
  pub fn external_root(&self) -> PathBuf {
    self.root.join(EXTERNAL_DIR)
  }

  /// Per-OS workspace-default overlay.
  pub fn default_overlay(&self) -> Option<&Entry> {
    self.default_overlay.as_ref()
  }

  /// Overlay of the selected configuration.
  pub fn config_overlay(&self) -> Option<&Entry> {
    self.config_overlay.as_ref()
  }

  /// The external repository owning `dir`, if any.
  pub fn external_for(&self, dir: &str) -> Option<&ExternalRepo> {
    self
      .externals
      .iter()
      .find(|repo| label::is_within(dir, &repo.dir))
  }

  /// Filesystem path of a canonical source directory.
  pub fn fs_dir(&self, dir: &str) -> PathBuf {
    match self.external_for(dir) {
      Some(repo) => {
        let rest = dir[repo.dir.len()..].trim_start_matches('/');
        label::dir_path(&repo.checkout, rest)
      }
      None => label::dir_path(&self.root, dir),
    }
  }

  /// Output directory of a canonical directory.
  pub fn output_path(&self, dir: &str) -> PathBuf {
    label::dir_path(&self.output_dir, dir)
  }

  /// Generated-output directory of a canonical directory.
  pub fn gen_path(&self, dir: &str) -> PathBuf {
    label::dir_path(&self.gen_dir(), dir)
  }

  /// Manifest to use for an external repository root without an in-tree manifest.
  pub fn manifest_fallback(&self, dir: &str) -> Option<ManifestFallback> {
    let repo = self.externals.iter().find(|repo| repo.dir == dir)?;
    match repo.def.build.as_ref()? {
      BuildSource::Path(path) => Some(ManifestFallback::File(label::dir_path(&self.root, path))),
      BuildSource::Inline(entries) => {
        let path = self.manifest_path.clone();
        Some(ManifestFallback::Inline(Arc::new(Manifest::from_entries(
          &path,
          entries.clone(),
        ))))
      }
    }
  }
}

fn object_at(
  manifest: &Manifest,
  value: Option<&Value>,
  key: &str,
) -> Result<Option<Entry>, ManifestError> {
  match value {
    None => Ok(None),
    Some(Value::Object(entry)) => Ok(Some(entry.clone())),
    Some(_) => Err(ManifestError::NotAnObject {
      path: manifest.path().to_path_buf(),
      key: key.to_string(),
    }),
  }
}

fn parse_externals(
  root: &Path,
  manifest: &Manifest,
  key: &str,
) -> Result<Vec<ExternalRepo>, ManifestError> {
  let Some(defs) = object_at(manifest, manifest.entries().get(key), key)? else {
    return Ok(Vec::new());
  };

  let mut externals = Vec::new();
  for (name, value) in defs {
    let invalid = |message: String| ManifestError::InvalidExternal {
      name: name.clone(),
      message,
    };

    let def: ExternalRepoDef =
      serde_json::from_value(value).map_err(|err| invalid(err.to_string()))?;
    if def.kind != "git" {
      return Err(invalid(format!("unsupported type '{}'", def.kind)));
    }

    let dir = label::normalize(label::ROOT_DIR, &name)
      .filter(|dir| dir != label::ROOT_DIR)
      .ok_or_else(|| invalid("name must be a workspace-relative path".to_string()))?;
    let checkout = match &def.dir {
      Some(custom) => label::dir_path(root, custom),
      None => label::dir_path(&root.join(EXTERNAL_DIR), &dir),
    };

    externals.push(ExternalRepo {
      name,
      dir,
      checkout,
      def,
    });
  }

  // Most specific directory first.
  externals.sort_by(|a, b| b.dir.len().cmp(&a.dir.len()));
  Ok(externals)
}
