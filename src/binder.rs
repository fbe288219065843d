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

//! Binding of manifest entries onto target fields.
//!
//! Each target kind lists its fields as [`FieldDef`]s. Binding first merges the base
//! entry with its overlays (current OS, workspace default, configuration) into one
//! entry, then resolves every field by its declared type.
use crate::context::Context;
use crate::error::BindError;
use crate::label::Label;
use crate::manifest;
use crate::manifest::Entry;
use crate::resolve;
use crate::spec::DirSpec;
use crate::spec::Spec;
use crate::spec::TargetSpec;
use crate::target::Target;
use crate::target::TargetBody;
use crate::target::TargetKind;
use crate::workspace;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Key carrying the target kind.
pub const TYPE_KEY: &str = "type";

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
  /// Files, directories or targets whose kind is in the allowed set.
  Specs(&'static [&'static str]),
  /// Existing directories.
  Dirs,
  /// Targets whose kind is in the allowed set.
  Targets(&'static [&'static str]),
  /// Strings copied verbatim.
  Strings,
  /// One string.
  Str,
}

impl FieldType {
  fn is_sequence(self) -> bool {
    !matches!(self, FieldType::Str)
  }
}

/// A declared field of a target kind.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub ty: FieldType,
}

impl FieldDef {
  pub const fn new(name: &'static str, ty: FieldType) -> Self {
    FieldDef {
      name,
      aliases: &[],
      ty,
    }
  }

  pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
    self.aliases = aliases;
    self
  }
}

/// A resolved field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
  Specs(Vec<Spec>),
  Dirs(Vec<DirSpec>),
  Strings(Vec<String>),
  Str(String),
}

/// Field values of one target, taken out by the kind's constructor.
#[derive(Debug, Default)]
pub struct BoundFields {
  values: HashMap<&'static str, FieldValue>,
}

impl BoundFields {
  pub fn specs(&mut self, name: &str) -> Vec<Spec> {
    match self.values.remove(name) {
      Some(FieldValue::Specs(specs)) => specs,
      _ => Vec::new(),
    }
  }

  pub fn dirs(&mut self, name: &str) -> Vec<DirSpec> {
    match self.values.remove(name) {
      Some(FieldValue::Dirs(dirs)) => dirs,
      _ => Vec::new(),
    }
  }

  pub fn strings(&mut self, name: &str) -> Vec<String> {
    match self.values.remove(name) {
      Some(FieldValue::Strings(strings)) => strings,
      _ => Vec::new(),
    }
  }

  pub fn string(&mut self, name: &str) -> Option<String> {
    match self.values.remove(name) {
      Some(FieldValue::Str(value)) => Some(value),
      _ => None,
    }
  }
}

/// Reads the kind discriminator of an entry.
pub fn target_kind(label: &Label, entry: &Entry) -> Result<TargetKind, BindError> {
  let value = entry.get(TYPE_KEY).ok_or_else(|| BindError::MissingType {
    label: label.to_string(),
  })?;
  let kind = value
    .as_str()
    .ok_or_else(|| mismatch(label, TYPE_KEY, "a string", value))?;
  kind.parse().map_err(|_| BindError::InvalidKind {
    label: label.to_string(),
    kind: kind.to_string(),
  })
}

/// Builds the target declared by `entry`.
pub fn bind_target(
  ctx: &Context,
  spec: &TargetSpec,
  entry: &Entry,
  manifest_path: &Path,
) -> Result<Target, BindError> {
  let label = &spec.label;
  let fields = spec.kind.fields();

  let mut overlays: Vec<&Entry> = Vec::new();
  match entry.get(workspace::os_tag()) {
    None => {}
    Some(Value::Object(overlay)) => overlays.push(overlay),
    Some(other) => return Err(mismatch(label, workspace::os_tag(), "an object", other)),
  }
  overlays.extend(ctx.workspace.default_overlay());
  overlays.extend(ctx.workspace.config_overlay());

  // Manifests of external repositories are third-party; tolerate fields we don't know.
  let strict = ctx.workspace.external_for(label.dir()).is_none();
  let merged = merge_entry(label, entry, &overlays, fields, strict)?;
  let mut bound = bind_fields(ctx, label, &merged, fields)?;

  tracing::debug!("bound {label} ({})", spec.kind);
  Ok(Target::new(
    label.clone(),
    manifest_path.to_path_buf(),
    TargetBody::from_fields(spec.kind, &mut bound),
  ))
}

/// Merges `overlays` into `base`: sequences append, scalars overwrite.
///
/// Keys are normalized to the canonical field name. Unknown keys in overlays are
/// ignored; unknown keys in the base entry are an error when `strict`.
pub fn merge_entry(
  label: &Label,
  base: &Entry,
  overlays: &[&Entry],
  fields: &[FieldDef],
  strict: bool,
) -> Result<Entry, BindError> {
  let mut merged = Entry::new();

  for (key, value) in base {
    if key == TYPE_KEY || workspace::OS_TAGS.contains(&key.as_str()) {
      continue;
    }
    match lookup(fields, key) {
      Some(def) => merge_value(label, &mut merged, def, value)?,
      None if strict => {
        return Err(BindError::UnknownField {
          label: label.to_string(),
          field: key.clone(),
        });
      }
      None => tracing::debug!("{label}: ignoring unknown field '{key}'"),
    }
  }

  for overlay in overlays {
    for (key, value) in overlay.iter() {
      if let Some(def) = lookup(fields, key) {
        merge_value(label, &mut merged, def, value)?;
      }
    }
  }

  Ok(merged)
}

fn merge_value(
  label: &Label,
  merged: &mut Entry,
  def: &FieldDef,
  value: &Value,
) -> Result<(), BindError> {
  if !def.ty.is_sequence() {
    if !value.is_string() {
      return Err(mismatch(label, def.name, "a string", value));
    }
    merged.insert(def.name.to_string(), value.clone());
    return Ok(());
  }

  let items = value
    .as_array()
    .filter(|items| items.iter().all(Value::is_string))
    .ok_or_else(|| mismatch(label, def.name, "a list of strings", value))?;
  let slot = merged
    .entry(def.name)
    .or_insert_with(|| Value::Array(Vec::new()));
  if let Value::Array(existing) = slot {
    existing.extend(items.iter().cloned());
  }
  Ok(())
}

fn bind_fields(
  ctx: &Context,
  label: &Label,
  merged: &Entry,
  fields: &[FieldDef],
) -> Result<BoundFields, BindError> {
  let mut bound = BoundFields::default();
  let cwd = label.dir();

  for def in fields {
    let Some(value) = merged.get(def.name) else {
      continue;
    };
    let failed = |source| BindError::Resolve {
      label: label.to_string(),
      field: def.name.to_string(),
      source,
    };

    let field_value = match def.ty {
      FieldType::Str => FieldValue::Str(value.as_str().unwrap_or_default().to_string()),
      FieldType::Strings => FieldValue::Strings(strings(value).map(str::to_string).collect()),
      FieldType::Specs(allowed) => {
        let mut specs = Vec::new();
        for raw in strings(value) {
          for spec in resolve::resolve_specs(ctx, raw, cwd).map_err(failed)? {
            check_kind(label, def.name, allowed, &spec)?;
            specs.push(spec);
          }
        }
        FieldValue::Specs(specs)
      }
      FieldType::Targets(allowed) => {
        let mut specs = Vec::new();
        for raw in strings(value) {
          for target in resolve::resolve_targets(ctx, raw, cwd).map_err(failed)? {
            let spec = Spec::Target(target);
            check_kind(label, def.name, allowed, &spec)?;
            specs.push(spec);
          }
        }
        FieldValue::Specs(specs)
      }
      FieldType::Dirs => {
        let mut dirs = Vec::new();
        for raw in strings(value) {
          dirs.push(resolve::resolve_dir(ctx, raw, cwd).map_err(failed)?);
        }
        FieldValue::Dirs(dirs)
      }
    };
    bound.values.insert(def.name, field_value);
  }

  Ok(bound)
}

fn check_kind(
  label: &Label,
  field: &str,
  allowed: &[&str],
  spec: &Spec,
) -> Result<(), BindError> {
  if allowed.contains(&spec.kind()) {
    return Ok(());
  }
  Err(BindError::TypeMismatch {
    label: label.to_string(),
    field: field.to_string(),
    expected: allowed.join(" | "),
    found: format!("{} ({spec})", spec.kind()),
  })
}

fn lookup<'a>(fields: &'a [FieldDef], key: &str) -> Option<&'a FieldDef> {
  let key = to_snake_case(key);
  fields
    .iter()
    .find(|def| def.name == key || def.aliases.contains(&key.as_str()))
}

/// `compileFlags` and `compile-flags` both become `compile_flags`.
pub fn to_snake_case(key: &str) -> String {
  let mut out = String::with_capacity(key.len() + 4);
  for (i, c) in key.chars().enumerate() {
    if c.is_ascii_uppercase() {
      if i > 0 && !out.ends_with('_') {
        out.push('_');
      }
      out.push(c.to_ascii_lowercase());
    } else if c == '-' {
      out.push('_');
    } else {
      out.push(c);
    }
  }
  out
}

fn strings(value: &Value) -> impl Iterator<Item = &str> {
  value
    .as_array()
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
}

fn mismatch(label: &Label, field: &str, expected: &str, found: &Value) -> BindError {
  BindError::TypeMismatch {
    label: label.to_string(),
    field: field.to_string(),
    expected: expected.to_string(),
    found: manifest::describe(found).to_string(),
  }
}
