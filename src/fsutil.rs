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

//! Modification times and file materialization.
use crate::error::ExecError;
use fs_extra::file::CopyOptions;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Modification time of `path`, if it exists.
pub fn modified(path: &Path) -> Option<SystemTime> {
  fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// True when `path` exists and was modified after `than`.
pub fn is_newer(path: &Path, than: SystemTime) -> bool {
  modified(path).is_some_and(|time| time > than)
}

pub fn create_dir_all(path: &Path) -> Result<(), ExecError> {
  fs::create_dir_all(path).map_err(|source| ExecError::Fs {
    action: "create directory",
    path: path.to_path_buf(),
    source,
  })
}

pub fn remove_file_if_exists(path: &Path) -> Result<(), ExecError> {
  match fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(ExecError::Fs {
      action: "remove",
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// Hard-links `src` to `dest`, copying when links are not possible (e.g. across devices).
pub fn link_or_copy(src: &Path, dest: &Path) -> Result<(), ExecError> {
  if let Some(parent) = dest.parent() {
    create_dir_all(parent)?;
  }
  match fs::hard_link(src, dest) {
    Ok(()) => Ok(()),
    Err(err) => {
      tracing::debug!(
        "hard link {} -> {} failed ({err}), copying",
        src.display(),
        dest.display()
      );
      let mut options = CopyOptions::new();
      options.overwrite = true;
      fs_extra::file::copy(src, dest, &options)
        .map(|_| ())
        .map_err(|err| ExecError::Fs {
          action: "copy to",
          path: dest.to_path_buf(),
          source: io::Error::other(err.to_string()),
        })
    }
  }
}

/// Makes `dest` a current copy of `src`: a stale destination is removed and relinked.
///
/// Returns true when the destination was (re)created.
pub fn refresh(src: &Path, dest: &Path) -> Result<bool, ExecError> {
  if let Some(dest_time) = modified(dest) {
    if !is_newer(src, dest_time) {
      return Ok(false);
    }
    remove_file_if_exists(dest)?;
  }
  link_or_copy(src, dest)?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tempfile::tempdir;

  #[test]
  fn refresh_links_then_skips_current_copies() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("data.txt");
    let dest = temp.path().join("out/nested/data.txt");
    fs::write(&src, "v1").unwrap();

    assert!(refresh(&src, &dest).unwrap());
    assert_eq!(fs::read_to_string(&dest).unwrap(), "v1");
    assert!(!refresh(&src, &dest).unwrap());
  }

  #[test]
  fn refresh_replaces_stale_destinations() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("data.txt");
    let dest = temp.path().join("copy.txt");
    fs::write(&src, "new").unwrap();
    fs::write(&dest, "old").unwrap();

    let past = SystemTime::now() - Duration::from_secs(60);
    fs::File::options()
      .write(true)
      .open(&dest)
      .unwrap()
      .set_modified(past)
      .unwrap();

    assert!(refresh(&src, &dest).unwrap());
    assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
  }

  #[test]
  fn newer_compares_modification_times() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("f");
    fs::write(&path, "").unwrap();
    let past = SystemTime::now() - Duration::from_secs(60);
    assert!(is_newer(&path, past));
    assert!(!is_newer(&temp.path().join("missing"), past));
    remove_file_if_exists(&temp.path().join("missing")).unwrap();
  }
}
