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

//! Compile and link command lines for GNU-style and MSVC-style compiler drivers.
use crate::config::Config;
use crate::pool::CommandLine;
use crate::workspace;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

/// Command-line dialect of a compiler driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
  Gnu,
  Msvc,
}

impl Flavor {
  /// `cl.exe` and `clang-cl` speak MSVC; everything else is treated as GNU.
  pub fn of(compiler: &str) -> Flavor {
    let name = Path::new(compiler)
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or(compiler)
      .to_ascii_lowercase();
    let stem = name.strip_suffix(".exe").unwrap_or(&name);
    if stem == "cl" || stem == "clang-cl" {
      Flavor::Msvc
    } else {
      Flavor::Gnu
    }
  }
}

#[derive(Debug, Clone)]
pub struct Toolchain {
  pub compiler: String,
  pub archiver: String,
  pub linker: String,
  pub flavor: Flavor,
  pub static_linking: bool,
}

impl Toolchain {
  pub fn from_config(config: &Config) -> Self {
    let flavor = Flavor::of(&config.cc_compiler);
    let (default_archiver, linker) = match flavor {
      Flavor::Gnu => ("ar", config.cc_compiler.clone()),
      Flavor::Msvc => ("lib.exe", "link.exe".to_string()),
    };
    Toolchain {
      compiler: config.cc_compiler.clone(),
      archiver: config
        .cc_archiver
        .clone()
        .unwrap_or_else(|| default_archiver.to_string()),
      linker,
      flavor,
      static_linking: config.cc_static_linking,
    }
  }

  /// Object file name for a source file name.
  pub fn object_name(&self, src_file: &str) -> String {
    match self.flavor {
      Flavor::Gnu => format!("{src_file}.o"),
      Flavor::Msvc => format!("{src_file}.obj"),
    }
  }

  /// Artifact name of a library target.
  pub fn library_name(&self, name: &str) -> String {
    match (self.flavor, self.static_linking) {
      (Flavor::Msvc, true) => format!("{name}.lib"),
      (Flavor::Msvc, false) => format!("{name}.dll"),
      (Flavor::Gnu, true) => format!("{name}.a"),
      (Flavor::Gnu, false) if cfg!(target_os = "macos") => format!("lib{name}.dylib"),
      (Flavor::Gnu, false) => format!("lib{name}.so"),
    }
  }

  /// Artifact name of a binary or test target.
  pub fn executable_name(&self, name: &str) -> String {
    if cfg!(target_os = "windows") || self.flavor == Flavor::Msvc {
      format!("{name}.exe")
    } else {
      name.to_string()
    }
  }

  /// One compile command. Flags and include directories are de-duplicated keeping the
  /// first occurrence.
  pub fn compile(
    &self,
    src: &Path,
    obj: &Path,
    compile_flags: &[String],
    include_dirs: &[PathBuf],
  ) -> CommandLine {
    let define = format!("OS_{}", workspace::os_tag().to_ascii_uppercase());
    match self.flavor {
      Flavor::Gnu => {
        let flags = std::iter::once(format!("-D{define}"))
          .chain(compile_flags.iter().cloned())
          .chain(include_dirs.iter().map(|dir| format!("-I{}", dir.display())));
        CommandLine::new(&self.compiler)
          .args(["-c", "-o"])
          .path_arg(obj)
          .path_arg(src)
          .args(dedup_first(flags))
      }
      Flavor::Msvc => {
        let flags = std::iter::once(format!("/D{define}"))
          .chain(std::iter::once("/EHsc".to_string()))
          .chain(compile_flags.iter().cloned())
          .chain(include_dirs.iter().map(|dir| format!("/I{}", dir.display())));
        CommandLine::new(&self.compiler)
          .args(["/nologo", "/c"])
          .arg(format!("/Fo{}", obj.display()))
          .path_arg(src)
          .args(dedup_first(flags))
      }
    }
  }

  /// Links a library from its objects only.
  pub fn link_library(&self, out: &Path, objects: &[PathBuf], link_flags: &[String]) -> CommandLine {
    let objects = objects.iter().map(|obj| obj.display().to_string());
    match (self.flavor, self.static_linking) {
      (Flavor::Gnu, true) => CommandLine::new(&self.archiver)
        .arg("rcs")
        .path_arg(out)
        .args(objects),
      (Flavor::Gnu, false) => CommandLine::new(&self.linker)
        .args(["-shared", "-o"])
        .path_arg(out)
        .args(objects)
        .args(link_flags.iter().cloned()),
      (Flavor::Msvc, true) => CommandLine::new(&self.archiver)
        .arg("/nologo")
        .arg(format!("/OUT:{}", out.display()))
        .args(objects),
      (Flavor::Msvc, false) => CommandLine::new(&self.linker)
        .args(["/nologo", "/DLL"])
        .arg(format!("/OUT:{}", out.display()))
        .args(objects)
        .args(link_flags.iter().cloned()),
    }
  }

  /// Links an executable: objects, then dependency artifacts and libs in the given
  /// order, then link flags.
  pub fn link_executable(
    &self,
    out: &Path,
    objects: &[PathBuf],
    inputs: &[PathBuf],
    link_flags: &[String],
  ) -> CommandLine {
    let files = objects
      .iter()
      .chain(inputs)
      .map(|path| path.display().to_string());
    match self.flavor {
      Flavor::Gnu => CommandLine::new(&self.linker)
        .arg("-o")
        .path_arg(out)
        .args(files)
        .args(link_flags.iter().cloned()),
      Flavor::Msvc => CommandLine::new(&self.linker)
        .arg("/nologo")
        .arg(format!("/OUT:{}", out.display()))
        .args(files)
        .args(link_flags.iter().cloned())
        .arg("msvcrt.lib"),
    }
  }
}

/// Drops repeated items, keeping the first occurrence.
pub fn dedup_first(items: impl IntoIterator<Item = String>) -> Vec<String> {
  let mut seen = HashSet::new();
  items
    .into_iter()
    .filter(|item| seen.insert(item.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gnu() -> Toolchain {
    Toolchain {
      compiler: "clang++".to_string(),
      archiver: "ar".to_string(),
      linker: "clang++".to_string(),
      flavor: Flavor::Gnu,
      static_linking: true,
    }
  }

  #[test]
  fn flavor_from_compiler_name() {
    assert_eq!(Flavor::of("clang++"), Flavor::Gnu);
    assert_eq!(Flavor::of("/usr/bin/g++"), Flavor::Gnu);
    assert_eq!(Flavor::of("cl.exe"), Flavor::Msvc);
    assert_eq!(Flavor::of("CL"), Flavor::Msvc);
  }

  #[test]
  fn gnu_compile_line() {
    let command = gnu().compile(
      Path::new("/ws/lib/a.cc"),
      Path::new("/ws/bin/lib/a.cc.o"),
      &["-O2".to_string(), "-O2".to_string()],
      &[PathBuf::from("/ws"), PathBuf::from("/ws/bin/gen"), PathBuf::from("/ws")],
    );
    let define = format!("-DOS_{}", workspace::os_tag().to_ascii_uppercase());
    assert_eq!(command.program, "clang++");
    assert_eq!(
      command.args,
      vec![
        "-c",
        "-o",
        "/ws/bin/lib/a.cc.o",
        "/ws/lib/a.cc",
        define.as_str(),
        "-O2",
        "-I/ws",
        "-I/ws/bin/gen",
      ]
    );
  }

  #[test]
  fn artifact_names() {
    let mut toolchain = gnu();
    assert_eq!(toolchain.library_name("util"), "util.a");
    toolchain.static_linking = false;
    assert!(toolchain.library_name("util").starts_with("libutil."));
    toolchain.flavor = Flavor::Msvc;
    assert_eq!(toolchain.library_name("util"), "util.dll");
    assert_eq!(toolchain.executable_name("app"), "app.exe");
    assert_eq!(toolchain.object_name("a.cc"), "a.cc.obj");
  }

  #[test]
  fn link_lines() {
    let toolchain = gnu();
    let archive = toolchain.link_library(
      Path::new("/o/lib.a"),
      &[PathBuf::from("/o/a.o"), PathBuf::from("/o/b.o")],
      &[],
    );
    assert_eq!(archive.to_string(), "ar rcs /o/lib.a /o/a.o /o/b.o");

    let exe = toolchain.link_executable(
      Path::new("/o/app"),
      &[PathBuf::from("/o/main.o")],
      &[PathBuf::from("/o/lib.a")],
      &["-lpthread".to_string()],
    );
    assert_eq!(exe.to_string(), "clang++ -o /o/app /o/main.o /o/lib.a -lpthread");
  }
}
