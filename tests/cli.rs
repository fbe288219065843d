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

// The toolchain is a pair of shell scripts: "compiling" copies the source into the
// object, "linking" concatenates objects into an executable shell script. Sources are
// therefore shell snippets.
#![cfg(unix)]

use assert_cmd::cargo;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use std::time::SystemTime;
use tempfile::TempDir;
use tempfile::tempdir;

const FAKE_CC: &str = r#"#!/bin/sh
echo "cc $*" >> "$FAKECC_LOG"
if [ "$1" = "-c" ]; then
  cat "$4" > "$3"
  exit 0
fi
out="$2"
shift 2
{
  echo '#!/bin/sh'
  for f in "$@"; do
    case "$f" in
      -*) ;;
      *) cat "$f" ;;
    esac
  done
} > "$out"
chmod +x "$out"
"#;

const FAKE_AR: &str = r#"#!/bin/sh
echo "ar $*" >> "$FAKECC_LOG"
out="$2"
shift 2
cat "$@" > "$out"
"#;

/// A workspace under `<temp>/ws` plus the fake toolchain under `<temp>/tools`.
struct Fixture {
  temp: TempDir,
}

impl Fixture {
  fn new(files: &[(&str, &str)]) -> Self {
    let temp = tempdir().unwrap();
    let fixture = Fixture { temp };
    fixture.write("ws/WORKSPACE", "{}");
    for (path, content) in files {
      fixture.write(&format!("ws/{path}"), content);
    }
    fixture.write_script("tools/fakecc", FAKE_CC);
    fixture.write_script("tools/fakear", FAKE_AR);
    fixture
  }

  fn root(&self) -> PathBuf {
    self.temp.path().join("ws")
  }

  fn out(&self) -> PathBuf {
    self.root().join("bin")
  }

  fn log(&self) -> PathBuf {
    self.temp.path().join("commands.log")
  }

  fn write(&self, path: &str, content: &str) {
    let path = self.temp.path().join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn write_script(&self, path: &str, content: &str) {
    self.write(path, content);
    let path = self.temp.path().join(path);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  }

  fn lathe(&self) -> Command {
    let tools = self.temp.path().join("tools");
    let mut cmd = Command::new(cargo::cargo_bin!("lathe"));
    cmd
      .current_dir(self.root())
      .arg("--cc-compiler")
      .arg(tools.join("fakecc"))
      .arg("--cc-archiver")
      .arg(tools.join("fakear"))
      .env("FAKECC_LOG", self.log())
      .env("CLICOLOR", "0")
      .env_remove("RUST_LOG");
    cmd
  }

  /// Command lines run so far.
  fn commands(&self) -> Vec<String> {
    fs::read_to_string(self.log())
      .unwrap_or_default()
      .lines()
      .map(str::to_string)
      .collect()
  }

  /// Every file under the output directory, relative to it.
  fn outputs(&self) -> Vec<String> {
    let out = self.out();
    let mut files = Vec::new();
    collect(&out, &out, &mut files);
    files.sort();
    files
  }
}

fn collect(base: &Path, dir: &Path, files: &mut Vec<String>) {
  let Ok(entries) = fs::read_dir(dir) else {
    return;
  };
  for entry in entries {
    let path = entry.unwrap().path();
    if path.is_dir() {
      collect(base, &path, files);
    } else {
      let relative = path.strip_prefix(base).unwrap();
      files.push(relative.to_string_lossy().replace('\\', "/"));
    }
  }
}

fn touch_later(path: &Path) {
  let later = SystemTime::now() + Duration::from_secs(60);
  fs::File::options()
    .write(true)
    .open(path)
    .unwrap()
    .set_modified(later)
    .unwrap();
}

#[test]
fn test_simple_binary() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{ hello_world: { type: "c++/binary", srcs: ["main.cc"] } }"#,
    ),
    ("main.cc", "printf PASSED\n"),
  ]);

  fixture.lathe().args(["build", ":hello_world"]).assert().success();
  assert_eq!(
    fixture.outputs(),
    vec!["_objs/hello_world/main.cc.o", "hello_world"]
  );

  Command::new(fixture.out().join("hello_world"))
    .assert()
    .success()
    .stdout("PASSED");

  fixture
    .lathe()
    .args(["run", ":hello_world"])
    .assert()
    .success()
    .stdout("PASSED")
    .stderr(predicate::str::contains("$ "));
}

#[test]
fn test_library_and_binary() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        lib: { type: "c++/library", srcs: ["lib.cc"], hdrs: ["lib.h"] },
        hello_world: { type: "c++/binary", srcs: ["main.cc"], deps: [":lib"] },
      }"#,
    ),
    ("lib.cc", "# lib\n"),
    ("lib.h", ""),
    ("main.cc", "printf PASSED\n"),
  ]);

  fixture.lathe().args(["build", ":hello_world"]).assert().success();
  assert_eq!(
    fixture.outputs(),
    vec![
      "_objs/hello_world/main.cc.o",
      "_objs/lib/lib.cc.o",
      "hello_world",
      "lib.a",
    ]
  );
  assert!(
    fixture
      .commands()
      .iter()
      .any(|line| line.starts_with("ar rcs"))
  );

  let link = fixture
    .commands()
    .into_iter()
    .find(|line| line.starts_with("cc -o"))
    .unwrap();
  assert_eq!(link.matches("lib.a").count(), 1);

  Command::new(fixture.out().join("hello_world"))
    .assert()
    .success()
    .stdout("PASSED");
}

#[test]
fn test_all_in_directory() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        lib: { type: "c++/library", srcs: ["lib.cc"] },
        lib2: { type: "c++/library", srcs: ["lib2.cc"] },
      }"#,
    ),
    ("lib.cc", ""),
    ("lib2.cc", ""),
  ]);

  fixture.lathe().args(["build", ":all"]).assert().success();
  assert_eq!(
    fixture.outputs(),
    vec!["_objs/lib/lib.cc.o", "_objs/lib2/lib2.cc.o", "lib.a", "lib2.a"]
  );
}

#[test]
fn test_tree_expansion() {
  let fixture = Fixture::new(&[
    ("lib/BUILD", r#"{ lib: { type: "c++/library", srcs: ["lib.cc"] } }"#),
    ("lib/lib.cc", ""),
    ("lib2/BUILD", r#"{ lib2: { type: "c++/library", srcs: ["lib2.cc"] } }"#),
    ("lib2/lib2.cc", ""),
  ]);

  fixture.lathe().args(["build", "//..."]).assert().success();
  assert_eq!(
    fixture.outputs(),
    vec![
      "lib/_objs/lib/lib.cc.o",
      "lib/lib.a",
      "lib2/_objs/lib2/lib2.cc.o",
      "lib2/lib2.a",
    ]
  );
}

#[test]
fn test_cycle_is_reported_before_any_command() {
  let fixture = Fixture::new(&[(
    "BUILD",
    r#"{
      a: { type: "c++/library", srcs: ["a.cc"], deps: [":b"] },
      b: { type: "c++/library", srcs: ["a.cc"], deps: [":c"] },
      c: { type: "c++/library", srcs: ["a.cc"], deps: [":a"] },
    }"#,
  ),
  ("a.cc", "")]);

  fixture
    .lathe()
    .args(["build", ":a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("//:a --> //:b --> //:c --> //:a"));
  assert!(fixture.commands().is_empty());
}

#[test]
fn test_results_are_cached() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{ smoke_test: { type: "c++/test", srcs: ["test.cc"] } }"#,
    ),
    (
      "test.cc",
      "echo run >> \"$(dirname \"$0\")/runs.log\"\nprintf PASSED\n",
    ),
  ]);
  let runs = fixture.out().join("runs.log");

  fixture
    .lathe()
    .args(["test", ":smoke_test"])
    .assert()
    .success()
    .stdout(predicate::str::contains("//:smoke_test PASSED"))
    .stdout(predicate::str::contains("(cached)").not());
  assert_eq!(fs::read_to_string(&runs).unwrap().lines().count(), 1);
  assert!(fixture.out().join("smoke_test.result").is_file());

  fixture
    .lathe()
    .args(["test", ":smoke_test"])
    .assert()
    .success()
    .stdout(predicate::str::contains("(cached)"));
  assert_eq!(fs::read_to_string(&runs).unwrap().lines().count(), 1);

  fixture
    .lathe()
    .args(["--force-run-tests", "test", ":smoke_test"])
    .assert()
    .success();
  assert_eq!(fs::read_to_string(&runs).unwrap().lines().count(), 2);
}

#[test]
fn test_failing_test_exits_non_zero() {
  let fixture = Fixture::new(&[
    ("BUILD", r#"{ broken_test: { type: "c++/test", srcs: ["test.cc"] } }"#),
    ("test.cc", "echo boom\nexit 1\n"),
  ]);

  fixture
    .lathe()
    .args(["test", ":broken_test"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("//:broken_test FAILED"))
    .stdout(predicate::str::contains("boom"))
    .stderr(predicate::str::contains("1 of 1 test(s) failed"));
}

#[test]
fn test_second_build_runs_no_commands() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        lib: { type: "c++/library", srcs: ["lib.cc"], hdrs: ["lib.h"] },
        app: { type: "c++/binary", srcs: ["main.cc"], deps: [":lib"] },
      }"#,
    ),
    ("lib.cc", ""),
    ("lib.h", ""),
    ("main.cc", ""),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  let first = fixture.commands().len();
  assert_eq!(first, 4);

  fixture.lathe().args(["build", ":app"]).assert().success();
  assert_eq!(fixture.commands().len(), first);

  // A newer header recompiles every object that depends on it and relinks.
  touch_later(&fixture.root().join("lib.h"));
  fixture.lathe().args(["build", ":app"]).assert().success();
  let rebuilt = &fixture.commands()[first..];
  assert_eq!(rebuilt.iter().filter(|line| line.starts_with("cc -c")).count(), 2);
  assert!(rebuilt.iter().any(|line| line.starts_with("cc -o")));
}

#[test]
fn test_genrule_output_feeds_a_binary() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        gen_main: {
          type: "genrule",
          in: ["main.in"],
          out: ["main.cc"],
          cmd: ["cp", "main.in", "main.cc"],
        },
        app: { type: "c++/binary", srcs: [":gen_main"] },
      }"#,
    ),
    ("main.in", "printf GENERATED\n"),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  assert!(fixture.out().join("gen/main.cc").is_file());
  Command::new(fixture.out().join("app"))
    .assert()
    .success()
    .stdout("GENERATED");
}

#[test]
fn test_dry_run_touches_nothing() {
  let fixture = Fixture::new(&[
    ("BUILD", r#"{ app: { type: "c++/binary", srcs: ["main.cc"] } }"#),
    ("main.cc", ""),
  ]);

  fixture
    .lathe()
    .args(["--dry-run", "build", ":app"])
    .assert()
    .success();
  assert!(!fixture.out().exists());
  assert!(fixture.commands().is_empty());
}

#[test]
fn test_unknown_target_fails() {
  let fixture = Fixture::new(&[("BUILD", "{}")]);

  fixture
    .lathe()
    .args(["build", ":missing"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_clean_removes_outputs() {
  let fixture = Fixture::new(&[
    ("BUILD", r#"{ app: { type: "c++/binary", srcs: ["main.cc"] } }"#),
    ("main.cc", ""),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  assert!(fixture.out().exists());
  fixture.lathe().arg("clean").assert().success();
  assert!(!fixture.out().exists());
}

#[test]
fn test_missing_workspace() {
  let temp = tempdir().unwrap();
  Command::new(cargo::cargo_bin!("lathe"))
    .current_dir(temp.path())
    .args(["build", ":app"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no WORKSPACE found"));
}

#[test]
fn test_data_files_land_next_to_the_binary() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        lib: { type: "c++/library", srcs: ["lib.cc"], data: ["config.txt"] },
        app: { type: "c++/binary", srcs: ["main.cc"], deps: [":lib"], data: ["data/input.txt"] },
      }"#,
    ),
    ("lib.cc", ""),
    ("main.cc", "cat \"$(dirname \"$0\")/config.txt\"\n"),
    ("config.txt", "verbose=1\n"),
    ("data/input.txt", "42\n"),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  let config = fixture.out().join("config.txt");
  assert_eq!(fs::read_to_string(&config).unwrap(), "verbose=1\n");
  assert_eq!(
    fs::read_to_string(fixture.out().join("data/input.txt")).unwrap(),
    "42\n"
  );
  Command::new(fixture.out().join("app"))
    .assert()
    .success()
    .stdout("verbose=1\n");

  // Current copies are left alone.
  let copied_at = fs::metadata(&config).unwrap().modified().unwrap();
  fixture.lathe().args(["build", ":app"]).assert().success();
  assert_eq!(fs::metadata(&config).unwrap().modified().unwrap(), copied_at);
}

#[test]
fn test_binary_without_sources_fails() {
  let fixture = Fixture::new(&[("BUILD", r#"{ app: { type: "c++/binary" } }"#)]);

  fixture
    .lathe()
    .args(["build", ":app"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("//:app: binary has no srcs and no deps"));
  assert!(fixture.commands().is_empty());
}

#[test]
fn test_literal_libs_are_linked() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{ app: { type: "c++/binary", srcs: ["main.cc"], libs: ["third_party/prebuilt.a"] } }"#,
    ),
    ("main.cc", "printf MAIN\n"),
    ("third_party/prebuilt.a", "printf PREBUILT\n"),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  let link = fixture
    .commands()
    .into_iter()
    .find(|line| line.starts_with("cc -o"))
    .unwrap();
  assert!(link.contains("third_party/prebuilt.a"));
  Command::new(fixture.out().join("app"))
    .assert()
    .success()
    .stdout("MAINPREBUILT");
}

#[test]
fn test_glob_sources() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{ app: { type: "c++/binary", srcs: ["glob:*.cc"] } }"#,
    ),
    ("a.cc", "printf A\n"),
    ("b.cc", "printf B\n"),
    ("notes.txt", ""),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  assert_eq!(
    fixture.outputs(),
    vec!["_objs/app/a.cc.o", "_objs/app/b.cc.o", "app"]
  );
  Command::new(fixture.out().join("app"))
    .assert()
    .success()
    .stdout("AB");
}

#[test]
fn test_repeated_runs_report_the_mean() {
  let fixture = Fixture::new(&[
    (
      "BUILD",
      r#"{
        ok_test: { type: "c++/test", srcs: ["ok.cc"] },
        flaky_test: { type: "c++/test", srcs: ["flaky.cc"] },
      }"#,
    ),
    ("ok.cc", "exit 0\n"),
    ("flaky.cc", "exit 1\n"),
  ]);

  fixture
    .lathe()
    .args(["--test-runs", "2", "test", ":all"])
    .assert()
    .failure()
    .stdout(predicate::str::is_match(r"//:ok_test PASSED in \S+ \(mean\)\n").unwrap())
    .stdout(predicate::str::contains("//:flaky_test FAILED"))
    .stdout(predicate::str::contains("(mean), 2/2 runs failed"));
  assert!(!fixture.out().join("ok_test.result").exists());
}

#[test]
fn test_deep_graph_rebuild_runs_nothing() {
  // Twenty levels of diamonds: two libraries per level, each depending on both below.
  let mut manifest = String::from("{\n");
  for level in 0..20 {
    let deps = if level == 0 {
      String::new()
    } else {
      format!(r#", deps: [":a{0}", ":b{0}"]"#, level - 1)
    };
    for side in ["a", "b"] {
      manifest.push_str(&format!(
        "  {side}{level}: {{ type: \"c++/library\", srcs: [\"x.cc\"]{deps} }},\n"
      ));
    }
  }
  manifest.push_str(
    "  app: { type: \"c++/binary\", srcs: [\"main.cc\"], deps: [\":a19\", \":b19\"] },\n}\n",
  );
  let fixture = Fixture::new(&[
    ("BUILD", manifest.as_str()),
    ("x.cc", ""),
    ("main.cc", "printf DEEP\n"),
  ]);

  fixture.lathe().args(["build", ":app"]).assert().success();
  let first = fixture.commands().len();
  let link = fixture.commands().pop().unwrap();
  assert!(link.starts_with("cc -o"));
  assert_eq!(link.matches("a0.a").count(), 1);

  fixture.lathe().args(["build", ":app"]).assert().success();
  assert_eq!(fixture.commands().len(), first);
}
