#![allow(dead_code)]

use autobuild_runner::config::{CrossCompiler, RunnerConfig};
use autobuild_runner::detection::{HostOs, HostPlatform};
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HELLO_C: &str = r#"#include <stdio.h>

int main(void) {
    printf("Hello from autobuild\n");
    return 0;
}
"#;

pub const BROKEN_C: &str = r#"#include <stdio.h>

int main(void) {
    printf("missing semicolon") /* SYNTAX_ERROR */
}
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Behaves like a C compiler driver: writes the `-o` file unless the source
/// contains `SYNTAX_ERROR`, in which case it prints a diagnostic and exits 1.
pub fn fake_compiler(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-cc",
        r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    -*) ;;
    *) src="$1" ;;
  esac
  shift
done
if grep -q SYNTAX_ERROR "$src"; then
  echo "$src:4:40: error: expected ';' before '}' token" >&2
  exit 1
fi
echo "fake-cc: compiled $src"
printf 'BINARY' > "$out"
chmod +x "$out"
"#,
    )
}

/// Exits 0 without producing anything.
pub fn silent_compiler(dir: &Path) -> PathBuf {
    write_script(dir, "silent-cc", "#!/bin/sh\necho 'nothing to do'\nexit 0\n")
}

/// Mimics `docker run --rm --name N -v HOST:/work:rw -w /work [--network none] IMAGE CMD...`
/// by running CMD on the host with `/work` paths mapped back to HOST.
pub fn fake_container_runtime(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-docker",
        r#"#!/bin/sh
if [ "$1" = "rm" ]; then exit 0; fi
shift
mount=""
while [ $# -gt 0 ]; do
  case "$1" in
    --rm) shift ;;
    --name|-w|--network) shift 2 ;;
    -v) mount="${2%:/work:rw}"; shift 2 ;;
    *) break ;;
  esac
done
shift
for a do
  shift
  case "$a" in
    /work/*) a="$mount/${a#/work/}" ;;
  esac
  set -- "$@" "$a"
done
cd "$mount" || exit 125
exec "$@"
"#,
    )
}

/// A container runtime whose containers never start; records pids and the `rm -f` cleanup.
pub fn hanging_container_runtime(dir: &Path) -> PathBuf {
    let state = dir.display();
    write_script(
        dir,
        "hanging-docker",
        &format!(
            r#"#!/bin/sh
if [ "$1" = "rm" ]; then touch "{state}/container_removed"; exit 0; fi
echo $$ > "{state}/runtime.pid"
sleep 30 &
echo $! > "{state}/sleep.pid"
wait
"#
        ),
    )
}

pub fn linux_host() -> HostPlatform {
    HostPlatform::new(HostOs::Linux, "x86_64")
}

pub fn macos_host() -> HostPlatform {
    HostPlatform::new(HostOs::Macos, "arm64")
}

/// Config whose every toolchain is a fake script living in `tools`.
pub fn test_config(work_root: &Path, tools: &Path) -> RunnerConfig {
    let cc = fake_compiler(tools);
    let runtime = fake_container_runtime(tools);
    RunnerConfig {
        work_root: work_root.to_path_buf(),
        native_timeout: Duration::from_secs(10),
        container_timeout: Duration::from_secs(10),
        cross_timeout: Duration::from_secs(10),
        max_parallel_builds: 2,
        container_runtime: runtime.display().to_string(),
        container_image: "gcc:12".to_string(),
        container_compiler: cc.display().to_string(),
        cross_container_image: "ubuntu:22.04".to_string(),
        native_compiler: cc.display().to_string(),
        macos_compiler: cc.display().to_string(),
        cross_compiler: CrossCompiler::Mingw {
            program: cc.display().to_string(),
        },
    }
}

pub fn archive_members(archive: &Path) -> BTreeSet<String> {
    let file = fs::File::open(archive).unwrap();
    let zip = zip::ZipArchive::new(file).unwrap();
    zip.file_names().map(|n| n.to_string()).collect()
}

pub fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// A pid counts as gone once it no longer exists or is only a zombie.
pub fn process_alive(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            !matches!(state, Some('Z') | Some('X') | None)
        }
        Err(_) => false,
    }
}

pub fn write_source(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("main.c");
    fs::write(&path, contents).unwrap();
    path
}
