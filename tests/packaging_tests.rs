mod common;

use autobuild_runner::core::{exit_code, BuildOptions, BuildOutcome, FailureKind, SessionReport};
use autobuild_runner::packaging::{
    archive_file_name, log_file_name, package_artifacts, render_report, write_json_report, write_report,
    write_target_logs, JSON_REPORT_FILE_NAME, REPORT_FILE_NAME,
};
use autobuild_runner::session::{BuildSession, SessionManager};
use common::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn success_outcome(session: &BuildSession, target: &str, file: &str) -> BuildOutcome {
    let output = session.root().join(file);
    fs::write(&output, b"BINARY").unwrap();
    BuildOutcome {
        target: target.to_string(),
        success: true,
        exit_code: 0,
        stdout: "compiled".to_string(),
        stderr: String::new(),
        command: format!("gcc -std=c11 -O2 main.c -o {}", file),
        output_path: Some(output),
        failure: None,
        diagnostic: None,
        duration_ms: 12,
    }
}

fn sample_report(session: &Arc<BuildSession>) -> SessionReport {
    let mut outcomes = BTreeMap::new();
    outcomes.insert(
        "native_host".to_string(),
        success_outcome(session, "native_host", "main_native_linux_x86_64"),
    );
    outcomes.insert(
        "host_macos".to_string(),
        BuildOutcome::rejected(
            "host_macos",
            FailureKind::UnsupportedTarget,
            exit_code::UNSUPPORTED_HOST,
            "macos binaries must be built on a macos host (current host: linux/x86_64)",
        ),
    );
    SessionReport {
        session_id: session.id(),
        created_at: session.created_at(),
        options: BuildOptions::default(),
        requested_targets: vec!["host_macos".to_string(), "native_host".to_string()],
        outcomes,
    }
}

async fn new_session(root: &TempDir) -> Arc<BuildSession> {
    let manager = SessionManager::new(root.path()).await.unwrap();
    manager.create_session(HELLO_C.as_bytes()).await.unwrap()
}

#[test]
fn test_log_file_names_are_flat() {
    assert_eq!(log_file_name("native_host"), "build_native_host.log");
    assert_eq!(log_file_name("../evil"), "build____evil.log");
    assert_eq!(log_file_name("a/b\\c"), "build_a_b_c.log");
    let long = "x".repeat(200);
    assert_eq!(log_file_name(&long), format!("build_{}.log", "x".repeat(64)));
}

#[tokio::test]
async fn test_archive_contains_every_session_file() {
    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;
    let report = sample_report(&session);

    write_target_logs(&session, &report).await.unwrap();
    write_report(&session, &report).await.unwrap();
    write_json_report(&session, &report).await.unwrap();
    let archive = package_artifacts(&session).await.unwrap();

    assert_eq!(archive, session.root().join(archive_file_name(&session)));
    let members = archive_members(&archive);
    let expected: Vec<String> = vec![
        "README_build.txt",
        "build_host_macos.log",
        "build_native_host.log",
        "build_report.json",
        "main.c",
        "main_native_linux_x86_64",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(members.into_iter().collect::<Vec<_>>(), expected);

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let mut source = String::new();
    zip.by_name("main.c").unwrap().read_to_string(&mut source).unwrap();
    assert_eq!(source, HELLO_C);
}

#[tokio::test]
async fn test_repackaging_excludes_previous_archive() {
    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;

    let first = package_artifacts(&session).await.unwrap();
    let first_members = archive_members(&first);
    let second = package_artifacts(&session).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first_members, archive_members(&second));
    assert!(!archive_members(&second).contains(&archive_file_name(&session)));
}

#[tokio::test]
async fn test_nested_files_are_flattened() {
    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;
    let nested = session.root().join("obj").join("deep");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("main.o"), b"object").unwrap();
    fs::write(nested.join("main.c"), b"duplicate name").unwrap();

    let archive = package_artifacts(&session).await.unwrap();
    let members = archive_members(&archive);

    assert!(members.contains("main.o"));
    assert!(members.iter().all(|m| !m.contains('/')));
    assert_eq!(members.iter().filter(|m| m.as_str() == "main.c").count(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_executable_bit_survives_packaging() {
    use std::os::unix::fs::PermissionsExt;

    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;
    let binary = session.root().join("main_native_linux_x86_64");
    fs::write(&binary, b"BINARY").unwrap();
    fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

    let archive = package_artifacts(&session).await.unwrap();
    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let entry = zip.by_name("main_native_linux_x86_64").unwrap();

    assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o755));
}

#[tokio::test]
async fn test_report_lists_every_target() {
    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;
    let report = sample_report(&session);

    let text = render_report(&report);

    assert!(text.contains(&session.id().to_string()));
    assert!(text.contains("- host_macos"));
    assert!(text.contains("- native_host"));
    assert!(text.contains("--- native_host ---"));
    assert!(text.contains("Output: main_native_linux_x86_64"));
    assert!(text.contains("Return code: -1"));
    assert!(text.contains("must be built on a macos host"));
    assert!(text.contains("\"language_standard\": \"c11\""));
}

#[tokio::test]
async fn test_report_files_written_into_session() {
    let root = TempDir::new().unwrap();
    let session = new_session(&root).await;
    let report = sample_report(&session);

    let text_path = write_report(&session, &report).await.unwrap();
    let json_path = write_json_report(&session, &report).await.unwrap();
    let logs = write_target_logs(&session, &report).await.unwrap();

    assert_eq!(text_path, session.root().join(REPORT_FILE_NAME));
    assert_eq!(json_path, session.root().join(JSON_REPORT_FILE_NAME));
    assert_eq!(logs.len(), 2);

    let parsed: SessionReport = serde_json::from_slice(&fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.session_id, session.id());
    assert_eq!(parsed.outcomes.len(), 2);
    assert_eq!(parsed.outcomes["host_macos"].exit_code, exit_code::UNSUPPORTED_HOST);

    let log = fs::read_to_string(session.root().join("build_native_host.log")).unwrap();
    assert!(log.contains("Command:\ngcc -std=c11 -O2 main.c -o main_native_linux_x86_64"));
    assert!(log.contains("Return code: 0"));
}
