use autobuild_runner::core::exit_code;
use autobuild_runner::execution::{run_command, run_command_cancellable, CommandSpec, ProcessStatus};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").args(["-c", script])
}

#[tokio::test]
async fn test_captures_stdout_and_stderr() {
    let dir = TempDir::new().unwrap();

    let result = run_command(&sh("echo hello; echo oops >&2"), dir.path(), Duration::from_secs(5)).await;

    assert!(result.success());
    assert_eq!(result.status, ProcessStatus::Exited(0));
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert!(result.diagnostic.is_none());
}

#[tokio::test]
async fn test_nonzero_exit_is_a_result_not_an_error() {
    let dir = TempDir::new().unwrap();

    let result = run_command(&sh("echo failing >&2; exit 3"), dir.path(), Duration::from_secs(5)).await;

    assert!(!result.success());
    assert_eq!(result.status, ProcessStatus::Exited(3));
    assert_eq!(result.exit_code(), 3);
    assert_eq!(result.stderr, "failing\n");
}

#[tokio::test]
async fn test_runs_in_working_directory() {
    let dir = TempDir::new().unwrap();

    let result = run_command(&sh("touch created_here"), dir.path(), Duration::from_secs(5)).await;

    assert!(result.success());
    assert!(dir.path().join("created_here").exists());
}

#[tokio::test]
async fn test_missing_executable_reports_launch_failure() {
    let dir = TempDir::new().unwrap();
    let command = CommandSpec::new("autobuild-definitely-missing-compiler").arg("--version");

    let result = run_command(&command, dir.path(), Duration::from_secs(5)).await;

    assert_eq!(result.status, ProcessStatus::LaunchFailed);
    assert_eq!(result.exit_code(), exit_code::LAUNCH_FAILURE);
    let diagnostic = result.diagnostic.unwrap();
    assert!(diagnostic.contains("autobuild-definitely-missing-compiler"));
}

#[tokio::test]
async fn test_timeout_kills_process_and_uses_sentinel() {
    let dir = TempDir::new().unwrap();
    let started = Instant::now();

    let result = run_command(&sh("echo started; sleep 30"), dir.path(), Duration::from_millis(300)).await;

    assert_eq!(result.status, ProcessStatus::TimedOut);
    assert_eq!(result.exit_code(), exit_code::TIMEOUT);
    assert!(result.diagnostic.unwrap().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_timeout_runs_cleanup_command() {
    let dir = TempDir::new().unwrap();
    let command = sh("sleep 30").with_cleanup(sh("touch cleaned_up"));

    let result = run_command(&command, dir.path(), Duration::from_millis(200)).await;

    assert_eq!(result.status, ProcessStatus::TimedOut);
    assert!(dir.path().join("cleaned_up").exists());
}

#[tokio::test]
async fn test_cleanup_not_run_on_normal_exit() {
    let dir = TempDir::new().unwrap();
    let command = sh("exit 0").with_cleanup(sh("touch cleaned_up"));

    let result = run_command(&command, dir.path(), Duration::from_secs(5)).await;

    assert!(result.success());
    assert!(!dir.path().join("cleaned_up").exists());
}

#[tokio::test]
async fn test_cancellation_terminates_child() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = run_command_cancellable(&sh("sleep 30"), dir.path(), Duration::from_secs(60), &token).await;

    assert_eq!(result.status, ProcessStatus::Cancelled);
    assert_eq!(result.exit_code(), exit_code::CANCELLED);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_undecodable_output_is_replaced_not_lost() {
    let dir = TempDir::new().unwrap();

    let result = run_command(&sh(r"printf 'bad \377\376 bytes ok'"), dir.path(), Duration::from_secs(5)).await;

    assert!(result.success());
    assert!(result.stdout.contains('\u{FFFD}'));
    assert!(result.stdout.starts_with("bad "));
    assert!(result.stdout.ends_with(" bytes ok"));
}

#[tokio::test]
async fn test_signalled_child_maps_above_128() {
    let dir = TempDir::new().unwrap();

    let result = run_command(&sh("kill -9 $$"), dir.path(), Duration::from_secs(5)).await;

    assert_eq!(result.status, ProcessStatus::Signaled(9));
    assert_eq!(result.exit_code(), 137);
}

#[test]
fn test_command_display_quotes_only_when_needed() {
    let command = CommandSpec::new("gcc").args(["-std=c11", "/tmp/my dir/main.c", "-o", "it's"]);

    assert_eq!(command.to_string(), r"gcc -std=c11 '/tmp/my dir/main.c' -o 'it'\''s'");
}
