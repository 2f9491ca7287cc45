use crate::core::{BuildOutcome, SessionReport};
use crate::error::{Result, RunnerError};
use crate::session::BuildSession;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const REPORT_FILE_NAME: &str = "README_build.txt";
pub const JSON_REPORT_FILE_NAME: &str = "build_report.json";

pub fn archive_file_name(session: &BuildSession) -> String {
    format!("{}_artifacts.zip", session.id())
}

pub fn log_file_name(target: &str) -> String {
    let safe: String = target
        .chars()
        .take(64)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("build_{}.log", safe)
}

/// Writes one `build_<target>.log` per outcome into the session directory.
pub async fn write_target_logs(session: &BuildSession, report: &SessionReport) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.outcomes.len());
    for (target, outcome) in &report.outcomes {
        let path = session.root().join(log_file_name(target));
        fs::write(&path, render_log(outcome))
            .await
            .map_err(|e| RunnerError::Packaging(format!("failed to write {:?}: {}", path, e)))?;
        written.push(path);
    }
    Ok(written)
}

fn render_log(outcome: &BuildOutcome) -> String {
    let mut log = String::new();
    let _ = writeln!(log, "Command:\n{}\n", outcome.command);
    let _ = writeln!(log, "--- STDOUT ---\n{}", outcome.stdout);
    let _ = writeln!(log, "--- STDERR ---\n{}", outcome.stderr);
    let _ = writeln!(log, "Return code: {}", outcome.exit_code);
    if let Some(diagnostic) = &outcome.diagnostic {
        let _ = writeln!(log, "Diagnostic: {}", diagnostic);
    }
    log
}

pub fn render_report(report: &SessionReport) -> String {
    let options = serde_json::to_string_pretty(&report.options).unwrap_or_else(|e| format!("<unrenderable: {}>", e));

    let mut text = String::new();
    let _ = writeln!(text, "Auto Build - Build Summary");
    let _ = writeln!(text, "==========================\n");
    let _ = writeln!(text, "Session: {}", report.session_id);
    let _ = writeln!(text, "Created: {}\n", report.created_at.to_rfc3339());
    let _ = writeln!(text, "Options:\n{}\n", options);
    let _ = writeln!(text, "Targets:");
    for target in &report.requested_targets {
        let _ = writeln!(text, "- {}", target);
    }
    let _ = writeln!(text, "\nBuild details:");
    for (target, outcome) in &report.outcomes {
        let _ = writeln!(text, "--- {} ---", target);
        let _ = writeln!(text, "Success: {}", outcome.success);
        let _ = writeln!(text, "Return code: {}", outcome.exit_code);
        if let Some(failure) = outcome.failure {
            let _ = writeln!(text, "Failure: {:?}", failure);
        }
        if let Some(path) = &outcome.output_path {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            let _ = writeln!(text, "Output: {}", name);
        }
        let _ = writeln!(text, "Duration: {} ms", outcome.duration_ms);
        let _ = writeln!(text, "Command:\n{}\n", outcome.command);
        let _ = writeln!(text, "STDOUT:\n{}", outcome.stdout);
        let _ = writeln!(text, "STDERR:\n{}", outcome.stderr);
        if let Some(diagnostic) = &outcome.diagnostic {
            let _ = writeln!(text, "Diagnostic: {}", diagnostic);
        }
        text.push('\n');
    }
    text
}

/// Writes the plain-text manifest into the session directory.
pub async fn write_report(session: &BuildSession, report: &SessionReport) -> Result<PathBuf> {
    let path = session.root().join(REPORT_FILE_NAME);
    fs::write(&path, render_report(report))
        .await
        .map_err(|e| RunnerError::Packaging(format!("failed to write manifest {:?}: {}", path, e)))?;
    debug!(session = %session.id(), "Wrote manifest {}", path.display());
    Ok(path)
}

pub async fn write_json_report(session: &BuildSession, report: &SessionReport) -> Result<PathBuf> {
    let path = session.root().join(JSON_REPORT_FILE_NAME);
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| RunnerError::Packaging(format!("failed to serialize report: {}", e)))?;
    fs::write(&path, json)
        .await
        .map_err(|e| RunnerError::Packaging(format!("failed to write {:?}: {}", path, e)))?;
    Ok(path)
}

/// Zips every file in the session directory (except a previous archive of the
/// same name) into `<session_id>_artifacts.zip`, flattened to base names.
pub async fn package_artifacts(session: &BuildSession) -> Result<PathBuf> {
    let root = session.root().to_path_buf();
    let archive_name = archive_file_name(session);
    let archive_path = root.join(&archive_name);

    let path = archive_path.clone();
    let members = tokio::task::spawn_blocking(move || write_archive(&root, &path, &archive_name))
        .await
        .map_err(|e| RunnerError::Packaging(format!("archive task failed: {}", e)))??;

    info!(
        session = %session.id(),
        "Packaged {} file(s) into {}",
        members,
        archive_path.display()
    );
    Ok(archive_path)
}

fn write_archive(root: &Path, archive_path: &Path, archive_name: &str) -> Result<usize> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| packaging_err(archive_path, e))?;
        if entry.file_type().is_file() && entry.file_name() != archive_name {
            files.push(entry.into_path());
        }
    }

    let file = File::create(archive_path).map_err(|e| packaging_err(archive_path, e))?;
    let mut zip = ZipWriter::new(file);
    let mut seen = HashSet::new();

    for path in &files {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        if !seen.insert(name.clone()) {
            warn!("Skipping {:?}: an archive member named {} already exists", path, name);
            continue;
        }

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file_mode(path));
        zip.start_file(name.as_str(), options).map_err(|e| packaging_err(archive_path, e))?;
        let mut source = File::open(path).map_err(|e| packaging_err(archive_path, e))?;
        std::io::copy(&mut source, &mut zip).map_err(|e| packaging_err(archive_path, e))?;
    }

    zip.finish().map_err(|e| packaging_err(archive_path, e))?;
    Ok(seen.len())
}

fn packaging_err(archive_path: &Path, e: impl std::fmt::Display) -> RunnerError {
    RunnerError::Packaging(format!("{:?}: {}", archive_path, e))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}
