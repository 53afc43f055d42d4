// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `dotnet` build orchestration and debuggee command lines.

use std::path::Path;
use std::process::Stdio;

use log::info;
use tokio::process::Command;

use crate::error::EngineError;
use crate::Result;

/// Captured output of a successful build.
#[derive(Clone, Debug, Default)]
pub struct BuildOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `dotnet build -c Debug` against a project. Failures carry the
/// compiler output so the agent can read the diagnostics.
pub async fn build_project(project_path: &Path) -> Result<BuildOutput> {
    info!("building {} (Debug)", project_path.display());

    let output = Command::new("dotnet")
        .arg("build")
        .arg(project_path)
        .args(["-c", "Debug"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(EngineError::BuildFailed {
            code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        });
    }

    Ok(BuildOutput { stdout, stderr })
}

/// Command line for launching an application dll under the runtime.
pub(crate) fn app_command_line(app_dll_path: &Path) -> String {
    format!("dotnet \"{}\"", app_dll_path.display())
}

/// Command line for running a project's test suite under the debugger;
/// the build has already happened.
pub(crate) fn test_command_line(project_path: &Path) -> String {
    format!("dotnet test \"{}\" --no-build", project_path.display())
}

/// The process name of a pid, read out-of-band from procfs.
#[cfg(target_os = "linux")]
pub(crate) fn process_name(pid: u32) -> Option<String> {
    let process = procfs::process::Process::new(pid as i32).ok()?;
    let stat = process.stat().ok()?;
    Some(stat.comm)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn process_name(_pid: u32) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_quote_paths() {
        let cmd = app_command_line(Path::new("/out/bin Debug/App.dll"));
        assert_eq!(cmd, "dotnet \"/out/bin Debug/App.dll\"");

        let test = test_command_line(Path::new("/src/Tests"));
        assert_eq!(test, "dotnet test \"/src/Tests\" --no-build");
    }
}
